//! Group formation services
//!
//! Leaf-first: geo filter, friendship clusterer, merge resolver,
//! shared-interest selector, event fetcher (with the Ticketmaster catalog),
//! and the orchestrator that drives them.

pub mod event_fetcher;
pub mod formation_orchestrator;
pub mod friendship_clusterer;
pub mod geo_filter;
pub mod merge_resolver;
pub mod shared_interest;
pub mod ticketmaster_client;

pub use event_fetcher::{EventFetcher, FetchedEvents};
pub use formation_orchestrator::{EngineParts, FormationOrchestrator, OrchestratorSettings};
pub use friendship_clusterer::{cluster, DisjointSet};
pub use geo_filter::{haversine_miles, GeoFilter, NearbyUser};
pub use merge_resolver::{MergeOutcome, MergeResolver};
pub use shared_interest::SharedInterestSelector;
pub use ticketmaster_client::{TicketmasterClient, TicketmasterError};
