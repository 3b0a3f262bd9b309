use std::sync::Arc;

use campus_core::curriculum::ProgramBuilder;
use campus_core::gradebook::Gradebook;
use campus_core::journey::JourneyEngine;
use campus_core::playbook::CatalogueCache;
use campus_core::scheduling::Scheduler;
use campus_core::store::Store;
use campus_events::{BusObserver, EventBus};

use crate::config::ServerConfig;
use crate::middleware::rate_limit::RateLimiter;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Postgres or in-process backend, chosen at startup.
    pub store: Arc<dyn Store>,
    pub config: Arc<ServerConfig>,
    pub journey: Arc<JourneyEngine<dyn Store>>,
    pub builder: Arc<ProgramBuilder<dyn Store>>,
    pub scheduler: Arc<Scheduler<dyn Store>>,
    pub gradebook: Arc<Gradebook<dyn Store>>,
    /// Centralized event bus for publishing platform events.
    pub event_bus: Arc<EventBus>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wire the engines over one store. Journey transitions are published
    /// on `event_bus`.
    pub fn new(store: Arc<dyn Store>, config: ServerConfig, event_bus: Arc<EventBus>) -> Self {
        let journey = JourneyEngine::new(Arc::clone(&store), Arc::new(CatalogueCache::new()))
            .with_observer(Arc::new(BusObserver::new(Arc::clone(&event_bus))));
        Self {
            journey: Arc::new(journey),
            builder: Arc::new(ProgramBuilder::new(Arc::clone(&store))),
            scheduler: Arc::new(Scheduler::new(Arc::clone(&store))),
            gradebook: Arc::new(Gradebook::new(Arc::clone(&store))),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            config: Arc::new(config),
            event_bus,
            store,
        }
    }
}
