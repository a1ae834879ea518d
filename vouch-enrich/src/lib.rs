//! vouch-enrich library interface
//!
//! Candidate enrichment engine: concurrent collection from external sources,
//! multi-source profile aggregation and skill validation.

pub mod aggregation;
pub mod collectors;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod pipeline;
pub mod queue;
pub mod store;
pub mod types;
pub mod validation;

pub use crate::error::{EnrichError, EnrichResult};

use std::sync::Arc;

use crate::aggregation::Aggregator;
use crate::collectors::CollectorRegistry;
use crate::config::EnrichConfig;
use crate::events::EnrichmentEventBus;
use crate::orchestrator::CollectionOrchestrator;
use crate::pipeline::EnrichmentPipeline;
use crate::store::ProfileStore;
use crate::validation::SkillValidator;

/// Events buffered per subscriber
pub const EVENT_CAPACITY: usize = 256;

/// Wire a pipeline from config, a store and a collector registry
pub fn build_pipeline(
    config: &EnrichConfig,
    store: Arc<dyn ProfileStore>,
    collectors: CollectorRegistry,
    events: EnrichmentEventBus,
) -> EnrichmentPipeline {
    let orchestrator = CollectionOrchestrator::new(
        Arc::clone(&store),
        collectors,
        &config.orchestrator,
        events.clone(),
    );
    EnrichmentPipeline::new(
        store,
        orchestrator,
        Aggregator::new(config.aggregation.clone()),
        SkillValidator::new(config.validation.clone()),
        events,
    )
}
