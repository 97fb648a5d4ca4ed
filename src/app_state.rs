use std::sync::Arc;

use crate::db::JobRegistry;
use crate::services::{conversion::ConversionService, queue::JobQueue};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn JobRegistry>,
    pub conversions: Arc<ConversionService>,
    /// Present when jobs are handed to the worker through Redis.
    pub queue: Option<Arc<JobQueue>>,
}

impl AppState {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        conversions: ConversionService,
        queue: Option<Arc<JobQueue>>,
    ) -> Self {
        Self {
            registry,
            conversions: Arc::new(conversions),
            queue,
        }
    }
}
