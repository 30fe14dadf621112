//! Job handlers and their registry

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::job::Job;
use crate::error::Result;

/// Executes jobs of one type
///
/// Handlers must tolerate being re-run for the same job: a retry follows any
/// transient failure, including a timeout partway through.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The `job_type` this handler accepts
    fn job_type(&self) -> &str;

    async fn handle(&self, job: &Job) -> Result<()>;

    /// Time budget for one invocation
    fn timeout(&self, _job: &Job, base: Duration) -> Duration {
        base
    }
}

/// Handlers keyed by job type
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same type
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) -> &mut Self {
        self.handlers
            .insert(handler.job_type().to_string(), handler);
        self
    }

    pub fn with(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn job_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}
