//! Job handler trait and registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Result type for job handlers: the job's result value, or a failure message.
pub type HandlerResult = Result<serde_json::Value, String>;

/// Future type for async job handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Trait for job handlers.
///
/// Implement this trait to define how jobs of a specific type are processed.
/// A handler owns its own timeouts and cancellation unless the queue is
/// configured with a handler deadline.
pub trait JobHandler: Send + Sync + 'static {
    /// The job type this handler processes.
    fn job_type(&self) -> &str;

    /// Process a job payload and return the result.
    fn handle(&self, payload: serde_json::Value) -> HandlerFuture;
}

/// Registry for job handlers.
///
/// Maps job types to their handlers for dynamic dispatch.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for its job type, replacing any previous one.
    pub fn register<H: JobHandler>(&mut self, handler: H) {
        let job_type = handler.job_type().to_string();
        self.handlers.insert(job_type, Arc::new(handler));
    }

    /// Register an async closure for a job type.
    pub fn register_fn<F, Fut>(&mut self, job_type: impl Into<String>, f: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(FnHandler::new(job_type, move |payload: serde_json::Value| {
            Box::pin(f(payload)) as HandlerFuture
        }));
    }

    /// Get the handler for a job type.
    pub fn lookup(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    /// Check if a handler exists for a job type.
    pub fn has_handler(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// List all registered job types.
    pub fn job_types(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

/// A simple function-based job handler.
pub struct FnHandler<F>
where
    F: Fn(serde_json::Value) -> HandlerFuture + Send + Sync + 'static,
{
    job_type: String,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(serde_json::Value) -> HandlerFuture + Send + Sync + 'static,
{
    /// Create a new function-based handler.
    pub fn new(job_type: impl Into<String>, handler: F) -> Self {
        Self {
            job_type: job_type.into(),
            handler,
        }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> HandlerFuture + Send + Sync + 'static,
{
    fn job_type(&self) -> &str {
        &self.job_type
    }

    fn handle(&self, payload: serde_json::Value) -> HandlerFuture {
        (self.handler)(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn lookup_dispatches_by_type() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("echo", |payload| async move { Ok(payload) });
        registry.register(FnHandler::new("fail", |_: serde_json::Value| {
            Box::pin(async { Err::<serde_json::Value, _>("nope".to_string()) })
        }));

        assert!(registry.has_handler("echo"));
        assert!(registry.lookup("crawl").is_none());

        let echo = registry.lookup("echo").unwrap();
        assert_eq!(echo.handle(json!({"a": 1})).await, Ok(json!({"a": 1})));

        let fail = registry.lookup("fail").unwrap();
        assert_eq!(fail.handle(json!(null)).await, Err("nope".to_string()));

        let mut types = registry.job_types();
        types.sort();
        assert_eq!(types, vec!["echo", "fail"]);
    }
}
