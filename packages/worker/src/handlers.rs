//! Demo job handlers.

use std::time::Duration;

use queue_actors::HandlerRegistry;
use serde_json::{Value, json};

/// Handlers for the `echo`, `sleep` and `fail` demo job types.
pub fn demo_handlers() -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();

    handlers.register_fn("echo", |payload: Value| async move {
        tracing::info!("Echo job: {}", payload);
        Ok(payload)
    });

    handlers.register_fn("sleep", |payload: Value| async move {
        let seconds = payload.get("seconds").and_then(Value::as_u64).unwrap_or(5);
        tracing::info!("Sleeping for {} seconds", seconds);
        tokio::time::sleep(Duration::from_secs(seconds)).await;
        Ok(json!({ "slept_secs": seconds }))
    });

    // Fails unless the payload says otherwise, for exercising retries.
    handlers.register_fn("fail", |payload: Value| async move {
        let should_fail = payload.get("fail").and_then(Value::as_bool).unwrap_or(true);
        if should_fail {
            Err("Intentional failure".to_string())
        } else {
            Ok(json!("Success"))
        }
    });

    handlers
}
