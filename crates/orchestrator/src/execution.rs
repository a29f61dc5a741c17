//! Agent execution layer.
//!
//! Runs every capability of a step concurrently and waits for all of
//! them. Each invocation is guarded by the freshness cache, and handler
//! errors or panics become failed [`CapabilityResult`]s so one capability
//! can never take down its siblings.

use concierge_config::CacheConfig;
use concierge_core::cache::{CacheKey, FreshnessCache};
use concierge_core::capability::{CapabilityHandle, CapabilityRequest, CapabilityResult};
use concierge_core::error::CapabilityError;
use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::planner::Step;

/// How an invocation may use the freshness cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Serve fresh entries and store new successes.
    ReadWrite,
    /// Always run the handler; still store new successes. Used on retries.
    Bypass,
}

pub struct AgentExecutor {
    cache: Arc<dyn FreshnessCache>,
    ttls: CacheConfig,
}

impl AgentExecutor {
    pub fn new(cache: Arc<dyn FreshnessCache>, ttls: CacheConfig) -> Self {
        Self { cache, ttls }
    }

    /// Run every capability of `step`. Results keep the step's capability order.
    pub async fn execute_step(
        &self,
        user_id: &str,
        step: &Step,
        input: &str,
        mode: CacheMode,
    ) -> Vec<CapabilityResult> {
        let request = CapabilityRequest {
            user_id: user_id.to_string(),
            input: input.to_string(),
            goal: step.goal().to_string(),
        };

        join_all(
            step.capabilities()
                .iter()
                .map(|handle| self.invoke(handle, &request, mode)),
        )
        .await
    }

    async fn invoke(
        &self,
        handle: &CapabilityHandle,
        request: &CapabilityRequest,
        mode: CacheMode,
    ) -> CapabilityResult {
        let name = handle.name();
        let handler = handle.handler();
        let key = handler.resource_type().map(|rt| {
            let key = CacheKey::new(&request.user_id, name, rt);
            match handler.cache_scope(request) {
                Some(scope) => key.with_scope(scope),
                None => key,
            }
        });

        if let (Some(key), CacheMode::ReadWrite) = (&key, mode) {
            match self.cache.get(key).await {
                Ok(Some(data)) => {
                    debug!(capability = name, key = %key, "Freshness cache hit");
                    return CapabilityResult::cached(name, data);
                }
                Ok(None) => {}
                Err(e) => warn!(capability = name, error = %e, "Cache read failed, treating as miss"),
            }
        }

        let outcome = AssertUnwindSafe(handler.execute(request))
            .catch_unwind()
            .await;

        let data = match outcome {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                warn!(capability = name, error = %e, "Capability failed");
                return CapabilityResult::failed(name, e.to_string());
            }
            Err(payload) => {
                let err = CapabilityError::Panicked {
                    capability: name.to_string(),
                    message: panic_message(payload.as_ref()),
                };
                warn!(capability = name, error = %err, "Capability panicked");
                return CapabilityResult::failed(name, err.to_string());
            }
        };

        if let Some(key) = &key {
            let ttl = self.ttls.ttl_for(&key.resource_type);
            if let Err(e) = self.cache.put(key, data.clone(), ttl).await {
                warn!(capability = name, error = %e, "Cache write failed");
            }
        }

        CapabilityResult::ok(name, data)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
