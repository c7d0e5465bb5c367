//! The `Deployment` trait: the boundary between the orchestrator and
//! whatever runs an instance's code (a container, a VM, a remote box).
//! `docker` is the only implementation shipped here, but callers depend
//! on the trait, not the concrete type.

pub mod docker;
pub mod image_cache;
pub mod runtime_client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use teamcore_foundation::Result;

pub use runtime_client::RuntimeClient;

/// How `start()` decides whether to pull the image before launching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullPolicy {
    Never,
    Always,
    /// Pull only if the image is not already present locally or cached.
    Missing,
}

impl Default for PullPolicy {
    fn default() -> Self {
        PullPolicy::Missing
    }
}

/// Result of a liveness probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessReport {
    pub ok: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// A sandbox backend. One instance owns exactly one `Deployment`;
/// `stop()` must be idempotent since the batch runner calls it
/// unconditionally on every exit path (success, error, timeout).
#[async_trait]
pub trait Deployment: Send + Sync {
    /// Pull the image per policy, launch the container, bind a free
    /// host port to the in-container runtime, and block until a
    /// liveness probe succeeds within `startup_timeout`. On timeout the
    /// deployment must stop itself before returning the error.
    async fn start(&mut self) -> Result<()>;

    /// Terminate the container: SIGTERM, wait, escalate to SIGKILL,
    /// give up after 3 kill attempts. Safe to call more than once.
    async fn stop(&mut self) -> Result<()>;

    /// Probe liveness with the given timeout, without raising on
    /// failure — the caller decides what a failed probe means.
    async fn is_alive(&self, timeout_secs: u64) -> Result<LivenessReport>;

    /// The authenticated RPC client tools use to reach the in-container
    /// runtime. Only valid after a successful `start()`.
    fn runtime(&self) -> &RuntimeClient;
}
