//! Run-lifecycle hook bus. A plain fan-out observer: hooks run in
//! registration order, and a panicking/erroring hook is logged and
//! skipped rather than allowed to take down the run. This is unlike a
//! `tokio::broadcast` channel (no buffering, no lagging receivers) and
//! unlike a short-circuiting hook chain (no hook can veto or rewrite an
//! event) — every hook always sees every event for its instance.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{ProblemStatement, StepOutput};

/// Observer invoked at the six points in a batch run's lifecycle.
/// Default bodies are no-ops so implementors only override what they
/// care about.
#[async_trait]
pub trait RunHook: Send + Sync {
    /// Fired once, before any instance is scheduled.
    async fn on_init(&self) -> crate::error::Result<()> {
        Ok(())
    }

    /// Fired once the batch's workers begin pulling instances.
    async fn on_run_start(&self) -> crate::error::Result<()> {
        Ok(())
    }

    /// Fired when a worker picks up `problem` for execution, before the
    /// sandbox starts. `index` is the instance's position in the batch.
    async fn on_instance_start(&self, index: usize, problem: &ProblemStatement) -> crate::error::Result<()> {
        let _ = (index, problem);
        Ok(())
    }

    /// Fired after each successful `agent.step()` that the team
    /// orchestrator appends to the trajectory.
    async fn on_step_done(&self, step: &StepOutput, info: &Value) -> crate::error::Result<()> {
        let _ = (step, info);
        Ok(())
    }

    /// Fired once an instance's sandbox has been closed and its
    /// prediction recorded.
    async fn on_instance_completed(&self, result: &Value) -> crate::error::Result<()> {
        let _ = result;
        Ok(())
    }

    /// Fired once, after every worker has finished (or the batch was
    /// halted by a batch-fatal error).
    async fn on_run_done(&self, trajectory: &[StepOutput], info: &Value) -> crate::error::Result<()> {
        let _ = (trajectory, info);
        Ok(())
    }
}

/// Registration-order fan-out over a set of `RunHook`s.
#[derive(Clone, Default)]
pub struct HookBus {
    hooks: Vec<Arc<dyn RunHook>>,
}

impl HookBus {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn register(&mut self, hook: Arc<dyn RunHook>) {
        self.hooks.push(hook);
    }

    pub async fn on_init(&self) {
        for hook in &self.hooks {
            if let Err(err) = hook.on_init().await {
                tracing::warn!(error = %err, "hook on_init failed");
            }
        }
    }

    pub async fn on_run_start(&self) {
        for hook in &self.hooks {
            if let Err(err) = hook.on_run_start().await {
                tracing::warn!(error = %err, "hook on_run_start failed");
            }
        }
    }

    pub async fn on_instance_start(&self, index: usize, problem: &ProblemStatement) {
        for hook in &self.hooks {
            if let Err(err) = hook.on_instance_start(index, problem).await {
                tracing::warn!(error = %err, instance = %problem.id, "hook on_instance_start failed");
            }
        }
    }

    pub async fn on_step_done(&self, step: &StepOutput, info: &Value) {
        for hook in &self.hooks {
            if let Err(err) = hook.on_step_done(step, info).await {
                tracing::warn!(error = %err, "hook on_step_done failed");
            }
        }
    }

    pub async fn on_instance_completed(&self, result: &Value) {
        for hook in &self.hooks {
            if let Err(err) = hook.on_instance_completed(result).await {
                tracing::warn!(error = %err, "hook on_instance_completed failed");
            }
        }
    }

    pub async fn on_run_done(&self, trajectory: &[StepOutput], info: &Value) {
        for hook in &self.hooks {
            if let Err(err) = hook.on_run_done(trajectory, info).await {
                tracing::warn!(error = %err, "hook on_run_done failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHook {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RunHook for CountingHook {
        async fn on_init(&self) -> crate::error::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHook;

    #[async_trait]
    impl RunHook for FailingHook {
        async fn on_init(&self) -> crate::error::Result<()> {
            Err(crate::error::Error::Hook("boom".into()))
        }
    }

    #[tokio::test]
    async fn hooks_run_in_registration_order_and_survive_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bus = HookBus::new();
        bus.register(Arc::new(FailingHook));
        bus.register(Arc::new(CountingHook { calls: calls.clone() }));
        bus.on_init().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
