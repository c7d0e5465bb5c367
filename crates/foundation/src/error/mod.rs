//! Central error taxonomy shared by every layer of the crate.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy driving retry/propagation decisions at every boundary.
#[derive(Error, Debug)]
pub enum Error {
    /// Fatal, pre-run: invalid agent YAML, missing fields, no instances, bad flag combos.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Per-instance fatal: image pull failed, runtime never came alive, container died mid-run.
    #[error("deployment error: {0}")]
    Deployment(String),

    /// Per-instance recoverable up to `max_requeries`: malformed model output, tool failure.
    #[error("agent step error: {0}")]
    AgentStep(String),

    /// Batch-fatal. Propagates as `_BreakLoop`: halts new instance scheduling, lets in-flight finish.
    #[error("cost limit exceeded: {0}")]
    CostLimitExceeded(String),

    /// Logged, never propagated.
    #[error("hook error: {0}")]
    Hook(String),

    /// Logged at warn, treated as non-handoff.
    #[error("handoff parse error: {0}")]
    HandoffParse(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("http error: {0}")]
    Http(String),

    #[error("docker error: {0}")]
    Docker(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the *instance* this error occurred in should be retried rather than aborted.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Http(_) | Error::Docker(_))
    }

    /// Whether the error must halt the entire batch (the `_BreakLoop` sentinel in the source).
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Error::CostLimitExceeded(_))
    }

    /// Whether the error is fatal to the batch as a whole before any instance has started.
    pub fn is_configuration_fatal(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// Short, stable code recorded as a `StepOutput`/batch-result `exit_status`
    /// (e.g. `results.json`), distinct from the human-readable `Display` text.
    pub fn exit_status_code(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration_error",
            Error::Deployment(_) => "deployment_error",
            Error::AgentStep(_) => "agent_step_error",
            Error::CostLimitExceeded(_) => "cost_limit",
            Error::Hook(_) => "hook_error",
            Error::HandoffParse(_) => "handoff_parse_error",
            Error::Timeout(_) => "timeout",
            Error::NotFound(_) => "not_found",
            Error::InvalidInput(_) => "invalid_input",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Yaml(_) => "yaml_error",
            Error::Http(_) => "http_error",
            Error::Docker(_) => "docker_error",
            Error::Internal(_) => "internal_error",
        }
    }

    pub fn deployment(msg: impl Into<String>) -> Self {
        Error::Deployment(msg.into())
    }

    pub fn agent_step(msg: impl Into<String>) -> Self {
        Error::AgentStep(msg.into())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_limit_is_batch_fatal_only() {
        assert!(Error::CostLimitExceeded("model spend".into()).is_batch_fatal());
        assert!(!Error::AgentStep("bad json".into()).is_batch_fatal());
    }

    #[test]
    fn timeout_and_http_are_retryable() {
        assert!(Error::Timeout("startup".into()).is_retryable());
        assert!(Error::Http("connection reset".into()).is_retryable());
        assert!(!Error::Configuration("missing field".into()).is_retryable());
    }

    #[test]
    fn exit_status_code_is_short_and_stable() {
        assert_eq!(Error::CostLimitExceeded("model spend".into()).exit_status_code(), "cost_limit");
        assert_eq!(Error::Timeout("startup".into()).exit_status_code(), "timeout");
    }
}
