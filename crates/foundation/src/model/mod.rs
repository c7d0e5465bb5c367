//! Shared data model: the records that flow between the scheduler, the
//! context propagator, the team orchestrator and the sandbox/evaluator
//! boundary. None of these types know how an agent decides what to do;
//! they only describe what was decided.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The task handed to a team: a stable id plus an opaque text payload.
/// `extra_fields` preserves whatever metadata the original instance
/// carried (repo, base_commit, ...) for hooks that need it downstream,
/// e.g. the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemStatement {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub extra_fields: HashMap<String, serde_json::Value>,
}

/// Sandbox image and boot parameters for one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSpec {
    pub image: String,
    #[serde(default)]
    pub startup_timeout: Option<u64>,
}

/// One unit of batch work: a problem paired with the sandbox it runs in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchInstance {
    pub problem: ProblemStatement,
    pub sandbox: SandboxSpec,
}

/// Standard chat roles carried on a `Message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Distinguishes why a message was appended, independent of its role.
/// The context propagator branches on this when deciding how to render
/// a step into a peer's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Action,
    Observation,
    NonToolThought,
    System,
}

/// A requested tool invocation. The reserved name `"handoff"` never runs
/// in the sandbox; it is an in-band signal consumed by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn is_handoff(&self) -> bool {
        self.name.eq_ignore_ascii_case("handoff")
    }
}

/// One entry in an agent's history, or in a peer's history after
/// propagation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub agent: String,
    pub message_type: MessageType,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default)]
    pub tool_call_ids: Option<Vec<String>>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>, agent: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            role,
            content: content.into(),
            agent: agent.into(),
            message_type,
            tool_calls: None,
            tool_call_ids: None,
        }
    }
}

/// What an agent's `step()` produced. `done=true` ends the run;
/// `action` may carry the `__SPECIAL_TOOL__` envelope described in the
/// handoff-detection module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutput {
    pub thought: String,
    pub action: String,
    pub output: String,
    pub observation: String,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default)]
    pub tool_call_ids: Option<Vec<String>>,
    #[serde(default)]
    pub state: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub submission: Option<String>,
    #[serde(default)]
    pub exit_status: Option<String>,
    pub done: bool,
    /// Retries the agent consumed internally producing this step.
    #[serde(default)]
    pub current_step_retries: u32,
}

/// How a source agent's step is shared into a peer's history. Computed
/// by the context propagator's decision matrix, not stored on `Message`
/// itself — it governs *which* shape of message gets appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingPolicy {
    FullContext,
    ToolResultOnly,
    ThoughtOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handoff_name_matches_case_insensitively() {
        let call = ToolCall { name: "HandOff".into(), arguments: serde_json::json!({}) };
        assert!(call.is_handoff());
    }

    #[test]
    fn problem_statement_round_trips_extra_fields() {
        let ps = ProblemStatement {
            id: "django__django-1".into(),
            text: "fix the bug".into(),
            extra_fields: HashMap::from([("repo".to_string(), serde_json::json!("django/django"))]),
        };
        let json = serde_json::to_string(&ps).unwrap();
        let back: ProblemStatement = serde_json::from_str(&json).unwrap();
        assert_eq!(back.extra_fields.get("repo").unwrap(), "django/django");
    }
}
