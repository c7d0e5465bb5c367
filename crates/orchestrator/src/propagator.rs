//! Context Propagator (C4): after the acting agent's step, writes
//! exactly one coherent record into each peer's history, shaped by the
//! peer's own config and by whether a handoff was requested. Never
//! touches the source agent — the broadcast view handed in here is
//! already a detached copy (see `team::broadcast_view`).

use teamcore_foundation::{Message, MessageRole, MessageType, StepOutput};

use crate::agent::{Agent, Templates};

/// The subset of the acting agent's identity/config the propagator
/// needs, captured before the peer loop so peers can be borrowed
/// mutably one at a time without aliasing the source agent.
pub struct SourceContext {
    pub name: String,
    pub templates: Templates,
    pub share_only_tool_results: bool,
    pub not_using_tools: bool,
}

/// Applies the §4.3 decision matrix for one peer. `step` is the
/// broadcast view (output already rewritten to `"[{src}]: {thought}"`);
/// `handoff` is whether this step was detected as a handoff request.
pub fn propagate_step(src: &SourceContext, step: &StepOutput, handoff: bool, peer: &mut dyn Agent) {
    if handoff {
        peer.add_step_to_history(step, &src.name);
        return;
    }

    if src.share_only_tool_results && !src.not_using_tools {
        share_tool_results_only(src, step, peer);
        return;
    }

    if src.not_using_tools {
        peer.append_history(Message::new(
            MessageRole::Assistant,
            step.thought.clone(),
            src.name.clone(),
            MessageType::NonToolThought,
        ));
        return;
    }

    // Full-context share; strip tool fields defensively if the source
    // claims not to use tools (should not happen given the branch
    // above, kept for parity with the source's defensive check).
    if src.not_using_tools {
        let mut stripped = step.clone();
        stripped.tool_calls = None;
        stripped.tool_call_ids = None;
        peer.add_step_to_history(&stripped, &src.name);
    } else {
        peer.add_step_to_history(step, &src.name);
    }
}

fn share_tool_results_only(src: &SourceContext, step: &StepOutput, peer: &mut dyn Agent) {
    if step.observation.is_empty() {
        return;
    }

    let has_tool_calls = step.tool_calls.as_ref().is_some_and(|v| !v.is_empty());
    let has_tool_call_ids = step.tool_call_ids.as_ref().is_some_and(|v| !v.is_empty());

    if has_tool_calls && has_tool_call_ids {
        peer.append_history(Message::new(
            MessageRole::Assistant,
            format!("driver used tool: {}", step.action),
            src.name.clone(),
            MessageType::Action,
        ));

        let rendered = src.templates.render(&step.observation, &step.state);
        peer.append_history(Message::new(MessageRole::User, rendered, peer.name().to_string(), MessageType::Observation));
    } else {
        let rendered = src.templates.render(&step.observation, &step.state);
        let content = format!("[{}]: {}", peer.name(), rendered);
        peer.append_history(Message::new(MessageRole::User, content, peer.name().to_string(), MessageType::Observation));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ScriptedAgent;
    use teamcore_foundation::ToolCall;
    use std::collections::HashMap;

    fn src_ctx(share_only_tool_results: bool, not_using_tools: bool) -> SourceContext {
        SourceContext {
            name: "A".to_string(),
            templates: Templates::default(),
            share_only_tool_results,
            not_using_tools,
        }
    }

    fn base_step() -> StepOutput {
        StepOutput {
            thought: "planning".to_string(),
            action: "ls".to_string(),
            output: "[A]: planning".to_string(),
            observation: String::new(),
            tool_calls: None,
            tool_call_ids: None,
            state: HashMap::new(),
            submission: None,
            exit_status: None,
            done: false,
            current_step_retries: 0,
        }
    }

    #[test]
    fn tool_result_only_share_produces_two_entries_without_structured_tool_calls() {
        let src = src_ctx(true, false);
        let mut step = base_step();
        step.observation = "file.txt".to_string();
        step.tool_calls = Some(vec![ToolCall { name: "bash".to_string(), arguments: serde_json::json!({}) }]);
        step.tool_call_ids = Some(vec!["t1".to_string()]);

        let mut peer = ScriptedAgent::new("B", vec![]);
        propagate_step(&src, &step, false, &mut peer);

        let history = peer.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "driver used tool: ls");
        assert!(history[0].tool_calls.is_none());
        assert!(history[1].content.contains("file.txt"));
    }

    #[test]
    fn empty_observation_produces_no_entries() {
        let src = src_ctx(true, false);
        let step = base_step();
        let mut peer = ScriptedAgent::new("B", vec![]);
        propagate_step(&src, &step, false, &mut peer);
        assert!(peer.history().is_empty());
    }

    #[test]
    fn no_tool_peer_receives_thought_only_with_no_tool_fields() {
        let src = src_ctx(false, true);
        let step = base_step();
        let mut peer = ScriptedAgent::new("B", vec![]);
        propagate_step(&src, &step, false, &mut peer);

        let history = peer.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "planning");
        assert_eq!(history[0].message_type, MessageType::NonToolThought);
        assert!(history[0].tool_calls.is_none());
        assert!(history[0].tool_call_ids.is_none());
    }

    #[test]
    fn handoff_forces_full_context_share_regardless_of_policy() {
        let src = src_ctx(true, false);
        let step = base_step();
        let mut peer = ScriptedAgent::new("B", vec![]);
        propagate_step(&src, &step, true, &mut peer);
        assert_eq!(peer.history().len(), 1);
    }

    #[test]
    fn observation_truncation_reports_elided_chars() {
        let mut src = src_ctx(true, false);
        src.templates.max_observation_length = 10;
        let mut step = base_step();
        step.observation = "0123456789ABCDEF".to_string();
        step.tool_calls = Some(vec![ToolCall { name: "bash".to_string(), arguments: serde_json::json!({}) }]);
        step.tool_call_ids = Some(vec!["t1".to_string()]);

        let mut peer = ScriptedAgent::new("B", vec![]);
        propagate_step(&src, &step, false, &mut peer);

        let history = peer.history();
        assert!(history[1].content.contains("0123456789"));
        assert!(!history[1].content.contains("ABCDEF"));
        assert!(history[1].content.contains("6 chars elided"));
    }
}
