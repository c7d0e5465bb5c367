//! Handoff detection (§4.5): recognizes the in-band `__SPECIAL_TOOL__`
//! envelope and structured `tool_calls` entries naming `"handoff"`.
//! Gated entirely by the acting agent's `enable_handoff_tool` flag.

use serde::Deserialize;
use serde_json::Value;

use teamcore_foundation::StepOutput;

const SPECIAL_TOOL_PREFIX: &str = "__SPECIAL_TOOL__";

#[derive(Debug, Deserialize)]
struct SpecialToolEnvelope {
    function: SpecialToolFunction,
}

#[derive(Debug, Deserialize)]
struct SpecialToolFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Returns `true` if `step` requests a handoff, given whether the
/// acting agent has the handoff tool enabled. Parse failures in the
/// `__SPECIAL_TOOL__` envelope are logged at warn and treated as
/// non-handoff, never as an error.
pub fn is_handoff(step: &StepOutput, enable_handoff_tool: bool) -> bool {
    if !enable_handoff_tool {
        return false;
    }

    if let Some(rest) = step.action.strip_prefix(SPECIAL_TOOL_PREFIX) {
        match serde_json::from_str::<SpecialToolEnvelope>(rest) {
            Ok(envelope) => {
                if envelope.function.name.eq_ignore_ascii_case("handoff") {
                    if let Some(message) = envelope.function.arguments.get("message").and_then(|v| v.as_str()) {
                        tracing::info!(message, "handoff requested via special-tool envelope");
                    }
                    return true;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, action = %step.action, "failed to parse __SPECIAL_TOOL__ envelope");
            }
        }
    }

    if let Some(tool_calls) = &step.tool_calls {
        for call in tool_calls {
            if call.is_handoff() {
                if let Some(message) = call.arguments.get("message").and_then(|v| v.as_str()) {
                    tracing::info!(message, "handoff requested via tool_calls");
                }
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use teamcore_foundation::ToolCall;

    fn step_with_action(action: &str) -> StepOutput {
        StepOutput {
            thought: String::new(),
            action: action.to_string(),
            output: String::new(),
            observation: String::new(),
            tool_calls: None,
            tool_call_ids: None,
            state: Default::default(),
            submission: None,
            exit_status: None,
            done: false,
            current_step_retries: 0,
        }
    }

    #[test]
    fn special_tool_envelope_is_detected() {
        let step = step_with_action(r#"__SPECIAL_TOOL__{"function":{"name":"handoff","arguments":{}}}"#);
        assert!(is_handoff(&step, true));
    }

    #[test]
    fn disabled_handoff_tool_suppresses_detection() {
        let step = step_with_action(r#"__SPECIAL_TOOL__{"function":{"name":"handoff","arguments":{}}}"#);
        assert!(!is_handoff(&step, false));
    }

    #[test]
    fn malformed_envelope_is_treated_as_non_handoff() {
        let step = step_with_action("__SPECIAL_TOOL__not json");
        assert!(!is_handoff(&step, true));
    }

    #[test]
    fn structured_tool_call_named_handoff_is_detected() {
        let mut step = step_with_action("ls");
        step.tool_calls = Some(vec![ToolCall { name: "HANDOFF".to_string(), arguments: serde_json::json!({}) }]);
        assert!(is_handoff(&step, true));
    }

    #[test]
    fn non_handoff_action_is_not_detected() {
        let step = step_with_action("ls -la");
        assert!(!is_handoff(&step, true));
    }
}
