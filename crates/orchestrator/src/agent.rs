//! The Agent contract the orchestrator depends on. The orchestrator
//! never assumes anything about how an agent builds prompts or invokes
//! a model — it only reads/writes the surface below. `ScriptedAgent` is
//! a deterministic reference implementation used to drive the
//! orchestrator's own tests without a real model or sandbox.

use std::collections::VecDeque;

use async_trait::async_trait;

use teamcore_foundation::{Message, MessageRole, MessageType, StepOutput};

/// Templates an agent uses to render a peer's observation into its own
/// history. Owned by the agent, read by the context propagator.
#[derive(Debug, Clone)]
pub struct Templates {
    /// `{observation}` substitution, e.g. `"Observation: {observation}"`.
    pub next_step_template: String,
    /// Used instead of `next_step_template` when the observation exceeds
    /// `max_observation_length`; carries `{observation}` and
    /// `{elided_chars}`.
    pub next_step_truncated_observation_template: String,
    pub max_observation_length: usize,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            next_step_template: "Observation: {observation}".to_string(),
            next_step_truncated_observation_template:
                "Observation (truncated, {elided_chars} chars elided): {observation}".to_string(),
            max_observation_length: 10_000,
        }
    }
}

impl Templates {
    pub fn render(&self, observation: &str, extra: &std::collections::HashMap<String, serde_json::Value>) -> String {
        let (template, observation, elided_chars) = if observation.chars().count() > self.max_observation_length {
            let truncated: String = observation.chars().take(self.max_observation_length).collect();
            let elided = observation.chars().count() - self.max_observation_length;
            (&self.next_step_truncated_observation_template, truncated, elided)
        } else {
            (&self.next_step_template, observation.to_string(), 0)
        };
        let mut rendered = template
            .replace("{observation}", &observation)
            .replace("{elided_chars}", &elided_chars.to_string());
        for (key, value) in extra {
            rendered = rendered.replace(&format!("{{{key}}}"), &value.to_string());
        }
        rendered
    }
}

/// The surface the orchestrator reads and writes on every agent in a
/// team. Implementors decide everything about prompting and model
/// invocation; the orchestrator only sequences calls to `step()` and
/// mutates history through `append_history`/`add_step_to_history`.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Runs one step, internally retrying on model errors up to the
    /// `max_requeries` currently set (see `set_max_requeries`), and
    /// records how many retries it consumed on the returned step's
    /// `current_step_retries`.
    async fn step(&mut self) -> teamcore_foundation::Result<StepOutput>;

    fn history(&self) -> &[Message];
    fn append_history(&mut self, message: Message);

    /// Append a representation of another agent's step to this agent's
    /// own history, used for the handoff full-context share.
    fn add_step_to_history(&mut self, step: &StepOutput, name: &str);

    fn templates(&self) -> &Templates;

    fn share_only_tool_results(&self) -> bool;
    fn not_using_tools(&self) -> bool;
    fn max_consecutive_turns(&self) -> Option<u32>;
    fn enable_handoff_tool(&self) -> bool;

    fn max_requeries_configured(&self) -> u32;
    /// Temporarily narrow the requery budget for the next `step()` call;
    /// the orchestrator restores the configured value afterward.
    fn set_max_requeries(&mut self, value: u32);
}

/// A scripted, replayable agent. Each call to `step()` pops the next
/// pre-recorded `StepOutput` off its script; used to drive the
/// orchestrator's scenario tests (§8) deterministically. Carries no
/// prompt-engineering or model-invocation logic.
pub struct ScriptedAgent {
    name: String,
    script: VecDeque<StepOutput>,
    history: Vec<Message>,
    templates: Templates,
    share_only_tool_results: bool,
    not_using_tools: bool,
    max_consecutive_turns: Option<u32>,
    enable_handoff_tool: bool,
    max_requeries_configured: u32,
    max_requeries_effective: u32,
}

impl ScriptedAgent {
    pub fn new(name: impl Into<String>, script: Vec<StepOutput>) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
            history: Vec::new(),
            templates: Templates::default(),
            share_only_tool_results: false,
            not_using_tools: false,
            max_consecutive_turns: None,
            enable_handoff_tool: true,
            max_requeries_configured: 3,
            max_requeries_effective: 3,
        }
    }

    pub fn share_only_tool_results(mut self, value: bool) -> Self {
        self.share_only_tool_results = value;
        self
    }

    pub fn not_using_tools(mut self, value: bool) -> Self {
        self.not_using_tools = value;
        self
    }

    pub fn max_consecutive_turns(mut self, value: u32) -> Self {
        self.max_consecutive_turns = Some(value);
        self
    }

    pub fn enable_handoff_tool(mut self, value: bool) -> Self {
        self.enable_handoff_tool = value;
        self
    }

    pub fn max_requeries(mut self, value: u32) -> Self {
        self.max_requeries_configured = value;
        self.max_requeries_effective = value;
        self
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn step(&mut self) -> teamcore_foundation::Result<StepOutput> {
        let mut step = self.script.pop_front().ok_or_else(|| {
            teamcore_foundation::Error::AgentStep(format!("{} has no more scripted steps", self.name))
        })?;
        step.current_step_retries = step.current_step_retries.min(self.max_requeries_effective);
        self.history.push(Message::new(MessageRole::Assistant, step.thought.clone(), self.name.clone(), MessageType::Action));
        Ok(step)
    }

    fn history(&self) -> &[Message] {
        &self.history
    }

    fn append_history(&mut self, message: Message) {
        self.history.push(message);
    }

    fn add_step_to_history(&mut self, step: &StepOutput, name: &str) {
        self.history.push(Message::new(MessageRole::Assistant, step.thought.clone(), name, MessageType::Action));
    }

    fn templates(&self) -> &Templates {
        &self.templates
    }

    fn share_only_tool_results(&self) -> bool {
        self.share_only_tool_results
    }

    fn not_using_tools(&self) -> bool {
        self.not_using_tools
    }

    fn max_consecutive_turns(&self) -> Option<u32> {
        self.max_consecutive_turns
    }

    fn enable_handoff_tool(&self) -> bool {
        self.enable_handoff_tool
    }

    fn max_requeries_configured(&self) -> u32 {
        self.max_requeries_configured
    }

    fn set_max_requeries(&mut self, value: u32) {
        self.max_requeries_effective = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_observations_and_reports_elided_chars() {
        let templates = Templates { max_observation_length: 10, ..Templates::default() };
        let rendered = templates.render("0123456789ABCDEF", &Default::default());
        assert!(rendered.contains("0123456789"));
        assert!(rendered.contains("6 chars elided"));
    }

    #[test]
    fn short_observations_use_the_plain_template() {
        let templates = Templates::default();
        let rendered = templates.render("hello", &Default::default());
        assert_eq!(rendered, "Observation: hello");
    }
}
