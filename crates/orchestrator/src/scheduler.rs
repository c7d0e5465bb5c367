//! Turn Scheduler (C3): picks which agent steps next. Single-threaded,
//! cooperative rotation — a handoff only takes effect on the *next*
//! `next_agent()` call, never preempts an in-flight step.

use std::collections::HashMap;

/// Round-robin rotation with a per-agent consecutive-turn budget.
/// `agents` is the fixed, ordered roster for the team; `max_turns`
/// holds each agent's effective `max_consecutive_turns`.
pub struct TurnScheduler {
    agents: Vec<String>,
    current_idx: usize,
    consecutive_turns: HashMap<String, u32>,
    max_turns: HashMap<String, u32>,
}

impl TurnScheduler {
    pub fn new(agents: Vec<String>, max_turns: HashMap<String, u32>) -> Self {
        let consecutive_turns = agents.iter().map(|a| (a.clone(), 0)).collect();
        Self { agents, current_idx: 0, consecutive_turns, max_turns }
    }

    fn max_turns_of(&self, agent: &str) -> u32 {
        *self.max_turns.get(agent).unwrap_or(&1)
    }

    /// Returns the name of the agent that should take the next step,
    /// advancing internal rotation state.
    pub fn next_agent(&mut self) -> String {
        let cur = self.agents[self.current_idx].clone();
        let t = *self.consecutive_turns.get(&cur).unwrap_or(&0);
        let m = self.max_turns_of(&cur);

        if t == 0 || t < m {
            let entry = self.consecutive_turns.entry(cur.clone()).or_insert(0);
            *entry += 1;
            cur
        } else {
            self.current_idx = (self.current_idx + 1) % self.agents.len();
            let new_cur = self.agents[self.current_idx].clone();
            self.consecutive_turns.insert(new_cur.clone(), 1);
            new_cur
        }
    }

    /// Forces rotation away from `agent` on the next `next_agent()` call.
    pub fn signal_handoff(&mut self, agent: &str) {
        let m = self.max_turns_of(agent);
        self.consecutive_turns.insert(agent.to_string(), m);
    }

    /// Accounts for retried model calls; at most one retry per step
    /// counts toward the rotation quota, biasing sustained failure
    /// toward a faster handoff.
    pub fn signal_retry(&mut self, agent: &str, retries: u32) {
        let entry = self.consecutive_turns.entry(agent.to_string()).or_insert(0);
        *entry += retries.min(1);
    }

    /// Turns `agent` has left before rotation is forced.
    pub fn remaining_turns(&self, agent: &str) -> u32 {
        let t = *self.consecutive_turns.get(agent).unwrap_or(&0);
        let m = self.max_turns_of(agent);
        m.saturating_sub(t)
    }

    /// The effective `max_requeries` to hand an agent for its next step:
    /// never exceeds its remaining-turns budget, and is capped to 1 on
    /// the agent's last allowed turn.
    pub fn effective_max_requeries(&self, agent: &str, configured: u32) -> u32 {
        let remaining = self.remaining_turns(agent);
        let capped = configured.min(remaining);
        if remaining <= 1 {
            capped.min(1)
        } else {
            capped
        }
    }

    pub fn current_idx(&self) -> usize {
        self.current_idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_agent_scheduler(m: u32) -> TurnScheduler {
        TurnScheduler::new(
            vec!["A".to_string(), "B".to_string()],
            HashMap::from([("A".to_string(), m), ("B".to_string(), m)]),
        )
    }

    #[test]
    fn rotation_fairness_s1() {
        let mut sched = two_agent_scheduler(2);
        let sequence: Vec<String> = (0..8).map(|_| sched.next_agent()).collect();
        assert_eq!(sequence, vec!["A", "A", "B", "B", "A", "A", "B", "B"]);
    }

    #[test]
    fn handoff_forces_rotation_on_next_call() {
        let mut sched = two_agent_scheduler(5);
        sched.next_agent(); // A, turn 1
        sched.signal_handoff("A");
        let next = sched.next_agent();
        assert_eq!(next, "B");
    }

    #[test]
    fn effective_max_requeries_never_exceeds_remaining_turns() {
        let mut sched = two_agent_scheduler(3);
        sched.next_agent(); // A turn 1, remaining 2
        sched.next_agent(); // A turn 2, remaining 1
        let effective = sched.effective_max_requeries("A", 5);
        assert!(effective <= 1);
    }

    #[test]
    fn retries_count_at_most_once_per_step() {
        let mut sched = two_agent_scheduler(5);
        sched.next_agent();
        sched.signal_retry("A", 4);
        assert_eq!(sched.remaining_turns("A"), 3);
    }
}
