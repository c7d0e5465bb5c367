//! # teamcore-orchestrator
//!
//! The team turn-taking orchestrator (C3-C5 of the core): the scheduler
//! that picks which agent acts next, the context propagator that
//! distributes one agent's step into its peers' histories, the agent
//! contract the rest of this crate depends on but never implements,
//! and the team run loop that ties them together with trajectory
//! persistence.
//!
//! Nothing here knows how an agent builds a prompt or invokes a model —
//! see [`agent::Agent`] for the full boundary.

pub mod agent;
pub mod handoff;
pub mod propagator;
pub mod scheduler;
pub mod team;

pub use agent::{Agent, ScriptedAgent, Templates};
pub use propagator::propagate_step;
pub use scheduler::TurnScheduler;
pub use team::{Team, TeamInfo};
