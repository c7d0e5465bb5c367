//! # foundation
//!
//! Shared data model, error taxonomy, layered configuration, hook bus
//! and logging init used by the orchestrator, sandbox and CLI crates.

pub mod config;
pub mod error;
pub mod hookbus;
pub mod logging;
pub mod model;

pub use error::{Error, Result};
pub use hookbus::{HookBus, RunHook};
pub use model::{
    BatchInstance, Message, MessageRole, MessageType, ProblemStatement, SandboxSpec,
    SharingPolicy, StepOutput, ToolCall,
};
