//! # sandbox
//!
//! The `Deployment` boundary the orchestrator runs instances against,
//! plus its Docker implementation and shared image cache.

pub mod deployment;

pub use deployment::docker::{DockerDeployment, DockerDeploymentConfig};
pub use deployment::{Deployment, LivenessReport, PullPolicy, RuntimeClient};
