// src/pipeline/mod.rs
//! Multi-step pipelines
//!
//! - **Orchestrator**: Sequential/parallel/conditional execution of steps
//! - **Definition**: YAML pipeline files turned into runnable steps

pub mod definition;
pub mod orchestrator;

pub use definition::{ConditionSpec, PipelineDefinition, StepDefinition};
pub use orchestrator::{condition_holds, group_mode, GroupMode, PipelineOrchestrator};
