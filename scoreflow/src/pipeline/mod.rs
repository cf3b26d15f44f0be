//! Pipeline assembly.
//!
//! This module provides:
//! - Stage descriptors and the comment-tolerant pipeline document
//! - The registry-driven pipeline assembler
//! - The immutable assembled pipeline shared by scoring workers
//! - Failure policy and run bookkeeping

mod assembled;
mod builder;
mod failure_tolerance;
mod spec;

#[cfg(test)]
mod integration_tests;

pub use assembled::AssembledPipeline;
pub use builder::PipelineAssembler;
pub use failure_tolerance::{BatchFailure, FailureCollector, FailurePolicy, ScoreSummary};
pub use spec::{PipelineDocument, PipelineSpec, StageDescriptor};
