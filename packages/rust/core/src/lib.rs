//! Core pipeline orchestration and domain logic for MedIQ.
//!
//! This crate ties together moderation, drug-name detection, passage
//! retrieval, summary drafting, critique, revision, and response
//! assembly into the end-to-end query pipeline ([`engine::PipelineEngine`]).

pub mod assembler;
pub mod context;
pub mod critic;
pub mod engine;
pub mod entities;
pub mod gate;
pub mod retrieval;
pub mod summary;

pub use engine::{PipelineEngine, PipelineObserver, SilentObserver, StagePhase};
