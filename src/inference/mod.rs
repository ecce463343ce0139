//! Prompt refinement through a hosted inference endpoint.
pub mod client;

pub use client::{PromptPair, PromptRefiner};
