//! Job-graph templates and in-memory patching.
pub mod graph;
