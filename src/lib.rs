//! ComfyUI post relay library
//!
//! Modules:
//! - `api`: Axum HTTP handlers and router setup used by the binary.
//! - `comfyui`: REST client and realtime channel for the ComfyUI backend.
//! - `flows`: End-to-end flows (`Relay`) composed from the other modules.
//! - `inference`: Prompt refinement against a hosted inference endpoint.
//! - `prompt`: Template-driven prompt assembly for social-media posts.
//! - `trends`: Google News RSS lookups.
//! - `workflow`: Loading and patching ComfyUI job graphs.
//! - `config`: Env-driven configuration loader.
//! - `error`: Common error type and alias.
//!
//! Re-exports are provided for common types: `Config`, `ComfyUIClient`,
//! `PromptConstructor`, and `Relay`.
pub mod api;
pub mod comfyui;
pub mod config;
pub mod error;
pub mod flows;
pub mod inference;
pub mod prompt;
pub mod trends;
pub mod workflow;

pub use comfyui::client::ComfyUIClient;
pub use config::Config;
pub use flows::Relay;
pub use prompt::constructor::PromptConstructor;
