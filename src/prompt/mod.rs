//! Prompt text assembly for social-media posts.
pub mod constructor;
pub mod post;
pub mod templates;

pub use constructor::{CaptionRequest, PromptConstructor, PromptForm};
pub use post::{PostField, PostRequest, PostType};
