//! ComfyUI backend access: REST client and realtime channel.
pub mod client;
pub mod realtime;
pub mod types;

pub use client::ComfyUIClient;
pub use realtime::RealtimeChannel;
pub use types::{Artifact, ImageRef, ImageUpload, Submission, UploadedImage};
