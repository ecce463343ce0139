//! Values exchanged with the ComfyUI backend.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

pub const ALLOWED_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "gif", "bmp", "tiff", "webp"];

/// Accepted `/prompt` submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub prompt_id: String,
    /// Backend response as received (`prompt_id`, `number`, `node_errors`).
    pub raw: Value,
}

/// Reference to one output image inside a history manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_output_type")]
    pub folder_type: String,
}

fn default_output_type() -> String {
    "output".to_string()
}

/// Image bytes fetched from `/view`.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn content_type(&self) -> &'static str {
        match extension(&self.filename).as_deref() {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("bmp") => "image/bmp",
            Some("tiff") => "image/tiff",
            Some("webp") => "image/webp",
            _ => "image/png",
        }
    }
}

/// A file to push through `/upload/{image_type}`.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub folder_type: String,
    pub image_type: String,
    pub overwrite: bool,
}

impl ImageUpload {
    /// Input-folder upload that never overwrites.
    pub fn input(filename: String, bytes: Vec<u8>) -> Self {
        ImageUpload {
            filename,
            bytes,
            folder_type: "input".to_string(),
            image_type: "image".to_string(),
            overwrite: false,
        }
    }
}

/// Backend answer to an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub name: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub folder_type: String,
}

fn extension(filename: &str) -> Option<String> {
    filename.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

/// Lower-cased extension of `filename`, if it is an allowed image type.
pub fn allowed_extension(filename: &str) -> AppResult<String> {
    match extension(filename) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(ext),
        _ => Err(AppError::InvalidInput(format!(
            "Invalid file type for '{}'. Only PNG, JPG, JPEG, GIF, BMP, TIFF, and WEBP are allowed.",
            filename
        ))),
    }
}
