//! Prompt assembly from a [`PostRequest`].
//!
//! Fragments are appended in a fixed order: post-type opening, property
//! list, type-specific fields, general fields, creative guideline and the
//! global extension. Nothing is inserted between fragments.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::post::{PostRequest, PostType, GENERAL_FIELDS};
use super::templates;
use crate::error::AppResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptConstructor;

impl PromptConstructor {
    pub fn new() -> Self {
        PromptConstructor
    }

    /// Build the prompt text for `request`. Fails with `InvalidPostType`
    /// before producing anything when the post type is absent or unknown.
    pub fn construct_prompt(&self, request: &PostRequest) -> AppResult<String> {
        let post_type = request.parsed_post_type()?;
        let mut parts: Vec<String> = Vec::new();

        parts.push(templates::opening(post_type).to_string());

        let properties = templates::properties(post_type)
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect::<Vec<_>>();
        if !properties.is_empty() {
            parts.push(format!("{}. ", properties.join("; ")));
        }

        for &field in templates::fields(post_type).iter().chain(GENERAL_FIELDS.iter()) {
            if let Some(value) = request.value(field) {
                parts.push(templates::field_fragment(field, &value));
            }
        }

        parts.push(templates::creative_guideline(post_type).to_string());
        parts.push(templates::EXTENSION.to_string());

        Ok(parts.concat())
    }

    /// Describe which fields a post type reads, with placeholder examples.
    pub fn form(&self, post_type: PostType) -> PromptForm {
        let required: Vec<&'static str> = templates::fields(post_type).iter().map(|f| f.name()).collect();
        let optional: Vec<&'static str> = GENERAL_FIELDS.iter().map(|f| f.name()).collect();
        let mut example = Map::new();
        for name in required.iter().chain(optional.iter()) {
            example.insert((*name).to_string(), Value::String(format!("example_{}", name)));
        }
        PromptForm {
            post_type: post_type.as_str(),
            required_fields: required,
            optional_fields: optional,
            example,
        }
    }

    /// Instruction prompt asking an LLM for a caption and hashtags that
    /// match an already generated image.
    pub fn caption_prompt(&self, request: &CaptionRequest) -> String {
        format!(
            r#"
    You are an expert social media strategist and AI image analyst. Your task is to generate a creative and engaging caption along with relevant hashtags for an AI-generated image.

    **Image Details:**
    - **Positive Prompt:** {positive}
    - **Negative Prompt:** {negative}

    **Instructions:**
    1. Understand the theme, subject, and mood from the positive prompt.
    2. Ensure elements in the negative prompt are avoided.
    3. Generate a concise and captivating caption (within 15 words).
    4. Provide 10-15 hashtags that are relevant, balancing popular and niche keywords.

    **Output Format (strictly follow this structure):**
    Caption: "Your creative caption here."
    Hashtags: #hashtag1 #hashtag2 #hashtag3 ... #hashtag15
    "#,
            positive = request.positive_prompt,
            negative = request.negative_prompt,
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptForm {
    pub post_type: &'static str,
    pub required_fields: Vec<&'static str>,
    pub optional_fields: Vec<&'static str>,
    pub example: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptionRequest {
    pub positive_prompt: String,
    pub negative_prompt: String,
}
