//! Post descriptions submitted by clients and the closed set of post types.
use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A social-media post description. Every field is optional; the assembler
/// only reads the ones that are present for the requested post type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostRequest {
    pub post_type: Option<String>,
    pub brand_name: Option<String>,
    pub message: Option<String>,
    pub font: Option<String>,
    pub colors: Option<String>,
    pub festival_name: Option<String>,
    pub theme: Option<String>,
    pub event_desc: Option<String>,
    pub product_desc: Option<String>,
    pub achievement: Option<String>,
    pub job_desc: Option<String>,
    pub trend: Option<String>,
    pub platform: Option<String>,
    pub logo_position: Option<String>,
    pub aspect_ratio: Option<String>,
    pub tags: Option<Vec<String>>,
    pub keywords: Option<Vec<String>>,
    pub overlay_text: Option<BTreeMap<String, String>>,
}

impl PostRequest {
    /// Resolve `post_type` into a known variant.
    pub fn parsed_post_type(&self) -> Result<PostType, AppError> {
        match self.post_type.as_deref() {
            Some(raw) => raw.parse(),
            None => Err(AppError::InvalidPostType("post_type is required".to_string())),
        }
    }

    /// The value of `field`, if present and not blank.
    pub fn value(&self, field: PostField) -> Option<FieldValue<'_>> {
        let value = match field {
            PostField::BrandName => self.brand_name.as_deref().map(FieldValue::Text),
            PostField::Message => self.message.as_deref().map(FieldValue::Text),
            PostField::Font => self.font.as_deref().map(FieldValue::Text),
            PostField::Colors => self.colors.as_deref().map(FieldValue::Text),
            PostField::FestivalName => self.festival_name.as_deref().map(FieldValue::Text),
            PostField::Theme => self.theme.as_deref().map(FieldValue::Text),
            PostField::EventDesc => self.event_desc.as_deref().map(FieldValue::Text),
            PostField::ProductDesc => self.product_desc.as_deref().map(FieldValue::Text),
            PostField::Achievement => self.achievement.as_deref().map(FieldValue::Text),
            PostField::JobDesc => self.job_desc.as_deref().map(FieldValue::Text),
            PostField::Trend => self.trend.as_deref().map(FieldValue::Text),
            PostField::Platform => self.platform.as_deref().map(FieldValue::Text),
            PostField::LogoPosition => self.logo_position.as_deref().map(FieldValue::Text),
            PostField::AspectRatio => self.aspect_ratio.as_deref().map(FieldValue::Text),
            PostField::Tags => self.tags.as_deref().map(FieldValue::List),
            PostField::Keywords => self.keywords.as_deref().map(FieldValue::List),
            PostField::OverlayText => self.overlay_text.as_ref().map(FieldValue::Map),
        };
        value.filter(|v| !v.is_blank())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostType {
    Festival,
    ProductLaunch,
    Event,
    Achievement,
    Hiring,
    Trending,
}

impl PostType {
    pub const ALL: [PostType; 6] = [
        PostType::Festival,
        PostType::ProductLaunch,
        PostType::Event,
        PostType::Achievement,
        PostType::Hiring,
        PostType::Trending,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PostType::Festival => "festival",
            PostType::ProductLaunch => "product_launch",
            PostType::Event => "event",
            PostType::Achievement => "achievement",
            PostType::Hiring => "hiring",
            PostType::Trending => "trending",
        }
    }
}

impl FromStr for PostType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        PostType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| AppError::InvalidPostType(s.to_string()))
    }
}

/// Every prompt-relevant field of a [`PostRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostField {
    BrandName,
    Message,
    Font,
    Colors,
    FestivalName,
    Theme,
    EventDesc,
    ProductDesc,
    Achievement,
    JobDesc,
    Trend,
    Platform,
    LogoPosition,
    AspectRatio,
    Tags,
    Keywords,
    OverlayText,
}

/// Fields appended for every post type, after the type-specific ones.
pub const GENERAL_FIELDS: [PostField; 4] = [
    PostField::Message,
    PostField::BrandName,
    PostField::Font,
    PostField::Colors,
];

impl PostField {
    pub fn name(self) -> &'static str {
        match self {
            PostField::BrandName => "brand_name",
            PostField::Message => "message",
            PostField::Font => "font",
            PostField::Colors => "colors",
            PostField::FestivalName => "festival_name",
            PostField::Theme => "theme",
            PostField::EventDesc => "event_desc",
            PostField::ProductDesc => "product_desc",
            PostField::Achievement => "achievement",
            PostField::JobDesc => "job_desc",
            PostField::Trend => "trend",
            PostField::Platform => "platform",
            PostField::LogoPosition => "logo_position",
            PostField::AspectRatio => "aspect_ratio",
            PostField::Tags => "tags",
            PostField::Keywords => "keywords",
            PostField::OverlayText => "overlay_text",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FieldValue<'a> {
    Text(&'a str),
    List(&'a [String]),
    Map(&'a BTreeMap<String, String>),
}

impl FieldValue<'_> {
    fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.iter().all(|s| s.trim().is_empty()),
            FieldValue::Map(map) => map.values().all(|s| s.trim().is_empty()),
        }
    }

    /// Flatten into prompt text: lists comma-separated, maps as `key: "value"` pairs.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(s) => s.trim().to_string(),
            FieldValue::List(items) => items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
            FieldValue::Map(map) => map
                .iter()
                .filter(|(_, v)| !v.trim().is_empty())
                .map(|(k, v)| format!("{}: \"{}\"", k, v.trim()))
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_type_parsing_is_case_insensitive() {
        assert_eq!(" Festival ".parse::<PostType>().unwrap(), PostType::Festival);
        assert_eq!("PRODUCT_LAUNCH".parse::<PostType>().unwrap(), PostType::ProductLaunch);
    }

    #[test]
    fn unknown_post_type_is_rejected() {
        let err = "birthday".parse::<PostType>().unwrap_err();
        assert!(matches!(err, AppError::InvalidPostType(ref s) if s == "birthday"));
    }

    #[test]
    fn blank_values_are_absent() {
        let req = PostRequest {
            brand_name: Some("   ".into()),
            tags: Some(vec!["".into(), " ".into()]),
            message: Some("Hello".into()),
            ..Default::default()
        };
        assert!(req.value(PostField::BrandName).is_none());
        assert!(req.value(PostField::Tags).is_none());
        assert_eq!(req.value(PostField::Message).unwrap().render(), "Hello");
    }

    #[test]
    fn map_values_render_in_key_order() {
        let mut overlay = BTreeMap::new();
        overlay.insert("headline".to_string(), "Sale".to_string());
        overlay.insert("footer".to_string(), "Today only".to_string());
        let req = PostRequest { overlay_text: Some(overlay), ..Default::default() };
        assert_eq!(
            req.value(PostField::OverlayText).unwrap().render(),
            "footer: \"Today only\"; headline: \"Sale\""
        );
    }

    #[test]
    fn post_request_deserializes_partial_json() {
        let req: PostRequest = serde_json::from_value(serde_json::json!({
            "post_type": "festival",
            "festival_name": "Diwali",
            "tags": ["lights", "sweets"]
        }))
        .unwrap();
        assert_eq!(req.festival_name.as_deref(), Some("Diwali"));
        assert_eq!(req.tags.as_ref().map(Vec::len), Some(2));
        assert!(req.brand_name.is_none());
    }
}
