//! Text fragments the assembler stitches together.
//!
//! Each fragment owns its trailing spacing; the assembler concatenates them
//! as-is.
use super::post::{FieldValue, PostField, PostType};

/// Opening sentence for a post type.
pub fn opening(post_type: PostType) -> &'static str {
    match post_type {
        PostType::Festival => "Create a vibrant festive social media post celebrating a cultural festival. ",
        PostType::ProductLaunch => "Create a sleek, high-impact social media post announcing a new product launch. ",
        PostType::Event => "Create an inviting social media post promoting an upcoming event. ",
        PostType::Achievement => "Create a proud, celebratory social media post highlighting a milestone achievement. ",
        PostType::Hiring => "Create a professional, welcoming social media post announcing a job opening. ",
        PostType::Trending => "Create an eye-catching social media post riding a current trend. ",
    }
}

/// Visual properties listed as `key: value` pairs. Empty values are skipped.
pub fn properties(post_type: PostType) -> &'static [(&'static str, &'static str)] {
    match post_type {
        PostType::Festival => &[
            ("style", "traditional motifs with modern flair"),
            ("mood", "joyful and warm"),
            ("lighting", "glowing, festive lights"),
        ],
        PostType::ProductLaunch => &[
            ("style", "minimal studio product shot"),
            ("mood", "exciting and premium"),
            ("lighting", "soft key light with crisp highlights"),
        ],
        PostType::Event => &[
            ("style", "dynamic poster layout"),
            ("mood", "energetic and inviting"),
            ("lighting", ""),
        ],
        PostType::Achievement => &[
            ("style", "clean celebratory composition"),
            ("mood", "proud and uplifting"),
            ("accent", "confetti or trophy elements"),
        ],
        PostType::Hiring => &[
            ("style", "corporate yet friendly"),
            ("mood", "welcoming and optimistic"),
            ("layout", "clear headline with space for role details"),
        ],
        PostType::Trending => &[
            ("style", "bold meme-aware graphic design"),
            ("mood", "playful and timely"),
        ],
    }
}

/// Type-specific fields, in the order their fragments are appended.
pub fn fields(post_type: PostType) -> &'static [PostField] {
    match post_type {
        PostType::Festival => &[
            PostField::FestivalName,
            PostField::Theme,
            PostField::Platform,
            PostField::AspectRatio,
        ],
        PostType::ProductLaunch => &[
            PostField::ProductDesc,
            PostField::Keywords,
            PostField::Platform,
            PostField::AspectRatio,
            PostField::LogoPosition,
        ],
        PostType::Event => &[
            PostField::EventDesc,
            PostField::Theme,
            PostField::Platform,
            PostField::AspectRatio,
        ],
        PostType::Achievement => &[PostField::Achievement, PostField::OverlayText, PostField::Platform],
        PostType::Hiring => &[PostField::JobDesc, PostField::OverlayText, PostField::LogoPosition],
        PostType::Trending => &[PostField::Trend, PostField::Tags, PostField::Keywords, PostField::Platform],
    }
}

/// Closing creative direction for a post type.
pub fn creative_guideline(post_type: PostType) -> &'static str {
    match post_type {
        PostType::Festival => "Blend cultural symbolism with contemporary design and keep the greeting legible. ",
        PostType::ProductLaunch => "Make the product the hero of the frame with generous negative space. ",
        PostType::Event => "Make the date, venue and call to action easy to scan at a glance. ",
        PostType::Achievement => "Celebrate the team behind the milestone without clutter. ",
        PostType::Hiring => "Convey a positive workplace culture and make applying feel approachable. ",
        PostType::Trending => "Reference the trend tastefully while staying on brand. ",
    }
}

/// Appended to every prompt.
pub const EXTENSION: &str =
    "Ensure high resolution, balanced composition, and text that is sharp and readable on mobile screens.";

/// Render one field into its prompt fragment.
pub fn field_fragment(field: PostField, value: &FieldValue<'_>) -> String {
    let v = value.render();
    match field {
        PostField::FestivalName => format!("Celebrate the festival of {}. ", v),
        PostField::Theme => format!("Use a {} theme. ", v),
        PostField::EventDesc => format!("Promote the event: {}. ", v),
        PostField::ProductDesc => format!("Showcase the product: {}. ", v),
        PostField::Achievement => format!("Highlight the achievement: {}. ", v),
        PostField::JobDesc => format!("Announce the open role: {}. ", v),
        PostField::Trend => format!("Tie the visual to the trending topic \"{}\". ", v),
        PostField::Tags => format!("Reflect these tags: {}. ", v),
        PostField::Keywords => format!("Emphasize the keywords: {}. ", v),
        PostField::Platform => format!("Optimize the layout for {}. ", v),
        PostField::AspectRatio => format!("Compose for a {} aspect ratio. ", v),
        PostField::LogoPosition => format!("Reserve space for the logo at the {}. ", v),
        PostField::OverlayText => format!("Leave room for overlay text ({}). ", v),
        PostField::Message => format!("Convey the message: \"{}\". ", v),
        PostField::BrandName => format!("Feature the brand name \"{}\". ", v),
        PostField::Font => format!("Use a {} font style for typography. ", v),
        PostField::Colors => format!("Use the color palette: {}. ", v),
    }
}
