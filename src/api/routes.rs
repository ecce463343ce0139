use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::api::handlers;
use crate::flows::Relay;

pub struct AppState {
    pub relay: Relay,
    /// Body cap for every route; uploads and inpainting carry whole images.
    pub max_upload_bytes: usize,
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);
    Router::new()
        .route("/", get(handlers::root))
        .route("/queue_prompt", post(handlers::queue_prompt))
        .route("/generate_prompt", post(handlers::generate_prompt))
        .route("/get_history", get(handlers::get_history))
        .route("/track_progress/:prompt_id", get(handlers::track_progress))
        .route("/get_image", get(handlers::get_image))
        .route("/generate_image", post(handlers::generate_image))
        .route("/upload_image", post(handlers::upload_image))
        .route("/generate_caption_and_hashtags", post(handlers::generate_caption))
        .route("/connect_to_comfy", post(handlers::connect_to_comfy))
        .route("/inpaint", post(handlers::inpaint))
        .route("/post-types", get(handlers::post_types))
        .route("/generate_prompt_form", get(handlers::prompt_form))
        .route("/trends", get(handlers::trends))
        .route("/fetch_trends/:topic_name", get(handlers::fetch_trends))
        .layer(body_limit)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
