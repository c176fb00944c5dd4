use std::sync::Arc;

use crate::gemini::GeminiClient;
use crate::rate_limit::RateLimiter;

// app's shared state
pub struct AppState {
    pub gemini: GeminiClient,
    pub global_limiter: Arc<RateLimiter>,   // every /api route except health
    pub generate_limiter: Arc<RateLimiter>, // script generation only
    pub allowed_origins: Vec<String>,
    pub trust_proxy: bool,
}
