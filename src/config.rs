use tracing::warn;

use crate::engagement::LikeMode;

pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_NAME_LENGTH: usize = 50;
pub const MAX_ABOUT_LENGTH: usize = 500;
pub const MAX_POST_LENGTH: usize = 5000;
pub const MAX_COMMENT_LENGTH: usize = 1000;

pub const USERS_LIST_KEY: &str = "users_list";
pub const POSTS_LIST_KEY: &str = "posts_list";
pub const TOKENS_LIST_KEY: &str = "tokens_list";

pub fn user_key(user_id: &str) -> String {
    format!("user:{}", user_id)
}

pub fn post_key(post_id: &str) -> String {
    format!("post:{}", post_id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn followings_key(user_id: &str) -> String {
    format!("followings:{}", user_id)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

pub fn token_expiration_hours() -> i64 {
    std::env::var("SOCIAL_TOKEN_EXPIRATION_HOURS")
        .ok()
        .and_then(|v| {
            v.parse::<i64>()
                .map_err(|e| warn!("Invalid SOCIAL_TOKEN_EXPIRATION_HOURS value: {e}"))
                .ok()
        })
        .unwrap_or(24)
}

/// Likes behave as a set unless `SOCIAL_LEGACY_LIKES` asks for the old
/// append-on-every-call behaviour.
pub fn like_mode() -> LikeMode {
    if env_flag("SOCIAL_LEGACY_LIKES") {
        LikeMode::LegacyParity
    } else {
        LikeMode::Set
    }
}

pub fn bind_address() -> String {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|v| {
            v.parse::<u16>()
                .map_err(|e| warn!("Invalid PORT value: {e}"))
                .ok()
        })
        .unwrap_or(3000);
    format!("0.0.0.0:{}", port)
}

pub fn seed_demo_data() -> bool {
    env_flag("SOCIAL_SEED_DEMO")
}
