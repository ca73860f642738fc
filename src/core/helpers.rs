use std::collections::HashSet;

use ammonia::Builder;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use html_escape::decode_html_entities;
use rand::rngs::OsRng;
use serde::{de::DeserializeOwned, Serialize};
use spin_sdk::http::{Request, Response};
use uuid::Uuid;

use crate::core::errors::ApiError;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Hashes `password` with a fresh salt. Returns the PHC string and the salt.
pub fn hash_password(password: &str) -> anyhow::Result<(String, String)> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| (hash.to_string(), salt.as_str().to_string()))
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn validate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

pub fn require_uuid(id: &str, what: &str) -> Result<(), ApiError> {
    if id.is_empty() || !validate_uuid(id) {
        return Err(ApiError::BadRequest(format!("{} ID required", what)));
    }
    Ok(())
}

/// Strips every HTML tag, leaving plain text. Entities ammonia emits are
/// decoded again, so `&` and `<` round-trip unchanged and the result must
/// be escaped by whoever renders it as HTML.
pub fn sanitize_text(text: &str) -> String {
    let stripped = Builder::default()
        .tags(HashSet::new())
        .clean(text)
        .to_string();
    decode_html_entities(&stripped).into_owned()
}

pub fn parse_body<T: DeserializeOwned>(req: &Request) -> Result<T, ApiError> {
    serde_json::from_slice(req.body())
        .map_err(|e| ApiError::BadRequest(format!("Malformed payload: {}", e)))
}

pub fn json_response<T: Serialize>(status: u16, value: &T) -> Result<Response, ApiError> {
    let body = serde_json::to_vec(value)
        .map_err(|e| ApiError::InternalError(format!("Failed to encode response: {}", e)))?;
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(body)
        .build())
}

/// Last path segment after `prefix`, e.g. the `:userId` of `/api/users/:userId`.
pub fn path_param<'a>(path: &'a str, prefix: &str) -> &'a str {
    path.strip_prefix(prefix)
        .unwrap_or_default()
        .trim_end_matches('/')
}
