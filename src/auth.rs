use serde::Deserialize;
use spin_sdk::http::{Request, Response};
use tracing::{debug, info};

use crate::config::{token_expiration_hours, token_key, TOKENS_LIST_KEY};
use crate::core::db::KvStore;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, new_id, now, parse_body};
use crate::models::models::TokenData;
use crate::users::{user_exists, verify_credential};

#[derive(Deserialize)]
struct SigninRequest {
    email: String,
    password: String,
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.header("Authorization")
        .or_else(|| req.header("authorization"))?
        .as_str()?
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
}

fn is_expired(data: &TokenData) -> bool {
    (now() - data.created).num_hours() > token_expiration_hours()
}

/// Deletes expired tokens and drops list entries whose token is gone.
/// Returns how many entries were removed.
pub fn prune_expired_tokens<S: KvStore>(store: &S) -> anyhow::Result<usize> {
    let all_tokens: Vec<String> = store.get_json(TOKENS_LIST_KEY)?.unwrap_or_default();
    let mut stale = Vec::new();
    for token in all_tokens {
        let key = token_key(&token);
        match store.get_json::<TokenData>(&key)? {
            Some(data) if is_expired(&data) => {
                store.delete_key(&key)?;
                stale.push(token);
            }
            Some(_) => {}
            None => stale.push(token),
        }
    }
    if !stale.is_empty() {
        store.upsert_json(TOKENS_LIST_KEY, |tokens: &mut Vec<String>| {
            tokens.retain(|t| !stale.contains(t))
        })?;
        debug!(pruned = stale.len(), "expired tokens pruned");
    }
    Ok(stale.len())
}

/// Issues a fresh token for `user_id`, pruning expired ones first.
pub fn issue_token<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<String> {
    prune_expired_tokens(store)?;

    let token = new_id();
    let data = TokenData {
        user_id: user_id.to_string(),
        created: now(),
    };
    store.set_json(&token_key(&token), &data)?;
    store.upsert_json(TOKENS_LIST_KEY, |tokens: &mut Vec<String>| {
        tokens.push(token.clone())
    })?;
    Ok(token)
}

/// Deletes every token issued to `user_id`.
pub fn revoke_user_tokens<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<()> {
    let all_tokens: Vec<String> = store.get_json(TOKENS_LIST_KEY)?.unwrap_or_default();
    let mut revoked = Vec::new();
    for token in all_tokens {
        let key = token_key(&token);
        match store.get_json::<TokenData>(&key)? {
            Some(data) if data.user_id == user_id => {
                store.delete_key(&key)?;
                revoked.push(token);
            }
            Some(_) => {}
            None => revoked.push(token),
        }
    }
    store.upsert_json(TOKENS_LIST_KEY, |tokens: &mut Vec<String>| {
        tokens.retain(|t| !revoked.contains(t))
    })?;
    debug!(user_id, revoked = revoked.len(), "tokens revoked");
    Ok(())
}

/// Resolves the bearer token of `req` to a user id. Expired tokens and
/// tokens of deleted users resolve to `None`.
pub fn validate_token<S: KvStore>(store: &S, req: &Request) -> Option<String> {
    let token = bearer_token(req)?;
    let key = token_key(token);
    let data = store.get_json::<TokenData>(&key).ok()??;

    if is_expired(&data) {
        // Best effort; the next sign-in prunes the list entry.
        let _ = store.delete_key(&key);
        return None;
    }
    if !user_exists(store, &data.user_id).ok()? {
        return None;
    }
    Some(data.user_id)
}

pub fn require_auth<S: KvStore>(store: &S, req: &Request) -> Result<String, ApiError> {
    validate_token(store, req).ok_or(ApiError::Unauthorized)
}

// === HTTP Handlers ===

pub fn handle_signin<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    let creds: SigninRequest = parse_body(req)?;
    let user = verify_credential(store, &creds.email, &creds.password)?;
    let token = issue_token(store, &user.id)?;

    info!(user_id = %user.id, "signed in");
    json_response(
        200,
        &serde_json::json!({
            "token": token,
            "user": {
                "_id": user.id,
                "name": user.name,
                "email": user.email,
            }
        }),
    )
}

pub fn handle_signout<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    if let Some(token) = bearer_token(req) {
        // Best effort; the client drops its copy regardless.
        let _ = store.delete_key(&token_key(token));
        let _ = store.upsert_json(TOKENS_LIST_KEY, |tokens: &mut Vec<String>| {
            tokens.retain(|t| t != token)
        });
    }

    json_response(200, &serde_json::json!({ "message": "signed out" }))
}
