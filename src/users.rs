use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use spin_sdk::http::{Request, Response};
use tracing::{info, warn};

use crate::auth::{issue_token, require_auth, revoke_user_tokens};
use crate::config::*;
use crate::core::db::KvStore;
use crate::core::errors::ApiError;
use crate::core::helpers::{
    hash_password, json_response, new_id, now, parse_body, path_param, require_uuid,
    sanitize_text, verify_password,
};
use crate::follow::{get_followers, get_followings, remove_user_edges};
use crate::models::models::{User, UserRef, UserSummary, UserView};
use crate::posts::purge_user_content;

#[derive(Deserialize, Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Partial profile edit; absent fields are left as they are.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub about: Option<String>,
    pub photo: Option<String>,
    pub password: Option<String>,
}

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^.+@.+\..+$").expect("Regex should compile"))
}

fn clean_name(name: &str) -> Result<String, ApiError> {
    let name = sanitize_text(name);
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name", "Name is required"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ApiError::validation("name", "Name is too long"));
    }
    Ok(name.to_string())
}

fn clean_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::validation("email", "Email is required"));
    }
    if !email_regex().is_match(&email) {
        return Err(ApiError::validation("email", "Please fill a valid email address"));
    }
    Ok(email)
}

fn check_password(password: &str) -> Result<(), ApiError> {
    if password.is_empty() {
        return Err(ApiError::validation("password", "Password is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::validation(
            "password",
            "Password must be at least 6 characters.",
        ));
    }
    Ok(())
}

fn email_taken<S: KvStore>(store: &S, email: &str, except: Option<&str>) -> anyhow::Result<bool> {
    for user in all_users(store)? {
        if user.email == email && Some(user.id.as_str()) != except {
            return Ok(true);
        }
    }
    Ok(false)
}

fn all_users<S: KvStore>(store: &S) -> anyhow::Result<Vec<User>> {
    let ids: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    let mut users = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(u) = store.get_json::<User>(&user_key(&id))? {
            users.push(u);
        }
    }
    Ok(users)
}

pub fn create_user<S: KvStore>(store: &S, new_user: NewUser) -> Result<User, ApiError> {
    let name = clean_name(&new_user.name)?;
    let email = clean_email(&new_user.email)?;
    check_password(&new_user.password)?;

    if email_taken(store, &email, None)? {
        return Err(ApiError::Conflict("Email already exists".to_string()));
    }

    let (hashed_password, salt) = hash_password(&new_user.password)?;
    let user = User {
        id: new_id(),
        name,
        email,
        hashed_password,
        salt,
        about: None,
        photo: None,
        created: now(),
        updated: None,
    };

    store.set_json(&user_key(&user.id), &user)?;
    store.upsert_json(USERS_LIST_KEY, |ids: &mut Vec<String>| ids.push(user.id.clone()))?;

    info!(user_id = %user.id, "user created");
    Ok(user)
}

pub fn find_user<S: KvStore>(store: &S, user_id: &str) -> Result<User, ApiError> {
    store
        .get_json::<User>(&user_key(user_id))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

pub fn user_exists<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<bool> {
    Ok(store.get_bytes(&user_key(user_id))?.is_some())
}

pub fn list_users<S: KvStore>(store: &S) -> Result<Vec<UserSummary>, ApiError> {
    Ok(all_users(store)?.iter().map(UserSummary::from).collect())
}

/// Checks an email/password pair. Unknown email and wrong password are
/// indistinguishable to the caller.
pub fn verify_credential<S: KvStore>(
    store: &S,
    email: &str,
    password: &str,
) -> Result<User, ApiError> {
    let email = email.trim().to_lowercase();
    for user in all_users(store)? {
        if user.email == email {
            if verify_password(password, &user.hashed_password) {
                return Ok(user);
            }
            break;
        }
    }
    warn!("rejected credentials");
    Err(ApiError::Unauthorized)
}

/// Memoizes `UserRef` lookups for the span of one read.
pub struct RefResolver<'a, S: KvStore> {
    store: &'a S,
    cache: HashMap<String, Option<UserRef>>,
}

impl<'a, S: KvStore> RefResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, user_id: &str) -> anyhow::Result<Option<UserRef>> {
        if let Some(hit) = self.cache.get(user_id) {
            return Ok(hit.clone());
        }
        let resolved = self
            .store
            .get_json::<User>(&user_key(user_id))?
            .map(|u| UserRef::from(&u));
        self.cache.insert(user_id.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Resolves every id, dropping those that no longer exist.
    pub fn resolve_all(&mut self, ids: &[String]) -> anyhow::Result<Vec<UserRef>> {
        let mut refs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(r) = self.resolve(id)? {
                refs.push(r);
            }
        }
        Ok(refs)
    }
}

pub fn user_view<S: KvStore>(store: &S, user: &User) -> Result<UserView, ApiError> {
    let mut resolver = RefResolver::new(store);
    let following = resolver.resolve_all(&get_followings(store, &user.id)?)?;
    let followers = resolver.resolve_all(&get_followers(store, &user.id)?)?;

    Ok(UserView {
        id: user.id.clone(),
        name: user.name.clone(),
        email: user.email.clone(),
        about: user.about.clone(),
        photo: user.photo.clone(),
        created: user.created,
        updated: user.updated,
        following,
        followers,
    })
}

pub fn read_user<S: KvStore>(store: &S, user_id: &str) -> Result<UserView, ApiError> {
    let user = find_user(store, user_id)?;
    user_view(store, &user)
}

pub fn update_user<S: KvStore>(
    store: &S,
    user_id: &str,
    changes: UserUpdate,
) -> Result<UserView, ApiError> {
    find_user(store, user_id)?;

    let name = changes.name.as_deref().map(clean_name).transpose()?;
    let email = changes.email.as_deref().map(clean_email).transpose()?;
    if let Some(email) = &email {
        if email_taken(store, email, Some(user_id))? {
            return Err(ApiError::Conflict("Email already exists".to_string()));
        }
    }
    let about = match changes.about.as_deref() {
        Some(about) => {
            let about = sanitize_text(about).trim().to_string();
            if about.chars().count() > MAX_ABOUT_LENGTH {
                return Err(ApiError::validation("about", "About is too long (max 500 chars)"));
            }
            Some(about)
        }
        None => None,
    };
    let credential = match changes.password.as_deref() {
        Some(password) => {
            check_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let updated = store
        .update_json(&user_key(user_id), |user: &mut User| {
            if let Some(name) = &name {
                user.name = name.clone();
            }
            if let Some(email) = &email {
                user.email = email.clone();
            }
            if let Some(about) = &about {
                user.about = Some(about.clone()).filter(|a| !a.is_empty());
            }
            if let Some(photo) = &changes.photo {
                user.photo = Some(photo.clone()).filter(|p| !p.is_empty());
            }
            if let Some((hashed_password, salt)) = &credential {
                user.hashed_password = hashed_password.clone();
                user.salt = salt.clone();
            }
            user.updated = Some(now());
            Ok(())
        })?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    info!(user_id, "user updated");
    user_view(store, &updated)
}

/// Deletes the account and everything that references it: authored posts,
/// likes and comments on other posts, follow edges in both directions and
/// issued tokens. Returns the account as it was before deletion.
pub fn delete_user<S: KvStore>(store: &S, user_id: &str) -> Result<UserView, ApiError> {
    let user = find_user(store, user_id)?;
    let view = user_view(store, &user)?;

    store.upsert_json(USERS_LIST_KEY, |ids: &mut Vec<String>| {
        ids.retain(|id| id != user_id)
    })?;
    store.delete_key(&user_key(user_id))?;

    let purged = purge_user_content(store, user_id)?;
    remove_user_edges(store, user_id)?;
    revoke_user_tokens(store, user_id)?;

    info!(user_id, posts_deleted = purged, "user deleted");
    Ok(view)
}

// === HTTP Handlers ===

pub fn handle_signup<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    let new_user: NewUser = parse_body(req)?;
    create_user(store, new_user)?;

    json_response(
        200,
        &serde_json::json!({ "message": "Successfully signed up!" }),
    )
}

pub fn handle_list_users<S: KvStore>(store: &S) -> Result<Response, ApiError> {
    json_response(200, &list_users(store)?)
}

pub fn handle_read_user<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    require_auth(store, req)?;
    let user_id = path_param(req.path(), "/api/users/");
    require_uuid(user_id, "User")?;

    json_response(200, &read_user(store, user_id)?)
}

pub fn handle_update_user<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    let caller = require_auth(store, req)?;
    let user_id = path_param(req.path(), "/api/users/");
    require_uuid(user_id, "User")?;
    if user_id != caller {
        return Err(ApiError::Forbidden);
    }

    let changes: UserUpdate = parse_body(req)?;
    let password_changed = changes.password.is_some();
    let view = update_user(store, user_id, changes)?;

    let mut response_data = serde_json::to_value(&view)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    // A new password invalidates every session; hand back a fresh one.
    if password_changed {
        revoke_user_tokens(store, user_id)?;
        let token = issue_token(store, user_id)?;
        response_data["token"] = serde_json::Value::String(token);
    }

    json_response(200, &response_data)
}

pub fn handle_delete_user<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    let caller = require_auth(store, req)?;
    let user_id = path_param(req.path(), "/api/users/");
    require_uuid(user_id, "User")?;
    if user_id != caller {
        return Err(ApiError::Forbidden);
    }

    json_response(200, &delete_user(store, user_id)?)
}
