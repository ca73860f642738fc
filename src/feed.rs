//! Home and profile feeds.
//!
//! Both feeds are newest first. `sort_by` is stable and the candidate posts
//! arrive in storage order, so posts sharing a timestamp keep the order in
//! which they were stored.

use std::collections::HashSet;

use spin_sdk::http::{Request, Response};
use tracing::debug;

use crate::auth::require_auth;
use crate::core::db::KvStore;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, path_param, require_uuid};
use crate::follow::get_followings;
use crate::models::models::{Post, PostView};
use crate::posts::{find_posted_by, populate_posts};
use crate::users::find_user;

fn newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.created.cmp(&a.created));
}

fn compose<S: KvStore>(store: &S, authors: HashSet<String>) -> Result<Vec<PostView>, ApiError> {
    let mut posts = find_posted_by(store, &authors)?;
    newest_first(&mut posts);
    Ok(populate_posts(store, posts)?)
}

/// Posts by `user_id` and everyone they follow.
pub fn compute_feed<S: KvStore>(store: &S, user_id: &str) -> Result<Vec<PostView>, ApiError> {
    find_user(store, user_id)?;

    let mut authors: HashSet<String> = get_followings(store, user_id)?.into_iter().collect();
    authors.insert(user_id.to_string());

    let feed = compose(store, authors)?;
    debug!(user_id, posts = feed.len(), "feed computed");
    Ok(feed)
}

/// Posts by exactly one author, for profile pages.
pub fn compute_profile_feed<S: KvStore>(
    store: &S,
    author_id: &str,
) -> Result<Vec<PostView>, ApiError> {
    find_user(store, author_id)?;
    compose(store, HashSet::from([author_id.to_string()]))
}

// === HTTP Handlers ===

pub fn handle_feed<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    require_auth(store, req)?;
    let user_id = path_param(req.path(), "/api/posts/feed/");
    require_uuid(user_id, "User")?;

    json_response(200, &compute_feed(store, user_id)?)
}

pub fn handle_posts_by<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    require_auth(store, req)?;
    let user_id = path_param(req.path(), "/api/posts/by/");
    require_uuid(user_id, "User")?;

    json_response(200, &compute_profile_feed(store, user_id)?)
}
