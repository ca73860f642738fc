use serde::Deserialize;
use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::auth::require_auth;
use crate::config::{like_mode, post_key, MAX_COMMENT_LENGTH};
use crate::core::db::KvStore;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, new_id, now, parse_body, require_uuid};
use crate::models::models::{Comment, Post, PostView};
use crate::posts::{clean_text, populate_post};

/// How `like` treats a user who already likes the post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LikeMode {
    /// Likes form a set; repeated likes are no-ops.
    #[default]
    Set,
    /// Every like appends, so repeated calls inflate the count.
    LegacyParity,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LikeRequest {
    post_id: String,
    user_id: String,
}

#[derive(Deserialize)]
struct CommentBody {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentRequest {
    post_id: String,
    user_id: String,
    comment: CommentBody,
}

#[derive(Deserialize)]
struct CommentRef {
    #[serde(rename = "_id", alias = "id")]
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UncommentRequest {
    post_id: String,
    comment: CommentRef,
}

fn mutate<S, F>(store: &S, post_id: &str, f: F) -> Result<PostView, ApiError>
where
    S: KvStore,
    F: FnMut(&mut Post) -> anyhow::Result<()>,
{
    let post = store
        .update_json(&post_key(post_id), f)?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;
    populate_post(store, post)
}

pub fn like<S: KvStore>(
    store: &S,
    post_id: &str,
    user_id: &str,
    mode: LikeMode,
) -> Result<PostView, ApiError> {
    let view = mutate(store, post_id, |post| {
        let already = post.likes.iter().any(|id| id == user_id);
        if mode == LikeMode::LegacyParity || !already {
            post.likes.push(user_id.to_string());
        }
        Ok(())
    })?;
    info!(post_id, user_id, likes = view.likes.len(), "liked");
    Ok(view)
}

/// Removes every like `user_id` holds on the post.
pub fn unlike<S: KvStore>(store: &S, post_id: &str, user_id: &str) -> Result<PostView, ApiError> {
    let view = mutate(store, post_id, |post| {
        post.likes.retain(|id| id != user_id);
        Ok(())
    })?;
    info!(post_id, user_id, likes = view.likes.len(), "unliked");
    Ok(view)
}

pub fn comment<S: KvStore>(
    store: &S,
    post_id: &str,
    user_id: &str,
    text: &str,
) -> Result<PostView, ApiError> {
    let comment = Comment {
        id: new_id(),
        text: clean_text(text, MAX_COMMENT_LENGTH)?,
        posted_by: user_id.to_string(),
        created: now(),
    };
    let comment_id = comment.id.clone();

    let view = mutate(store, post_id, |post| {
        post.comments.push(comment.clone());
        Ok(())
    })?;
    info!(post_id, comment_id = %comment_id, "commented");
    Ok(view)
}

/// Removes one comment. Only the comment's author may remove it.
pub fn uncomment<S: KvStore>(
    store: &S,
    post_id: &str,
    comment_id: &str,
    acting_user: &str,
) -> Result<PostView, ApiError> {
    let view = mutate(store, post_id, |post| {
        let idx = post
            .comments
            .iter()
            .position(|c| c.id == comment_id)
            .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;
        if post.comments[idx].posted_by != acting_user {
            return Err(ApiError::Forbidden.into());
        }
        post.comments.remove(idx);
        Ok(())
    })?;
    info!(post_id, comment_id, "comment removed");
    Ok(view)
}

// === HTTP Handlers ===

fn parse_like<S: KvStore>(store: &S, req: &Request) -> Result<LikeRequest, ApiError> {
    let caller = require_auth(store, req)?;
    let body: LikeRequest = parse_body(req)?;
    require_uuid(&body.post_id, "Post")?;
    if body.user_id != caller {
        return Err(ApiError::Forbidden);
    }
    Ok(body)
}

pub fn handle_like<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    let body = parse_like(store, req)?;
    json_response(200, &like(store, &body.post_id, &body.user_id, like_mode())?)
}

pub fn handle_unlike<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    let body = parse_like(store, req)?;
    json_response(200, &unlike(store, &body.post_id, &body.user_id)?)
}

pub fn handle_comment<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    let caller = require_auth(store, req)?;
    let body: CommentRequest = parse_body(req)?;
    require_uuid(&body.post_id, "Post")?;
    if body.user_id != caller {
        return Err(ApiError::Forbidden);
    }

    json_response(
        200,
        &comment(store, &body.post_id, &body.user_id, &body.comment.text)?,
    )
}

pub fn handle_uncomment<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    let caller = require_auth(store, req)?;
    let body: UncommentRequest = parse_body(req)?;
    require_uuid(&body.post_id, "Post")?;
    require_uuid(&body.comment.id, "Comment")?;

    json_response(
        200,
        &uncomment(store, &body.post_id, &body.comment.id, &caller)?,
    )
}
