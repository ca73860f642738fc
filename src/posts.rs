use std::collections::HashSet;

use serde::Deserialize;
use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::auth::require_auth;
use crate::config::*;
use crate::core::db::KvStore;
use crate::core::errors::ApiError;
use crate::core::helpers::{
    json_response, new_id, now, parse_body, path_param, require_uuid, sanitize_text,
};
use crate::models::models::{CommentView, Post, PostView};
use crate::users::{find_user, RefResolver};

#[derive(Deserialize)]
struct NewPostRequest {
    text: Option<String>,
    photo: Option<String>,
}

/// Strips markup, then checks what is left: text that is empty once tags
/// are gone is rejected, and the length limit applies to the stored text.
pub(crate) fn clean_text(text: &str, max: usize) -> Result<String, ApiError> {
    let text = sanitize_text(text);
    let text = text.trim();
    if text.is_empty() {
        return Err(ApiError::validation("text", "Text is required"));
    }
    if text.chars().count() > max {
        return Err(ApiError::validation("text", "Text is too long"));
    }
    Ok(text.to_string())
}

pub fn create_post<S: KvStore>(
    store: &S,
    author_id: &str,
    text: &str,
    photo: Option<String>,
) -> Result<PostView, ApiError> {
    let text = clean_text(text, MAX_POST_LENGTH)?;
    find_user(store, author_id)?;

    let post = Post {
        id: new_id(),
        text,
        photo: photo.filter(|p| !p.trim().is_empty()),
        posted_by: author_id.to_string(),
        created: now(),
        likes: Vec::new(),
        comments: Vec::new(),
    };

    store.set_json(&post_key(&post.id), &post)?;
    store.upsert_json(POSTS_LIST_KEY, |ids: &mut Vec<String>| ids.push(post.id.clone()))?;

    info!(post_id = %post.id, author_id, "post created");
    populate_post(store, post)
}

pub fn find_post<S: KvStore>(store: &S, post_id: &str) -> Result<Post, ApiError> {
    store
        .get_json::<Post>(&post_key(post_id))?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))
}

/// Posts whose author is in `authors`, in the order they were stored.
pub fn find_posted_by<S: KvStore>(
    store: &S,
    authors: &HashSet<String>,
) -> anyhow::Result<Vec<Post>> {
    let ids: Vec<String> = store.get_json(POSTS_LIST_KEY)?.unwrap_or_default();
    let mut posts = Vec::new();
    for id in ids {
        if let Some(p) = store.get_json::<Post>(&post_key(&id))? {
            if authors.contains(&p.posted_by) {
                posts.push(p);
            }
        }
    }
    Ok(posts)
}

/// Removes a post. Only its author may do so.
pub fn delete_post<S: KvStore>(
    store: &S,
    post_id: &str,
    acting_user: &str,
) -> Result<PostView, ApiError> {
    let post = find_post(store, post_id)?;
    if post.posted_by != acting_user {
        return Err(ApiError::Forbidden);
    }
    let view = populate_post(store, post)?;

    store.delete_key(&post_key(post_id))?;
    store.upsert_json(POSTS_LIST_KEY, |ids: &mut Vec<String>| {
        ids.retain(|id| id != post_id)
    })?;

    info!(post_id, "post deleted");
    Ok(view)
}

/// Deletes the posts authored by `user_id` and strips their likes and
/// comments from everyone else's. Returns the number of deleted posts.
pub fn purge_user_content<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<usize> {
    let ids: Vec<String> = store.get_json(POSTS_LIST_KEY)?.unwrap_or_default();
    let mut deleted = HashSet::new();

    for id in &ids {
        let Some(post) = store.get_json::<Post>(&post_key(id))? else {
            continue;
        };
        if post.posted_by == user_id {
            store.delete_key(&post_key(id))?;
            deleted.insert(id.clone());
        } else if post.likes.iter().any(|l| l == user_id)
            || post.comments.iter().any(|c| c.posted_by == user_id)
        {
            store.update_json(&post_key(id), |post: &mut Post| {
                post.likes.retain(|l| l != user_id);
                post.comments.retain(|c| c.posted_by != user_id);
                Ok(())
            })?;
        }
    }

    if !deleted.is_empty() {
        store.upsert_json(POSTS_LIST_KEY, |ids: &mut Vec<String>| {
            ids.retain(|id| !deleted.contains(id))
        })?;
    }
    Ok(deleted.len())
}

fn populate_with<S: KvStore>(
    resolver: &mut RefResolver<'_, S>,
    post: Post,
) -> anyhow::Result<PostView> {
    let posted_by = resolver.resolve(&post.posted_by)?;
    let mut comments = Vec::with_capacity(post.comments.len());
    for c in post.comments {
        comments.push(CommentView {
            posted_by: resolver.resolve(&c.posted_by)?,
            id: c.id,
            text: c.text,
            created: c.created,
        });
    }

    Ok(PostView {
        id: post.id,
        text: post.text,
        photo: post.photo,
        posted_by,
        created: post.created,
        likes: post.likes,
        comments,
    })
}

/// Resolves the author and commenters of one post.
pub fn populate_post<S: KvStore>(store: &S, post: Post) -> Result<PostView, ApiError> {
    Ok(populate_with(&mut RefResolver::new(store), post)?)
}

pub fn populate_posts<S: KvStore>(store: &S, posts: Vec<Post>) -> anyhow::Result<Vec<PostView>> {
    let mut resolver = RefResolver::new(store);
    posts
        .into_iter()
        .map(|p| populate_with(&mut resolver, p))
        .collect()
}

// === HTTP Handlers ===

pub fn handle_create_post<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    let caller = require_auth(store, req)?;
    let user_id = path_param(req.path(), "/api/posts/new/");
    require_uuid(user_id, "User")?;
    if user_id != caller {
        return Err(ApiError::Forbidden);
    }

    let body: NewPostRequest = parse_body(req)?;
    let text = body.text.unwrap_or_default();
    json_response(200, &create_post(store, user_id, &text, body.photo)?)
}

pub fn handle_delete_post<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    let caller = require_auth(store, req)?;
    let post_id = path_param(req.path(), "/api/posts/");
    require_uuid(post_id, "Post")?;

    json_response(200, &delete_post(store, post_id, &caller)?)
}
