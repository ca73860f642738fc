use spin_sdk::http::{Method, Request, Response};
use tracing::debug;

use crate::core::db::KvStore;
use crate::core::errors::ApiError;
use crate::{auth, engagement, feed, follow, posts, users};

/// Dispatches one API request. Every error becomes a JSON error response.
pub fn route<S: KvStore>(store: &S, req: Request) -> Response {
    let path = req.path().to_string();
    debug!(method = ?req.method(), path = %path, "request");

    let result = match (req.method(), path.as_str()) {
        (Method::Post, "/auth/signin") => auth::handle_signin(store, &req),
        (Method::Get, "/auth/signout") => auth::handle_signout(store, &req),

        (Method::Post, "/api/users") => users::handle_signup(store, &req),
        (Method::Get, "/api/users") => users::handle_list_users(store),
        (Method::Put, "/api/users/follow") => follow::handle_follow(store, &req),
        (Method::Put, "/api/users/unfollow") => follow::handle_unfollow(store, &req),
        (Method::Get, p) if p.starts_with("/api/users/findpeople/") => {
            follow::handle_find_people(store, &req)
        }
        (Method::Get, p) if p.starts_with("/api/users/") => users::handle_read_user(store, &req),
        (Method::Put, p) if p.starts_with("/api/users/") => users::handle_update_user(store, &req),
        (Method::Delete, p) if p.starts_with("/api/users/") => {
            users::handle_delete_user(store, &req)
        }

        (Method::Put, "/api/posts/like") => engagement::handle_like(store, &req),
        (Method::Put, "/api/posts/unlike") => engagement::handle_unlike(store, &req),
        (Method::Put, "/api/posts/comment") => engagement::handle_comment(store, &req),
        (Method::Put, "/api/posts/uncomment") => engagement::handle_uncomment(store, &req),
        (Method::Post, p) if p.starts_with("/api/posts/new/") => {
            posts::handle_create_post(store, &req)
        }
        (Method::Get, p) if p.starts_with("/api/posts/feed/") => feed::handle_feed(store, &req),
        (Method::Get, p) if p.starts_with("/api/posts/by/") => feed::handle_posts_by(store, &req),
        (Method::Delete, p) if p.starts_with("/api/posts/") => {
            posts::handle_delete_post(store, &req)
        }

        _ => Err(ApiError::NotFound("No route found".to_string())),
    };

    match result {
        Ok(resp) => resp,
        Err(err) => err.into(),
    }
}
