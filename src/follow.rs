use std::collections::HashSet;

use serde::Deserialize;
use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::auth::require_auth;
use crate::config::*;
use crate::core::db::KvStore;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, parse_body, path_param, require_uuid};
use crate::models::models::{Followings, User, UserRef, UserView};
use crate::users::{find_user, read_user};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FollowRequest {
    user_id: String,
    follow_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnfollowRequest {
    user_id: String,
    unfollow_id: String,
}

// An edge exists once, in the follower's `followings:{id}` list. Followers
// are derived from those lists, so the two directions cannot disagree.

/// Adds `target_id` to `follower_id`'s following set and returns the
/// target's refreshed profile.
///
/// Following yourself is rejected here, though older deployments accepted
/// it. Self-edges already present in imported data stay readable: they
/// show up in both `following` and `followers` and are removed by
/// `unfollow` like any other edge.
pub fn follow<S: KvStore>(
    store: &S,
    follower_id: &str,
    target_id: &str,
) -> Result<UserView, ApiError> {
    if follower_id == target_id {
        return Err(ApiError::validation("followId", "Cannot follow yourself"));
    }
    find_user(store, follower_id)?;
    find_user(store, target_id)?;

    store.upsert_json(&followings_key(follower_id), |followings: &mut Followings| {
        if !followings.iter().any(|id| id == target_id) {
            followings.push(target_id.to_string());
        }
    })?;

    info!(follower_id, target_id, "followed");
    read_user(store, target_id)
}

pub fn unfollow<S: KvStore>(
    store: &S,
    follower_id: &str,
    target_id: &str,
) -> Result<UserView, ApiError> {
    find_user(store, follower_id)?;
    find_user(store, target_id)?;

    store.upsert_json(&followings_key(follower_id), |followings: &mut Followings| {
        followings.retain(|id| id != target_id)
    })?;

    info!(follower_id, target_id, "unfollowed");
    read_user(store, target_id)
}

pub fn get_followings<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<Followings> {
    Ok(store
        .get_json::<Followings>(&followings_key(user_id))?
        .unwrap_or_default())
}

/// Every user whose following list contains `user_id`, in signup order.
pub fn get_followers<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<Vec<String>> {
    let users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    let mut followers = Vec::new();

    for id in users {
        if get_followings(store, &id)?.iter().any(|f| f == user_id) {
            followers.push(id);
        }
    }

    Ok(followers)
}

/// Users `user_id` could follow: everyone except themself and those
/// already followed.
pub fn find_people<S: KvStore>(store: &S, user_id: &str) -> Result<Vec<UserRef>, ApiError> {
    find_user(store, user_id)?;

    let mut excluded: HashSet<String> = get_followings(store, user_id)?.into_iter().collect();
    excluded.insert(user_id.to_string());

    let users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    let mut people = Vec::new();
    for id in users.iter().filter(|id| !excluded.contains(*id)) {
        if let Some(u) = store.get_json::<User>(&user_key(id))? {
            people.push(UserRef::from(&u));
        }
    }
    Ok(people)
}

/// Drops every edge touching `user_id`, in both directions.
pub fn remove_user_edges<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<()> {
    let users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    for id in users {
        if get_followings(store, &id)?.iter().any(|f| f == user_id) {
            store.update_json(&followings_key(&id), |followings: &mut Followings| {
                followings.retain(|f| f != user_id);
                Ok(())
            })?;
        }
    }
    store.delete_key(&followings_key(user_id))
}

// === HTTP Handlers ===

pub fn handle_follow<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    let caller = require_auth(store, req)?;
    let body: FollowRequest = parse_body(req)?;

    require_uuid(&body.user_id, "User")?;
    require_uuid(&body.follow_id, "Target user")?;
    if body.user_id != caller {
        return Err(ApiError::Forbidden);
    }

    json_response(200, &follow(store, &body.user_id, &body.follow_id)?)
}

pub fn handle_unfollow<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    let caller = require_auth(store, req)?;
    let body: UnfollowRequest = parse_body(req)?;

    require_uuid(&body.user_id, "User")?;
    require_uuid(&body.unfollow_id, "Target user")?;
    if body.user_id != caller {
        return Err(ApiError::Forbidden);
    }

    json_response(200, &unfollow(store, &body.user_id, &body.unfollow_id)?)
}

pub fn handle_find_people<S: KvStore>(store: &S, req: &Request) -> Result<Response, ApiError> {
    require_auth(store, req)?;
    let user_id = path_param(req.path(), "/api/users/findpeople/");
    require_uuid(user_id, "User")?;

    json_response(200, &find_people(store, user_id)?)
}
