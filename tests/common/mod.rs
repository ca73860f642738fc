#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use mesh::config::{post_key, POSTS_LIST_KEY};
use mesh::core::db::{KvStore, MemoryStore};
use mesh::models::models::Post;
use mesh::users::{create_user, NewUser};
use spin_sdk::http::{Method, Request, Response};

pub fn store() -> MemoryStore {
    MemoryStore::new()
}

pub fn signup(store: &MemoryStore, name: &str) -> String {
    create_user(
        store,
        NewUser {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            password: "secret123".to_string(),
        },
    )
    .expect("signup should succeed")
    .id
}

pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
}

/// Stores a post with a fixed timestamp, bypassing `create_post`.
pub fn insert_post(store: &MemoryStore, author: &str, text: &str, created: DateTime<Utc>) -> String {
    let post = Post {
        id: uuid::Uuid::new_v4().to_string(),
        text: text.to_string(),
        photo: None,
        posted_by: author.to_string(),
        created,
        likes: Vec::new(),
        comments: Vec::new(),
    };
    store.set_json(&post_key(&post.id), &post).unwrap();
    store
        .upsert_json(POSTS_LIST_KEY, |ids: &mut Vec<String>| ids.push(post.id.clone()))
        .unwrap();
    post.id
}

pub fn request(method: Method, path: &str, token: Option<&str>, body: serde_json::Value) -> Request {
    let mut builder = Request::builder();
    builder.method(method).uri(path);
    builder.header("content-type", "application/json");
    if let Some(token) = token {
        builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(serde_json::to_vec(&body).unwrap()).build()
}

pub fn status(resp: &Response) -> u16 {
    *resp.status()
}

pub fn json(resp: &Response) -> serde_json::Value {
    serde_json::from_slice(resp.body()).expect("response body should be JSON")
}

/// Signs up through the API and returns `(user_id, token)`.
pub fn api_signup(store: &MemoryStore, name: &str) -> (String, String) {
    let email = format!("{}@example.com", name.to_lowercase());
    let resp = mesh::handlers::route(
        store,
        request(
            Method::Post,
            "/api/users",
            None,
            serde_json::json!({ "name": name, "email": email, "password": "secret123" }),
        ),
    );
    assert_eq!(status(&resp), 200, "signup failed: {}", json(&resp));

    let resp = mesh::handlers::route(
        store,
        request(
            Method::Post,
            "/auth/signin",
            None,
            serde_json::json!({ "email": email, "password": "secret123" }),
        ),
    );
    assert_eq!(status(&resp), 200, "signin failed: {}", json(&resp));
    let body = json(&resp);
    (
        body["user"]["_id"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}
