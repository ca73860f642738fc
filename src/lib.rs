//! Social graph, news feed and engagement service.
//!
//! Users sign up, follow each other and publish posts that others like and
//! comment on. The interesting rules live in [`follow`] (the follow graph),
//! [`feed`] (which posts a user sees) and [`engagement`] (likes and
//! comments). Everything persists through [`core::db::KvStore`]: the Spin
//! key-value store when running as a component, [`core::db::MemoryStore`]
//! in the native server and in tests.

pub mod auth;
pub mod config;
pub mod engagement;
pub mod feed;
pub mod follow;
pub mod handlers;
pub mod posts;
pub mod users;

pub mod core {
    pub mod db;
    pub mod errors;
    pub mod helpers;
}

pub mod models {
    #[allow(clippy::module_inception)]
    pub mod models;
}

#[cfg(target_arch = "wasm32")]
mod component {
    use spin_sdk::http::{IntoResponse, Request};
    use spin_sdk::http_component;

    #[http_component]
    fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
        let store = crate::core::db::open_store()?;
        Ok(crate::handlers::route(&store, req))
    }
}
