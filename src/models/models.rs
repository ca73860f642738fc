use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored user document. Never serialized to clients directly; see `UserView`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub hashed_password: String,
    pub salt: String,
    pub about: Option<String>,
    pub photo: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub posted_by: String,
    pub created: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Post {
    pub id: String,
    pub text: String,
    pub photo: Option<String>,
    pub posted_by: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TokenData {
    pub user_id: String,
    pub created: DateTime<Utc>,
}

/// Outgoing edges of one user, stored at `followings:{id}`.
pub type Followings = Vec<String>;

// === Views returned to clients ===

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserRef {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub photo: Option<String>,
}

impl From<&User> for UserRef {
    fn from(user: &User) -> Self {
        UserRef {
            id: user.id.clone(),
            name: user.name.clone(),
            photo: user.photo.clone(),
        }
    }
}

/// Entry of the public user listing.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub photo: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            photo: user.photo.clone(),
            created: user.created,
            updated: user.updated,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub about: Option<String>,
    pub photo: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
    pub following: Vec<UserRef>,
    pub followers: Vec<UserRef>,
}

impl UserView {
    pub fn following_ids(&self) -> Vec<&str> {
        self.following.iter().map(|u| u.id.as_str()).collect()
    }

    pub fn follower_ids(&self) -> Vec<&str> {
        self.followers.iter().map(|u| u.id.as_str()).collect()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(rename = "_id")]
    pub id: String,
    pub text: String,
    pub created: DateTime<Utc>,
    pub posted_by: Option<UserRef>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(rename = "_id")]
    pub id: String,
    pub text: String,
    pub photo: Option<String>,
    pub posted_by: Option<UserRef>,
    pub created: DateTime<Utc>,
    pub likes: Vec<String>,
    pub comments: Vec<CommentView>,
}
