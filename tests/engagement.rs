mod common;

use common::{signup, store};
use mesh::core::errors::ApiError;
use mesh::engagement::{comment, like, uncomment, unlike, LikeMode};
use mesh::posts::{create_post, find_post};

#[test]
fn like_is_idempotent_by_default() {
    let store = store();
    let alice = signup(&store, "Alice");
    let post = create_post(&store, &alice, "hi", None).unwrap();

    like(&store, &post.id, &alice, LikeMode::Set).unwrap();
    let view = like(&store, &post.id, &alice, LikeMode::Set).unwrap();

    assert_eq!(view.likes, vec![alice.clone()]);
}

#[test]
fn legacy_parity_appends_every_like() {
    let store = store();
    let alice = signup(&store, "Alice");
    let post = create_post(&store, &alice, "hi", None).unwrap();

    like(&store, &post.id, &alice, LikeMode::LegacyParity).unwrap();
    let view = like(&store, &post.id, &alice, LikeMode::LegacyParity).unwrap();
    assert_eq!(view.likes.len(), 2);

    let view = unlike(&store, &post.id, &alice).unwrap();
    assert!(view.likes.is_empty());
}

#[test]
fn like_then_unlike_restores_likes() {
    let store = store();
    let alice = signup(&store, "Alice");
    let bob = signup(&store, "Bob");
    let post = create_post(&store, &alice, "hi", None).unwrap();
    like(&store, &post.id, &bob, LikeMode::Set).unwrap();

    for mode in [LikeMode::Set, LikeMode::LegacyParity] {
        let before = find_post(&store, &post.id).unwrap().likes;
        like(&store, &post.id, &alice, mode).unwrap();
        unlike(&store, &post.id, &alice).unwrap();
        assert_eq!(find_post(&store, &post.id).unwrap().likes, before);
    }
}

#[test]
fn comment_appends_and_uncomment_removes_exactly_one() {
    let store = store();
    let alice = signup(&store, "Alice");
    let bob = signup(&store, "Bob");
    let post = create_post(&store, &alice, "hi", None).unwrap();

    comment(&store, &post.id, &bob, "first").unwrap();
    let view = comment(&store, &post.id, &alice, "hello").unwrap();

    assert_eq!(view.comments.len(), 2);
    let added = &view.comments[1];
    assert_eq!(added.text, "hello");
    assert_eq!(added.posted_by.as_ref().unwrap().id, alice);
    assert_ne!(added.id, view.comments[0].id);

    let view = uncomment(&store, &post.id, &added.id, &alice).unwrap();
    assert_eq!(view.comments.len(), 1);
    assert_eq!(view.comments[0].text, "first");
}

#[test]
fn only_the_author_can_remove_a_comment() {
    let store = store();
    let alice = signup(&store, "Alice");
    let bob = signup(&store, "Bob");
    let post = create_post(&store, &alice, "hi", None).unwrap();
    let view = comment(&store, &post.id, &bob, "mine").unwrap();
    let comment_id = view.comments[0].id.clone();

    let err = uncomment(&store, &post.id, &comment_id, &alice).unwrap_err();
    assert!(matches!(err, ApiError::Forbidden));
    assert_eq!(find_post(&store, &post.id).unwrap().comments.len(), 1);
}

#[test]
fn empty_comment_is_rejected() {
    let store = store();
    let alice = signup(&store, "Alice");
    let post = create_post(&store, &alice, "hi", None).unwrap();

    let err = comment(&store, &post.id, &alice, "   ").unwrap_err();
    assert!(matches!(err, ApiError::Validation { ref field, .. } if field == "text"));
}

#[test]
fn missing_post_or_comment_is_not_found() {
    let store = store();
    let alice = signup(&store, "Alice");
    let ghost = uuid::Uuid::new_v4().to_string();

    assert!(matches!(like(&store, &ghost, &alice, LikeMode::Set), Err(ApiError::NotFound(_))));
    assert!(matches!(unlike(&store, &ghost, &alice), Err(ApiError::NotFound(_))));
    assert!(matches!(comment(&store, &ghost, &alice, "x"), Err(ApiError::NotFound(_))));

    let post = create_post(&store, &alice, "hi", None).unwrap();
    let err = uncomment(&store, &post.id, &ghost, &alice).unwrap_err();
    assert!(matches!(err, ApiError::NotFound(ref msg) if msg == "Comment not found"));
}

#[test]
fn markup_only_comment_is_rejected() {
    let store = store();
    let alice = signup(&store, "Alice");
    let post = create_post(&store, &alice, "hi", None).unwrap();

    let err = comment(&store, &post.id, &alice, "<b></b>").unwrap_err();
    assert!(matches!(err, ApiError::Validation { ref field, .. } if field == "text"));
    assert!(find_post(&store, &post.id).unwrap().comments.is_empty());
}

#[test]
fn comment_text_round_trips_special_characters() {
    let store = store();
    let alice = signup(&store, "Alice");
    let post = create_post(&store, &alice, "hi", None).unwrap();

    let view = comment(&store, &post.id, &alice, "fish & chips <3").unwrap();
    assert_eq!(view.comments[0].text, "fish & chips <3");
    assert_eq!(find_post(&store, &post.id).unwrap().comments[0].text, "fish & chips <3");
}
