use std::cell::RefCell;
use std::collections::HashMap;

use mesh::config::USERS_LIST_KEY;
use mesh::core::db::{seed_demo_data, swap_with_retry, CasSlot, KvStore, MemoryStore, ModifyFn};
use mesh::feed::compute_feed;
use mesh::users::{list_users, verify_credential};

#[test]
fn update_json_skips_missing_documents() {
    let store = MemoryStore::new();

    let updated = store
        .update_json("missing", |v: &mut Vec<String>| {
            v.push("x".to_string());
            Ok(())
        })
        .unwrap();

    assert!(updated.is_none());
    assert!(store.get_bytes("missing").unwrap().is_none());
}

#[test]
fn failed_update_leaves_document_untouched() {
    let store = MemoryStore::new();
    store.set_json("doc", &vec!["a".to_string()]).unwrap();

    let result = store.update_json("doc", |v: &mut Vec<String>| {
        v.clear();
        anyhow::bail!("nope")
    });

    assert!(result.is_err());
    assert_eq!(store.get_json::<Vec<String>>("doc").unwrap(), Some(vec!["a".to_string()]));
}

#[test]
fn upsert_starts_from_default() {
    let store = MemoryStore::new();

    let list = store
        .upsert_json("list", |v: &mut Vec<u32>| v.push(7))
        .unwrap();
    assert_eq!(list, vec![7]);

    store.upsert_json("list", |v: &mut Vec<u32>| v.push(8)).unwrap();
    assert_eq!(store.get_json::<Vec<u32>>("list").unwrap(), Some(vec![7, 8]));

    store.delete_key("list").unwrap();
    assert!(store.get_json::<Vec<u32>>("list").unwrap().is_none());
}

#[test]
fn concurrent_upserts_do_not_lose_writes() {
    let store = MemoryStore::new();

    std::thread::scope(|s| {
        for i in 0..8 {
            let store = &store;
            s.spawn(move || {
                for j in 0..25 {
                    store
                        .upsert_json("ids", |v: &mut Vec<u32>| v.push(i * 100 + j))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(store.get_json::<Vec<u32>>("ids").unwrap().unwrap().len(), 200);
}

#[test]
fn demo_seed_runs_once() {
    let store = MemoryStore::new();

    seed_demo_data(&store).unwrap();
    seed_demo_data(&store).unwrap();

    let ids: Vec<String> = store.get_json(USERS_LIST_KEY).unwrap().unwrap();
    assert_eq!(ids.len(), 3);
    assert_eq!(list_users(&store).unwrap().len(), 3);

    let alice = verify_credential(&store, "alice@example.com", "password").unwrap();
    // alice follows bob: her own post plus bob's.
    assert_eq!(compute_feed(&store, &alice.id).unwrap().len(), 2);
}

/// Store whose swaps lose to a queued rival writer until the queue is empty.
/// A rival appends its id to the list at the key, or deletes the key when
/// it has none.
#[derive(Default)]
struct ContendedStore {
    entries: RefCell<HashMap<String, Vec<u8>>>,
    rivals: RefCell<Vec<Option<String>>>,
}

struct Slot<'a> {
    store: &'a ContendedStore,
    key: String,
}

impl CasSlot for Slot<'_> {
    fn current(&self) -> anyhow::Result<Option<Vec<u8>>> {
        self.store.get_bytes(&self.key)
    }

    fn swap(self, value: &[u8]) -> anyhow::Result<Result<(), Self>> {
        let rival = self.store.rivals.borrow_mut().pop();
        match rival {
            Some(Some(id)) => {
                let mut ids: Vec<String> = self.store.get_json(&self.key)?.unwrap_or_default();
                ids.push(id);
                self.store.set_json(&self.key, &ids)?;
                Ok(Err(self))
            }
            Some(None) => {
                self.store.delete_key(&self.key)?;
                Ok(Err(self))
            }
            None => {
                self.store.set_bytes(&self.key, value)?;
                Ok(Ok(()))
            }
        }
    }
}

impl KvStore for ContendedStore {
    fn get_bytes(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set_bytes(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.entries.borrow_mut().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete_key(&self, key: &str) -> anyhow::Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn modify_bytes(&self, key: &str, f: &mut ModifyFn<'_>) -> anyhow::Result<()> {
        let slot = Slot {
            store: self,
            key: key.to_string(),
        };
        swap_with_retry(slot, key, f)
    }
}

#[test]
fn conflicting_writes_are_retried_not_lost() {
    let store = ContendedStore::default();
    store.set_json("likes", &vec!["carol".to_string()]).unwrap();
    store
        .rivals
        .borrow_mut()
        .extend([Some("bob".to_string()), Some("dave".to_string())]);

    let mut runs = 0;
    let likes = store
        .update_json("likes", |likes: &mut Vec<String>| {
            runs += 1;
            likes.push("alice".to_string());
            Ok(())
        })
        .unwrap()
        .unwrap();

    assert_eq!(runs, 3);
    assert_eq!(likes, vec!["carol", "dave", "bob", "alice"]);
    assert_eq!(store.get_json::<Vec<String>>("likes").unwrap(), Some(likes));
}

#[test]
fn update_sees_a_concurrent_delete() {
    let store = ContendedStore::default();
    store.set_json("doc", &vec!["a".to_string()]).unwrap();
    store.rivals.borrow_mut().push(None);

    let updated = store
        .update_json("doc", |v: &mut Vec<String>| {
            v.push("x".to_string());
            Ok(())
        })
        .unwrap();

    assert!(updated.is_none());
    assert!(store.get_bytes("doc").unwrap().is_none());
}

#[test]
fn endless_conflicts_give_up_with_an_error() {
    let store = ContendedStore::default();
    store
        .rivals
        .borrow_mut()
        .extend((0..100).map(|i| Some(format!("rival-{}", i))));

    let result = store.upsert_json("likes", |likes: &mut Vec<String>| likes.push("alice".to_string()));

    assert!(result.is_err());
    let stored: Vec<String> = store.get_json("likes").unwrap().unwrap();
    assert!(!stored.contains(&"alice".to_string()));
}
