use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use serde::{de::DeserializeOwned, Serialize};
use spin_sdk::wit::wasi::keyvalue::atomics::{self, Cas, CasError};
use spin_sdk::wit::wasi::keyvalue::store::{self as wasi_kv, Bucket};
use tracing::{debug, info};

use crate::config::USERS_LIST_KEY;
use crate::follow::follow;
use crate::models::models::User;
use crate::posts::create_post;
use crate::users::{create_user, NewUser};

const MAX_SWAP_ATTEMPTS: usize = 16;

/// Closure applied by `modify_bytes`. It may run more than once.
pub type ModifyFn<'a> = dyn FnMut(Option<Vec<u8>>) -> anyhow::Result<Option<Vec<u8>>> + 'a;

/// Document store used by every component. Values are JSON documents
/// addressed by string keys; `modify_bytes` is the only read-modify-write
/// primitive and every backend makes it atomic per key.
pub trait KvStore {
    fn get_bytes(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    fn set_bytes(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;

    fn delete_key(&self, key: &str) -> anyhow::Result<()>;

    /// Replaces the document at `key` with the closure's output. Returning
    /// `Ok(None)` leaves the document untouched. The closure is re-run
    /// when another writer changes the key first, so it must not call the
    /// store.
    fn modify_bytes(&self, key: &str, f: &mut ModifyFn<'_>) -> anyhow::Result<()>;

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get_bytes(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        self.set_bytes(key, &serde_json::to_vec(value)?)
    }

    /// Applies `f` to an existing document. Returns `None` without writing
    /// when the key is absent.
    fn update_json<T, F>(&self, key: &str, mut f: F) -> anyhow::Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(&mut T) -> anyhow::Result<()>,
    {
        let mut updated = None;
        self.modify_bytes(key, &mut |current: Option<Vec<u8>>| -> anyhow::Result<Option<Vec<u8>>> {
            updated = None;
            let Some(bytes) = current else {
                return Ok(None);
            };
            let mut value: T = serde_json::from_slice(&bytes)?;
            f(&mut value)?;
            let next = serde_json::to_vec(&value)?;
            updated = Some(value);
            Ok(Some(next))
        })?;
        Ok(updated)
    }

    /// Like `update_json`, starting from `T::default()` when the key is absent.
    fn upsert_json<T, F>(&self, key: &str, mut f: F) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnMut(&mut T),
    {
        let mut updated = None;
        self.modify_bytes(key, &mut |current: Option<Vec<u8>>| -> anyhow::Result<Option<Vec<u8>>> {
            let mut value: T = match current {
                Some(bytes) => serde_json::from_slice(&bytes)?,
                None => T::default(),
            };
            f(&mut value);
            let next = serde_json::to_vec(&value)?;
            updated = Some(value);
            Ok(Some(next))
        })?;
        updated.ok_or_else(|| anyhow!("upsert of {} produced no value", key))
    }
}

/// One compare-and-swap handle on a single key.
pub trait CasSlot: Sized {
    fn current(&self) -> anyhow::Result<Option<Vec<u8>>>;

    /// Writes `value` if the key is unchanged since the handle was taken.
    /// On conflict the write is dropped and a handle on the newer value is
    /// returned instead.
    fn swap(self, value: &[u8]) -> anyhow::Result<Result<(), Self>>;
}

/// Applies `f` through `slot`, re-reading and re-applying it after every
/// conflicting write, up to a fixed number of attempts.
pub fn swap_with_retry<C: CasSlot>(
    mut slot: C,
    key: &str,
    f: &mut ModifyFn<'_>,
) -> anyhow::Result<()> {
    for attempt in 1..=MAX_SWAP_ATTEMPTS {
        let Some(next) = f(slot.current()?)? else {
            return Ok(());
        };
        match slot.swap(&next)? {
            Ok(()) => return Ok(()),
            Err(fresh) => {
                debug!(key, attempt, "concurrent write, retrying");
                slot = fresh;
            }
        }
    }
    Err(anyhow!(
        "gave up updating {} after {} conflicting writes",
        key,
        MAX_SWAP_ATTEMPTS
    ))
}

/// The Spin component's store: the default `wasi:keyvalue` bucket, with
/// read-modify-write done through its atomics interface.
pub struct SpinStore {
    bucket: Bucket,
}

struct SpinCas(Cas);

impl CasSlot for SpinCas {
    fn current(&self) -> anyhow::Result<Option<Vec<u8>>> {
        self.0
            .current()
            .map_err(|e| anyhow!("failed to read cas value: {:?}", e))
    }

    fn swap(self, value: &[u8]) -> anyhow::Result<Result<(), Self>> {
        match atomics::swap(self.0, value) {
            Ok(()) => Ok(Ok(())),
            Err(CasError::CasFailed(fresh)) => Ok(Err(SpinCas(fresh))),
            Err(CasError::StoreError(e)) => Err(anyhow!("failed to swap value: {:?}", e)),
        }
    }
}

pub fn open_store() -> anyhow::Result<SpinStore> {
    let bucket = wasi_kv::open("default")
        .map_err(|e| anyhow!("failed to open key-value store: {:?}", e))?;
    Ok(SpinStore { bucket })
}

impl KvStore for SpinStore {
    fn get_bytes(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.bucket
            .get(key)
            .map_err(|e| anyhow!("failed to read {}: {:?}", key, e))
    }

    fn set_bytes(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.bucket
            .set(key, value)
            .map_err(|e| anyhow!("failed to write {}: {:?}", key, e))
    }

    fn delete_key(&self, key: &str) -> anyhow::Result<()> {
        self.bucket
            .delete(key)
            .map_err(|e| anyhow!("failed to delete {}: {:?}", key, e))
    }

    fn modify_bytes(&self, key: &str, f: &mut ModifyFn<'_>) -> anyhow::Result<()> {
        let cas = Cas::new(&self.bucket, key)
            .map_err(|e| anyhow!("failed to open cas on {}: {:?}", key, e))?;
        swap_with_retry(SpinCas(cas), key, f)
    }
}

/// Process-local store backing the native server and the tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl KvStore for MemoryStore {
    fn get_bytes(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set_bytes(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.entries()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete_key(&self, key: &str) -> anyhow::Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }

    fn modify_bytes(&self, key: &str, f: &mut ModifyFn<'_>) -> anyhow::Result<()> {
        let mut entries = self.entries()?;
        if let Some(next) = f(entries.get(key).cloned())? {
            entries.insert(key.to_string(), next);
        }
        Ok(())
    }
}

/// Creates the demo accounts (alice, bob, carol; password "password")
/// unless a user with the demo email already exists.
pub fn seed_demo_data<S: KvStore>(store: &S) -> anyhow::Result<()> {
    let users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    for id in &users {
        if let Some(u) = store.get_json::<User>(&crate::config::user_key(id))? {
            if u.email == "alice@example.com" {
                return Ok(());
            }
        }
    }

    let mut ids = Vec::new();
    for (name, about) in [
        ("alice", "Hello, I'm Alice!"),
        ("bob", "Bob's corner of the internet"),
        ("carol", "Mostly photos"),
    ] {
        let user = create_user(
            store,
            NewUser {
                name: name.to_string(),
                email: format!("{}@example.com", name),
                password: "password".to_string(),
            },
        )
        .map_err(|e| anyhow!("seeding {}: {}", name, e))?;
        crate::users::update_user(
            store,
            &user.id,
            crate::users::UserUpdate {
                about: Some(about.to_string()),
                ..Default::default()
            },
        )
        .map_err(|e| anyhow!("seeding {}: {}", name, e))?;
        ids.push(user.id);
    }

    let (alice, bob, carol) = (&ids[0], &ids[1], &ids[2]);
    let seed_posts = [
        (alice, "Welcome to my board! Excited to share thoughts here."),
        (bob, "Hey everyone! Just joined, looking forward to connecting with you all."),
        (carol, "First photo dump coming soon."),
    ];
    for (author, text) in seed_posts {
        create_post(store, author, text, None).map_err(|e| anyhow!("seeding post: {}", e))?;
    }

    follow(store, alice, bob).map_err(|e| anyhow!("seeding follow: {}", e))?;
    follow(store, bob, alice).map_err(|e| anyhow!("seeding follow: {}", e))?;

    info!(users = ids.len(), "seeded demo data");
    Ok(())
}
