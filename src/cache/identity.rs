//! Identity cache for user records.
//!
//! A user is reachable by id, username and email. Records live in one LRU table
//! keyed by id; usernames and emails map to that id through two side indexes
//! that are only ever written together with the record. Either all three keys
//! resolve to the same record or none of them do.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use metrics::counter;
use tracing::{debug, info, instrument};

use crate::application::repos::{CreateUserParams, ForumStore, RepoError};
use crate::domain::entities::{UserRecord, normalize_login};

use super::config::CacheConfig;
use super::counts::CountCache;
use super::lock::mutex_lock;
use super::memo::{Generation, METRIC_EVICT, METRIC_HIT, METRIC_MISS, METRIC_STALE_PUT};

const CACHE_NAME: &str = "users";

/// One of the three natural keys of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Probe {
    Id(i64),
    Username(String),
    Email(String),
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::Id(id) => write!(f, "user:id:{id}"),
            Probe::Username(name) => write!(f, "user:username:{name}"),
            Probe::Email(email) => write!(f, "user:email:{email}"),
        }
    }
}

struct IdentityIndex {
    records: LruCache<i64, UserRecord>,
    by_username: HashMap<String, i64>,
    by_email: HashMap<String, i64>,
    generation: Generation,
}

impl IdentityIndex {
    fn lookup(&mut self, probe: &Probe) -> Option<UserRecord> {
        let id = match probe {
            Probe::Id(id) => *id,
            Probe::Username(name) => *self.by_username.get(name)?,
            Probe::Email(email) => *self.by_email.get(email)?,
        };
        self.records.get(&id).cloned()
    }

    /// Insert or replace a record together with both secondary keys.
    ///
    /// Keys left over from an earlier state of the same user are dropped, as
    /// is any other record still claiming the new username or email.
    fn insert(&mut self, user: UserRecord) {
        self.unlink(user.id);

        let username = user.username_key();
        let email = user.email_key();
        for claimant in [
            self.by_username.get(&username).copied(),
            self.by_email.get(&email).copied(),
        ]
        .into_iter()
        .flatten()
        {
            if claimant != user.id {
                self.drop_record(claimant);
            }
        }

        let id = user.id;
        match self.records.push(id, user) {
            Some((evicted_id, evicted)) if evicted_id != id => {
                self.unlink_record(evicted_id, &evicted);
                counter!(METRIC_EVICT, "cache" => CACHE_NAME).increment(1);
            }
            _ => {}
        }
        self.by_username.insert(username, id);
        self.by_email.insert(email, id);
    }

    /// Drop a record and its secondary keys. Returns whether it was cached.
    fn drop_record(&mut self, id: i64) -> bool {
        match self.records.pop(&id) {
            Some(record) => {
                self.unlink_record(id, &record);
                true
            }
            None => false,
        }
    }

    /// Remove the secondary keys of the currently cached state of `id`.
    fn unlink(&mut self, id: i64) {
        if let Some(record) = self.records.peek(&id) {
            let username = record.username_key();
            let email = record.email_key();
            remove_if_owned(&mut self.by_username, &username, id);
            remove_if_owned(&mut self.by_email, &email, id);
        }
    }

    fn unlink_record(&mut self, id: i64, record: &UserRecord) {
        remove_if_owned(&mut self.by_username, &record.username_key(), id);
        remove_if_owned(&mut self.by_email, &record.email_key(), id);
    }

    fn advance(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

fn remove_if_owned(index: &mut HashMap<String, i64>, key: &str, id: i64) {
    if index.get(key) == Some(&id) {
        index.remove(key);
    }
}

pub struct IdentityCache {
    index: Mutex<IdentityIndex>,
    store: Arc<dyn ForumStore>,
    counts: Arc<CountCache>,
}

impl IdentityCache {
    pub fn new(config: &CacheConfig, store: Arc<dyn ForumStore>, counts: Arc<CountCache>) -> Self {
        Self {
            index: Mutex::new(IdentityIndex {
                records: LruCache::new(config.users_limit_non_zero()),
                by_username: HashMap::new(),
                by_email: HashMap::new(),
                generation: 0,
            }),
            store,
            counts,
        }
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        self.read_through(Probe::Id(id), || self.store.find_user_by_id(id))
            .await
    }

    pub async fn get_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        let key = normalize_login(username);
        let probe = Probe::Username(key.clone());
        self.read_through(probe, || async move {
            self.store.find_user_by_username(&key).await
        })
        .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let key = normalize_login(email);
        let probe = Probe::Email(key.clone());
        self.read_through(probe, || async move {
            self.store.find_user_by_email(&key).await
        })
        .await
    }

    /// Sign-in lookup: a login is tried as a username first, then as an email.
    pub async fn get_user_by_login(&self, login: &str) -> Result<Option<UserRecord>, RepoError> {
        if let Some(user) = self.get_user_by_username(login).await? {
            return Ok(Some(user));
        }
        self.get_user_by_email(login).await
    }

    /// Create a user in the store and cache it under all three keys.
    ///
    /// The global user total is bumped only if it is already cached.
    #[instrument(skip(self, params), fields(username = %params.username))]
    pub async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let user = self.store.create_user(params).await?;

        mutex_lock(&self.index, CACHE_NAME, "create_user").insert(user.clone());
        self.counts.invalidate_counts_for_user(user.id);
        self.counts.adjust_user_count(1);

        info!(user_id = user.id, "User created");
        Ok(user)
    }

    /// Write a user back to the store and recache the stored state.
    ///
    /// A changed username or email no longer resolves afterwards.
    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn update_user(&self, user: &UserRecord) -> Result<UserRecord, RepoError> {
        let updated = self.store.update_user(user).await?;

        {
            let mut index = mutex_lock(&self.index, CACHE_NAME, "update_user");
            index.advance();
            index.insert(updated.clone());
        }
        self.counts.invalidate_counts_for_user(updated.id);

        Ok(updated)
    }

    /// Delete a user from the store and drop every key that reached it.
    ///
    /// The global user total is decremented only if it is already cached.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: i64) -> Result<(), RepoError> {
        self.store.delete_user(id).await?;

        self.evict_user(id);
        self.counts.invalidate_counts_for_user(id);
        self.counts.adjust_user_count(-1);

        info!(user_id = id, "User deleted");
        Ok(())
    }

    /// Drop all three keys of a user without touching the store.
    pub fn evict_user(&self, id: i64) -> bool {
        let mut index = mutex_lock(&self.index, CACHE_NAME, "evict_user");
        index.advance();
        index.drop_record(id)
    }

    pub fn purge(&self) {
        let mut index = mutex_lock(&self.index, CACHE_NAME, "purge");
        index.advance();
        index.records.clear();
        index.by_username.clear();
        index.by_email.clear();
    }

    /// Whether a user id is currently cached. Does not affect recency.
    pub fn contains(&self, id: i64) -> bool {
        mutex_lock(&self.index, CACHE_NAME, "contains")
            .records
            .contains(&id)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.index, CACHE_NAME, "len").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn read_through<F, Fut>(
        &self,
        probe: Probe,
        fetch: F,
    ) -> Result<Option<UserRecord>, RepoError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<UserRecord>, RepoError>>,
    {
        let seen = {
            let mut index = mutex_lock(&self.index, CACHE_NAME, "get");
            if let Some(user) = index.lookup(&probe) {
                counter!(METRIC_HIT, "cache" => CACHE_NAME).increment(1);
                debug!(cache = CACHE_NAME, outcome = "hit", key = %probe);
                return Ok(Some(user));
            }
            index.generation
        };
        counter!(METRIC_MISS, "cache" => CACHE_NAME).increment(1);
        debug!(cache = CACHE_NAME, outcome = "miss", key = %probe);

        let Some(user) = fetch().await? else {
            return Ok(None);
        };

        let mut index = mutex_lock(&self.index, CACHE_NAME, "put_if_current");
        if index.generation == seen {
            index.insert(user.clone());
        } else {
            debug!(
                cache = CACHE_NAME,
                outcome = "stale_put_rejected",
                key = %probe,
                "Invalidation raced a read-through; result not memoized"
            );
            counter!(METRIC_STALE_PUT, "cache" => CACHE_NAME).increment(1);
        }
        Ok(Some(user))
    }
}
