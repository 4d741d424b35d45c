//! In-memory forum store for cache tests.
//!
//! Counts every query by name so tests can tell hits from misses, and can be
//! switched into a failing mode or paused mid-query.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use parlor::application::repos::{
    CategoriesRepo, CategoriesWriteRepo, CreatePostParams, CreateTopicParams, CreateUserParams,
    ForumStore, PostScope, PostsRepo, PostsWriteRepo, RepoError, SectionsWriteRepo, TopicScope,
    TopicsRepo, TopicsWriteRepo, UpdateCategoryParams, UpdatePostParams, UpdateSectionParams,
    UpdateTopicParams, UsersRepo, UsersWriteRepo,
};
use parlor::cache::{CacheConfig, ForumCache};
use parlor::domain::entities::{
    CategoryRecord, PostRecord, SectionRecord, TopicRecord, UserRecord, normalize_login,
};
use parlor::domain::types::UserRole;
use time::{Duration, OffsetDateTime};
use tokio::sync::oneshot;

#[derive(Default)]
struct Tables {
    next_id: i64,
    clock: i64,
    users: BTreeMap<i64, UserRecord>,
    sections: BTreeMap<i64, SectionRecord>,
    categories: BTreeMap<i64, CategoryRecord>,
    topics: BTreeMap<i64, TopicRecord>,
    posts: BTreeMap<i64, PostRecord>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn tick(&mut self) -> OffsetDateTime {
        self.clock += 1;
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(self.clock)
    }

    fn topic_ids_in_category(&self, category_id: i64) -> BTreeSet<i64> {
        self.topics
            .values()
            .filter(|topic| topic.category_id == category_id)
            .map(|topic| topic.id)
            .collect()
    }

    fn remove_topic(&mut self, topic_id: i64) {
        self.topics.remove(&topic_id);
        self.posts.retain(|_, post| post.topic_id != topic_id);
    }

    fn remove_category(&mut self, category_id: i64) {
        for topic_id in self.topic_ids_in_category(category_id) {
            self.remove_topic(topic_id);
        }
        self.categories.remove(&category_id);
    }
}

/// A query paused until the test releases it.
struct Hold {
    query: &'static str,
    reached: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failing: AtomicBool,
    hold: Mutex<Option<Hold>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// How many times `query` has run since the last reset.
    pub fn calls(&self, query: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(query)
            .copied()
            .unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make every subsequent query fail with a persistence error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Pause the next run of `query`.
    ///
    /// Returns a receiver that fires once the query is parked and a sender
    /// that lets it finish.
    pub fn hold(&self, query: &'static str) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(Hold {
            query,
            reached: reached_tx,
            release: release_rx,
        });
        (reached_rx, release_tx)
    }

    async fn enter(&self, query: &'static str) -> Result<(), RepoError> {
        *self.calls.lock().unwrap().entry(query).or_default() += 1;

        let parked = {
            let mut hold = self.hold.lock().unwrap();
            match hold.take() {
                Some(h) if h.query == query => Some(h),
                other => {
                    *hold = other;
                    None
                }
            }
        };
        if let Some(hold) = parked {
            let _ = hold.reached.send(());
            let _ = hold.release.await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("store unavailable"));
        }
        Ok(())
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    // ---- seeding; bypasses the cache and the call counters ----

    pub fn seed_user(&self, username: &str, email: &str, role: UserRole) -> UserRecord {
        let mut tables = self.tables();
        let id = tables.next_id();
        let now = tables.tick();
        let user = UserRecord {
            id,
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role,
            motto: String::new(),
            profile_pic_url: String::new(),
            signature: String::new(),
            email_verified: true,
            is_banned: false,
            banned_until: None,
            ban_reason: String::new(),
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(id, user.clone());
        user
    }

    pub fn seed_member(&self, username: &str) -> UserRecord {
        self.seed_user(
            username,
            &format!("{username}@example.com"),
            UserRole::Member,
        )
    }

    pub fn seed_section(&self, name: &str) -> SectionRecord {
        let mut tables = self.tables();
        let id = tables.next_id();
        let now = tables.tick();
        let section = SectionRecord {
            id,
            name: name.to_string(),
            description: String::new(),
            position: 0,
            created_at: now,
            updated_at: now,
        };
        tables.sections.insert(id, section.clone());
        section
    }

    pub fn seed_category(&self, section_id: i64, name: &str) -> CategoryRecord {
        let mut tables = self.tables();
        let id = tables.next_id();
        let now = tables.tick();
        let category = CategoryRecord {
            id,
            section_id,
            name: name.to_string(),
            description: String::new(),
            position: 0,
            created_at: now,
            updated_at: now,
        };
        tables.categories.insert(id, category.clone());
        category
    }

    /// A topic with its opening post.
    pub fn seed_topic(&self, category_id: i64, author_id: i64, title: &str) -> TopicRecord {
        let mut tables = self.tables();
        let (topic, opening) = insert_topic(&mut tables, category_id, author_id, title, "opening");
        tables.posts.insert(opening.id, opening);
        tables.topics.insert(topic.id, topic.clone());
        topic
    }

    pub fn seed_reply(&self, topic_id: i64, author_id: i64) -> PostRecord {
        let mut tables = self.tables();
        insert_reply(&mut tables, topic_id, author_id, "reply")
    }

    /// Drop a post straight from the tables, as another process would.
    pub fn remove_post_behind_cache(&self, post_id: i64) {
        self.tables().posts.remove(&post_id);
    }

    pub fn user(&self, id: i64) -> Option<UserRecord> {
        self.tables().users.get(&id).cloned()
    }
}

fn insert_topic(
    tables: &mut Tables,
    category_id: i64,
    author_id: i64,
    title: &str,
    content: &str,
) -> (TopicRecord, PostRecord) {
    let topic_id = tables.next_id();
    let post_id = tables.next_id();
    let now = tables.tick();
    let topic = TopicRecord {
        id: topic_id,
        category_id,
        author_id,
        title: title.to_string(),
        pinned: false,
        locked: false,
        replied_at: now,
        created_at: now,
        updated_at: now,
    };
    let opening = PostRecord {
        id: post_id,
        topic_id,
        author_id,
        content: content.to_string(),
        ai_probability: None,
        created_at: now,
        updated_at: now,
    };
    (topic, opening)
}

fn insert_reply(tables: &mut Tables, topic_id: i64, author_id: i64, content: &str) -> PostRecord {
    let id = tables.next_id();
    let now = tables.tick();
    let post = PostRecord {
        id,
        topic_id,
        author_id,
        content: content.to_string(),
        ai_probability: None,
        created_at: now,
        updated_at: now,
    };
    if let Some(topic) = tables.topics.get_mut(&topic_id) {
        topic.replied_at = now;
    }
    tables.posts.insert(id, post.clone());
    post
}

fn len(n: usize) -> u64 {
    u64::try_from(n).unwrap()
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn count_users(&self) -> Result<u64, RepoError> {
        self.enter("count_users").await?;
        Ok(len(self.tables().users.len()))
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        self.enter("find_user_by_id").await?;
        Ok(self.tables().users.get(&id).cloned())
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        self.enter("find_user_by_username").await?;
        let wanted = normalize_login(username);
        Ok(self
            .tables()
            .users
            .values()
            .find(|user| user.username_key() == wanted)
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        self.enter("find_user_by_email").await?;
        let wanted = normalize_login(email);
        Ok(self
            .tables()
            .users
            .values()
            .find(|user| user.email_key() == wanted)
            .cloned())
    }
}

#[async_trait]
impl UsersWriteRepo for MemoryStore {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        self.enter("create_user").await?;
        let mut tables = self.tables();
        let taken = tables.users.values().any(|user| {
            user.username_key() == normalize_login(&params.username)
                || user.email_key() == normalize_login(&params.email)
        });
        if taken {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        let id = tables.next_id();
        let now = tables.tick();
        let user = UserRecord {
            id,
            username: params.username,
            email: params.email,
            password_hash: params.password_hash,
            role: params.role,
            motto: String::new(),
            profile_pic_url: String::new(),
            signature: String::new(),
            email_verified: false,
            is_banned: false,
            banned_until: None,
            ban_reason: String::new(),
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, user: &UserRecord) -> Result<UserRecord, RepoError> {
        self.enter("update_user").await?;
        let mut tables = self.tables();
        if !tables.users.contains_key(&user.id) {
            return Err(RepoError::NotFound);
        }
        let mut stored = user.clone();
        stored.updated_at = tables.tick();
        tables.users.insert(user.id, stored.clone());
        Ok(stored)
    }

    async fn delete_user(&self, id: i64) -> Result<(), RepoError> {
        self.enter("delete_user").await?;
        self.tables()
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl TopicsRepo for MemoryStore {
    async fn count_topics(&self, scope: TopicScope) -> Result<u64, RepoError> {
        self.enter("count_topics").await?;
        let tables = self.tables();
        let n = tables
            .topics
            .values()
            .filter(|topic| match scope {
                TopicScope::All => true,
                TopicScope::Category(id) => topic.category_id == id,
                TopicScope::Author(id) => topic.author_id == id,
            })
            .count();
        Ok(len(n))
    }

    async fn find_topic(&self, id: i64) -> Result<Option<TopicRecord>, RepoError> {
        self.enter("find_topic").await?;
        Ok(self.tables().topics.get(&id).cloned())
    }

    async fn list_topics_in_category(
        &self,
        category_id: i64,
    ) -> Result<Vec<TopicRecord>, RepoError> {
        self.enter("list_topics_in_category").await?;
        let mut topics: Vec<_> = self
            .tables()
            .topics
            .values()
            .filter(|topic| topic.category_id == category_id)
            .cloned()
            .collect();
        topics.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then(b.replied_at.cmp(&a.replied_at))
                .then(b.id.cmp(&a.id))
        });
        Ok(topics)
    }

    async fn list_topics_by_author(&self, author_id: i64) -> Result<Vec<TopicRecord>, RepoError> {
        self.enter("list_topics_by_author").await?;
        Ok(self
            .tables()
            .topics
            .values()
            .rev()
            .filter(|topic| topic.author_id == author_id)
            .cloned()
            .collect())
    }

    async fn list_topic_ids_in_category(&self, category_id: i64) -> Result<Vec<i64>, RepoError> {
        self.enter("list_topic_ids_in_category").await?;
        Ok(self
            .tables()
            .topic_ids_in_category(category_id)
            .into_iter()
            .collect())
    }
}

#[async_trait]
impl TopicsWriteRepo for MemoryStore {
    async fn create_topic(
        &self,
        params: CreateTopicParams,
    ) -> Result<(TopicRecord, PostRecord), RepoError> {
        self.enter("create_topic").await?;
        let mut tables = self.tables();
        if !tables.categories.contains_key(&params.category_id) {
            return Err(RepoError::InvalidInput {
                message: "unknown category".to_string(),
            });
        }
        let (topic, opening) = insert_topic(
            &mut tables,
            params.category_id,
            params.author_id,
            &params.title,
            &params.content,
        );
        tables.topics.insert(topic.id, topic.clone());
        tables.posts.insert(opening.id, opening.clone());
        Ok((topic, opening))
    }

    async fn update_topic(&self, params: UpdateTopicParams) -> Result<TopicRecord, RepoError> {
        self.enter("update_topic").await?;
        let mut tables = self.tables();
        let now = tables.tick();
        let topic = tables
            .topics
            .get_mut(&params.id)
            .ok_or(RepoError::NotFound)?;
        topic.title = params.title;
        topic.pinned = params.pinned;
        topic.locked = params.locked;
        topic.updated_at = now;
        Ok(topic.clone())
    }

    async fn delete_topic(&self, id: i64) -> Result<(), RepoError> {
        self.enter("delete_topic").await?;
        let mut tables = self.tables();
        if !tables.topics.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        tables.remove_topic(id);
        Ok(())
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        self.enter("count_posts").await?;
        let tables = self.tables();
        let in_category = match scope {
            PostScope::Category(id) => tables.topic_ids_in_category(id),
            _ => BTreeSet::new(),
        };
        let n = tables
            .posts
            .values()
            .filter(|post| match scope {
                PostScope::All => true,
                PostScope::Category(_) => in_category.contains(&post.topic_id),
                PostScope::Topic(id) => post.topic_id == id,
                PostScope::Author(id) => post.author_id == id,
            })
            .count();
        Ok(len(n))
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        self.enter("find_post").await?;
        Ok(self.tables().posts.get(&id).cloned())
    }

    async fn list_posts_in_topic(&self, topic_id: i64) -> Result<Vec<PostRecord>, RepoError> {
        self.enter("list_posts_in_topic").await?;
        Ok(self
            .tables()
            .posts
            .values()
            .filter(|post| post.topic_id == topic_id)
            .cloned()
            .collect())
    }

    async fn list_posts_by_author(&self, author_id: i64) -> Result<Vec<PostRecord>, RepoError> {
        self.enter("list_posts_by_author").await?;
        Ok(self
            .tables()
            .posts
            .values()
            .rev()
            .filter(|post| post.author_id == author_id)
            .cloned()
            .collect())
    }

    async fn list_posts_in_category(
        &self,
        category_id: i64,
    ) -> Result<Vec<PostRecord>, RepoError> {
        self.enter("list_posts_in_category").await?;
        let tables = self.tables();
        let topics = tables.topic_ids_in_category(category_id);
        Ok(tables
            .posts
            .values()
            .rev()
            .filter(|post| topics.contains(&post.topic_id))
            .cloned()
            .collect())
    }

    async fn list_poster_ids_in_topic(&self, topic_id: i64) -> Result<Vec<i64>, RepoError> {
        self.enter("list_poster_ids_in_topic").await?;
        let posters: BTreeSet<i64> = self
            .tables()
            .posts
            .values()
            .filter(|post| post.topic_id == topic_id)
            .map(|post| post.author_id)
            .collect();
        Ok(posters.into_iter().collect())
    }

    async fn list_poster_ids_in_category(&self, category_id: i64) -> Result<Vec<i64>, RepoError> {
        self.enter("list_poster_ids_in_category").await?;
        let tables = self.tables();
        let topics = tables.topic_ids_in_category(category_id);
        let mut posters: BTreeSet<i64> = tables
            .posts
            .values()
            .filter(|post| topics.contains(&post.topic_id))
            .map(|post| post.author_id)
            .collect();
        posters.extend(
            topics
                .iter()
                .filter_map(|id| tables.topics.get(id))
                .map(|topic| topic.author_id),
        );
        Ok(posters.into_iter().collect())
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        self.enter("create_post").await?;
        let mut tables = self.tables();
        if !tables.topics.contains_key(&params.topic_id) {
            return Err(RepoError::InvalidInput {
                message: "unknown topic".to_string(),
            });
        }
        Ok(insert_reply(
            &mut tables,
            params.topic_id,
            params.author_id,
            &params.content,
        ))
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        self.enter("update_post").await?;
        let mut tables = self.tables();
        let now = tables.tick();
        let post = tables
            .posts
            .get_mut(&params.id)
            .ok_or(RepoError::NotFound)?;
        post.content = params.content;
        post.updated_at = now;
        Ok(post.clone())
    }

    async fn set_ai_probability(
        &self,
        id: i64,
        probability: f32,
    ) -> Result<PostRecord, RepoError> {
        self.enter("set_ai_probability").await?;
        let mut tables = self.tables();
        let post = tables.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        post.ai_probability = Some(probability);
        Ok(post.clone())
    }

    async fn delete_post(&self, id: i64) -> Result<(), RepoError> {
        self.enter("delete_post").await?;
        self.tables()
            .posts
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl CategoriesRepo for MemoryStore {
    async fn find_category(&self, id: i64) -> Result<Option<CategoryRecord>, RepoError> {
        self.enter("find_category").await?;
        Ok(self.tables().categories.get(&id).cloned())
    }

    async fn list_category_ids_in_section(&self, section_id: i64) -> Result<Vec<i64>, RepoError> {
        self.enter("list_category_ids_in_section").await?;
        Ok(self
            .tables()
            .categories
            .values()
            .filter(|category| category.section_id == section_id)
            .map(|category| category.id)
            .collect())
    }
}

#[async_trait]
impl CategoriesWriteRepo for MemoryStore {
    async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        self.enter("update_category").await?;
        let mut tables = self.tables();
        let now = tables.tick();
        let category = tables
            .categories
            .get_mut(&params.id)
            .ok_or(RepoError::NotFound)?;
        category.section_id = params.section_id;
        category.name = params.name;
        category.description = params.description;
        category.updated_at = now;
        Ok(category.clone())
    }

    async fn delete_category(&self, id: i64) -> Result<(), RepoError> {
        self.enter("delete_category").await?;
        let mut tables = self.tables();
        if !tables.categories.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        tables.remove_category(id);
        Ok(())
    }
}

#[async_trait]
impl SectionsWriteRepo for MemoryStore {
    async fn update_section(
        &self,
        params: UpdateSectionParams,
    ) -> Result<SectionRecord, RepoError> {
        self.enter("update_section").await?;
        let mut tables = self.tables();
        let now = tables.tick();
        let section = tables
            .sections
            .get_mut(&params.id)
            .ok_or(RepoError::NotFound)?;
        section.name = params.name;
        section.description = params.description;
        section.updated_at = now;
        Ok(section.clone())
    }

    async fn delete_section(&self, id: i64) -> Result<(), RepoError> {
        self.enter("delete_section").await?;
        let mut tables = self.tables();
        if tables.sections.remove(&id).is_none() {
            return Err(RepoError::NotFound);
        }
        let categories: Vec<i64> = tables
            .categories
            .values()
            .filter(|category| category.section_id == id)
            .map(|category| category.id)
            .collect();
        for category_id in categories {
            tables.remove_category(category_id);
        }
        Ok(())
    }
}

/// A cache over `store` with default capacities.
pub fn cache_over(store: &Arc<MemoryStore>) -> ForumCache {
    cache_with(store, CacheConfig::default())
}

pub fn cache_with(store: &Arc<MemoryStore>, config: CacheConfig) -> ForumCache {
    let store: Arc<dyn ForumStore> = store.clone();
    ForumCache::new(&config, store)
}

/// A small board: one section, one category, one topic opened by `alice`
/// with a single reply from `bob`.
pub struct Board {
    pub store: Arc<MemoryStore>,
    pub alice: UserRecord,
    pub bob: UserRecord,
    pub section: SectionRecord,
    pub category: CategoryRecord,
    pub topic: TopicRecord,
    pub reply: PostRecord,
}

impl Board {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let alice = store.seed_member("alice");
        let bob = store.seed_member("bob");
        let section = store.seed_section("General");
        let category = store.seed_category(section.id, "Lounge");
        let topic = store.seed_topic(category.id, alice.id, "Hello");
        let reply = store.seed_reply(topic.id, bob.id);
        Self {
            store,
            alice,
            bob,
            section,
            category,
            topic,
            reply,
        }
    }
}
