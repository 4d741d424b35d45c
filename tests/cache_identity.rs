mod support;

use parlor::application::repos::CreateUserParams;
use parlor::cache::{CacheConfig, CountKey};
use parlor::domain::types::UserRole;
use support::{MemoryStore, cache_over, cache_with};

#[tokio::test]
async fn all_three_keys_resolve_to_the_same_record() {
    let store = MemoryStore::new();
    let user = store.seed_user("Carol", "Carol@Example.com", UserRole::Member);
    let cache = cache_over(&store);
    let identity = cache.identity();

    let by_id = identity.get_user_by_id(user.id).await.unwrap().unwrap();
    store.reset_calls();
    let by_name = identity.get_user_by_username("carol").await.unwrap().unwrap();
    let by_email = identity
        .get_user_by_email("CAROL@example.com")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(by_id, by_name);
    assert_eq!(by_id, by_email);
    // One lookup filled every key.
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn update_refreshes_every_key() {
    let store = MemoryStore::new();
    let user = store.seed_member("dave");
    let cache = cache_over(&store);
    let identity = cache.identity();

    let mut cached = identity
        .get_user_by_email("dave@example.com")
        .await
        .unwrap()
        .unwrap();
    cached.motto = "hello".to_string();
    identity.update_user(&cached).await.unwrap();

    store.reset_calls();
    let by_id = identity.get_user_by_id(user.id).await.unwrap().unwrap();
    let by_name = identity.get_user_by_username("dave").await.unwrap().unwrap();
    let by_email = identity
        .get_user_by_email("dave@example.com")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(by_id.motto, "hello");
    assert_eq!(by_id, by_name);
    assert_eq!(by_id, by_email);
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn rename_stops_resolving_the_old_username() {
    let store = MemoryStore::new();
    let user = store.seed_member("erin");
    let cache = cache_over(&store);
    let identity = cache.identity();

    let mut cached = identity.get_user_by_id(user.id).await.unwrap().unwrap();
    cached.username = "Erin2".to_string();
    identity.update_user(&cached).await.unwrap();

    assert!(identity.get_user_by_username("erin").await.unwrap().is_none());
    let renamed = identity.get_user_by_username("erin2").await.unwrap().unwrap();
    assert_eq!(renamed.id, user.id);
}

#[tokio::test]
async fn login_tries_username_then_email() {
    let store = MemoryStore::new();
    let user = store.seed_user("frank", "f.r@example.com", UserRole::Member);
    let cache = cache_over(&store);
    let identity = cache.identity();

    let by_email = identity
        .get_user_by_login("F.R@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_email.id, user.id);

    assert!(identity.get_user_by_login("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_users_are_not_cached() {
    let store = MemoryStore::new();
    let cache = cache_over(&store);
    let identity = cache.identity();

    assert!(identity.get_user_by_id(77).await.unwrap().is_none());
    assert!(identity.get_user_by_id(77).await.unwrap().is_none());
    assert_eq!(store.calls("find_user_by_id"), 2);
    assert!(identity.is_empty());
}

#[tokio::test]
async fn least_recent_user_is_evicted_with_all_its_keys() {
    let store = MemoryStore::new();
    let first = store.seed_member("gina");
    let second = store.seed_member("hank");
    let config = CacheConfig {
        users_limit: 1,
        ..Default::default()
    };
    let cache = cache_with(&store, config);
    let identity = cache.identity();

    identity.get_user_by_id(first.id).await.unwrap();
    identity.get_user_by_id(second.id).await.unwrap();
    assert_eq!(identity.len(), 1);
    assert!(!identity.contains(first.id));

    store.reset_calls();
    identity.get_user_by_username("gina").await.unwrap().unwrap();
    identity.get_user_by_email("gina@example.com").await.unwrap();
    // Username missed, then the refill made the email key a hit.
    assert_eq!(store.calls("find_user_by_username"), 1);
    assert_eq!(store.calls("find_user_by_email"), 0);
}

#[tokio::test]
async fn deleting_a_user_decrements_a_cached_total_in_place() {
    let store = MemoryStore::new();
    let user = store.seed_member("ivy");
    store.seed_member("jack");
    let cache = cache_over(&store);

    let before = cache.counts().count_all_users().await.unwrap();
    cache.identity().get_user_by_id(user.id).await.unwrap();

    cache.identity().delete_user(user.id).await.unwrap();
    store.reset_calls();

    assert_eq!(cache.counts().count_all_users().await.unwrap(), before - 1);
    assert_eq!(store.calls("count_users"), 0);
    assert!(!cache.identity().contains(user.id));
    assert!(
        cache
            .identity()
            .get_user_by_username("ivy")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn deleting_a_user_leaves_an_uncached_total_alone() {
    let store = MemoryStore::new();
    let user = store.seed_member("kim");
    store.seed_member("lee");
    let cache = cache_over(&store);

    cache.identity().delete_user(user.id).await.unwrap();
    assert!(!cache.counts().is_cached(&CountKey::AllUsers));

    store.reset_calls();
    assert_eq!(cache.counts().count_all_users().await.unwrap(), 1);
    assert_eq!(store.calls("count_users"), 1);
}

#[tokio::test]
async fn creating_a_user_caches_it_and_bumps_the_total() {
    let store = MemoryStore::new();
    store.seed_member("mia");
    let cache = cache_over(&store);
    assert_eq!(cache.counts().count_all_users().await.unwrap(), 1);

    let created = cache
        .identity()
        .create_user(CreateUserParams {
            username: "Ned".to_string(),
            email: "ned@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: UserRole::Unverified,
        })
        .await
        .unwrap();

    store.reset_calls();
    assert_eq!(cache.counts().count_all_users().await.unwrap(), 2);
    let by_name = cache
        .identity()
        .get_user_by_username("ned")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_name.id, created.id);
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn eviction_racing_a_lookup_is_not_overwritten() {
    let store = MemoryStore::new();
    let user = store.seed_member("olga");
    let cache = cache_over(&store);

    let (reached, release) = store.hold("find_user_by_id");
    let reader = {
        let cache = cache.clone();
        let id = user.id;
        tokio::spawn(async move { cache.identity().get_user_by_id(id).await })
    };

    reached.await.unwrap();
    cache.identity().evict_user(user.id);
    release.send(()).unwrap();

    assert_eq!(reader.await.unwrap().unwrap().unwrap().id, user.id);
    assert!(!cache.identity().contains(user.id));
}

#[tokio::test]
async fn creating_a_user_keeps_unrelated_misses_in_flight() {
    let store = MemoryStore::new();
    store.seed_member("pam");
    let cache = cache_over(&store);

    let (reached, release) = store.hold("count_topics");
    let reader = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.counts().count_all_topics().await })
    };
    reached.await.unwrap();
    cache
        .identity()
        .create_user(CreateUserParams {
            username: "quinn".to_string(),
            email: "quinn@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: UserRole::Member,
        })
        .await
        .unwrap();
    release.send(()).unwrap();

    assert_eq!(reader.await.unwrap().unwrap(), 0);
    assert!(cache.counts().is_cached(&CountKey::AllTopics));
}

#[tokio::test]
async fn a_total_miss_racing_user_creation_is_not_memoized() {
    let store = MemoryStore::new();
    store.seed_member("rita");
    let cache = cache_over(&store);

    let (reached, release) = store.hold("count_users");
    let reader = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.counts().count_all_users().await })
    };
    reached.await.unwrap();
    cache
        .identity()
        .create_user(CreateUserParams {
            username: "sam".to_string(),
            email: "sam@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: UserRole::Member,
        })
        .await
        .unwrap();
    release.send(()).unwrap();
    reader.await.unwrap().unwrap();

    assert!(!cache.counts().is_cached(&CountKey::AllUsers));
    assert_eq!(cache.counts().count_all_users().await.unwrap(), 2);
}
