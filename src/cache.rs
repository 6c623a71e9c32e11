//! Multi-key memoization of in-flight fetches.
//!
//! Each operation owns a map from lookup key to a shared future. The future
//! is inserted *before* it is first polled, so concurrent callers for the
//! same key during the same window share one underlying fetch. Entries stay
//! in place after completion, success or failure; nothing is evicted.

use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::error::DirectoryError;
use crate::types::Profile;

/// A memoized fetch: cloneable, poll-once-resolve-everywhere.
pub(crate) type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, DirectoryError>>>;

/// One operation's key -> in-flight-or-settled future map.
pub(crate) struct FutureCache<T: Clone> {
    entries: Mutex<HashMap<String, SharedFetch<T>>>,
}

impl<T: Clone + Send + 'static> FutureCache<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the entry for `key`, inserting the future built by `make`
    /// first when absent. The flag is true when this call inserted, which is
    /// the one moment cross-index registration should happen.
    pub(crate) fn get_or_insert_with<F>(&self, key: &str, make: F) -> (SharedFetch<T>, bool)
    where
        F: FnOnce() -> BoxFuture<'static, Result<T, DirectoryError>>,
    {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        if let Some(existing) = entries.get(key) {
            return (existing.clone(), false);
        }
        let fut = make().shared();
        entries.insert(key.to_string(), fut.clone());
        (fut, true)
    }

    /// Store an existing future under an additional key, replacing whatever
    /// was tracked there so both keys converge on the same future.
    pub(crate) fn insert_alias(&self, key: &str, fut: SharedFetch<T>) {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(key.to_string(), fut);
    }

    /// Store an already-resolved value under `key`.
    pub(crate) fn insert_ready(&self, key: &str, value: T) {
        let fut: BoxFuture<'static, Result<T, DirectoryError>> =
            futures::future::ready(Ok(value)).boxed();
        self.insert_alias(key, fut.shared());
    }

    pub(crate) fn get(&self, key: &str) -> Option<SharedFetch<T>> {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .get(key)
            .cloned()
    }
}

/// The four per-operation caches, cross-populated once an entity's identity
/// is known.
pub(crate) struct CacheRegistry {
    pub(crate) profiles: FutureCache<Profile>,
    pub(crate) photos: FutureCache<String>,
    pub(crate) managers: FutureCache<Profile>,
    pub(crate) directs: FutureCache<Vec<Profile>>,
}

impl CacheRegistry {
    pub(crate) fn new() -> Self {
        Self {
            profiles: FutureCache::new(),
            photos: FutureCache::new(),
            managers: FutureCache::new(),
            directs: FutureCache::new(),
        }
    }

    /// A profile fetch driven under `origin_key` resolved `profile`. Store
    /// the driving future under the resolved id and email, and alias any
    /// entries the other maps already track for `origin_key` under those
    /// same keys. Callers must not invoke this for a rejected future; errors
    /// are never cross-indexed.
    pub(crate) fn cross_index(
        &self,
        origin_key: &str,
        profile: &Profile,
        profile_fut: SharedFetch<Profile>,
    ) {
        let mut keys: Vec<&str> = vec![profile.id.as_str()];
        if let Some(email) = profile.email.as_deref() {
            keys.push(email);
        }
        debug!(origin = %origin_key, id = %profile.id, "cross-indexing resolved identity");

        for key in &keys {
            self.profiles.insert_alias(key, profile_fut.clone());
        }
        alias_existing(&self.photos, origin_key, &keys);
        alias_existing(&self.managers, origin_key, &keys);
        alias_existing(&self.directs, origin_key, &keys);
    }

    /// A fetch resolved some *other* entity's profile (the manager of the
    /// requested key). Seed the profile map under that entity's identity so
    /// a later profile lookup for it hits cache.
    pub(crate) fn seed_profile(&self, profile: &Profile, fut: SharedFetch<Profile>) {
        self.profiles.insert_alias(&profile.id, fut.clone());
        if let Some(email) = profile.email.as_deref() {
            self.profiles.insert_alias(email, fut);
        }
    }

    /// Seed each resolved direct-report member under its own identity,
    /// amortizing future per-person lookups.
    pub(crate) fn seed_members(&self, members: &[Profile]) {
        for member in members {
            self.profiles.insert_ready(&member.id, member.clone());
            if let Some(email) = member.email.as_deref() {
                self.profiles.insert_ready(email, member.clone());
            }
        }
    }
}

fn alias_existing<T: Clone + Send + 'static>(cache: &FutureCache<T>, origin: &str, keys: &[&str]) {
    if let Some(fut) = cache.get(origin) {
        for key in keys {
            if *key != origin {
                cache.insert_alias(key, fut.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_profile(id: &str, email: Option<&str>) -> Profile {
        Profile {
            id: id.to_string(),
            display_name: None,
            job_title: None,
            department: None,
            email: email.map(str::to_string),
            office_location: None,
            city: None,
            business_phone: None,
            im_address: None,
            company_name: None,
        }
    }

    fn pending_fetch<T: Clone>(value: Result<T, DirectoryError>) -> SharedFetch<T>
    where
        T: Send + 'static,
    {
        let fut: BoxFuture<'static, Result<T, DirectoryError>> =
            futures::future::ready(value).boxed();
        fut.shared()
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_future() {
        let cache: FutureCache<u32> = FutureCache::new();
        let mut calls = 0;

        let (first, inserted_first) = cache.get_or_insert_with("k", || {
            calls += 1;
            futures::future::ready(Ok(7)).boxed()
        });
        let (second, inserted_second) = cache.get_or_insert_with("k", || {
            calls += 1;
            futures::future::ready(Ok(99)).boxed()
        });

        assert!(inserted_first);
        assert!(!inserted_second);
        assert_eq!(calls, 1, "second lookup must not start a new fetch");
        assert_eq!(first.await.unwrap(), 7);
        assert_eq!(second.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_failed_future_stays_under_its_key() {
        let cache: FutureCache<u32> = FutureCache::new();
        let (fut, _) = cache.get_or_insert_with("k", || {
            futures::future::ready(Err(DirectoryError::NotFound)).boxed()
        });
        assert!(fut.await.unwrap_err().is_not_found());

        // No retry: the rejected future is still the cached entry.
        let (again, inserted) = cache.get_or_insert_with("k", || {
            futures::future::ready(Ok(1)).boxed()
        });
        assert!(!inserted);
        assert!(again.await.is_err());
    }

    #[tokio::test]
    async fn test_cross_index_aliases_profile_and_sibling_maps() {
        let registry = CacheRegistry::new();
        let profile = ready_profile("id-1", Some("a@example.com"));
        let profile_fut = pending_fetch(Ok(profile.clone()));

        // A photo fetched earlier under the same origin key.
        let photo_fut = pending_fetch(Ok("data:image/jpeg;base64,AAAA".to_string()));
        registry.photos.insert_alias("a@example.com", photo_fut);

        registry.cross_index("a@example.com", &profile, profile_fut);

        assert!(registry.profiles.get("id-1").is_some());
        assert!(registry.profiles.get("a@example.com").is_some());
        // The photo entry is now reachable through the resolved id too.
        assert!(registry.photos.get("id-1").is_some());
        // Maps with no entry for the origin key stay untouched.
        assert!(registry.managers.get("id-1").is_none());
    }

    #[tokio::test]
    async fn test_seed_members_populates_profile_cache() {
        let registry = CacheRegistry::new();
        let members = vec![
            ready_profile("m-1", Some("m1@example.com")),
            ready_profile("m-2", None),
        ];
        registry.seed_members(&members);

        let cached = registry.profiles.get("m1@example.com").expect("seeded");
        assert_eq!(cached.await.unwrap().id, "m-1");
        assert!(registry.profiles.get("m-2").is_some());
    }
}
