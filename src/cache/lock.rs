use std::sync::{Mutex, MutexGuard};

use metrics::counter;
use tracing::warn;

const METRIC_LOCK_POISON_RECOVERED: &str = "parlor_cache_lock_poison_recovered_total";

/// Acquire a container lock, taking the inner state back if a previous holder
/// panicked. Cached values are snapshots of the store, so the worst outcome of
/// reusing poisoned state is a stale entry, never a lost write.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    container: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                cache = container,
                lock_kind = "mutex.lock",
                result = "poisoned_recovered",
                hint = "state may be stale after panic in another thread",
                "Recovered from poisoned cache lock"
            );
            counter!(METRIC_LOCK_POISON_RECOVERED, "cache" => container).increment(1);
            poisoned.into_inner()
        }
    }
}
