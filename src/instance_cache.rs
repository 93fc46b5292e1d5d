//! Process-wide instance cache with fork detection.
//!
//! Constructing a backend with the same type and the same token-relevant
//! arguments returns the existing `Arc` rather than a fresh instance. A
//! generic `static` inside a generic function is shared across
//! monomorphizations rather than duplicated per type, so the cache is a
//! single global map keyed on `TypeId` instead.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, OnceLock};

use std::sync::Arc;

struct CacheState {
    map: HashMap<(TypeId, u64), Arc<dyn Any + Send + Sync>>,
    /// Construction order, oldest first; used by [`current`] to find the
    /// most recently constructed instance of a type without relying on
    /// `HashMap` iteration order.
    order: Vec<(TypeId, u64)>,
    last_pid: u32,
}

fn global() -> &'static Mutex<CacheState> {
    static CACHE: OnceLock<Mutex<CacheState>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(CacheState {
            map: HashMap::new(),
            order: Vec::new(),
            last_pid: std::process::id(),
        })
    })
}

/// Compute the token identifying a backend instance: a hash of the type id,
/// process id, thread id, constructor arguments, and sorted options. Two
/// calls with the same `(TypeId, args, options)` on the same thread produce
/// the same token; a construction on a different thread never collides,
/// even with identical args, so a handle built on thread A is never
/// silently handed back to thread B.
pub fn compute_token<T: 'static>(args: &str, options: &[(&str, &str)]) -> u64 {
    let mut sorted: Vec<&(&str, &str)> = options.iter().collect();
    sorted.sort();
    let mut hasher = DefaultHasher::new();
    TypeId::of::<T>().hash(&mut hasher);
    std::process::id().hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);
    args.hash(&mut hasher);
    for (k, v) in sorted {
        k.hash(&mut hasher);
        v.hash(&mut hasher);
    }
    hasher.finish()
}

/// Drop every cached instance, clear the fork watermark. Called explicitly,
/// or implicitly by [`get_or_construct`] when the pid changes underneath us.
pub fn clear_instance_cache() {
    let mut state = global().lock().unwrap();
    state.map.clear();
    state.order.clear();
    state.last_pid = std::process::id();
}

/// Look up (or construct, via `ctor`) the cached instance for `(T, token)`.
///
/// If the process id has changed since the cache was last touched (we were
/// forked), the whole cache is dropped first: backend instances typically
/// hold open sockets/file descriptors that are not safely shared across a
/// fork boundary.
pub fn get_or_construct<T, F>(token: u64, skip_cache: bool, ctor: F) -> crate::error::Result<Arc<T>>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> crate::error::Result<T>,
{
    if skip_cache {
        return Ok(Arc::new(ctor()?));
    }

    let mut state = global().lock().unwrap();
    let current_pid = std::process::id();
    if current_pid != state.last_pid {
        tracing::debug!(old_pid = state.last_pid, new_pid = current_pid, "fork detected, clearing instance cache");
        state.map.clear();
        state.order.clear();
        state.last_pid = current_pid;
    }

    let key = (TypeId::of::<T>(), token);
    if let Some(existing) = state.map.get(&key) {
        if let Ok(downcast) = existing.clone().downcast::<T>() {
            tracing::trace!("instance cache hit");
            return Ok(downcast);
        }
    }

    let fresh = Arc::new(ctor()?);
    state.map.insert(key, fresh.clone());
    state.order.push(key);
    tracing::debug!("instance cache miss, constructed new instance");
    Ok(fresh)
}

/// Return the most recently constructed instance of `T`, constructing a
/// default one (outside the cache) if none has ever been built.
pub fn current<T: Default + Send + Sync + 'static>() -> Arc<T> {
    let state = global().lock().unwrap();
    for key in state.order.iter().rev() {
        if key.0 == TypeId::of::<T>() {
            if let Some(value) = state.map.get(key) {
                if let Ok(downcast) = value.clone().downcast::<T>() {
                    return downcast;
                }
            }
        }
    }
    drop(state);
    Arc::new(T::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Probe(u32);

    #[test]
    fn same_token_returns_same_instance() {
        clear_instance_cache();
        let a = get_or_construct::<Probe, _>(42, false, || Ok(Probe(1))).unwrap();
        let b = get_or_construct::<Probe, _>(42, false, || Ok(Probe(2))).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.0, 1);
    }

    #[test]
    fn different_token_constructs_new_instance() {
        clear_instance_cache();
        let a = get_or_construct::<Probe, _>(1, false, || Ok(Probe(1))).unwrap();
        let b = get_or_construct::<Probe, _>(2, false, || Ok(Probe(2))).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn skip_cache_always_constructs_fresh() {
        clear_instance_cache();
        let a = get_or_construct::<Probe, _>(7, true, || Ok(Probe(1))).unwrap();
        let b = get_or_construct::<Probe, _>(7, true, || Ok(Probe(2))).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn clear_forces_reconstruction() {
        clear_instance_cache();
        let a = get_or_construct::<Probe, _>(9, false, || Ok(Probe(1))).unwrap();
        clear_instance_cache();
        let b = get_or_construct::<Probe, _>(9, false, || Ok(Probe(2))).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.0, 2);
    }

    #[test]
    fn current_returns_most_recently_constructed() {
        clear_instance_cache();
        get_or_construct::<Probe, _>(100, false, || Ok(Probe(1))).unwrap();
        get_or_construct::<Probe, _>(101, false, || Ok(Probe(2))).unwrap();
        assert_eq!(current::<Probe>().0, 2);
    }

    #[test]
    fn current_constructs_default_when_empty() {
        clear_instance_cache();
        assert_eq!(current::<Probe>().0, 0);
    }

    #[test]
    fn token_is_stable_for_same_inputs() {
        let t1 = compute_token::<Probe>("a", &[("x", "1"), ("y", "2")]);
        let t2 = compute_token::<Probe>("a", &[("y", "2"), ("x", "1")]);
        assert_eq!(t1, t2, "option order must not affect the token");
    }

    #[test]
    fn token_differs_for_different_args() {
        let t1 = compute_token::<Probe>("a", &[]);
        let t2 = compute_token::<Probe>("b", &[]);
        assert_ne!(t1, t2);
    }
}
