//! Process-wide engine guard.
//!
//! The shared engine is created once, on first use or by an explicit
//! `init`, and torn down by `cleanup`. The lock only protects the slot: a
//! caller clones the `Arc` and releases it before any transfer starts.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::EngineConfig;
use crate::engine::UreqEngine;

static ENGINE: Mutex<Option<Arc<UreqEngine>>> = Mutex::new(None);

fn slot() -> MutexGuard<'static, Option<Arc<UreqEngine>>> {
    ENGINE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Return the shared engine, creating it from `EngineConfig::from_env` if
/// needed. Concurrent callers all observe the same instance.
pub fn init() -> Arc<UreqEngine> {
    let mut slot = slot();
    if let Some(engine) = slot.as_ref() {
        return Arc::clone(engine);
    }
    let config = EngineConfig::from_env();
    tracing::debug!(user_agent = %config.user_agent, "initializing shared engine");
    let engine = Arc::new(UreqEngine::new(config));
    *slot = Some(Arc::clone(&engine));
    engine
}

pub fn is_initialized() -> bool {
    slot().is_some()
}

/// Drop the shared engine. Transfers already holding it finish normally.
///
/// Returns whether an engine was live.
pub fn cleanup() -> bool {
    let released = slot().take().is_some();
    if released {
        tracing::debug!("shared engine released");
    }
    released
}

#[cfg(test)]
mod tests {
    use super::*;

    // The only test in this binary that touches the shared slot.
    #[test]
    fn init_is_shared_until_cleanup() {
        let first = init();
        let handles: Vec<_> = (0..4).map(|_| std::thread::spawn(init)).collect();
        for handle in handles {
            assert!(Arc::ptr_eq(&first, &handle.join().unwrap()));
        }
        assert!(is_initialized());

        assert!(cleanup());
        assert!(!cleanup());
        assert!(!is_initialized());

        let fresh = init();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_eq!(fresh.config(), first.config());
    }
}
