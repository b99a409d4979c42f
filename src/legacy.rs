//! Deprecated process-wide font cache settings.
//!
//! Font metrics used to be cached in a directory picked through two global
//! settings. They no longer influence anything, but reads and writes keep
//! working so older callers do not break. Every touch emits a deprecation
//! warning through `log` and bumps [`deprecation_count`].

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const CACHE_DIR_KEY: &str = "CACHE_DIR";
pub const CACHE_MODE_KEY: &str = "CACHE_MODE";

static DEPRECATIONS: AtomicUsize = AtomicUsize::new(0);

static NAMESPACE: Lazy<Mutex<LegacyNamespace>> = Lazy::new(|| Mutex::new(LegacyNamespace::default()));

#[derive(Debug, Default)]
struct LegacyNamespace {
    cache_dir: Option<PathBuf>,
    cache_mode: u8,
    attributes: HashMap<String, String>,
}

/// Records a use of a deprecated API. Execution always continues.
pub fn warn_deprecated(subject: &str, advice: &str) {
    DEPRECATIONS.fetch_add(1, Ordering::Relaxed);
    log::warn!("{subject} is deprecated and has no effect; {advice}");
}

/// Number of deprecation warnings emitted by this process so far.
pub fn deprecation_count() -> usize {
    DEPRECATIONS.load(Ordering::Relaxed)
}

pub fn cache_dir() -> Option<PathBuf> {
    warn_deprecated(CACHE_DIR_KEY, "font metrics are computed on demand");
    NAMESPACE
        .lock()
        .map(|ns| ns.cache_dir.clone())
        .unwrap_or_default()
}

pub fn set_cache_dir(dir: Option<PathBuf>) {
    warn_deprecated(CACHE_DIR_KEY, "font metrics are computed on demand");
    if let Ok(mut ns) = NAMESPACE.lock() {
        ns.cache_dir = dir;
    }
}

pub fn cache_mode() -> u8 {
    warn_deprecated(CACHE_MODE_KEY, "font metrics are computed on demand");
    NAMESPACE.lock().map(|ns| ns.cache_mode).unwrap_or(0)
}

pub fn set_cache_mode(mode: u8) {
    warn_deprecated(CACHE_MODE_KEY, "font metrics are computed on demand");
    if let Ok(mut ns) = NAMESPACE.lock() {
        ns.cache_mode = mode;
    }
}

/// Reads a setting by name. Only the cache keys are deprecated.
pub fn attribute(name: &str) -> Option<String> {
    match name {
        CACHE_DIR_KEY => cache_dir().map(|dir| dir.to_string_lossy().into_owned()),
        CACHE_MODE_KEY => Some(cache_mode().to_string()),
        _ => NAMESPACE
            .lock()
            .ok()
            .and_then(|ns| ns.attributes.get(name).cloned()),
    }
}

/// Writes a setting by name. Unknown names are stored as given.
pub fn set_attribute(name: &str, value: impl Into<String>) {
    let value = value.into();
    match name {
        CACHE_DIR_KEY => {
            let dir = if value.is_empty() {
                None
            } else {
                Some(PathBuf::from(value))
            };
            set_cache_dir(dir);
        }
        CACHE_MODE_KEY => set_cache_mode(value.trim().parse().unwrap_or(0)),
        _ => {
            if let Ok(mut ns) = NAMESPACE.lock() {
                ns.attributes.insert(name.to_string(), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The counter is process wide and other tests may bump it concurrently,
    // so these only assert that it moved.

    #[test]
    fn cache_accessors_warn_and_still_work() {
        let before = deprecation_count();
        set_cache_dir(Some(PathBuf::from("/tmp")));
        let after_set = deprecation_count();
        assert!(after_set > before);

        let _ = cache_dir();
        assert!(deprecation_count() > after_set);

        let before_mode = deprecation_count();
        set_cache_mode(1);
        let _ = cache_mode();
        assert!(deprecation_count() >= before_mode + 2);
    }

    #[test]
    fn cache_keys_route_through_deprecated_accessors() {
        let before = deprecation_count();
        set_attribute(CACHE_MODE_KEY, "1");
        assert!(attribute(CACHE_MODE_KEY).is_some());
        assert!(deprecation_count() >= before + 2);
    }

    #[test]
    fn other_attributes_are_not_blocked() {
        set_attribute("SOME", "1");
        assert_eq!(attribute("SOME").as_deref(), Some("1"));
        assert_eq!(attribute("MISSING_KEY"), None);
    }
}
