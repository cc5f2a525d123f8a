use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, info};

use super::Marker;
use crate::error::Result;

/// Markers retained per key. Older payloads are evicted first.
pub const RECENT_MARKERS: usize = 4;

/// One cached payload and the marker it was built under.
#[derive(Debug)]
pub struct CacheEntry<P> {
    pub key: String,
    pub payload: Arc<P>,
    pub marker: Marker,
}

/// Explicit store of assembled results keyed by `(key, marker)`.
///
/// Each key remembers its last [`RECENT_MARKERS`] markers, most recent
/// first, so content that flips back to an earlier marker is served
/// without a rebuild. Entries are inserted whole and only after their
/// build succeeded.
#[derive(Debug)]
pub struct MarkerCache<P> {
    entries: HashMap<(String, Marker), CacheEntry<P>>,
    recent: HashMap<String, VecDeque<Marker>>,
    rebuilds: usize,
}

impl<P> Default for MarkerCache<P> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            recent: HashMap::new(),
            rebuilds: 0,
        }
    }
}

impl<P> MarkerCache<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the payload stored under `(key, marker)`, otherwise run
    /// `build` and store its result.
    ///
    /// A failing `build` leaves every stored entry in place.
    pub fn get_or_build<F>(&mut self, key: &str, marker: &Marker, build: F) -> Result<Arc<P>>
    where
        F: FnOnce() -> Result<P>,
    {
        let slot = (key.to_string(), marker.clone());
        if let Some(entry) = self.entries.get(&slot) {
            debug!("cache hit for {key} ({marker})");
            let payload = Arc::clone(&entry.payload);
            self.touch(key, marker);
            return Ok(payload);
        }

        info!("rebuilding {key} ({marker})");
        let payload = Arc::new(build()?);
        self.rebuilds += 1;
        self.entries.insert(
            slot,
            CacheEntry {
                key: key.to_string(),
                payload: Arc::clone(&payload),
                marker: marker.clone(),
            },
        );
        self.touch(key, marker);
        Ok(payload)
    }

    /// Move `marker` to the front of the key's recency list and evict
    /// whatever falls off the end.
    fn touch(&mut self, key: &str, marker: &Marker) {
        let recent = self.recent.entry(key.to_string()).or_default();
        recent.retain(|m| m != marker);
        recent.push_front(marker.clone());
        while recent.len() > RECENT_MARKERS {
            if let Some(old) = recent.pop_back() {
                debug!("evicting {key} ({old})");
                self.entries.remove(&(key.to_string(), old));
            }
        }
    }

    /// Last-known-good payload: the most recently served one for `key`.
    pub fn peek(&self, key: &str) -> Option<Arc<P>> {
        let marker = self.marker(key)?;
        self.entries
            .get(&(key.to_string(), marker.clone()))
            .map(|e| Arc::clone(&e.payload))
    }

    /// Marker of the most recently served payload for `key`.
    pub fn marker(&self, key: &str) -> Option<&Marker> {
        self.recent.get(key).and_then(|r| r.front())
    }

    /// Number of payloads held for `key`.
    pub fn versions(&self, key: &str) -> usize {
        self.recent.get(key).map_or(0, VecDeque::len)
    }

    pub fn invalidate(&mut self, key: &str) -> bool {
        match self.recent.remove(key) {
            Some(markers) => {
                for marker in markers {
                    self.entries.remove(&(key.to_string(), marker));
                }
                true
            }
            None => false,
        }
    }

    /// Number of successful rebuilds since creation.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    /// Number of distinct keys held.
    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::PipelineError;

    fn digest(s: &str) -> Marker {
        Marker::Digest {
            sha256: s.to_string(),
            epoch: 0,
        }
    }

    #[test]
    fn same_marker_builds_once() {
        let mut cache = MarkerCache::new();
        let calls = Cell::new(0);
        let build = || {
            calls.set(calls.get() + 1);
            Ok(vec![0.1_f64, 0.2])
        };

        let first = cache.get_or_build("k", &digest("a"), build).unwrap();
        let second = cache.get_or_build("k", &digest("a"), build).unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(cache.rebuilds(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
    }

    #[test]
    fn new_marker_becomes_current() {
        let mut cache = MarkerCache::new();
        cache.get_or_build("k", &digest("a"), || Ok(1)).unwrap();
        let fresh = cache.get_or_build("k", &digest("b"), || Ok(2)).unwrap();
        assert_eq!(*fresh, 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.versions("k"), 2);
        assert_eq!(cache.marker("k"), Some(&digest("b")));
        assert_eq!(cache.peek("k").as_deref(), Some(&2));
        assert_eq!(cache.rebuilds(), 2);
    }

    #[test]
    fn returning_marker_is_not_rebuilt() {
        let mut cache = MarkerCache::new();
        let calls = Cell::new(0);
        let build = |v: i32| {
            calls.set(calls.get() + 1);
            Ok(v)
        };

        let first = cache.get_or_build("k", &digest("a"), || build(1)).unwrap();
        cache.get_or_build("k", &digest("b"), || build(2)).unwrap();
        let again = cache.get_or_build("k", &digest("a"), || build(3)).unwrap();

        assert_eq!(calls.get(), 2);
        assert_eq!(cache.rebuilds(), 2);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(cache.marker("k"), Some(&digest("a")));
    }

    #[test]
    fn old_markers_are_evicted() {
        let mut cache = MarkerCache::new();
        for i in 0..=RECENT_MARKERS {
            cache
                .get_or_build("k", &digest(&i.to_string()), || Ok(i))
                .unwrap();
        }
        assert_eq!(cache.versions("k"), RECENT_MARKERS);
        assert_eq!(cache.rebuilds(), RECENT_MARKERS + 1);

        // the oldest marker fell off and has to be built again
        cache.get_or_build("k", &digest("0"), || Ok(0)).unwrap();
        assert_eq!(cache.rebuilds(), RECENT_MARKERS + 2);
        assert_eq!(cache.versions("k"), RECENT_MARKERS);
    }

    #[test]
    fn failed_rebuild_keeps_previous_entry() {
        let mut cache = MarkerCache::new();
        cache.get_or_build("k", &digest("a"), || Ok(1)).unwrap();
        let err = cache.get_or_build("k", &digest("b"), || {
            Err(PipelineError::parse("k", "broken"))
        });
        assert!(err.is_err());
        assert_eq!(cache.peek("k").as_deref(), Some(&1));
        assert_eq!(cache.marker("k"), Some(&digest("a")));
        assert_eq!(cache.rebuilds(), 1);
    }

    #[test]
    fn keys_are_independent() {
        let mut cache = MarkerCache::new();
        cache.get_or_build("a", &digest("x"), || Ok("a")).unwrap();
        cache.get_or_build("b", &digest("x"), || Ok("b")).unwrap();
        assert_eq!(cache.rebuilds(), 2);
        assert!(cache.invalidate("a"));
        assert!(cache.peek("a").is_none());
        assert_eq!(cache.peek("b").as_deref(), Some(&"b"));
    }
}
