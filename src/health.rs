use std::fmt;

use parking_lot::Mutex;

/// Base URL of one upstream API instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MirrorEndpoint(String);

impl MirrorEndpoint {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self(base.trim().trim_end_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full URL of `path` on this mirror.
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }
}

impl fmt::Display for MirrorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct HealthState {
    healthy: Option<usize>,
    cursor: usize,
    generation: u64,
}

/// Which mirror is believed healthy, and where the next probe round starts.
///
/// The healthy entry is stored as an index into the mirror list, so it can
/// only ever name a configured mirror. Every write bumps `generation`.
#[derive(Debug)]
pub struct HealthCache {
    mirrors: Vec<MirrorEndpoint>,
    state: Mutex<HealthState>,
}

impl HealthCache {
    /// Returns `None` for an empty mirror list.
    pub fn new(mirrors: Vec<MirrorEndpoint>) -> Option<Self> {
        if mirrors.is_empty() {
            return None;
        }

        Some(Self {
            mirrors,
            state: Mutex::new(HealthState {
                healthy: None,
                cursor: 0,
                generation: 0,
            }),
        })
    }

    pub fn mirrors(&self) -> &[MirrorEndpoint] {
        &self.mirrors
    }

    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.state.lock().cursor
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn cached_healthy(&self) -> Option<MirrorEndpoint> {
        let state = self.state.lock();
        state.healthy.map(|i| self.mirrors[i].clone())
    }

    /// Mirrors in probe order: starting at the cursor, wrapping around.
    pub fn probe_order(&self) -> Vec<MirrorEndpoint> {
        let cursor = self.cursor();
        self.mirrors
            .iter()
            .cycle()
            .skip(cursor)
            .take(self.mirrors.len())
            .cloned()
            .collect()
    }

    fn position(&self, endpoint: &MirrorEndpoint) -> Option<usize> {
        self.mirrors.iter().position(|m| m == endpoint)
    }

    /// Caches `endpoint` as healthy. Unknown endpoints are ignored.
    pub fn mark_healthy(&self, endpoint: &MirrorEndpoint) -> bool {
        let Some(idx) = self.position(endpoint) else {
            warn!("Refusing to cache unknown mirror {}", endpoint);
            return false;
        };

        let mut state = self.state.lock();
        state.healthy = Some(idx);
        state.generation += 1;
        debug!("Mirror {} marked healthy", endpoint);
        true
    }

    /// Like [`mark_healthy`](Self::mark_healthy), but only if nothing else was
    /// written since `generation` was read.
    pub fn mark_healthy_since(&self, endpoint: &MirrorEndpoint, generation: u64) -> bool {
        let Some(idx) = self.position(endpoint) else {
            warn!("Refusing to cache unknown mirror {}", endpoint);
            return false;
        };

        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(
                "Discarding stale probe result for {} (generation {} != {})",
                endpoint, generation, state.generation
            );
            return false;
        }
        state.healthy = Some(idx);
        state.generation += 1;
        debug!("Mirror {} marked healthy", endpoint);
        true
    }

    /// Forgets the cached mirror and moves the cursor one step forward.
    pub fn mark_unhealthy(&self) {
        let mut state = self.state.lock();
        if let Some(idx) = state.healthy.take() {
            debug!("Mirror {} marked unhealthy", self.mirrors[idx]);
        }
        state.cursor = (state.cursor + 1) % self.mirrors.len();
        state.generation += 1;
    }

    /// Like [`mark_unhealthy`](Self::mark_unhealthy), but only while
    /// `endpoint` is still the cached mirror. A failure seen through a mirror
    /// that has since been replaced leaves the newer entry alone.
    pub fn mark_unhealthy_if(&self, endpoint: &MirrorEndpoint) -> bool {
        let mut state = self.state.lock();
        match state.healthy {
            Some(idx) if self.mirrors[idx] == *endpoint => {
                debug!("Mirror {} marked unhealthy", endpoint);
                state.healthy = None;
                state.cursor = (state.cursor + 1) % self.mirrors.len();
                state.generation += 1;
                true
            }
            _ => {
                debug!("Ignoring failure on {}, no longer the cached mirror", endpoint);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(n: usize) -> HealthCache {
        let mirrors = (0..n)
            .map(|i| MirrorEndpoint::new(format!("https://mirror{}.example", i)))
            .collect();
        HealthCache::new(mirrors).expect("Could not create cache")
    }

    #[test]
    fn endpoint_join() {
        let ep = MirrorEndpoint::new(" https://api.example/ ");
        assert_eq!(ep.as_str(), "https://api.example");
        assert_eq!(ep.join("/api/v1/streams/x"), "https://api.example/api/v1/streams/x");
        assert_eq!(ep.join("trending"), "https://api.example/trending");
    }

    #[test]
    fn empty_list_is_refused() {
        assert!(HealthCache::new(Vec::new()).is_none());
    }

    #[test]
    fn healthy_until_unhealthy() {
        let c = cache(3);
        assert!(c.cached_healthy().is_none());

        let x = c.mirrors()[1].clone();
        assert!(c.mark_healthy(&x));
        assert_eq!(c.cached_healthy(), Some(x.clone()));
        assert_eq!(c.cached_healthy(), Some(x));
        assert_eq!(c.cursor(), 0);

        c.mark_unhealthy();
        assert!(c.cached_healthy().is_none());
        assert_eq!(c.cursor(), 1);
    }

    #[test]
    fn cursor_wraps() {
        let c = cache(3);
        for expected in [1, 2, 0, 1] {
            c.mark_unhealthy();
            assert_eq!(c.cursor(), expected);
        }
    }

    #[test]
    fn unknown_endpoint_is_not_cached() {
        let c = cache(2);
        assert!(!c.mark_healthy(&MirrorEndpoint::new("https://elsewhere.example")));
        assert!(c.cached_healthy().is_none());
    }

    #[test]
    fn probe_order_starts_at_cursor() {
        let c = cache(3);
        c.mark_unhealthy();
        c.mark_unhealthy();
        let order = c
            .probe_order()
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                "https://mirror2.example",
                "https://mirror0.example",
                "https://mirror1.example"
            ]
        );
    }

    #[test]
    fn failure_only_clears_matching_mirror() {
        let c = cache(3);
        let (a, b) = (c.mirrors()[0].clone(), c.mirrors()[1].clone());

        c.mark_healthy(&b);
        assert!(!c.mark_unhealthy_if(&a));
        assert_eq!(c.cached_healthy(), Some(b.clone()));
        assert_eq!(c.cursor(), 0);

        assert!(c.mark_unhealthy_if(&b));
        assert!(c.cached_healthy().is_none());
        assert_eq!(c.cursor(), 1);

        // Already cleared: nothing left to invalidate
        assert!(!c.mark_unhealthy_if(&b));
        assert_eq!(c.cursor(), 1);
    }

    #[test]
    fn stale_write_is_discarded() {
        let c = cache(3);
        let (a, b) = (c.mirrors()[0].clone(), c.mirrors()[1].clone());

        let stale = c.generation();
        let fresh = c.generation();
        assert!(c.mark_healthy_since(&b, fresh));
        assert!(!c.mark_healthy_since(&a, stale));
        assert_eq!(c.cached_healthy(), Some(b));
    }
}
