//! Exclusion pattern compilation and caching.
//!
//! # Responsibilities
//! - Compile glob exclusion lists (`*` one segment, `**` any depth)
//! - Memoize compiled sets per distinct list value
//! - Atomic full refresh when configuration changes
//!
//! # Design Decisions
//! - Keyed by list content, not identity: equal lists share one compiled set
//! - The live map sits behind an `ArcSwap`; refresh swaps in an empty map so
//!   readers see either the old map or the new one, never a half-cleared one
//! - Blank patterns are ignored; an empty list excludes nothing

use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

/// A compiled exclusion list.
#[derive(Debug, Clone)]
pub struct PatternSet {
    set: GlobSet,
}

impl PatternSet {
    /// A set that matches nothing.
    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
        }
    }

    /// Returns true if any pattern matches the path.
    pub fn is_match(&self, path: &str) -> bool {
        !self.set.is_empty() && self.set.is_match(path)
    }

    /// Number of compiled globs (a `/**` pattern contributes two).
    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

fn glob(pattern: &str) -> Result<Glob, globset::Error> {
    GlobBuilder::new(pattern).literal_separator(true).build()
}

/// Compile one pattern into its globs.
///
/// A trailing `/**` also matches the bare prefix, so `/actuator/**`
/// covers `/actuator` as well as everything below it.
pub fn compile_pattern(pattern: &str) -> Result<Vec<Glob>, globset::Error> {
    let pattern = pattern.trim();
    let mut globs = vec![glob(pattern)?];
    if let Some(prefix) = pattern.strip_suffix("/**") {
        if !prefix.is_empty() {
            globs.push(glob(prefix)?);
        }
    }
    Ok(globs)
}

/// Compile a list of patterns, skipping blanks.
///
/// Patterns that fail to compile are skipped with a warning; configuration
/// validation rejects them before they get here.
pub fn compile(patterns: &[String]) -> PatternSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns.iter().filter(|p| !p.trim().is_empty()) {
        match compile_pattern(pattern) {
            Ok(globs) => {
                for g in globs {
                    builder.add(g);
                }
            }
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "Skipping invalid exclude pattern");
            }
        }
    }

    match builder.build() {
        Ok(set) => PatternSet { set },
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build exclusion set, excluding nothing");
            PatternSet::empty()
        }
    }
}

type PatternMap = DashMap<Vec<String>, Arc<PatternSet>>;

/// Read-through cache from exclusion list to compiled pattern set.
#[derive(Debug, Default)]
pub struct ExclusionCache {
    entries: ArcSwap<PatternMap>,
}

impl ExclusionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiled set for a list, computing it at most once between refreshes.
    pub fn pattern_set(&self, patterns: &[String]) -> Arc<PatternSet> {
        let entries = self.entries.load();
        if let Some(set) = entries.get(patterns) {
            return Arc::clone(set.value());
        }

        // entry() holds the shard lock, so concurrent first writers for the
        // same list compile once.
        let set = entries
            .entry(patterns.to_vec())
            .or_insert_with(|| Arc::new(compile(patterns)));
        Arc::clone(set.value())
    }

    /// Returns true if the path matches any pattern of the list.
    pub fn is_excluded(&self, path: &str, patterns: &[String]) -> bool {
        if patterns.iter().all(|p| p.trim().is_empty()) {
            return false;
        }
        self.pattern_set(patterns).is_match(path)
    }

    /// Drop every compiled set; entries are rebuilt lazily on next use.
    pub fn refresh(&self) {
        self.entries.store(Arc::new(PatternMap::new()));
        tracing::debug!("Exclusion cache refreshed");
    }

    /// Number of distinct lists currently compiled.
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn single_star_stays_in_one_segment() {
        let set = compile(&list(&["/api/*/health"]));
        assert!(set.is_match("/api/v1/health"));
        assert!(!set.is_match("/api/v1/x/health"));
    }

    #[test]
    fn double_star_spans_segments_and_bare_prefix() {
        let set = compile(&list(&["/actuator/**"]));
        assert!(set.is_match("/actuator"));
        assert!(set.is_match("/actuator/health"));
        assert!(set.is_match("/actuator/metrics/jvm"));
        assert!(!set.is_match("/actuatorx"));
        assert!(!set.is_match("/api/actuator/health"));
    }

    #[test]
    fn empty_and_blank_lists_exclude_nothing() {
        let cache = ExclusionCache::new();
        assert!(!cache.is_excluded("/anything", &[]));
        assert!(!cache.is_excluded("/anything", &list(&["", "  "])));
        assert!(cache.is_empty());
    }

    #[test]
    fn invalid_patterns_are_skipped() {
        let set = compile(&list(&["/a/[oops", "/b/**"]));
        assert!(set.is_match("/b/c"));
        assert!(!set.is_match("/a/[oops"));
    }

    #[test]
    fn equal_lists_share_one_compiled_set() {
        let cache = ExclusionCache::new();
        let first = cache.pattern_set(&list(&["/open/**"]));
        let second = cache.pattern_set(&list(&["/open/**"]));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        cache.pattern_set(&list(&["/other"]));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn refresh_clears_and_recomputes_lazily() {
        let cache = ExclusionCache::new();
        let patterns = list(&["/open/**"]);
        let before = cache.pattern_set(&patterns);
        assert!(cache.is_excluded("/open/x", &patterns));

        cache.refresh();
        assert!(cache.is_empty());

        let after = cache.pattern_set(&patterns);
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(cache.is_excluded("/open/x", &patterns));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn decisions_are_stable_across_repeated_calls() {
        let cache = ExclusionCache::new();
        let patterns = list(&["/a/*", "/b/**"]);
        let paths = ["/a/1", "/a/1/2", "/b", "/b/c/d", "/c"];
        let first: Vec<bool> = paths.iter().map(|p| cache.is_excluded(p, &patterns)).collect();
        for _ in 0..10 {
            let again: Vec<bool> = paths.iter().map(|p| cache.is_excluded(p, &patterns)).collect();
            assert_eq!(first, again);
        }
        assert_eq!(first, vec![true, false, true, true, false]);
    }

    #[test]
    fn concurrent_readers_and_refresh() {
        let cache = Arc::new(ExclusionCache::new());
        let patterns = list(&["/open/**"]);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let patterns = patterns.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        assert!(cache.is_excluded("/open/a", &patterns));
                        assert!(!cache.is_excluded("/closed", &patterns));
                        if i == 0 {
                            cache.refresh();
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    }
}
