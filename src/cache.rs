use crate::hasher::ContentHasher;
use crate::result::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;

static INCLUDE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*#\s*include\s*(["<])(.*?)[">]"#).unwrap());

/** One persisted record of the dependency cache
 *
 * # Fields
 * * `file_hash` - Hex content digest at the time of recording
 * * `dependencies` - Resolved include paths found by the last scan
 * * `object_file` - Object produced by the last successful compile;
 *   `None` for hash-only entries tracking a header
 * * `timestamp` - Seconds since the Unix epoch
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub file_hash: String,
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,
    #[serde(default)]
    pub object_file: Option<PathBuf>,
    #[serde(default)]
    pub timestamp: f64,
}

/** Persistent map from source path to {hash, dependencies, object}
 *
 * The cache file is a single JSON object:
 * ```text
 * {
 *   "/abs/src/main.cpp": {
 *     "file_hash": "9f86d0...",
 *     "dependencies": ["/abs/src/util.h"],
 *     "object_file": "/abs/build/GCC_c++17/main.cpp.o",
 *     "timestamp": 1718000000.5
 *   }
 * }
 * ```
 *
 * # Architecture
 * - Read once by [`DependencyCache::load`], written once by
 *   [`DependencyCache::save`]; nothing in between touches the file
 * - Keys are canonical absolute paths so the same file always maps to
 *   the same entry
 * - Change detection uses content hashes only, never modification times
 *
 * # Example
 * ```no_run
 * use std::path::Path;
 * use cxxbuild::cache::DependencyCache;
 *
 * #[tokio::main(flavor = "current_thread")]
 * async fn main() -> cxxbuild::result::Result<()> {
 *     let mut cache = DependencyCache::load(Path::new("build"), true).await;
 *     let source = Path::new("src/main.cpp");
 *     let object = Path::new("build/GCC_c++17/main.cpp.o");
 *
 *     if cache.needs_rebuild(source, object).await {
 *         // compile...
 *         cache.record_success(source, object, &[]).await?;
 *     }
 *     cache.save().await
 * }
 * ```
 */
#[derive(Debug)]
pub struct DependencyCache {
    // Location of build_cache.json
    cache_file: PathBuf,
    // When false, load and save are no-ops
    enabled: bool,
    entries: BTreeMap<String, CacheEntry>,
    hasher: ContentHasher,
}

impl DependencyCache {
    pub const FILE_NAME: &'static str = "build_cache.json";

    /// Empty cache that will persist to `<build_dir>/build_cache.json`.
    pub fn new(build_dir: &Path, enabled: bool) -> Self {
        Self {
            cache_file: build_dir.join(Self::FILE_NAME),
            enabled,
            entries: BTreeMap::new(),
            hasher: ContentHasher::new(),
        }
    }

    /** Loads the cache stored under `build_dir`
     *
     * # Returns
     * - The persisted entries, or an empty cache when disabled, when the
     *   file is missing, or when it cannot be parsed
     *
     * # Notes
     * - A malformed file is logged and ignored; it is overwritten by the
     *   next successful build
     */
    pub async fn load(build_dir: &Path, enabled: bool) -> Self {
        let mut cache = Self::new(build_dir, enabled);
        if !enabled {
            return cache;
        }

        let content = match fs::read_to_string(&cache.cache_file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return cache,
            Err(e) => {
                log::warn!("Failed to load build cache: {}", e);
                return cache;
            }
        };

        match serde_json::from_str::<BTreeMap<String, CacheEntry>>(&content) {
            Ok(entries) => {
                log::debug!("Loaded build cache with {} entries", entries.len());
                cache.entries = entries;
            }
            Err(e) => {
                log::warn!(
                    "Failed to load build cache {}: {}; starting empty",
                    cache.cache_file.display(),
                    e
                );
            }
        }

        cache
    } // load

    /** Writes every entry back to the cache file
     *
     * # Notes
     * - No-op when the cache is disabled
     * - Content goes to a sibling temp file first and is renamed over the
     *   cache file, so a crash never leaves half a document behind
     */
    pub async fn save(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if let Some(parent) = self.cache_file.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(&self.entries)?;
        let staging = self.cache_file.with_extension("json.tmp");
        fs::write(&staging, content).await?;
        fs::rename(&staging, &self.cache_file).await?;

        log::debug!("Saved build cache with {} entries", self.entries.len());
        Ok(())
    } // save

    /** Reports whether a file differs from its recorded state
     *
     * # Returns
     * - `true` if there is no entry, the hash differs, or the file can no
     *   longer be read
     */
    pub async fn has_changed(&self, path: &Path) -> bool {
        let key = cache_key(path).await;
        let Some(entry) = self.entries.get(&key) else {
            return true;
        };

        match self.hasher.verify_file(path, &entry.file_hash).await {
            Ok(unchanged) => !unchanged,
            Err(e) => {
                log::debug!("Treating unreadable {} as changed: {}", path.display(), e);
                true
            }
        }
    }

    /** Finds the files a source includes
     *
     * # Arguments
     * * `path` - Source file to scan
     * * `include_paths` - Directories searched for quoted and angle includes
     *
     * # Returns
     * - Sorted, de-duplicated canonical paths of every include that
     *   resolved to an existing file
     *
     * # Notes
     * - Line-oriented text match, not a preprocessor: conditional blocks
     *   and macros are ignored
     * - Quoted includes look next to `path` first, then in `include_paths`;
     *   angle includes only in `include_paths`
     * - Unresolved includes (system headers) are dropped
     */
    pub async fn scan_dependencies(
        &self,
        path: &Path,
        include_paths: &[PathBuf],
    ) -> Result<Vec<PathBuf>> {
        let bytes = fs::read(path).await?;
        let content = String::from_utf8_lossy(&bytes);
        let source_dir = path.parent().unwrap_or_else(|| Path::new(""));

        let mut found = BTreeSet::new();
        for line in content.lines() {
            let Some(caps) = INCLUDE_REGEX.captures(line) else {
                continue;
            };
            let quoted = &caps[1] == "\"";
            let name = caps[2].trim();
            if name.is_empty() {
                continue;
            }

            let mut candidates = Vec::with_capacity(include_paths.len() + 1);
            if quoted {
                candidates.push(source_dir.join(name));
            }
            candidates.extend(include_paths.iter().map(|dir| dir.join(name)));

            for candidate in candidates {
                if is_file(&candidate).await {
                    found.insert(fs::canonicalize(&candidate).await?);
                    break;
                }
            }
        }

        Ok(found.into_iter().collect())
    } // scan_dependencies

    /** Records a successful compile of `path` into `object_file`
     *
     * # Process Flow
     * 1. Hashes the source and rescans its includes
     * 2. Replaces the source's entry with {hash, deps, object, now}
     * 3. Gives every dependency a hash-only entry, unless the dependency
     *    is itself a compiled source with its own object
     *
     * # Notes
     * - Call only after the compile succeeded
     */
    pub async fn record_success(
        &mut self,
        path: &Path,
        object_file: &Path,
        include_paths: &[PathBuf],
    ) -> Result<()> {
        let file_hash = self.hasher.hash_file(path).await?;
        let dependencies = self.scan_dependencies(path, include_paths).await?;
        let timestamp = now_seconds();

        for dep in &dependencies {
            let key = dep.to_string_lossy().into_owned();
            let owns_object = self
                .entries
                .get(&key)
                .map_or(false, |entry| entry.object_file.is_some());
            if owns_object {
                continue;
            }

            match self.hasher.hash_file(dep).await {
                Ok(dep_hash) => {
                    self.entries.insert(
                        key,
                        CacheEntry {
                            file_hash: dep_hash,
                            dependencies: Vec::new(),
                            object_file: None,
                            timestamp,
                        },
                    );
                }
                Err(e) => log::warn!("Failed to hash dependency {}: {}", dep.display(), e),
            }
        }

        log::debug!(
            "Recorded {} with {} dependencies",
            path.display(),
            dependencies.len()
        );

        self.entries.insert(
            cache_key(path).await,
            CacheEntry {
                file_hash,
                dependencies,
                object_file: Some(absolute(object_file)),
                timestamp,
            },
        );
        Ok(())
    } // record_success

    pub async fn entry(&self, path: &Path) -> Option<&CacheEntry> {
        let key = cache_key(path).await;
        self.entries.get(&key)
    }

    /// Dependencies stored by the last recorded compile of `path`.
    pub async fn stored_dependencies(&self, path: &Path) -> Vec<PathBuf> {
        self.entry(path)
            .await
            .map(|entry| entry.dependencies.clone())
            .unwrap_or_default()
    }

    /** Decides whether `source` has to be recompiled into `expected_object`
     *
     * # Returns
     * - `true` if the source changed, any previously stored dependency
     *   changed, or the recorded object is not `expected_object` or no
     *   longer exists on disk
     *
     * # Notes
     * - Dependencies are those stored by the last compile, not a fresh
     *   scan; a source is only rescanned when it is itself recompiled
     */
    pub async fn needs_rebuild(&self, source: &Path, expected_object: &Path) -> bool {
        if self.has_changed(source).await {
            log::debug!("{} changed", source.display());
            return true;
        }

        let Some(entry) = self.entry(source).await else {
            return true;
        };

        let expected = absolute(expected_object);
        let object_ok = match &entry.object_file {
            Some(recorded) => *recorded == expected && is_file(recorded).await,
            None => false,
        };
        if !object_ok {
            log::debug!(
                "{} has no usable object at {}",
                source.display(),
                expected.display()
            );
            return true;
        }

        for dep in &entry.dependencies {
            if self.has_changed(dep).await {
                log::debug!("{} changed (dependency of {})", dep.display(), source.display());
                return true;
            }
        }

        false
    } // needs_rebuild

    /** Drops what is known about `path` so its next build recompiles it
     *
     * # Notes
     * - Also drops any entry recording `object_file`, which still finds the
     *   stale record when `path` itself can no longer be canonicalized
     */
    pub async fn forget(&mut self, path: &Path, object_file: &Path) -> usize {
        let key = cache_key(path).await;
        let object = absolute(object_file);
        let before = self.entries.len();
        self.entries
            .retain(|k, entry| *k != key && entry.object_file.as_deref() != Some(object.as_path()));
        before - self.entries.len()
    }

    /// Drops every entry and deletes the cache file.
    pub async fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        match fs::remove_file(&self.cache_file).await {
            Ok(()) => {
                log::info!("Cleared build cache");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Canonical absolute path when the file exists, plain absolute path otherwise
async fn cache_key(path: &Path) -> String {
    match fs::canonicalize(path).await {
        Ok(canonical) => canonical.to_string_lossy().into_owned(),
        Err(_) => absolute(path).to_string_lossy().into_owned(),
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}


/*
 * Dependency tracking limits:
 *
 * 1. Single level:
 *    - Only the includes written in a compiled source are recorded
 *    - A header pulled in by another header is not tracked, so editing it
 *      does not trigger a rebuild
 *
 * 2. Text match:
 *    - `#include` lines inside `#if 0` blocks still count
 *    - Computed includes (`#include MACRO`) are ignored
 *
 * 3. Objects:
 *    - A cache hit is trusted only while the recorded object still exists
 *      at the expected path
 *
 * 4. Shared headers:
 *    - A header has one hash-only entry shared by every source including it,
 *      and entries are never pruned
 *    - When a header changes and a build covering only some of its
 *      includers succeeds, the entry is refreshed and the remaining
 *      includers no longer see the change
 */
