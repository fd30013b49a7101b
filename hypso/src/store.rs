//! Persistent point cache and acquisition progress.
//!
//! Two JSON files back a resumable acquisition run:
//!
//! - the point cache, a flat object mapping `"lat,lon"` to meters, and
//! - the progress record, holding the current resolution pass and the set of
//!   work units already completed in that pass.
//!
//! [`AcquisitionStore`] keeps both in memory and persists them with a
//! dirty-flag debounce. A flush always writes the point cache before the
//! progress record and skips the progress record if the point cache write
//! failed, so a unit is never durably complete while its points are not.
//!
//! Both files are replaced atomically (write to `<file>.tmp`, then rename).
//! A missing file loads as empty state. An unparseable one is logged and also
//! loads as empty, since losing progress only costs repeated work.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{ElevationError, Result};

/// Default minimum interval between debounced flushes.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// Canonical identity of a coordinate: `"{lat},{lon}"` using the shortest
/// decimal form that round-trips each `f64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointKey(String);

impl PointKey {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self(format!("{lat},{lon}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the key back into `(lat, lon)`.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let (lat, lon) = self.0.split_once(',')?;
        Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
    }
}

impl fmt::Display for PointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PointKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Mapping of evaluated points to elevations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCache {
    entries: BTreeMap<PointKey, f64>,
}

impl PointCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a point cache file strictly.
    ///
    /// Entries whose value is not a finite number (e.g. `null`) are skipped;
    /// those points count as unknown.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read and a JSON error if it
    /// is not a JSON object.
    pub fn read(path: &Path) -> Result<Self> {
        let raw: BTreeMap<String, serde_json::Value> =
            serde_json::from_slice(&fs::read(path)?)?;

        let total = raw.len();
        let entries: BTreeMap<PointKey, f64> = raw
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .map(|v| (PointKey(key), v))
            })
            .collect();

        if entries.len() < total {
            tracing::debug!(
                path = %path.display(),
                skipped = total - entries.len(),
                "skipped non-numeric point cache entries"
            );
        }
        Ok(Self { entries })
    }

    /// Like [`read`](Self::read), but a missing or corrupt file yields an
    /// empty cache.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::read(path) {
            Ok(cache) => cache,
            Err(ElevationError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Self::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "point cache unreadable, starting empty");
                Self::new()
            }
        }
    }

    /// Atomically replace `path` with this cache.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::PersistenceFailed`] if the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, &self.entries)
    }

    pub fn contains(&self, key: &PointKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &PointKey) -> Option<f64> {
        self.entries.get(key).copied()
    }

    /// Record an elevation. Non-finite values are ignored and return `false`.
    pub fn insert(&mut self, key: PointKey, elevation: f64) -> bool {
        if !elevation.is_finite() {
            return false;
        }
        self.entries.insert(key, elevation);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PointKey, f64)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    /// Reduce grid density: keep a point only if its latitude and longitude
    /// are at positions divisible by `factor` among the distinct sorted
    /// latitudes and longitudes. Keys that do not parse are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidArgument`] if `factor` is zero.
    pub fn thin(&self, factor: usize) -> Result<PointCache> {
        if factor == 0 {
            return Err(ElevationError::InvalidArgument(
                "thinning factor must be positive".to_string(),
            ));
        }

        let parsed: Vec<(&PointKey, f64, f64, f64)> = self
            .entries
            .iter()
            .filter_map(|(k, v)| k.coordinates().map(|(lat, lon)| (k, lat, lon, *v)))
            .collect();

        let distinct = |values: Vec<f64>| {
            let mut values = values;
            values.sort_by(f64::total_cmp);
            values.dedup();
            values
        };
        let lats = distinct(parsed.iter().map(|p| p.1).collect());
        let lons = distinct(parsed.iter().map(|p| p.2).collect());

        let on_grid = |values: &[f64], v: f64| {
            values
                .binary_search_by(|probe| probe.total_cmp(&v))
                .is_ok_and(|i| i % factor == 0)
        };

        let entries = parsed
            .into_iter()
            .filter(|(_, lat, lon, _)| on_grid(&lats, *lat) && on_grid(&lons, *lon))
            .map(|(k, _, _, v)| (k.clone(), v))
            .collect();
        Ok(PointCache { entries })
    }
}

/// Resumable position of a multi-pass acquisition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    /// Index of the resolution pass in progress.
    #[serde(default)]
    pub current_resolution: usize,
    /// Units completed in the current pass.
    #[serde(default)]
    pub completed_chunks: BTreeSet<String>,
    /// Units per pass.
    #[serde(default)]
    pub total_chunks: usize,
}

impl ProgressRecord {
    /// Read a progress file, treating a missing or corrupt file as empty.
    pub fn load_or_default(path: &Path) -> Self {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "progress file unreadable, starting fresh");
                return Self::default();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "progress file corrupt, starting fresh");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}

/// In-memory point cache and progress with debounced persistence.
pub struct AcquisitionStore {
    cache_path: PathBuf,
    progress_path: PathBuf,
    points: PointCache,
    progress: ProgressRecord,
    points_dirty: bool,
    progress_dirty: bool,
    debounce: Duration,
    last_flush: Option<Instant>,
}

impl AcquisitionStore {
    /// Load the point cache and progress record from their files.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(cache_path: P, progress_path: Q) -> Self {
        let cache_path = cache_path.as_ref().to_path_buf();
        let progress_path = progress_path.as_ref().to_path_buf();
        let points = PointCache::load_or_default(&cache_path);
        let progress = ProgressRecord::load_or_default(&progress_path);

        tracing::info!(
            points = points.len(),
            pass = progress.current_resolution,
            completed_units = progress.completed_chunks.len(),
            "loaded acquisition state"
        );

        Self {
            cache_path,
            progress_path,
            points,
            progress,
            points_dirty: false,
            progress_dirty: false,
            debounce: DEFAULT_DEBOUNCE,
            last_flush: None,
        }
    }

    /// Set the minimum interval between debounced flushes.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn has(&self, key: &PointKey) -> bool {
        self.points.contains(key)
    }

    pub fn get(&self, key: &PointKey) -> Option<f64> {
        self.points.get(key)
    }

    /// Record a fetched elevation. Returns `false`, storing nothing, if the
    /// value is not finite.
    pub fn put(&mut self, key: PointKey, elevation: f64) -> bool {
        let stored = self.points.insert(key, elevation);
        self.points_dirty |= stored;
        stored
    }

    pub fn points(&self) -> &PointCache {
        &self.points
    }

    pub fn progress(&self) -> &ProgressRecord {
        &self.progress
    }

    pub fn mark_unit_complete(&mut self, unit_id: &str) {
        if self.progress.completed_chunks.insert(unit_id.to_string()) {
            self.progress_dirty = true;
        }
    }

    pub fn is_unit_complete(&self, unit_id: &str) -> bool {
        self.progress.completed_chunks.contains(unit_id)
    }

    pub fn completed_units(&self) -> usize {
        self.progress.completed_chunks.len()
    }

    /// Index of the resolution pass in progress.
    pub fn current_pass(&self) -> usize {
        self.progress.current_resolution
    }

    pub fn set_total_units(&mut self, total: usize) {
        if self.progress.total_chunks != total {
            self.progress.total_chunks = total;
            self.progress_dirty = true;
        }
    }

    /// Move to the next pass and forget per-pass unit completion.
    pub fn advance_pass(&mut self) {
        self.progress.current_resolution += 1;
        self.progress.completed_chunks.clear();
        self.progress_dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.points_dirty || self.progress_dirty
    }

    /// Flush if there are pending changes and the debounce window has passed
    /// since the last write. Returns whether a flush happened.
    pub fn flush_if_due(&mut self, now: Instant) -> Result<bool> {
        if !self.is_dirty() {
            return Ok(false);
        }
        if let Some(last) = self.last_flush {
            if now.saturating_duration_since(last) < self.debounce {
                return Ok(false);
            }
        }
        self.flush_at(now)?;
        Ok(true)
    }

    /// Write pending changes now: point cache first, then progress.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::PersistenceFailed`] if either write fails.
    /// If the point cache write fails the progress record is not written.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_at(Instant::now())
    }

    fn flush_at(&mut self, now: Instant) -> Result<()> {
        self.last_flush = Some(now);
        self.persist_points()?;
        self.persist_progress()
    }

    fn persist_points(&mut self) -> Result<()> {
        if !self.points_dirty {
            return Ok(());
        }
        self.points.save(&self.cache_path)?;
        self.points_dirty = false;
        tracing::debug!(path = %self.cache_path.display(), points = self.points.len(), "saved point cache");
        Ok(())
    }

    fn persist_progress(&mut self) -> Result<()> {
        if !self.progress_dirty {
            return Ok(());
        }
        self.progress.save(&self.progress_path)?;
        self.progress_dirty = false;
        tracing::debug!(
            path = %self.progress_path.display(),
            pass = self.progress.current_resolution,
            completed_units = self.progress.completed_chunks.len(),
            "saved progress"
        );
        Ok(())
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn progress_path(&self) -> &Path {
        &self.progress_path
    }
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let failed = |reason: String| ElevationError::PersistenceFailed {
        path: path.to_path_buf(),
        reason,
    };

    let json = serde_json::to_vec_pretty(value).map_err(|e| failed(e.to_string()))?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, json).map_err(|e| failed(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        failed(e.to_string())
    })
}
