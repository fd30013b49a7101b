//! Resumable bulk elevation acquisition.
//!
//! A run walks the resolution passes of an [`AcquisitionGrid`]. Within a pass,
//! work units are processed one after another. Each unit's points go out in
//! batches, and at most `concurrency` fetches are in flight at any moment.
//! Points already in the point cache are never fetched again.
//!
//! A unit is marked complete only after all of its points are cached and the
//! point cache has been flushed. Units with failed points stay pending and
//! are swept again, up to `max_sweeps` times per pass. If units are still
//! pending after that, the run ends as [`RunStatus::Incomplete`] without
//! advancing the pass, and the next run picks up where this one stopped.
//!
//! ```ignore
//! use hypso::{AcquisitionPipeline, AcquisitionStore, EpqsClient, EpqsConfig, PipelineConfig};
//!
//! let client = EpqsClient::new(EpqsConfig::default())?;
//! let mut store = AcquisitionStore::open("elevation_cache.json", "elevation_progress.json");
//! let mut pipeline = AcquisitionPipeline::new(client, PipelineConfig::default());
//! let summary = pipeline.run(&mut store).await?;
//! println!("fetched {} points, {} failed", summary.fetched, summary.failed);
//! ```

use std::collections::HashSet;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::error::{ElevationError, Result};
use crate::fetch::ElevationSource;
use crate::grid::{AcquisitionGrid, WorkUnit, DEFAULT_GRID_SIZE, DEFAULT_RESOLUTION_STEPS};
use crate::profile::GeoPoint;
use crate::region::{Region, TileIndex};
use crate::retry::RetryPolicy;
use crate::store::{AcquisitionStore, PointKey};

/// Default number of points per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default number of concurrent fetches.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default number of sweeps over pending units per pass.
pub const DEFAULT_MAX_SWEEPS: u32 = 3;

/// Acquisition parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub region: Region,
    pub grid_size: u32,
    /// Lattice size of each pass, in order.
    pub resolution_steps: Vec<u32>,
    pub batch_size: usize,
    /// Maximum fetches in flight.
    pub concurrency: usize,
    /// Sweeps over pending units before a pass is given up for this run.
    pub max_sweeps: u32,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            region: TileIndex::new_mexico().coverage(),
            grid_size: DEFAULT_GRID_SIZE,
            resolution_steps: DEFAULT_RESOLUTION_STEPS.to_vec(),
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            max_sweeps: DEFAULT_MAX_SWEEPS,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ElevationError::InvalidArgument(msg.to_string()));
        if self.resolution_steps.is_empty() {
            return invalid("at least one resolution step is required");
        }
        if self.resolution_steps.contains(&0) {
            return invalid("resolution steps must be positive");
        }
        if self.batch_size == 0 {
            return invalid("batch size must be positive");
        }
        if self.concurrency == 0 {
            return invalid("concurrency must be positive");
        }
        if self.max_sweeps == 0 {
            return invalid("max sweeps must be positive");
        }
        Ok(())
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every pass is complete.
    #[default]
    Complete,
    /// Some units still have uncached points; rerun to resume.
    Incomplete,
}

/// Totals of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Points fetched successfully.
    pub fetched: u64,
    /// Points found in the cache.
    pub cached: u64,
    /// Fetches that failed after all retries.
    pub failed: u64,
    pub units_completed: u64,
    pub passes_completed: u64,
    /// Flushes that could not be written.
    pub persistence_failures: u64,
    pub status: RunStatus,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Result of processing one work unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitReport {
    pub pass: usize,
    pub resolution: u32,
    pub unit_id: String,
    pub fetched: u64,
    pub cached: u64,
    pub failed: u64,
    pub complete: bool,
    /// Units complete in this pass after this one.
    pub completed_units: usize,
    pub total_units: usize,
}

type Observer = Box<dyn FnMut(&UnitReport) + Send>;

/// Drives an [`ElevationSource`] over the work grid.
pub struct AcquisitionPipeline<S> {
    source: S,
    config: PipelineConfig,
    observer: Option<Observer>,
}

impl<S: ElevationSource> AcquisitionPipeline<S> {
    pub fn new(source: S, config: PipelineConfig) -> Self {
        Self {
            source,
            config,
            observer: None,
        }
    }

    /// Call `observer` after every processed unit.
    pub fn with_observer(mut self, observer: impl FnMut(&UnitReport) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run all remaining passes against `store`.
    ///
    /// Per-point fetch failures and persistence failures are counted in the
    /// summary and never abort the run.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidArgument`] if the configuration is
    /// invalid.
    pub async fn run(&mut self, store: &mut AcquisitionStore) -> Result<RunSummary> {
        self.config.validate()?;
        let grid = AcquisitionGrid::new(self.config.region, self.config.grid_size)?;
        let started = Instant::now();
        let mut summary = RunSummary::default();

        store.set_total_units(grid.unit_count());
        tracing::info!(
            pass = store.current_pass(),
            passes = self.config.resolution_steps.len(),
            completed_units = store.completed_units(),
            total_units = grid.unit_count(),
            cached_points = store.points().len(),
            "starting acquisition"
        );

        while let Some(&resolution) = self.config.resolution_steps.get(store.current_pass()) {
            let pass = store.current_pass();
            if !self
                .run_pass(&grid, pass, resolution, store, &mut summary)
                .await
            {
                summary.status = RunStatus::Incomplete;
                break;
            }

            store.advance_pass();
            summary.passes_completed += 1;
            flush(store, &mut summary);
            tracing::info!(pass, resolution, "completed resolution pass");
        }

        flush(store, &mut summary);
        summary.elapsed = started.elapsed();
        tracing::info!(
            fetched = summary.fetched,
            cached = summary.cached,
            failed = summary.failed,
            units_completed = summary.units_completed,
            passes_completed = summary.passes_completed,
            persistence_failures = summary.persistence_failures,
            status = ?summary.status,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "acquisition finished"
        );
        Ok(summary)
    }

    /// Sweep pending units of one pass. Returns whether all units completed.
    async fn run_pass(
        &mut self,
        grid: &AcquisitionGrid,
        pass: usize,
        resolution: u32,
        store: &mut AcquisitionStore,
        summary: &mut RunSummary,
    ) -> bool {
        for sweep in 1..=self.config.max_sweeps {
            let pending: Vec<WorkUnit> = grid
                .units()
                .filter(|unit| !store.is_unit_complete(&unit.id()))
                .collect();
            if pending.is_empty() {
                return true;
            }

            tracing::info!(pass, resolution, sweep, pending = pending.len(), "sweeping units");
            for unit in pending {
                let report = self
                    .process_unit(&unit, pass, resolution, grid.unit_count(), store, summary)
                    .await;
                if let Some(observer) = self.observer.as_mut() {
                    observer(&report);
                }
            }
        }

        grid.units().all(|unit| store.is_unit_complete(&unit.id()))
    }

    /// One fetch attempt. A non-finite value is a failed attempt, so it is
    /// retried like any other failure.
    async fn fetch_point(&self, point: GeoPoint) -> Result<f64> {
        let elevation = self.source.fetch(point.lat, point.lon).await?;
        if elevation.is_finite() {
            Ok(elevation)
        } else {
            Err(ElevationError::FetchFailed {
                lat: point.lat,
                lon: point.lon,
                reason: format!("non-numeric elevation {elevation}"),
            })
        }
    }

    async fn process_unit(
        &self,
        unit: &WorkUnit,
        pass: usize,
        resolution: u32,
        total_units: usize,
        store: &mut AcquisitionStore,
        summary: &mut RunSummary,
    ) -> UnitReport {
        let unit_id = unit.id();
        let mut report = UnitReport {
            pass,
            resolution,
            unit_id: unit_id.clone(),
            fetched: 0,
            cached: 0,
            failed: 0,
            complete: false,
            completed_units: store.completed_units(),
            total_units,
        };

        let points = unit.points(resolution);
        for batch in points.chunks(self.config.batch_size) {
            let mut seen = HashSet::new();
            let mut to_fetch: Vec<(PointKey, GeoPoint)> = Vec::new();
            for point in batch {
                let key = PointKey::new(point.lat, point.lon);
                if store.has(&key) {
                    report.cached += 1;
                } else if seen.insert(key.clone()) {
                    to_fetch.push((key, *point));
                }
            }

            let results: Vec<(PointKey, Result<f64>)> = stream::iter(to_fetch)
                .map(|(key, point)| async move {
                    let result = self
                        .config
                        .retry
                        .run(|_attempt| self.fetch_point(point))
                        .await;
                    (key, result)
                })
                .buffer_unordered(self.config.concurrency)
                .collect()
                .await;

            for (key, result) in results {
                match result {
                    Ok(elevation) => {
                        if store.put(key.clone(), elevation) {
                            report.fetched += 1;
                        } else {
                            tracing::warn!(point = %key, elevation, "rejected non-finite elevation");
                            report.failed += 1;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(point = %key, error = %e, "giving up on point");
                        report.failed += 1;
                    }
                }
            }

            if let Err(e) = store.flush_if_due(Instant::now()) {
                tracing::warn!(error = %e, "debounced flush failed");
                summary.persistence_failures += 1;
            }
        }

        if report.failed == 0 {
            // Points must be durable before the unit is recorded as done.
            match store.flush() {
                Ok(()) => {
                    store.mark_unit_complete(&unit_id);
                    report.complete = true;
                    summary.units_completed += 1;
                }
                Err(e) => {
                    tracing::warn!(unit = %unit_id, error = %e, "point cache flush failed, unit left pending");
                    summary.persistence_failures += 1;
                }
            }
        }

        report.completed_units = store.completed_units();
        summary.fetched += report.fetched;
        summary.cached += report.cached;
        summary.failed += report.failed;

        tracing::debug!(
            unit = %unit_id,
            pass,
            resolution,
            fetched = report.fetched,
            cached = report.cached,
            failed = report.failed,
            complete = report.complete,
            "processed unit"
        );
        report
    }
}

fn flush(store: &mut AcquisitionStore, summary: &mut RunSummary) {
    if let Err(e) = store.flush() {
        tracing::warn!(error = %e, "flush failed");
        summary.persistence_failures += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Deterministic fake: elevation = lat * 1000 + lon.
    #[derive(Default)]
    struct FakeSource {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        /// Failures before each point starts succeeding.
        fail_first: usize,
        /// Points west of this longitude always fail.
        fail_west_of: Option<f64>,
        attempts: Mutex<HashMap<String, usize>>,
    }

    fn expected(lat: f64, lon: f64) -> f64 {
        lat * 1000.0 + lon
    }

    #[async_trait]
    impl ElevationSource for FakeSource {
        async fn fetch(&self, lat: f64, lon: f64) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let n = attempts.entry(format!("{lat},{lon}")).or_insert(0);
                *n += 1;
                *n
            };

            let always_fails = self.fail_west_of.is_some_and(|w| lon < w);
            if always_fails || attempt <= self.fail_first {
                return Err(ElevationError::FetchFailed {
                    lat,
                    lon,
                    reason: "simulated".to_string(),
                });
            }
            Ok(expected(lat, lon))
        }
    }

    fn config(grid_size: u32, steps: &[u32]) -> PipelineConfig {
        PipelineConfig {
            region: Region::new(36.0, 35.0, -106.0, -107.0).unwrap(),
            grid_size,
            resolution_steps: steps.to_vec(),
            batch_size: 4,
            concurrency: 3,
            max_sweeps: 2,
            retry: RetryPolicy::exponential(3),
        }
    }

    fn store(dir: &TempDir) -> AcquisitionStore {
        AcquisitionStore::open(
            dir.path().join("elevation_cache.json"),
            dir.path().join("elevation_progress.json"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_fetches_nothing() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::default());

        let mut first = AcquisitionPipeline::new(Arc::clone(&source), config(2, &[3]));
        let mut s = store(&dir);
        let summary = first.run(&mut s).await.unwrap();
        assert_eq!(summary.status, RunStatus::Complete);
        assert_eq!(summary.passes_completed, 1);
        assert_eq!(summary.units_completed, 4);
        assert_eq!(summary.failed, 0);
        let calls = source.calls.load(Ordering::SeqCst);
        assert_eq!(calls as u64, summary.fetched);
        assert_eq!(calls, s.points().len(), "no point fetched twice");
        drop(s);

        // Same cache file, progress reset: every point is a cache hit.
        std::fs::remove_file(dir.path().join("elevation_progress.json")).unwrap();
        let again = Arc::new(FakeSource::default());
        let mut second = AcquisitionPipeline::new(Arc::clone(&again), config(2, &[3]));
        let summary = second.run(&mut store(&dir)).await.unwrap();
        assert_eq!(again.calls.load(Ordering::SeqCst), 0);
        assert_eq!(summary.fetched, 0);
        assert_eq!(summary.units_completed, 4);
        assert_eq!(summary.status, RunStatus::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::default());
        let mut cfg = config(1, &[6]);
        cfg.batch_size = 10;
        cfg.concurrency = 3;

        let mut pipeline = AcquisitionPipeline::new(Arc::clone(&source), cfg);
        pipeline.run(&mut store(&dir)).await.unwrap();

        let peak = source.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight {peak}");
        assert!(peak > 1, "fetches never overlapped");
        assert_eq!(source.calls.load(Ordering::SeqCst), 36);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success_matches_clean_fetch() {
        let flaky_dir = TempDir::new().unwrap();
        let clean_dir = TempDir::new().unwrap();

        let flaky = Arc::new(FakeSource {
            fail_first: 2,
            ..FakeSource::default()
        });
        let mut pipeline = AcquisitionPipeline::new(Arc::clone(&flaky), config(1, &[3]));
        let mut flaky_store = store(&flaky_dir);
        let summary = pipeline.run(&mut flaky_store).await.unwrap();
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.fetched, 9);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 27);

        let mut clean = AcquisitionPipeline::new(FakeSource::default(), config(1, &[3]));
        let mut clean_store = store(&clean_dir);
        clean.run(&mut clean_store).await.unwrap();

        assert_eq!(flaky_store.points(), clean_store.points());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_are_counted_not_cached() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource {
            fail_first: usize::MAX,
            ..FakeSource::default()
        });
        let mut pipeline = AcquisitionPipeline::new(Arc::clone(&source), config(1, &[2]));
        let mut s = store(&dir);
        let summary = pipeline.run(&mut s).await.unwrap();

        // 4 points, 2 sweeps, 3 attempts each.
        assert_eq!(summary.failed, 8);
        assert_eq!(source.calls.load(Ordering::SeqCst), 24);
        assert_eq!(summary.status, RunStatus::Incomplete);
        assert_eq!(summary.units_completed, 0);
        assert!(s.points().is_empty());
        assert_eq!(s.current_pass(), 0);
        assert!(!s.is_unit_complete("0,0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_incomplete_run_resumes() {
        let dir = TempDir::new().unwrap();
        // Units in column 0 span lon -107..-106.5 and always fail there.
        let broken = Arc::new(FakeSource {
            fail_west_of: Some(-106.6),
            ..FakeSource::default()
        });
        let mut pipeline = AcquisitionPipeline::new(Arc::clone(&broken), config(2, &[2]));
        let summary = pipeline.run(&mut store(&dir)).await.unwrap();
        assert_eq!(summary.status, RunStatus::Incomplete);

        let resumed_store = store(&dir);
        assert_eq!(resumed_store.current_pass(), 0);
        assert!(resumed_store.is_unit_complete("1,0"));
        assert!(resumed_store.is_unit_complete("1,1"));
        assert!(!resumed_store.is_unit_complete("0,0"));
        let cached_before = resumed_store.points().len();
        drop(resumed_store);

        let healthy = Arc::new(FakeSource::default());
        let mut pipeline = AcquisitionPipeline::new(Arc::clone(&healthy), config(2, &[2]));
        let mut s = store(&dir);
        let summary = pipeline.run(&mut s).await.unwrap();
        assert_eq!(summary.status, RunStatus::Complete);
        assert_eq!(summary.units_completed, 2);
        // Only the points that were never cached are fetched.
        assert_eq!(
            healthy.calls.load(Ordering::SeqCst),
            s.points().len() - cached_before
        );
        assert_eq!(s.current_pass(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crash_after_point_flush_before_progress() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = AcquisitionPipeline::new(FakeSource::default(), config(2, &[2]));
        pipeline.run(&mut store(&dir)).await.unwrap();
        let points_before = store(&dir).points().clone();

        // Lose the progress record as if the process died before writing it.
        std::fs::remove_file(dir.path().join("elevation_progress.json")).unwrap();

        let source = Arc::new(FakeSource::default());
        let mut pipeline = AcquisitionPipeline::new(Arc::clone(&source), config(2, &[2]));
        let mut s = store(&dir);
        let summary = pipeline.run(&mut s).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(summary.status, RunStatus::Complete);
        assert_eq!(s.points(), &points_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_passes_advance_cursor() {
        let dir = TempDir::new().unwrap();
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let mut pipeline = AcquisitionPipeline::new(FakeSource::default(), config(2, &[2, 3]))
            .with_observer(move |r: &UnitReport| sink.lock().unwrap().push(r.clone()));

        let mut s = store(&dir);
        let summary = pipeline.run(&mut s).await.unwrap();
        assert_eq!(summary.passes_completed, 2);
        assert_eq!(summary.units_completed, 8);
        assert_eq!(s.current_pass(), 2);
        assert_eq!(s.completed_units(), 0);

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 8);
        assert!(reports.iter().all(|r| r.complete));
        assert_eq!(reports[0].resolution, 2);
        assert_eq!(reports[7].resolution, 3);
        assert_eq!(reports[3].completed_units, 4);
        drop(reports);

        // Finished runs do nothing.
        let again = pipeline.run(&mut s).await.unwrap();
        assert_eq!(again.fetched + again.cached, 0);
        assert_eq!(again.status, RunStatus::Complete);
    }

    struct NanSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ElevationSource for NanSource {
        async fn fetch(&self, _lat: f64, _lon: f64) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(f64::NAN)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_finite_elevation_is_a_failed_fetch() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(NanSource {
            calls: AtomicUsize::new(0),
        });
        let mut pipeline = AcquisitionPipeline::new(Arc::clone(&source), config(1, &[2]));
        let mut s = store(&dir);
        let summary = pipeline.run(&mut s).await.unwrap();

        // 4 points, 2 sweeps, 3 attempts each, nothing cached.
        assert_eq!(source.calls.load(Ordering::SeqCst), 24);
        assert_eq!(summary.fetched, 0);
        assert_eq!(summary.failed, 8);
        assert_eq!(summary.units_completed, 0);
        assert_eq!(summary.status, RunStatus::Incomplete);
        assert!(s.points().is_empty());
        assert!(!s.is_unit_complete("0,0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_leaves_unit_pending() {
        let dir = TempDir::new().unwrap();
        // A non-empty directory in place of the cache file cannot be replaced.
        let cache = dir.path().join("cache_dir");
        std::fs::create_dir(&cache).unwrap();
        std::fs::write(cache.join("keep"), "x").unwrap();
        let progress = dir.path().join("elevation_progress.json");

        let source = Arc::new(FakeSource::default());
        let mut pipeline = AcquisitionPipeline::new(Arc::clone(&source), config(1, &[2]));
        let mut s = AcquisitionStore::open(&cache, &progress);
        let summary = pipeline.run(&mut s).await.unwrap();

        assert_eq!(summary.units_completed, 0);
        assert!(summary.persistence_failures > 0);
        assert_eq!(summary.status, RunStatus::Incomplete);
        assert!(!s.is_unit_complete("0,0"));
        assert!(!progress.exists());

        // Points stay in memory, so the second sweep hits the cache.
        assert_eq!(s.points().len(), 4);
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
        assert_eq!(summary.fetched, 4);
        assert_eq!(summary.cached, 4);
        assert_eq!(
            s.get(&PointKey::new(35.0, -107.0)),
            Some(expected(35.0, -107.0))
        );
    }

    #[tokio::test]
    async fn test_invalid_config() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(1, &[2]);
        cfg.concurrency = 0;
        let mut pipeline = AcquisitionPipeline::new(FakeSource::default(), cfg);
        assert!(matches!(
            pipeline.run(&mut store(&dir)).await,
            Err(ElevationError::InvalidArgument(_))
        ));

        let mut pipeline = AcquisitionPipeline::new(FakeSource::default(), config(1, &[]));
        assert!(pipeline.run(&mut store(&dir)).await.is_err());
    }
}
