use anyhow::{bail, Context, Result};
use hypso::{
    AcquisitionPipeline, AcquisitionStore, EpqsClient, EpqsConfig, PipelineConfig, Region,
    RetryPolicy, RunStatus, TileIndex, UnitReport,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

pub struct AcquireArgs {
    pub cache: PathBuf,
    pub progress: PathBuf,
    pub grid_size: u32,
    pub resolutions: Vec<u32>,
    pub batch_size: usize,
    pub concurrency: usize,
    pub attempts: u32,
    pub max_sweeps: u32,
    pub url: String,
    pub timeout_ms: u64,
    pub pacing_ms: u64,
    pub debounce_ms: u64,
    pub region: Option<Vec<f64>>,
}

fn parse_region(values: Option<&[f64]>) -> Result<Region> {
    match values {
        None => Ok(TileIndex::new_mexico().coverage()),
        Some(&[north, south, east, west]) => {
            Region::new(north, south, east, west).context("Invalid --region")
        }
        Some(other) => bail!(
            "--region needs 4 values (north,south,east,west), got {}",
            other.len()
        ),
    }
}

pub fn run(args: AcquireArgs) -> Result<()> {
    let config = PipelineConfig {
        region: parse_region(args.region.as_deref())?,
        grid_size: args.grid_size,
        resolution_steps: args.resolutions,
        batch_size: args.batch_size,
        concurrency: args.concurrency,
        max_sweeps: args.max_sweeps,
        retry: RetryPolicy::exponential(args.attempts),
    };

    let client = EpqsClient::new(EpqsConfig {
        base_url: args.url,
        timeout: Duration::from_millis(args.timeout_ms),
        pacing: Duration::from_millis(args.pacing_ms),
    })
    .context("Failed to create HTTP client")?;

    let mut store = AcquisitionStore::open(&args.cache, &args.progress)
        .with_debounce(Duration::from_millis(args.debounce_ms));

    let passes = config.resolution_steps.len();
    let pb = ProgressBar::new(u64::from(config.grid_size).pow(2));
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} units {msg}",
            )?
            .progress_chars("#>-"),
    );

    println!(
        "Acquiring {} ({} passes, {} cached points)",
        config.region,
        passes,
        store.points().len()
    );

    let bar = pb.clone();
    let mut pipeline = AcquisitionPipeline::new(client, config).with_observer(
        move |report: &UnitReport| {
            bar.set_length(report.total_units as u64);
            bar.set_position(report.completed_units as u64);
            bar.set_message(format!(
                "pass {}/{} r={} unit {}: +{} fetched, {} failed",
                report.pass + 1,
                passes,
                report.resolution,
                report.unit_id,
                report.fetched,
                report.failed
            ));
        },
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let summary = runtime
        .block_on(pipeline.run(&mut store))
        .context("Acquisition failed")?;
    pb.finish_and_clear();

    println!("Fetched: {}", summary.fetched);
    println!("Cached: {}", summary.cached);
    println!("Failed: {}", summary.failed);
    println!("Units completed: {}", summary.units_completed);
    println!("Passes completed: {}", summary.passes_completed);
    if summary.persistence_failures > 0 {
        println!("Write failures: {}", summary.persistence_failures);
    }
    println!("Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    println!("Point cache: {} ({} points)", args.cache.display(), store.points().len());

    if summary.status == RunStatus::Incomplete {
        bail!(
            "Acquisition incomplete at pass {}/{}: rerun to resume",
            store.current_pass() + 1,
            passes
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region() {
        let region = parse_region(None).unwrap();
        assert_eq!(region, TileIndex::new_mexico().coverage());

        let region = parse_region(Some(&[36.0, 35.0, -106.0, -107.0])).unwrap();
        assert_eq!(region.north, 36.0);
        assert_eq!(region.west, -107.0);

        assert!(parse_region(Some(&[35.0, 36.0, -106.0, -107.0])).is_err());
        assert!(parse_region(Some(&[36.0, 35.0])).is_err());
    }
}
