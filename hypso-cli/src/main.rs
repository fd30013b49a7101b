use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use hypso::fetch::{DEFAULT_EPQS_URL, DEFAULT_PACING, DEFAULT_REQUEST_TIMEOUT};
use hypso::grid::{DEFAULT_GRID_SIZE, DEFAULT_RESOLUTION_STEPS};
use hypso::pipeline::{DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_MAX_SWEEPS};
use hypso::profile::DEFAULT_PROFILE_POINTS;
use hypso::retry::DEFAULT_MAX_ATTEMPTS;
use hypso::{DEFAULT_CHUNK_CAPACITY, DEFAULT_CHUNK_SIZE, DEFAULT_NODATA_THRESHOLD};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::common::EngineOptions;

/// Chunked raster elevation queries and bulk elevation acquisition
#[derive(Parser)]
#[command(name = "hypso")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing the quadrant tiles
    #[arg(short, long, env = "HYPSO_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Chunk edge length in pixels
    #[arg(long, env = "HYPSO_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE, global = true)]
    chunk_size: u32,

    /// Maximum chunks kept in memory
    #[arg(long, env = "HYPSO_CHUNK_CAPACITY", default_value_t = DEFAULT_CHUNK_CAPACITY, global = true)]
    chunk_capacity: usize,

    /// Samples at or below this value are no-data
    #[arg(
        long,
        env = "HYPSO_NODATA_THRESHOLD",
        default_value_t = DEFAULT_NODATA_THRESHOLD,
        allow_negative_numbers = true,
        global = true
    )]
    nodata_threshold: f64,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query elevation for a single coordinate
    Query {
        /// Latitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add an elevation column to a CSV of coordinates
    Batch {
        /// Input CSV file
        input: PathBuf,

        /// Output file (defaults to <input>_elevation.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Column name for latitude
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Column name for longitude
        #[arg(long, default_value = "lon")]
        lon_col: String,
    },

    /// Sample an elevation profile between two points
    Profile {
        /// Start latitude
        #[arg(long, allow_negative_numbers = true)]
        from_lat: f64,

        /// Start longitude
        #[arg(long, allow_negative_numbers = true)]
        from_lon: f64,

        /// End latitude
        #[arg(long, allow_negative_numbers = true)]
        to_lat: f64,

        /// End longitude
        #[arg(long, allow_negative_numbers = true)]
        to_lon: f64,

        /// Number of samples including both endpoints
        #[arg(short = 'n', long, default_value_t = DEFAULT_PROFILE_POINTS)]
        points: usize,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Display information about the quadrant tiles
    Info {
        /// Quadrant (nw, ne, sw, se); all quadrants if omitted
        quadrant: Option<String>,

        /// Specify the tile by latitude instead of quadrant
        #[arg(long, requires = "lon", conflicts_with = "quadrant", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Specify the tile by longitude instead of quadrant
        #[arg(long, requires = "lat", conflicts_with = "quadrant", allow_negative_numbers = true)]
        lon: Option<f64>,

        /// Scan every sample for min/max elevation and no-data count
        #[arg(long)]
        stats: bool,
    },

    /// List the expected tile files and whether they are present
    List,

    /// Collect elevation points from the remote service into a cache file
    Acquire {
        /// Point cache file
        #[arg(long, default_value = "elevation_cache.json")]
        cache: PathBuf,

        /// Progress file
        #[arg(long, default_value = "elevation_progress.json")]
        progress: PathBuf,

        /// Work units along each axis
        #[arg(long, default_value_t = DEFAULT_GRID_SIZE)]
        grid_size: u32,

        /// Lattice size of each pass, comma separated
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_RESOLUTION_STEPS)]
        resolutions: Vec<u32>,

        /// Points per batch
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Maximum requests in flight
        #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// Attempts per point, including the first
        #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
        attempts: u32,

        /// Sweeps over unfinished units per pass
        #[arg(long, default_value_t = DEFAULT_MAX_SWEEPS)]
        max_sweeps: u32,

        /// Elevation service endpoint
        #[arg(long, env = "HYPSO_EPQS_URL", default_value = DEFAULT_EPQS_URL)]
        url: String,

        /// Per-request timeout in milliseconds
        #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_millis() as u64)]
        timeout_ms: u64,

        /// Pause before each request in milliseconds
        #[arg(long, default_value_t = DEFAULT_PACING.as_millis() as u64)]
        pacing_ms: u64,

        /// Minimum milliseconds between cache writes
        #[arg(long, default_value_t = 1000)]
        debounce_ms: u64,

        /// Region to acquire as north,south,east,west (defaults to tile coverage)
        #[arg(long, value_delimiter = ',', num_args = 4, allow_negative_numbers = true)]
        region: Option<Vec<f64>>,
    },

    /// Thin a point cache to every Nth distinct latitude and longitude
    Reduce {
        /// Input point cache file
        #[arg(default_value = "elevation_cache.json")]
        input: PathBuf,

        /// Output file (defaults to <input>_reduced.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep every Nth latitude and longitude
        #[arg(short, long, default_value_t = 4)]
        factor: usize,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let engine = EngineOptions {
        data_dir: cli.data_dir,
        chunk_size: cli.chunk_size,
        chunk_capacity: cli.chunk_capacity,
        nodata_threshold: cli.nodata_threshold,
    };

    match cli.command {
        Commands::Query { lat, lon, json } => commands::query::run(&engine, lat, lon, json),
        Commands::Batch {
            input,
            output,
            lat_col,
            lon_col,
        } => commands::batch::run(&engine, input, output, lat_col, lon_col),
        Commands::Profile {
            from_lat,
            from_lon,
            to_lat,
            to_lon,
            points,
            json,
        } => commands::profile::run(
            &engine,
            (from_lat, from_lon),
            (to_lat, to_lon),
            points,
            json,
        ),
        Commands::Info {
            quadrant,
            lat,
            lon,
            stats,
        } => commands::info::run(&engine, quadrant, lat.zip(lon), stats),
        Commands::List => commands::list::run(&engine),
        Commands::Acquire {
            cache,
            progress,
            grid_size,
            resolutions,
            batch_size,
            concurrency,
            attempts,
            max_sweeps,
            url,
            timeout_ms,
            pacing_ms,
            debounce_ms,
            region,
        } => commands::acquire::run(commands::acquire::AcquireArgs {
            cache,
            progress,
            grid_size,
            resolutions,
            batch_size,
            concurrency,
            attempts,
            max_sweeps,
            url,
            timeout_ms,
            pacing_ms,
            debounce_ms,
            region,
        }),
        Commands::Reduce {
            input,
            output,
            factor,
        } => commands::reduce::run(input, output, factor),
    }
}
