use anyhow::{bail, Context, Result};
use hypso::ElevationEngine;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use super::common::{format_elevation, EngineOptions};

pub fn run(
    options: &EngineOptions,
    input: PathBuf,
    output: Option<PathBuf>,
    lat_col: String,
    lon_col: String,
) -> Result<()> {
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if extension != "csv" {
        bail!("Unsupported file format: {}. Use .csv", extension);
    }

    let engine = options.build()?;
    let output_path = output.unwrap_or_else(|| default_output(&input));
    let summary = process_csv(&engine, &input, &output_path, &lat_col, &lon_col)?;

    println!(
        "Output written to: {} ({} rows, {} void)",
        output_path.display(),
        summary.rows,
        summary.void
    );
    Ok(())
}

struct BatchSummary {
    rows: u64,
    void: u64,
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "points".to_string());
    input.with_file_name(format!("{}_elevation.csv", stem))
}

fn process_csv(
    engine: &ElevationEngine,
    input: &Path,
    output_path: &Path,
    lat_col: &str,
    lon_col: &str,
) -> Result<BatchSummary> {
    let file = File::open(input).context("Failed to open input file")?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    // Find column indices
    let headers = reader.headers()?.clone();
    let lat_idx = headers
        .iter()
        .position(|h| h == lat_col)
        .with_context(|| format!("Column '{}' not found in CSV", lat_col))?;
    let lon_idx = headers
        .iter()
        .position(|h| h == lon_col)
        .with_context(|| format!("Column '{}' not found in CSV", lon_col))?;

    // Collect records for progress bar
    let records: Vec<_> = reader.records().collect::<Result<_, _>>()?;
    let total = records.len() as u64;

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let output_file = File::create(output_path).context("Failed to create output file")?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(output_file));

    let mut new_headers: Vec<&str> = headers.iter().collect();
    new_headers.push("elevation");
    writer.write_record(&new_headers)?;

    let mut summary = BatchSummary { rows: 0, void: 0 };
    for (line, record) in records.iter().enumerate() {
        let parse = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .with_context(|| format!("Row {}: missing {}", line + 1, name))?
                .trim()
                .parse()
                .with_context(|| format!("Row {}: invalid {}", line + 1, name))
        };
        let lat = parse(lat_idx, "latitude")?;
        let lon = parse(lon_idx, "longitude")?;

        let elevation = engine.query_elevation(lat, lon);
        if elevation.is_none() {
            summary.void += 1;
        }
        summary.rows += 1;

        let cell = format_elevation(elevation);
        let mut new_record: Vec<&str> = record.iter().collect();
        new_record.push(&cell);
        writer.write_record(&new_record)?;

        pb.inc(1);
    }

    pb.finish_and_clear();
    writer.flush()?;
    Ok(summary)
}
