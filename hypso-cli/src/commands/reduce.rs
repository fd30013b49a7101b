use anyhow::{Context, Result};
use hypso::PointCache;
use std::path::{Path, PathBuf};

pub fn run(input: PathBuf, output: Option<PathBuf>, factor: usize) -> Result<()> {
    let output = output.unwrap_or_else(|| default_output(&input));
    let (kept, total) = reduce(&input, &output, factor)?;

    println!("Original points: {}", total);
    println!("Kept points: {}", kept);
    if kept > 0 {
        println!("Reduction ratio: {:.2}x", total as f64 / kept as f64);
    }
    println!("Reduced data written to {}", output.display());
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "elevation_cache".to_string());
    input.with_file_name(format!("{}_reduced.json", stem))
}

fn reduce(input: &Path, output: &Path, factor: usize) -> Result<(usize, usize)> {
    let cache = PointCache::read(input)
        .with_context(|| format!("Failed to read point cache {}", input.display()))?;
    let reduced = cache.thin(factor)?;
    reduced
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok((reduced.len(), cache.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hypso::PointKey;
    use tempfile::TempDir;

    #[test]
    fn test_default_output_name() {
        assert_eq!(
            default_output(Path::new("data/elevation_cache.json")),
            PathBuf::from("data/elevation_cache_reduced.json")
        );
    }

    #[test]
    fn test_reduce_keeps_every_other_row_and_column() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("elevation_cache.json");
        let output = dir.path().join("reduced.json");

        let mut cache = PointCache::new();
        for i in 0..4 {
            for j in 0..4 {
                let lat = 35.0 + f64::from(i) * 0.5;
                let lon = -107.0 + f64::from(j) * 0.5;
                cache.insert(PointKey::new(lat, lon), f64::from(i * 10 + j));
            }
        }
        cache.save(&input).unwrap();

        let (kept, total) = reduce(&input, &output, 2).unwrap();
        assert_eq!((kept, total), (4, 16));

        let reduced = PointCache::read(&output).unwrap();
        assert_eq!(reduced.get(&PointKey::new(35.0, -107.0)), Some(0.0));
        assert_eq!(reduced.get(&PointKey::new(36.0, -106.0)), Some(22.0));
        assert!(!reduced.contains(&PointKey::new(35.5, -107.0)));
    }

    #[test]
    fn test_reduce_rejects_zero_factor() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("elevation_cache.json");
        PointCache::new().save(&input).unwrap();
        assert!(reduce(&input, &dir.path().join("out.json"), 0).is_err());
    }
}
