//! Geographic regions and the quadrant tile index.
//!
//! The raster layer covers one bounding box split into four quadrant tiles at
//! a fixed latitude/longitude. [`TileIndex::locate_tile`] is the pure routing
//! function from a coordinate to the quadrant whose file holds it.
//!
//! # Tie-break
//!
//! A point on a split line belongs to the north (`lat >= split_lat`) and east
//! (`lon >= split_lon`) side, so every covered point routes to exactly one
//! quadrant.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ElevationError, Result};

/// Placeholder replaced by the quadrant name in filename templates.
const QUADRANT_PLACEHOLDER: &str = "{quadrant}";

/// A rectangle in decimal degrees (WGS84).
///
/// Invariant: `north > south` and `east > west`. Regions crossing the
/// antimeridian are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Northern boundary latitude.
    pub north: f64,
    /// Southern boundary latitude.
    pub south: f64,
    /// Eastern boundary longitude.
    pub east: f64,
    /// Western boundary longitude.
    pub west: f64,
}

impl Region {
    /// Create a region, validating edge ordering.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidRegion`] if `north <= south`,
    /// `east <= west`, or any edge is not finite.
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Result<Self> {
        if ![north, south, east, west].iter().all(|v| v.is_finite()) {
            return Err(ElevationError::InvalidRegion(format!(
                "non-finite edge in N{north} S{south} E{east} W{west}"
            )));
        }
        if north <= south {
            return Err(ElevationError::InvalidRegion(format!(
                "north ({north}) must be greater than south ({south})"
            )));
        }
        if east <= west {
            return Err(ElevationError::InvalidRegion(format!(
                "east ({east}) must be greater than west ({west})"
            )));
        }
        Ok(Self {
            north,
            south,
            east,
            west,
        })
    }

    /// Check whether a coordinate lies inside the region (edges inclusive).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat <= self.north && lon >= self.west && lon <= self.east
    }

    /// Latitude extent in degrees.
    pub fn lat_span(&self) -> f64 {
        self.north - self.south
    }

    /// Longitude extent in degrees.
    pub fn lon_span(&self) -> f64 {
        self.east - self.west
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "N{} S{} E{} W{}",
            self.north, self.south, self.east, self.west
        )
    }
}

/// One of the four backing tiles of a [`TileIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quadrant {
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
}

impl Quadrant {
    /// All quadrants in index order.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::NorthWest,
        Quadrant::NorthEast,
        Quadrant::SouthWest,
        Quadrant::SouthEast,
    ];

    /// Lowercase name used in tile filenames (e.g. "northwest").
    pub fn name(&self) -> &'static str {
        match self {
            Quadrant::NorthWest => "northwest",
            Quadrant::NorthEast => "northeast",
            Quadrant::SouthWest => "southwest",
            Quadrant::SouthEast => "southeast",
        }
    }

    fn is_north(&self) -> bool {
        matches!(self, Quadrant::NorthWest | Quadrant::NorthEast)
    }

    fn is_east(&self) -> bool {
        matches!(self, Quadrant::NorthEast | Quadrant::SouthEast)
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Quadrant {
    type Err = ElevationError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "northwest" | "nw" => Ok(Quadrant::NorthWest),
            "northeast" | "ne" => Ok(Quadrant::NorthEast),
            "southwest" | "sw" => Ok(Quadrant::SouthWest),
            "southeast" | "se" => Ok(Quadrant::SouthEast),
            _ => Err(ElevationError::InvalidArgument(format!(
                "unknown quadrant: {s}"
            ))),
        }
    }
}

/// Static knowledge of which tile covers which part of the coverage box.
#[derive(Debug, Clone, PartialEq)]
pub struct TileIndex {
    coverage: Region,
    split_lat: f64,
    split_lon: f64,
    filename_template: String,
}

impl TileIndex {
    /// Default filename template for quadrant tiles.
    pub const DEFAULT_FILENAME_TEMPLATE: &'static str = "nm_dem_{quadrant}.tiff";

    /// Create an index splitting `coverage` at `split_lat` / `split_lon`.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidRegion`] unless both split lines lie
    /// strictly inside the coverage box.
    pub fn new(coverage: Region, split_lat: f64, split_lon: f64) -> Result<Self> {
        if !(split_lat > coverage.south && split_lat < coverage.north) {
            return Err(ElevationError::InvalidRegion(format!(
                "split latitude {split_lat} outside ({}, {})",
                coverage.south, coverage.north
            )));
        }
        if !(split_lon > coverage.west && split_lon < coverage.east) {
            return Err(ElevationError::InvalidRegion(format!(
                "split longitude {split_lon} outside ({}, {})",
                coverage.west, coverage.east
            )));
        }
        Ok(Self {
            coverage,
            split_lat,
            split_lon,
            filename_template: Self::DEFAULT_FILENAME_TEMPLATE.to_string(),
        })
    }

    /// The New Mexico quadrant layout: 31.33°N–37°N, 109.05°W–103°W, split
    /// at 35°N / 106°W.
    pub fn new_mexico() -> Self {
        Self {
            coverage: Region {
                north: 37.0,
                south: 31.33,
                east: -103.0,
                west: -109.05,
            },
            split_lat: 35.0,
            split_lon: -106.0,
            filename_template: Self::DEFAULT_FILENAME_TEMPLATE.to_string(),
        }
    }

    /// Replace the filename template. `{quadrant}` expands to the quadrant
    /// name, e.g. `"dem_{quadrant}.hgt"`.
    pub fn with_filename_template(mut self, template: impl Into<String>) -> Self {
        self.filename_template = template.into();
        self
    }

    /// Select the quadrant tile containing `(lat, lon)`.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::OutOfCoverage`] if the point is outside the
    /// coverage box or not a finite coordinate.
    ///
    /// # Examples
    ///
    /// ```
    /// use hypso::{Quadrant, TileIndex};
    ///
    /// let index = TileIndex::new_mexico();
    /// assert_eq!(index.locate_tile(35.0844, -106.6504).unwrap(), Quadrant::NorthWest);
    /// assert_eq!(index.locate_tile(35.0, -106.0).unwrap(), Quadrant::NorthEast);
    /// assert!(index.locate_tile(40.0, -106.0).is_err());
    /// ```
    pub fn locate_tile(&self, lat: f64, lon: f64) -> Result<Quadrant> {
        if !lat.is_finite() || !lon.is_finite() || !self.coverage.contains(lat, lon) {
            return Err(ElevationError::OutOfCoverage { lat, lon });
        }

        let quadrant = match (lat >= self.split_lat, lon >= self.split_lon) {
            (true, false) => Quadrant::NorthWest,
            (true, true) => Quadrant::NorthEast,
            (false, false) => Quadrant::SouthWest,
            (false, true) => Quadrant::SouthEast,
        };
        Ok(quadrant)
    }

    /// Geographic bounds of a quadrant tile.
    pub fn region(&self, quadrant: Quadrant) -> Region {
        let (north, south) = if quadrant.is_north() {
            (self.coverage.north, self.split_lat)
        } else {
            (self.split_lat, self.coverage.south)
        };
        let (east, west) = if quadrant.is_east() {
            (self.coverage.east, self.split_lon)
        } else {
            (self.split_lon, self.coverage.west)
        };
        Region {
            north,
            south,
            east,
            west,
        }
    }

    /// Filename of a quadrant tile, relative to the data directory.
    pub fn filename(&self, quadrant: Quadrant) -> String {
        self.filename_template
            .replace(QUADRANT_PLACEHOLDER, quadrant.name())
    }

    /// The full covered bounding box.
    pub fn coverage(&self) -> Region {
        self.coverage
    }

    /// Latitude and longitude of the split lines.
    pub fn split(&self) -> (f64, f64) {
        (self.split_lat, self.split_lon)
    }

    /// Iterate over all quadrants with their regions.
    pub fn tiles(&self) -> impl Iterator<Item = (Quadrant, Region)> + '_ {
        Quadrant::ALL.into_iter().map(|q| (q, self.region(q)))
    }
}

impl Default for TileIndex {
    fn default() -> Self {
        Self::new_mexico()
    }
}
