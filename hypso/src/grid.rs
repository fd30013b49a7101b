//! Acquisition work grid.
//!
//! The acquisition region is cut into `grid_size × grid_size` work units. At
//! resolution `r`, each unit contributes an `r × r` lattice of points spanning
//! its own sub-rectangle, edges included, so neighbouring units share their
//! border points.

use crate::error::{ElevationError, Result};
use crate::profile::GeoPoint;
use crate::region::Region;

/// Default number of units along each axis.
pub const DEFAULT_GRID_SIZE: u32 = 10;

/// Default lattice sizes of the successive passes.
pub const DEFAULT_RESOLUTION_STEPS: [u32; 4] = [5, 10, 20, 40];

/// One cell of the work grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkUnit {
    /// Column, west to east.
    pub x: u32,
    /// Row, south to north.
    pub y: u32,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl WorkUnit {
    /// Stable identifier `"x,y"` used in the progress record.
    pub fn id(&self) -> String {
        format!("{},{}", self.x, self.y)
    }

    /// The `resolution × resolution` lattice of this unit, row by row from
    /// the south edge. A resolution of 1 yields the south-west corner.
    pub fn points(&self, resolution: u32) -> Vec<GeoPoint> {
        if resolution <= 1 {
            return if resolution == 1 {
                vec![GeoPoint::new(self.min_lat, self.min_lon)]
            } else {
                Vec::new()
            };
        }

        let steps = f64::from(resolution - 1);
        let mut points = Vec::with_capacity((resolution * resolution) as usize);
        for i in 0..resolution {
            let lat = self.min_lat + (f64::from(i) / steps) * (self.max_lat - self.min_lat);
            for j in 0..resolution {
                let lon = self.min_lon + (f64::from(j) / steps) * (self.max_lon - self.min_lon);
                points.push(GeoPoint::new(lat, lon));
            }
        }
        points
    }
}

/// A region partitioned into square work units.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionGrid {
    region: Region,
    grid_size: u32,
}

impl AcquisitionGrid {
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidArgument`] if `grid_size` is zero.
    pub fn new(region: Region, grid_size: u32) -> Result<Self> {
        if grid_size == 0 {
            return Err(ElevationError::InvalidArgument(
                "grid size must be positive".to_string(),
            ));
        }
        Ok(Self { region, grid_size })
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    /// Total number of units.
    pub fn unit_count(&self) -> usize {
        (self.grid_size as usize).pow(2)
    }

    /// The unit at column `x`, row `y`.
    pub fn unit(&self, x: u32, y: u32) -> WorkUnit {
        let unit_width = (self.region.east - self.region.west) / f64::from(self.grid_size);
        let unit_height = (self.region.north - self.region.south) / f64::from(self.grid_size);

        let min_lon = self.region.west + f64::from(x) * unit_width;
        let min_lat = self.region.south + f64::from(y) * unit_height;
        WorkUnit {
            x,
            y,
            min_lat,
            max_lat: min_lat + unit_height,
            min_lon,
            max_lon: min_lon + unit_width,
        }
    }

    /// All units, rows south to north, columns west to east within a row.
    pub fn units(&self) -> impl Iterator<Item = WorkUnit> + '_ {
        (0..self.grid_size).flat_map(move |y| (0..self.grid_size).map(move |x| self.unit(x, y)))
    }
}
