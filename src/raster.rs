use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use csv::WriterBuilder;
use image::{ImageBuffer, Luma};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::NdviError;
use crate::geo_transform::GeoTransform;
use crate::spatial_reference::SpatialReference;
use crate::utils::{f64_max, f64_min, scale_float_to_uint_range, x_y_to_index};

/// the most cells a grid may have, a fine resolution over a large extent fails instead of exhausting memory
pub const MAX_GRID_CELLS: usize = 1 << 28;

/// Fails when a `width` x `height` grid has more than `MAX_GRID_CELLS` cells.
/// Returns the sides as the u32 TIFF and PNG sizes are given in.
pub fn check_grid_size(width: usize, height: usize) -> Result<(u32, u32), NdviError> {
    let too_large = || NdviError::GridTooLarge { width, height };
    let cells = width.checked_mul(height).ok_or_else(too_large)?;
    if cells > MAX_GRID_CELLS {
        return Err(too_large());
    }
    Ok((
        u32::try_from(width).map_err(|_| too_large())?,
        u32::try_from(height).map_err(|_| too_large())?,
    ))
}

/// Sample type a raster is stored with on disk. In memory every raster is f64.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DataType {
    Float32,
    #[default]
    Float64,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }
}

impl FromStr for DataType {
    type Err = NdviError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float32" | "float" | "f32" => Ok(DataType::Float32),
            "float64" | "double" | "f64" => Ok(DataType::Float64),
            _ => Err(NdviError::UnknownDataType(s.to_string())),
        }
    }
}

impl Display for DataType {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(formatter, "{}", self.name())
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// summary of the valid (not no-data, not NaN) cells of a raster
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RasterStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub valid_count: usize,
}

/// A single band grid of values with the transform and reference that place it on the ground.
/// Row 0 is the northern edge, data is row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    pub data: Vec<f64>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub spatial_reference: Option<SpatialReference>,
    pub nodata: Option<f64>,
    pub data_type: DataType,
}

impl Raster {

    /// Builds a raster from rows (north to south) on a unit grid at the origin.
    /// Mostly handy for small hand written grids.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Raster, NdviError> {
        let height = rows.len();
        let width = rows.first().map_or(0, |row| row.len());
        let mut data = Vec::with_capacity(width * height);
        for (row_index, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(NdviError::RaggedRowsError {
                    row: row_index,
                    found: row.len(),
                    expected: width,
                });
            }
            data.extend(row);
        }
        Ok(Raster {
            data,
            width,
            height,
            transform: GeoTransform::north_up(0f64, height as f64, 1f64),
            spatial_reference: None,
            nodata: None,
            data_type: DataType::default(),
        })
    }

    pub fn with_nodata(mut self, nodata: f64) -> Raster {
        self.nodata = Some(nodata);
        self
    }

    pub fn get(&self, x: usize, y: usize) -> Result<f64, NdviError> {
        Ok(self.data[x_y_to_index(self.width, self.height, x, y)?])
    }

    pub fn set(&mut self, x: usize, y: usize, value: f64) -> Result<(), NdviError> {
        let index = x_y_to_index(self.width, self.height, x, y)?;
        self.data[index] = value;
        Ok(())
    }

    /// the rows north to south, mostly for tests and debugging
    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.data.chunks(self.width.max(1)).map(|row| row.to_vec()).collect()
    }

    pub fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || self.nodata == Some(value)
    }

    /// Fails when `data` doesn't hold exactly `width * height` cells.
    pub fn check_cell_count(&self) -> Result<(), NdviError> {
        let expected = self.width.checked_mul(self.height).ok_or(NdviError::GridTooLarge {
            width: self.width,
            height: self.height,
        })?;
        if self.data.len() != expected {
            return Err(NdviError::CellCountMismatch {
                left: self.data.len(),
                right: expected,
            });
        }
        Ok(())
    }

    /// Fails unless `other` has the same size and transform. Size is checked first.
    pub fn check_same_grid(&self, other: &Raster) -> Result<(), NdviError> {
        if self.width != other.width || self.height != other.height {
            return Err(NdviError::GridShapeMismatch {
                left_width: self.width,
                left_height: self.height,
                right_width: other.width,
                right_height: other.height,
            });
        }
        if self.transform != other.transform {
            return Err(NdviError::GridTransformMismatch {
                left: self.transform,
                right: other.transform,
            });
        }
        Ok(())
    }

    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().copied().filter(|value| !self.is_nodata(*value))
    }

    /// `None` when there isn't a single valid cell
    pub fn statistics(&self) -> Option<RasterStatistics> {
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        let mut sum = 0f64;
        let mut valid_count = 0usize;
        for value in self.valid_values() {
            min = f64_min(min, value);
            max = f64_max(max, value);
            sum += value;
            valid_count += 1;
        }
        if valid_count == 0 {
            None
        } else {
            Some(RasterStatistics {
                min,
                max,
                mean: sum / valid_count as f64,
                valid_count,
            })
        }
    }

    /// Writes the grid as a header-less csv, one row per raster row.
    /// Useful for eyeballing small rasters, no-data cells are written as they are stored.
    pub fn save_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), NdviError>{
        let mut output = WriterBuilder::new().has_headers(false).from_path(path)?;
        for row in self.data.chunks(self.width.max(1)){
            output.serialize(row)?;
        };
        output.flush()?;
        Ok(())
    }

    /// saves as a black and white png with brightness scaled between the smallest and largest valid cell.
    /// No-data and NaN cells are black. Good for a sanity check against the orthoimage.
    pub fn save_to_image<P: AsRef<Path>>(&self, path: P) -> Result<(), NdviError>{
        self.check_cell_count()?;
        let (width, height) = check_grid_size(self.width, self.height)?;
        let (min, max) = self.statistics().map_or((0f64, 0f64), |stats| (stats.min, stats.max));

        let image: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_fn(
            width,
            height,
            |x, y| {
                let value = self.data[y as usize * self.width + x as usize];
                if self.is_nodata(value) {
                    Luma([0u8])
                } else {
                    Luma([scale_float_to_uint_range(value, min, max, 254) as u8 + 1])
                }
            },
        );

        image.save(path)?;
        Ok(())
    }
}
