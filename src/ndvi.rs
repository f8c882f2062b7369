//! The normalized difference `(a - b) / (a + b)` over two grids, with no-data masking.
//!
//! With lidar intensity as `a` and the orthoimage red band as `b` this is a pseudo-NDVI.

use std::path::Path;
use std::time::SystemTime;
use log::{debug, info};

use crate::errors::NdviError;
use crate::geotiff::{read_geotiff, write_geotiff};
use crate::raster::{DataType, Raster};

/// Cell by cell normalized difference of two equally long slices.
///
/// A cell is NaN when either input equals `nodata`. A zero denominator is left to IEEE 754
/// (infinity or NaN), it is not an error. Slices of different lengths are.
pub fn normalized_difference_cells(numerator: &[f64], subtrahend: &[f64], nodata: f64) -> Result<Vec<f64>, NdviError> {
    if numerator.len() != subtrahend.len() {
        return Err(NdviError::CellCountMismatch {
            left: numerator.len(),
            right: subtrahend.len(),
        });
    }
    Ok(numerator
        .iter()
        .zip(subtrahend.iter())
        .map(|(&a, &b)| {
            if a == nodata || b == nodata {
                f64::NAN
            } else {
                (a - b) / (a + b)
            }
        })
        .collect())
}

/// Normalized difference of two grids of the same shape.
///
/// Only the shape is checked, so this works on any two grids however they were made.
/// The result keeps `numerator`'s transform and spatial reference and carries `nodata` as its sentinel.
pub fn normalized_difference(numerator: &Raster, subtrahend: &Raster, nodata: f64) -> Result<Raster, NdviError> {
    if numerator.width != subtrahend.width || numerator.height != subtrahend.height {
        return Err(NdviError::GridShapeMismatch {
            left_width: numerator.width,
            left_height: numerator.height,
            right_width: subtrahend.width,
            right_height: subtrahend.height,
        });
    }
    numerator.check_cell_count()?;
    subtrahend.check_cell_count()?;

    Ok(Raster {
        data: normalized_difference_cells(&numerator.data, &subtrahend.data, nodata)?,
        width: numerator.width,
        height: numerator.height,
        transform: numerator.transform,
        spatial_reference: numerator.spatial_reference.clone(),
        nodata: Some(nodata),
        data_type: DataType::Float32,
    })
}

/// Like `normalized_difference`, but for rasters read from disk: they must also share a transform
/// and spatial reference. The sentinel is the numerator's, falling back to the subtrahend's, then NaN.
pub fn normalized_difference_checked(numerator: &Raster, subtrahend: &Raster) -> Result<Raster, NdviError> {
    numerator.check_same_grid(subtrahend)?;
    if numerator.spatial_reference != subtrahend.spatial_reference {
        return Err(NdviError::SpatialReferenceMismatch);
    }
    if numerator.nodata.is_some() && subtrahend.nodata.is_some() && numerator.nodata != subtrahend.nodata {
        debug!("inputs carry different no-data values {:?} and {:?}, using the first",
            numerator.nodata, subtrahend.nodata);
    }
    let nodata = numerator.nodata.or(subtrahend.nodata).unwrap_or(f64::NAN);
    normalized_difference(numerator, subtrahend, nodata)
}

/// Reads the two single band rasters, computes the normalized difference and writes it to `output`
/// stored as `data_type`. Each file is closed before the next one is touched.
pub fn compute_ndvi_file<P, Q, R>(nir_path: P, red_path: Q, output: R, data_type: DataType) -> Result<Raster, NdviError>
    where P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>
{
    let now = SystemTime::now();
    let nir = read_geotiff(nir_path)?;
    let red = read_geotiff(red_path)?;

    let mut ndvi = normalized_difference_checked(&nir, &red)?;
    ndvi.data_type = data_type;
    write_geotiff(&ndvi, output.as_ref())?;

    match ndvi.statistics() {
        Some(stats) => info!("ndvi: {} valid cells, min {:.3}, max {:.3}, mean {:.3}",
            stats.valid_count, stats.min, stats.max, stats.mean),
        None => info!("ndvi: no valid cells"),
    }
    info!("ndvi step took {:?}", now.elapsed());
    Ok(ndvi)
}
