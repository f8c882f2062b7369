use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use las::{Read, Reader};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::bounds::BoundingBox;
use crate::errors::NdviError;
use crate::spatial_reference::SpatialReference;
use crate::utils::get_paths;

/// What the LAS headers say about a point cloud, without reading a single point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointCloudInfo {
    pub files: Vec<PathBuf>,
    pub point_count: u64,
    pub bounds: BoundingBox,
    /// `major.minor` of the first file
    pub las_version: String,
    pub point_format: u8,
    pub spatial_reference: Option<SpatialReference>,
    /// average distance between points on the ground, `sqrt(area / count)`
    pub point_spacing: Option<f64>,
}

impl PointCloudInfo {

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<PointCloudInfo, NdviError> {
        PointCloudInfo::from_paths(&[path.as_ref().to_path_buf()])
    }

    /// every file matching the glob pattern, see `utils::get_paths`
    pub fn from_glob(glob_pattern: &str) -> Result<PointCloudInfo, NdviError> {
        PointCloudInfo::from_paths(&get_paths(glob_pattern)?)
    }

    /// Combines the headers of several files. The spatial reference and version are the first file's,
    /// a file whose reference differs is logged with warn.
    pub fn from_paths(paths: &[PathBuf]) -> Result<PointCloudInfo, NdviError> {
        let mut bounds = BoundingBox::default();
        let mut point_count = 0u64;
        let mut first: Option<(String, u8, Option<SpatialReference>)> = None;

        for path in paths {
            let reader = Reader::from_path(path)?;
            let header = reader.header();
            bounds.add(BoundingBox::from(header.bounds()));
            point_count += header.number_of_points();

            let srs = SpatialReference::from_las_header(header);
            if let Some((_, _, first_srs)) = &first {
                if *first_srs != srs {
                    warn!("{} has a different spatial reference than the first file", path.display());
                }
            } else {
                let version = header.version();
                first = Some((
                    format!("{}.{}", version.major, version.minor),
                    header.point_format().to_u8()?,
                    srs,
                ));
            }
        }

        let (las_version, point_format, spatial_reference) = first.ok_or(NdviError::NoInputFiles)?;
        let info = PointCloudInfo {
            files: paths.to_vec(),
            point_count,
            bounds,
            las_version,
            point_format,
            spatial_reference,
            point_spacing: estimate_spacing(&bounds, point_count),
        };

        info!("{} points in {} file(s), bounds {}", info.point_count, info.files.len(), info.bounds);
        match info.spatial_reference.as_ref().and_then(|srs| srs.epsg()) {
            Some(code) => info!("spatial reference EPSG:{code}"),
            None if info.spatial_reference.is_some() => info!("spatial reference present but has no EPSG code"),
            None => warn!("point cloud has no spatial reference, rasters will be written without one"),
        }
        if let Some(spacing) = info.point_spacing {
            info!("estimated point spacing {spacing:.3}");
        }
        Ok(info)
    }

    /// the cell size to use when none is configured
    pub fn suggested_resolution(&self) -> Option<f64> {
        self.point_spacing
    }

    /// pretty printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), NdviError>{
        let mut f = File::create(path)?;
        let buf = serde_json::to_vec_pretty(self)?;
        f.write_all(&buf[..])?;

        Ok(())
    }
}

/// `sqrt(area / count)` over the planar footprint. `None` for an empty or degenerate footprint.
pub fn estimate_spacing(bounds: &BoundingBox, point_count: u64) -> Option<f64> {
    let area = bounds.area_xy();
    if point_count == 0 || !(area.is_finite() && area > 0f64) {
        None
    } else {
        Some((area / point_count as f64).sqrt())
    }
}
