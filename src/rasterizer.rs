use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;
use geo::Coord;
use las::Point;
use log::{debug, info};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bounds::BoundingBox;
use crate::dimension::Dimension;
use crate::errors::NdviError;
use crate::geo_transform::GeoTransform;
use crate::geotiff::write_geotiff;
use crate::raster::{check_grid_size, DataType, Raster};
use crate::spatial_reference::SpatialReference;

/// How the values of all points landing in one cell become the cell value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Reduction {
    Min,
    Max,
    #[default]
    Mean,
    Count,
    /// population standard deviation
    Stdev,
}

impl Reduction {
    pub fn name(&self) -> &'static str {
        match self {
            Reduction::Min => "min",
            Reduction::Max => "max",
            Reduction::Mean => "mean",
            Reduction::Count => "count",
            Reduction::Stdev => "stdev",
        }
    }
}

impl FromStr for Reduction {
    type Err = NdviError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "min" => Ok(Reduction::Min),
            "max" => Ok(Reduction::Max),
            "mean" => Ok(Reduction::Mean),
            "count" => Ok(Reduction::Count),
            "stdev" => Ok(Reduction::Stdev),
            _ => Err(NdviError::UnknownReduction(s.to_string())),
        }
    }
}

impl Display for Reduction {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(formatter, "{}", self.name())
    }
}

impl Serialize for Reduction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Reduction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Running statistics of the values that landed in one cell.
/// Mean and variance are kept with Welford's update so long runs of similar values stay accurate.
#[derive(Copy, Clone, Debug)]
pub struct CellAggregate{
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for CellAggregate {
    fn default() -> Self {
        CellAggregate {
            count: 0,
            mean: 0f64,
            m2: 0f64,
            min: f64::MAX,
            max: f64::MIN,
        }
    }
}

impl CellAggregate{
    pub fn add_sample(&mut self, value: f64){
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// the reduced value, or `nodata` if nothing landed here
    pub fn reduce_or(&self, reduction: Reduction, nodata: f64) -> f64{
        if self.count == 0 {
            return nodata;
        }
        match reduction {
            Reduction::Min => self.min,
            Reduction::Max => self.max,
            Reduction::Mean => self.mean,
            Reduction::Count => self.count as f64,
            Reduction::Stdev => (self.m2 / self.count as f64).sqrt(),
        }
    }
}

fn default_dimension() -> Dimension {
    Dimension::Z
}

fn default_nodata() -> f64 {
    -9999f64
}

fn default_driver() -> String {
    "GTiff".to_string()
}

/// Options of a `writers.gdal` stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RasterWriterOptions {
    pub filename: PathBuf,
    #[serde(default = "default_dimension")]
    pub dimension: Dimension,
    #[serde(default)]
    pub output_type: Reduction,
    pub resolution: f64,
    #[serde(default = "default_nodata")]
    pub nodata: f64,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default = "default_driver")]
    pub gdaldriver: String,
    /// pins the grid's west edge instead of taking it from the points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_x: Option<f64>,
    /// pins the grid's north edge instead of taking it from the points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<usize>,
}

impl RasterWriterOptions {
    pub fn new<P: Into<PathBuf>>(filename: P, dimension: Dimension, resolution: f64) -> RasterWriterOptions {
        RasterWriterOptions {
            filename: filename.into(),
            dimension,
            output_type: Reduction::default(),
            resolution,
            nodata: default_nodata(),
            data_type: DataType::default(),
            gdaldriver: default_driver(),
            origin_x: None,
            origin_y: None,
            width: None,
            height: None,
        }
    }

    pub fn validate(&self) -> Result<(), NdviError> {
        if !(self.resolution.is_finite() && self.resolution > 0f64) {
            return Err(NdviError::InvalidResolution(self.resolution));
        }
        if !self.gdaldriver.eq_ignore_ascii_case("gtiff") {
            return Err(NdviError::UnsupportedDriver(self.gdaldriver.clone()));
        }
        Ok(())
    }

    /// The grid the points land in. Pinned values win, anything else comes from `bounds`:
    /// origin at (min x, max y), `floor(range / resolution) + 1` cells on each axis.
    /// Fails with `GridTooLarge` rather than allocating an absurd grid.
    pub fn grid_for(&self, bounds: &BoundingBox) -> Result<(GeoTransform, usize, usize), NdviError> {
        let origin_x = self.origin_x.unwrap_or(bounds.min_x);
        let origin_y = self.origin_y.unwrap_or(bounds.max_y);
        let width = self
            .width
            .unwrap_or_else(|| cells_along(bounds.max_x - origin_x, self.resolution));
        let height = self
            .height
            .unwrap_or_else(|| cells_along(origin_y - bounds.min_y, self.resolution));
        check_grid_size(width, height)?;
        Ok((GeoTransform::north_up(origin_x, origin_y, self.resolution), width, height))
    }
}

/// cells needed to cover `extent`, saturating at `usize::MAX`
fn cells_along(extent: f64, resolution: f64) -> usize {
    ((extent / resolution).floor().max(0f64) as usize).saturating_add(1)
}

/// The precursor to a raster: one `CellAggregate` per cell, filled point by point.
pub struct GridAccumulator{
    pub data: Vec<CellAggregate>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub dimension: Dimension,
    /// points that fell outside a pinned grid
    pub skipped: usize,
}

impl GridAccumulator{
    pub fn new(transform: GeoTransform, width: usize, height: usize, dimension: Dimension)
        -> Result<GridAccumulator, NdviError>
    {
        check_grid_size(width, height)?;
        Ok(GridAccumulator{
            data: vec![CellAggregate::default(); width * height],
            width,
            height,
            transform,
            dimension,
            skipped: 0,
        })
    }

    /// adds a point's `dimension` to the cell containing it. Returns false (and counts it) when no cell does.
    pub fn add_point(&mut self, point: &Point) -> bool{
        match self.transform.pixel_containing(Coord { x: point.x, y: point.y }, self.width, self.height) {
            Some((x, y)) => {
                self.data[(y * self.width) + x].add_sample(self.dimension.value(point));
                true
            }
            None => {
                self.skipped += 1;
                false
            }
        }
    }

    pub fn into_raster(self, reduction: Reduction, nodata: f64) -> Raster {
        Raster {
            data: self.data.iter().map(|cell| cell.reduce_or(reduction, nodata)).collect(),
            width: self.width,
            height: self.height,
            transform: self.transform,
            spatial_reference: None,
            nodata: Some(nodata),
            data_type: DataType::default(),
        }
    }
}

/// bounds of the point positions, z included
pub fn point_bounds(points: &[Point]) -> BoundingBox {
    let mut bounds = BoundingBox::default();
    for point in points {
        bounds.add_xyz(point.x, point.y, point.z);
    }
    bounds
}

/// Bins `points` into the grid described by `options` and reduces every cell.
/// Nothing is written to disk, see `write_raster` for that.
pub fn rasterize(points: &[Point], options: &RasterWriterOptions, spatial_reference: Option<&SpatialReference>)
    -> Result<Raster, NdviError>
{
    options.validate()?;
    if points.is_empty() {
        return Err(NdviError::NoPointsError(options.filename.clone()));
    }

    let now = SystemTime::now();
    let bounds = point_bounds(points);
    let (transform, width, height) = options.grid_for(&bounds)?;
    debug!("grid for {}: {}x{} cells, transform {}", options.filename.display(), width, height, transform);

    let mut accumulator = GridAccumulator::new(transform, width, height, options.dimension)?;
    for point in points {
        accumulator.add_point(point);
    }
    if accumulator.skipped > 0 {
        debug!("{} points fell outside the grid of {}", accumulator.skipped, options.filename.display());
    }

    let mut raster = accumulator.into_raster(options.output_type, options.nodata);
    raster.spatial_reference = spatial_reference.cloned();
    raster.data_type = options.data_type;

    info!("rasterized {} from {} points ({} per cell) in {:?}",
        options.dimension, points.len(), options.output_type, now.elapsed());
    Ok(raster)
}

/// `rasterize` followed by writing the GeoTIFF to `options.filename`
pub fn write_raster(points: &[Point], options: &RasterWriterOptions, spatial_reference: Option<&SpatialReference>)
    -> Result<Raster, NdviError>
{
    let raster = rasterize(points, options, spatial_reference)?;
    write_geotiff(&raster, &options.filename)?;
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn point(x: f64, y: f64, z: f64, intensity: u16) -> Point {
        Point { x, y, z, intensity, ..Default::default() }
    }

    #[test]
    fn aggregate_reductions() {
        let mut cell = CellAggregate::default();
        assert_eq!(cell.reduce_or(Reduction::Mean, -1.0), -1.0);
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            cell.add_sample(v);
        }
        assert_eq!(cell.reduce_or(Reduction::Mean, -1.0), 5.0);
        assert_eq!(cell.reduce_or(Reduction::Min, -1.0), 2.0);
        assert_eq!(cell.reduce_or(Reduction::Max, -1.0), 9.0);
        assert_eq!(cell.reduce_or(Reduction::Count, -1.0), 8.0);
        assert_approx_eq!(cell.reduce_or(Reduction::Stdev, -1.0), 2.0, 1e-12);
    }

    #[test]
    fn reduction_names() {
        assert_eq!("MEAN".parse::<Reduction>().unwrap(), Reduction::Mean);
        assert!(matches!("idw".parse::<Reduction>(), Err(NdviError::UnknownReduction(_))));
    }

    #[test]
    fn grid_size_covers_the_max_edge() {
        let options = RasterWriterOptions::new("x.tif", Dimension::Z, 1.0);
        let bounds = BoundingBox::new(0.0, 2.0, 0.0, 1.5, 0.0, 0.0);
        let (transform, width, height) = options.grid_for(&bounds).unwrap();
        assert_eq!(transform, GeoTransform::north_up(0.0, 1.5, 1.0));
        assert_eq!((width, height), (3, 2));
    }

    #[test]
    fn too_fine_a_resolution_is_an_error() {
        let points = vec![point(0.0, 0.0, 0.0, 1), point(1e4, 1e4, 0.0, 2)];
        let options = RasterWriterOptions::new("fine.tif", Dimension::Intensity, 1e-5);
        assert!(matches!(rasterize(&points, &options, None), Err(NdviError::GridTooLarge { .. })));

        let options = RasterWriterOptions::new("tiny.tif", Dimension::Intensity, f64::MIN_POSITIVE);
        assert!(matches!(rasterize(&points, &options, None), Err(NdviError::GridTooLarge { .. })));

        let mut options = RasterWriterOptions::new("pinned.tif", Dimension::Intensity, 1.0);
        options.width = Some(usize::MAX);
        options.height = Some(2);
        assert!(matches!(rasterize(&points, &options, None), Err(NdviError::GridTooLarge { .. })));
        assert!(GridAccumulator::new(GeoTransform::north_up(0.0, 0.0, 1.0), usize::MAX, 2, Dimension::Z).is_err());
    }

    #[test]
    fn mean_intensity_per_cell_with_nodata_holes() {
        let points = vec![
            point(0.1, 1.9, 0.0, 100),
            point(0.9, 1.1, 0.0, 300),
            point(2.5, 0.5, 0.0, 50),
            point(2.9, 1.9, 0.0, 70),
        ];
        let mut options = RasterWriterOptions::new("nir.tif", Dimension::Intensity, 1.0);
        options.nodata = -999.0;

        let raster = rasterize(&points, &options, None).unwrap();
        // bounds x 0.1..2.9, y 0.5..1.9, origin (0.1, 1.9)
        assert_eq!((raster.width, raster.height), (3, 2));
        assert_eq!(raster.get(0, 0).unwrap(), 200.0);
        assert_eq!(raster.get(1, 0).unwrap(), -999.0);
        assert_eq!(raster.get(2, 0).unwrap(), 70.0);
        assert_eq!(raster.get(2, 1).unwrap(), 50.0);
        assert_eq!(raster.get(0, 1).unwrap(), -999.0);
        assert_eq!(raster.nodata, Some(-999.0));
    }

    #[test]
    fn pinned_grid_skips_outside_points() {
        let mut options = RasterWriterOptions::new("z.tif", Dimension::Z, 1.0);
        options.origin_x = Some(0.0);
        options.origin_y = Some(1.0);
        options.width = Some(1);
        options.height = Some(1);
        options.output_type = Reduction::Count;

        let points = vec![point(0.5, 0.5, 1.0, 0), point(5.0, 5.0, 1.0, 0)];
        let raster = rasterize(&points, &options, None).unwrap();
        assert_eq!(raster.data, vec![1.0]);
    }

    #[test]
    fn bad_options_fail_before_work() {
        let options = RasterWriterOptions::new("z.tif", Dimension::Z, 0.0);
        assert!(matches!(rasterize(&[point(0.0, 0.0, 0.0, 0)], &options, None), Err(NdviError::InvalidResolution(_))));

        let mut options = RasterWriterOptions::new("z.tif", Dimension::Z, 1.0);
        options.gdaldriver = "PNG".to_string();
        assert!(matches!(options.validate(), Err(NdviError::UnsupportedDriver(_))));

        let options = RasterWriterOptions::new("z.tif", Dimension::Z, 1.0);
        assert!(matches!(rasterize(&[], &options, None), Err(NdviError::NoPointsError(_))));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: RasterWriterOptions = serde_json::from_str(
            r#"{"filename": "red.tif", "dimension": "Red", "resolution": 2, "nodata": -999, "data_type": "float"}"#,
        ).unwrap();
        assert_eq!(options.dimension, Dimension::Red);
        assert_eq!(options.output_type, Reduction::Mean);
        assert_eq!(options.data_type, DataType::Float32);
        assert_eq!(options.gdaldriver, "GTiff");
        assert_eq!(options.resolution, 2.0);
    }
}
