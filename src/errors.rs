
use std::path::PathBuf;
use thiserror::Error;
use crate::geo_transform::GeoTransform;

#[derive(Error, Debug)]
pub enum NdviError {
    #[error("IO error:\n\t{0}")]
    IoError(#[from] std::io::Error),
    #[error("Error in glob library:\n\t{0}")]
    GlobError(#[from] glob::GlobError),
    #[error("No files matching pattern {0} could be found or none of the found files could be read.\
        Files that could not be read are logged as warnings.")]
    NoValidGlobReturnsError(String),
    #[error("Error deciphering glob pattern:\n\t{0}")]
    PatternError(#[from] glob::PatternError),
    #[error("Error in serde-json:\n\t{0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Error in LAS parsing Library:\n\t{0}")]
    LasError(#[from] las::Error),
    #[error("Error saving data as csv:\n\t{0}")]
    CsvError(#[from] csv::Error),
    #[error("Error reading or saving image:\n\t{0}")]
    ImageError(#[from] image::ImageError),
    #[error("Error in TIFF library:\n\t{0}")]
    TiffError(#[from] tiff::TiffError),

    #[error("attempted to get the internal 1d index for a coordinate pair that does not exist. \
        Note that because index starts at 0, \
        x and y must be LESS than their corresponding sizes (not equal) \
        call variables: width: {width}, height: {height}, x: {x}, y: {y}")]
    BadIndexError{ width: usize, height: usize, x: usize, y: usize },

    #[error("could not parse range expression `{expression}`: {reason}")]
    InvalidRange{ expression: String, reason: String },

    #[error("could not parse colorization dimensions `{expression}`: {reason}")]
    InvalidColorization{ expression: String, reason: String },

    #[error("unknown point dimension `{0}`")]
    UnknownDimension(String),

    #[error("dimension `{0}` cannot be written to, only Intensity, UserData, PointSourceId, Red, Green and Blue can")]
    ReadOnlyDimension(String),

    #[error("unknown output_type `{0}`. expected one of mean, min, max, count, stdev")]
    UnknownReduction(String),

    #[error("unknown data_type `{0}`. expected float32 (float) or float64 (double)")]
    UnknownDataType(String),

    #[error("unsupported raster driver `{0}`, only GTiff can be written")]
    UnsupportedDriver(String),

    #[error("resolution must be a positive finite number, got {0}")]
    InvalidResolution(f64),

    #[error("writer for {0:?} has no resolution and none could be derived")]
    MissingResolution(PathBuf),

    #[error("image {0:?} has no georeferencing. \
        Provide GeoTIFF tags or a world file (.tfw, .pgw, .jgw, .wld) next to it")]
    MissingGeoreference(PathBuf),

    #[error("band {band} requested but image only has {band_count} band(s)")]
    BandOutOfRange{ band: usize, band_count: usize },

    #[error("no point cloud files given")]
    NoInputFiles,

    #[error("pipeline has no reader stage")]
    NoReaderStage,

    #[error("pipeline has no writer stage")]
    NoWriterStage,

    #[error("no points reached the writer for {0:?}, nothing to rasterize")]
    NoPointsError(PathBuf),

    #[error("unsupported raster layout in {path:?}: {reason}")]
    UnsupportedRaster{ path: PathBuf, reason: String },

    #[error("raster rows must all have the same length. row {row} has {found} cells, expected {expected}")]
    RaggedRowsError{ row: usize, found: usize, expected: usize },

    #[error("grid shapes differ: {left_width}x{left_height} vs {right_width}x{right_height}")]
    GridShapeMismatch{
        left_width: usize,
        left_height: usize,
        right_width: usize,
        right_height: usize,
    },

    #[error("cell counts differ: {left} vs {right}")]
    CellCountMismatch{ left: usize, right: usize },

    #[error("a {width}x{height} grid is too large. \
        Use a coarser resolution or a smaller pinned width/height")]
    GridTooLarge{ width: usize, height: usize },

    #[error("grid transforms differ: {left} vs {right}")]
    GridTransformMismatch{ left: GeoTransform, right: GeoTransform },

    #[error("rasters are in different spatial references")]
    SpatialReferenceMismatch,
}
