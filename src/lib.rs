//! Pseudo-NDVI rasters from a lidar point cloud and an RGB orthoimage.
//!
//! Lidar intensity stands in for near infrared, the orthoimage supplies red. Both are binned into
//! grids of per-cell means by small PDAL-style pipelines, then combined with
//! [`ndvi::normalized_difference`]. See [`workflow::NdviWorkflow`] for the whole thing in one call.

pub mod errors;
pub mod utils;
pub mod bounds;
pub mod spatial_reference;
pub mod point_cloud_info;
pub mod dimension;
pub mod range_filter;
pub mod geo_transform;
pub mod colorization;
pub mod raster;
pub mod geotiff;
pub mod rasterizer;
pub mod pipeline;
pub mod ndvi;
pub mod workflow;
