use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use log::info;
use serde::{Deserialize, Serialize};

use crate::dimension::Dimension;
use crate::errors::NdviError;
use crate::ndvi::compute_ndvi_file;
use crate::pipeline::{Pipeline, Stage};
use crate::point_cloud_info::PointCloudInfo;
use crate::raster::DataType;
use crate::rasterizer::{RasterWriterOptions, Reduction};

pub const NIR_FILENAME: &str = "nir.tif";
pub const RED_FILENAME: &str = "red.tif";
pub const NDVI_FILENAME: &str = "ndvi.tif";

fn default_nodata() -> f64 {
    -999f64
}

fn default_limits() -> String {
    "ReturnNumber[1:1],Classification[2:2]".to_string()
}

fn default_red_band() -> usize {
    1
}

fn default_data_type() -> DataType {
    DataType::Float32
}

/// Everything needed to go from a point cloud and an orthoimage to a pseudo-NDVI raster.
///
/// Loadable from JSON, every field but the three paths has a default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NdviWorkflow {
    /// LAS/LAZ file or glob pattern
    pub point_cloud: String,
    pub orthoimage: PathBuf,
    pub output_dir: PathBuf,
    /// cell size, the estimated point spacing when left out
    #[serde(default)]
    pub resolution: Option<f64>,
    #[serde(default = "default_nodata")]
    pub nodata: f64,
    #[serde(default = "default_limits")]
    pub limits: String,
    /// 1-based band of the orthoimage holding red
    #[serde(default = "default_red_band")]
    pub red_band: usize,
    #[serde(default = "default_data_type")]
    pub data_type: DataType,
}

/// where `NdviWorkflow::run` put its rasters
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkflowOutputs {
    pub nir: PathBuf,
    pub red: PathBuf,
    pub ndvi: PathBuf,
    pub resolution: f64,
}

impl NdviWorkflow {
    pub fn new<S: Into<String>, P: Into<PathBuf>, Q: Into<PathBuf>>(point_cloud: S, orthoimage: P, output_dir: Q) -> NdviWorkflow {
        NdviWorkflow {
            point_cloud: point_cloud.into(),
            orthoimage: orthoimage.into(),
            output_dir: output_dir.into(),
            resolution: None,
            nodata: default_nodata(),
            limits: default_limits(),
            red_band: default_red_band(),
            data_type: default_data_type(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<NdviWorkflow, NdviError> {
        let mut file = File::open(path)?;
        let mut buf = vec![];
        file.read_to_end(&mut buf)?;
        serde_json::from_slice::<NdviWorkflow>(&buf[..]).map_err(NdviError::SerdeError)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), NdviError> {
        let mut f = File::create(path)?;
        let buf = serde_json::to_vec_pretty(self)?;
        f.write_all(&buf[..])?;
        Ok(())
    }

    fn writer(&self, filename: &str, dimension: Dimension, resolution: f64) -> Stage {
        let mut options = RasterWriterOptions::new(self.output_dir.join(filename), dimension, resolution);
        options.output_type = Reduction::Mean;
        options.nodata = self.nodata;
        options.data_type = self.data_type;
        Stage::WriteRaster(options)
    }

    /// The two pipelines the workflow runs: mean intensity, then mean red sampled from the orthoimage.
    /// Both filter the same way, so both rasters come out on the same grid.
    pub fn pipelines(&self, resolution: f64) -> (Pipeline, Pipeline) {
        let nir = Pipeline::new(vec![
            Stage::read_las(self.point_cloud.clone()),
            Stage::range(self.limits.clone()),
            self.writer(NIR_FILENAME, Dimension::Intensity, resolution),
        ]);
        let red = Pipeline::new(vec![
            Stage::read_las(self.point_cloud.clone()),
            Stage::range(self.limits.clone()),
            Stage::colorization(self.orthoimage.clone(), format!("Red:{}:1.0", self.red_band)),
            self.writer(RED_FILENAME, Dimension::Red, resolution),
        ]);
        (nir, red)
    }

    /// Inspects the point cloud, runs both pipelines and computes the NDVI raster.
    /// Stages run one after another and only talk through the files in `output_dir`.
    pub fn run(&self) -> Result<WorkflowOutputs, NdviError> {
        let now = SystemTime::now();
        fs::create_dir_all(&self.output_dir)?;

        let info = PointCloudInfo::from_glob(&self.point_cloud)?;
        let resolution = match self.resolution.or_else(|| info.suggested_resolution()) {
            Some(resolution) if resolution.is_finite() && resolution > 0f64 => resolution,
            Some(bad) => return Err(NdviError::InvalidResolution(bad)),
            None => return Err(NdviError::MissingResolution(self.output_dir.join(NIR_FILENAME))),
        };
        info!("using a cell size of {resolution}");

        let (nir_pipeline, red_pipeline) = self.pipelines(resolution);

        info!("rasterizing intensity");
        nir_pipeline.execute()?;
        info!("rasterizing red");
        let red_summary = red_pipeline.execute()?;
        info!("{} of {} points colorized", red_summary.points_colorized, red_summary.points_kept);

        let outputs = WorkflowOutputs {
            nir: self.output_dir.join(NIR_FILENAME),
            red: self.output_dir.join(RED_FILENAME),
            ndvi: self.output_dir.join(NDVI_FILENAME),
            resolution,
        };
        compute_ndvi_file(&outputs.nir, &outputs.red, &outputs.ndvi, self.data_type)?;

        info!("workflow took {:?}", now.elapsed());
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_gets_defaults() {
        let workflow: NdviWorkflow = serde_json::from_str(
            r#"{"point_cloud": "in/*.laz", "orthoimage": "in/ortho.tif", "output_dir": "out"}"#,
        ).unwrap();
        assert_eq!(workflow, NdviWorkflow::new("in/*.laz", "in/ortho.tif", "out"));
        assert_eq!(workflow.nodata, -999.0);
        assert_eq!(workflow.data_type, DataType::Float32);
    }

    #[test]
    fn generated_pipelines_share_filters_and_grid_options() {
        let mut workflow = NdviWorkflow::new("in.las", "ortho.png", "out");
        workflow.red_band = 3;
        let (nir, red) = workflow.pipelines(0.5);

        assert_eq!(nir.pipeline[1], red.pipeline[1]);
        assert_eq!(red.pipeline[2], Stage::colorization("ortho.png", "Red:3:1.0"));

        let nir_writer = nir.writers().next().unwrap();
        let red_writer = red.writers().next().unwrap();
        assert_eq!(nir_writer.dimension, Dimension::Intensity);
        assert_eq!(red_writer.dimension, Dimension::Red);
        assert_eq!(nir_writer.resolution, red_writer.resolution);
        assert_eq!(nir_writer.nodata, -999.0);
        assert_eq!(red_writer.filename, Path::new("out").join(RED_FILENAME));
    }
}
