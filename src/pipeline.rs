use std::fs::File;
use std::io::{Read as IoRead, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use las::{Point, Read, Reader};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::colorization::{Colorizer, DEFAULT_COLORIZATION_DIMENSIONS};
use crate::errors::NdviError;
use crate::range_filter::RangeFilter;
use crate::rasterizer::{write_raster, RasterWriterOptions};
use crate::spatial_reference::SpatialReference;
use crate::utils;

fn default_colorization_dimensions() -> String {
    DEFAULT_COLORIZATION_DIMENSIONS.to_string()
}

/// One stage of a pipeline, written in JSON the way PDAL writes them (`"type": "filters.range"`, ...)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Stage {
    /// `filename` may be a glob pattern matching several LAS/LAZ files
    #[serde(rename = "readers.las")]
    ReadLas { filename: String },
    #[serde(rename = "filters.range")]
    Range { limits: String },
    #[serde(rename = "filters.colorization")]
    Colorization {
        raster: PathBuf,
        #[serde(default = "default_colorization_dimensions")]
        dimensions: String,
    },
    #[serde(rename = "writers.gdal")]
    WriteRaster(RasterWriterOptions),
}

impl Stage {
    pub fn read_las<S: Into<String>>(filename: S) -> Stage {
        Stage::ReadLas { filename: filename.into() }
    }

    pub fn range<S: Into<String>>(limits: S) -> Stage {
        Stage::Range { limits: limits.into() }
    }

    pub fn colorization<P: Into<PathBuf>, S: Into<String>>(raster: P, dimensions: S) -> Stage {
        Stage::Colorization { raster: raster.into(), dimensions: dimensions.into() }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Stage::ReadLas { .. } => "readers.las",
            Stage::Range { .. } => "filters.range",
            Stage::Colorization { .. } => "filters.colorization",
            Stage::WriteRaster(_) => "writers.gdal",
        }
    }
}

/// a stage as it may appear in a file: a full object, or just a filename
#[derive(Deserialize)]
#[serde(untagged)]
enum StageSpec {
    Filename(String),
    Stage(Stage),
}

impl StageSpec {
    fn into_stage(self) -> Result<Stage, NdviError> {
        match self {
            StageSpec::Stage(stage) => Ok(stage),
            StageSpec::Filename(name) => {
                let lowered = name.to_ascii_lowercase();
                if lowered.ends_with(".las") || lowered.ends_with(".laz") {
                    Ok(Stage::ReadLas { filename: name })
                } else {
                    // a writers.gdal stage needs a resolution, a bare name can't give one
                    Err(NdviError::MissingResolution(PathBuf::from(name)))
                }
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PipelineDocument {
    Wrapped { pipeline: Vec<StageSpec> },
    Bare(Vec<StageSpec>),
}

/// What happened during `Pipeline::execute`
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PipelineSummary {
    pub points_read: usize,
    pub points_kept: usize,
    pub points_colorized: usize,
    pub rasters: Vec<PathBuf>,
}

/// filters, ready to run
enum PreparedFilter {
    Range(RangeFilter),
    Colorize(Colorizer),
}

/// A linear list of stages. Readers feed every point through the filters in the order they are listed,
/// the points that survive are handed to every writer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub pipeline: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Pipeline {
        Pipeline { pipeline: stages }
    }

    /// accepts `{"pipeline": [...]}` or a bare array, stages may be objects or plain `.las`/`.laz` filenames
    pub fn from_json_str(json: &str) -> Result<Pipeline, NdviError> {
        let specs = match serde_json::from_str::<PipelineDocument>(json)? {
            PipelineDocument::Wrapped { pipeline } => pipeline,
            PipelineDocument::Bare(stages) => stages,
        };
        let stages = specs
            .into_iter()
            .map(StageSpec::into_stage)
            .collect::<Result<Vec<Stage>, NdviError>>()?;
        Ok(Pipeline::new(stages))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Pipeline, NdviError> {
        let mut file = File::open(path)?;
        let mut text = String::new();
        file.read_to_string(&mut text)?;
        Pipeline::from_json_str(&text)
    }

    /// writes the `{"pipeline": [...]}` form, pretty printed
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), NdviError> {
        let mut f = File::create(path)?;
        let buf = serde_json::to_vec_pretty(self)?;
        f.write_all(&buf[..])?;
        Ok(())
    }

    pub fn writers(&self) -> impl Iterator<Item = &RasterWriterOptions> {
        self.pipeline.iter().filter_map(|stage| match stage {
            Stage::WriteRaster(options) => Some(options),
            _ => None,
        })
    }

    /// Parses every option, opens every colorization image and validates every writer,
    /// so a typo fails before any point is read.
    fn prepare(&self) -> Result<Vec<PreparedFilter>, NdviError> {
        if !self.pipeline.iter().any(|stage| matches!(stage, Stage::ReadLas { .. })) {
            return Err(NdviError::NoReaderStage);
        }
        if self.writers().next().is_none() {
            return Err(NdviError::NoWriterStage);
        }
        for writer in self.writers() {
            writer.validate()?;
        }

        let mut filters = Vec::new();
        for stage in &self.pipeline {
            match stage {
                Stage::Range { limits } => {
                    let filter: RangeFilter = limits.parse()?;
                    debug!("range filter with {} range(s) over {} dimension(s)", filter.range_count(), filter.groups.len());
                    filters.push(PreparedFilter::Range(filter));
                }
                Stage::Colorization { raster, dimensions } => {
                    filters.push(PreparedFilter::Colorize(Colorizer::from_options(raster, dimensions)?));
                }
                _ => {}
            }
        }
        Ok(filters)
    }

    /// Runs the pipeline start to finish. Every raster is on disk and closed when this returns.
    pub fn execute(&self) -> Result<PipelineSummary, NdviError> {
        let global_now = SystemTime::now();
        let filters = self.prepare()?;

        let mut summary = PipelineSummary::default();
        let mut points: Vec<Point> = Vec::new();
        let mut spatial_reference: Option<SpatialReference> = None;
        let mut first_header_seen = false;

        for stage in &self.pipeline {
            if let Stage::ReadLas { filename } = stage {
                let paths = utils::get_paths(filename)?;
                let num_files = paths.len();

                for (file_index, path) in paths.iter().enumerate() {
                    let now = SystemTime::now();
                    let mut reader = Reader::from_path(path)?;
                    let srs = SpatialReference::from_las_header(reader.header());
                    if !first_header_seen {
                        spatial_reference = srs;
                        first_header_seen = true;
                    } else if srs != spatial_reference {
                        warn!("{} has a different spatial reference than the first file, keeping the first",
                            path.display());
                    }

                    let num_points = reader.header().number_of_points();
                    let display_path = path.display().to_string();
                    info!("Number of points: {num_points} in {display_path}");

                    let mut counter: usize = 0;
                    for point_result in reader.points() {
                        match point_result {
                            Ok(point) => {
                                summary.points_read += 1;
                                counter += 1;
                                if let Some(point) = apply_filters(&filters, point, &mut summary)? {
                                    points.push(point);
                                }

                                if counter % 4194304 == 0 {
                                    info!("{:.2}% done with {display_path}. (file {} / {num_files})",
                                        100f64 * counter as f64 / num_points as f64, file_index + 1);
                                }
                            }
                            Err(e) => {
                                warn!("reader failed to read a point in file {:?} with error:\n\t{:?}\nSkipping point.", path.display(), e)
                            }
                        }
                    }

                    info!("file {} / {num_files} took {:?}", file_index + 1, now.elapsed());
                }
            }
        }

        summary.points_kept = points.len();
        info!("{} of {} points passed the filters", summary.points_kept, summary.points_read);

        for options in self.writers() {
            write_raster(&points, options, spatial_reference.as_ref())?;
            summary.rasters.push(options.filename.clone());
        }

        info!("pipeline took {:?}", global_now.elapsed());
        Ok(summary)
    }
}

/// runs one point through the filters in order, `None` when a range filter drops it
fn apply_filters(filters: &[PreparedFilter], mut point: Point, summary: &mut PipelineSummary)
    -> Result<Option<Point>, NdviError>
{
    for filter in filters {
        match filter {
            PreparedFilter::Range(range) => {
                if !range.passes(&point) {
                    return Ok(None);
                }
            }
            PreparedFilter::Colorize(colorizer) => {
                if colorizer.colorize(&mut point)? {
                    summary.points_colorized += 1;
                }
            }
        }
    }
    Ok(Some(point))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::Dimension;
    use crate::raster::DataType;
    use crate::rasterizer::Reduction;

    const TUTORIAL_PIPELINE: &str = r#"
    {
        "pipeline": [
            "input/points.laz",
            {
                "type": "filters.range",
                "limits": "ReturnNumber[1:1],Classification[2:2]"
            },
            {
                "type": "filters.colorization",
                "raster": "input/ortho.tif",
                "dimensions": "Red:1:1.0"
            },
            {
                "type": "writers.gdal",
                "filename": "out/red.tif",
                "dimension": "Red",
                "output_type": "mean",
                "resolution": 1.0,
                "nodata": -999,
                "data_type": "float32"
            }
        ]
    }"#;

    #[test]
    fn wrapped_pipeline_with_bare_reader_parses() {
        let pipeline = Pipeline::from_json_str(TUTORIAL_PIPELINE).unwrap();
        assert_eq!(pipeline.pipeline.len(), 4);
        assert_eq!(pipeline.pipeline[0], Stage::read_las("input/points.laz"));
        assert_eq!(pipeline.pipeline[1], Stage::range("ReturnNumber[1:1],Classification[2:2]"));
        assert_eq!(pipeline.pipeline[2], Stage::colorization("input/ortho.tif", "Red:1:1.0"));

        let writer = pipeline.writers().next().unwrap();
        assert_eq!(writer.dimension, Dimension::Red);
        assert_eq!(writer.output_type, Reduction::Mean);
        assert_eq!(writer.nodata, -999.0);
        assert_eq!(writer.data_type, DataType::Float32);
    }

    #[test]
    fn bare_array_and_default_dimensions() {
        let pipeline = Pipeline::from_json_str(
            r#"[{"type": "readers.las", "filename": "a.las"}, {"type": "filters.colorization", "raster": "o.png"}]"#,
        ).unwrap();
        assert_eq!(pipeline.pipeline[1], Stage::colorization("o.png", DEFAULT_COLORIZATION_DIMENSIONS));
        assert_eq!(pipeline.pipeline[1].type_name(), "filters.colorization");
    }

    #[test]
    fn bare_writer_filename_needs_a_resolution() {
        let result = Pipeline::from_json_str(r#"["a.las", "out.tif"]"#);
        assert!(matches!(result, Err(NdviError::MissingResolution(_))));
    }

    #[test]
    fn unknown_stage_type_is_a_json_error() {
        let result = Pipeline::from_json_str(r#"[{"type": "filters.smrf"}]"#);
        assert!(matches!(result, Err(NdviError::SerdeError(_))));
    }

    #[test]
    fn saved_pipeline_loads_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pipeline.json");
        let pipeline = Pipeline::from_json_str(TUTORIAL_PIPELINE).unwrap();
        pipeline.save(&path).unwrap();
        assert_eq!(Pipeline::load(&path).unwrap(), pipeline);
    }

    #[test]
    fn pipelines_missing_ends_are_rejected_before_reading() {
        let no_reader = Pipeline::new(vec![Stage::WriteRaster(RasterWriterOptions::new("a.tif", Dimension::Z, 1.0))]);
        assert!(matches!(no_reader.execute(), Err(NdviError::NoReaderStage)));

        let no_writer = Pipeline::new(vec![Stage::read_las("a.las")]);
        assert!(matches!(no_writer.execute(), Err(NdviError::NoWriterStage)));

        let bad_limits = Pipeline::new(vec![
            Stage::read_las("missing.las"),
            Stage::range("ReturnNumber[1"),
            Stage::WriteRaster(RasterWriterOptions::new("a.tif", Dimension::Z, 1.0)),
        ]);
        assert!(matches!(bad_limits.execute(), Err(NdviError::InvalidRange { .. })));
    }
}
