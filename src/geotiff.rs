use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use std::time::SystemTime;
use log::{debug, info, warn};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::ColorType;

use crate::errors::NdviError;
use crate::geo_transform::GeoTransform;
use crate::raster::{check_grid_size, DataType, Raster};
use crate::spatial_reference::SpatialReference;

const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const RASTER_PIXEL_IS_POINT: u16 = 2;

/// Georeferencing found in the GeoTIFF tags of a file
#[derive(Clone, Debug, PartialEq)]
pub struct Georeference {
    pub transform: Option<GeoTransform>,
    pub spatial_reference: Option<SpatialReference>,
    pub nodata: Option<f64>,
}

/// Writes a single band GeoTIFF holding `raster`, stored as the raster's `data_type`.
///
/// The file is flushed and closed before this returns, so the next stage can open it straight away.
pub fn write_geotiff<P: AsRef<Path>>(raster: &Raster, path: P) -> Result<(), NdviError> {
    let path = path.as_ref();
    let now = SystemTime::now();

    raster.check_cell_count()?;
    let (width, height) = check_grid_size(raster.width, raster.height)?;

    {
        let file = File::create(path)?;
        let mut encoder = TiffEncoder::new(BufWriter::new(file))?;

        match raster.data_type {
            DataType::Float32 => {
                let mut image = encoder.new_image::<colortype::Gray32Float>(width, height)?;
                write_geo_tags(image.encoder(), raster)?;
                let samples: Vec<f32> = raster.data.iter().map(|v| *v as f32).collect();
                image.write_data(&samples)?;
            }
            DataType::Float64 => {
                let mut image = encoder.new_image::<colortype::Gray64Float>(width, height)?;
                write_geo_tags(image.encoder(), raster)?;
                image.write_data(&raster.data)?;
            }
        }
    }

    info!("wrote {}x{} {} raster to {} in {:?}",
        raster.width, raster.height, raster.data_type, path.display(), now.elapsed());
    Ok(())
}

fn write_geo_tags<W: Write + Seek, K: tiff::encoder::TiffKind>(
    directory: &mut tiff::encoder::DirectoryEncoder<'_, W, K>,
    raster: &Raster,
) -> Result<(), NdviError> {
    let t = &raster.transform;
    let pixel_scale = [t.pixel_width, -t.pixel_height, 0f64];
    let tie_point = [0f64, 0f64, 0f64, t.origin_x, t.origin_y, 0f64];
    directory.write_tag(Tag::ModelPixelScaleTag, &pixel_scale[..])?;
    directory.write_tag(Tag::ModelTiepointTag, &tie_point[..])?;

    let keys = match &raster.spatial_reference {
        Some(srs) => {
            let keys = srs.to_geotiff_keys();
            if keys.is_none() {
                warn!("spatial reference WKT is too long for a GeoTIFF key, the raster is written without it");
            }
            keys
        }
        None => None,
    };
    if let Some(srs) = &keys {
        if !srs.geo_key_directory.is_empty() {
            directory.write_tag(Tag::GeoKeyDirectoryTag, &srs.geo_key_directory[..])?;
        }
        if !srs.geo_double_params.is_empty() {
            directory.write_tag(Tag::GeoDoubleParamsTag, &srs.geo_double_params[..])?;
        }
        if !srs.geo_ascii_params.is_empty() {
            directory.write_tag(Tag::GeoAsciiParamsTag, srs.geo_ascii_params.as_str())?;
        }
    }

    if let Some(nodata) = raster.nodata {
        directory.write_tag(Tag::GdalNodata, format_nodata(nodata).as_str())?;
    }
    Ok(())
}

/// GDAL reads the no-data value back from text
pub fn format_nodata(nodata: f64) -> String {
    if nodata.is_nan() {
        "nan".to_string()
    } else {
        format!("{nodata}")
    }
}

/// Reads a single band GeoTIFF. Integer and float samples are all widened to f64.
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<Raster, NdviError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?;

    let (width, height) = decoder.dimensions()?;
    match decoder.colortype()? {
        ColorType::Gray(_) => {}
        other => {
            return Err(NdviError::UnsupportedRaster {
                path: path.to_path_buf(),
                reason: format!("expected a single band, found {other:?}"),
            })
        }
    }

    let georeference = read_georeference(&mut decoder)?;
    let transform = georeference.transform.ok_or_else(|| NdviError::MissingGeoreference(path.to_path_buf()))?;

    let (data, data_type) = match decoder.read_image()? {
        DecodingResult::U8(v) => (widen(v), DataType::Float64),
        DecodingResult::U16(v) => (widen(v), DataType::Float64),
        DecodingResult::U32(v) => (widen(v), DataType::Float64),
        DecodingResult::I8(v) => (widen(v), DataType::Float64),
        DecodingResult::I16(v) => (widen(v), DataType::Float64),
        DecodingResult::I32(v) => (widen(v), DataType::Float64),
        DecodingResult::F32(v) => (widen(v), DataType::Float32),
        DecodingResult::F64(v) => (v, DataType::Float64),
        _ => {
            return Err(NdviError::UnsupportedRaster {
                path: path.to_path_buf(),
                reason: "64 bit integer samples are not supported".to_string(),
            })
        }
    };

    debug!("read {}x{} raster from {}, transform {}", width, height, path.display(), transform);

    Ok(Raster {
        data,
        width: width as usize,
        height: height as usize,
        transform,
        spatial_reference: georeference.spatial_reference,
        nodata: georeference.nodata,
        data_type,
    })
}

fn widen<T: Into<f64>>(samples: Vec<T>) -> Vec<f64> {
    samples.into_iter().map(Into::into).collect()
}

/// Pulls the transform, key directory and GDAL no-data value out of the current image's tags.
/// Missing tags are `None`, never an error.
pub fn read_georeference<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Georeference, NdviError> {
    let pixel_scale = match decoder.find_tag(Tag::ModelPixelScaleTag)? {
        Some(value) => Some(value.into_f64_vec()?),
        None => None,
    };
    let tie_point = match decoder.find_tag(Tag::ModelTiepointTag)? {
        Some(value) => Some(value.into_f64_vec()?),
        None => None,
    };
    let model_transformation = match decoder.find_tag(Tag::ModelTransformationTag)? {
        Some(value) => Some(value.into_f64_vec()?),
        None => None,
    };

    let spatial_reference = match decoder.find_tag(Tag::GeoKeyDirectoryTag)? {
        Some(value) => {
            let geo_double_params = match decoder.find_tag(Tag::GeoDoubleParamsTag)? {
                Some(doubles) => doubles.into_f64_vec()?,
                None => Vec::new(),
            };
            let geo_ascii_params = match decoder.find_tag(Tag::GeoAsciiParamsTag)? {
                Some(text) => text.into_string()?.trim_end_matches('\0').to_string(),
                None => String::new(),
            };
            Some(SpatialReference::from_geotiff_keys(SpatialReference {
                geo_key_directory: value.into_u16_vec()?,
                geo_double_params,
                geo_ascii_params,
                wkt: None,
            }))
        }
        None => None,
    };

    let nodata = match decoder.find_tag(Tag::GdalNodata)? {
        Some(value) => value.into_string()?.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse::<f64>().ok(),
        None => None,
    };

    let pixel_is_point = spatial_reference.as_ref().map_or(false, |srs| {
        srs.inline_keys().contains(&(GT_RASTER_TYPE_GEO_KEY, RASTER_PIXEL_IS_POINT))
    });

    let transform = transform_from_tags(pixel_scale, tie_point, model_transformation)
        .map(|t| if pixel_is_point {
            // tie point names a pixel center, move it to the corner
            GeoTransform::new(
                t.origin_x - t.pixel_width / 2f64,
                t.pixel_width,
                t.origin_y - t.pixel_height / 2f64,
                t.pixel_height,
            )
        } else {
            t
        });

    Ok(Georeference {
        transform,
        spatial_reference,
        nodata,
    })
}

fn transform_from_tags(
    pixel_scale: Option<Vec<f64>>,
    tie_point: Option<Vec<f64>>,
    model_transformation: Option<Vec<f64>>,
) -> Option<GeoTransform> {
    if let (Some(scale), Some(tie)) = (&pixel_scale, &tie_point) {
        if scale.len() >= 2 && tie.len() >= 6 {
            let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            return Some(GeoTransform::new(
                x - i * scale[0],
                scale[0],
                y + j * scale[1],
                -scale[1],
            ));
        }
    }
    match model_transformation {
        // row major 4x4, only the unrotated case is understood
        Some(m) if m.len() >= 8 && m[1] == 0f64 && m[4] == 0f64 => {
            Some(GeoTransform::new(m[3], m[0], m[7], m[5]))
        }
        _ => None,
    }
}
