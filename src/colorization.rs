use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use geo::Coord;
use image::DynamicImage;
use las::Point;
use log::{debug, info};
use tiff::decoder::Decoder;

use crate::dimension::Dimension;
use crate::errors::NdviError;
use crate::geo_transform::GeoTransform;
use crate::geotiff::read_georeference;

pub const DEFAULT_COLORIZATION_DIMENSIONS: &str = "Red:1:1.0, Green:2:1.0, Blue:3:1.0";

/// One `Dimension:band:scale` entry of a colorization `dimensions` string. `band` is 1-based.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandMapping {
    pub dimension: Dimension,
    pub band: usize,
    pub scale: f64,
}

/// Parses a comma separated list of `Dimension[:band[:scale]]`.
/// A missing band is the entry's position (1-based), a missing scale is 1.
pub fn parse_band_mappings(expression: &str) -> Result<Vec<BandMapping>, NdviError> {
    let invalid = |reason: String| NdviError::InvalidColorization {
        expression: expression.to_string(),
        reason,
    };

    let mut mappings = Vec::new();
    for (position, entry) in expression.split(',').map(str::trim).filter(|e| !e.is_empty()).enumerate() {
        let mut parts = entry.split(':').map(str::trim);
        let dimension = Dimension::from_str(parts.next().unwrap_or_default())?;
        if !dimension.is_writable() {
            return Err(NdviError::ReadOnlyDimension(dimension.name().to_string()));
        }

        let band = match parts.next() {
            Some(text) => text
                .parse::<usize>()
                .map_err(|_| invalid(format!("band `{text}` is not a positive integer")))?,
            None => position + 1,
        };
        if band == 0 {
            return Err(invalid("bands are numbered from 1".to_string()));
        }

        let scale = match parts.next() {
            Some(text) => text
                .parse::<f64>()
                .map_err(|_| invalid(format!("scale `{text}` is not a number")))?,
            None => 1f64,
        };

        if parts.next().is_some() {
            return Err(invalid(format!("too many `:` separated fields in `{entry}`")));
        }

        mappings.push(BandMapping { dimension, band, scale });
    }

    if mappings.is_empty() {
        return Err(invalid("no dimensions given".to_string()));
    }
    Ok(mappings)
}

/// A georeferenced multi band image, held band by band at its native sample values.
pub struct OrthoImage {
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    /// one row-major plane per band
    pub bands: Vec<Vec<f64>>,
}

impl OrthoImage {

    /// Decodes the image with `image` and finds its georeferencing, first in GeoTIFF tags,
    /// then in a world file next to it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<OrthoImage, NdviError> {
        let path = path.as_ref();
        let transform = find_georeference(path)?;
        let decoded = image::open(path)?;
        let (width, height) = (decoded.width() as usize, decoded.height() as usize);
        let bands = split_into_bands(decoded);

        info!("loaded {}x{} image with {} band(s) from {}", width, height, bands.len(), path.display());
        debug!("image transform {}", transform);

        Ok(OrthoImage {
            path: path.to_path_buf(),
            width,
            height,
            transform,
            bands,
        })
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// nearest pixel value of a 1-based band at a world coordinate. `None` off the image.
    pub fn sample(&self, band: usize, coord: Coord) -> Option<f64> {
        let plane = self.bands.get(band.checked_sub(1)?)?;
        let (col, row) = self.transform.pixel_containing(coord, self.width, self.height)?;
        plane.get(row * self.width + col).copied()
    }
}

fn find_georeference(path: &Path) -> Result<GeoTransform, NdviError> {
    let is_tiff = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"));

    if is_tiff {
        let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
        if let Some(transform) = read_georeference(&mut decoder)?.transform {
            return Ok(transform);
        }
    }

    match GeoTransform::find_world_file(path) {
        Some(world_file) => GeoTransform::from_world_file(world_file),
        None => Err(NdviError::MissingGeoreference(path.to_path_buf())),
    }
}

fn split_into_bands(decoded: DynamicImage) -> Vec<Vec<f64>> {
    match decoded {
        DynamicImage::ImageLuma8(buf) => deinterleave(buf.as_raw(), 1),
        DynamicImage::ImageLumaA8(buf) => deinterleave(buf.as_raw(), 2),
        DynamicImage::ImageRgb8(buf) => deinterleave(buf.as_raw(), 3),
        DynamicImage::ImageRgba8(buf) => deinterleave(buf.as_raw(), 4),
        DynamicImage::ImageLuma16(buf) => deinterleave(buf.as_raw(), 1),
        DynamicImage::ImageLumaA16(buf) => deinterleave(buf.as_raw(), 2),
        DynamicImage::ImageRgb16(buf) => deinterleave(buf.as_raw(), 3),
        DynamicImage::ImageRgba16(buf) => deinterleave(buf.as_raw(), 4),
        DynamicImage::ImageRgba32F(buf) => deinterleave(buf.as_raw(), 4),
        other => deinterleave(other.into_rgb32f().as_raw(), 3),
    }
}

fn deinterleave<T: Copy + Into<f64>>(samples: &[T], channels: usize) -> Vec<Vec<f64>> {
    (0..channels)
        .map(|band| {
            samples
                .iter()
                .skip(band)
                .step_by(channels)
                .map(|sample| (*sample).into())
                .collect()
        })
        .collect()
}

/// `filters.colorization`: writes band samples into point dimensions.
pub struct Colorizer {
    pub image: OrthoImage,
    pub mappings: Vec<BandMapping>,
}

impl Colorizer {

    /// fails early if a mapping names a band the image doesn't have
    pub fn new(image: OrthoImage, mappings: Vec<BandMapping>) -> Result<Colorizer, NdviError> {
        if let Some(bad) = mappings.iter().find(|m| m.band > image.band_count()) {
            return Err(NdviError::BandOutOfRange {
                band: bad.band,
                band_count: image.band_count(),
            });
        }
        Ok(Colorizer { image, mappings })
    }

    pub fn from_options<P: AsRef<Path>>(raster: P, dimensions: &str) -> Result<Colorizer, NdviError> {
        Colorizer::new(OrthoImage::open(raster)?, parse_band_mappings(dimensions)?)
    }

    /// Returns false, leaving the point untouched, when it falls outside the image.
    pub fn colorize(&self, point: &mut Point) -> Result<bool, NdviError> {
        let coord = Coord { x: point.x, y: point.y };
        if self.image.transform.pixel_containing(coord, self.image.width, self.image.height).is_none() {
            return Ok(false);
        }
        for mapping in &self.mappings {
            if let Some(value) = self.image.sample(mapping.band, coord) {
                mapping.dimension.set(point, value * mapping.scale)?;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    /// 4x2 image with pixel (x, y) = (10x + y, 100 + x, 200 + y), 1 unit pixels, top-left at (0, 2)
    fn write_test_image(dir: &Path) -> PathBuf {
        let img = RgbImage::from_fn(4, 2, |x, y| Rgb([(10 * x + y) as u8, (100 + x) as u8, (200 + y) as u8]));
        let path = dir.join("ortho.png");
        img.save(&path).unwrap();
        std::fs::write(dir.join("ortho.pgw"), "1\n0\n0\n-1\n0.5\n1.5\n").unwrap();
        path
    }

    #[test]
    fn default_dimensions_parse() {
        let m = parse_band_mappings(DEFAULT_COLORIZATION_DIMENSIONS).unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m[0], BandMapping { dimension: Dimension::Red, band: 1, scale: 1.0 });
        assert_eq!(m[2].band, 3);
    }

    #[test]
    fn band_and_scale_are_optional() {
        let m = parse_band_mappings("Red, Infrared:1:256").unwrap();
        assert_eq!(m[0].band, 1);
        assert_eq!(m[1].band, 1);
        assert_eq!(m[1].scale, 256.0);
    }

    #[test]
    fn bad_mappings_are_rejected() {
        assert!(matches!(parse_band_mappings("Red:0"), Err(NdviError::InvalidColorization { .. })));
        assert!(matches!(parse_band_mappings("Red:x"), Err(NdviError::InvalidColorization { .. })));
        assert!(matches!(parse_band_mappings("Red:1:1:1"), Err(NdviError::InvalidColorization { .. })));
        assert!(matches!(parse_band_mappings("Z:1"), Err(NdviError::ReadOnlyDimension(_))));
        assert!(matches!(parse_band_mappings(" "), Err(NdviError::InvalidColorization { .. })));
    }

    #[test]
    fn image_is_split_into_native_bands() {
        let dir = TempDir::new().unwrap();
        let image = OrthoImage::open(write_test_image(dir.path())).unwrap();
        assert_eq!(image.band_count(), 3);
        assert_eq!(image.transform, GeoTransform::north_up(0.0, 2.0, 1.0));
        // pixel (2, 1) covers x in [2, 3), y in [0, 1)
        assert_eq!(image.sample(1, Coord { x: 2.5, y: 0.5 }), Some(21.0));
        assert_eq!(image.sample(2, Coord { x: 2.5, y: 0.5 }), Some(102.0));
        assert_eq!(image.sample(3, Coord { x: 2.5, y: 0.5 }), Some(201.0));
        assert_eq!(image.sample(4, Coord { x: 2.5, y: 0.5 }), None);
        assert_eq!(image.sample(1, Coord { x: 4.5, y: 0.5 }), None);
    }

    #[test]
    fn colorizer_sets_dimensions_inside_the_image_only() {
        let dir = TempDir::new().unwrap();
        let colorizer = Colorizer::from_options(write_test_image(dir.path()), "Red:1:2.0, Blue:3").unwrap();

        let mut inside = Point { x: 1.2, y: 1.7, ..Default::default() };
        assert!(colorizer.colorize(&mut inside).unwrap());
        let color = inside.color.unwrap();
        assert_eq!(color.red, 20);
        assert_eq!(color.green, 0);
        assert_eq!(color.blue, 200);

        let mut outside = Point { x: -3.0, y: 1.0, ..Default::default() };
        assert!(!colorizer.colorize(&mut outside).unwrap());
        assert_eq!(outside.color, None);
    }

    #[test]
    fn missing_band_fails_at_construction() {
        let dir = TempDir::new().unwrap();
        let result = Colorizer::from_options(write_test_image(dir.path()), "Red:4");
        assert!(matches!(result, Err(NdviError::BandOutOfRange { band: 4, band_count: 3 })));
    }

    #[test]
    fn image_without_georeferencing_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.png");
        RgbImage::new(2, 2).save(&path).unwrap();
        assert!(matches!(OrthoImage::open(&path), Err(NdviError::MissingGeoreference(_))));
    }
}
