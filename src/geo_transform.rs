use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use geo::Coord;
use serde::{Deserialize, Serialize};
use crate::errors::NdviError;

/// A north-up affine transform between pixel space and world space.
///
/// `origin_x`/`origin_y` is the outer corner of the top-left pixel, `pixel_height` is negative
/// for the usual north-up layout (row 0 is the northern edge). Rotation terms are not supported.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub origin_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, pixel_width: f64, origin_y: f64, pixel_height: f64) -> GeoTransform {
        GeoTransform {
            origin_x,
            pixel_width,
            origin_y,
            pixel_height,
        }
    }

    /// square cells of `cell_size` hanging down and right from the top-left corner
    pub fn north_up(origin_x: f64, origin_y: f64, cell_size: f64) -> GeoTransform {
        GeoTransform::new(origin_x, cell_size, origin_y, -cell_size)
    }

    /// world coordinate of the top-left corner of pixel (col, row)
    pub fn pixel_to_world(&self, col: f64, row: f64) -> Coord {
        Coord {
            x: self.origin_x + col * self.pixel_width,
            y: self.origin_y + row * self.pixel_height,
        }
    }

    /// world coordinate of the center of pixel (col, row)
    pub fn pixel_center(&self, col: usize, row: usize) -> Coord {
        self.pixel_to_world(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// fractional pixel position of a world coordinate. Can be negative or past the edge.
    pub fn world_to_pixel(&self, coord: Coord) -> (f64, f64) {
        (
            (coord.x - self.origin_x) / self.pixel_width,
            (coord.y - self.origin_y) / self.pixel_height,
        )
    }

    /// the (col, row) of the pixel containing `coord`, or `None` when it falls outside a `width` x `height` grid
    pub fn pixel_containing(&self, coord: Coord, width: usize, height: usize) -> Option<(usize, usize)> {
        let (col, row) = self.world_to_pixel(coord);
        let (col, row) = (col.floor(), row.floor());
        if col >= 0f64 && row >= 0f64 && col < width as f64 && row < height as f64 {
            Some((col as usize, row as usize))
        } else {
            None
        }
    }

    /// Parses the six lines of an ESRI world file. The file stores the center of the top-left
    /// pixel, which is shifted back to the corner here. Rotated world files are rejected.
    pub fn from_world_file<P: AsRef<Path>>(path: P) -> Result<GeoTransform, NdviError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let values: Vec<f64> = text
            .split_whitespace()
            .map(|token| token.parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| unsupported(path, format!("world file value is not a number: {e}")))?;

        if values.len() != 6 {
            return Err(unsupported(path, format!("world file has {} values, expected 6", values.len())));
        }
        if values[1] != 0f64 || values[2] != 0f64 {
            return Err(unsupported(path, "rotated world files are not supported".to_string()));
        }

        let (pixel_width, pixel_height) = (values[0], values[3]);
        Ok(GeoTransform::new(
            values[4] - pixel_width / 2f64,
            pixel_width,
            values[5] - pixel_height / 2f64,
            pixel_height,
        ))
    }

    /// looks for a world file sitting next to `image_path`, trying the common extension spellings
    pub fn find_world_file<P: AsRef<Path>>(image_path: P) -> Option<PathBuf> {
        let image_path = image_path.as_ref();
        let ext = image_path.extension()?.to_str()?.to_ascii_lowercase();
        let mut candidates: Vec<String> = Vec::new();
        if ext.len() >= 2 {
            let mut chars = ext.chars();
            let first = chars.next()?;
            let last = chars.last()?;
            candidates.push(format!("{first}{last}w"));
        }
        candidates.push(format!("{ext}w"));
        candidates.push("wld".to_string());

        candidates
            .into_iter()
            .map(|candidate| image_path.with_extension(candidate))
            .find(|candidate| candidate.is_file())
    }
}

fn unsupported(path: &Path, reason: String) -> NdviError {
    NdviError::UnsupportedRaster {
        path: path.to_path_buf(),
        reason,
    }
}

impl Display for GeoTransform {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(formatter, "[{}, {}, 0, {}, 0, {}]",
               self.origin_x, self.pixel_width, self.origin_y, self.pixel_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn world_to_pixel_and_back() {
        let t = GeoTransform::north_up(100.0, 200.0, 2.0);
        assert_eq!(t.pixel_containing(Coord { x: 101.0, y: 199.0 }, 10, 10), Some((0, 0)));
        assert_eq!(t.pixel_containing(Coord { x: 105.0, y: 193.0 }, 10, 10), Some((2, 3)));
        assert_eq!(t.pixel_containing(Coord { x: 99.0, y: 199.0 }, 10, 10), None);
        assert_eq!(t.pixel_containing(Coord { x: 121.0, y: 199.0 }, 10, 10), None);
        assert_eq!(t.pixel_center(2, 3), Coord { x: 105.0, y: 193.0 });
    }

    #[test]
    fn world_file_is_shifted_to_the_corner() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("ortho.png");
        std::fs::write(&image, b"").unwrap();
        let mut world = std::fs::File::create(dir.path().join("ortho.pgw")).unwrap();
        writeln!(world, "0.5\n0.0\n0.0\n-0.5\n1000.25\n2000.75").unwrap();
        drop(world);

        let found = GeoTransform::find_world_file(&image).unwrap();
        let t = GeoTransform::from_world_file(found).unwrap();
        assert_eq!(t, GeoTransform::new(1000.0, 0.5, 2001.0, -0.5));
    }

    #[test]
    fn rotated_world_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rotated.wld");
        std::fs::write(&path, "1\n0.1\n0\n-1\n0\n0\n").unwrap();
        assert!(matches!(
            GeoTransform::from_world_file(&path),
            Err(NdviError::UnsupportedRaster { .. })
        ));
    }
}
