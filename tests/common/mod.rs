use std::path::{Path, PathBuf};
use std::sync::Once;
use image::{Rgb, RgbImage};
use las::point::Classification;
use las::{Builder, Point, Write, Writer};
use simple_logger::SimpleLogger;
use lidar_ndvi::spatial_reference::SpatialReference;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

pub const EPSG: u16 = 32615;

static LOGGER: Once = Once::new();

/// `RUST_LOG=debug cargo test` shows what the library logged for a failing test
pub fn init_logger() {
    LOGGER.call_once(|| {
        SimpleLogger::new().env().init().ok();
    });
}

/// red value of orthoimage pixel (col, row)
pub fn red_at(col: u32) -> u8 {
    50 + 10 * col as u8
}

fn ground_point(x: f64, y: f64, intensity: u16) -> Point {
    Point {
        x,
        y,
        z: 100.0,
        intensity,
        return_number: 1,
        number_of_returns: 1,
        classification: Classification::Ground,
        ..Default::default()
    }
}

/// A 4x4 metre scene. Every cell of a 1 m grid with origin (0.5, 3.5) gets two first-return ground
/// points with intensities 150 and 250 (mean 200), plus a second return and a vegetation point that
/// the default limits drop. Cell (3, 3) only has the dropped kind.
pub fn scene_points() -> Vec<Point> {
    let mut points = Vec::new();
    for row in 0..4 {
        for col in 0..4 {
            let x = 0.5 + col as f64;
            let y = 3.5 - row as f64;

            let mut second_return = ground_point(x + 0.1, y, 60000);
            second_return.return_number = 2;
            second_return.number_of_returns = 2;
            points.push(second_return);

            let mut vegetation = ground_point(x + 0.1, y, 40000);
            vegetation.classification = Classification::new(5).unwrap();
            points.push(vegetation);

            if (col, row) != (3, 3) {
                points.push(ground_point(x, y, 150));
                points.push(ground_point(x + 0.2, y, 250));
            }
        }
    }
    points
}

pub fn write_las(path: &Path, points: &[Point], srs: Option<&SpatialReference>) {
    let mut builder = Builder::from((1, 2));
    if let Some(srs) = srs {
        builder.vlrs = srs.to_las_vlrs();
    }
    let header = builder.into_header().unwrap();
    let mut writer = Writer::from_path(path, header).unwrap();
    for point in points {
        writer.write(point.clone()).unwrap();
    }
}

pub fn write_scene_las(dir: &Path) -> PathBuf {
    let path = dir.join("scene.las");
    write_las(&path, &scene_points(), Some(&SpatialReference::from_epsg(EPSG)));
    path
}

fn scene_image() -> RgbImage {
    RgbImage::from_fn(4, 4, |col, row| Rgb([red_at(col), 100 + row as u8, 7]))
}

/// 4x4 png, 1 m pixels, top-left corner at (0, 4), georeferenced by a world file
pub fn write_scene_png(dir: &Path) -> PathBuf {
    let path = dir.join("ortho.png");
    scene_image().save(&path).unwrap();
    std::fs::write(dir.join("ortho.pgw"), "1.0\n0.0\n0.0\n-1.0\n0.5\n3.5\n").unwrap();
    path
}

/// the same image as `write_scene_png`, as an RGB GeoTIFF with tie point and pixel scale tags
pub fn write_scene_geotiff(dir: &Path) -> PathBuf {
    let path = dir.join("ortho.tif");
    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = TiffEncoder::new(std::io::BufWriter::new(file)).unwrap();
    let mut image = encoder.new_image::<colortype::RGB8>(4, 4).unwrap();
    image.encoder().write_tag(Tag::ModelPixelScaleTag, &[1.0f64, 1.0, 0.0][..]).unwrap();
    image.encoder().write_tag(Tag::ModelTiepointTag, &[0.0f64, 0.0, 0.0, 0.0, 4.0, 0.0][..]).unwrap();
    image.write_data(scene_image().as_raw()).unwrap();
    path
}
