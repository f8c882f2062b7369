use simple_logger::SimpleLogger;
use lidar_ndvi::pipeline::Pipeline;


fn main() {
    SimpleLogger::new().env().init().unwrap();

    let path = std::env::args().nth(1).unwrap_or("pipeline.json".to_string());

    // a PDAL style pipeline, e.g. readers.las -> filters.range -> writers.gdal
    let pipeline = Pipeline::load(&path).unwrap();
    let summary = pipeline.execute().unwrap();

    println!("{} of {} points kept", summary.points_kept, summary.points_read);
    for raster in summary.rasters {
        println!("wrote {}", raster.display());
    }
}
