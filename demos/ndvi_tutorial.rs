use std::path::PathBuf;
use simple_logger::SimpleLogger;
use lidar_ndvi::geotiff::read_geotiff;
use lidar_ndvi::point_cloud_info::PointCloudInfo;
use lidar_ndvi::workflow::NdviWorkflow;


fn main() {
    // start a logger to print info from lidar_ndvi
    SimpleLogger::new().env().init().unwrap();

    inspect_point_cloud();

    run_workflow();

    preview_result();
}

pub fn inspect_point_cloud(){
    // read only the headers of every file matching the pattern
    let info = PointCloudInfo::from_glob("test_laz/*.laz").unwrap();

    /*
        The point spacing is a good first guess for the cell size: finer than that and most cells
        end up empty, coarser and detail is thrown away.
    */
    println!("{} points, spacing {:?}", info.point_count, info.point_spacing);
    info.save("point cloud info.json").unwrap();
}

pub fn run_workflow(){
    let mut workflow = NdviWorkflow::new(
        "test_laz/*.laz", // intensity stands in for near infrared
        "ortho/ortho.tif", // red comes from band 1 of this image
        "ndvi_out"
    );
    workflow.resolution = Some(1.0);

    // the workflow can be saved and edited by hand, see the `run_pipeline` demo for single pipelines
    workflow.save("ndvi workflow.json").unwrap();

    let outputs = NdviWorkflow::load("ndvi workflow.json").unwrap().run().unwrap();
    println!("wrote {:?}", outputs.ndvi);
}

pub fn preview_result(){
    let ndvi = read_geotiff(PathBuf::from("ndvi_out").join("ndvi.tif")).unwrap();

    // no-data cells come out black, everything else is stretched over the rest of the grey range
    ndvi.save_to_image("ndvi preview.png").unwrap();
    ndvi.save_to_csv("ndvi.csv").unwrap();
}
