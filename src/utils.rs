use std::num::FpCategory;
use std::path::PathBuf;
use glob::glob;
use crate::errors::NdviError;
use log::warn;

/// maps `value_float` from a range between `min_float` and `max_float` to a u64 in range `0` to `max_val`.
/// Values outside the range are clamped, a zero-width range maps everything to 0.
pub fn scale_float_to_uint_range(value_float: f64, min_float: f64, max_float: f64, max_val: u64) -> u64{
    let range = max_float - min_float;
    let scaled = normal_or_default((value_float - min_float) / range, 0f64);
    (scaled.clamp(0f64, 1f64) * max_val as f64).round() as u64
}

/// returns the smaller f64, defaulting to `a` when a == b
pub fn f64_min(a: f64, b: f64) -> f64{
    if a > b {
        b
    } else {
        a
    }
}

/// returns the bigger f64, defaulting to `a` when a == b
pub fn f64_max(a: f64, b: f64) -> f64{
    if a < b {
        b
    } else {
        a
    }
}

/// basically a wrapper for `glob(glob_pattern)` with error conversions.
/// A plain path with no wildcards just comes back as itself (if it exists).
pub fn get_paths(glob_pattern: &str) -> Result<Vec<PathBuf>, NdviError>{

    let mut path_vec: Vec<PathBuf> = Vec::new();

    for entry in glob(glob_pattern)? {
        match entry {
            Ok(path) => {
                path_vec.push(path)
            },
            Err(e) => warn!("file was not able to be read, skipping it.: {:?} ", e),
        }
    }

    if path_vec.is_empty(){
        Err(NdviError::NoValidGlobReturnsError(glob_pattern.to_string()))
    } else {
        Ok(path_vec)
    }
}

/// 'normalizes' a float to be a real number. if `float` is a normal float (or zero) it returns `float`, otherwise it returns `default`
///
/// See rust docs for float categories https://doc.rust-lang.org/nightly/core/num/enum.FpCategory.html
pub fn normal_or_default<F>(float: F, default: F) -> F
    where F: num::Float
{
    match float.classify(){
        FpCategory::Normal | FpCategory::Zero => {
            float
        }
        _ => {
            default
        }
    }
}

/// takes an x and y coordinate and returns the index of that cell in a row-major grid.
///
/// Returns an error if the requested cell is out of bounds.
pub fn x_y_to_index(width: usize, height: usize, x: usize, y: usize) -> Result<usize, NdviError>{
    if x < width && y < height{
        Ok(y * width + x)
    } else {
        Err(NdviError::BadIndexError {
            width,
            height,
            x,
            y,
        })
    }
}
