use std::fmt::Display;
use las::Bounds;
use serde::{Deserialize, Serialize};
use geo::Coord;
use crate::utils::{f64_max, f64_min};

/// Bounds for 3d space in the point cloud's own (planar) coordinates
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub min_z: f64,
    pub max_z: f64
}

impl BoundingBox {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64, min_z: f64, max_z: f64) -> Self{
        BoundingBox {
            min_x,
            max_x,
            min_y,
            max_y,
            min_z,
            max_z
        }
    }

    /// adds another bounding box to self, making self include all points in both regions
    pub fn add(&mut self, other: BoundingBox){
        self.min_x = f64_min(self.min_x, other.min_x);
        self.max_x = f64_max(self.max_x, other.max_x);
        self.min_y = f64_min(self.min_y, other.min_y);
        self.max_y = f64_max(self.max_y, other.max_y);
        self.min_z = f64_min(self.min_z, other.min_z);
        self.max_z = f64_max(self.max_z, other.max_z);
    }

    /// changes self to include the coordinate. z is left alone
    pub fn add_coord(&mut self, coord: Coord){
        self.min_x = f64_min(self.min_x, coord.x);
        self.max_x = f64_max(self.max_x, coord.x);
        self.min_y = f64_min(self.min_y, coord.y);
        self.max_y = f64_max(self.max_y, coord.y);
    }

    /// changes self to include a 3d point
    pub fn add_xyz(&mut self, x: f64, y: f64, z: f64){
        self.add_coord(Coord { x, y });
        self.min_z = f64_min(self.min_z, z);
        self.max_z = f64_max(self.max_z, z);
    }

    /// true until something has been added to a default box
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Gets the difference of the largest and smallest x values
    pub fn x_range(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Gets the difference of the largest and smallest y values
    pub fn y_range(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Gets the difference of the largest and smallest z values
    pub fn z_range(&self) -> f64 {
        self.max_z - self.min_z
    }

    /// planar footprint, 0 for an empty box
    pub fn area_xy(&self) -> f64 {
        if self.is_empty() {
            0f64
        } else {
            self.x_range() * self.y_range()
        }
    }
}

impl From<Bounds> for BoundingBox {
    fn from(b: Bounds) -> Self {
        BoundingBox {
            min_x: b.min.x,
            max_x: b.max.x,
            min_y: b.min.y,
            max_y: b.max.y,
            min_z: b.min.z,
            max_z: b.max.z,
        }
    }
}

impl Default for BoundingBox {

    /// Defaults to an impossible range that WILL cause errors if used by itself.
    /// (using default is ok, but at least one other bound must be added)
    ///
    /// This is done so that adding any range to a default will just turn it into the added bounds.
    fn default() -> Self {
        BoundingBox {
            min_x: f64::MAX,
            max_x: f64::MIN,
            min_y: f64::MAX,
            max_y: f64::MIN,
            min_z: f64::MAX,
            max_z: f64::MIN
        }
    }
}

impl Display for BoundingBox{
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(formatter,
               "x: ({}, {}) y: ({}, {}) z: ({}, {})",
               self.min_x, self.max_x, self.min_y, self.max_y, self.min_z, self.max_z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_box_takes_the_first_addition() {
        let mut b = BoundingBox::default();
        assert!(b.is_empty());
        assert_eq!(b.area_xy(), 0.0);

        b.add(BoundingBox::new(1.0, 3.0, 2.0, 6.0, 0.0, 1.0));
        assert_eq!(b, BoundingBox::new(1.0, 3.0, 2.0, 6.0, 0.0, 1.0));
        assert_eq!(b.area_xy(), 8.0);
    }

    #[test]
    fn adding_points_grows_the_box() {
        let mut b = BoundingBox::default();
        b.add_xyz(5.0, 5.0, 1.0);
        b.add_xyz(-1.0, 7.0, 3.0);
        assert_eq!(b.min_x, -1.0);
        assert_eq!(b.max_y, 7.0);
        assert_eq!(b.z_range(), 2.0);
    }
}
