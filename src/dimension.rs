use std::fmt::Display;
use std::str::FromStr;
use las::{Color, Point};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use crate::errors::NdviError;

/// A named per-point attribute, spelled the way PDAL spells them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dimension {
    X,
    Y,
    Z,
    Intensity,
    ReturnNumber,
    NumberOfReturns,
    Classification,
    ScanAngleRank,
    UserData,
    PointSourceId,
    GpsTime,
    Red,
    Green,
    Blue,
    Infrared,
}

impl Dimension {
    pub const ALL: [Dimension; 15] = [
        Dimension::X,
        Dimension::Y,
        Dimension::Z,
        Dimension::Intensity,
        Dimension::ReturnNumber,
        Dimension::NumberOfReturns,
        Dimension::Classification,
        Dimension::ScanAngleRank,
        Dimension::UserData,
        Dimension::PointSourceId,
        Dimension::GpsTime,
        Dimension::Red,
        Dimension::Green,
        Dimension::Blue,
        Dimension::Infrared,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Dimension::X => "X",
            Dimension::Y => "Y",
            Dimension::Z => "Z",
            Dimension::Intensity => "Intensity",
            Dimension::ReturnNumber => "ReturnNumber",
            Dimension::NumberOfReturns => "NumberOfReturns",
            Dimension::Classification => "Classification",
            Dimension::ScanAngleRank => "ScanAngleRank",
            Dimension::UserData => "UserData",
            Dimension::PointSourceId => "PointSourceId",
            Dimension::GpsTime => "GpsTime",
            Dimension::Red => "Red",
            Dimension::Green => "Green",
            Dimension::Blue => "Blue",
            Dimension::Infrared => "Infrared",
        }
    }

    /// the attribute as a float. Missing color, infrared or GPS time read as 0, like a freshly allocated PDAL dimension.
    pub fn value(&self, point: &Point) -> f64 {
        match self {
            Dimension::X => point.x,
            Dimension::Y => point.y,
            Dimension::Z => point.z,
            Dimension::Intensity => point.intensity as f64,
            Dimension::ReturnNumber => point.return_number as f64,
            Dimension::NumberOfReturns => point.number_of_returns as f64,
            Dimension::Classification => u8::from(point.classification) as f64,
            Dimension::ScanAngleRank => point.scan_angle as f64,
            Dimension::UserData => point.user_data as f64,
            Dimension::PointSourceId => point.point_source_id as f64,
            Dimension::GpsTime => point.gps_time.unwrap_or(0f64),
            Dimension::Red => point.color.map_or(0f64, |c| c.red as f64),
            Dimension::Green => point.color.map_or(0f64, |c| c.green as f64),
            Dimension::Blue => point.color.map_or(0f64, |c| c.blue as f64),
            Dimension::Infrared => point.nir.map_or(0f64, |nir| nir as f64),
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(
            self,
            Dimension::Intensity
                | Dimension::UserData
                | Dimension::PointSourceId
                | Dimension::Red
                | Dimension::Green
                | Dimension::Blue
                | Dimension::Infrared
        )
    }

    /// Stores `value` into the point, rounded and clamped to the attribute's integer range.
    /// A point without color gets black first so a single channel can be set.
    pub fn set(&self, point: &mut Point, value: f64) -> Result<(), NdviError> {
        match self {
            Dimension::Intensity => point.intensity = to_u16(value),
            Dimension::UserData => point.user_data = value.round().clamp(0f64, u8::MAX as f64) as u8,
            Dimension::PointSourceId => point.point_source_id = to_u16(value),
            Dimension::Red => color_of(point).red = to_u16(value),
            Dimension::Green => color_of(point).green = to_u16(value),
            Dimension::Blue => color_of(point).blue = to_u16(value),
            Dimension::Infrared => point.nir = Some(to_u16(value)),
            read_only => return Err(NdviError::ReadOnlyDimension(read_only.name().to_string())),
        }
        Ok(())
    }
}

fn to_u16(value: f64) -> u16 {
    value.round().clamp(0f64, u16::MAX as f64) as u16
}

fn color_of(point: &mut Point) -> &mut Color {
    point.color.get_or_insert(Color::new(0, 0, 0))
}

impl FromStr for Dimension {
    type Err = NdviError;

    /// case-insensitive, with a few common aliases (`ScanAngle`, `NIR`, `GPSTime`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lowered = trimmed.to_ascii_lowercase();
        let alias = match lowered.as_str() {
            "scanangle" => Some(Dimension::ScanAngleRank),
            "nir" | "nearinfrared" => Some(Dimension::Infrared),
            "pointsourceid" | "point_source_id" => Some(Dimension::PointSourceId),
            _ => None,
        };
        alias
            .or_else(|| {
                Dimension::ALL
                    .iter()
                    .copied()
                    .find(|d| d.name().eq_ignore_ascii_case(trimmed))
            })
            .ok_or_else(|| NdviError::UnknownDimension(trimmed.to_string()))
    }
}

impl Display for Dimension {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(formatter, "{}", self.name())
    }
}

impl Serialize for Dimension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Dimension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
