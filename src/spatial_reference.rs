use las::{Header, Vlr};
use log::debug;
use serde::{Deserialize, Serialize};

/// user id of the LAS VLRs that carry projection info
pub const LAS_PROJECTION_USER_ID: &str = "LASF_Projection";
pub const GEO_KEY_DIRECTORY_RECORD: u16 = 34735;
pub const GEO_DOUBLE_PARAMS_RECORD: u16 = 34736;
pub const GEO_ASCII_PARAMS_RECORD: u16 = 34737;
pub const OGC_WKT_RECORD: u16 = 2112;

const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GT_CITATION_GEO_KEY: u16 = 1026;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

/// The coordinate reference system of a point cloud or raster, in the form GeoTIFF and LAS share:
/// a GeoKey directory with its double and ASCII parameter blocks. LAS 1.4 files may carry WKT instead.
///
/// Nothing here is interpreted beyond finding an EPSG code. Points and rasters are never reprojected.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialReference {
    pub geo_key_directory: Vec<u16>,
    pub geo_double_params: Vec<f64>,
    pub geo_ascii_params: String,
    pub wkt: Option<String>,
}

impl SpatialReference {

    /// a projected CRS identified only by its EPSG code
    pub fn from_epsg(code: u16) -> SpatialReference {
        SpatialReference {
            geo_key_directory: vec![
                1, 1, 0, 3,
                GT_MODEL_TYPE_GEO_KEY, 0, 1, 1,
                GT_RASTER_TYPE_GEO_KEY, 0, 1, 1,
                PROJECTED_CS_TYPE_GEO_KEY, 0, 1, code,
            ],
            ..Default::default()
        }
    }

    /// reads the projection VLRs (and EVLRs) of a LAS header. `None` when the file has none.
    pub fn from_las_header(header: &Header) -> Option<SpatialReference> {
        let mut srs = SpatialReference::default();
        let mut found = false;

        for vlr in header.vlrs().iter().chain(header.evlrs().iter()) {
            if vlr.user_id != LAS_PROJECTION_USER_ID {
                continue;
            }
            match vlr.record_id {
                GEO_KEY_DIRECTORY_RECORD => {
                    srs.geo_key_directory = read_u16s(vlr);
                    found = true;
                }
                GEO_DOUBLE_PARAMS_RECORD => {
                    srs.geo_double_params = read_f64s(vlr);
                }
                GEO_ASCII_PARAMS_RECORD => {
                    srs.geo_ascii_params = read_ascii(vlr);
                }
                OGC_WKT_RECORD => {
                    srs.wkt = Some(read_ascii(vlr));
                    found = true;
                }
                other => {
                    debug!("ignoring projection record {other}");
                }
            }
        }

        found.then_some(srs)
    }

    /// builds the VLRs a LAS writer needs to carry this reference
    pub fn to_las_vlrs(&self) -> Vec<Vlr> {
        let mut vlrs = Vec::new();
        if !self.geo_key_directory.is_empty() {
            vlrs.push(projection_vlr(
                GEO_KEY_DIRECTORY_RECORD,
                self.geo_key_directory.iter().flat_map(|v| v.to_le_bytes()).collect(),
            ));
        }
        if !self.geo_double_params.is_empty() {
            vlrs.push(projection_vlr(
                GEO_DOUBLE_PARAMS_RECORD,
                self.geo_double_params.iter().flat_map(|v| v.to_le_bytes()).collect(),
            ));
        }
        if !self.geo_ascii_params.is_empty() {
            let mut data = self.geo_ascii_params.clone().into_bytes();
            data.push(0);
            vlrs.push(projection_vlr(GEO_ASCII_PARAMS_RECORD, data));
        }
        if let Some(wkt) = &self.wkt {
            let mut data = wkt.clone().into_bytes();
            data.push(0);
            vlrs.push(projection_vlr(OGC_WKT_RECORD, data));
        }
        vlrs
    }

    /// the (key id, value) pairs of the directory whose value is stored inline
    pub fn inline_keys(&self) -> Vec<(u16, u16)> {
        let dir = &self.geo_key_directory;
        if dir.len() < 4 {
            return Vec::new();
        }
        let key_count = dir[3] as usize;
        dir[4..]
            .chunks_exact(4)
            .take(key_count)
            .filter(|entry| entry[1] == 0)
            .map(|entry| (entry[0], entry[3]))
            .collect()
    }

    /// EPSG code of the projected (or failing that, geographic) CRS. 32767 means user-defined and is ignored.
    pub fn epsg(&self) -> Option<u16> {
        let keys = self.inline_keys();
        [PROJECTED_CS_TYPE_GEO_KEY, GEOGRAPHIC_TYPE_GEO_KEY].iter().find_map(|wanted| {
            keys.iter()
                .find(|(key, value)| key == wanted && *value != 0 && *value != 32767)
                .map(|(_, value)| *value)
        })
    }

    /// The GeoKey form of this reference, for a GeoTIFF. A WKT-only reference (LAS 1.4 point formats 6-10)
    /// becomes the citation of an otherwise empty directory. `None` if the WKT is too long for a key.
    pub fn to_geotiff_keys(&self) -> Option<SpatialReference> {
        match &self.wkt {
            Some(wkt) if self.geo_key_directory.is_empty() => {
                let ascii = format!("{wkt}|");
                let count = u16::try_from(ascii.len()).ok()?;
                Some(SpatialReference {
                    geo_key_directory: vec![
                        1, 1, 0, 1,
                        GT_CITATION_GEO_KEY, GEO_ASCII_PARAMS_RECORD, count, 0,
                    ],
                    geo_double_params: Vec::new(),
                    geo_ascii_params: ascii,
                    wkt: None,
                })
            }
            _ => Some(self.clone()),
        }
    }

    /// Undoes `to_geotiff_keys`: a directory holding nothing but a WKT citation comes back as that WKT.
    /// Anything else is returned as read.
    pub fn from_geotiff_keys(keys: SpatialReference) -> SpatialReference {
        let dir = &keys.geo_key_directory;
        if dir.len() == 8 && dir[3] == 1 && dir[4] == GT_CITATION_GEO_KEY && dir[5] == GEO_ASCII_PARAMS_RECORD {
            let (count, offset) = (dir[6] as usize, dir[7] as usize);
            let citation = keys
                .geo_ascii_params
                .get(offset..offset + count)
                .map(|text| text.trim_end_matches('|').trim());
            if let Some(wkt) = citation.filter(|text| text.contains('[') && text.ends_with(']')) {
                return SpatialReference {
                    wkt: Some(wkt.to_string()),
                    ..Default::default()
                };
            }
        }
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.geo_key_directory.is_empty() && self.wkt.is_none()
    }
}

fn projection_vlr(record_id: u16, data: Vec<u8>) -> Vlr {
    Vlr {
        user_id: LAS_PROJECTION_USER_ID.to_string(),
        record_id,
        description: String::new(),
        data,
    }
}

fn read_u16s(vlr: &Vlr) -> Vec<u16> {
    vlr.data
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect()
}

fn read_f64s(vlr: &Vlr) -> Vec<f64> {
    vlr.data
        .chunks_exact(8)
        .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .collect()
}

fn read_ascii(vlr: &Vlr) -> String {
    String::from_utf8_lossy(&vlr.data)
        .trim_end_matches('\0')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsg_round_trips_through_the_directory() {
        let srs = SpatialReference::from_epsg(26915);
        assert_eq!(srs.epsg(), Some(26915));
        assert!(!srs.is_empty());
    }

    #[test]
    fn user_defined_codes_are_not_epsg() {
        let srs = SpatialReference {
            geo_key_directory: vec![1, 1, 0, 1, PROJECTED_CS_TYPE_GEO_KEY, 0, 1, 32767],
            ..Default::default()
        };
        assert_eq!(srs.epsg(), None);
    }

    #[test]
    fn las_header_projection_is_read_back() {
        let srs = SpatialReference {
            wkt: Some("PROJCS[\"NAD83 / UTM zone 15N\"]".to_string()),
            ..SpatialReference::from_epsg(26915)
        };
        let mut builder = las::Builder::from((1, 4));
        builder.vlrs = srs.to_las_vlrs();
        let header = builder.into_header().unwrap();

        assert_eq!(SpatialReference::from_las_header(&header), Some(srs));
    }

    #[test]
    fn wkt_only_reference_survives_geotiff_keys() {
        let srs = SpatialReference {
            wkt: Some("PROJCS[\"WGS 84 / UTM zone 15N\",AUTHORITY[\"EPSG\",\"32615\"]]".to_string()),
            ..Default::default()
        };
        let keys = srs.to_geotiff_keys().unwrap();
        assert!(keys.wkt.is_none());
        assert_eq!(keys.geo_key_directory[4], GT_CITATION_GEO_KEY);
        assert_eq!(SpatialReference::from_geotiff_keys(keys), srs);

        let epsg = SpatialReference::from_epsg(32615);
        assert_eq!(epsg.to_geotiff_keys(), Some(epsg.clone()));
        assert_eq!(SpatialReference::from_geotiff_keys(epsg.clone()), epsg);
    }

    #[test]
    fn plain_citation_is_not_taken_for_wkt() {
        let keys = SpatialReference {
            geo_key_directory: vec![1, 1, 0, 1, GT_CITATION_GEO_KEY, GEO_ASCII_PARAMS_RECORD, 8, 0],
            geo_ascii_params: "my grid|".to_string(),
            ..Default::default()
        };
        assert_eq!(SpatialReference::from_geotiff_keys(keys.clone()), keys);
    }

    #[test]
    fn header_without_projection_has_none() {
        let header = las::Builder::from((1, 2)).into_header().unwrap();
        assert_eq!(SpatialReference::from_las_header(&header), None);
    }
}
