use crate::crs::Crs;
use crate::error::PrepResult;
use indicatif::{ProgressBar, ProgressStyle};
use las::{Reader, Vlr};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const PROJECTION_USER_ID: &str = "LASF_Projection";
const GEOKEY_DIRECTORY_RECORD: u16 = 34735;
const GEO_DOUBLE_PARAMS_RECORD: u16 = 34736;
const WKT_RECORD: u16 = 2112;

/// Create LAS file reader for point cloud access.
/// Handles both .las and .laz compressed formats.
pub fn create_reader(file_path: &Path) -> PrepResult<Reader> {
    let file = File::open(file_path)?;
    let buf_reader = BufReader::new(file);
    Ok(Reader::new(buf_reader)?)
}

/// Points and coordinate system of a LAS/LAZ file.
pub struct LasContents {
    pub points: Vec<[f64; 3]>,
    pub crs: Option<Crs>,
}

/// Read every point of a LAS/LAZ file.
/// The progress bar is only drawn when `show_progress` is set.
pub fn read_points(file_path: &Path, show_progress: bool) -> PrepResult<LasContents> {
    let mut reader = create_reader(file_path)?;
    let header = reader.header();
    let crs = projection_from_vlrs(header.vlrs().iter().chain(header.evlrs().iter()));
    let total_points = header.number_of_points();

    let pb = if show_progress {
        let pb = ProgressBar::new(total_points);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} points ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("▉▊▋▌▍▎▏ "));
        }
        pb
    } else {
        ProgressBar::hidden()
    };
    pb.set_message("Loading points");

    let mut points = Vec::with_capacity(total_points as usize);
    for (idx, point_result) in reader.points().enumerate() {
        let point = point_result?;
        points.push([point.x, point.y, point.z]);

        if idx % 50_000 == 0 {
            pb.set_position(idx as u64);
        }
    }
    pb.finish_with_message("Points loaded");

    Ok(LasContents { points, crs })
}

/// Coordinate system from the GeoKey or WKT projection records.
fn projection_from_vlrs<'a>(vlrs: impl IntoIterator<Item = &'a Vlr>) -> Option<Crs> {
    let mut geokeys: Option<Vec<u16>> = None;
    let mut doubles: Vec<f64> = Vec::new();
    let mut wkt: Option<String> = None;

    for vlr in vlrs {
        if vlr.user_id.trim_end_matches('\0') != PROJECTION_USER_ID {
            continue;
        }
        match vlr.record_id {
            GEOKEY_DIRECTORY_RECORD => {
                geokeys = Some(
                    vlr.data
                        .chunks_exact(2)
                        .map(|b| u16::from_le_bytes([b[0], b[1]]))
                        .collect(),
                );
            }
            GEO_DOUBLE_PARAMS_RECORD => {
                doubles = vlr
                    .data
                    .chunks_exact(8)
                    .filter_map(|b| b.try_into().ok().map(f64::from_le_bytes))
                    .collect();
            }
            WKT_RECORD => {
                let text = String::from_utf8_lossy(&vlr.data);
                wkt = Some(text.trim_end_matches('\0').to_string());
            }
            _ => {}
        }
    }

    wkt.as_deref()
        .and_then(Crs::from_wkt)
        .or_else(|| geokeys.and_then(|keys| Crs::from_geokeys(&keys, &doubles)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::CrsKind;

    fn vlr(record_id: u16, data: Vec<u8>) -> Vlr {
        Vlr {
            user_id: PROJECTION_USER_ID.to_string(),
            record_id,
            description: String::new(),
            data,
        }
    }

    #[test]
    fn geokey_record_yields_projected_crs() {
        // Header, then ProjectedCSTypeGeoKey = 32615, ProjLinearUnitsGeoKey = metre.
        let directory: [u16; 12] = [1, 1, 0, 2, 3072, 0, 1, 32615, 3076, 0, 1, 9001];
        let data = directory.iter().flat_map(|v| v.to_le_bytes()).collect();
        let crs = projection_from_vlrs(&[vlr(GEOKEY_DIRECTORY_RECORD, data)]).unwrap();
        assert_eq!(crs.identifier, "EPSG:32615");
        assert_eq!(crs.linear_units_factor(), Some(1.0));
    }

    #[test]
    fn wkt_record_yields_geographic_crs() {
        let wkt = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433],AUTHORITY["EPSG","4326"]]"#;
        let mut data = wkt.as_bytes().to_vec();
        data.push(0);
        let crs = projection_from_vlrs(&[vlr(WKT_RECORD, data)]).unwrap();
        assert_eq!(crs.identifier, "EPSG:4326");
        assert!(matches!(crs.kind, CrsKind::Geographic { .. }));
    }

    #[test]
    fn unrelated_records_are_ignored() {
        let other = Vlr {
            user_id: "LASF_Spec".to_string(),
            record_id: GEOKEY_DIRECTORY_RECORD,
            description: String::new(),
            data: vec![0; 8],
        };
        assert!(projection_from_vlrs(&[other]).is_none());
    }
}
