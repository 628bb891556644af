//! Coordinate reference system description.
//!
//! Only what the pipeline needs is modelled: whether a system is projected,
//! its linear (or angular) unit, and an identifier for equality checks.
use constants::units::{find_angular_unit, find_linear_unit, get_angular_unit, get_linear_unit};
use serde::{Deserialize, Serialize};

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const GEOG_ANGULAR_UNITS: u16 = 2054;
const PROJECTED_CS_TYPE: u16 = 3072;
const PROJ_LINEAR_UNITS: u16 = 3076;
const PROJ_LINEAR_UNIT_SIZE: u16 = 3077;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;
const DOUBLE_PARAMS_TAG: u16 = 34736;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CrsKind {
    Projected {
        linear_units: String,
        units_factor: f64,
    },
    Geographic {
        angular_units: String,
        radians_per_unit: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crs {
    pub identifier: String,
    pub kind: CrsKind,
}

impl Crs {
    pub fn projected(identifier: impl Into<String>, linear_units: impl Into<String>, units_factor: f64) -> Self {
        Self {
            identifier: identifier.into(),
            kind: CrsKind::Projected {
                linear_units: linear_units.into(),
                units_factor,
            },
        }
    }

    pub fn geographic(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            kind: CrsKind::Geographic {
                angular_units: "degree".to_string(),
                radians_per_unit: std::f64::consts::PI / 180.0,
            },
        }
    }

    pub fn is_projected(&self) -> bool {
        matches!(self.kind, CrsKind::Projected { .. })
    }

    /// Metres per native linear unit; `None` for geographic systems.
    pub fn linear_units_factor(&self) -> Option<f64> {
        match self.kind {
            CrsKind::Projected { units_factor, .. } => Some(units_factor),
            CrsKind::Geographic { .. } => None,
        }
    }

    pub fn equals(&self, other: &Crs) -> bool {
        self.identifier.eq_ignore_ascii_case(&other.identifier)
            && self.is_projected() == other.is_projected()
    }

    /// Parse a GeoTIFF GeoKey directory.
    ///
    /// `directory` is the raw `u16` key directory; `double_params` backs keys
    /// stored in the GeoDoubleParams tag. Returns `None` when the directory
    /// declares neither a projected nor a geographic model.
    pub fn from_geokeys(directory: &[u16], double_params: &[f64]) -> Option<Crs> {
        let keys = GeoKeys::parse(directory, double_params)?;
        keys.crs()
    }

    /// Extract kind, unit and authority from a WKT1 or WKT2 string.
    pub fn from_wkt(wkt: &str) -> Option<Crs> {
        let trimmed = wkt.trim_start();
        let upper = trimmed.to_ascii_uppercase();
        let projected = upper.starts_with("PROJCS[") || upper.starts_with("PROJCRS[");
        let geographic = upper.starts_with("GEOGCS[")
            || upper.starts_with("GEOGCRS[")
            || upper.starts_with("GEODCRS[");
        if !projected && !geographic {
            return None;
        }

        let identifier = last_authority(trimmed).unwrap_or_else(|| first_name(trimmed));
        let (unit_name, unit_factor) = last_unit(trimmed)?;

        let kind = if projected {
            CrsKind::Projected {
                linear_units: unit_name,
                units_factor: unit_factor,
            }
        } else {
            let radians = find_angular_unit(&unit_name)
                .map(|u| u.radians)
                .unwrap_or(unit_factor);
            CrsKind::Geographic {
                angular_units: unit_name,
                radians_per_unit: radians,
            }
        };
        Some(Crs { identifier, kind })
    }
}

/// Decoded GeoKey values relevant to unit and convention detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoKeys {
    pub model_type: Option<u16>,
    pub raster_type: Option<u16>,
    pub geographic_type: Option<u16>,
    pub angular_units: Option<u16>,
    pub projected_cs: Option<u16>,
    pub linear_units: Option<u16>,
    pub linear_unit_size: Option<f64>,
}

impl GeoKeys {
    pub fn parse(directory: &[u16], double_params: &[f64]) -> Option<Self> {
        if directory.len() < 4 {
            return None;
        }
        let count = directory[3] as usize;
        let mut keys = GeoKeys::default();
        for entry in directory[4..].chunks_exact(4).take(count) {
            let (id, location, value) = (entry[0], entry[1], entry[3]);
            if id == PROJ_LINEAR_UNIT_SIZE {
                if location == DOUBLE_PARAMS_TAG {
                    keys.linear_unit_size = double_params.get(value as usize).copied();
                }
                continue;
            }
            // Only inline SHORT values are needed.
            if location != 0 {
                continue;
            }
            match id {
                GT_MODEL_TYPE => keys.model_type = Some(value),
                GT_RASTER_TYPE => keys.raster_type = Some(value),
                GEOGRAPHIC_TYPE => keys.geographic_type = Some(value),
                GEOG_ANGULAR_UNITS => keys.angular_units = Some(value),
                PROJECTED_CS_TYPE => keys.projected_cs = Some(value),
                PROJ_LINEAR_UNITS => keys.linear_units = Some(value),
                _ => {}
            }
        }
        Some(keys)
    }

    /// `AREA_OR_POINT` tag implied by the raster type key.
    pub fn area_or_point(&self) -> Option<&'static str> {
        self.raster_type.map(|t| {
            if t == RASTER_PIXEL_IS_POINT {
                "Point"
            } else {
                "Area"
            }
        })
    }

    pub fn crs(&self) -> Option<Crs> {
        let projected = match self.model_type {
            Some(MODEL_TYPE_PROJECTED) => true,
            Some(MODEL_TYPE_GEOGRAPHIC) => false,
            _ => self.projected_cs.is_some(),
        };

        if projected {
            let identifier = match self.projected_cs {
                Some(code) if code != USER_DEFINED => format!("EPSG:{code}"),
                _ => "USER_DEFINED".to_string(),
            };
            let (name, factor) = match self.linear_units.and_then(get_linear_unit) {
                Some(unit) => (unit.name.to_string(), unit.meters),
                None => match self.linear_unit_size {
                    Some(size) if size > 0.0 => ("user defined".to_string(), size),
                    _ => ("metre".to_string(), 1.0),
                },
            };
            return Some(Crs::projected(identifier, name, factor));
        }

        if self.model_type.is_none() && self.geographic_type.is_none() {
            return None;
        }
        let identifier = match self.geographic_type {
            Some(code) if code != USER_DEFINED => format!("EPSG:{code}"),
            _ => "USER_DEFINED".to_string(),
        };
        let unit = self
            .angular_units
            .and_then(get_angular_unit)
            .or_else(|| get_angular_unit(9102))?;
        Some(Crs {
            identifier,
            kind: CrsKind::Geographic {
                angular_units: unit.name.to_string(),
                radians_per_unit: unit.radians,
            },
        })
    }
}

/// Last `UNIT[...]`/`LENGTHUNIT[...]`/`ANGLEUNIT[...]` at any depth. In WKT the
/// coordinate system's own unit follows the units of nested base systems.
fn last_unit(wkt: &str) -> Option<(String, f64)> {
    let upper = wkt.to_ascii_uppercase();
    let start = ["LENGTHUNIT[", "ANGLEUNIT[", "UNIT["]
        .iter()
        .filter_map(|kw| upper.rfind(kw).map(|i| i + kw.len()))
        .max()?;
    let body = &wkt[start..];
    let mut parts = body.splitn(3, ',');
    let name = parts.next()?.trim().trim_matches('"').to_string();
    let factor: String = parts
        .next()?
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+' | ' '))
        .collect();
    let factor = factor.trim().parse::<f64>().ok()?;
    let factor = match find_linear_unit(&name) {
        Some(unit) if factor <= 0.0 => unit.meters,
        _ => factor,
    };
    Some((name, factor))
}

fn last_authority(wkt: &str) -> Option<String> {
    let upper = wkt.to_ascii_uppercase();
    let (start, _) = ["AUTHORITY[", "ID["]
        .iter()
        .filter_map(|kw| upper.rfind(kw).map(|i| (i + kw.len(), *kw)))
        .max_by_key(|(i, _)| *i)?;
    let body = &wkt[start..];
    let end = body.find(']')?;
    let mut parts = body[..end].split(',');
    let authority = parts.next()?.trim().trim_matches('"');
    let code = parts.next()?.trim().trim_matches('"');
    Some(format!("{authority}:{code}"))
}

fn first_name(wkt: &str) -> String {
    wkt.split('"').nth(1).unwrap_or("unnamed").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(entries: &[[u16; 4]]) -> Vec<u16> {
        let mut dir = vec![1, 1, 0, entries.len() as u16];
        for e in entries {
            dir.extend_from_slice(e);
        }
        dir
    }

    #[test]
    fn projected_feet_from_geokeys() {
        let dir = directory(&[
            [GT_MODEL_TYPE, 0, 1, 1],
            [GT_RASTER_TYPE, 0, 1, 2],
            [PROJECTED_CS_TYPE, 0, 1, 2264],
            [PROJ_LINEAR_UNITS, 0, 1, 9002],
        ]);
        let keys = GeoKeys::parse(&dir, &[]).unwrap();
        assert_eq!(keys.area_or_point(), Some("Point"));
        let crs = keys.crs().unwrap();
        assert_eq!(crs.identifier, "EPSG:2264");
        assert!(crs.is_projected());
        assert_eq!(crs.linear_units_factor(), Some(0.3048));
    }

    #[test]
    fn user_defined_unit_size_from_double_params() {
        let dir = directory(&[
            [GT_MODEL_TYPE, 0, 1, 1],
            [PROJECTED_CS_TYPE, 0, 1, USER_DEFINED],
            [PROJ_LINEAR_UNIT_SIZE, DOUBLE_PARAMS_TAG, 1, 1],
        ]);
        let crs = Crs::from_geokeys(&dir, &[0.0, 0.25]).unwrap();
        assert_eq!(crs.identifier, "USER_DEFINED");
        assert_eq!(crs.linear_units_factor(), Some(0.25));
    }

    #[test]
    fn geographic_from_geokeys() {
        let dir = directory(&[[GT_MODEL_TYPE, 0, 1, 2], [GEOGRAPHIC_TYPE, 0, 1, 4326]]);
        let crs = Crs::from_geokeys(&dir, &[]).unwrap();
        assert_eq!(crs.identifier, "EPSG:4326");
        assert!(!crs.is_projected());
        assert!(crs.linear_units_factor().is_none());
    }

    #[test]
    fn empty_directory_is_undefined() {
        assert!(Crs::from_geokeys(&directory(&[]), &[]).is_none());
        assert!(Crs::from_geokeys(&[1, 1], &[]).is_none());
    }

    #[test]
    fn wkt1_projected_uses_outer_unit() {
        let wkt = r#"PROJCS["NAD83 / North Carolina (ftUS)",GEOGCS["NAD83",DATUM["North_American_Datum_1983",SPHEROID["GRS 1980",6378137,298.257222101]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433]],PROJECTION["Lambert_Conformal_Conic_2SP"],UNIT["US survey foot",0.304800609601219],AUTHORITY["EPSG","2264"]]"#;
        let crs = Crs::from_wkt(wkt).unwrap();
        assert_eq!(crs.identifier, "EPSG:2264");
        let factor = crs.linear_units_factor().unwrap();
        assert!((factor - 0.304800609601219).abs() < 1e-12);
    }

    #[test]
    fn wkt1_geographic() {
        let wkt = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433],AUTHORITY["EPSG","4326"]]"#;
        let crs = Crs::from_wkt(wkt).unwrap();
        assert_eq!(crs.identifier, "EPSG:4326");
        assert!(!crs.is_projected());
        assert!(crs.equals(&Crs::geographic("epsg:4326")));
    }

    #[test]
    fn equality_requires_same_identifier() {
        let a = Crs::projected("EPSG:32615", "metre", 1.0);
        let b = Crs::projected("EPSG:32616", "metre", 1.0);
        assert!(!a.equals(&b));
        assert!(a.equals(&a.clone()));
    }
}
