/// Linear and angular unit tables used to bring every dataset into metres.

pub struct LinearUnit {
    pub code: u16,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub meters: f64,
}

pub const LINEAR_UNITS: &[LinearUnit] = &[
    LinearUnit {
        code: 9001,
        name: "metre",
        aliases: &["m", "meter", "meters", "metre", "metres"],
        meters: 1.0,
    },
    LinearUnit {
        code: 9002,
        name: "foot",
        aliases: &["ft", "foot", "feet", "international foot"],
        meters: 0.3048,
    },
    LinearUnit {
        code: 9003,
        name: "US survey foot",
        aliases: &["us_survey_foot", "us survey foot", "us survey feet", "us-ft", "ftus"],
        meters: 1200.0 / 3937.0,
    },
    LinearUnit {
        code: 9005,
        name: "Clarke's foot",
        aliases: &["clarke's foot", "clarke foot"],
        meters: 0.304_797_265_4,
    },
    LinearUnit {
        code: 9014,
        name: "fathom",
        aliases: &["fathom", "fathoms"],
        meters: 1.8288,
    },
    LinearUnit {
        code: 9030,
        name: "nautical mile",
        aliases: &["nmi", "nautical mile", "nautical miles"],
        meters: 1852.0,
    },
    LinearUnit {
        code: 9036,
        name: "kilometre",
        aliases: &["km", "kilometer", "kilometers", "kilometre", "kilometres"],
        meters: 1000.0,
    },
    // Units below carry no EPSG code of their own; they only appear in mesh headers.
    LinearUnit {
        code: 0,
        name: "millimetre",
        aliases: &["mm", "millimeter", "millimeters", "millimetre", "millimetres"],
        meters: 0.001,
    },
    LinearUnit {
        code: 0,
        name: "centimetre",
        aliases: &["cm", "centimeter", "centimeters", "centimetre", "centimetres"],
        meters: 0.01,
    },
    LinearUnit {
        code: 0,
        name: "inch",
        aliases: &["in", "inch", "inches"],
        meters: 0.0254,
    },
    LinearUnit {
        code: 0,
        name: "yard",
        aliases: &["yd", "yard", "yards"],
        meters: 0.9144,
    },
    LinearUnit {
        code: 0,
        name: "mile",
        aliases: &["mi", "mile", "miles"],
        meters: 1609.344,
    },
];

pub struct AngularUnit {
    pub code: u16,
    pub name: &'static str,
    pub radians: f64,
}

pub const ANGULAR_UNITS: &[AngularUnit] = &[
    AngularUnit {
        code: 9101,
        name: "radian",
        radians: 1.0,
    },
    AngularUnit {
        code: 9102,
        name: "degree",
        radians: std::f64::consts::PI / 180.0,
    },
    AngularUnit {
        code: 9105,
        name: "grad",
        radians: std::f64::consts::PI / 200.0,
    },
];

/// Look up an EPSG linear unit code
pub fn get_linear_unit(code: u16) -> Option<&'static LinearUnit> {
    if code == 0 {
        return None;
    }
    LINEAR_UNITS.iter().find(|u| u.code == code)
}

/// Look up a free-form unit name (case and surrounding whitespace ignored)
pub fn find_linear_unit(name: &str) -> Option<&'static LinearUnit> {
    let key = name.trim().to_lowercase();
    LINEAR_UNITS
        .iter()
        .find(|u| u.name.eq_ignore_ascii_case(&key) || u.aliases.contains(&key.as_str()))
}

/// Look up an EPSG angular unit code
pub fn get_angular_unit(code: u16) -> Option<&'static AngularUnit> {
    ANGULAR_UNITS.iter().find(|u| u.code == code)
}

/// Look up an angular unit by name, as written in WKT
pub fn find_angular_unit(name: &str) -> Option<&'static AngularUnit> {
    let key = name.trim().to_lowercase();
    ANGULAR_UNITS
        .iter()
        .find(|u| key.starts_with(u.name) || (u.code == 9102 && key.starts_with("deg")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsg_codes_resolve_to_meters() {
        assert_eq!(get_linear_unit(9001).map(|u| u.meters), Some(1.0));
        assert_eq!(get_linear_unit(9002).map(|u| u.meters), Some(0.3048));
        assert!(get_linear_unit(0).is_none());
        assert!(get_linear_unit(1234).is_none());
    }

    #[test]
    fn mesh_unit_names_are_case_insensitive() {
        assert_eq!(find_linear_unit(" Feet ").map(|u| u.code), Some(9002));
        assert_eq!(find_linear_unit("millimeters").map(|u| u.meters), Some(0.001));
        assert!(find_linear_unit("cubits").is_none());
    }

    #[test]
    fn angular_names_match_wkt_spelling() {
        assert_eq!(find_angular_unit("degree").map(|u| u.code), Some(9102));
        assert_eq!(find_angular_unit("Degree (supplier to define representation)").map(|u| u.code), Some(9102));
        assert_eq!(find_angular_unit("radian").map(|u| u.code), Some(9101));
    }
}
