//! Geometric normalization of elevation data for co-registration.
//!
//! Rasters, point clouds and meshes are brought to a shared working
//! resolution in metres, optionally windowed to their mutual overlap, then
//! infilled, bandpass-normalized to 8 bits and projected back to points.
pub mod affine;
pub mod bandpass;
pub mod bounds;
pub mod config;
pub mod coordinates;
pub mod crs;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod grid;
pub mod heightmap;
pub mod infill;
pub mod laz;
pub mod manifest;
pub mod materialize;
pub mod preprocessor;
pub mod projector;
pub mod resolution;
pub mod surface;
pub mod windower;

pub use config::{RegistrationConfig, load_config};
pub use diagnostics::{DiagnosticEvent, Diagnostics, Severity, StageName};
pub use engine::Engines;
pub use error::{PrepError, PrepResult};
pub use manifest::{ManifestGenerator, PreparationManifest};
pub use preprocessor::{PreparedPair, RegistrationPreprocessor};
pub use surface::{GeospatialSurface, PreparedSurface, Role, SurfaceKind, SurfaceState};
