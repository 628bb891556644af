/// Error taxonomy for surface preparation.
///
/// Every variant is fatal to the surface being prepared. Nothing is retried
/// here; the orchestration layer decides whether to abort or skip.
use thiserror::Error;

pub type PrepResult<T> = Result<T, PrepError>;

#[derive(Error, Debug)]
pub enum PrepError {
    /// Invalid resolution, missing or contradictory configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Rotated or non-uniformly scaled transform, or a singular one.
    #[error("unsupported geometry in {source_name}: {reason}")]
    UnsupportedGeometry { source_name: String, reason: String },

    /// No valid samples to work from.
    #[error("no valid data: {0}")]
    EmptyData(String),

    /// An infill pass made no progress on the invalid region.
    #[error("infill stalled after {passes} passes with {remaining} invalid cells left")]
    Convergence { passes: usize, remaining: usize },

    /// Zero-variance relief after bandpass filtering.
    #[error("degenerate surface: 1st and 99th percentile are both {value}")]
    DegenerateSurface { value: f64 },

    /// Both datasets define a CRS but they differ.
    #[error("coordinate reference systems differ: {foundation} vs {subject}")]
    CrsMismatch { foundation: String, subject: String },

    /// A CRS is required but one of the datasets has none.
    #[error("coordinate reference system undefined for {0}")]
    UndefinedCrs(String),

    /// The oversized search extents do not intersect.
    #[error("search extents are disjoint: {0}")]
    DisjointExtent(String),

    /// A stage was invoked before its prerequisite stage.
    #[error("{stage} requires {requires} first")]
    NotPrepared {
        stage: &'static str,
        requires: &'static str,
    },

    /// Normal estimation needs a full neighbourhood.
    #[error("need at least {required} points, found {found}")]
    InsufficientPoints { required: usize, found: usize },

    /// Failure reported by an external raster, point cloud or mesh engine.
    #[error("{engine} engine failed: {message}")]
    Engine {
        engine: &'static str,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LAS error: {0}")]
    Las(#[from] las::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl PrepError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn unsupported_geometry(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedGeometry {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn engine(engine: &'static str, message: impl Into<String>) -> Self {
        Self::Engine {
            engine,
            message: message.into(),
        }
    }
}
