/// How far outside the mutual overlap to search for registration features
pub const OVERSIZE_SCALE: f64 = 1.5;

/// Sentinel written into empty cells by the point rasterizer
pub const RASTER_NODATA: f64 = -9999.0;

/// Hexagon edge length used for average point spacing estimation (native units)
pub const HEXBIN_EDGE_SIZE: f64 = 25.0;

/// Minimum number of points for a hexagon to count towards the sampled area
pub const HEXBIN_THRESHOLD: usize = 1;

/// Neighbourhood size for normal vector estimation
pub const NORMAL_KNN: usize = 9;

/// Furthest distance (pixels) an infill pass looks for a valid neighbour
pub const INFILL_MAX_SEARCH_DISTANCE: usize = 100;

/// Percentile window kept by the bandpass normalizer
pub const CLIP_PERCENTILE_LOW: f64 = 1.0;
pub const CLIP_PERCENTILE_HIGH: f64 = 99.0;

/// Mean Earth radius (IUGG), metres
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_008.8;

/// Default bandpass kernel sizes (object space, metres)
pub const DEFAULT_WEAK_FILTER: f64 = 1.0;
pub const DEFAULT_STRONG_FILTER: f64 = 10.0;

/// File extensions handled as gridded surfaces
pub const DSM_FILETYPES: &[&str] = &["tif", "tiff", "vrt"];

/// File extensions handled as point clouds
pub const PCLOUD_FILETYPES: &[&str] = &["las", "laz"];

/// File extensions handled as meshes
pub const MESH_FILETYPES: &[&str] = &["obj", "ply", "stl", "off", "glb", "gltf"];
