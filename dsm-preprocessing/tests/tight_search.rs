mod common;

use common::{MemoryMeshes, MemoryRasters, engines, init_logging, terrain_mesh, terrain_raster, utm};
use dsm_preprocessing::affine::AffineTransform;
use dsm_preprocessing::crs::Crs;
use dsm_preprocessing::diagnostics::StageName;
use dsm_preprocessing::engine::Engines;
use dsm_preprocessing::grid::{PixelWindow, RasterGrid};
use dsm_preprocessing::preprocessor::share_angular_scale;
use dsm_preprocessing::surface::SurfaceState;
use dsm_preprocessing::windower::{apply_tight_search, plan_tight_search};
use dsm_preprocessing::{
    Diagnostics, GeospatialSurface, PrepError, RegistrationConfig, RegistrationPreprocessor, Role,
};

fn side_by_side(subject_left: f64, subject_crs: Option<Crs>) -> Engines {
    let rasters = MemoryRasters::default()
        .with("fnd.tif", terrain_raster(0.0, 100.0, 1.0, (100, 100), Some(utm())))
        .with(
            "aoi.tif",
            terrain_raster(subject_left, 100.0, 1.0, (100, 100), subject_crs),
        );
    engines(rasters, MemoryMeshes::default())
}

fn tight_config(aoi: &str) -> RegistrationConfig {
    let mut config = RegistrationConfig::new("fnd.tif", aoi);
    config.tight_search = true;
    config
}

#[test]
fn both_surfaces_are_cropped_to_the_search_extent() {
    init_logging();
    let preprocessor =
        RegistrationPreprocessor::new(tight_config("aoi.tif"), side_by_side(120.0, Some(utm()))).unwrap();
    let mut diag = Diagnostics::new();
    let pair = preprocessor.run(&mut diag).unwrap();

    let plan = pair.tight_search.unwrap();
    assert_eq!(plan.foundation.window, PixelWindow::new(70, 0, 30, 100));
    assert_eq!(plan.subject.window, PixelWindow::new(0, 0, 30, 100));

    let foundation = pair.foundation.prepared().unwrap();
    assert_eq!(foundation.grid.shape(), (100, 30));
    assert_eq!(foundation.grid.window, Some(plan.foundation.window));
    assert!((foundation.transform().c - 70.0).abs() < 1e-9);
    assert!(foundation.normal_vectors().is_some());

    let subject = pair.subject.prepared().unwrap();
    assert_eq!(subject.grid.shape(), (100, 30));
    assert!((subject.transform().c - 120.0).abs() < 1e-9);

    assert!(
        diag.events
            .iter()
            .any(|e| e.stage == StageName::Window && e.surface == "Foundation-DSM")
    );
}

#[test]
fn without_tight_search_the_full_extent_is_kept() {
    let preprocessor = RegistrationPreprocessor::new(
        RegistrationConfig::new("fnd.tif", "aoi.tif"),
        side_by_side(120.0, Some(utm())),
    )
    .unwrap();
    let pair = preprocessor.run(&mut Diagnostics::new()).unwrap();
    assert_eq!(pair.foundation.materialized().unwrap().shape(), (100, 100));
    assert_eq!(pair.subject.materialized().unwrap().window, None);
}

#[test]
fn disjoint_surfaces_are_rejected() {
    let preprocessor =
        RegistrationPreprocessor::new(tight_config("aoi.tif"), side_by_side(1000.0, Some(utm()))).unwrap();
    assert!(matches!(
        preprocessor.run(&mut Diagnostics::new()),
        Err(PrepError::DisjointExtent(_))
    ));
}

#[test]
fn different_coordinate_systems_are_rejected() {
    let other = Crs::projected("EPSG:32616", "metre", 1.0);
    let preprocessor =
        RegistrationPreprocessor::new(tight_config("aoi.tif"), side_by_side(50.0, Some(other))).unwrap();
    match preprocessor.run(&mut Diagnostics::new()) {
        Err(PrepError::CrsMismatch { foundation, subject }) => {
            assert_eq!(foundation, "EPSG:32615");
            assert_eq!(subject, "EPSG:32616");
        }
        other => panic!("expected a CRS mismatch, got {:?}", other.err()),
    }
}

#[test]
fn mesh_without_a_coordinate_system_is_undefined() {
    let rasters = MemoryRasters::default()
        .with("fnd.tif", terrain_raster(0.0, 100.0, 1.0, (100, 100), Some(utm())));
    let meshes = MemoryMeshes::default().with("aoi.obj", terrain_mesh(20.0, 20.0, 1.0, 41));
    let preprocessor =
        RegistrationPreprocessor::new(tight_config("aoi.obj"), engines(rasters, meshes)).unwrap();
    match preprocessor.run(&mut Diagnostics::new()) {
        Err(PrepError::UndefinedCrs(label)) => assert_eq!(label, "AOI-MESH"),
        other => panic!("expected an undefined CRS, got {:?}", other.err()),
    }
}

#[test]
fn planning_requires_materialized_surfaces() {
    let engines = side_by_side(50.0, Some(utm()));
    let mut diag = Diagnostics::new();
    let mut foundation =
        GeospatialSurface::open("fnd.tif", Role::Foundation, engines.clone(), &mut diag).unwrap();
    let mut subject = GeospatialSurface::open("aoi.tif", Role::Subject, engines, &mut diag).unwrap();

    assert!(matches!(
        plan_tight_search(&foundation, &subject, &mut diag),
        Err(PrepError::NotPrepared { .. })
    ));

    foundation.set_target_resolution(1.0).unwrap();
    subject.set_target_resolution(1.0).unwrap();
    foundation.materialize(&mut diag).unwrap();
    subject.materialize(&mut diag).unwrap();

    // Subject extent [50,0]-[150,100] lies inside the foundation's margin.
    let plan = apply_tight_search(&mut foundation, &mut subject, &mut diag).unwrap();
    assert_eq!(plan.foundation.window, PixelWindow::new(0, 0, 100, 100));
    assert_eq!(plan.subject.window, PixelWindow::new(0, 0, 100, 100));
    assert!(matches!(subject.state(), SurfaceState::Materialized(_)));
    assert_eq!(subject.window(), Some(plan.subject.window));
}

/// Terrain sampled on a metre grid, georeferenced with 0.01 degree pixels.
fn degree_raster(left: f64, top: f64) -> RasterGrid {
    let mut grid = terrain_raster(0.0, 64.0, 1.0, (64, 64), Some(Crs::geographic("EPSG:4326")));
    grid.transform = AffineTransform::north_up(left, top, 0.01);
    grid
}

#[test]
fn geographic_pair_shares_one_planar_frame() {
    init_logging();
    let rasters = MemoryRasters::default()
        .with("fnd.tif", degree_raster(-90.0, 46.0))
        .with("aoi.tif", degree_raster(-90.0, 46.5));
    let engines = engines(rasters, MemoryMeshes::default());
    let mut diag = Diagnostics::new();
    let mut foundation =
        GeospatialSurface::open("fnd.tif", Role::Foundation, engines.clone(), &mut diag).unwrap();
    let mut subject = GeospatialSurface::open("aoi.tif", Role::Subject, engines, &mut diag).unwrap();
    assert_ne!(
        foundation.resolved().horizontal_factor,
        subject.resolved().horizontal_factor
    );

    assert!(share_angular_scale(&foundation, &mut subject, &mut diag));
    assert_eq!(
        foundation.resolved().horizontal_factor,
        subject.resolved().horizontal_factor
    );
    assert!((foundation.native_resolution() - subject.native_resolution()).abs() < 1e-9);

    let target = foundation.native_resolution();
    foundation.set_target_resolution(target).unwrap();
    subject.set_target_resolution(target).unwrap();
    foundation.materialize(&mut diag).unwrap();
    subject.materialize(&mut diag).unwrap();

    // (-90, 46) is the foundation's corner and row 50 of the subject.
    let fnd = foundation.materialized().unwrap().frame.apply(0.0, 0.0);
    let aoi = subject.materialized().unwrap().frame.apply(0.0, 50.0);
    assert!((fnd.0 - aoi.0).abs() < 1e-3, "{fnd:?} vs {aoi:?}");
    assert!((fnd.1 - aoi.1).abs() < 1e-3, "{fnd:?} vs {aoi:?}");

    assert!(plan_tight_search(&foundation, &subject, &mut diag).is_ok());
}

#[test]
fn projected_pairs_keep_their_own_factors() {
    let engines = side_by_side(50.0, Some(utm()));
    let mut diag = Diagnostics::new();
    let foundation =
        GeospatialSurface::open("fnd.tif", Role::Foundation, engines.clone(), &mut diag).unwrap();
    let mut subject = GeospatialSurface::open("aoi.tif", Role::Subject, engines, &mut diag).unwrap();
    assert!(!share_angular_scale(&foundation, &mut subject, &mut diag));
    assert_eq!(subject.resolved().horizontal_factor, 1.0);
}
