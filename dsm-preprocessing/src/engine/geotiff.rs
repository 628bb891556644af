//! Single-band GeoTIFF raster engine.
use super::{RasterDescription, RasterEngine, ReadRequest, has_extension};
use crate::affine::AffineTransform;
use crate::crs::{Crs, GeoKeys};
use crate::error::{PrepError, PrepResult};
use crate::grid::{PixelWindow, RasterGrid, crop, is_valid};
use ndarray::Array2;
use rayon::prelude::*;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

pub struct GeoTiffEngine;

type TiffDecoder = Decoder<BufReader<File>>;

fn open(path: &Path) -> PrepResult<TiffDecoder> {
    Ok(Decoder::new(BufReader::new(File::open(path)?))?)
}

fn tag_f64s(decoder: &mut TiffDecoder, tag: Tag) -> PrepResult<Option<Vec<f64>>> {
    match decoder.find_tag(tag)? {
        Some(value) => Ok(Some(value.into_f64_vec()?)),
        None => Ok(None),
    }
}

/// Pixel to world transform from ModelTransformation, or tiepoint plus
/// pixel scale. Identity when the file carries neither.
fn read_transform(decoder: &mut TiffDecoder) -> PrepResult<AffineTransform> {
    if let Some(m) = tag_f64s(decoder, Tag::ModelTransformationTag)? {
        if m.len() >= 8 {
            return Ok(AffineTransform::new(m[0], m[1], m[3], m[4], m[5], m[7]));
        }
    }
    let tiepoint = tag_f64s(decoder, Tag::ModelTiepointTag)?;
    let scale = tag_f64s(decoder, Tag::ModelPixelScaleTag)?;
    match (tiepoint, scale) {
        (Some(tp), Some(sc)) if tp.len() >= 6 && sc.len() >= 2 => {
            let (i, j, x, y) = (tp[0], tp[1], tp[3], tp[4]);
            Ok(AffineTransform::new(
                sc[0],
                0.0,
                x - i * sc[0],
                0.0,
                -sc[1],
                y + j * sc[1],
            ))
        }
        _ => Ok(AffineTransform::IDENTITY),
    }
}

fn read_nodata(decoder: &mut TiffDecoder) -> PrepResult<Option<f64>> {
    match decoder.find_tag(Tag::GdalNodata)? {
        Some(value) => {
            let text = value.into_string()?;
            Ok(text.trim_matches(char::from(0)).trim().parse::<f64>().ok())
        }
        None => Ok(None),
    }
}

fn read_geokeys(decoder: &mut TiffDecoder) -> PrepResult<Option<GeoKeys>> {
    let directory = match decoder.find_tag(Tag::GeoKeyDirectoryTag)? {
        Some(value) => value
            .into_u32_vec()?
            .into_iter()
            .map(|v| v as u16)
            .collect::<Vec<u16>>(),
        None => return Ok(None),
    };
    let doubles = tag_f64s(decoder, Tag::GeoDoubleParamsTag)?.unwrap_or_default();
    Ok(GeoKeys::parse(&directory, &doubles))
}

fn describe_decoder(decoder: &mut TiffDecoder) -> PrepResult<RasterDescription> {
    let (width, height) = decoder.dimensions()?;
    let transform = read_transform(decoder)?;
    let nodata = read_nodata(decoder)?;
    let keys = read_geokeys(decoder)?;
    Ok(RasterDescription {
        transform,
        shape: (height as usize, width as usize),
        nodata,
        crs: keys.as_ref().and_then(GeoKeys::crs),
        area_or_point: keys
            .as_ref()
            .and_then(GeoKeys::area_or_point)
            .map(str::to_string),
    })
}

fn into_f64(data: DecodingResult) -> Vec<f64> {
    match data {
        DecodingResult::U8(values) => values.into_iter().map(f64::from).collect(),
        DecodingResult::U16(values) => values.into_iter().map(f64::from).collect(),
        DecodingResult::U32(values) => values.into_iter().map(f64::from).collect(),
        DecodingResult::U64(values) => values.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(values) => values.into_iter().map(f64::from).collect(),
        DecodingResult::I16(values) => values.into_iter().map(f64::from).collect(),
        DecodingResult::I32(values) => values.into_iter().map(f64::from).collect(),
        DecodingResult::I64(values) => values.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(values) => values.into_iter().map(f64::from).collect(),
        DecodingResult::F64(values) => values,
    }
}

impl RasterEngine for GeoTiffEngine {
    fn supports(&self, path: &Path) -> bool {
        has_extension(path, &["tif", "tiff"])
    }

    fn describe(&self, path: &Path) -> PrepResult<RasterDescription> {
        describe_decoder(&mut open(path)?)
    }

    fn read(&self, path: &Path, request: &ReadRequest) -> PrepResult<RasterGrid> {
        let mut decoder = open(path)?;
        let description = describe_decoder(&mut decoder)?;
        let (rows, cols) = description.shape;

        let samples = into_f64(decoder.read_image()?);
        let per_pixel = samples.len() / (rows * cols).max(1);
        if per_pixel == 0 {
            return Err(PrepError::engine("raster", "image holds fewer samples than pixels"));
        }
        // Keep band 1 of interleaved samples.
        let band: Vec<f64> = samples.into_iter().step_by(per_pixel).take(rows * cols).collect();
        let values = Array2::from_shape_vec((rows, cols), band)
            .map_err(|e| PrepError::engine("raster", e.to_string()))?;

        let grid = RasterGrid {
            values,
            transform: description.transform,
            nodata: description.nodata,
            crs: description.crs,
            area_or_point: description.area_or_point,
        };
        read_region(grid, request)
    }
}

/// Apply a read request to a fully loaded grid: crop to the window, then
/// resample to the output shape. The transform follows both steps.
pub fn read_region(grid: RasterGrid, request: &ReadRequest) -> PrepResult<RasterGrid> {
    let window = request.window.unwrap_or_else(|| PixelWindow::full(grid.shape()));
    let cropped = if window == PixelWindow::full(grid.shape()) {
        grid.values
    } else {
        crop(&grid.values, &window)
    };
    let windowed = grid.transform.window_transform(&window);

    let (values, transform) = match request.out_shape {
        Some(shape) if shape != cropped.dim() && shape.0 > 0 && shape.1 > 0 => {
            let (rows, cols) = cropped.dim();
            let scale = (cols as f64 / shape.1 as f64, rows as f64 / shape.0 as f64);
            (
                resample(&cropped, grid.nodata, shape)?,
                windowed * AffineTransform::scale(scale.0, scale.1),
            )
        }
        _ => (cropped, windowed),
    };

    Ok(RasterGrid {
        values,
        transform,
        ..grid
    })
}

/// Bilinear resampling between pixel centres. Output cells whose bilinear
/// footprint touches an invalid source cell take the nearest source cell.
pub fn resample(
    values: &Array2<f64>,
    nodata: Option<f64>,
    out_shape: (usize, usize),
) -> PrepResult<Array2<f64>> {
    let (rows, cols) = values.dim();
    let (out_rows, out_cols) = out_shape;
    if rows == 0 || cols == 0 || out_rows == 0 || out_cols == 0 {
        return Err(PrepError::engine(
            "raster",
            format!("cannot resample {rows}x{cols} cells to {out_rows}x{out_cols}"),
        ));
    }
    let sy = rows as f64 / out_rows as f64;
    let sx = cols as f64 / out_cols as f64;

    let data: Vec<f64> = (0..out_rows)
        .into_par_iter()
        .flat_map_iter(|i| {
            (0..out_cols).map(move |j| {
                let y = ((i as f64 + 0.5) * sy - 0.5).clamp(0.0, (rows - 1) as f64);
                let x = ((j as f64 + 0.5) * sx - 0.5).clamp(0.0, (cols - 1) as f64);
                let (r0, c0) = (y.floor() as usize, x.floor() as usize);
                let (r1, c1) = ((r0 + 1).min(rows - 1), (c0 + 1).min(cols - 1));
                let corners = [
                    values[[r0, c0]],
                    values[[r0, c1]],
                    values[[r1, c0]],
                    values[[r1, c1]],
                ];
                if corners.iter().all(|v| is_valid(*v, nodata)) {
                    let (fy, fx) = (y - r0 as f64, x - c0 as f64);
                    let top = corners[0] * (1.0 - fx) + corners[1] * fx;
                    let bottom = corners[2] * (1.0 - fx) + corners[3] * fx;
                    top * (1.0 - fy) + bottom * fy
                } else {
                    values[[y.round() as usize, x.round() as usize]]
                }
            })
        })
        .collect();

    Array2::from_shape_vec(out_shape, data).map_err(|e| PrepError::engine("raster", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn grid(values: Array2<f64>) -> RasterGrid {
        RasterGrid {
            values,
            transform: AffineTransform::north_up(1000.0, 2000.0, 1.0),
            nodata: Some(-9999.0),
            crs: None,
            area_or_point: None,
        }
    }

    #[test]
    fn window_read_moves_the_transform() {
        let values = Array2::from_shape_fn((6, 6), |(r, c)| (r * 6 + c) as f64);
        let request = ReadRequest {
            window: Some(PixelWindow::new(2, 1, 3, 2)),
            out_shape: None,
        };
        let out = read_region(grid(values), &request).unwrap();
        assert_eq!(out.values, array![[8.0, 9.0, 10.0], [14.0, 15.0, 16.0]]);
        assert_eq!(out.transform.origin(), (1002.0, 1999.0));
    }

    #[test]
    fn downsampling_scales_the_pixel_size() {
        let values = Array2::from_shape_fn((4, 4), |(r, c)| (r + c) as f64);
        let request = ReadRequest {
            window: None,
            out_shape: Some((2, 2)),
        };
        let out = read_region(grid(values), &request).unwrap();
        assert_eq!(out.values.dim(), (2, 2));
        assert_eq!(out.transform.a, 2.0);
        assert_eq!(out.transform.e, -2.0);
        assert_eq!(out.transform.origin(), (1000.0, 2000.0));
        // Linear input is reproduced exactly by bilinear sampling.
        assert!((out.values[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((out.values[[1, 1]] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_neighbours_fall_back_to_nearest() {
        let values = array![[1.0, -9999.0], [3.0, 4.0]];
        let out = resample(&values, Some(-9999.0), (4, 4)).unwrap();
        assert_eq!(out[[0, 0]], 1.0);
        assert_eq!(out[[0, 3]], -9999.0);
        assert!(out.iter().all(|v| *v == -9999.0 || (1.0..=4.0).contains(v)));
    }

    #[test]
    fn empty_regions_cannot_be_resampled() {
        let empty = Array2::<f64>::zeros((0, 4));
        assert!(matches!(
            resample(&empty, Some(-9999.0), (2, 2)),
            Err(PrepError::Engine { engine: "raster", .. })
        ));
        let values = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(matches!(
            resample(&values, None, (0, 3)),
            Err(PrepError::Engine { engine: "raster", .. })
        ));
    }

    #[test]
    fn only_geotiff_extensions_are_supported() {
        assert!(GeoTiffEngine.supports(Path::new("dsm.TIF")));
        assert!(GeoTiffEngine.supports(Path::new("dsm.tiff")));
        assert!(!GeoTiffEngine.supports(Path::new("mosaic.vrt")));
    }

    #[test]
    fn file_round_trip_reads_geokeys_and_nodata() {
        use tiff::encoder::{TiffEncoder, colortype};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dsm.tif");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = TiffEncoder::new(file).unwrap();
            let mut image = encoder.new_image::<colortype::Gray32Float>(3, 2).unwrap();
            let dir_encoder = image.encoder();
            dir_encoder
                .write_tag(Tag::ModelPixelScaleTag, &[2.0f64, 2.0, 0.0][..])
                .unwrap();
            dir_encoder
                .write_tag(Tag::ModelTiepointTag, &[0.0f64, 0.0, 0.0, 500.0, 900.0, 0.0][..])
                .unwrap();
            dir_encoder
                .write_tag(
                    Tag::GeoKeyDirectoryTag,
                    &[1u16, 1, 0, 3, 1024, 0, 1, 1, 1025, 0, 1, 2, 3072, 0, 1, 32615][..],
                )
                .unwrap();
            dir_encoder.write_tag(Tag::GdalNodata, "-9999").unwrap();
            image
                .write_data(&[1.0f32, 2.0, 3.0, 4.0, -9999.0, 6.0])
                .unwrap();
        }

        let engine = GeoTiffEngine;
        let description = engine.describe(&path).unwrap();
        assert_eq!(description.shape, (2, 3));
        assert_eq!(description.transform, AffineTransform::north_up(500.0, 900.0, 2.0));
        assert_eq!(description.nodata, Some(-9999.0));
        assert_eq!(description.area_or_point.as_deref(), Some("Point"));
        assert_eq!(description.crs.unwrap().identifier, "EPSG:32615");

        let grid = engine.read(&path, &ReadRequest::default()).unwrap();
        assert_eq!(grid.values, array![[1.0, 2.0, 3.0], [4.0, -9999.0, 6.0]]);
    }
}
