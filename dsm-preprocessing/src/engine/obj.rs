use super::{MeshData, MeshLoader, has_extension};
use crate::error::{PrepError, PrepResult};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Reads the vertex records of a Wavefront OBJ file.
///
/// OBJ has no unit declaration, so `units` is always `None`.
pub struct ObjVertexLoader;

impl ObjVertexLoader {
    pub fn parse(reader: impl BufRead) -> PrepResult<MeshData> {
        let mut vertices = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            if fields.next() != Some("v") {
                continue;
            }
            let coords: Vec<f64> = fields
                .take(3)
                .map(str::parse::<f64>)
                .collect::<Result<_, _>>()
                .map_err(|e| PrepError::engine("obj", format!("line {}: {e}", line_no + 1)))?;
            if coords.len() != 3 {
                return Err(PrepError::engine(
                    "obj",
                    format!("line {}: vertex needs three coordinates", line_no + 1),
                ));
            }
            vertices.push([coords[0], coords[1], coords[2]]);
        }
        Ok(MeshData {
            vertices,
            units: None,
        })
    }
}

impl MeshLoader for ObjVertexLoader {
    fn supports(&self, path: &Path) -> bool {
        has_extension(path, &["obj"])
    }

    fn load(&self, path: &Path) -> PrepResult<MeshData> {
        if !self.supports(path) {
            return Err(PrepError::engine(
                "obj",
                format!("{} is not a Wavefront OBJ file", path.display()),
            ));
        }
        Self::parse(BufReader::new(File::open(path)?))
    }
}
