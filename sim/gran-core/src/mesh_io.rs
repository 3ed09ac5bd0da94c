//! Triangle soups from mesh files.
//!
//! Supported formats, detected from the file extension:
//!
//! - **OBJ** (Wavefront): `v` and `f` records; polygons are fan-triangulated,
//!   negative indices count back from the last vertex.
//! - **STL**: ASCII (`solid ... endsolid`) and binary.
//!
//! Vertices are returned in the file's own frame and units; per-family
//! scaling is applied by [`MeshSoup`](crate::MeshSoup).

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use gran_types::SimError;
use nalgebra::Point3;
use tracing::debug;

use crate::mesh::Triangle;

/// Binary STL header size in bytes.
const STL_HEADER_SIZE: usize = 80;

/// Size of one binary STL record: normal, three vertices, attribute.
const STL_TRIANGLE_SIZE: usize = 50;

/// Mesh file formats understood by [`load_triangles`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshFormat {
    /// Wavefront OBJ.
    Obj,
    /// Stereolithography, ASCII or binary.
    Stl,
}

impl MeshFormat {
    /// Detects the format from the file extension, case-insensitively.
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "obj" => Some(Self::Obj),
            "stl" => Some(Self::Stl),
            _ => None,
        }
    }
}

/// Loads every triangle of a mesh file, dispatching on its extension.
///
/// # Errors
///
/// [`SimError::MeshFile`] if the extension is unknown, the file cannot be
/// read, its content is malformed or it holds no triangles.
pub fn load_triangles<P: AsRef<Path>>(path: P) -> gran_types::Result<Vec<Triangle>> {
    let path = path.as_ref();
    let fail = |reason: String| SimError::mesh_file(path.display().to_string(), reason);

    let format = MeshFormat::from_path(path).ok_or_else(|| {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("(none)");
        fail(format!("unknown mesh format .{ext}"))
    })?;
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            fail("file not found".to_string())
        } else {
            fail(e.to_string())
        }
    })?;

    let triangles = match format {
        MeshFormat::Obj => parse_obj(BufReader::new(bytes.as_slice())),
        MeshFormat::Stl => parse_stl(&bytes),
    }
    .map_err(fail)?;
    if triangles.is_empty() {
        return Err(fail("no triangles".to_string()));
    }
    debug!(path = %path.display(), triangles = triangles.len(), "mesh file loaded");
    Ok(triangles)
}

fn parse_float(token: Option<&str>, line: usize) -> Result<f64, String> {
    let token = token.ok_or_else(|| format!("line {line}: missing coordinate"))?;
    let value: f64 = token
        .parse()
        .map_err(|e| format!("line {line}: bad coordinate {token:?}: {e}"))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("line {line}: non-finite coordinate {token:?}"))
    }
}

fn parse_point<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<Point3<f64>, String> {
    Ok(Point3::new(
        parse_float(tokens.next(), line)?,
        parse_float(tokens.next(), line)?,
        parse_float(tokens.next(), line)?,
    ))
}

/// Resolves an OBJ face token (`i`, `i/t`, `i//n`, `i/t/n`) to a 0-based index.
fn obj_index(token: &str, vertex_count: usize, line: usize) -> Result<usize, String> {
    let head = token.split('/').next().unwrap_or(token);
    let raw: i64 = head
        .parse()
        .map_err(|e| format!("line {line}: bad face index {token:?}: {e}"))?;
    let index = match raw {
        0 => None,
        i if i > 0 => usize::try_from(i - 1).ok(),
        i => usize::try_from(i.unsigned_abs())
            .ok()
            .and_then(|back| vertex_count.checked_sub(back)),
    };
    index
        .filter(|&i| i < vertex_count)
        .ok_or_else(|| format!("line {line}: face index {raw} out of range"))
}

fn parse_obj<R: BufRead>(reader: R) -> Result<Vec<Triangle>, String> {
    let mut vertices = Vec::new();
    let mut triangles = Vec::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| e.to_string())?;
        let number = number + 1;
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => vertices.push(parse_point(&mut tokens, number)?),
            Some("f") => {
                let corners = tokens
                    .map(|t| obj_index(t, vertices.len(), number))
                    .collect::<Result<Vec<_>, _>>()?;
                if corners.len() < 3 {
                    return Err(format!(
                        "line {number}: face with {} vertices",
                        corners.len()
                    ));
                }
                for pair in corners[1..].windows(2) {
                    triangles.push([
                        vertices[corners[0]],
                        vertices[pair[0]],
                        vertices[pair[1]],
                    ]);
                }
            }
            // Normals, texture coordinates, groups, materials, comments
            _ => {}
        }
    }
    Ok(triangles)
}

fn parse_stl(bytes: &[u8]) -> Result<Vec<Triangle>, String> {
    if let Some(count) = binary_stl_count(bytes) {
        return Ok(parse_stl_binary(&bytes[STL_HEADER_SIZE + 4..], count));
    }
    let text = String::from_utf8_lossy(bytes);
    if text.trim_start().starts_with("solid") {
        parse_stl_ascii(BufReader::new(bytes))
    } else if bytes.len() < STL_HEADER_SIZE + 4 {
        Err("file too small to be valid STL".to_string())
    } else {
        Err("binary STL size does not match its face count".to_string())
    }
}

/// Face count of a binary STL whose size matches its header exactly.
fn binary_stl_count(bytes: &[u8]) -> Option<usize> {
    let count_bytes: [u8; 4] = bytes
        .get(STL_HEADER_SIZE..STL_HEADER_SIZE + 4)?
        .try_into()
        .ok()?;
    let count = u32::from_le_bytes(count_bytes) as usize;
    let expected = count
        .checked_mul(STL_TRIANGLE_SIZE)?
        .checked_add(STL_HEADER_SIZE + 4)?;
    (bytes.len() == expected).then_some(count)
}

fn parse_stl_binary(records: &[u8], count: usize) -> Vec<Triangle> {
    let read_f32 = |b: &[u8]| f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    let read_vertex = |b: &[u8]| {
        Point3::new(
            f64::from(read_f32(&b[0..4])),
            f64::from(read_f32(&b[4..8])),
            f64::from(read_f32(&b[8..12])),
        )
    };
    records
        .chunks_exact(STL_TRIANGLE_SIZE)
        .take(count)
        .map(|r| {
            // Skip the stored normal; winding defines the face side
            [
                read_vertex(&r[12..24]),
                read_vertex(&r[24..36]),
                read_vertex(&r[36..48]),
            ]
        })
        .collect()
}

fn parse_stl_ascii<R: BufRead>(reader: R) -> Result<Vec<Triangle>, String> {
    let mut triangles = Vec::new();
    let mut facet: Option<Vec<Point3<f64>>> = None;

    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| e.to_string())?;
        let number = number + 1;
        let mut tokens = line.split_whitespace();
        match tokens.next().map(str::to_lowercase).as_deref() {
            Some("facet") => facet = Some(Vec::with_capacity(3)),
            Some("vertex") => {
                let corners = facet
                    .as_mut()
                    .ok_or_else(|| format!("line {number}: vertex outside a facet"))?;
                corners.push(parse_point(&mut tokens, number)?);
            }
            Some("endfacet") => {
                let corners = facet
                    .take()
                    .ok_or_else(|| format!("line {number}: endfacet without facet"))?;
                match corners.as_slice() {
                    [a, b, c] => triangles.push([*a, *b, *c]),
                    other => {
                        return Err(format!(
                            "line {number}: facet with {} vertices",
                            other.len()
                        ));
                    }
                }
            }
            Some("endsolid") => break,
            _ => {}
        }
    }
    if facet.is_some() {
        return Err("unterminated facet".to_string());
    }
    Ok(triangles)
}
