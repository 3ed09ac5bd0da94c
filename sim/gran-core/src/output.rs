//! Snapshot writers: per-sphere CSV and VTK triangle meshes.
//!
//! Writers are generic over [`Write`]; the `save_*` helpers open a
//! buffered file at the given path.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use nalgebra::{Point3, Vector3};

use crate::mesh::Triangle;
use crate::world::GranularSystem;

/// CSV header of sphere snapshots.
pub const CSV_HEADER: &str = "x,y,z,vx,vy,vz,absv,nTouched";

/// VTK cell type of a three-vertex triangle.
pub const VTK_TRIANGLE_CELL: u8 = 5;

/// Writes one CSV row per sphere.
///
/// `touched` may be shorter than `positions` (e.g. before the first
/// broadphase); missing counts are written as 0.
///
/// # Errors
///
/// Any error from `writer`.
pub fn write_spheres_csv<W: Write>(
    writer: &mut W,
    positions: &[Point3<f64>],
    velocities: &[Vector3<f64>],
    touched: &[u8],
) -> io::Result<()> {
    writeln!(writer, "{CSV_HEADER}")?;
    for (i, p) in positions.iter().enumerate() {
        let v = velocities.get(i).copied().unwrap_or_else(Vector3::zeros);
        let n = touched.get(i).copied().unwrap_or(0);
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{}",
            p.x,
            p.y,
            p.z,
            v.x,
            v.y,
            v.z,
            v.norm(),
            n
        )?;
    }
    Ok(())
}

/// Writes the current sphere state of `system` as CSV.
///
/// # Errors
///
/// Any error from `writer`.
pub fn write_system_csv<W: Write>(writer: &mut W, system: &GranularSystem) -> io::Result<()> {
    write_spheres_csv(
        writer,
        &system.positions(),
        &system.velocities(),
        system.touched_counts(),
    )
}

/// Writes `triangles` as an ASCII VTK unstructured grid.
///
/// # Errors
///
/// Any error from `writer`.
pub fn write_mesh_vtk<W: Write>(writer: &mut W, triangles: &[Triangle]) -> io::Result<()> {
    let n = triangles.len();
    writeln!(writer, "# vtk DataFile Version 1.0")?;
    writeln!(writer, "Granular mesh soup")?;
    writeln!(writer, "ASCII")?;
    writeln!(writer)?;
    writeln!(writer, "DATASET UNSTRUCTURED_GRID")?;
    writeln!(writer, "POINTS {} float", 3 * n)?;
    for vertex in triangles.iter().flatten() {
        // Single precision matches the declared point type
        writeln!(
            writer,
            "{} {} {}",
            vertex.x as f32, vertex.y as f32, vertex.z as f32
        )?;
    }
    writeln!(writer)?;
    writeln!(writer, "CELLS {n} {}", 4 * n)?;
    for t in 0..n {
        writeln!(writer, "3 {} {} {}", 3 * t, 3 * t + 1, 3 * t + 2)?;
    }
    writeln!(writer)?;
    writeln!(writer, "CELL_TYPES {n}")?;
    for _ in 0..n {
        writeln!(writer, "{VTK_TRIANGLE_CELL}")?;
    }
    Ok(())
}

/// Saves the sphere state of `system` to a CSV file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn save_spheres_csv<P: AsRef<Path>>(path: P, system: &GranularSystem) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_system_csv(&mut writer, system)?;
    writer.flush()
}

/// Saves the world-frame mesh of `system` to a VTK file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn save_mesh_vtk<P: AsRef<Path>>(path: P, system: &GranularSystem) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_mesh_vtk(&mut writer, &system.mesh_triangles())?;
    writer.flush()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn csv_rows_follow_header() {
        let mut out = Vec::new();
        write_spheres_csv(
            &mut out,
            &[Point3::new(1.0, 2.0, 3.0), Point3::new(0.5, 0.0, -1.0)],
            &[Vector3::new(3.0, 4.0, 0.0), Vector3::zeros()],
            &[2],
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "1,2,3,3,4,0,5,2");
        assert_eq!(lines[2], "0.5,0,-1,0,0,0,0,0");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn vtk_sections() {
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let mut out = Vec::new();
        write_mesh_vtk(&mut out, &[tri, tri]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "# vtk DataFile Version 1.0");
        assert_eq!(lines[2], "ASCII");
        assert!(text.contains("POINTS 6 float\n"));
        assert!(text.contains("CELLS 2 8\n3 0 1 2\n3 3 4 5\n"));
        assert!(text.ends_with("CELL_TYPES 2\n5\n5\n"));
        assert!(lines.contains(&"1 0 0"));
    }

    #[test]
    fn empty_mesh_is_valid() {
        let mut out = Vec::new();
        write_mesh_vtk(&mut out, &[]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("POINTS 0 float"));
        assert!(text.ends_with("CELL_TYPES 0\n"));
    }
}
