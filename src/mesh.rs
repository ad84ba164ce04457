use glam::Vec3;

use crate::bvh::{Bvh, Hit};
use crate::error::{EngineError, Result};

/// A single face with its precomputed unit normal.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
    pub normal: Vec3,
}

impl Triangle {
    pub fn bounds(&self) -> (Vec3, Vec3) {
        (
            self.v0.min(self.v1).min(self.v2),
            self.v0.max(self.v1).max(self.v2),
        )
    }

    pub fn centroid(&self) -> Vec3 {
        (self.v0 + self.v1 + self.v2) / 3.0
    }
}

/// Triangle soup plus the BVH built over it. Immutable once built; the
/// simulation only borrows it.
pub struct Mesh {
    triangles: Vec<Triangle>,
    bvh: Bvh,
}

impl Mesh {
    /// Builds a mesh from a flat position array and optional indices. With
    /// no indices, every 3 positions form a triangle. Face normals are
    /// recomputed from the winding; caller-supplied vertex normals are
    /// accepted for interface parity but play no part in intersection.
    ///
    /// Degenerate triangles are skipped. An empty or NaN-containing mesh
    /// fails with `InvalidGeometry`.
    pub fn build(
        positions: &[f32],
        _normals: Option<&[f32]>,
        indices: Option<&[u32]>,
    ) -> Result<Mesh> {
        if positions.is_empty() || positions.len() % 3 != 0 {
            return Err(EngineError::InvalidGeometry(format!(
                "position array length {} is not a multiple of 3",
                positions.len()
            )));
        }
        if positions.iter().any(|p| !p.is_finite()) {
            return Err(EngineError::InvalidGeometry(
                "positions contain NaN or infinity".into(),
            ));
        }

        let vertices: Vec<Vec3> = positions
            .chunks_exact(3)
            .map(|p| Vec3::new(p[0], p[1], p[2]))
            .collect();

        let mut triangles = Vec::new();
        let mut push_triangle = |v0: Vec3, v1: Vec3, v2: Vec3| {
            let cross = (v1 - v0).cross(v2 - v0);
            // area ~ 0: drop the face rather than produce a NaN normal
            if cross.length_squared() < 1e-12 {
                return;
            }
            triangles.push(Triangle {
                v0,
                v1,
                v2,
                normal: cross.normalize(),
            });
        };

        match indices {
            Some(indices) => {
                if indices.len() % 3 != 0 {
                    return Err(EngineError::InvalidGeometry(format!(
                        "index array length {} is not a multiple of 3",
                        indices.len()
                    )));
                }
                for tri in indices.chunks_exact(3) {
                    for &i in tri {
                        if i as usize >= vertices.len() {
                            return Err(EngineError::InvalidGeometry(format!(
                                "index {} out of range for {} vertices",
                                i,
                                vertices.len()
                            )));
                        }
                    }
                    push_triangle(
                        vertices[tri[0] as usize],
                        vertices[tri[1] as usize],
                        vertices[tri[2] as usize],
                    );
                }
            }
            None => {
                for tri in vertices.chunks_exact(3) {
                    push_triangle(tri[0], tri[1], tri[2]);
                }
            }
        }

        if triangles.is_empty() {
            return Err(EngineError::InvalidGeometry(
                "no non-degenerate triangles".into(),
            ));
        }

        let bvh = Bvh::build(&triangles);
        log::debug!(
            "mesh built: {} triangles, {} bvh nodes",
            triangles.len(),
            bvh.node_count()
        );
        Ok(Mesh { triangles, bvh })
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Nearest intersection along the ray with `distance > EPS_HIT`. The
    /// returned normal is oriented against the incoming direction so that
    /// reflection works for either triangle winding.
    pub fn closest_hit(&self, origin: Vec3, direction: Vec3) -> Option<Hit> {
        self.bvh.closest_hit(&self.triangles, origin, direction)
    }

    pub fn bounds(&self) -> (Vec3, Vec3) {
        let mut lo = Vec3::splat(f32::INFINITY);
        let mut hi = Vec3::splat(f32::NEG_INFINITY);
        for t in &self.triangles {
            let (tlo, thi) = t.bounds();
            lo = lo.min(tlo);
            hi = hi.max(thi);
        }
        (lo, hi)
    }
}
