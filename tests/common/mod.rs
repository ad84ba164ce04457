//! Shared geometry builders for the integration tests.
#![allow(dead_code)] // each test binary uses a different subset

use roomverb::Mesh;

fn quad(out: &mut Vec<f32>, a: [f32; 3], b: [f32; 3], c: [f32; 3], d: [f32; 3]) {
    for v in [a, b, c, a, c, d] {
        out.extend_from_slice(&v);
    }
}

/// Axis-aligned closed cube centered at the origin, 12 triangles.
pub fn cube_positions(side: f32) -> Vec<f32> {
    let h = side * 0.5;
    let mut p = Vec::with_capacity(12 * 9);
    quad(&mut p, [-h, -h, -h], [-h, -h, h], [-h, h, h], [-h, h, -h]);
    quad(&mut p, [h, -h, -h], [h, h, -h], [h, h, h], [h, -h, h]);
    quad(&mut p, [-h, -h, -h], [h, -h, -h], [h, -h, h], [-h, -h, h]);
    quad(&mut p, [-h, h, -h], [-h, h, h], [h, h, h], [h, h, -h]);
    quad(&mut p, [-h, -h, -h], [-h, h, -h], [h, h, -h], [h, -h, -h]);
    quad(&mut p, [-h, -h, h], [h, -h, h], [h, h, h], [-h, h, h]);
    p
}

pub fn cube_mesh(side: f32) -> Mesh {
    Mesh::build(&cube_positions(side), None, None).expect("cube mesh")
}

/// Regular icosahedron scaled to the given circumradius; the closest thing
/// to a sphere that 20 triangles buy.
pub fn icosahedron_positions(radius: f32) -> Vec<f32> {
    let phi = (1.0 + 5.0f32.sqrt()) / 2.0;
    let raw = [
        [-1.0, phi, 0.0],
        [1.0, phi, 0.0],
        [-1.0, -phi, 0.0],
        [1.0, -phi, 0.0],
        [0.0, -1.0, phi],
        [0.0, 1.0, phi],
        [0.0, -1.0, -phi],
        [0.0, 1.0, -phi],
        [phi, 0.0, -1.0],
        [phi, 0.0, 1.0],
        [-phi, 0.0, -1.0],
        [-phi, 0.0, 1.0],
    ];
    let scale = radius / (1.0 + phi * phi).sqrt();
    let verts: Vec<[f32; 3]> = raw
        .iter()
        .map(|v| [v[0] * scale, v[1] * scale, v[2] * scale])
        .collect();
    let faces: [[usize; 3]; 20] = [
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];
    let mut p = Vec::with_capacity(20 * 9);
    for f in faces {
        for i in f {
            p.extend_from_slice(&verts[i]);
        }
    }
    p
}

pub fn icosahedron_mesh(radius: f32) -> Mesh {
    Mesh::build(&icosahedron_positions(radius), None, None).expect("icosahedron mesh")
}
