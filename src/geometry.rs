use glam::Vec3;
use rand::Rng;

/// Intersections closer than this are treated as self-hits and rejected.
pub const EPS_HIT: f32 = 1e-3;
/// After a bounce, the ray origin advances this far along the new direction
/// to escape the surface.
pub const OFFSET_EPS: f32 = 1e-3;

pub fn reflect(d: Vec3, n: Vec3) -> Vec3 {
    d - n * 2.0 * d.dot(n)
}

/// Orthonormal frame around `n`. The helper axis is the one least aligned
/// with `n` so the cross product never degenerates.
pub fn orthonormal_basis(n: Vec3) -> (Vec3, Vec3) {
    let helper = if n.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = helper.cross(n).normalize();
    let bitangent = n.cross(tangent);
    (tangent, bitangent)
}

/// Uniform direction on the unit sphere via inverse-CDF mapping.
pub fn uniform_sphere_direction<R: Rng>(rng: &mut R) -> Vec3 {
    let z = 2.0 * rng.gen::<f32>() - 1.0;
    let phi = std::f32::consts::TAU * rng.gen::<f32>();
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Cosine-weighted direction over the hemisphere of `n`.
pub fn cosine_weighted_hemisphere<R: Rng>(rng: &mut R, n: Vec3) -> Vec3 {
    let u1 = rng.gen::<f32>();
    let u2 = rng.gen::<f32>();
    let r = u1.sqrt();
    let phi = std::f32::consts::TAU * u2;
    let (tangent, bitangent) = orthonormal_basis(n);
    (tangent * (r * phi.cos()) + bitangent * (r * phi.sin()) + n * (1.0 - u1).max(0.0).sqrt())
        .normalize()
}

/// Blend of the specular and diffuse bounce directions. `scattering` = 0 is
/// pure specular, 1 is pure Lambertian.
pub fn mix_reflection(specular: Vec3, diffuse: Vec3, scattering: f32) -> Vec3 {
    (specular * (1.0 - scattering) + diffuse * scattering).normalize()
}

/// Nearest intersection distance of a ray with a sphere, `t > EPS_HIT`.
/// A ray starting inside the sphere returns the exit distance.
pub fn ray_sphere_intersect(origin: Vec3, dir: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let oc = origin - center;
    let b = oc.dot(dir);
    let c = oc.length_squared() - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    let t = -b - sqrt_disc;
    if t > EPS_HIT {
        return Some(t);
    }
    let t = -b + sqrt_disc;
    if t > EPS_HIT {
        Some(t)
    } else {
        None
    }
}

/// Möller-Trumbore ray/triangle intersection. Returns the hit distance.
/// Barycentric bounds carry a small tolerance so rays cannot slip through
/// shared edges of a closed mesh.
pub fn ray_triangle_intersect(ro: Vec3, rd: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    const BARY_EPS: f32 = 1e-7;

    let edge1 = b - a;
    let edge2 = c - a;
    let pv = rd.cross(edge2);

    // near-zero determinant means the ray lies in the triangle plane
    let det = edge1.dot(pv);
    if det.abs() < 1e-8 {
        return None;
    }
    let inv_det = 1.0 / det;

    let tv = ro - a;
    let u = tv.dot(pv) * inv_det;
    if u < -BARY_EPS || u > 1.0 + BARY_EPS {
        return None;
    }

    let qv = tv.cross(edge1);
    let v = rd.dot(qv) * inv_det;
    if v < -BARY_EPS || u + v > 1.0 + BARY_EPS {
        return None;
    }

    let t = edge2.dot(qv) * inv_det;
    (t > 0.0).then_some(t)
}
