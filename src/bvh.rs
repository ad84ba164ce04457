use glam::Vec3;

use crate::geometry::{ray_triangle_intersect, EPS_HIT};
use crate::mesh::Triangle;

/// Flat BVH node. `left_or_first` is the left child index for interior
/// nodes (the right child is always `left + 1`) and the first slot in the
/// triangle ordering for leaves.
#[derive(Clone, Copy)]
struct BvhNode {
    aabb_min: Vec3,
    aabb_max: Vec3,
    left_or_first: u32,
    tri_count: u32,
}

impl Default for BvhNode {
    fn default() -> Self {
        BvhNode {
            aabb_min: Vec3::splat(f32::INFINITY),
            aabb_max: Vec3::splat(f32::NEG_INFINITY),
            left_or_first: 0,
            tri_count: 0,
        }
    }
}

impl BvhNode {
    fn is_leaf(&self) -> bool {
        self.tri_count > 0
    }

    fn update_bounds(&mut self, triangles: &[Triangle], order: &[u32]) {
        self.aabb_min = Vec3::splat(f32::INFINITY);
        self.aabb_max = Vec3::splat(f32::NEG_INFINITY);
        for i in 0..self.tri_count {
            let tri = &triangles[order[(self.left_or_first + i) as usize] as usize];
            let (lo, hi) = tri.bounds();
            self.aabb_min = self.aabb_min.min(lo);
            self.aabb_max = self.aabb_max.max(hi);
        }
    }
}

/// Slab test. Returns the entry distance, or infinity when the ray misses
/// the box, exits behind the origin, or enters beyond `best_t`.
fn intersect_aabb(aabb_min: Vec3, aabb_max: Vec3, ro: Vec3, rd: Vec3, best_t: f32) -> f32 {
    let tx1 = (aabb_min.x - ro.x) / rd.x;
    let tx2 = (aabb_max.x - ro.x) / rd.x;
    let mut tmin = tx1.min(tx2);
    let mut tmax = tx1.max(tx2);
    let ty1 = (aabb_min.y - ro.y) / rd.y;
    let ty2 = (aabb_max.y - ro.y) / rd.y;
    tmin = tmin.max(ty1.min(ty2));
    tmax = tmax.min(ty1.max(ty2));
    let tz1 = (aabb_min.z - ro.z) / rd.z;
    let tz2 = (aabb_max.z - ro.z) / rd.z;
    tmin = tmin.max(tz1.min(tz2));
    tmax = tmax.min(tz1.max(tz2));
    if tmax >= tmin && tmax > 0.0 && tmin < best_t {
        tmin
    } else {
        f32::INFINITY
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub distance: f32,
    pub point: Vec3,
    /// Face normal oriented against the incoming ray direction.
    pub normal: Vec3,
    pub triangle_index: u32,
}

/// Binary BVH over a triangle slice, built top-down with a midpoint split
/// on the longest axis. Immutable after build.
pub struct Bvh {
    nodes: Vec<BvhNode>,
    order: Vec<u32>,
}

impl Bvh {
    pub fn build(triangles: &[Triangle]) -> Bvh {
        assert!(!triangles.is_empty());
        let mut order: Vec<u32> = (0..triangles.len() as u32).collect();
        let centroids: Vec<Vec3> = triangles.iter().map(|t| t.centroid()).collect();

        let mut nodes = vec![BvhNode::default(); triangles.len() * 2 - 1];
        let mut node_count = 1usize;
        nodes[0].left_or_first = 0;
        nodes[0].tri_count = triangles.len() as u32;
        nodes[0].update_bounds(triangles, &order);

        let mut stack = vec![0usize];
        while let Some(node_idx) = stack.pop() {
            let node = nodes[node_idx];
            if node.tri_count <= 2 {
                continue;
            }

            // split along the longest axis at the midpoint
            let extent = node.aabb_max - node.aabb_min;
            let mut axis = 0usize;
            if extent.y > extent.x {
                axis = 1;
            }
            if extent.z > extent[axis] {
                axis = 2;
            }
            let split = node.aabb_min[axis] + extent[axis] * 0.5;

            // partition the triangle ordering around the split plane
            let mut a = node.left_or_first as i64;
            let mut b = (node.left_or_first + node.tri_count) as i64 - 1;
            while a <= b {
                if centroids[order[a as usize] as usize][axis] < split {
                    a += 1;
                } else {
                    order.swap(a as usize, b as usize);
                    b -= 1;
                }
            }

            // no split possible; leave the node as a leaf
            let left_count = a as u32 - node.left_or_first;
            if left_count == 0 || left_count == node.tri_count {
                continue;
            }

            let left_idx = node_count;
            let right_idx = node_count + 1;
            node_count += 2;
            nodes[node_idx].left_or_first = left_idx as u32;
            nodes[node_idx].tri_count = 0;
            nodes[left_idx].left_or_first = node.left_or_first;
            nodes[left_idx].tri_count = left_count;
            nodes[right_idx].left_or_first = a as u32;
            nodes[right_idx].tri_count = node.tri_count - left_count;
            nodes[left_idx].update_bounds(triangles, &order);
            nodes[right_idx].update_bounds(triangles, &order);

            stack.push(right_idx);
            stack.push(left_idx);
        }

        nodes.truncate(node_count);
        Bvh { nodes, order }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nearest hit with `distance > EPS_HIT`, traversing children in
    /// front-to-back order and pruning subtrees behind the current best.
    pub fn closest_hit(&self, triangles: &[Triangle], ro: Vec3, rd: Vec3) -> Option<Hit> {
        let mut stack: Vec<u32> = Vec::with_capacity(64);
        stack.push(0);

        let mut best_t = f32::INFINITY;
        let mut best_tri = u32::MAX;
        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx as usize];
            if node.is_leaf() {
                for i in 0..node.tri_count {
                    let tri_index = self.order[(node.left_or_first + i) as usize];
                    let tri = &triangles[tri_index as usize];
                    if let Some(t) = ray_triangle_intersect(ro, rd, tri.v0, tri.v1, tri.v2) {
                        if t > EPS_HIT && t < best_t {
                            best_t = t;
                            best_tri = tri_index;
                        }
                    }
                }
            } else {
                let mut near = node.left_or_first;
                let mut far = near + 1;
                let near_node = &self.nodes[near as usize];
                let far_node = &self.nodes[far as usize];
                let mut near_t =
                    intersect_aabb(near_node.aabb_min, near_node.aabb_max, ro, rd, best_t);
                let mut far_t = intersect_aabb(far_node.aabb_min, far_node.aabb_max, ro, rd, best_t);
                if near_t > far_t {
                    std::mem::swap(&mut near, &mut far);
                    std::mem::swap(&mut near_t, &mut far_t);
                }
                // near child missed means both missed
                if near_t.is_infinite() {
                    continue;
                }
                if far_t.is_finite() {
                    stack.push(far);
                }
                stack.push(near); // popped first
            }
        }

        if best_tri == u32::MAX {
            return None;
        }
        let tri = &triangles[best_tri as usize];
        let normal = if tri.normal.dot(rd) > 0.0 {
            -tri.normal
        } else {
            tri.normal
        };
        Some(Hit {
            distance: best_t,
            point: ro + rd * best_t,
            normal,
            triangle_index: best_tri,
        })
    }
}
