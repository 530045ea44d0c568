//! Candidate triangle pairs ("couples") between the two meshes.
//!
//! A couple is minted when a triangle of mesh 1 and a triangle of mesh 2
//! pass both the box-tree broadphase and a separating-axis contact test.
//! The contact test also yields the cosine of the angle between the two
//! facet planes, which the chaining stage uses as a tangency prefilter.

use std::collections::HashSet;

use log::debug;
use polysect_math::{Point3, Vec3};

use crate::bbox::BoxTree;
use crate::mesh::SurfaceMesh;

/// A candidate pair of triangles, one per mesh.
#[derive(Debug, Clone, Copy)]
pub struct Couple {
    /// Triangle index in mesh 1.
    pub t1: usize,
    /// Triangle index in mesh 2.
    pub t2: usize,
    /// Cosine of the angle between the two facet planes.
    pub cos_angle: f64,
    /// Set once the chaining stage has consumed this couple.
    pub analyzed: bool,
}

/// Find new couples between the usable triangles of the two meshes.
///
/// `seen` carries the pairs already tested in earlier refinement
/// iterations of the same pass; they are skipped so a pair is never
/// geometrically tested twice. New couples are appended to `couples` in
/// deterministic order.
pub fn find_couples(
    m1: &SurfaceMesh,
    m2: &SurfaceMesh,
    seen: &mut HashSet<(usize, usize)>,
    couples: &mut Vec<Couple>,
) {
    let boxes: Vec<(usize, crate::bbox::Aabb3)> = m2
        .triangles
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_usable())
        .map(|(i, t)| (i, t.aabb))
        .collect();
    if boxes.is_empty() {
        return;
    }
    let tree = BoxTree::build(&boxes);

    let before = couples.len();
    let mut hits = Vec::new();
    for (t1, tri1) in m1.triangles.iter().enumerate() {
        if !tri1.is_usable() {
            continue;
        }
        tree.overlapping(&tri1.aabb, &mut hits);
        for &t2 in &hits {
            if !seen.insert((t1, t2)) {
                continue;
            }
            let tri2 = &m2.triangles[t2];
            let p = [
                m1.points[tri1.points[0]].pos,
                m1.points[tri1.points[1]].pos,
                m1.points[tri1.points[2]].pos,
            ];
            let q = [
                m2.points[tri2.points[0]].pos,
                m2.points[tri2.points[1]].pos,
                m2.points[tri2.points[2]].pos,
            ];
            if let Some(cos_angle) = tri_contact(&p, &q) {
                couples.push(Couple {
                    t1,
                    t2,
                    cos_angle,
                    analyzed: false,
                });
            }
        }
    }
    debug!("candidate filter: {} new couples", couples.len() - before);
}

/// Number of couples whose triangles are both still alive and usable.
pub fn live_couples(couples: &[Couple], m1: &SurfaceMesh, m2: &SurfaceMesh) -> usize {
    couples
        .iter()
        .filter(|c| m1.triangles[c.t1].is_usable() && m2.triangles[c.t2].is_usable())
        .count()
}

fn max3(a: f64, b: f64, c: f64) -> f64 {
    a.max(b).max(c)
}

fn min3(a: f64, b: f64, c: f64) -> f64 {
    a.min(b).min(c)
}

/// Interval-overlap test of both triangles projected on `axis`.
fn project6(axis: &Vec3, p: &[Vec3; 3], q: &[Vec3; 3]) -> bool {
    let pr = [axis.dot(&p[0]), axis.dot(&p[1]), axis.dot(&p[2])];
    let qr = [axis.dot(&q[0]), axis.dot(&q[1]), axis.dot(&q[2])];
    let mx1 = max3(pr[0], pr[1], pr[2]);
    let mn1 = min3(pr[0], pr[1], pr[2]);
    let mx2 = max3(qr[0], qr[1], qr[2]);
    let mn2 = min3(qr[0], qr[1], qr[2]);
    mn1 <= mx2 && mn2 <= mx1
}

/// Separating-axis contact test between two triangles.
///
/// Tests the 17 canonical axes (both facet normals, the nine edge-edge
/// cross products, and the six in-plane edge outwards). Returns the
/// cosine of the angle between the two facet planes when the triangles
/// are in contact, `None` when a separating axis exists. Touching counts
/// as contact.
pub fn tri_contact(pw: &[Point3; 3], qw: &[Point3; 3]) -> Option<f64> {
    // Cheap per-axis interval rejection first.
    for k in 0..3 {
        let (pmin, pmax) = (
            min3(pw[0][k], pw[1][k], pw[2][k]),
            max3(pw[0][k], pw[1][k], pw[2][k]),
        );
        let (qmin, qmax) = (
            min3(qw[0][k], qw[1][k], qw[2][k]),
            max3(qw[0][k], qw[1][k], qw[2][k]),
        );
        if pmin > qmax || qmin > pmax {
            return None;
        }
    }

    // Work relative to the first vertex of the first triangle.
    let origin = pw[0];
    let p = [Vec3::zeros(), pw[1] - origin, pw[2] - origin];
    let q = [qw[0] - origin, qw[1] - origin, qw[2] - origin];

    let e = [p[1] - p[0], p[2] - p[1], p[0] - p[2]];
    let f = [q[1] - q[0], q[2] - q[1], q[0] - q[2]];

    let n1 = e[0].cross(&e[1]);
    let m1 = f[0].cross(&f[1]);

    if !project6(&n1, &p, &q) || !project6(&m1, &p, &q) {
        return None;
    }
    for ei in &e {
        for fj in &f {
            if !project6(&ei.cross(fj), &p, &q) {
                return None;
            }
        }
    }
    for ei in &e {
        if !project6(&ei.cross(&n1), &p, &q) {
            return None;
        }
    }
    for fj in &f {
        if !project6(&fj.cross(&m1), &p, &q) {
            return None;
        }
    }

    let nn = n1.norm();
    let mm = m1.norm();
    if nn < 1e-12 || mm < 1e-12 {
        // Flat triangle; contact stands but the angle is meaningless.
        return Some(0.0);
    }
    Some((n1.dot(&m1) / (nn * mm)).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{mark_common_zone, SurfaceMesh};
    use polysect_geom::{Plane, UvDomain};
    use polysect_math::Tolerance;

    #[test]
    fn test_tri_contact_crossing() {
        // A triangle in the z=0 plane against one piercing it.
        let p = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(0.0, 4.0, 0.0),
        ];
        let q = [
            Point3::new(1.0, 1.0, -1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(3.0, 1.0, 1.0),
        ];
        let cos = tri_contact(&p, &q);
        assert!(cos.is_some());
        assert!(cos.unwrap().abs() < 0.99);
    }

    #[test]
    fn test_tri_contact_separated() {
        let p = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(0.0, 4.0, 0.0),
        ];
        let q = [
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(4.0, 0.0, 1.0),
            Point3::new(0.0, 4.0, 1.0),
        ];
        assert!(tri_contact(&p, &q).is_none());
    }

    #[test]
    fn test_tri_contact_coplanar_identical() {
        let p = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(0.0, 4.0, 0.0),
        ];
        let cos = tri_contact(&p, &p).unwrap();
        assert!((cos - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_tri_contact_touching_at_point() {
        let p = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(0.0, 4.0, 0.0),
        ];
        // Shares exactly the origin, otherwise above the plane.
        let q = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(-4.0, 0.0, 2.0),
            Point3::new(0.0, -4.0, 2.0),
        ];
        assert!(tri_contact(&p, &q).is_some());
    }

    fn crossing_meshes() -> (SurfaceMesh, SurfaceMesh) {
        let tol = Tolerance::DEFAULT;
        let p1 = Plane::new(
            Point3::origin(),
            Vec3::x(),
            Vec3::y(),
            UvDomain::new(-5.0, 5.0, -5.0, 5.0),
        );
        let p2 = Plane::new(
            Point3::origin(),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::y(),
            UvDomain::new(-5.0, 5.0, -5.0, 5.0),
        );
        let mut m1 = SurfaceMesh::build(&p1, 6, 6, false, &tol);
        let mut m2 = SurfaceMesh::build(&p2, 6, 6, false, &tol);
        mark_common_zone(&mut m1, &mut m2);
        (m1, m2)
    }

    #[test]
    fn test_find_couples_crossing_planes() {
        let (m1, m2) = crossing_meshes();
        let mut seen = HashSet::new();
        let mut couples = Vec::new();
        find_couples(&m1, &m2, &mut seen, &mut couples);
        assert!(!couples.is_empty());
        // Every couple really overlaps in space.
        for c in &couples {
            assert!(m1.triangles[c.t1].aabb.overlaps(&m2.triangles[c.t2].aabb));
        }
        assert_eq!(live_couples(&couples, &m1, &m2), couples.len());
    }

    #[test]
    fn test_find_couples_dedup_across_iterations() {
        let (m1, m2) = crossing_meshes();
        let mut seen = HashSet::new();
        let mut couples = Vec::new();
        find_couples(&m1, &m2, &mut seen, &mut couples);
        let first = couples.len();
        // Second sweep over the unchanged meshes adds nothing.
        find_couples(&m1, &m2, &mut seen, &mut couples);
        assert_eq!(couples.len(), first);
    }

    #[test]
    fn test_find_couples_empty_without_candidates() {
        let tol = Tolerance::DEFAULT;
        let p1 = Plane::new(
            Point3::origin(),
            Vec3::x(),
            Vec3::y(),
            UvDomain::new(0.0, 1.0, 0.0, 1.0),
        );
        let p2 = Plane::new(
            Point3::new(50.0, 0.0, 0.0),
            Vec3::x(),
            Vec3::y(),
            UvDomain::new(0.0, 1.0, 0.0, 1.0),
        );
        let mut m1 = SurfaceMesh::build(&p1, 3, 3, false, &tol);
        let mut m2 = SurfaceMesh::build(&p2, 3, 3, false, &tol);
        mark_common_zone(&mut m1, &mut m2);
        let mut seen = HashSet::new();
        let mut couples = Vec::new();
        find_couples(&m1, &m2, &mut seen, &mut couples);
        assert!(couples.is_empty());
    }
}
