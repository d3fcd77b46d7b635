//! Coordinate frame conventions.
//!
//! Internally the body frame is X right, Y nose, Z up, and the local (world)
//! frame is X east, Y north, Z up. Vehicle data files use the aeronautical
//! convention X nose, Y right, Z down. Conversion happens once, when a
//! vehicle description is loaded; the physics core never sees external axes.

use glam::{DMat3, DVec3};

/// External (X nose, Y right, Z down) to body (X right, Y nose, Z up).
#[inline]
pub fn external_to_body(v: DVec3) -> DVec3 {
    DVec3::new(v.y, v.x, -v.z)
}

/// Body to external. The permutation is its own inverse.
#[inline]
pub fn body_to_external(v: DVec3) -> DVec3 {
    external_to_body(v)
}

/// Change of basis matrix taking external vectors to body vectors.
fn permutation() -> DMat3 {
    DMat3::from_cols(
        DVec3::new(0.0, 1.0, 0.0),
        DVec3::new(1.0, 0.0, 0.0),
        DVec3::new(0.0, 0.0, -1.0),
    )
}

/// Re-express an inertia tensor given in external axes in body axes.
pub fn inertia_external_to_body(tensor: DMat3) -> DMat3 {
    let p = permutation();
    p * tensor * p.transpose()
}
