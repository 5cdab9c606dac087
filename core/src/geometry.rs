//! Rigid-transform helpers shared by the solvers and the engine facade.

use nalgebra::{Matrix3, Matrix4, Vector3};

/// Build a homogeneous 4×4 matrix from a rotation and a translation.
pub fn rigid_from_parts(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Matrix4<f64> {
    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    m
}

/// Invert a rigid transform without a general matrix inversion:
/// `[R | t]⁻¹ = [Rᵀ | -Rᵀ t]`.
pub fn invert_rigid(m: &Matrix4<f64>) -> Matrix4<f64> {
    let r = m.fixed_view::<3, 3>(0, 0).transpose();
    let t: Vector3<f64> = -(r * m.fixed_view::<3, 1>(0, 3));
    rigid_from_parts(&r, &t)
}

/// Translation and rotation magnitude of a rigid transform.
#[derive(Debug, Clone, Copy)]
pub struct RigidParts {
    pub translation: Vector3<f64>,
    /// Rotation angle in radians, in `[0, π]`.
    pub rotation_angle: f64,
}

/// Decompose a rigid transform into a translation vector and the angle of
/// its rotation component.
pub fn decompose_rigid(m: &Matrix4<f64>) -> RigidParts {
    let translation = m.fixed_view::<3, 1>(0, 3).into_owned();
    let trace = m[(0, 0)] + m[(1, 1)] + m[(2, 2)];
    let rotation_angle = ((trace - 1.0) / 2.0).clamp(-1.0, 1.0).acos();
    RigidParts {
        translation,
        rotation_angle,
    }
}
