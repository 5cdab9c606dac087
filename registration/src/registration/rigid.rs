//! Closed-form rigid solving (orthogonal Procrustes).

use cl_core::{geometry::rigid_from_parts, Error, Result};
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

/// Rigid-body transform minimizing the sum of squared distances between
/// paired trusted points: centroids, covariance, SVD, reflection fix.
///
/// Deterministic for a given ordered input; no iteration, no randomness.
pub fn solve(source: &[Point3<f64>], target: &[Point3<f64>]) -> Result<Matrix4<f64>> {
    if source.len() != target.len() || source.len() < 3 {
        return Err(Error::UnderdeterminedFit {
            got: source.len().min(target.len()),
            need: 3,
        });
    }

    let inv_n = 1.0 / source.len() as f64;
    let mut source_centroid = Vector3::zeros();
    let mut target_centroid = Vector3::zeros();
    for (s, t) in source.iter().zip(target) {
        source_centroid += s.coords;
        target_centroid += t.coords;
    }
    source_centroid *= inv_n;
    target_centroid *= inv_n;

    let mut covariance = Matrix3::zeros();
    for (s, t) in source.iter().zip(target) {
        covariance += (t.coords - target_centroid) * (s.coords - source_centroid).transpose();
    }

    let svd = covariance.svd(true, true);
    let u = svd
        .u
        .ok_or_else(|| Error::NumericalDegeneracy("SVD of correspondence covariance failed".into()))?;
    let v_t = svd
        .v_t
        .ok_or_else(|| Error::NumericalDegeneracy("SVD of correspondence covariance failed".into()))?;

    let mut rotation = u * v_t;
    // det = -1 means the least-squares optimum is a reflection; flip the
    // weakest singular direction to stay in SO(3).
    if rotation.determinant() < 0.0 {
        let mut u_corrected = u;
        u_corrected.set_column(2, &(u.column(2) * -1.0));
        rotation = u_corrected * v_t;
    }

    let translation = target_centroid - rotation * source_centroid;
    Ok(rigid_from_parts(&rotation, &translation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn sample_points() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 1.0),
            Point3::new(3.0, 7.0, -2.0),
            Point3::new(-4.0, 2.0, 5.0),
            Point3::new(6.0, -3.0, 8.0),
        ]
    }

    #[test]
    fn recovers_known_rigid_motion() {
        let source = sample_points();
        let truth = rigid_from_parts(
            Rotation3::from_axis_angle(&Vector3::z_axis(), 0.3).matrix(),
            &Vector3::new(5.0, -2.0, 1.0),
        );
        let target: Vec<_> = source.iter().map(|p| truth.transform_point(p)).collect();

        let solved = solve(&source, &target).unwrap();
        assert_relative_eq!(solved, truth, epsilon = 1e-10);
    }

    #[test]
    fn identical_sets_give_identity() {
        let source = sample_points();
        let solved = solve(&source, &source).unwrap();
        assert_relative_eq!(solved, Matrix4::identity(), epsilon = 1e-10);
    }

    #[test]
    fn result_is_a_proper_rotation() {
        let source = sample_points();
        let truth = rigid_from_parts(
            Rotation3::from_axis_angle(&Vector3::x_axis(), 2.9).matrix(),
            &Vector3::new(0.0, 0.0, -9.0),
        );
        let target: Vec<_> = source.iter().map(|p| truth.transform_point(p)).collect();

        let solved = solve(&source, &target).unwrap();
        let r = solved.fixed_view::<3, 3>(0, 0).into_owned();
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-10);
        assert_relative_eq!(r * r.transpose(), Matrix3::identity(), epsilon = 1e-10);
    }

    #[test]
    fn rejects_short_input() {
        let two = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        let err = solve(&two, &two).unwrap_err();
        assert!(matches!(err, Error::UnderdeterminedFit { got: 2, need: 3 }));
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let three = sample_points()[..3].to_vec();
        let four = sample_points()[..4].to_vec();
        assert!(solve(&three, &four).is_err());
    }
}
