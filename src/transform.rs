//! Evaluation and serialization of fitted transforms.

use nalgebra::{Matrix3, Vector2};
use ndarray::{Array2, ArrayView2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{apply_homogeneous, transform_points};
use crate::solver::{FitError, TransformFamily};
use crate::Float;

/// A fitted mapping from image pixel space to map space.
///
/// Owns the family tag and a 3x3 homogeneous matrix; lower-order families
/// embed their parameters into the same 3x3 shape (similarity and affine
/// carry a `[0, 0, 1]` bottom row). A transform is immutable once fitted:
/// when the tie points change, refit and replace it rather than mutating.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform<F: Float> {
    family: TransformFamily,
    matrix: Matrix3<F>,
}

impl<F: Float> Transform<F> {
    /// Create a transform from a family tag and homogeneous matrix.
    ///
    /// Normally produced by [`TiePointSolver::fit`](crate::TiePointSolver::fit())
    /// or decoded from a [`TransformRecord`].
    pub fn new(family: TransformFamily, matrix: Matrix3<F>) -> Self {
        Self { family, matrix }
    }

    /// The family this transform was fitted as.
    ///
    /// Evaluation only needs the matrix, but callers branch on the family,
    /// so it survives serialization.
    pub fn family(&self) -> TransformFamily {
        self.family
    }

    /// The homogeneous matrix, rows mapping `[x, y, 1]` image coordinates to
    /// map coordinates.
    pub fn matrix(&self) -> &Matrix3<F> {
        &self.matrix
    }

    /// Map an image point to map space.
    ///
    /// Applies the matrix to `[x, y, 1]` and divides through by the third
    /// component. Projective transforms map points on their horizon line to
    /// non-finite coordinates.
    pub fn forward(&self, point: Vector2<F>) -> Vector2<F> {
        apply_homogeneous(&self.matrix, point)
    }

    /// Map each row of an `(n, 2)` image point list to map space.
    pub fn forward_points(&self, points: ArrayView2<F>) -> Array2<F> {
        transform_points(points, &self.matrix)
    }

    /// Map each row of an `(n, 2)` image point list to map space, in
    /// parallel. Worthwhile for bulk warping workloads, not for single
    /// points.
    #[cfg(feature = "parallel")]
    pub fn forward_points_par(&self, points: ArrayView2<F>) -> Array2<F>
    where
        F: Send + Sync,
    {
        crate::geometry::transform_points_par(points, &self.matrix)
    }

    /// Map a map point back to image space.
    ///
    /// Fails with [`FitError::NotInvertible`] when the matrix is singular.
    pub fn inverse(&self, point: Vector2<F>) -> Result<Vector2<F>, FitError> {
        let inverse = self
            .matrix
            .try_inverse()
            .ok_or(FitError::NotInvertible)?;
        Ok(apply_homogeneous(&inverse, point))
    }

    /// The inverse mapping as a transform of the same family.
    ///
    /// The projective inverse is re-normalized so its lower-right entry is
    /// one again, matching the form the solver produces.
    pub fn inverted(&self) -> Result<Self, FitError> {
        let mut inverse = self
            .matrix
            .try_inverse()
            .ok_or(FitError::NotInvertible)?;
        let pivot = inverse.m33;
        if pivot.is_finite() && pivot.abs() > F::default_epsilon() {
            inverse /= pivot;
        }
        Ok(Self::new(self.family, inverse))
    }

    /// Sum of squared Euclidean distances between the mapped image points
    /// and their paired map points.
    pub fn residual_sum_squares(&self, image: &[Vector2<F>], map: &[Vector2<F>]) -> F {
        image
            .iter()
            .zip(map)
            .map(|(source, target)| (self.forward(*source) - target).norm_squared())
            .fold(F::from_f64(0.).unwrap(), |acc, r| acc + r)
    }

    /// Root-mean-square residual over a set of paired points.
    pub fn residual_rms(&self, image: &[Vector2<F>], map: &[Vector2<F>]) -> F {
        if image.is_empty() {
            return F::from_f64(0.).unwrap();
        }
        (self.residual_sum_squares(image, map) / F::from_usize(image.len()).unwrap()).sqrt()
    }

    /// The serialized form of this transform.
    pub fn to_record(&self) -> TransformRecord<F> {
        TransformRecord {
            kind: self.family.as_str().to_owned(),
            matrix: self.matrix.row_iter().map(|r| [r[0], r[1], r[2]]).collect(),
        }
    }
}

/// Ways a serialized transform record can fail to decode.
///
/// These indicate a caller contract violation (a corrupted or foreign
/// record), distinct from the numeric [`FitError`] kinds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The type tag names no known transform family.
    #[error("unrecognized transform type {0:?}")]
    UnknownFamily(String),
    /// The matrix is not 3x3.
    #[error("expected a 3x3 transform matrix, got {rows} rows")]
    BadMatrixShape {
        /// Number of rows found in the record.
        rows: usize,
    },
}

/// The persisted form of a transform: a family tag and the 3x3 matrix.
///
/// Serializes as `{"type": "<family>", "matrix": [[..], [..], [..]]}`. The
/// absent transform, when fewer than two valid tie points exist, is the
/// empty record `{"type": "", "matrix": []}` so that callers can persist
/// "no transform available" without a separate flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRecord<F> {
    /// Family tag, or the empty string for the absent transform.
    #[serde(rename = "type")]
    pub kind: String,
    /// Matrix rows, empty for the absent transform.
    pub matrix: Vec<[F; 3]>,
}

impl<F: Float> TransformRecord<F> {
    /// The record for "no transform available".
    pub fn empty() -> Self {
        Self {
            kind: String::new(),
            matrix: Vec::new(),
        }
    }

    /// Whether this record carries no transform.
    ///
    /// Both the empty tag and the spelled-out `"none"` are accepted.
    pub fn is_empty(&self) -> bool {
        self.kind.is_empty() || self.kind == "none"
    }

    /// Decode back into a transform.
    ///
    /// The empty record decodes to `Ok(None)`; callers must treat that as
    /// "no transform available", not as an error.
    pub fn decode(&self) -> Result<Option<Transform<F>>, RecordError> {
        if self.is_empty() {
            return Ok(None);
        }
        let family = TransformFamily::parse(&self.kind)
            .ok_or_else(|| RecordError::UnknownFamily(self.kind.clone()))?;
        if self.matrix.len() != 3 {
            return Err(RecordError::BadMatrixShape {
                rows: self.matrix.len(),
            });
        }
        let m = &self.matrix;
        let matrix = Matrix3::new(
            m[0][0], m[0][1], m[0][2], //
            m[1][0], m[1][1], m[1][2], //
            m[2][0], m[2][1], m[2][2],
        );
        Ok(Some(Transform::new(family, matrix)))
    }

    /// Encode as a JSON string, the form the persistence layer stores
    /// verbatim.
    pub fn to_json(&self) -> serde_json::Result<String>
    where
        F: Serialize,
    {
        serde_json::to_string(self)
    }

    /// Parse a record back out of its JSON string.
    pub fn from_json(json: &str) -> serde_json::Result<Self>
    where
        F: DeserializeOwned,
    {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::matrix;
    use ndarray::array;

    use super::*;

    fn sample_points() -> Vec<Vector2<f64>> {
        vec![
            Vector2::new(0., 0.),
            Vector2::new(12., 5.),
            Vector2::new(-3., 40.),
            Vector2::new(250., -60.),
        ]
    }

    fn similarity() -> Transform<f64> {
        Transform::new(
            TransformFamily::Similarity,
            matrix![
                2., 0., 5.;
                0., 3., -1.;
                0., 0., 1.
            ],
        )
    }

    fn affine() -> Transform<f64> {
        Transform::new(
            TransformFamily::Affine,
            matrix![
                1.2, -0.4, 10.;
                0.3, 0.9, 20.;
                0., 0., 1.
            ],
        )
    }

    fn projective() -> Transform<f64> {
        Transform::new(
            TransformFamily::Projective,
            matrix![
                1.1, 0.2, 3.;
                -0.1, 0.95, -2.;
                5e-4, -3e-4, 1.
            ],
        )
    }

    #[test]
    fn forward_divides_by_w() {
        let transform = Transform::new(
            TransformFamily::Projective,
            matrix![
                1., 0., 0.;
                0., 1., 0.;
                0.001, 0., 1.
            ],
        );

        let mapped = transform.forward(Vector2::new(100., 50.));

        // w = 1.1, so both components shrink by that factor
        assert_abs_diff_eq!(mapped.x, 100. / 1.1, epsilon = 1e-12);
        assert_abs_diff_eq!(mapped.y, 50. / 1.1, epsilon = 1e-12);
    }

    #[test]
    fn forward_then_inverse_round_trips() {
        for transform in [similarity(), affine(), projective()] {
            for point in sample_points() {
                let there = transform.forward(point);
                let back = transform.inverse(there).unwrap();
                assert_abs_diff_eq!(back, point, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn inverted_transform_keeps_family_and_normalization() {
        let transform = projective();

        let inverse = transform.inverted().unwrap();

        assert_eq!(inverse.family(), TransformFamily::Projective);
        assert_abs_diff_eq!(inverse.matrix().m33, 1., epsilon = 1e-12);
        for point in sample_points() {
            let there = transform.forward(point);
            assert_abs_diff_eq!(inverse.forward(there), point, epsilon = 1e-8);
        }
    }

    #[test]
    fn random_affine_round_trips() {
        use rand::Rng;

        let mut rng = rand::rng();
        for _ in 0..20 {
            let transform = Transform::new(
                TransformFamily::Affine,
                matrix![
                    rng.random_range(0.5..2.0), rng.random_range(-0.3..0.3), rng.random_range(-100.0..100.0);
                    rng.random_range(-0.3..0.3), rng.random_range(0.5..2.0), rng.random_range(-100.0..100.0);
                    0., 0., 1.
                ],
            );
            let point = Vector2::new(rng.random_range(-50.0..50.0), rng.random_range(-50.0..50.0));
            let back = transform.inverse(transform.forward(point)).unwrap();
            assert_abs_diff_eq!(back, point, epsilon = 1e-8);
        }
    }

    #[test]
    fn singular_matrix_is_not_invertible() {
        let transform = Transform::new(
            TransformFamily::Affine,
            matrix![
                1., 0., 0.;
                0., 0., 0.;
                0., 0., 1.
            ],
        );

        assert_eq!(
            transform.inverse(Vector2::new(1., 1.)).unwrap_err(),
            FitError::NotInvertible
        );
        assert_eq!(transform.inverted().unwrap_err(), FitError::NotInvertible);
    }

    #[test]
    fn batch_mapping_matches_forward() {
        let transform = projective();
        let points = array![[0., 0.], [12., 5.], [-3., 40.], [250., -60.]];

        let mapped = transform.forward_points(points.view());

        for (row, point) in mapped.rows().into_iter().zip(sample_points()) {
            let expected = transform.forward(point);
            assert_abs_diff_eq!(row[0], expected.x, epsilon = 1e-12);
            assert_abs_diff_eq!(row[1], expected.y, epsilon = 1e-12);
        }
    }

    #[test]
    fn record_round_trip_preserves_forward_and_family() {
        for transform in [similarity(), affine(), projective()] {
            let json = transform.to_record().to_json().unwrap();
            let record = TransformRecord::<f64>::from_json(&json).unwrap();
            let restored = record.decode().unwrap().unwrap();

            assert_eq!(restored.family(), transform.family());
            for point in sample_points() {
                assert_abs_diff_eq!(
                    restored.forward(point),
                    transform.forward(point),
                    epsilon = 1e-12
                );
            }
        }
    }

    #[test]
    fn empty_record_is_no_transform() {
        let json = TransformRecord::<f64>::empty().to_json().unwrap();
        assert_eq!(json, r#"{"type":"","matrix":[]}"#);

        let record = TransformRecord::<f64>::from_json(&json).unwrap();
        assert!(record.is_empty());
        assert_eq!(record.decode().unwrap(), None);

        let spelled = TransformRecord::<f64>::from_json(r#"{"type":"none","matrix":[]}"#).unwrap();
        assert_eq!(spelled.decode().unwrap(), None);
    }

    #[test]
    fn malformed_records_are_rejected() {
        let unknown = TransformRecord::<f64> {
            kind: "quadratic".to_owned(),
            matrix: vec![[1., 0., 0.], [0., 1., 0.], [0., 0., 1.]],
        };
        assert_eq!(
            unknown.decode().unwrap_err(),
            RecordError::UnknownFamily("quadratic".to_owned())
        );

        let truncated = TransformRecord::<f64> {
            kind: "affine".to_owned(),
            matrix: vec![[1., 0., 0.], [0., 1., 0.]],
        };
        assert_eq!(
            truncated.decode().unwrap_err(),
            RecordError::BadMatrixShape { rows: 2 }
        );
    }

    #[test]
    fn residuals_are_zero_for_consistent_points() {
        let transform = affine();
        let image = sample_points();
        let map: Vec<_> = image.iter().map(|p| transform.forward(*p)).collect();

        assert_abs_diff_eq!(transform.residual_rms(&image, &map), 0., epsilon = 1e-12);

        let mut nudged = map.clone();
        nudged[0].x += 1.;
        assert!(transform.residual_rms(&image, &nudged) > 0.);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_batch_matches_blocking() {
        let transform = projective();
        let points = array![[0., 0.], [12., 5.], [-3., 40.], [250., -60.]];

        assert_abs_diff_eq!(
            transform.forward_points(points.view()),
            transform.forward_points_par(points.view())
        );
    }
}
