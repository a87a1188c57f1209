//! Homogeneous-coordinate helpers shared by the solver and transform
//! evaluation.

use nalgebra::allocator::Reallocator;
use nalgebra::{DefaultAllocator, Dim, DimAdd, DimSum, Matrix3, OMatrix, Vector2, Vector3, U1};
use ndarray::{Array2, ArrayView2, Zip};

use crate::Float;

/// Append a column of ones, lifting 2D points into homogeneous coordinates.
pub(crate) fn pad<F: Float, R: Dim, C: Dim>(x: OMatrix<F, R, C>) -> OMatrix<F, R, DimSum<C, U1>>
where
    C: DimAdd<U1>,
    DefaultAllocator: Reallocator<F, R, C, R, DimSum<C, U1>>,
{
    let cols = x.shape().1;
    x.insert_column(cols, F::from_f64(1.).unwrap())
}

/// Apply `matrix` to `[x, y, 1]` and divide through by the third component.
///
/// The division is a no-op for similarity and affine matrices (w stays 1)
/// but required for projective ones, where w varies per point.
pub(crate) fn apply_homogeneous<F: Float>(matrix: &Matrix3<F>, point: Vector2<F>) -> Vector2<F> {
    let v = matrix * Vector3::new(point.x, point.y, F::from_f64(1.).unwrap());
    Vector2::new(v.x / v.z, v.y / v.z)
}

/// Map each row of an `(n, 2)` point list through `matrix`.
pub(crate) fn transform_points<F: Float>(
    points: ArrayView2<F>,
    matrix: &Matrix3<F>,
) -> Array2<F> {
    let mut out = Array2::zeros((points.shape()[0], 2));
    Zip::from(out.rows_mut())
        .and(points.rows())
        .for_each(|mut to, from| {
            let mapped = apply_homogeneous(matrix, Vector2::new(from[0], from[1]));
            to[0] = mapped.x;
            to[1] = mapped.y;
        });
    out
}

/// Map each row of an `(n, 2)` point list through `matrix`, in parallel.
#[cfg(feature = "parallel")]
pub(crate) fn transform_points_par<F: Float + Send + Sync>(
    points: ArrayView2<F>,
    matrix: &Matrix3<F>,
) -> Array2<F> {
    let mut out = Array2::zeros((points.shape()[0], 2));
    Zip::from(out.rows_mut())
        .and(points.rows())
        .par_for_each(|mut to, from| {
            let mapped = apply_homogeneous(matrix, Vector2::new(from[0], from[1]));
            to[0] = mapped.x;
            to[1] = mapped.y;
        });
    out
}

/// Mean of a nonempty point list.
pub(crate) fn centroid<F: Float>(points: &[Vector2<F>]) -> Vector2<F> {
    let sum = points
        .iter()
        .fold(Vector2::zeros(), |acc: Vector2<F>, p| acc + *p);
    sum / F::from_usize(points.len()).unwrap()
}
