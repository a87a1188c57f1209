//! Transform family selection and least-squares fitting.

use std::fmt;

use itertools::Itertools;
use log::{debug, info};
use nalgebra::{DMatrix, DVector, Matrix2, Matrix3, MatrixXx2, RowVector2, Vector2, SVD};
use thiserror::Error;

use crate::geometry::{centroid, pad};
use crate::tiepoint::TiePointSet;
use crate::transform::Transform;
use crate::Float;

/// The parametric model chosen for a fit, based on how many valid tie points
/// are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformFamily {
    /// Scale and translation; with three points also rotation.
    Similarity,
    /// Full linear map plus translation.
    Affine,
    /// Homography in homogeneous coordinates.
    Projective,
}

impl TransformFamily {
    /// Select the family for a count of valid tie points.
    ///
    /// Returns `None` below two points, where no transform is defined.
    pub fn for_count(count: usize) -> Option<Self> {
        match count {
            0 | 1 => None,
            2 | 3 => Some(Self::Similarity),
            4 => Some(Self::Affine),
            _ => Some(Self::Projective),
        }
    }

    /// The serialized tag for this family.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Similarity => "similarity",
            Self::Affine => "affine",
            Self::Projective => "projective",
        }
    }

    /// Parse a serialized tag back into a family.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "similarity" => Some(Self::Similarity),
            "affine" => Some(Self::Affine),
            "projective" => Some(Self::Projective),
            _ => None,
        }
    }
}

impl fmt::Display for TransformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ways a fit or transform evaluation can fail.
///
/// All of these are expected, recoverable states during interactive point
/// placement; they are returned as values, never panicked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FitError {
    /// Fewer than two valid tie points were available. The caller should
    /// prompt for more points.
    #[error("transform fit requires at least 2 valid tie points, got {actual}")]
    InsufficientPoints {
        /// Number of valid tie points supplied.
        actual: usize,
    },
    /// The tie point configuration (e.g. collinear or coincident points)
    /// yields a singular system. The caller should ask for better-distributed
    /// points.
    #[error("degenerate tie point configuration yields a singular system")]
    Degenerate,
    /// The inverse of a singular transform matrix was requested.
    #[error("transform matrix is singular and cannot be inverted")]
    NotInvertible,
}

/// Fits image-to-map transforms from a tie point set.
///
/// Holds the raw tie points and the fit options. The points are read only at
/// [`fit`](TiePointSolver::fit()) time: mutate the set between fits and refit
/// after every edit. `fit` is a pure, synchronous computation with no state
/// carried between calls; debouncing rapid edits is the caller's concern.
#[derive(Clone, Debug)]
pub struct TiePointSolver<F: Float> {
    points: TiePointSet<F>,
    rank_tolerance: F,
}

impl<F: Float> TiePointSolver<F> {
    /// Create a solver over a tie point set, with default options.
    pub fn new(points: TiePointSet<F>) -> Self {
        Self {
            points,
            rank_tolerance: F::default_epsilon().sqrt(),
        }
    }

    /// Set the singular-value ratio below which a system is declared
    /// degenerate.
    pub fn with_rank_tolerance(mut self, tolerance: F) -> Self {
        self.rank_tolerance = tolerance;
        self
    }

    /// The tie points this solver reads.
    pub fn points(&self) -> &TiePointSet<F> {
        &self.points
    }

    /// Mutable access to the tie points, for edits between fits.
    pub fn points_mut(&mut self) -> &mut TiePointSet<F> {
        &mut self.points
    }

    /// Fit the transform for the current valid tie points.
    ///
    /// The family is selected from the valid count alone (see the crate
    /// docs). For two, three, and four points the solve is direct and exact
    /// for family-consistent points; for five or more it is a global linear
    /// least squares over all points.
    pub fn fit(&self) -> Result<Transform<F>, FitError> {
        let (image, map) = self.points.valid_pairs();
        let count = image.len();
        let family = TransformFamily::for_count(count)
            .ok_or(FitError::InsufficientPoints { actual: count })?;
        debug!("selected {family} family for {count} valid tie points");

        let matrix = match count {
            2 => self.fit_axis_scales(&image, &map),
            3 => self.fit_similarity(&image, &map),
            4 => self.fit_affine(&image, &map),
            _ => self.fit_projective(&image, &map),
        }?;

        info!("fitted {family} transform from {count} tie points");
        Ok(Transform::new(family, matrix))
    }

    /// Two points: independent x and y scales plus translation.
    ///
    /// Each axis is solved on its own; an axis whose image coordinates
    /// coincide carries no scale information and borrows the scale of the
    /// other axis. Translation comes from the coordinate means, the
    /// least-squares optimum once the scales are fixed.
    fn fit_axis_scales(
        &self,
        image: &[Vector2<F>],
        map: &[Vector2<F>],
    ) -> Result<Matrix3<F>, FitError> {
        let xscale = self.axis_scale(image[0].x, image[1].x, map[0].x, map[1].x);
        let yscale = self.axis_scale(image[0].y, image[1].y, map[0].y, map[1].y);
        let (xscale, yscale) = match (xscale, yscale) {
            (Some(sx), Some(sy)) => (sx, sy),
            (Some(sx), None) => (sx, sx),
            (None, Some(sy)) => (sy, sy),
            (None, None) => return Err(FitError::Degenerate),
        };

        let half = F::from_f64(0.5).unwrap();
        let tx = (map[0].x + map[1].x - xscale * (image[0].x + image[1].x)) * half;
        let ty = (map[0].y + map[1].y - yscale * (image[0].y + image[1].y)) * half;

        let zero = F::from_f64(0.).unwrap();
        let one = F::from_f64(1.).unwrap();
        Ok(Matrix3::new(
            xscale, zero, tx, //
            zero, yscale, ty, //
            zero, zero, one,
        ))
    }

    /// Scale along one axis, or `None` when the image coordinates coincide
    /// and the axis is underdetermined.
    fn axis_scale(&self, source0: F, source1: F, target0: F, target1: F) -> Option<F> {
        let span = source1 - source0;
        let magnitude = F::from_f64(1.).unwrap() + source0.abs().max(source1.abs());
        if span.abs() <= self.rank_tolerance * magnitude {
            None
        } else {
            Some((target1 - target0) / span)
        }
    }

    /// Three points: rotation and per-axis scale.
    ///
    /// Solves the exact affine map of the three pairs, then decomposes its
    /// linear part into rotation times anisotropic scale. For points that
    /// actually lie on such a transform the decomposition is exact; otherwise
    /// it is the closest shear-free map, with the translation refit from the
    /// centroids.
    fn fit_similarity(
        &self,
        image: &[Vector2<F>],
        map: &[Vector2<F>],
    ) -> Result<Matrix3<F>, FitError> {
        let affine = self.fit_affine(image, map)?;

        let xscale = affine.m11.hypot(affine.m21);
        if xscale <= self.rank_tolerance {
            return Err(FitError::Degenerate);
        }
        let theta = affine.m21.atan2(affine.m11);
        let det = affine.m11 * affine.m22 - affine.m12 * affine.m21;
        let yscale = det / xscale;

        let (sin, cos) = theta.sin_cos();
        let linear = Matrix2::new(xscale * cos, -(yscale * sin), xscale * sin, yscale * cos);
        let translation = centroid(map) - linear * centroid(image);

        let zero = F::from_f64(0.).unwrap();
        let one = F::from_f64(1.).unwrap();
        Ok(Matrix3::new(
            linear.m11, linear.m12, translation.x, //
            linear.m21, linear.m22, translation.y, //
            zero, zero, one,
        ))
    }

    /// Three or more points: affine map by least squares over the
    /// homogeneous-padded point lists.
    fn fit_affine(
        &self,
        image: &[Vector2<F>],
        map: &[Vector2<F>],
    ) -> Result<Matrix3<F>, FitError> {
        let source = MatrixXx2::from_rows(
            &image
                .iter()
                .map(|p| RowVector2::new(p.x, p.y))
                .collect_vec(),
        );
        let target = MatrixXx2::from_rows(
            &map.iter().map(|p| RowVector2::new(p.x, p.y)).collect_vec(),
        );
        let source = pad(source);
        let target = pad(target);

        let svd = SVD::new(source, true, true);
        if rank_deficient(svd.singular_values.as_slice(), self.rank_tolerance) {
            return Err(FitError::Degenerate);
        }
        let solution: Matrix3<F> = svd
            .solve(&target, F::from_f64(0.).unwrap())
            .map_err(|_| FitError::Degenerate)?;

        let mut matrix = solution.transpose();
        matrix.m31 = F::from_f64(0.).unwrap();
        matrix.m32 = F::from_f64(0.).unwrap();
        matrix.m33 = F::from_f64(1.).unwrap();
        ensure_finite(&matrix)?;
        Ok(matrix)
    }

    /// Five or more points: homography by linear least squares for the eight
    /// free matrix entries, with the lower-right entry fixed at one.
    fn fit_projective(
        &self,
        image: &[Vector2<F>],
        map: &[Vector2<F>],
    ) -> Result<Matrix3<F>, FitError> {
        let zero = F::from_f64(0.).unwrap();
        let one = F::from_f64(1.).unwrap();

        let count = image.len();
        let mut design = DMatrix::from_element(2 * count, 8, zero);
        let mut rhs = DVector::from_element(2 * count, zero);
        for (i, (source, target)) in image.iter().zip(map).enumerate() {
            let row = 2 * i;
            design[(row, 0)] = source.x;
            design[(row, 1)] = source.y;
            design[(row, 2)] = one;
            design[(row, 6)] = -(source.x * target.x);
            design[(row, 7)] = -(source.y * target.x);
            rhs[row] = target.x;

            design[(row + 1, 3)] = source.x;
            design[(row + 1, 4)] = source.y;
            design[(row + 1, 5)] = one;
            design[(row + 1, 6)] = -(source.x * target.y);
            design[(row + 1, 7)] = -(source.y * target.y);
            rhs[row + 1] = target.y;
        }

        let svd = SVD::new(design, true, true);
        if rank_deficient(svd.singular_values.as_slice(), self.rank_tolerance) {
            return Err(FitError::Degenerate);
        }
        let h = svd
            .solve(&rhs, F::from_f64(0.).unwrap())
            .map_err(|_| FitError::Degenerate)?;

        let matrix = Matrix3::new(
            h[0], h[1], h[2], //
            h[3], h[4], h[5], //
            h[6], h[7], one,
        );
        ensure_finite(&matrix)?;
        Ok(matrix)
    }
}

/// Whether the smallest singular value vanishes relative to the largest.
fn rank_deficient<F: Float>(singular_values: &[F], tolerance: F) -> bool {
    let zero = F::from_f64(0.).unwrap();
    let max = singular_values.iter().fold(zero, |acc, &sv| acc.max(sv));
    let min = singular_values.iter().fold(max, |acc, &sv| acc.min(sv));
    min <= max * tolerance
}

fn ensure_finite<F: Float>(matrix: &Matrix3<F>) -> Result<(), FitError> {
    if matrix.iter().all(|entry| entry.is_finite()) {
        Ok(())
    } else {
        Err(FitError::Degenerate)
    }
}
