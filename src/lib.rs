#![warn(missing_docs)]

//! Least-squares georeferencing of images from user-placed tie points. \
//! A tie point pairs a location in image pixel space with the matching
//! location in projected map space. Given at least two fully-specified tie
//! points, this crate fits the geometric transform mapping image coordinates
//! to map coordinates, picking the transform family from the number of points
//! available, and evaluates it forward (image to map), inverse (map to
//! image), and in batch over whole point grids.
//!
//! ## Interface
//! The central struct of this library is [`TiePointSolver`]. It holds a
//! [`TiePointSet`] and the fit options, and produces a [`Transform`] via
//! [`TiePointSolver::fit()`]. Tie points may be partially placed (only one
//! side set); the solver filters those out before fitting. A [`Transform`] is
//! immutable: refit after every edit that changes the valid tie points.
//!
//! Example:
//! ```rust
//! use georef::{TiePoint, TiePointSet, TiePointSolver};
//! use nalgebra::Vector2;
//!
//! let mut points = TiePointSet::new();
//! points.push(TiePoint::new(Vector2::new(0., 0.), Vector2::new(0., 0.)));
//! points.push(TiePoint::new(Vector2::new(20., 10.), Vector2::new(10., 5.)));
//!
//! let transform = TiePointSolver::new(points).fit().unwrap();
//! let mapped: Vector2<f64> = transform.forward(Vector2::new(5., 2.5));
//! assert!((mapped.x - 10.).abs() < 1e-9);
//! assert!((mapped.y - 5.).abs() < 1e-9);
//! ```
//!
//! ## Transform families
//! The family is selected purely from the number of valid tie points:
//!
//! | valid tie points | family | free parameters |
//! |---|---|---|
//! | 2 | similarity (axis scales + translation) | xscale, yscale, tx, ty |
//! | 3 | similarity with rotation | xscale, yscale, theta, tx, ty |
//! | 4 | affine | a11, a12, a21, a22, tx, ty |
//! | 5+ | projective (homography) | 8 matrix entries, p33 fixed at 1 |
//!
//! With five or more points the fit is a single global least-squares
//! homography over all points. No outlier rejection is attempted, so one
//! badly placed tie point degrades the whole solution; this keeps the fit
//! deterministic and cheap enough to rerun on every edit.
//!
//! Fewer than two valid tie points is not an error but an expected state
//! while points are being placed; [`TiePointSolver::fit()`] reports it as
//! [`FitError::InsufficientPoints`] and the serialized form is the empty
//! record ([`TransformRecord::empty()`]).

pub(crate) mod geometry;
pub mod mercator;
pub(crate) mod solver;
pub(crate) mod tiepoint;
pub(crate) mod transform;

pub use solver::{FitError, TiePointSolver, TransformFamily};
pub use tiepoint::{TiePoint, TiePointSet};
pub use transform::{RecordError, Transform, TransformRecord};

/// A generic float trait such that the solver is generic over `f32`/`f64`.
///
/// This trait is automatically implemented for all types implementing the
/// supertraits. Particularly, this includes `f32` and `f64`.
/// [`num_traits::Float`] is not a supertrait as the need to specify the
/// provider of the redundant definitions of the basic math functions would
/// clutter the code.
pub trait Float: Copy + Default + nalgebra::RealField + num_traits::FromPrimitive {}

impl<F> Float for F where F: Copy + Default + nalgebra::RealField + num_traits::FromPrimitive {}
