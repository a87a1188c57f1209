//! Tie points and their validity filtering.

use nalgebra::Vector2;
use ndarray::{ArrayView2, ErrorKind, ShapeError};

use crate::Float;

fn side_valid<F: Float>(side: Option<Vector2<F>>) -> bool {
    side.is_some_and(|p| p.x.is_finite() && p.y.is_finite())
}

/// A user-placed pairing of one image pixel location with one map location
/// believed to represent the same physical point.
///
/// Either side may still be absent while the point is being placed; only tie
/// points with both sides present and finite take part in fitting.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TiePoint<F: Float> {
    map: Option<Vector2<F>>,
    image: Option<Vector2<F>>,
}

impl<F: Float> TiePoint<F> {
    /// Create a fully-specified tie point from its map-side and image-side
    /// coordinates.
    pub fn new(map: Vector2<F>, image: Vector2<F>) -> Self {
        Self {
            map: Some(map),
            image: Some(image),
        }
    }

    /// Create a fully-specified tie point from a
    /// `[map_x, map_y, image_x, image_y]` row.
    pub fn from_row(row: [F; 4]) -> Self {
        Self::new(Vector2::new(row[0], row[1]), Vector2::new(row[2], row[3]))
    }

    /// Create a tie point with only the map side placed.
    pub fn map_only(map: Vector2<F>) -> Self {
        Self {
            map: Some(map),
            image: None,
        }
    }

    /// Create a tie point with only the image side placed.
    pub fn image_only(image: Vector2<F>) -> Self {
        Self {
            map: None,
            image: Some(image),
        }
    }

    /// The map-side coordinates, if placed.
    pub fn map(&self) -> Option<Vector2<F>> {
        self.map
    }

    /// The image-side coordinates, if placed.
    pub fn image(&self) -> Option<Vector2<F>> {
        self.image
    }

    /// Place, move, or clear the map side.
    pub fn set_map(&mut self, map: Option<Vector2<F>>) {
        self.map = map;
    }

    /// Place, move, or clear the image side.
    pub fn set_image(&mut self, image: Option<Vector2<F>>) {
        self.image = image;
    }

    /// Whether both sides are placed with finite coordinates.
    ///
    /// NaN and infinite coordinates count as unplaced.
    pub fn is_valid(&self) -> bool {
        side_valid(self.map) && side_valid(self.image)
    }
}

/// An ordered list of tie points, in insertion order.
///
/// The order carries no meaning for the fit; it is the display index of the
/// points. The set is mutated by the caller as points are added, moved, and
/// deleted; the solver only reads it at fit time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TiePointSet<F: Float> {
    points: Vec<TiePoint<F>>,
}

impl<F: Float> TiePointSet<F> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Build a set of fully-specified tie points from an `(n, 4)` array of
    /// `[map_x, map_y, image_x, image_y]` rows.
    ///
    /// Anything other than four columns is a caller error, reported as a
    /// [`ShapeError`] rather than a fit failure.
    pub fn from_rows(rows: ArrayView2<F>) -> Result<Self, ShapeError> {
        if rows.ncols() != 4 {
            return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape));
        }
        Ok(rows
            .rows()
            .into_iter()
            .map(|row| TiePoint::from_row([row[0], row[1], row[2], row[3]]))
            .collect())
    }

    /// Append a tie point.
    pub fn push(&mut self, point: TiePoint<F>) {
        self.points.push(point);
    }

    /// Remove and return the tie point at `index`.
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> TiePoint<F> {
        self.points.remove(index)
    }

    /// Number of tie points, including partially placed ones.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the set holds no tie points at all.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The tie point at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&TiePoint<F>> {
        self.points.get(index)
    }

    /// Mutable access to the tie point at `index`, if any.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut TiePoint<F>> {
        self.points.get_mut(index)
    }

    /// Iterate over all tie points in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, TiePoint<F>> {
        self.points.iter()
    }

    /// Number of valid tie points (this decides the transform family).
    pub fn valid_count(&self) -> usize {
        self.points.iter().filter(|point| point.is_valid()).count()
    }

    /// The valid subset as paired `(image, map)` coordinate lists, in
    /// insertion order.
    ///
    /// Partially placed and non-finite tie points are skipped. An empty
    /// result is not an error.
    pub fn valid_pairs(&self) -> (Vec<Vector2<F>>, Vec<Vector2<F>>) {
        self.points
            .iter()
            .filter(|point| point.is_valid())
            .filter_map(|point| point.image.zip(point.map))
            .unzip()
    }
}

impl<F: Float> std::ops::Index<usize> for TiePointSet<F> {
    type Output = TiePoint<F>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl<F: Float> FromIterator<TiePoint<F>> for TiePointSet<F> {
    fn from_iter<I: IntoIterator<Item = TiePoint<F>>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl<F: Float> Extend<TiePoint<F>> for TiePointSet<F> {
    fn extend<I: IntoIterator<Item = TiePoint<F>>>(&mut self, iter: I) {
        self.points.extend(iter);
    }
}

impl<'a, F: Float> IntoIterator for &'a TiePointSet<F> {
    type Item = &'a TiePoint<F>;
    type IntoIter = std::slice::Iter<'a, TiePoint<F>>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl<F: Float> IntoIterator for TiePointSet<F> {
    type Item = TiePoint<F>;
    type IntoIter = std::vec::IntoIter<TiePoint<F>>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}
