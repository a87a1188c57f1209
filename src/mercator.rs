//! Spherical Web Mercator conversions between longitude/latitude, projected
//! meters, and global pixel coordinates.
//!
//! Map-side tie point coordinates are projected meters in this system; these
//! helpers convert between that plane and what hosts usually hand out
//! (degrees, or pixel positions at a zoom level). The solver itself is
//! agnostic to the projection and only ever sees numeric coordinate pairs.

use nalgebra::Vector2;

use crate::Float;

/// WGS84 equatorial radius in meters.
const EARTH_RADIUS: f64 = 6378137.;

/// Side length of a map tile in pixels.
const TILE_SIZE: f64 = 256.;

/// Meters of easting covered by 180 degrees of longitude.
fn origin_shift<F: Float>() -> F {
    F::from_f64(2. * std::f64::consts::PI * (EARTH_RADIUS / 2.)).unwrap()
}

fn meters_per_degree<F: Float>() -> F {
    origin_shift::<F>() / F::from_f64(180.).unwrap()
}

/// Project a `(lon, lat)` degree pair to Mercator meters.
pub fn lon_lat_to_meters<F: Float>(lon_lat: Vector2<F>) -> Vector2<F> {
    let deg = F::from_f64(180.).unwrap();
    let full_circle = F::from_f64(360.).unwrap();
    let ninety = F::from_f64(90.).unwrap();

    let mx = lon_lat.x * meters_per_degree::<F>();
    let stretched = ((ninety + lon_lat.y) * F::pi() / full_circle).tan().ln() / (F::pi() / deg);
    let my = stretched * meters_per_degree::<F>();
    Vector2::new(mx, my)
}

/// Unproject Mercator meters back to a `(lon, lat)` degree pair.
pub fn meters_to_lon_lat<F: Float>(meters: Vector2<F>) -> Vector2<F> {
    let deg = F::from_f64(180.).unwrap();
    let full_circle = F::from_f64(360.).unwrap();
    let ninety = F::from_f64(90.).unwrap();

    let lon = meters.x / meters_per_degree::<F>();
    let stretched = meters.y / meters_per_degree::<F>();
    let lat = (stretched * (F::pi() / deg)).exp().atan() * full_circle / F::pi() - ninety;
    Vector2::new(lon, lat)
}

/// Meters per pixel at a zoom level.
pub fn resolution<F: Float>(zoom: u32) -> F {
    let initial = F::from_f64(2. * std::f64::consts::PI * EARTH_RADIUS / TILE_SIZE).unwrap();
    initial / F::from_f64(2.).unwrap().powi(zoom as i32)
}

/// Convert a global pixel coordinate at `zoom` to Mercator meters.
///
/// Pixel y grows downward from the top of the world tile, meters y grows
/// northward, hence the sign flip.
pub fn pixels_to_meters<F: Float>(pixel: Vector2<F>, zoom: u32) -> Vector2<F> {
    let res = resolution::<F>(zoom);
    let shift = origin_shift::<F>();
    Vector2::new(pixel.x * res - shift, -(pixel.y * res) + shift)
}

/// Convert Mercator meters to a global pixel coordinate at `zoom`.
pub fn meters_to_pixels<F: Float>(meters: Vector2<F>, zoom: u32) -> Vector2<F> {
    let res = resolution::<F>(zoom);
    let shift = origin_shift::<F>();
    Vector2::new((meters.x + shift) / res, (-meters.y + shift) / res)
}
