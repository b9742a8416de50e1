//! Quad-tree geo indexing for interchange routing.
//!
//! Brokers filter DENM traffic geographically on an 18-level quad-tree key:
//! each digit splits the current cell in four, so the full key addresses a
//! cell of roughly 15 cm at the equator.

/// Number of quad-tree levels in an interchange key.
pub const QUAD_TREE_DEPTH: usize = 18;

/// Computes the 18-digit base-4 quad-tree key for a WGS-84 position.
///
/// Inputs are degrees; values outside [-90, 90] / [-180, 180] are clamped.
/// Pure and deterministic.
///
/// # Examples
///
/// ```
/// use denm_common::geo::quad_tree;
/// let key = quad_tree(57.779017, 12.774981);
/// assert_eq!(key.len(), 18);
/// assert!(key.bytes().all(|b| (b'0'..=b'3').contains(&b)));
/// ```
#[must_use]
pub fn quad_tree(lat: f64, lon: f64) -> String {
    let lat = lat.clamp(-90.0, 90.0);
    let lon = lon.clamp(-180.0, 180.0);

    // Normalize to [0, 1); the exact upper bounds map into the last cell.
    let mut x = ((lon + 180.0) / 360.0).min(f64::from_bits(1.0f64.to_bits() - 1));
    let mut y = ((lat + 90.0) / 180.0).min(f64::from_bits(1.0f64.to_bits() - 1));

    let mut key = String::with_capacity(QUAD_TREE_DEPTH);
    for _ in 0..QUAD_TREE_DEPTH {
        x *= 2.0;
        y *= 2.0;
        let mut digit = 0u8;
        if x >= 1.0 {
            digit |= 1;
            x -= 1.0;
        }
        if y >= 1.0 {
            digit |= 2;
            y -= 1.0;
        }
        key.push(char::from(b'0' + digit));
    }
    key
}
