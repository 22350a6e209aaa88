//! Gauss-Legendre quadrature on the reference hyper-cube [-1, 1]^D.
//!
//! Cell rules are tensor products of the 1D rule; face rules are the same
//! construction over the remaining axes of a cell face, with the face axis
//! pinned to ±1.
//!
//! # Usage
//!
//! ```
//! use hyperfem_core::element::gauss::{gauss_1d, gauss_tensor};
//!
//! // 2-point 1D rule
//! for (xi, w) in gauss_1d(2).unwrap() {
//!     // integrate at point xi with weight w
//! }
//!
//! // 2x2x2 rule on the reference cube
//! for gp in gauss_tensor::<3>(2).unwrap() {
//!     // gp.coords = [ξ, η, ζ], gp.weight is the integration weight
//! }
//! ```

use super::FaceSide;
use crate::error::{Error, Result};

/// A Gauss quadrature point with natural coordinates and weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussPoint<const D: usize> {
    /// Natural coordinates in [-1, 1]^D.
    pub coords: [f64; D],
    /// Integration weight.
    pub weight: f64,
}

impl<const D: usize> GaussPoint<D> {
    /// Create a new Gauss point.
    pub fn new(coords: [f64; D], weight: f64) -> Self {
        Self { coords, weight }
    }
}

/// 1D Gauss-Legendre quadrature points and weights.
///
/// Returns (point, weight) pairs for integration on [-1, 1]. An `n`-point
/// rule integrates polynomials up to degree 2n − 1 exactly.
///
/// # Arguments
///
/// * `n` - Number of integration points (1, 2, 3, or 4)
///
/// # Errors
///
/// Returns [`Error::Configuration`] if `n` is not in 1..=4.
pub fn gauss_1d(n: usize) -> Result<Vec<(f64, f64)>> {
    let rule = match n {
        1 => vec![(0.0, 2.0)],
        2 => {
            let p = 1.0 / 3.0_f64.sqrt();
            vec![(-p, 1.0), (p, 1.0)]
        }
        3 => {
            let p = (3.0 / 5.0_f64).sqrt();
            vec![(-p, 5.0 / 9.0), (0.0, 8.0 / 9.0), (p, 5.0 / 9.0)]
        }
        4 => {
            // Points: ±√((3 ∓ 2√(6/5))/7), weights: (18 ± √30) / 36
            let sqrt_6_5 = (6.0 / 5.0_f64).sqrt();
            let inner = ((3.0 - 2.0 * sqrt_6_5) / 7.0).sqrt();
            let outer = ((3.0 + 2.0 * sqrt_6_5) / 7.0).sqrt();
            let sqrt_30 = 30.0_f64.sqrt();
            let w_inner = (18.0 + sqrt_30) / 36.0;
            let w_outer = (18.0 - sqrt_30) / 36.0;
            vec![(-outer, w_outer), (-inner, w_inner), (inner, w_inner), (outer, w_outer)]
        }
        _ => {
            return Err(Error::Configuration(format!(
                "Gauss-Legendre rule with {} points is not available (1 to 4 supported)",
                n
            )))
        }
    };
    Ok(rule)
}

/// Tensor-product Gauss rule on [-1, 1]^D with `n` points per direction.
///
/// Points are ordered lexicographically with the first coordinate running
/// fastest, the same ordering used for Lagrange nodes.
pub fn gauss_tensor<const D: usize>(n: usize) -> Result<Vec<GaussPoint<D>>> {
    let rule_1d = gauss_1d(n)?;
    let total = n.pow(D as u32);
    let mut points = Vec::with_capacity(total);

    for flat in 0..total {
        let mut coords = [0.0; D];
        let mut weight = 1.0;
        let mut rest = flat;
        for c in coords.iter_mut() {
            let (x, w) = rule_1d[rest % n];
            *c = x;
            weight *= w;
            rest /= n;
        }
        points.push(GaussPoint::new(coords, weight));
    }

    Ok(points)
}

/// Tensor-product Gauss rule on the face `axis = ±1` of the reference cell.
///
/// Returns n^(D−1) points expressed in the cell's D natural coordinates.
/// Weights measure the reference face (they sum to 2^(D−1)).
pub fn gauss_face<const D: usize>(n: usize, axis: usize, side: FaceSide) -> Result<Vec<GaussPoint<D>>> {
    if axis >= D {
        return Err(Error::Mesh(format!(
            "face axis {} out of range for a {}-dimensional cell",
            axis, D
        )));
    }
    let rule_1d = gauss_1d(n)?;
    let total = n.pow(D as u32 - 1);
    let mut points = Vec::with_capacity(total);

    for flat in 0..total {
        let mut coords = [0.0; D];
        let mut weight = 1.0;
        let mut rest = flat;
        for (d, c) in coords.iter_mut().enumerate() {
            if d == axis {
                *c = side.coordinate();
                continue;
            }
            let (x, w) = rule_1d[rest % n];
            *c = x;
            weight *= w;
            rest /= n;
        }
        points.push(GaussPoint::new(coords, weight));
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gauss_1d_integrates_polynomials() {
        // n points integrate x^(2n-2) exactly: ∫_{-1}^{1} x^k dx = 2/(k+1)
        for n in 1..=4 {
            let rule = gauss_1d(n).unwrap();
            let k = 2 * n as i32 - 2;
            let integral: f64 = rule.iter().map(|&(x, w)| x.powi(k) * w).sum();
            assert_relative_eq!(integral, 2.0 / (k as f64 + 1.0), epsilon = 1e-14);
        }
    }

    #[test]
    fn test_gauss_1d_weights_sum() {
        for n in 1..=4 {
            let sum: f64 = gauss_1d(n).unwrap().iter().map(|&(_, w)| w).sum();
            assert_relative_eq!(sum, 2.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_gauss_1d_invalid_n() {
        assert!(matches!(gauss_1d(0), Err(Error::Configuration(_))));
        assert!(gauss_1d(5).is_err());
    }

    #[test]
    fn test_gauss_tensor_point_count_and_volume() {
        let rule = gauss_tensor::<3>(2).unwrap();
        assert_eq!(rule.len(), 8);
        let volume: f64 = rule.iter().map(|gp| gp.weight).sum();
        assert_relative_eq!(volume, 8.0, epsilon = 1e-14);

        let rule = gauss_tensor::<2>(3).unwrap();
        assert_eq!(rule.len(), 9);
        let area: f64 = rule.iter().map(|gp| gp.weight).sum();
        assert_relative_eq!(area, 4.0, epsilon = 1e-14);
    }

    #[test]
    fn test_gauss_tensor_integrates_product() {
        // ∫∫ x² y² dx dy over [-1,1]² = (2/3)²
        let rule = gauss_tensor::<2>(2).unwrap();
        let integral: f64 = rule
            .iter()
            .map(|gp| gp.coords[0].powi(2) * gp.coords[1].powi(2) * gp.weight)
            .sum();
        assert_relative_eq!(integral, 4.0 / 9.0, epsilon = 1e-14);
    }

    #[test]
    fn test_gauss_face_pins_axis() {
        let rule = gauss_face::<3>(2, 1, FaceSide::Upper).unwrap();
        assert_eq!(rule.len(), 4);
        assert!(rule.iter().all(|gp| gp.coords[1] == 1.0));
        let area: f64 = rule.iter().map(|gp| gp.weight).sum();
        assert_relative_eq!(area, 4.0, epsilon = 1e-14);

        let rule = gauss_face::<2>(3, 0, FaceSide::Lower).unwrap();
        assert_eq!(rule.len(), 3);
        assert!(rule.iter().all(|gp| gp.coords[0] == -1.0));
    }

    #[test]
    fn test_gauss_face_invalid_axis() {
        assert!(matches!(
            gauss_face::<2>(2, 2, FaceSide::Lower),
            Err(Error::Mesh(_))
        ));
    }

    #[test]
    fn test_lexicographic_order() {
        let rule = gauss_tensor::<2>(2).unwrap();
        assert!(rule[0].coords[0] < 0.0 && rule[0].coords[1] < 0.0);
        assert!(rule[1].coords[0] > 0.0 && rule[1].coords[1] < 0.0);
        assert!(rule[2].coords[0] < 0.0 && rule[2].coords[1] > 0.0);
    }
}
