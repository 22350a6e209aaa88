//! Tensor-product Lagrange shape functions on the reference hyper-cube.
//!
//! A cell of degree p carries (p+1)^D nodes on an equally spaced grid in
//! [-1, 1]^D. Shape functions are products of 1D Lagrange polynomials:
//! ```text
//! N_k(ξ) = Π_d L_{i_d(k)}(ξ_d)
//! ```
//!
//! # Node Numbering
//!
//! Lexicographic, first axis running fastest. For p = 1 in 2D:
//! ```text
//!     2-------3
//!     |       |
//!     |       |
//!     0-------1
//! ```
//! and in 3D nodes 4..7 repeat this pattern on the ζ = +1 face.

use super::FaceSide;
use crate::error::{Error, Result};
use crate::tensor::Vector;

/// Highest polynomial degree with a matching Gauss rule.
pub const MAX_DEGREE: usize = 3;

/// Lagrange element of degree `p` on the reference cell [-1, 1]^D.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorLagrange<const D: usize> {
    degree: usize,
}

impl<const D: usize> TensorLagrange<D> {
    /// Create a Lagrange element of the given polynomial degree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for degree 0 or above [`MAX_DEGREE`].
    pub fn new(degree: usize) -> Result<Self> {
        if degree == 0 || degree > MAX_DEGREE {
            return Err(Error::Configuration(format!(
                "polynomial degree {} is not supported (1 to {} available)",
                degree, MAX_DEGREE
            )));
        }
        Ok(Self { degree })
    }

    /// Polynomial degree.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Nodes per direction (p + 1).
    pub fn nodes_per_axis(&self) -> usize {
        self.degree + 1
    }

    /// Number of nodes per cell, (p+1)^D.
    pub fn n_nodes(&self) -> usize {
        self.nodes_per_axis().pow(D as u32)
    }

    /// Gauss points per direction that integrate the element exactly on affine cells.
    pub fn quadrature_order(&self) -> usize {
        self.degree + 1
    }

    /// Per-axis grid index of a local node.
    pub fn node_index(&self, node: usize) -> [usize; D] {
        let n = self.nodes_per_axis();
        let mut index = [0; D];
        let mut rest = node;
        for i in index.iter_mut() {
            *i = rest % n;
            rest /= n;
        }
        index
    }

    /// Local node from its per-axis grid index.
    pub fn node_from_index(&self, index: &[usize; D]) -> usize {
        let n = self.nodes_per_axis();
        index.iter().rev().fold(0, |acc, &i| acc * n + i)
    }

    /// Natural coordinates of a local node.
    pub fn node_coords(&self, node: usize) -> [f64; D] {
        let index = self.node_index(node);
        let mut coords = [0.0; D];
        for (c, &i) in coords.iter_mut().zip(index.iter()) {
            *c = self.grid_point(i);
        }
        coords
    }

    /// Local nodes lying on the face `axis = ±1`.
    pub fn face_nodes(&self, axis: usize, side: FaceSide) -> Vec<usize> {
        let fixed = match side {
            FaceSide::Lower => 0,
            FaceSide::Upper => self.degree,
        };
        (0..self.n_nodes())
            .filter(|&k| self.node_index(k)[axis] == fixed)
            .collect()
    }

    /// Shape function values N_k(ξ).
    pub fn shape_values(&self, xi: &[f64; D]) -> Vec<f64> {
        let per_axis: Vec<Vec<f64>> = xi.iter().map(|&x| self.values_1d(x)).collect();
        (0..self.n_nodes())
            .map(|k| {
                self.node_index(k)
                    .iter()
                    .enumerate()
                    .map(|(d, &i)| per_axis[d][i])
                    .product()
            })
            .collect()
    }

    /// Shape function gradients ∂N_k/∂ξ in natural coordinates.
    pub fn shape_gradients(&self, xi: &[f64; D]) -> Vec<Vector<D>> {
        let values: Vec<Vec<f64>> = xi.iter().map(|&x| self.values_1d(x)).collect();
        let derivatives: Vec<Vec<f64>> = xi.iter().map(|&x| self.derivatives_1d(x)).collect();

        (0..self.n_nodes())
            .map(|k| {
                let index = self.node_index(k);
                let mut grad = Vector::<D>::zeros();
                for axis in 0..D {
                    grad[axis] = (0..D)
                        .map(|d| {
                            if d == axis {
                                derivatives[d][index[d]]
                            } else {
                                values[d][index[d]]
                            }
                        })
                        .product();
                }
                grad
            })
            .collect()
    }

    fn grid_point(&self, i: usize) -> f64 {
        -1.0 + 2.0 * i as f64 / self.degree as f64
    }

    /// 1D Lagrange polynomials L_a(x) on the equally spaced grid.
    fn values_1d(&self, x: f64) -> Vec<f64> {
        let n = self.nodes_per_axis();
        (0..n)
            .map(|a| {
                let xa = self.grid_point(a);
                (0..n)
                    .filter(|&b| b != a)
                    .map(|b| {
                        let xb = self.grid_point(b);
                        (x - xb) / (xa - xb)
                    })
                    .product()
            })
            .collect()
    }

    /// Derivatives L_a'(x), by the product rule over the factors of L_a.
    fn derivatives_1d(&self, x: f64) -> Vec<f64> {
        let n = self.nodes_per_axis();
        (0..n)
            .map(|a| {
                let xa = self.grid_point(a);
                (0..n)
                    .filter(|&c| c != a)
                    .map(|c| {
                        let xc = self.grid_point(c);
                        let rest: f64 = (0..n)
                            .filter(|&b| b != a && b != c)
                            .map(|b| {
                                let xb = self.grid_point(b);
                                (x - xb) / (xa - xb)
                            })
                            .product();
                        rest / (xa - xc)
                    })
                    .sum()
            })
            .collect()
    }
}
