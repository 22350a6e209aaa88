//! Fixed-size tensor types for finite-strain kinematics.
//!
//! This module defines the tensor vocabulary used throughout the crate:
//! - Rank-2 tensors ([`Tensor2`]) as nalgebra static matrices
//! - Rank-4 tensors ([`Tensor4`]) as nested fixed-size arrays
//! - Contractions, symmetrization and determinant
//!
//! The spatial dimension is a const generic `D`; the solver is instantiated
//! for `D = 2` and `D = 3`.

use nalgebra::{DMatrix, SMatrix, SVector};
use std::ops::{Add, Index, IndexMut, Mul, Sub};

/// Rank-2 tensor in `D` dimensions.
pub type Tensor2<const D: usize> = SMatrix<f64, D, D>;

/// Vector in `D` dimensions (positions, gradients, normals, tractions).
pub type Vector<const D: usize> = SVector<f64, D>;

/// Symmetric part ½(A + Aᵀ).
pub fn symmetrize<const D: usize>(a: &Tensor2<D>) -> Tensor2<D> {
    (a + a.transpose()) * 0.5
}

/// Double contraction A : B = Σ A_ij B_ij.
pub fn double_contract<const D: usize>(a: &Tensor2<D>, b: &Tensor2<D>) -> f64 {
    let mut sum = 0.0;
    for i in 0..D {
        for j in 0..D {
            sum += a[(i, j)] * b[(i, j)];
        }
    }
    sum
}

/// Determinant of a rank-2 tensor.
///
/// Closed forms for 1, 2 and 3 dimensions; nalgebra's LU otherwise.
pub fn determinant<const D: usize>(a: &Tensor2<D>) -> f64 {
    match D {
        1 => a[(0, 0)],
        2 => a[(0, 0)] * a[(1, 1)] - a[(0, 1)] * a[(1, 0)],
        3 => {
            a[(0, 0)] * (a[(1, 1)] * a[(2, 2)] - a[(1, 2)] * a[(2, 1)])
                - a[(0, 1)] * (a[(1, 0)] * a[(2, 2)] - a[(1, 2)] * a[(2, 0)])
                + a[(0, 2)] * (a[(1, 0)] * a[(2, 1)] - a[(1, 1)] * a[(2, 0)])
        }
        _ => DMatrix::from_column_slice(D, D, a.as_slice()).determinant(),
    }
}

/// Rank-4 tensor in `D` dimensions, indexed as `t[(i, j, k, l)]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tensor4<const D: usize> {
    data: [[[[f64; D]; D]; D]; D],
}

impl<const D: usize> Tensor4<D> {
    /// Zero tensor.
    pub fn zeros() -> Self {
        Self {
            data: [[[[0.0; D]; D]; D]; D],
        }
    }

    /// Dyadic product A ⊗ B, (A ⊗ B)_ijkl = A_ij B_kl.
    pub fn outer(a: &Tensor2<D>, b: &Tensor2<D>) -> Self {
        let mut t = Self::zeros();
        for i in 0..D {
            for j in 0..D {
                for k in 0..D {
                    for l in 0..D {
                        t.data[i][j][k][l] = a[(i, j)] * b[(k, l)];
                    }
                }
            }
        }
        t
    }

    /// I ⊗ I, components δ_ij δ_kl.
    pub fn identity_dyad() -> Self {
        let identity = Tensor2::<D>::identity();
        Self::outer(&identity, &identity)
    }

    /// Fourth-order symmetric identity 𝕊, components ½(δ_ik δ_jl + δ_il δ_jk).
    pub fn symmetric_identity() -> Self {
        let delta = |a: usize, b: usize| if a == b { 1.0 } else { 0.0 };
        let mut t = Self::zeros();
        for i in 0..D {
            for j in 0..D {
                for k in 0..D {
                    for l in 0..D {
                        t.data[i][j][k][l] =
                            0.5 * (delta(i, k) * delta(j, l) + delta(i, l) * delta(j, k));
                    }
                }
            }
        }
        t
    }

    /// Right double contraction, (𝔸 : B)_ij = Σ 𝔸_ijkl B_kl.
    pub fn ddot(&self, b: &Tensor2<D>) -> Tensor2<D> {
        let mut out = Tensor2::<D>::zeros();
        for i in 0..D {
            for j in 0..D {
                let mut sum = 0.0;
                for k in 0..D {
                    for l in 0..D {
                        sum += self.data[i][j][k][l] * b[(k, l)];
                    }
                }
                out[(i, j)] = sum;
            }
        }
        out
    }

    /// Largest absolute component.
    pub fn max_abs(&self) -> f64 {
        let mut max = 0.0_f64;
        for i in 0..D {
            for j in 0..D {
                for k in 0..D {
                    for l in 0..D {
                        max = max.max(self.data[i][j][k][l].abs());
                    }
                }
            }
        }
        max
    }

    /// Checks 𝔸_ijkl = 𝔸_jikl = 𝔸_ijlk within `tol`.
    pub fn has_minor_symmetry(&self, tol: f64) -> bool {
        let mut ok = true;
        for i in 0..D {
            for j in 0..D {
                for k in 0..D {
                    for l in 0..D {
                        let v = self.data[i][j][k][l];
                        ok &= (v - self.data[j][i][k][l]).abs() <= tol;
                        ok &= (v - self.data[i][j][l][k]).abs() <= tol;
                    }
                }
            }
        }
        ok
    }

    /// Checks 𝔸_ijkl = 𝔸_klij within `tol`.
    pub fn has_major_symmetry(&self, tol: f64) -> bool {
        let mut ok = true;
        for i in 0..D {
            for j in 0..D {
                for k in 0..D {
                    for l in 0..D {
                        ok &= (self.data[i][j][k][l] - self.data[k][l][i][j]).abs() <= tol;
                    }
                }
            }
        }
        ok
    }

    fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        let mut t = *self;
        for i in 0..D {
            for j in 0..D {
                for k in 0..D {
                    for l in 0..D {
                        t.data[i][j][k][l] = f(self.data[i][j][k][l], other.data[i][j][k][l]);
                    }
                }
            }
        }
        t
    }
}

impl<const D: usize> Default for Tensor4<D> {
    fn default() -> Self {
        Self::zeros()
    }
}

impl<const D: usize> Index<(usize, usize, usize, usize)> for Tensor4<D> {
    type Output = f64;

    fn index(&self, (i, j, k, l): (usize, usize, usize, usize)) -> &f64 {
        &self.data[i][j][k][l]
    }
}

impl<const D: usize> IndexMut<(usize, usize, usize, usize)> for Tensor4<D> {
    fn index_mut(&mut self, (i, j, k, l): (usize, usize, usize, usize)) -> &mut f64 {
        &mut self.data[i][j][k][l]
    }
}

impl<const D: usize> Add for Tensor4<D> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.zip_with(&rhs, |a, b| a + b)
    }
}

impl<const D: usize> Sub for Tensor4<D> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.zip_with(&rhs, |a, b| a - b)
    }
}

impl<const D: usize> Mul<f64> for Tensor4<D> {
    type Output = Self;

    fn mul(self, scale: f64) -> Self {
        self.zip_with(&self, |a, _| a * scale)
    }
}
