// Small dense linear algebra for the normal equations.
//
// The systems solved here have one row per coefficient (a few dozen at
// most), so plain row-major storage is enough.

/// A square matrix, stored row-major.
#[derive(PartialEq, Debug, Clone)]
pub(crate) struct SquareMatrix {
    pub(crate) dim: usize,
    pub(crate) data: Vec<f64>,
}

impl SquareMatrix {
    pub(crate) fn zeros(dim: usize) -> SquareMatrix {
        SquareMatrix {
            dim,
            data: vec![0.0; dim * dim],
        }
    }

    pub(crate) fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.dim + j]
    }

    pub(crate) fn set(&mut self, i: usize, j: usize, v: f64) {
        self.data[i * self.dim + j] = v;
    }

    pub(crate) fn add_to(&mut self, i: usize, j: usize, v: f64) {
        self.data[i * self.dim + j] += v;
    }

    /// x' A x
    pub(crate) fn quad_form(&self, x: &[f64]) -> f64 {
        let mut acc = 0.0;
        for i in 0..self.dim {
            let row = &self.data[i * self.dim..(i + 1) * self.dim];
            acc += x[i] * dot(row, x);
        }
        acc
    }
}

/// The lower triangular Cholesky factor L of a symmetric positive definite
/// matrix A = L L'.
#[derive(PartialEq, Debug, Clone)]
pub(crate) struct Cholesky {
    l: SquareMatrix,
}

impl Cholesky {
    /// Returns `None` if the matrix is not positive definite.
    pub(crate) fn decompose(a: &SquareMatrix) -> Option<Cholesky> {
        let n = a.dim;
        let mut l = SquareMatrix::zeros(n);
        for j in 0..n {
            let mut d = a.get(j, j);
            for k in 0..j {
                d -= l.get(j, k) * l.get(j, k);
            }
            if !(d > 0.0 && d.is_finite()) {
                return None;
            }
            let ljj = d.sqrt();
            l.set(j, j, ljj);
            for i in (j + 1)..n {
                let mut s = a.get(i, j);
                for k in 0..j {
                    s -= l.get(i, k) * l.get(j, k);
                }
                l.set(i, j, s / ljj);
            }
        }
        Some(Cholesky { l })
    }

    /// Solves L x = b.
    pub(crate) fn solve_lower(&self, b: &[f64]) -> Vec<f64> {
        let n = self.l.dim;
        let mut x = b.to_vec();
        for i in 0..n {
            for k in 0..i {
                x[i] -= self.l.get(i, k) * x[k];
            }
            x[i] /= self.l.get(i, i);
        }
        x
    }

    /// Solves L' x = b.
    pub(crate) fn solve_upper(&self, b: &[f64]) -> Vec<f64> {
        let n = self.l.dim;
        let mut x = b.to_vec();
        for i in (0..n).rev() {
            for k in (i + 1)..n {
                x[i] -= self.l.get(k, i) * x[k];
            }
            x[i] /= self.l.get(i, i);
        }
        x
    }

    /// Solves A x = b.
    pub(crate) fn solve(&self, b: &[f64]) -> Vec<f64> {
        self.solve_upper(&self.solve_lower(b))
    }

    /// log det A
    pub(crate) fn log_det(&self) -> f64 {
        2.0 * (0..self.l.dim).map(|i| self.l.get(i, i).ln()).sum::<f64>()
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn spd() -> SquareMatrix {
        SquareMatrix {
            dim: 3,
            data: vec![4.0, 2.0, 0.4, 2.0, 5.0, 1.0, 0.4, 1.0, 3.0],
        }
    }

    #[test]
    fn solves_spd_system() {
        let a = spd();
        let chol = Cholesky::decompose(&a).unwrap();
        let x = chol.solve(&[1.0, 2.0, 3.0]);
        for i in 0..3 {
            let row = &a.data[i * 3..(i + 1) * 3];
            assert_abs_diff_eq!(dot(row, &x), (i + 1) as f64, epsilon = 1e-12);
        }
        // det = 4*(15-1) - 2*(6-0.4) + 0.4*(2-2) = 44.8
        assert_abs_diff_eq!(chol.log_det(), 44.8f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(a.quad_form(&[1.0, 0.0, 1.0]), 7.8, epsilon = 1e-12);
    }

    #[test]
    fn rejects_indefinite_matrix() {
        let a = SquareMatrix {
            dim: 2,
            data: vec![1.0, 2.0, 2.0, 1.0],
        };
        assert!(Cholesky::decompose(&a).is_none());
    }
}
