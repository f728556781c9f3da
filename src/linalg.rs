//! Dense row-major matrices and the small set of factorizations the networks
//! need: LU solves, Moore-Penrose pseudo-inverse, and spectral norms.
//!
//! [`Mat`] is generic over [`Scalar`] so the same forward-pass code runs on
//! plain `f64` and on tape-recorded [`crate::Reverse`] values. The numeric
//! kernels (LU, pseudo-inverse, power iteration) operate on `f64` only; they
//! run once at construction time and their results enter the forward pass as
//! constants.

use crate::error::LpgdError;
use crate::scalar::Scalar;

/// Dense row-major matrix.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mat<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Scalar> Mat<T> {
    /// Matrix of zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Mat {
            rows,
            cols,
            data: vec![T::zero(); rows * cols],
        }
    }

    /// Build from a generator called as `f(row, col)`.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Mat { rows, cols, data }
    }

    /// Build from a flat row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "buffer of length {} cannot fill a {}x{} matrix",
            data.len(),
            rows,
            cols
        );
        Mat { rows, cols, data }
    }

    /// Build from nested rows. All rows must have equal length.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Self {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for row in rows {
            assert_eq!(row.len(), n_cols, "ragged rows");
            data.extend(row);
        }
        Mat {
            rows: n_rows,
            cols: n_cols,
            data,
        }
    }

    /// Identity matrix.
    pub fn eye(n: usize) -> Self {
        Mat::from_fn(n, n, |i, j| if i == j { T::one() } else { T::zero() })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col] = value;
    }

    /// Borrow one row as a slice.
    #[inline]
    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Iterate over rows as slices.
    pub fn rows_iter(&self) -> impl Iterator<Item = &[T]> {
        self.data.chunks(self.cols.max(1))
    }

    /// Flat row-major view of the entries.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Transpose.
    pub fn t(&self) -> Mat<T> {
        Mat::from_fn(self.cols, self.rows, |i, j| self.get(j, i))
    }

    /// Matrix product `self · rhs`.
    pub fn matmul(&self, rhs: &Mat<T>) -> Mat<T> {
        assert_eq!(
            self.cols, rhs.rows,
            "matmul shape mismatch: {}x{} . {}x{}",
            self.rows, self.cols, rhs.rows, rhs.cols
        );
        let mut out = Mat::zeros(self.rows, rhs.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let aik = self.data[i * self.cols + k];
                let lhs_row = &rhs.data[k * rhs.cols..(k + 1) * rhs.cols];
                let out_row = &mut out.data[i * rhs.cols..(i + 1) * rhs.cols];
                for (o, &b) in out_row.iter_mut().zip(lhs_row) {
                    *o = *o + aik * b;
                }
            }
        }
        out
    }

    /// Elementwise sum.
    pub fn add(&self, rhs: &Mat<T>) -> Mat<T> {
        self.zip_map(rhs, |a, b| a + b)
    }

    /// Elementwise difference.
    pub fn sub(&self, rhs: &Mat<T>) -> Mat<T> {
        self.zip_map(rhs, |a, b| a - b)
    }

    /// Multiply every entry by `s`.
    pub fn scale(&self, s: T) -> Mat<T> {
        self.map(|v| v * s)
    }

    /// Apply `f` to every entry.
    pub fn map(&self, f: impl Fn(T) -> T) -> Mat<T> {
        Mat {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Apply `f` pairwise; shapes must agree.
    pub fn zip_map(&self, rhs: &Mat<T>, f: impl Fn(T, T) -> T) -> Mat<T> {
        assert_eq!(
            self.shape(),
            rhs.shape(),
            "elementwise shape mismatch: {}x{} vs {}x{}",
            self.rows,
            self.cols,
            rhs.rows,
            rhs.cols
        );
        Mat {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(rhs.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }

    /// First differences along each row, shape `(rows, cols - 1)`.
    pub fn diff_rows(&self) -> Mat<T> {
        Mat::from_fn(self.rows, self.cols.saturating_sub(1), |i, j| {
            self.get(i, j + 1) - self.get(i, j)
        })
    }

    /// Cumulative sum along each row (the atom axis).
    pub fn cumsum_rows(&self) -> Mat<T> {
        let mut out = self.clone();
        for i in 0..self.rows {
            for j in 1..self.cols {
                let prev = out.data[i * self.cols + j - 1];
                out.data[i * self.cols + j] = out.data[i * self.cols + j] + prev;
            }
        }
        out
    }

    /// Sum of all entries.
    pub fn sum(&self) -> T {
        self.data.iter().fold(T::zero(), |acc, &v| acc + v)
    }

    /// Strip derivative information, keeping primal values.
    pub fn values(&self) -> Mat<T::Float> {
        Mat {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|v| v.value()).collect(),
        }
    }
}

impl Mat<f64> {
    /// Lift plain values into any scalar type as constants.
    pub fn lift<T: Scalar<Float = f64>>(&self) -> Mat<T> {
        Mat {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| T::from_f(v)).collect(),
        }
    }
}

/// LU factorization with partial pivoting, `P·A = L·U`.
pub struct LuFactors {
    lu: Mat<f64>,
    perm: Vec<usize>,
    n: usize,
}

/// Factor a square matrix. Returns `None` if it is numerically singular.
pub fn lu_factor(a: &Mat<f64>) -> Option<LuFactors> {
    let (m, n) = a.shape();
    assert_eq!(m, n, "LU factorization requires a square matrix, got {m}x{n}");
    let mut lu = a.clone();
    let mut perm: Vec<usize> = (0..n).collect();

    let max_abs = lu.data().iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    let tol = f64::EPSILON * (n.max(1) as f64) * max_abs.max(1.0);

    for col in 0..n {
        // Pivot search.
        let mut pivot_row = col;
        let mut pivot_val = lu.get(col, col).abs();
        for row in col + 1..n {
            let v = lu.get(row, col).abs();
            if v > pivot_val {
                pivot_val = v;
                pivot_row = row;
            }
        }
        if pivot_val <= tol {
            return None;
        }
        if pivot_row != col {
            for j in 0..n {
                let a = lu.get(col, j);
                let b = lu.get(pivot_row, j);
                lu.set(col, j, b);
                lu.set(pivot_row, j, a);
            }
            perm.swap(col, pivot_row);
        }
        // Elimination.
        let inv_pivot = 1.0 / lu.get(col, col);
        for row in col + 1..n {
            let factor = lu.get(row, col) * inv_pivot;
            lu.set(row, col, factor);
            for j in col + 1..n {
                let v = lu.get(row, j) - factor * lu.get(col, j);
                lu.set(row, j, v);
            }
        }
    }
    Some(LuFactors { lu, perm, n })
}

impl LuFactors {
    /// Solve `A·x = b` using the stored factors.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        assert_eq!(b.len(), self.n, "right-hand side length mismatch");
        // Forward substitution on the permuted rhs.
        let mut x: Vec<f64> = self.perm.iter().map(|&p| b[p]).collect();
        for i in 1..self.n {
            let mut acc = x[i];
            for j in 0..i {
                acc -= self.lu.get(i, j) * x[j];
            }
            x[i] = acc;
        }
        // Back substitution.
        for i in (0..self.n).rev() {
            let mut acc = x[i];
            for j in i + 1..self.n {
                acc -= self.lu.get(i, j) * x[j];
            }
            x[i] = acc / self.lu.get(i, i);
        }
        x
    }
}

/// One-shot linear solve. Returns `None` for singular systems.
pub fn lu_solve(a: &Mat<f64>, b: &[f64]) -> Option<Vec<f64>> {
    lu_factor(a).map(|f| f.solve(b))
}

fn invert(a: &Mat<f64>) -> Option<Mat<f64>> {
    let n = a.rows();
    let factors = lu_factor(a)?;
    let mut inv = Mat::zeros(n, n);
    let mut e = vec![0.0; n];
    for col in 0..n {
        e[col] = 1.0;
        let x = factors.solve(&e);
        e[col] = 0.0;
        for (row, &v) in x.iter().enumerate() {
            inv.set(row, col, v);
        }
    }
    Some(inv)
}

/// Moore-Penrose pseudo-inverse of a full-rank rectangular matrix.
///
/// Uses the Gram-matrix normal equations: `Aᵀ(A·Aᵀ)⁻¹` for wide-or-square
/// inputs, `(AᵀA)⁻¹Aᵀ` for tall ones. Rank deficiency surfaces as an error
/// rather than a least-squares fallback.
pub fn pinverse(a: &Mat<f64>) -> Result<Mat<f64>, LpgdError> {
    let (m, n) = a.shape();
    let rank_deficient = || LpgdError::RankDeficient { rows: m, cols: n };
    if m <= n {
        let gram = a.matmul(&a.t());
        let gram_inv = invert(&gram).ok_or_else(rank_deficient)?;
        Ok(a.t().matmul(&gram_inv))
    } else {
        let gram = a.t().matmul(a);
        let gram_inv = invert(&gram).ok_or_else(rank_deficient)?;
        Ok(gram_inv.matmul(&a.t()))
    }
}

// Deterministic xorshift generator for power-iteration starting vectors.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        XorShift64 {
            state: seed.max(1),
        }
    }

    fn next_f64(&mut self) -> f64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        (self.state >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Largest singular value of `a`, via power iteration on the smaller Gram
/// matrix. Deterministic: the starting vector comes from a fixed seed.
pub fn spectral_norm(a: &Mat<f64>) -> f64 {
    let (m, n) = a.shape();
    if m == 0 || n == 0 {
        return 0.0;
    }
    let use_left = m <= n; // iterate on A·Aᵀ (m×m) or Aᵀ·A (n×n)
    let dim = m.min(n);

    let mut rng = XorShift64::new(0x9e37_79b9_7f4a_7c15);
    let mut v: Vec<f64> = (0..dim).map(|_| rng.next_f64() + 0.5).collect();
    let norm0 = vec_norm(&v);
    for vi in v.iter_mut() {
        *vi /= norm0;
    }

    let mut lambda = 0.0f64;
    for _ in 0..1000 {
        // w = G·v without forming the Gram matrix.
        let w = if use_left {
            mat_vec(a, &mat_t_vec(a, &v))
        } else {
            mat_t_vec(a, &mat_vec(a, &v))
        };
        let w_norm = vec_norm(&w);
        if w_norm <= f64::MIN_POSITIVE {
            return 0.0;
        }
        let converged = (w_norm - lambda).abs() <= 1e-13 * w_norm;
        lambda = w_norm;
        v = w;
        for vi in v.iter_mut() {
            *vi /= w_norm;
        }
        if converged {
            break;
        }
    }
    lambda.sqrt()
}

fn mat_vec(a: &Mat<f64>, v: &[f64]) -> Vec<f64> {
    let (m, n) = a.shape();
    debug_assert_eq!(v.len(), n);
    let mut out = vec![0.0; m];
    for i in 0..m {
        let row = a.row(i);
        let mut acc = 0.0;
        for j in 0..n {
            acc += row[j] * v[j];
        }
        out[i] = acc;
    }
    out
}

fn mat_t_vec(a: &Mat<f64>, v: &[f64]) -> Vec<f64> {
    let (m, n) = a.shape();
    debug_assert_eq!(v.len(), m);
    let mut out = vec![0.0; n];
    for i in 0..m {
        let row = a.row(i);
        let vi = v[i];
        for j in 0..n {
            out[j] += row[j] * vi;
        }
    }
    out
}

fn vec_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}
