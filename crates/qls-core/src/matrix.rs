//! Dense complex matrices used as density-matrix samples.

use crate::error::{QlsError, Result};

/// Double-precision complex number.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    pub const fn real(re: f64) -> Self {
        Self { re, im: 0.0 }
    }

    pub fn conj(self) -> Self {
        Self {
            re: self.re,
            im: -self.im,
        }
    }

    /// |z|²
    pub fn norm_sqr(self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    pub fn is_finite(self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }
}

/// Square complex matrix stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityMatrix {
    dim: usize,
    data: Vec<Complex>,
}

impl DensityMatrix {
    /// Build from row-major data of shape `rows x cols`.
    ///
    /// Fails with a data format error unless the shape is square, non-empty,
    /// matches the data length and every entry is finite.
    pub fn from_shape(rows: usize, cols: usize, data: Vec<Complex>) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(QlsError::data_format(format!(
                "matrix has an empty dimension ({rows}x{cols})"
            )));
        }
        if rows != cols {
            return Err(QlsError::data_format(format!(
                "density matrix must be square, got {rows}x{cols}"
            )));
        }
        let expected = rows
            .checked_mul(cols)
            .ok_or_else(|| QlsError::data_format(format!("matrix shape {rows}x{cols} overflows")))?;
        if data.len() != expected {
            return Err(QlsError::data_format(format!(
                "matrix data has {} entries, expected {expected}",
                data.len()
            )));
        }
        if let Some(pos) = data.iter().position(|z| !z.is_finite()) {
            return Err(QlsError::data_format(format!(
                "matrix entry ({}, {}) is not finite",
                pos / cols,
                pos % cols
            )));
        }
        Ok(Self { dim: rows, data })
    }

    /// Build from nested rows of real values.
    pub fn from_real_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|r| r.len() != n_cols) {
            return Err(QlsError::data_format("ragged matrix rows"));
        }
        let data = rows
            .iter()
            .flat_map(|r| r.iter().copied().map(Complex::real))
            .collect();
        Self::from_shape(n_rows, n_cols, data)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, row: usize, col: usize) -> Complex {
        self.data[row * self.dim + col]
    }

    /// Re tr(ρ·ρ†).
    ///
    /// tr(A·A†) = Σ_ij |a_ij|², so this is the squared Frobenius norm. For a
    /// physical density matrix it equals the state purity.
    pub fn trace_rho_rho_dagger(&self) -> f64 {
        self.data.iter().map(|z| z.norm_sqr()).sum()
    }

    /// Trace of the matrix.
    pub fn trace(&self) -> Complex {
        (0..self.dim).fold(Complex::default(), |acc, i| {
            let z = self.get(i, i);
            Complex::new(acc.re + z.re, acc.im + z.im)
        })
    }

    /// Largest |a_ij − conj(a_ji)|, zero for Hermitian input.
    pub fn hermitian_defect(&self) -> f64 {
        let mut worst = 0.0f64;
        for i in 0..self.dim {
            for j in i..self.dim {
                let a = self.get(i, j);
                let b = self.get(j, i).conj();
                let d = Complex::new(a.re - b.re, a.im - b.im).norm_sqr().sqrt();
                worst = worst.max(d);
            }
        }
        worst
    }
}
