use crate::mrio::ingest::error::{IngestError, Result};

/// Dense row-major `f64` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

/// Zero-safe division: a zero denominator yields 0 instead of NaN/Inf.
pub fn div0(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if rows * cols != data.len() {
            return Err(IngestError::structure(
                "matrix",
                format!("{} values cannot fill a {rows}x{cols} matrix", data.len()),
            ));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(size: usize) -> Self {
        let mut matrix = Self::zeros(size, size);
        for i in 0..size {
            matrix.data[i * size + i] = 1.0;
        }
        matrix
    }

    /// Builds a matrix from equally long rows.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(IngestError::structure(
                    "matrix",
                    format!("row {idx} has {} values, expected {cols}", row.len()),
                ));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Square matrix with `values` on the diagonal.
    pub fn diagonal(values: &[f64]) -> Self {
        let mut matrix = Self::zeros(values.len(), values.len());
        for (i, value) in values.iter().enumerate() {
            matrix.data[i * values.len() + i] = *value;
        }
        matrix
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

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn add_at(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] += value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.rows).map(|r| self.row(r).iter().sum()).collect()
    }

    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.cols];
        for r in 0..self.rows {
            for (sum, value) in sums.iter_mut().zip(self.row(r)) {
                *sum += value;
            }
        }
        sums
    }

    pub fn transpose(&self) -> Self {
        let mut out = Self::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        out
    }

    pub fn matmul(&self, other: &Matrix) -> Result<Self> {
        if self.cols != other.rows {
            return Err(IngestError::structure(
                "matrix",
                format!(
                    "cannot multiply {}x{} by {}x{}",
                    self.rows, self.cols, other.rows, other.cols
                ),
            ));
        }
        let mut out = Self::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            for k in 0..self.cols {
                let lhs = self.data[r * self.cols + k];
                if lhs == 0.0 {
                    continue;
                }
                let out_row = &mut out.data[r * other.cols..(r + 1) * other.cols];
                for (cell, rhs) in out_row.iter_mut().zip(other.row(k)) {
                    *cell += lhs * rhs;
                }
            }
        }
        Ok(out)
    }

    pub fn sub(&self, other: &Matrix) -> Result<Self> {
        self.zip_with(other, |lhs, rhs| lhs - rhs)
    }

    /// Element-wise zero-safe division.
    pub fn div0(&self, other: &Matrix) -> Result<Self> {
        self.zip_with(other, div0)
    }

    fn zip_with(&self, other: &Matrix, op: impl Fn(f64, f64) -> f64) -> Result<Self> {
        if self.shape() != other.shape() {
            return Err(IngestError::structure(
                "matrix",
                format!("shape {:?} does not match {:?}", self.shape(), other.shape()),
            ));
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(lhs, rhs)| op(*lhs, *rhs))
            .collect();
        Ok(Self {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    /// Scales column `c` by `factors[c]`, i.e. `self · diag(factors)`.
    pub fn scale_columns(&self, factors: &[f64]) -> Result<Self> {
        if factors.len() != self.cols {
            return Err(IngestError::structure(
                "matrix",
                format!("{} factors for {} columns", factors.len(), self.cols),
            ));
        }
        let mut out = self.clone();
        for r in 0..self.rows {
            for (cell, factor) in out.data[r * self.cols..(r + 1) * self.cols]
                .iter_mut()
                .zip(factors)
            {
                *cell *= factor;
            }
        }
        Ok(out)
    }

    pub fn take_rows(&self, rows: &[usize]) -> Self {
        let mut data = Vec::with_capacity(rows.len() * self.cols);
        for r in rows {
            data.extend_from_slice(self.row(*r));
        }
        Self {
            rows: rows.len(),
            cols: self.cols,
            data,
        }
    }

    pub fn take_cols(&self, cols: &[usize]) -> Self {
        let mut data = Vec::with_capacity(self.rows * cols.len());
        for r in 0..self.rows {
            let row = self.row(r);
            data.extend(cols.iter().map(|c| row[*c]));
        }
        Self {
            rows: self.rows,
            cols: cols.len(),
            data,
        }
    }

    pub fn hstack(&self, other: &Matrix) -> Result<Self> {
        if self.rows != other.rows {
            return Err(IngestError::structure(
                "matrix",
                format!("cannot stack {} rows beside {} rows", other.rows, self.rows),
            ));
        }
        let mut data = Vec::with_capacity(self.data.len() + other.data.len());
        for r in 0..self.rows {
            data.extend_from_slice(self.row(r));
            data.extend_from_slice(other.row(r));
        }
        Ok(Self {
            rows: self.rows,
            cols: self.cols + other.cols,
            data,
        })
    }

    pub fn vstack(&self, other: &Matrix) -> Result<Self> {
        if self.cols != other.cols {
            return Err(IngestError::structure(
                "matrix",
                format!("cannot stack {} columns under {} columns", other.cols, self.cols),
            ));
        }
        let mut data = self.data.clone();
        data.extend_from_slice(&other.data);
        Ok(Self {
            rows: self.rows + other.rows,
            cols: self.cols,
            data,
        })
    }

    /// Maximum absolute column sum.
    pub fn norm1(&self) -> f64 {
        let mut sums = vec![0.0_f64; self.cols];
        for r in 0..self.rows {
            for (sum, value) in sums.iter_mut().zip(self.row(r)) {
                *sum += value.abs();
            }
        }
        sums.into_iter().fold(0.0, f64::max)
    }

    /// Gauss-Jordan inversion with partial pivoting. Returns `None` when a
    /// pivot vanishes.
    pub fn inverse(&self) -> Result<Option<Self>> {
        if !self.is_square() {
            return Err(IngestError::structure(
                "matrix",
                format!("cannot invert a {}x{} matrix", self.rows, self.cols),
            ));
        }
        let n = self.rows;
        let mut work = self.clone();
        let mut inv = Self::identity(n);
        let tolerance = f64::EPSILON * self.norm1().max(1.0) * n.max(1) as f64;

        for col in 0..n {
            let pivot_row = (col..n)
                .max_by(|a, b| {
                    work.get(*a, col)
                        .abs()
                        .total_cmp(&work.get(*b, col).abs())
                })
                .unwrap_or(col);
            let pivot = work.get(pivot_row, col);
            if !pivot.is_finite() || pivot.abs() <= tolerance {
                return Ok(None);
            }
            if pivot_row != col {
                work.swap_rows(pivot_row, col);
                inv.swap_rows(pivot_row, col);
            }
            for c in 0..n {
                work.data[col * n + c] /= pivot;
                inv.data[col * n + c] /= pivot;
            }
            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = work.get(r, col);
                if factor == 0.0 {
                    continue;
                }
                for c in 0..n {
                    let work_pivot = work.data[col * n + c];
                    let inv_pivot = inv.data[col * n + c];
                    work.data[r * n + c] -= factor * work_pivot;
                    inv.data[r * n + c] -= factor * inv_pivot;
                }
            }
        }
        Ok(Some(inv))
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        for c in 0..self.cols {
            self.data.swap(a * self.cols + c, b * self.cols + c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_of_simple_matrix() {
        let m = Matrix::from_rows(vec![vec![4.0, 7.0], vec![2.0, 6.0]]).unwrap();
        let inv = m.inverse().unwrap().unwrap();
        let product = m.matmul(&inv).unwrap();
        for r in 0..2 {
            for c in 0..2 {
                let expected = if r == c { 1.0 } else { 0.0 };
                assert!((product.get(r, c) - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        let m = Matrix::from_rows(vec![vec![1.0, 2.0], vec![2.0, 4.0]]).unwrap();
        assert!(m.inverse().unwrap().is_none());
    }

    #[test]
    fn div0_never_produces_nan() {
        let zeros = Matrix::zeros(2, 2);
        let out = zeros.div0(&zeros).unwrap();
        assert!(out.data().iter().all(|v| *v == 0.0));
    }
}
