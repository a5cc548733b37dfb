use std::fmt;

use ndarray::{Array2, ArrayView2};

use crate::error::{Result, TransformError};

/// Integer-divide every event field, reducing address and time resolution.
///
/// A single factor applies to all columns; otherwise one factor per column.
/// Division floors, matching the address arithmetic of the loaders.
#[derive(Clone, Debug, PartialEq)]
pub struct Downsample {
    factor: Vec<i64>,
}

impl Downsample {
    /// # Errors
    /// Fails if `factor` is empty or any factor is not positive.
    pub fn new(factor: Vec<i64>) -> Result<Self> {
        if factor.is_empty() || factor.iter().any(|&f| f <= 0) {
            return Err(TransformError::InvalidConfig(
                "downsample factors must be positive".into(),
            ));
        }
        Ok(Self { factor })
    }

    pub fn uniform(factor: i64) -> Result<Self> {
        Self::new(vec![factor])
    }

    pub fn factor(&self) -> &[i64] {
        &self.factor
    }

    pub fn apply(&self, events: ArrayView2<i64>) -> Result<Array2<i64>> {
        let mut out = events.to_owned();
        match self.factor.as_slice() {
            [f] => out.mapv_inplace(|v| v.div_euclid(*f)),
            per_col if per_col.len() == out.ncols() => {
                for (mut col, &f) in out.columns_mut().into_iter().zip(per_col) {
                    col.mapv_inplace(|v| v.div_euclid(f));
                }
            }
            per_col => {
                return Err(TransformError::ShapeMismatch(format!(
                    "{} downsample factors for {} columns",
                    per_col.len(),
                    out.ncols()
                )))
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Downsample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.factor.as_slice() {
            [dt, dp, dx, dy] => write!(f, "Downsample(dt = {dt}, dp = {dp}, dx = {dx}, dy = {dy})"),
            factor => write!(f, "Downsample(factor = {:?})", factor),
        }
    }
}
