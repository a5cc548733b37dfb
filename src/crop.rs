use std::fmt;

use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{Result, TransformError};
use crate::event::{retain_rows, X_COL, Y_COL};

/// Two-sided crop over every column of an event list.
///
/// An event survives only if each of its columns lies in the inclusive range
/// `[low[i], high[i]]`. A single bound is broadcast to all columns. Values are
/// not re-based.
#[derive(Clone, Debug, PartialEq)]
pub struct Crop {
    low: Vec<i64>,
    high: Vec<i64>,
}

impl Crop {
    pub fn new(low: Vec<i64>, high: Vec<i64>) -> Result<Self> {
        if low.is_empty() || low.len() != high.len() {
            return Err(TransformError::InvalidConfig(format!(
                "crop bounds must be non-empty and equal length (low {}, high {})",
                low.len(),
                high.len()
            )));
        }
        if low.iter().zip(&high).any(|(l, h)| l > h) {
            return Err(TransformError::InvalidConfig("crop low must be <= high".into()));
        }
        Ok(Self { low, high })
    }

    pub fn apply(&self, events: ArrayView2<i64>) -> Result<Array2<i64>> {
        let ncols = events.ncols();
        if self.low.len() != 1 && self.low.len() != ncols {
            return Err(TransformError::ShapeMismatch(format!(
                "crop has {} bounds but events have {} columns",
                self.low.len(),
                ncols
            )));
        }
        let bound = |col: usize| -> (i64, i64) {
            if self.low.len() == 1 {
                (self.low[0], self.high[0])
            } else {
                (self.low[col], self.high[col])
            }
        };
        Ok(retain_rows(&events, |row| {
            (0..ncols).all(|col| {
                let (lo, hi) = bound(col);
                let v = events[[row, col]];
                v >= lo && v <= hi
            })
        }))
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Crop(low={:?}, high={:?})", self.low, self.high)
    }
}

/// Crop selected columns to half-open windows and re-base them to zero.
///
/// Columns are processed in `dims` order: rows with `value >= high[i]` or
/// `value < low[i]` in column `dims[i]` are dropped, then `low[i]` is
/// subtracted from that column.
#[derive(Clone, Debug, PartialEq)]
pub struct CropDims {
    low: Vec<i64>,
    high: Vec<i64>,
    dims: Vec<usize>,
}

impl CropDims {
    pub fn new(low: Vec<i64>, high: Vec<i64>, dims: Vec<usize>) -> Result<Self> {
        if low.len() != dims.len() || high.len() != dims.len() {
            return Err(TransformError::InvalidConfig(format!(
                "crop dims needs one bound pair per dim (low {}, high {}, dims {})",
                low.len(),
                high.len(),
                dims.len()
            )));
        }
        Ok(Self { low, high, dims })
    }

    pub fn apply(&self, events: ArrayView2<i64>) -> Result<Array2<i64>> {
        if let Some(&d) = self.dims.iter().find(|&&d| d >= events.ncols()) {
            return Err(TransformError::ShapeMismatch(format!(
                "crop dim {} out of range for {} columns",
                d,
                events.ncols()
            )));
        }
        let mut out = events.to_owned();
        for (i, &d) in self.dims.iter().enumerate() {
            let (lo, hi) = (self.low[i], self.high[i]);
            let view = out.view();
            out = retain_rows(&view, |row| {
                let v = view[[row, d]];
                v >= lo && v < hi
            });
            out.column_mut(d).mapv_inplace(|v| v - lo);
        }
        Ok(out)
    }
}

impl fmt::Display for CropDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CropDims(low={:?}, high={:?}, dims={:?})",
            self.low, self.high, self.dims
        )
    }
}

/// Fixed window of `size[1] x size[2]` pixels centred on `center`.
///
/// Spatial columns are translated so the window corner becomes the origin;
/// events outside `[0, size[1]) x [0, size[2])` are dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct CropCenter {
    center: [i64; 2],
    window: [i64; 2],
    translation: [i64; 2],
}

impl CropCenter {
    /// - `center`: `(x, y)` centre of the window.
    /// - `size`: `[C, H, W]`; the window spans `H` along x and `W` along y.
    pub fn new(center: [i64; 2], size: [usize; 3]) -> Result<Self> {
        if size[1] == 0 || size[2] == 0 {
            return Err(TransformError::InvalidConfig("crop window must be positive".into()));
        }
        let window = [size[1] as i64, size[2] as i64];
        let translation = [center[0] - window[0] / 2, center[1] - window[1] / 2];
        Ok(Self {
            center,
            window,
            translation,
        })
    }

    pub fn apply(&self, events: ArrayView2<i64>) -> Result<Array2<i64>> {
        if events.ncols() <= Y_COL {
            return Err(TransformError::WrongColumnCount {
                found: events.ncols(),
            });
        }
        let mut shifted = events.to_owned();
        for (k, col) in [X_COL, Y_COL].into_iter().enumerate() {
            let shift = self.translation[k];
            shifted.column_mut(col).mapv_inplace(|v| v - shift);
        }
        let view = shifted.view();
        let kept = retain_rows(&view, |row| {
            let x = view[[row, X_COL]];
            let y = view[[row, Y_COL]];
            (0..self.window[0]).contains(&x) && (0..self.window[1]).contains(&y)
        });
        tracing::trace!(
            dropped = events.len_of(Axis(0)) - kept.nrows(),
            "crop center"
        );
        Ok(kept)
    }
}

impl fmt::Display for CropCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CropCenter(center={:?}, size={:?})",
            self.center, self.window
        )
    }
}
