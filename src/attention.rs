use std::fmt;

use ndarray::{Array2, ArrayView2};

use crate::error::{Result, TransformError};
use crate::event::{retain_rows, X_COL, Y_COL};

/// Centroid-following crop.
///
/// For every event the median `(x, y)` over the most recent `n_events`
/// events (itself included, fewer at the start of the stream) is computed
/// from the uncropped coordinates. The event is re-addressed relative to a
/// `size[1] x size[2]` window centred on that median and dropped if it falls
/// outside the window.
#[derive(Clone, Debug, PartialEq)]
pub struct Attention {
    n_events: usize,
    window: [i64; 2],
}

impl Attention {
    /// - `size`: `[C, H, W]`; the window spans `H` along x and `W` along y.
    pub fn new(n_events: usize, size: [usize; 3]) -> Result<Self> {
        if n_events == 0 {
            return Err(TransformError::InvalidConfig(
                "attention window needs at least one event".into(),
            ));
        }
        if size[1] == 0 || size[2] == 0 {
            return Err(TransformError::InvalidConfig("attention size must be positive".into()));
        }
        Ok(Self {
            n_events,
            window: [size[1] as i64, size[2] as i64],
        })
    }

    pub fn apply(&self, events: ArrayView2<i64>) -> Result<Array2<i64>> {
        if events.ncols() <= Y_COL {
            return Err(TransformError::WrongColumnCount {
                found: events.ncols(),
            });
        }
        let xs = events.column(X_COL).to_vec();
        let ys = events.column(Y_COL).to_vec();
        let cx = rolling_median(&xs, self.n_events);
        let cy = rolling_median(&ys, self.n_events);

        let mut moved = events.to_owned();
        for row in 0..moved.nrows() {
            moved[[row, X_COL]] -= cx[row] - self.window[0] / 2;
            moved[[row, Y_COL]] -= cy[row] - self.window[1] / 2;
        }

        let view = moved.view();
        Ok(retain_rows(&view, |row| {
            (0..self.window[0]).contains(&view[[row, X_COL]])
                && (0..self.window[1]).contains(&view[[row, Y_COL]])
        }))
    }
}

impl fmt::Display for Attention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attention(n_events={}, size={:?})", self.n_events, self.window)
    }
}

/// Trailing-window median, truncated toward zero.
///
/// Window `i` covers `values[i + 1 - n ..= i]` (clipped at the start). Even
/// windows average their two middle values before truncation. The window is
/// kept sorted and updated by one insert and one removal per step.
fn rolling_median(values: &[i64], n: usize) -> Vec<i64> {
    let mut window: Vec<i64> = Vec::with_capacity(n + 1);
    let mut medians = Vec::with_capacity(values.len());
    for (i, &v) in values.iter().enumerate() {
        let at = window.partition_point(|&w| w < v);
        window.insert(at, v);
        if i >= n {
            let old = values[i - n];
            let at = window.partition_point(|&w| w < old);
            window.remove(at);
        }
        let mid = window.len() / 2;
        medians.push(if window.len() % 2 == 1 {
            window[mid]
        } else {
            ((window[mid - 1] as f64 + window[mid] as f64) / 2.0) as i64
        });
    }
    medians
}
