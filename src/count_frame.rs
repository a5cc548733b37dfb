use std::fmt;

use ndarray::{Array4, ArrayView2, Axis};

use crate::error::{Result, TransformError};
use crate::event::{EVENT_COLUMNS, P_COL, T_COL, X_COL, Y_COL};

/// Default number of time bins.
pub const DEFAULT_BINS: usize = 500;

/// Default `[C, H, W]` frame size.
pub const DEFAULT_SIZE: [usize; 3] = [2, 32, 32];

/// Bin a time-sorted event list into `t_bins` frames of per-cell counts.
///
/// Bin `i` receives the events between the previous boundary and the first
/// timestamp `>= i + upper_offset`. Boundaries are found by binary search
/// over the remaining timestamps. Events past the last boundary are dropped;
/// events before time 0 land in bin 0.
fn bin_events(
    events: &ArrayView2<i64>,
    t_bins: usize,
    size: [usize; 3],
    upper_offset: i64,
) -> Result<Array4<i32>> {
    if events.ncols() != EVENT_COLUMNS {
        return Err(TransformError::WrongColumnCount {
            found: events.ncols(),
        });
    }
    if events.nrows() == 0 {
        return Err(TransformError::EmptyEvents);
    }
    let times = events.column(T_COL).to_vec();
    if let Some(index) = times.windows(2).position(|w| w[1] < w[0]) {
        return Err(TransformError::UnsortedTimestamps { index: index + 1 });
    }

    let [c, h, w] = size;
    let mut chunks = Array4::<i32>::zeros((t_bins, c, h, w));
    let mut idx_start = 0usize;
    let mut idx_end = 0usize;
    for bin in 0..t_bins {
        let boundary = bin as i64 + upper_offset;
        idx_end += times[idx_end..].partition_point(|&t| t < boundary);
        for row in idx_start..idx_end {
            let (p, x, y) = (events[[row, P_COL]], events[[row, X_COL]], events[[row, Y_COL]]);
            let cell = address(p, c)
                .zip(address(x, h))
                .zip(address(y, w))
                .map(|((p, x), y)| (p, x, y));
            match cell {
                Some((p, x, y)) => chunks[[bin, p, x, y]] += 1,
                None => {
                    return Err(TransformError::AddressOutOfRange {
                        index: row,
                        address: vec![p, x, y],
                    })
                }
            }
        }
        idx_start = idx_end;
    }

    tracing::debug!(
        events = times.len(),
        binned = idx_end,
        dropped = times.len() - idx_end,
        "binned events"
    );
    Ok(chunks)
}

fn address(value: i64, extent: usize) -> Option<usize> {
    usize::try_from(value).ok().filter(|&v| v < extent)
}

/// Convert address events into a `(T, C, H, W)` stack of count frames.
///
/// Bin `i` covers timestamps `[i, i + 1)` (bin 0 also takes anything
/// earlier). Counts are not clipped or normalised.
#[derive(Clone, Debug, PartialEq)]
pub struct ToCountFrame {
    t_bins: usize,
    size: [usize; 3],
}

impl ToCountFrame {
    pub fn new(t_bins: usize, size: [usize; 3]) -> Result<Self> {
        validate(t_bins, size)?;
        Ok(Self { t_bins, size })
    }

    pub fn t_bins(&self) -> usize {
        self.t_bins
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    /// # Errors
    /// Empty, unsorted or out-of-frame input is rejected.
    pub fn apply(&self, events: ArrayView2<i64>) -> Result<Array4<i32>> {
        bin_events(&events, self.t_bins, self.size, 1)
    }
}

impl fmt::Display for ToCountFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ToCountFrame(T={})", self.t_bins)
    }
}

/// Convert address events into a single `(1, C, H, W)` event-count image.
///
/// Bins like [`ToCountFrame`] but closes bin `i` at `i` instead of `i + 1`,
/// so an event stamped exactly `i` is counted with bin `i + 1`, and events at
/// `T - 1` or later are dropped. The bins are then summed over time.
#[derive(Clone, Debug, PartialEq)]
pub struct ToEventSum {
    t_bins: usize,
    size: [usize; 3],
}

impl ToEventSum {
    pub fn new(t_bins: usize, size: [usize; 3]) -> Result<Self> {
        validate(t_bins, size)?;
        Ok(Self { t_bins, size })
    }

    pub fn apply(&self, events: ArrayView2<i64>) -> Result<Array4<i32>> {
        let chunks = bin_events(&events, self.t_bins, self.size, 0)?;
        Ok(chunks.sum_axis(Axis(0)).insert_axis(Axis(0)))
    }
}

impl fmt::Display for ToEventSum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ToEventSum(T={})", self.t_bins)
    }
}

fn validate(t_bins: usize, size: [usize; 3]) -> Result<()> {
    if t_bins == 0 {
        return Err(TransformError::InvalidConfig("need at least one time bin".into()));
    }
    if size.iter().any(|&d| d == 0) {
        return Err(TransformError::InvalidConfig(format!(
            "frame size must be positive, got {size:?}"
        )));
    }
    if size[1] > crate::MAX_SENSOR_DIM || size[2] > crate::MAX_SENSOR_DIM {
        return Err(TransformError::InvalidConfig(format!(
            "frame size {size:?} exceeds maximum sensor dimension"
        )));
    }
    Ok(())
}
