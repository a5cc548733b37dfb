use std::str::FromStr;

use ndarray::{Array2, ArrayView2};

use crate::error::{Result, TransformError};

/// Column holding the timestamp.
pub const T_COL: usize = 0;
/// Column holding the polarity / channel.
pub const P_COL: usize = 1;
/// Column holding the x address.
pub const X_COL: usize = 2;
/// Column holding the y address.
pub const Y_COL: usize = 3;

/// Number of columns in a full `(t, p, x, y)` event list.
pub const EVENT_COLUMNS: usize = 4;

/// Single address event as delivered by the upstream loader.
///
/// Event lists are stored as `Array2<i64>` with one row per event, in the
/// column order given by [`T_COL`], [`P_COL`], [`X_COL`] and [`Y_COL`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Event {
    pub t: i64,
    pub p: i64,
    pub x: i64,
    pub y: i64,
}

impl Event {
    pub fn new(t: i64, p: i64, x: i64, y: i64) -> Self {
        Self { t, p, x, y }
    }

    /// Read an event back out of a 4-column event list.
    pub fn from_row(events: &ArrayView2<i64>, row: usize) -> Self {
        Self {
            t: events[[row, T_COL]],
            p: events[[row, P_COL]],
            x: events[[row, X_COL]],
            y: events[[row, Y_COL]],
        }
    }

    pub fn to_row(&self) -> [i64; EVENT_COLUMNS] {
        [self.t, self.p, self.x, self.y]
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{}\t{}\t{}", self.t, self.p, self.x, self.y)
    }
}

impl FromStr for Event {
    type Err = TransformError;

    /// Parse a whitespace separated `t p x y` line.
    fn from_str(line: &str) -> Result<Self> {
        let fields: Vec<i64> = line
            .split_whitespace()
            .map(|f| {
                f.parse::<i64>()
                    .map_err(|e| TransformError::MalformedEvent(format!("bad field {f:?}: {e}")))
            })
            .collect::<Result<_>>()?;
        match fields.as_slice() {
            [t, p, x, y] => Ok(Event::new(*t, *p, *x, *y)),
            _ => Err(TransformError::WrongColumnCount { found: fields.len() }),
        }
    }
}

/// Pack events into an `(n, 4)` event list.
pub fn events_to_array(events: &[Event]) -> Array2<i64> {
    let flat: Vec<i64> = events.iter().flat_map(|e| e.to_row()).collect();
    Array2::from_shape_vec((events.len(), EVENT_COLUMNS), flat)
        .unwrap_or_else(|_| Array2::zeros((0, EVENT_COLUMNS)))
}

/// Unpack a 4-column event list into records.
pub fn array_to_events(events: &ArrayView2<i64>) -> Result<Vec<Event>> {
    if events.ncols() != EVENT_COLUMNS {
        return Err(TransformError::WrongColumnCount {
            found: events.ncols(),
        });
    }
    Ok((0..events.nrows()).map(|row| Event::from_row(events, row)).collect())
}

/// Keep only the rows for which `keep` returns true.
pub(crate) fn retain_rows<F>(events: &ArrayView2<i64>, mut keep: F) -> Array2<i64>
where
    F: FnMut(usize) -> bool,
{
    let rows: Vec<usize> = (0..events.nrows()).filter(|&row| keep(row)).collect();
    events.select(ndarray::Axis(0), &rows)
}
