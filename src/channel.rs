use std::fmt;

use ndarray::{concatenate, Array2, ArrayView2, Axis};

use crate::error::{Result, TransformError};
use crate::event::EVENT_COLUMNS;

/// Normalise `(t, p)` event lists to the `(t, p, x, y)` layout.
///
/// Two-column input gets zero `x` and `y` columns appended; four-column
/// input passes through unchanged. Anything else is an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ToChannelHeightWidth;

impl ToChannelHeightWidth {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(&self, events: ArrayView2<i64>) -> Result<Array2<i64>> {
        match events.ncols() {
            2 => {
                let zeros = Array2::<i64>::zeros((events.nrows(), 2));
                concatenate(Axis(1), &[events.view(), zeros.view()])
                    .map_err(|e| TransformError::ShapeMismatch(e.to_string()))
            }
            EVENT_COLUMNS => Ok(events.to_owned()),
            found => Err(TransformError::WrongColumnCount { found }),
        }
    }
}

impl fmt::Display for ToChannelHeightWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ToChannelHeightWidth()")
    }
}
