//! Composable transforms that turn event-camera streams into fixed-size tensors.
//!
//! Events arrive as `(t, p, x, y)` rows in an `Array2<i64>`, sorted by time.
//! Geometric stages crop and re-address them, binning stages turn them into
//! `(T, C, H, W)` count frames, and the remaining stages cast, rescale and
//! temporally filter those frames or prepare the matching labels. Stages are
//! chained with [`Compose`].

pub mod attention;
pub mod channel;
pub mod config;
pub mod count_frame;
pub mod crop;
pub mod downsample;
pub mod error;
pub mod event;
pub mod jitter;
pub mod labels;
pub mod pipeline;
pub mod rescale;
pub mod temporal_filter;
pub mod tensor;

pub use config::{PipelineConfig, TransformConfig};
pub use error::{Result, TransformError};
pub use event::Event;
pub use pipeline::{Compose, Sample, Transform};
pub use tensor::{Device, Tensor};

/// Maximum allowed frame height or width, to prevent excessive memory allocation.
pub const MAX_SENSOR_DIM: usize = 32768;
