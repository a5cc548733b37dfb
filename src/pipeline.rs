use std::fmt;

use ndarray::{Array2, ArrayD};

use crate::attention::Attention;
use crate::channel::ToChannelHeightWidth;
use crate::count_frame::{ToCountFrame, ToEventSum};
use crate::crop::{Crop, CropCenter, CropDims};
use crate::downsample::Downsample;
use crate::error::{Result, TransformError};
use crate::jitter::Jitter;
use crate::labels::{Repeat, ToOneHot};
use crate::rescale::Rescale;
use crate::temporal_filter::{ExpFilterEvents, FilterEvents};
use crate::tensor::{Tensor, ToTensor};

/// Value flowing between pipeline stages.
#[derive(Clone, Debug, PartialEq)]
pub enum Sample {
    /// `(n, 4)` or `(n, 2)` event list.
    Events(Array2<i64>),
    /// Integer count frames from a binning stage.
    Counts(ArrayD<i32>),
    /// Floating point array not yet placed on a device.
    Dense(ArrayD<f32>),
    Tensor(Tensor),
    /// Integer class labels.
    Labels(ArrayD<i64>),
}

impl Sample {
    pub fn kind(&self) -> &'static str {
        match self {
            Sample::Events(_) => "events",
            Sample::Counts(_) => "counts",
            Sample::Dense(_) => "dense",
            Sample::Tensor(_) => "tensor",
            Sample::Labels(_) => "labels",
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Sample::Events(a) => a.shape(),
            Sample::Counts(a) => a.shape(),
            Sample::Dense(a) => a.shape(),
            Sample::Tensor(t) => t.shape(),
            Sample::Labels(a) => a.shape(),
        }
    }

    /// Flatten the payload to f64 values in logical order.
    pub fn values(&self) -> Vec<f64> {
        match self {
            Sample::Events(a) => a.iter().map(|&v| v as f64).collect(),
            Sample::Counts(a) => a.iter().map(|&v| v as f64).collect(),
            Sample::Dense(a) => a.iter().map(|&v| v as f64).collect(),
            Sample::Tensor(t) => t.data.iter().map(|&v| v as f64).collect(),
            Sample::Labels(a) => a.iter().map(|&v| v as f64).collect(),
        }
    }
}

impl From<Array2<i64>> for Sample {
    fn from(events: Array2<i64>) -> Self {
        Sample::Events(events)
    }
}

impl From<Tensor> for Sample {
    fn from(tensor: Tensor) -> Self {
        Sample::Tensor(tensor)
    }
}

/// One pipeline stage. The set of stages is closed; dispatch is a plain match.
#[derive(Clone, Debug, PartialEq)]
pub enum Transform {
    Jitter(Jitter),
    Crop(Crop),
    CropDims(CropDims),
    CropCenter(CropCenter),
    Attention(Attention),
    ToChannelHeightWidth(ToChannelHeightWidth),
    Downsample(Downsample),
    ToCountFrame(ToCountFrame),
    ToEventSum(ToEventSum),
    FilterEvents(FilterEvents),
    ExpFilterEvents(ExpFilterEvents),
    Rescale(Rescale),
    Repeat(Repeat),
    ToOneHot(ToOneHot),
    ToTensor(ToTensor),
}

impl Transform {
    pub fn name(&self) -> &'static str {
        match self {
            Transform::Jitter(_) => "Jitter",
            Transform::Crop(_) => "Crop",
            Transform::CropDims(_) => "CropDims",
            Transform::CropCenter(_) => "CropCenter",
            Transform::Attention(_) => "Attention",
            Transform::ToChannelHeightWidth(_) => "ToChannelHeightWidth",
            Transform::Downsample(_) => "Downsample",
            Transform::ToCountFrame(_) => "ToCountFrame",
            Transform::ToEventSum(_) => "ToEventSum",
            Transform::FilterEvents(_) => "FilterEvents",
            Transform::ExpFilterEvents(_) => "ExpFilterEvents",
            Transform::Rescale(_) => "Rescale",
            Transform::Repeat(_) => "Repeat",
            Transform::ToOneHot(_) => "ToOneHot",
            Transform::ToTensor(_) => "ToTensor",
        }
    }

    pub fn apply(&self, sample: Sample) -> Result<Sample> {
        match (self, sample) {
            (Transform::Crop(t), Sample::Events(e)) => t.apply(e.view()).map(Sample::Events),
            (Transform::CropDims(t), Sample::Events(e)) => t.apply(e.view()).map(Sample::Events),
            (Transform::CropCenter(t), Sample::Events(e)) => t.apply(e.view()).map(Sample::Events),
            (Transform::Attention(t), Sample::Events(e)) => t.apply(e.view()).map(Sample::Events),
            (Transform::ToChannelHeightWidth(t), Sample::Events(e)) => {
                t.apply(e.view()).map(Sample::Events)
            }
            (Transform::Downsample(t), Sample::Events(e)) => t.apply(e.view()).map(Sample::Events),
            (Transform::ToCountFrame(t), Sample::Events(e)) => {
                t.apply(e.view()).map(|c| Sample::Counts(c.into_dyn()))
            }
            (Transform::ToEventSum(t), Sample::Events(e)) => {
                t.apply(e.view()).map(|c| Sample::Counts(c.into_dyn()))
            }

            (Transform::Jitter(t), Sample::Tensor(x)) => t.apply(x).map(Sample::Tensor),
            (Transform::FilterEvents(t), Sample::Tensor(x)) => t.apply(&x).map(Sample::Tensor),
            (Transform::ExpFilterEvents(t), Sample::Tensor(x)) => t.apply(&x).map(Sample::Tensor),

            (Transform::Rescale(t), Sample::Counts(c)) => {
                Ok(Sample::Dense(t.apply(&c.mapv(|v| v as f32))))
            }
            (Transform::Rescale(t), Sample::Dense(d)) => Ok(Sample::Dense(t.apply(&d))),
            (Transform::Rescale(t), Sample::Tensor(x)) => Ok(Sample::Tensor(t.apply_tensor(x))),

            (Transform::ToTensor(t), Sample::Counts(c)) => Ok(Sample::Tensor(t.apply(&c))),
            (Transform::ToTensor(t), Sample::Dense(d)) => Ok(Sample::Tensor(t.apply(&d))),
            (Transform::ToTensor(t), Sample::Tensor(x)) => Ok(Sample::Tensor(x.to(t.device()))),
            (Transform::ToTensor(t), Sample::Labels(l)) => Ok(Sample::Tensor(t.apply_integers(&l))),
            (Transform::ToTensor(t), Sample::Events(e)) => {
                Ok(Sample::Tensor(t.apply_integers(&e.into_dyn())))
            }

            (Transform::Repeat(t), Sample::Labels(l)) => {
                t.apply(&l).map(|r| Sample::Labels(r.into_dyn()))
            }
            (Transform::ToOneHot(t), Sample::Labels(l)) => t.apply(&l).map(Sample::Tensor),

            (stage, other) => Err(TransformError::UnexpectedInput {
                transform: stage.to_string(),
                expected: stage.expected_input(),
                found: other.kind(),
            }),
        }
    }

    fn expected_input(&self) -> &'static str {
        match self {
            Transform::Crop(_)
            | Transform::CropDims(_)
            | Transform::CropCenter(_)
            | Transform::Attention(_)
            | Transform::ToChannelHeightWidth(_)
            | Transform::Downsample(_)
            | Transform::ToCountFrame(_)
            | Transform::ToEventSum(_) => "events",
            Transform::Jitter(_) | Transform::FilterEvents(_) | Transform::ExpFilterEvents(_) => {
                "tensor"
            }
            Transform::Rescale(_) => "counts, dense or tensor",
            Transform::ToTensor(_) => "an array",
            Transform::Repeat(_) | Transform::ToOneHot(_) => "labels",
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Jitter(t) => fmt::Display::fmt(t, f),
            Transform::Crop(t) => fmt::Display::fmt(t, f),
            Transform::CropDims(t) => fmt::Display::fmt(t, f),
            Transform::CropCenter(t) => fmt::Display::fmt(t, f),
            Transform::Attention(t) => fmt::Display::fmt(t, f),
            Transform::ToChannelHeightWidth(t) => fmt::Display::fmt(t, f),
            Transform::Downsample(t) => fmt::Display::fmt(t, f),
            Transform::ToCountFrame(t) => fmt::Display::fmt(t, f),
            Transform::ToEventSum(t) => fmt::Display::fmt(t, f),
            Transform::FilterEvents(t) => fmt::Display::fmt(t, f),
            Transform::ExpFilterEvents(t) => fmt::Display::fmt(t, f),
            Transform::Rescale(t) => fmt::Display::fmt(t, f),
            Transform::Repeat(t) => fmt::Display::fmt(t, f),
            Transform::ToOneHot(t) => fmt::Display::fmt(t, f),
            Transform::ToTensor(t) => fmt::Display::fmt(t, f),
        }
    }
}

macro_rules! impl_from_stage {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Transform {
                fn from(stage: $variant) -> Self {
                    Transform::$variant(stage)
                }
            }
        )*
    };
}

impl_from_stage!(
    Jitter,
    Crop,
    CropDims,
    CropCenter,
    Attention,
    ToChannelHeightWidth,
    Downsample,
    ToCountFrame,
    ToEventSum,
    FilterEvents,
    ExpFilterEvents,
    Rescale,
    Repeat,
    ToOneHot,
    ToTensor,
);

/// Ordered chain of transforms applied front to back.
///
/// The output of each stage is the input of the next; the first failing
/// stage aborts the chain and its error is returned unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Compose {
    stages: Vec<Transform>,
}

impl Compose {
    pub fn new(stages: Vec<Transform>) -> Self {
        Self { stages }
    }

    /// Append a stage, builder style.
    pub fn then(mut self, stage: impl Into<Transform>) -> Self {
        self.stages.push(stage.into());
        self
    }

    pub fn stages(&self) -> &[Transform] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn apply(&self, sample: Sample) -> Result<Sample> {
        self.stages.iter().try_fold(sample, |sample, stage| {
            tracing::debug!(
                stage = stage.name(),
                input = sample.kind(),
                shape = ?sample.shape(),
                "applying transform"
            );
            stage.apply(sample)
        })
    }
}

impl fmt::Display for Compose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compose(")?;
        for stage in &self.stages {
            writeln!(f, "    {}", stage)?;
        }
        write!(f, ")")
    }
}
