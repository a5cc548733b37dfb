use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransformError};

/// Compute device a tensor is placed on.
///
/// Arithmetic always runs on the host; the device is a placement label that
/// transforms combining two tensors (e.g. a kernel and its input) must agree on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    #[default]
    Cpu,
    Cuda(u32),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(index) => write!(f, "cuda:{}", index),
        }
    }
}

impl FromStr for Device {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|idx| idx.parse().ok())
                .map(Device::Cuda)
                .ok_or_else(|| TransformError::InvalidConfig(format!("unknown device {other:?}"))),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = TransformError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

/// Dense floating point tensor plus the device it lives on.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    pub data: ArrayD<f32>,
    pub device: Device,
}

impl Tensor {
    pub fn new(data: ArrayD<f32>, device: Device) -> Self {
        Self { data, device }
    }

    pub fn zeros(shape: &[usize], device: Device) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)), device)
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Move the tensor to another device.
    pub fn to(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}

/// Cast a dense numeric array into an f32 [`Tensor`] on a given device.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToTensor {
    device: Device,
}

impl ToTensor {
    pub fn new(device: Device) -> Self {
        Self { device }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Convert any numeric array losslessly representable as f32 counts.
    pub fn apply<A>(&self, frame: &ArrayD<A>) -> Tensor
    where
        A: Copy + Into<f64>,
    {
        Tensor::new(frame.mapv(|v| v.into() as f32), self.device)
    }

    /// Convert labels or event addresses. Magnitudes above 2^24 lose precision.
    pub fn apply_integers(&self, values: &ArrayD<i64>) -> Tensor {
        Tensor::new(values.mapv(|v| v as f32), self.device)
    }
}

impl fmt::Display for ToTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ToTensor(device:{})", self.device)
    }
}
