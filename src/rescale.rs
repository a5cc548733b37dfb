use std::fmt;

use ndarray::ArrayD;

use crate::tensor::Tensor;

/// Multiply every element by a constant factor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rescale {
    factor: f32,
}

impl Rescale {
    pub fn new(factor: f32) -> Self {
        Self { factor }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn apply(&self, chunks: &ArrayD<f32>) -> ArrayD<f32> {
        chunks * self.factor
    }

    /// Scale a tensor in place, keeping its device.
    pub fn apply_tensor(&self, mut chunks: Tensor) -> Tensor {
        chunks.data *= self.factor;
        chunks
    }
}

impl fmt::Display for Rescale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rescale({})", self.factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Device;
    use ndarray::arr2;

    #[test]
    fn test_rescale_array() {
        let out = Rescale::new(0.5).apply(&arr2(&[[2.0f32, 4.0], [6.0, 0.0]]).into_dyn());
        assert_eq!(out, arr2(&[[1.0f32, 2.0], [3.0, 0.0]]).into_dyn());
    }

    #[test]
    fn test_rescale_tensor_keeps_device() {
        let t = Tensor::new(arr2(&[[1.0f32, -2.0]]).into_dyn(), Device::Cuda(1));
        let out = Rescale::new(3.0).apply_tensor(t);
        assert_eq!(out.data, arr2(&[[3.0f32, -6.0]]).into_dyn());
        assert_eq!(out.device, Device::Cuda(1));
    }

    #[test]
    fn test_display() {
        assert_eq!(Rescale::new(0.25).to_string(), "Rescale(0.25)");
    }
}
