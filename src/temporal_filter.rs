use std::fmt;

use ndarray::{Array1, Array5, Axis, Ix5};

use crate::error::{Result, TransformError};
use crate::tensor::{Device, Tensor};

/// Grouped temporal convolution over binned event tensors.
///
/// The kernel has shape `(out_channels, in_channels / groups, K, 1, 1)`;
/// its spatial extent is a single pixel, so every pixel is filtered along
/// time only. Input is `(T, C, H, W)` or `(N, T, C, H, W)`; the time axis is
/// zero-padded by `tpad` on both sides and the output has
/// `T + 2 * tpad - K + 1` bins. Like a conv layer this is a
/// cross-correlation: output bin `t` sees input bins `t - tpad ..= t - tpad + K - 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterEvents {
    kernel: Array5<f32>,
    groups: usize,
    tpad: usize,
    device: Device,
}

impl FilterEvents {
    /// `tpad` defaults to `K / 2`.
    pub fn new(kernel: Array5<f32>, groups: usize, tpad: Option<usize>, device: Device) -> Result<Self> {
        let (out_channels, _, k, kh, kw) = kernel.dim();
        if groups == 0 || out_channels % groups != 0 {
            return Err(TransformError::InvalidConfig(format!(
                "kernel has {out_channels} output channels, not divisible into {groups} groups"
            )));
        }
        if k == 0 || kh != 1 || kw != 1 {
            return Err(TransformError::InvalidConfig(format!(
                "temporal kernel must be (C, C/groups, K, 1, 1), got {:?}",
                kernel.shape()
            )));
        }
        Ok(Self {
            kernel,
            groups,
            tpad: tpad.unwrap_or(k / 2),
            device,
        })
    }

    pub fn kernel(&self) -> &Array5<f32> {
        &self.kernel
    }

    pub fn groups(&self) -> usize {
        self.groups
    }

    pub fn tpad(&self) -> usize {
        self.tpad
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn apply(&self, chunks: &Tensor) -> Result<Tensor> {
        if chunks.device != self.device {
            return Err(TransformError::DeviceMismatch {
                kernel: self.device.to_string(),
                input: chunks.device.to_string(),
            });
        }
        let batched = match chunks.data.ndim() {
            4 => chunks.data.view().insert_axis(Axis(0)),
            5 => chunks.data.view(),
            _ => {
                return Err(TransformError::ShapeMismatch(format!(
                    "temporal filter expects (T, C, H, W) or (N, T, C, H, W), got {:?}",
                    chunks.shape()
                )))
            }
        };
        let data = batched
            .into_dimensionality::<Ix5>()
            .map_err(|e| TransformError::ShapeMismatch(e.to_string()))?;

        let (n, t_in, c_in, h, w) = data.dim();
        let (c_out, c_per_group, k, _, _) = self.kernel.dim();
        if c_in != c_per_group * self.groups {
            return Err(TransformError::ShapeMismatch(format!(
                "input has {c_in} channels, kernel expects {} ({} groups x {c_per_group})",
                c_per_group * self.groups,
                self.groups
            )));
        }
        let padded = t_in + 2 * self.tpad;
        if padded < k {
            return Err(TransformError::ShapeMismatch(format!(
                "{t_in} time bins (padded to {padded}) shorter than kernel length {k}"
            )));
        }
        let t_out = padded - k + 1;
        let out_per_group = c_out / self.groups;

        let mut out = Array5::<f32>::zeros((n, t_out, c_out, h, w));
        for oc in 0..c_out {
            let group = oc / out_per_group;
            for icl in 0..c_per_group {
                let ic = group * c_per_group + icl;
                for tap in 0..k {
                    let weight = self.kernel[[oc, icl, tap, 0, 0]];
                    if weight == 0.0 {
                        continue;
                    }
                    for to in 0..t_out {
                        // Source bin in unpadded coordinates; outside is zero padding.
                        let src = to + tap;
                        if src < self.tpad || src - self.tpad >= t_in {
                            continue;
                        }
                        let ti = src - self.tpad;
                        for b in 0..n {
                            let input = data.slice(ndarray::s![b, ti, ic, .., ..]);
                            out.slice_mut(ndarray::s![b, to, oc, .., ..])
                                .scaled_add(weight, &input);
                        }
                    }
                }
            }
        }

        let out = if chunks.data.ndim() == 4 {
            out.index_axis_move(Axis(0), 0).into_dyn()
        } else {
            out.into_dyn()
        };
        tracing::trace!(shape = ?out.shape(), "temporal filter");
        Ok(Tensor::new(out, self.device))
    }
}

impl fmt::Display for FilterEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FilterEvents(kernel={:?}, groups={}, tpad={})",
            self.kernel.shape(),
            self.groups,
            self.tpad
        )
    }
}

/// Leaky-integrator filter built from an exponential decay kernel.
///
/// The kernel is `exp(-t / tau)` for `t = 0..length`, normalised to sum to 1
/// and reversed in time so the correlation weights recent bins most. Each of
/// the `channels` channels is filtered independently (`groups = channels`).
#[derive(Clone, Debug, PartialEq)]
pub struct ExpFilterEvents {
    tau: f64,
    filter: FilterEvents,
}

impl ExpFilterEvents {
    pub fn new(length: usize, tau: f64, channels: usize, tpad: Option<usize>, device: Device) -> Result<Self> {
        if length == 0 || channels == 0 {
            return Err(TransformError::InvalidConfig(
                "exponential kernel needs a positive length and channel count".into(),
            ));
        }
        if tau.is_nan() || tau <= 0.0 {
            return Err(TransformError::InvalidConfig(format!("tau must be positive, got {tau}")));
        }
        let taps = exp_kernel(length, tau);
        let mut kernel = Array5::<f32>::zeros((channels, 1, length, 1, 1));
        for ch in 0..channels {
            for (tap, &v) in taps.iter().enumerate() {
                kernel[[ch, 0, tap, 0, 0]] = v;
            }
        }
        let filter = FilterEvents::new(kernel, channels, tpad, device)?;
        Ok(Self { tau, filter })
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    pub fn filter(&self) -> &FilterEvents {
        &self.filter
    }

    pub fn apply(&self, chunks: &Tensor) -> Result<Tensor> {
        self.filter.apply(chunks)
    }
}

impl fmt::Display for ExpFilterEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (channels, _, length, _, _) = self.filter.kernel.dim();
        write!(
            f,
            "ExpFilterEvents(length={}, tau={}, channels={}, tpad={}, device={})",
            length, self.tau, channels, self.filter.tpad, self.filter.device
        )
    }
}

/// Normalised, time-reversed `exp(-t / tau)` taps.
fn exp_kernel(length: usize, tau: f64) -> Array1<f32> {
    let decay = Array1::from_iter((0..length).map(|t| (-(t as f64) / tau).exp()));
    let total = decay.sum();
    decay.iter().rev().map(|&v| (v / total) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    /// Zero tensor with an impulse at `(t, c, h, w)`.
    fn impulse(shape: [usize; 4], at: [usize; 4]) -> Tensor {
        let mut data = ArrayD::<f32>::zeros(IxDyn(&shape));
        data[IxDyn(&at)] = 1.0;
        Tensor::new(data, Device::Cpu)
    }

    #[test]
    fn test_exp_kernel_normalised_and_reversed() {
        let k = exp_kernel(5, 200.0).to_vec();
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        for pair in k.windows(2) {
            assert!(pair[0] <= pair[1], "reversed decay must be non-decreasing");
        }
    }

    #[test]
    fn test_exp_filter_impulse_response_decays() {
        let filt = ExpFilterEvents::new(5, 200.0, 2, None, Device::Cpu).unwrap();
        let out = filt.apply(&impulse([8, 2, 3, 3], [0, 1, 2, 2])).unwrap();
        assert_eq!(out.shape(), &[8, 2, 3, 3]);
        let response: Vec<f32> = (0..8).map(|t| out.data[[t, 1, 2, 2]]).collect();
        for pair in response.windows(2) {
            assert!(pair[1] <= pair[0], "response {response:?} must not increase");
        }
        assert!(response[0] > 0.0);
        // Other channel and pixels untouched.
        assert_eq!(out.data[[0, 0, 2, 2]], 0.0);
        assert_eq!(out.data[[0, 1, 0, 0]], 0.0);
    }

    #[test]
    fn test_exp_filter_full_kernel_sums_to_one() {
        // Padding by K - 1 exposes every tap of the kernel to the impulse.
        let filt = ExpFilterEvents::new(5, 200.0, 2, Some(4), Device::Cpu).unwrap();
        let out = filt.apply(&impulse([6, 2, 1, 1], [0, 0, 0, 0])).unwrap();
        let total: f32 = out.data.index_axis(Axis(1), 0).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_constant_input_preserved_in_interior() {
        let filt = ExpFilterEvents::new(3, 2.0, 1, None, Device::Cpu).unwrap();
        let data = ArrayD::<f32>::from_elem(IxDyn(&[6, 1, 2, 2]), 4.0);
        let out = filt.apply(&Tensor::new(data, Device::Cpu)).unwrap();
        for t in 1..5 {
            assert!((out.data[[t, 0, 1, 1]] - 4.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_explicit_kernel_shifts_time() {
        // A single trailing tap without padding reads one bin ahead and trims K - 1 bins.
        let mut kernel = Array5::<f32>::zeros((1, 1, 2, 1, 1));
        kernel[[0, 0, 1, 0, 0]] = 1.0;
        let filt = FilterEvents::new(kernel, 1, Some(0), Device::Cpu).unwrap();
        let out = filt.apply(&impulse([4, 1, 1, 1], [2, 0, 0, 0])).unwrap();
        assert_eq!(out.shape(), &[3, 1, 1, 1]);
        assert_eq!(out.data[[1, 0, 0, 0]], 1.0);
    }

    #[test]
    fn test_five_dimensional_batch() {
        let filt = ExpFilterEvents::new(3, 10.0, 2, None, Device::Cpu).unwrap();
        let data = ArrayD::<f32>::ones(IxDyn(&[2, 5, 2, 2, 2]));
        let out = filt.apply(&Tensor::new(data, Device::Cpu)).unwrap();
        assert_eq!(out.shape(), &[2, 5, 2, 2, 2]);
    }

    #[test]
    fn test_device_mismatch() {
        let filt = ExpFilterEvents::new(3, 10.0, 2, None, Device::Cuda(0)).unwrap();
        let err = filt.apply(&impulse([4, 2, 1, 1], [0, 0, 0, 0])).unwrap_err();
        assert!(matches!(err, TransformError::DeviceMismatch { .. }));
    }

    #[test]
    fn test_channel_mismatch() {
        let filt = ExpFilterEvents::new(3, 10.0, 2, None, Device::Cpu).unwrap();
        let err = filt.apply(&impulse([4, 3, 1, 1], [0, 0, 0, 0])).unwrap_err();
        assert!(matches!(err, TransformError::ShapeMismatch(_)));
    }

    #[test]
    fn test_groups_must_divide_kernel() {
        let kernel = Array5::<f32>::ones((3, 1, 2, 1, 1));
        assert!(FilterEvents::new(kernel, 2, None, Device::Cpu).is_err());
    }

    #[test]
    fn test_spatial_kernel_rejected() {
        let kernel = Array5::<f32>::ones((2, 1, 2, 3, 1));
        assert!(FilterEvents::new(kernel, 2, None, Device::Cpu).is_err());
    }

    #[test]
    fn test_invalid_tau() {
        assert!(ExpFilterEvents::new(3, 0.0, 2, None, Device::Cpu).is_err());
        assert!(ExpFilterEvents::new(0, 1.0, 2, None, Device::Cpu).is_err());
    }
}
