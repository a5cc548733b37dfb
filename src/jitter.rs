use std::fmt;

use ndarray::{ArrayD, Axis};
use rand::Rng;

use crate::error::{Result, TransformError};
use crate::tensor::Tensor;

/// Random rigid jitter of a dense frame tensor.
///
/// Draws one rotation angle in `[-th, th]` degrees and integer offsets in
/// `[-xs, xs]` / `[-ys, ys]`, then moves every `(x, y)` pixel of the last two
/// axes to its rotated and translated position, clamped to the frame. Several
/// source pixels may land on the same destination; the last one written wins.
#[derive(Clone, Debug, PartialEq)]
pub struct Jitter {
    xs: i64,
    ys: i64,
    th: f64,
    size: [usize; 3],
}

impl Jitter {
    /// - `size`: `[C, H, W]` of the frames being jittered.
    pub fn new(xs: i64, ys: i64, th: f64, size: [usize; 3]) -> Result<Self> {
        if xs < 0 || ys < 0 || !th.is_finite() || th < 0.0 {
            return Err(TransformError::InvalidConfig(
                "jitter magnitudes must be finite and non-negative".into(),
            ));
        }
        if size.iter().any(|&d| d == 0) {
            return Err(TransformError::InvalidConfig(
                "jitter size must be positive".into(),
            ));
        }
        Ok(Self { xs, ys, th, size })
    }

    pub fn is_identity(&self) -> bool {
        self.xs == 0 && self.ys == 0 && self.th == 0.0
    }

    pub fn apply(&self, data: Tensor) -> Result<Tensor> {
        self.apply_with_rng(data, &mut rand::thread_rng())
    }

    pub fn apply_with_rng<R: Rng + ?Sized>(&self, data: Tensor, rng: &mut R) -> Result<Tensor> {
        if self.is_identity() {
            return Ok(data);
        }
        self.check_shape(data.shape())?;

        let dx = rng.gen_range(-self.xs..=self.xs) as f64;
        let dy = rng.gen_range(-self.ys..=self.ys) as f64;
        let angle = rng.gen_range(-self.th..=self.th).to_radians();
        tracing::trace!(dx, dy, angle, "jitter draw");

        let jittered = self.remap(&data.data, angle, dx, dy);
        Ok(Tensor::new(jittered, data.device))
    }

    fn check_shape(&self, shape: &[usize]) -> Result<()> {
        let rank = shape.len();
        if !(rank == 4 || rank == 5) || shape[rank - 3..] != self.size {
            return Err(TransformError::ShapeMismatch(format!(
                "jitter expects (T, {c}, {h}, {w}) or (N, T, {c}, {h}, {w}), got {shape:?}",
                c = self.size[0],
                h = self.size[1],
                w = self.size[2],
            )));
        }
        Ok(())
    }

    fn remap(&self, data: &ArrayD<f32>, angle: f64, dx: f64, dy: f64) -> ArrayD<f32> {
        let (sin_th, cos_th) = angle.sin_cos();
        let max_x = (self.size[1] - 1) as f64;
        let max_y = (self.size[2] - 1) as f64;
        let x_axis = Axis(data.ndim() - 2);

        let mut out = ArrayD::<f32>::zeros(data.raw_dim());
        for x in 0..self.size[1] {
            let src_col = data.index_axis(x_axis, x);
            for y in 0..self.size[2] {
                let (xf, yf) = (x as f64, y as f64);
                let x_new = (xf * cos_th - yf * sin_th + dx).round_ties_even().clamp(0.0, max_x);
                let y_new = (xf * sin_th + yf * cos_th + dy).round_ties_even().clamp(0.0, max_y);

                let src = src_col.index_axis(Axis(src_col.ndim() - 1), y);
                let mut dst_col = out.index_axis_mut(x_axis, x_new as usize);
                let last = dst_col.ndim() - 1;
                dst_col.index_axis_mut(Axis(last), y_new as usize).assign(&src);
            }
        }
        out
    }
}

impl fmt::Display for Jitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Jitter(xs={}, ys={}, th={})", self.xs, self.ys, self.th)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Device;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ramp(shape: &[usize]) -> Tensor {
        let n: usize = shape.iter().product();
        let data = ArrayD::from_shape_vec(shape.to_vec(), (0..n).map(|v| v as f32).collect()).unwrap();
        Tensor::new(data, Device::Cpu)
    }

    #[test]
    fn test_zero_jitter_is_identity() {
        let jitter = Jitter::new(0, 0, 0.0, [2, 4, 4]).unwrap();
        let input = ramp(&[3, 2, 4, 4]);
        let out = jitter.apply(input.clone()).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_zero_jitter_skips_shape_check() {
        let jitter = Jitter::new(0, 0, 0.0, [2, 4, 4]).unwrap();
        let input = ramp(&[5, 7]);
        assert_eq!(jitter.apply(input.clone()).unwrap(), input);
    }

    #[test]
    fn test_translation_only_shifts_pixels() {
        // xs = 1 draws from {-1, 0, 1}; check the result is consistent with one of them.
        let jitter = Jitter::new(1, 0, 0.0, [1, 4, 4]).unwrap();
        let mut input = Tensor::zeros(&[1, 1, 4, 4], Device::Cpu);
        input.data[[0, 0, 1, 2]] = 5.0;
        let mut rng = StdRng::seed_from_u64(7);
        let out = jitter.apply_with_rng(input, &mut rng).unwrap();
        let hits: Vec<usize> = (0..4).filter(|&x| out.data[[0, 0, x, 2]] == 5.0).collect();
        assert_eq!(hits.len(), 1);
        assert!((0..=2).contains(&hits[0]));
    }

    #[test]
    fn test_output_keeps_shape_and_device() {
        let jitter = Jitter::new(2, 2, 30.0, [2, 8, 8]).unwrap();
        let input = ramp(&[3, 2, 8, 8]).to(Device::Cuda(0));
        let mut rng = StdRng::seed_from_u64(42);
        let out = jitter.apply_with_rng(input, &mut rng).unwrap();
        assert_eq!(out.shape(), &[3, 2, 8, 8]);
        assert_eq!(out.device, Device::Cuda(0));
    }

    #[test]
    fn test_collisions_do_not_accumulate() {
        let jitter = Jitter::new(3, 3, 45.0, [1, 4, 4]).unwrap();
        let input = Tensor::new(ArrayD::from_elem(vec![1, 1, 4, 4], 1.0), Device::Cpu);
        let mut rng = StdRng::seed_from_u64(3);
        let out = jitter.apply_with_rng(input, &mut rng).unwrap();
        assert!(out.data.iter().all(|&v| v == 0.0 || v == 1.0));
        assert!(out.data.sum() <= 16.0);
    }

    #[test]
    fn test_five_dimensional_input() {
        let jitter = Jitter::new(1, 1, 10.0, [2, 4, 4]).unwrap();
        let input = ramp(&[2, 3, 2, 4, 4]);
        let mut rng = StdRng::seed_from_u64(11);
        let out = jitter.apply_with_rng(input, &mut rng).unwrap();
        assert_eq!(out.shape(), &[2, 3, 2, 4, 4]);
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let jitter = Jitter::new(1, 1, 10.0, [2, 4, 4]).unwrap();
        let err = jitter.apply(ramp(&[3, 2, 5, 4])).unwrap_err();
        assert!(matches!(err, TransformError::ShapeMismatch(_)));
    }

    #[test]
    fn test_negative_magnitude_rejected() {
        assert!(Jitter::new(-1, 0, 0.0, [2, 4, 4]).is_err());
    }

    #[test]
    fn test_non_finite_angle_rejected() {
        assert!(Jitter::new(0, 0, f64::NAN, [2, 4, 4]).is_err());
        assert!(Jitter::new(1, 1, f64::INFINITY, [2, 4, 4]).is_err());
    }

    #[test]
    fn test_remap_translation_exact_cells() {
        // Pixel (x, y) holds 4 * x + y.
        let jitter = Jitter::new(1, 1, 0.0, [1, 4, 4]).unwrap();
        let input = ramp(&[1, 1, 4, 4]);
        let out = jitter.remap(&input.data, 0.0, 1.0, -1.0);
        assert_eq!(out[[0, 0, 2, 1]], 6.0);
        // Both axes clamp: (2, 0), (2, 1), (3, 0), (3, 1) all land on (3, 0).
        assert_eq!(out[[0, 0, 3, 0]], 13.0);
        // Row x = 0 is never a destination.
        assert!((0..4).all(|y| out[[0, 0, 0, y]] == 0.0));
        // y = -1 clamps to 0: (0, 0) and (0, 1) both land on (1, 0), the later one wins.
        assert_eq!(out[[0, 0, 1, 0]], 1.0);
        // x = 4 clamps to 3: (2, 3) and (3, 3) both land on (3, 2).
        assert_eq!(out[[0, 0, 3, 2]], 15.0);
        assert_eq!(out[[0, 0, 3, 3]], 0.0);
    }

    #[test]
    fn test_remap_quarter_turn() {
        // (x, y) -> (-y, x): (2, 3) lands on (-3, 2), clamped to (0, 2).
        let jitter = Jitter::new(0, 0, 90.0, [1, 4, 4]).unwrap();
        let mut input = Tensor::zeros(&[1, 1, 4, 4], Device::Cpu);
        input.data[[0, 0, 2, 3]] = 5.0;
        let out = jitter.remap(&input.data, std::f64::consts::FRAC_PI_2, 0.0, 0.0);
        assert_eq!(out[[0, 0, 0, 2]], 5.0);
        assert_eq!(out.sum(), 5.0);
    }
}
