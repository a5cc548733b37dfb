use std::fmt;

use ndarray::{Array2, ArrayD, Axis, Ix1, Ix2};

use crate::error::{Result, TransformError};
use crate::tensor::{Device, Tensor};

/// Tile a label into an `n`-row sequence, one row per frame.
///
/// A scalar label becomes `(n, 1)`, a label vector `(C,)` becomes `(n, C)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Repeat {
    n_repeat: usize,
}

impl Repeat {
    pub fn new(n_repeat: usize) -> Self {
        Self { n_repeat }
    }

    pub fn n_repeat(&self) -> usize {
        self.n_repeat
    }

    pub fn apply(&self, target: &ArrayD<i64>) -> Result<Array2<i64>> {
        let row = match target.ndim() {
            0 | 1 => target.iter().copied().collect::<Vec<_>>(),
            _ => {
                return Err(TransformError::ShapeMismatch(format!(
                    "repeat expects a scalar or 1-D label, got {:?}",
                    target.shape()
                )))
            }
        };
        let width = row.len();
        let flat: Vec<i64> = std::iter::repeat(row).take(self.n_repeat).flatten().collect();
        Array2::from_shape_vec((self.n_repeat, width), flat)
            .map_err(|e| TransformError::ShapeMismatch(e.to_string()))
    }
}

impl fmt::Display for Repeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Repeat({})", self.n_repeat)
    }
}

/// Encode integer class indices as one-hot rows.
///
/// Accepts `(n,)` or `(n, k)` indices; row `i` of the `(n, num_classes)`
/// result has a 1 at every index listed in row `i` of the input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToOneHot {
    num_classes: usize,
}

impl ToOneHot {
    pub fn new(num_classes: usize) -> Result<Self> {
        if num_classes == 0 {
            return Err(TransformError::InvalidConfig("one-hot needs at least one class".into()));
        }
        Ok(Self { num_classes })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn apply(&self, integers: &ArrayD<i64>) -> Result<Tensor> {
        let indices = match integers.ndim() {
            1 => integers
                .view()
                .into_dimensionality::<Ix1>()
                .map(|col| col.insert_axis(Axis(1)))
                .map_err(|e| TransformError::ShapeMismatch(e.to_string()))?,
            2 => integers
                .view()
                .into_dimensionality::<Ix2>()
                .map_err(|e| TransformError::ShapeMismatch(e.to_string()))?,
            _ => {
                return Err(TransformError::ShapeMismatch(format!(
                    "one-hot expects (n,) or (n, k) labels, got {:?}",
                    integers.shape()
                )))
            }
        };

        let mut onehot = Array2::<f32>::zeros((indices.nrows(), self.num_classes));
        for (mut out_row, labels) in onehot.rows_mut().into_iter().zip(indices.rows()) {
            for &label in labels.iter() {
                let class = usize::try_from(label)
                    .ok()
                    .filter(|&c| c < self.num_classes)
                    .ok_or(TransformError::LabelOutOfRange {
                        label,
                        num_classes: self.num_classes,
                    })?;
                out_row[class] = 1.0;
            }
        }
        Ok(Tensor::new(onehot.into_dyn(), Device::Cpu))
    }
}

impl fmt::Display for ToOneHot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ToOneHot(num_classes={})", self.num_classes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr0, arr1, arr2};

    #[test]
    fn test_repeat_vector() {
        let out = Repeat::new(3).apply(&arr1(&[1i64, 2]).into_dyn()).unwrap();
        assert_eq!(out, arr2(&[[1, 2], [1, 2], [1, 2]]));
    }

    #[test]
    fn test_repeat_scalar() {
        let out = Repeat::new(2).apply(&arr0(7i64).into_dyn()).unwrap();
        assert_eq!(out, arr2(&[[7], [7]]));
    }

    #[test]
    fn test_repeat_rejects_matrix() {
        assert!(Repeat::new(2).apply(&arr2(&[[1i64]]).into_dyn()).is_err());
    }

    #[test]
    fn test_one_hot_vector() {
        let out = ToOneHot::new(3).unwrap().apply(&arr1(&[0i64, 2]).into_dyn()).unwrap();
        assert_eq!(out.data, arr2(&[[1.0f32, 0.0, 0.0], [0.0, 0.0, 1.0]]).into_dyn());
    }

    #[test]
    fn test_one_hot_column() {
        let out = ToOneHot::new(4).unwrap().apply(&arr2(&[[3i64], [1]]).into_dyn()).unwrap();
        assert_eq!(out.shape(), &[2, 4]);
        assert_eq!(out.data[[0, 3]], 1.0);
        assert_eq!(out.data[[1, 1]], 1.0);
        assert_eq!(out.data.sum(), 2.0);
    }

    #[test]
    fn test_repeat_then_one_hot() {
        let labels = Repeat::new(4).apply(&arr0(1i64).into_dyn()).unwrap();
        let out = ToOneHot::new(3).unwrap().apply(&labels.into_dyn()).unwrap();
        assert_eq!(out.shape(), &[4, 3]);
        for row in out.data.outer_iter() {
            assert_eq!(row.iter().copied().collect::<Vec<f32>>(), vec![0.0, 1.0, 0.0]);
        }
    }

    #[test]
    fn test_one_hot_out_of_range() {
        let onehot = ToOneHot::new(3).unwrap();
        let err = onehot.apply(&arr1(&[3i64]).into_dyn()).unwrap_err();
        assert!(matches!(err, TransformError::LabelOutOfRange { label: 3, num_classes: 3 }));
        assert!(onehot.apply(&arr1(&[-1i64]).into_dyn()).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Repeat::new(3).to_string(), "Repeat(3)");
        assert_eq!(ToOneHot::new(10).unwrap().to_string(), "ToOneHot(num_classes=10)");
    }
}
