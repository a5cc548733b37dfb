//! Serializable pipeline descriptions.
//!
//! A pipeline is stored as JSON: a list of stages, each tagged with its
//! transform name. Missing parameters take the usual defaults.
//!
//! ```json
//! { "transforms": [
//!     { "type": "Downsample", "factor": [1000, 1, 4, 4] },
//!     { "type": "ToCountFrame", "T": 100, "size": [2, 32, 32] },
//!     { "type": "ToTensor" },
//!     { "type": "ExpFilterEvents", "length": 20, "tau": 5.0 }
//! ] }
//! ```

use std::path::Path;

use ndarray::Array5;
use serde::{Deserialize, Serialize};

use crate::attention::Attention;
use crate::channel::ToChannelHeightWidth;
use crate::count_frame::{ToCountFrame, ToEventSum, DEFAULT_BINS, DEFAULT_SIZE};
use crate::crop::{Crop, CropCenter, CropDims};
use crate::downsample::Downsample;
use crate::error::{Result, TransformError};
use crate::jitter::Jitter;
use crate::labels::{Repeat, ToOneHot};
use crate::pipeline::{Compose, Transform};
use crate::rescale::Rescale;
use crate::temporal_filter::{ExpFilterEvents, FilterEvents};
use crate::tensor::{Device, ToTensor};

fn default_bins() -> usize {
    DEFAULT_BINS
}

fn default_size() -> [usize; 3] {
    DEFAULT_SIZE
}

fn default_shift() -> i64 {
    2
}

fn default_angle() -> f64 {
    30.0
}

fn default_tau() -> f64 {
    200.0
}

fn default_channels() -> usize {
    2
}

fn default_groups() -> usize {
    1
}

/// One pipeline stage with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransformConfig {
    Jitter {
        #[serde(default = "default_shift")]
        xs: i64,
        #[serde(default = "default_shift")]
        ys: i64,
        #[serde(default = "default_angle")]
        th: f64,
        #[serde(default = "default_size")]
        size: [usize; 3],
    },
    Crop {
        low: Vec<i64>,
        high: Vec<i64>,
    },
    CropDims {
        low: Vec<i64>,
        high: Vec<i64>,
        dims: Vec<usize>,
    },
    CropCenter {
        center: [i64; 2],
        size: [usize; 3],
    },
    Attention {
        n_events: usize,
        #[serde(default = "default_size")]
        size: [usize; 3],
    },
    ToChannelHeightWidth,
    Downsample {
        factor: Vec<i64>,
    },
    ToCountFrame {
        #[serde(rename = "T", default = "default_bins")]
        t_bins: usize,
        #[serde(default = "default_size")]
        size: [usize; 3],
    },
    ToEventSum {
        #[serde(rename = "T", default = "default_bins")]
        t_bins: usize,
        #[serde(default = "default_size")]
        size: [usize; 3],
    },
    FilterEvents {
        /// Kernel taps per output channel, shape `(C, C / groups, K)`.
        kernel: Vec<Vec<Vec<f32>>>,
        #[serde(default = "default_groups")]
        groups: usize,
        #[serde(default)]
        tpad: Option<usize>,
        #[serde(default)]
        device: Device,
    },
    ExpFilterEvents {
        length: usize,
        #[serde(default = "default_tau")]
        tau: f64,
        #[serde(default = "default_channels")]
        channels: usize,
        #[serde(default)]
        tpad: Option<usize>,
        #[serde(default)]
        device: Device,
    },
    Rescale {
        factor: f32,
    },
    Repeat {
        n_repeat: usize,
    },
    ToOneHot {
        num_classes: usize,
    },
    ToTensor {
        #[serde(default)]
        device: Device,
    },
}

impl TransformConfig {
    /// Validate the parameters and construct the stage.
    pub fn build(&self) -> Result<Transform> {
        let stage: Transform = match self {
            TransformConfig::Jitter { xs, ys, th, size } => Jitter::new(*xs, *ys, *th, *size)?.into(),
            TransformConfig::Crop { low, high } => Crop::new(low.clone(), high.clone())?.into(),
            TransformConfig::CropDims { low, high, dims } => {
                CropDims::new(low.clone(), high.clone(), dims.clone())?.into()
            }
            TransformConfig::CropCenter { center, size } => CropCenter::new(*center, *size)?.into(),
            TransformConfig::Attention { n_events, size } => Attention::new(*n_events, *size)?.into(),
            TransformConfig::ToChannelHeightWidth => ToChannelHeightWidth::new().into(),
            TransformConfig::Downsample { factor } => Downsample::new(factor.clone())?.into(),
            TransformConfig::ToCountFrame { t_bins, size } => ToCountFrame::new(*t_bins, *size)?.into(),
            TransformConfig::ToEventSum { t_bins, size } => ToEventSum::new(*t_bins, *size)?.into(),
            TransformConfig::FilterEvents {
                kernel,
                groups,
                tpad,
                device,
            } => FilterEvents::new(kernel_from_nested(kernel)?, *groups, *tpad, *device)?.into(),
            TransformConfig::ExpFilterEvents {
                length,
                tau,
                channels,
                tpad,
                device,
            } => ExpFilterEvents::new(*length, *tau, *channels, *tpad, *device)?.into(),
            TransformConfig::Rescale { factor } => Rescale::new(*factor).into(),
            TransformConfig::Repeat { n_repeat } => Repeat::new(*n_repeat).into(),
            TransformConfig::ToOneHot { num_classes } => ToOneHot::new(*num_classes)?.into(),
            TransformConfig::ToTensor { device } => ToTensor::new(*device).into(),
        };
        Ok(stage)
    }
}

/// Expand nested `(C, C / groups, K)` taps into a `(C, C / groups, K, 1, 1)` kernel.
fn kernel_from_nested(taps: &[Vec<Vec<f32>>]) -> Result<Array5<f32>> {
    let c_out = taps.len();
    let c_in = taps.first().map_or(0, |group| group.len());
    let k = taps
        .first()
        .and_then(|group| group.first())
        .map_or(0, |row| row.len());
    let ragged = taps
        .iter()
        .any(|group| group.len() != c_in || group.iter().any(|row| row.len() != k));
    if c_out == 0 || c_in == 0 || k == 0 || ragged {
        return Err(TransformError::InvalidConfig(
            "filter kernel must be a non-empty, rectangular (C, C/groups, K) list".into(),
        ));
    }
    let flat: Vec<f32> = taps.iter().flatten().flatten().copied().collect();
    Array5::from_shape_vec((c_out, c_in, k, 1, 1), flat)
        .map_err(|e| TransformError::InvalidConfig(e.to_string()))
}

/// Full pipeline description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub transforms: Vec<TransformConfig>,
}

impl PipelineConfig {
    /// Load a pipeline description from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), stages = config.transforms.len(), "loaded pipeline config");
        Ok(config)
    }

    /// Save the description as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Build every stage, failing on the first invalid one.
    pub fn build(&self) -> Result<Compose> {
        self.transforms
            .iter()
            .map(TransformConfig::build)
            .collect::<Result<Vec<_>>>()
            .map(Compose::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let cfg: TransformConfig = serde_json::from_str(r#"{"type": "ToCountFrame"}"#).unwrap();
        assert_eq!(
            cfg,
            TransformConfig::ToCountFrame {
                t_bins: 500,
                size: [2, 32, 32]
            }
        );
        let cfg: TransformConfig = serde_json::from_str(r#"{"type": "Jitter"}"#).unwrap();
        assert_eq!(
            cfg,
            TransformConfig::Jitter {
                xs: 2,
                ys: 2,
                th: 30.0,
                size: [2, 32, 32]
            }
        );
    }

    #[test]
    fn test_unit_variant() {
        let cfg: TransformConfig =
            serde_json::from_str(r#"{"type": "ToChannelHeightWidth"}"#).unwrap();
        assert_eq!(cfg, TransformConfig::ToChannelHeightWidth);
    }

    #[test]
    fn test_device_string() {
        let cfg: TransformConfig =
            serde_json::from_str(r#"{"type": "ToTensor", "device": "cuda:1"}"#).unwrap();
        assert_eq!(cfg, TransformConfig::ToTensor { device: Device::Cuda(1) });
        assert!(serde_json::from_str::<TransformConfig>(r#"{"type": "ToTensor", "device": "gpu"}"#).is_err());
    }

    #[test]
    fn test_build_pipeline() {
        let json = r#"{ "transforms": [
            { "type": "Downsample", "factor": [1, 1, 2, 2] },
            { "type": "ToCountFrame", "T": 4, "size": [2, 8, 8] },
            { "type": "ToTensor" },
            { "type": "ExpFilterEvents", "length": 3, "tau": 5.0 }
        ] }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        let pipeline = config.build().unwrap();
        assert_eq!(pipeline.len(), 4);
        assert_eq!(pipeline.stages()[1].name(), "ToCountFrame");
    }

    #[test]
    fn test_build_reports_invalid_stage() {
        let config = PipelineConfig {
            transforms: vec![TransformConfig::Downsample { factor: vec![0] }],
        };
        assert!(matches!(config.build(), Err(TransformError::InvalidConfig(_))));
    }

    #[test]
    fn test_filter_kernel_from_json() {
        let cfg: TransformConfig = serde_json::from_str(
            r#"{"type": "FilterEvents", "kernel": [[[0.5, 0.5]], [[1.0, 0.0]]], "groups": 2}"#,
        )
        .unwrap();
        match cfg.build().unwrap() {
            Transform::FilterEvents(f) => {
                assert_eq!(f.kernel().shape(), &[2, 1, 2, 1, 1]);
                assert_eq!(f.tpad(), 1);
            }
            other => panic!("unexpected stage {other}"),
        }
    }

    #[test]
    fn test_ragged_kernel_rejected() {
        assert!(kernel_from_nested(&[vec![vec![1.0, 2.0]], vec![vec![1.0]]]).is_err());
        assert!(kernel_from_nested(&[]).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pipeline.json");
        let config = PipelineConfig {
            transforms: vec![
                TransformConfig::CropCenter {
                    center: [16, 16],
                    size: [2, 8, 8],
                },
                TransformConfig::ToEventSum {
                    t_bins: 10,
                    size: [2, 8, 8],
                },
                TransformConfig::Rescale { factor: 0.5 },
            ],
        };
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipelineConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, TransformError::Io(_)));
    }
}
