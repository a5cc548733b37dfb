use edvs_transforms::config::{PipelineConfig, TransformConfig};
use edvs_transforms::event::{events_to_array, Event, EVENT_COLUMNS};
use edvs_transforms::{Device, Sample};

use clap::Parser;
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Bin eDVS events from stdin into a tensor.
///
/// Reads whitespace-separated events (t p x y) from stdin, sorted by time,
/// runs them through a transform pipeline and writes the result as JSON.
#[derive(Parser, Debug)]
#[command(name = "edvs-transform", version, long_about = None)]
struct Cli {
    /// JSON pipeline description; overrides the pipeline flags below
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of time bins
    #[arg(long, default_value_t = 500)]
    bins: usize,

    /// Frame size as C,H,W
    #[arg(long, value_delimiter = ',', default_values_t = [2, 32, 32])]
    size: Vec<usize>,

    /// Downsample factors applied before binning: one for all columns, or t,p,x,y
    #[arg(long, value_delimiter = ',')]
    downsample: Option<Vec<i64>>,

    /// Sum all bins into one image instead of a frame stack
    #[arg(long)]
    event_sum: bool,

    /// Exponential filter length in bins (0 = off)
    #[arg(long, default_value_t = 0)]
    exp_filter_length: usize,

    /// Exponential filter time constant in bins
    #[arg(long, default_value_t = 200.0)]
    tau: f64,

    /// Rescale factor applied after binning
    #[arg(long)]
    rescale: Option<f32>,

    /// Target device label for the output tensor
    #[arg(long, default_value = "cpu")]
    device: Device,
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig, String> {
        if let Some(path) = &self.config {
            return PipelineConfig::load(path).map_err(|e| format!("{}: {}", path.display(), e));
        }
        let size: [usize; 3] = self
            .size
            .as_slice()
            .try_into()
            .map_err(|_| "--size needs exactly three values".to_string())?;

        let mut transforms = Vec::new();
        if let Some(factor) = &self.downsample {
            if factor.len() != 1 && factor.len() != EVENT_COLUMNS {
                return Err("--downsample needs one factor or four (t,p,x,y)".to_string());
            }
            transforms.push(TransformConfig::Downsample {
                factor: factor.clone(),
            });
        }
        transforms.push(if self.event_sum {
            TransformConfig::ToEventSum {
                t_bins: self.bins,
                size,
            }
        } else {
            TransformConfig::ToCountFrame {
                t_bins: self.bins,
                size,
            }
        });
        if let Some(factor) = self.rescale {
            transforms.push(TransformConfig::Rescale { factor });
        }
        transforms.push(TransformConfig::ToTensor {
            device: self.device,
        });
        if self.exp_filter_length > 0 {
            transforms.push(TransformConfig::ExpFilterEvents {
                length: self.exp_filter_length,
                tau: self.tau,
                channels: size[0],
                tpad: None,
                device: self.device,
            });
        }
        Ok(PipelineConfig { transforms })
    }
}

#[derive(Serialize)]
struct Output<'a> {
    kind: &'a str,
    shape: &'a [usize],
    data: Vec<f64>,
}

fn read_events() -> Vec<Event> {
    let stdin = io::stdin();
    let mut events = Vec::new();
    let mut skipped: u64 = 0;

    for (lineno, line) in stdin.lock().lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.parse::<Event>() {
            Ok(ev) => events.push(ev),
            Err(e) => {
                skipped += 1;
                tracing::warn!(line = lineno + 1, error = %e, "skipping malformed event");
            }
        }
    }
    if skipped > 0 {
        tracing::info!(skipped, "malformed lines ignored");
    }
    events
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let pipeline = match cli.pipeline_config().and_then(|c| c.build().map_err(|e| e.to_string())) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("invalid pipeline: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("pipeline:\n{}", pipeline);

    let events = read_events();
    let total = events.len();
    let sample = match pipeline.apply(Sample::Events(events_to_array(&events))) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(events = total, "transform failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let output = Output {
        kind: sample.kind(),
        shape: sample.shape(),
        data: sample.values(),
    };
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let written = serde_json::to_writer(&mut out, &output)
        .map_err(io::Error::from)
        .and_then(|_| writeln!(out))
        .and_then(|_| out.flush());
    if let Err(e) = written {
        tracing::error!("failed to write output: {}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!(events = total, shape = ?sample.shape(), "edvs-transform: done");
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comma_separated_size_and_downsample() {
        let cli = Cli::try_parse_from([
            "edvs-transform",
            "--bins",
            "3",
            "--size",
            "2,4,4",
            "--downsample",
            "1,1,2,2",
        ])
        .unwrap();
        assert_eq!(cli.size, vec![2, 4, 4]);
        assert_eq!(cli.downsample, Some(vec![1, 1, 2, 2]));

        let config = cli.pipeline_config().unwrap();
        assert_eq!(
            config.transforms,
            vec![
                TransformConfig::Downsample {
                    factor: vec![1, 1, 2, 2]
                },
                TransformConfig::ToCountFrame {
                    t_bins: 3,
                    size: [2, 4, 4]
                },
                TransformConfig::ToTensor { device: Device::Cpu },
            ]
        );
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["edvs-transform"]).unwrap();
        assert_eq!(cli.bins, 500);
        assert_eq!(cli.size, vec![2, 32, 32]);
        assert_eq!(cli.device, Device::Cpu);
        assert!(cli.downsample.is_none());
    }

    #[test]
    fn test_single_downsample_factor() {
        let cli = Cli::try_parse_from(["edvs-transform", "--downsample", "2"]).unwrap();
        assert!(cli.pipeline_config().is_ok());
    }

    #[test]
    fn test_wrong_value_counts_rejected() {
        let cli = Cli::try_parse_from(["edvs-transform", "--size", "2,4"]).unwrap();
        assert!(cli.pipeline_config().is_err());
        let cli = Cli::try_parse_from(["edvs-transform", "--downsample", "1,2,3"]).unwrap();
        assert!(cli.pipeline_config().is_err());
    }

    #[test]
    fn test_filter_and_device_flags() {
        let cli = Cli::try_parse_from([
            "edvs-transform",
            "--event-sum",
            "--exp-filter-length",
            "5",
            "--device",
            "cuda:1",
        ])
        .unwrap();
        let compose = cli.pipeline_config().unwrap().build().unwrap();
        let names: Vec<&str> = compose.stages().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["ToEventSum", "ToTensor", "ExpFilterEvents"]);
        assert!(Cli::try_parse_from(["edvs-transform", "--device", "gpu"]).is_err());
    }
}
