use crate::{
    dataset::mnist::MnistKind,
    learn::{
        neural_network::{layer::Layer, lenet5, Initializer},
        trainer::TrainOptions,
    },
    result::Result,
};
use anyhow::Context;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

/// Training configuration.
///
/// Loaded from json, all fields are optional:
/// ```json
/// {
///     "batch_size": 256,
///     "epochs": 10,
///     "lr": 0.9,
///     "dataset": "fashion"
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    /// Samples per batch, for training and testing.
    pub batch_size: usize,
    /// Passes over the training set.
    pub epochs: usize,
    /// The SGD learning rate.
    pub lr: f64,
    /// Index of the cuda device, falls back to the cpu.
    pub gpu: usize,
    /// Batches assembled ahead of training.
    pub prefetch: usize,
    /// Whether to download missing dataset files.
    pub download: bool,
    /// The dataset.
    pub dataset: MnistKind,
    /// The dataset folder, defaults to the downloads dir.
    pub data_dir: Option<PathBuf>,
    /// Parameter initialization.
    pub init: Initializer,
    /// Png to render the training curves to.
    pub plot: Option<PathBuf>,
    /// Json to write the training curves to.
    pub history: Option<PathBuf>,
    /// The number of test predictions to print after training.
    pub predict: usize,
    /// A custom topology, defaults to LeNet-5.
    pub network: Option<Vec<Layer>>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            epochs: 10,
            lr: 0.9,
            gpu: 0,
            prefetch: 4,
            download: true,
            dataset: MnistKind::Fashion,
            data_dir: None,
            init: Initializer::Xavier,
            plot: None,
            history: None,
            predict: 0,
            network: None,
        }
    }
}

impl TrainConfig {
    /// Loads the config from a json file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).with_context(|| format!("reading {path:?}"))?;
        serde_json::from_str(&json).with_context(|| format!("parsing {path:?}"))
    }
    /// The options passed to [`train()`](crate::learn::trainer::train()).
    pub fn options(&self) -> TrainOptions {
        TrainOptions {
            epochs: self.epochs,
            lr: self.lr,
            init: self.init,
            plot: self.plot.clone(),
        }
    }
    /// Applies command line `overrides`, which take precedence over the file.
    pub fn with_overrides(self, overrides: Overrides) -> Self {
        let Overrides {
            epochs,
            lr,
            batch_size,
            gpu,
            data_dir,
            no_download,
            digits,
            plot,
            history,
            predict,
        } = overrides;
        Self {
            epochs: epochs.unwrap_or(self.epochs),
            lr: lr.unwrap_or(self.lr),
            batch_size: batch_size.unwrap_or(self.batch_size),
            gpu: gpu.unwrap_or(self.gpu),
            download: self.download && !no_download,
            dataset: if digits {
                MnistKind::Digits
            } else {
                self.dataset
            },
            data_dir: data_dir.or(self.data_dir),
            plot: plot.or(self.plot),
            history: history.or(self.history),
            predict: predict.unwrap_or(self.predict),
            ..self
        }
    }
    /// The topology, [`lenet5()`] unless `network` is set.
    pub fn layers(&self) -> Vec<Layer> {
        self.network.clone().unwrap_or_else(lenet5)
    }
}

/// Command line flags for `lenet train`, see [`TrainConfig::with_overrides()`].
#[derive(Clone, Debug, Default, Args)]
pub struct Overrides {
    /// The number of epochs to train for.
    #[arg(long)]
    pub epochs: Option<usize>,
    /// The learning rate.
    #[arg(long)]
    pub lr: Option<f64>,
    /// The batch size.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// The cuda device index.
    #[arg(long)]
    pub gpu: Option<usize>,
    /// The folder holding the dataset.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Fail instead of downloading missing files.
    #[arg(long)]
    pub no_download: bool,
    /// Use MNIST digits instead of FashionMNIST.
    #[arg(long)]
    pub digits: bool,
    /// Png to render the training curves to.
    #[arg(long)]
    pub plot: Option<PathBuf>,
    /// Json to write the training curves to.
    #[arg(long)]
    pub history: Option<PathBuf>,
    /// Print this many test predictions after training.
    #[arg(long)]
    pub predict: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::neural_network::layer::Dense;
    use clap::Parser;

    #[derive(Parser)]
    struct Flags {
        #[command(flatten)]
        overrides: Overrides,
    }

    fn parse(args: &[&str]) -> Overrides {
        Flags::try_parse_from(std::iter::once("lenet").chain(args.iter().copied()))
            .unwrap()
            .overrides
    }

    #[test]
    fn partial_json() {
        let config: TrainConfig =
            serde_json::from_str(r#"{"epochs": 2, "lr": 0.5, "dataset": "digits"}"#).unwrap();
        assert_eq!(config.epochs, 2);
        assert_eq!(config.lr, 0.5);
        assert_eq!(config.dataset, MnistKind::Digits);
        assert_eq!(config.batch_size, 256);
        assert_eq!(config.layers(), lenet5());
    }

    #[test]
    fn unknown_field() {
        assert!(serde_json::from_str::<TrainConfig>(r#"{"epoch": 2}"#).is_err());
    }

    #[test]
    fn custom_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"network": [{"type": "dense", "outputs": 10}], "init": {"normal": 0.01}}"#,
        )
        .unwrap();
        let config = TrainConfig::from_path(&path).unwrap();
        assert_eq!(config.layers(), [Layer::Dense(Dense::from_outputs(10))]);
        assert_eq!(config.options().init, Initializer::Normal(0.01));
        assert_eq!(config.options().epochs, 10);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TrainConfig::from_path(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn no_overrides() {
        let config = TrainConfig {
            epochs: 3,
            data_dir: Some("data".into()),
            ..TrainConfig::default()
        };
        assert_eq!(config.clone().with_overrides(parse(&[])), config);
    }

    #[test]
    fn flags_override_file() {
        let file = TrainConfig {
            epochs: 3,
            lr: 0.5,
            data_dir: Some("data".into()),
            plot: Some("file.png".into()),
            history: Some("history.json".into()),
            ..TrainConfig::default()
        };
        let config = file.with_overrides(parse(&[
            "--epochs",
            "7",
            "--batch-size",
            "64",
            "--no-download",
            "--digits",
            "--plot",
            "flag.png",
            "--predict",
            "5",
        ]));
        assert_eq!(config.epochs, 7);
        assert_eq!(config.lr, 0.5);
        assert_eq!(config.batch_size, 64);
        assert!(!config.download);
        assert_eq!(config.dataset, MnistKind::Digits);
        assert_eq!(config.predict, 5);
        assert_eq!(config.plot, Some(PathBuf::from("flag.png")));
        // unset flags keep the file values
        assert_eq!(config.data_dir, Some(PathBuf::from("data")));
        assert_eq!(config.history, Some(PathBuf::from("history.json")));
    }

    #[test]
    fn download_disabled_in_file() {
        let file = TrainConfig {
            download: false,
            ..TrainConfig::default()
        };
        assert!(!file.with_overrides(Overrides::default()).download);
    }

    #[test]
    fn bad_flag_value() {
        assert!(Flags::try_parse_from(["lenet", "--epochs", "ten"]).is_err());
    }
}
