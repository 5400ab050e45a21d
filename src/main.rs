use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use lenet::{
    config::{Overrides, TrainConfig},
    dataset::mnist::Mnist,
    device::try_gpu,
    learn::{
        neural_network::Network,
        trainer::{predict, train},
    },
};
use num_format::{Locale, ToFormattedString};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// LeNet-5 on Fashion-MNIST.
#[derive(Parser, Debug)]
#[command(name = "lenet", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints the output shape of each layer for a single dummy input.
    Shapes(ShapesArgs),
    /// Trains the network and evaluates it on the test set.
    Train(TrainArgs),
}

#[derive(Args, Debug)]
struct ShapesArgs {
    /// Json config, for a custom network.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Input height.
    #[arg(long, default_value_t = 28)]
    height: usize,
    /// Input width.
    #[arg(long, default_value_t = 28)]
    width: usize,
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Json config. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(flatten)]
    overrides: Overrides,
}

impl TrainArgs {
    fn config(self) -> Result<TrainConfig> {
        let config = match self.config.as_deref() {
            Some(path) => TrainConfig::from_path(path)?,
            None => TrainConfig::default(),
        };
        Ok(config.with_overrides(self.overrides))
    }
}

fn shapes(args: ShapesArgs) -> Result<()> {
    let config = match args.config.as_deref() {
        Some(path) => TrainConfig::from_path(path)?,
        None => TrainConfig::default(),
    };
    let device = try_gpu(config.gpu);
    let net = Network::new(config.layers(), [1, args.height, args.width], &device)?;
    net.print_shapes()
}

fn train_command(args: TrainArgs) -> Result<()> {
    let config = args.config()?;
    tracing::debug!("{config:#?}");
    let builder = Mnist::builder()
        .kind(config.dataset)
        .download(config.download);
    let mnist = match config.data_dir.as_deref() {
        Some(path) => builder.path(path).build()?,
        None => builder.build()?,
    };
    let device = try_gpu(config.gpu);
    let mut net = Network::new(config.layers(), [1, 28, 28], &device)?;
    println!("{:#?}", net.layers());
    println!(
        "{} trainable parameters.",
        net.parameter_count().to_formatted_string(&Locale::en)
    );
    let train_loader = mnist
        .train_loader(config.batch_size)?
        .prefetch(config.prefetch);
    let test_loader = mnist
        .test_loader(config.batch_size)?
        .prefetch(config.prefetch);
    let report = train(
        &mut net,
        &train_loader,
        &test_loader,
        &config.options(),
        &device,
    )?;
    if let Some(path) = config.plot.as_ref() {
        println!("Plot saved to {path:?}.");
    }
    if let Some(path) = config.history.as_ref() {
        report.history.save_json(path)?;
        println!("History saved to {path:?}.");
    }
    if config.predict > 0 {
        for (label, prediction) in predict(&net, &test_loader, config.predict, config.dataset)? {
            println!("{label:>12} -> {prediction}");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lenet=info")),
        )
        .init();
    match Cli::parse().command {
        Command::Shapes(args) => shapes(args),
        Command::Train(args) => train_command(args),
    }
}
