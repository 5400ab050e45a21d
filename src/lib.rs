/*!
# **lenet**
LeNet-5, the classic convolutional network, trained on Fashion-MNIST with minibatch SGD.

Tensors, autograd and the optimizer step come from [candle](https://github.com/huggingface/candle). This crate
declares the network, loads the data, and drives training and evaluation.

```no_run
# use lenet::{
#     result::Result,
#     dataset::mnist::{Mnist, MnistKind},
#     device::try_gpu,
#     learn::{neural_network::Network, trainer::{train, TrainOptions}},
# };
# fn main() -> Result<()> {
let mnist = Mnist::builder()
    .kind(MnistKind::Fashion)
    .download(true)
    .build()?;
let device = try_gpu(0);
let mut net = Network::lenet5(&device)?;
net.print_shapes()?;
let report = train(
    &mut net,
    &mnist.train_loader(256)?,
    &mnist.test_loader(256)?,
    &TrainOptions::default(),
    &device,
)?;
println!("test accuracy: {:.3}", report.test_acc);
# Ok(())
# }
```
*/
#![warn(missing_docs)]

/// Result.
pub mod result {
    /// Result type.
    pub use anyhow::{Error, Result};
}

/// Training curves.
pub mod animator;
/// Configuration.
pub mod config;
/// Datasets.
pub mod dataset;
/// Devices.
pub mod device;
/// Errors.
pub mod error;
/// Machine learning.
pub mod learn;
