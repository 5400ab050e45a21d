use super::{
    metric::{accuracy, Accumulator, Timer},
    neural_network::{Initializer, Network},
};
use crate::{
    animator::Animator,
    dataset::{
        loader::{Batch, DataLoader},
        mnist::MnistKind,
    },
    device::device_name,
    result::Result,
};
use candle_core::{Device, Module, D};
use candle_nn::{loss::cross_entropy, Optimizer, SGD};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

/// Options for [`train()`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainOptions {
    /// The number of passes over the training set.
    pub epochs: usize,
    /// The SGD learning rate.
    pub lr: f64,
    /// How parameters are reinitialized before training.
    pub init: Initializer,
    /// Where to render the training curves, see [`Animator`].
    pub plot: Option<PathBuf>,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 10,
            lr: 0.9,
            init: Initializer::Xavier,
            plot: None,
        }
    }
}

/// The result of [`train()`].
#[derive(Clone, Debug)]
pub struct TrainReport {
    /// The mean loss over the last epoch.
    pub train_loss: f64,
    /// The accuracy over the last epoch.
    pub train_acc: f64,
    /// The test accuracy after the last epoch.
    pub test_acc: f64,
    /// Training throughput, excluding evaluation.
    pub examples_per_sec: f64,
    /// The device trained on.
    pub device: String,
    /// Training curves.
    pub history: Animator,
}

impl fmt::Display for TrainReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "loss {:.3}, train acc {:.3}, test acc {:.3}",
            self.train_loss, self.train_acc, self.test_acc
        )?;
        write!(
            f,
            "{:.1} examples/sec on {}",
            self.examples_per_sec, self.device
        )
    }
}

/// Computes the accuracy of `net` over `batches`.
///
/// Each batch is copied to `device`, or the device of the first parameter of `net` if `device` is None.
///
/// Returns 0 if there are no samples.
pub fn evaluate_accuracy<I>(net: &Network, batches: I, device: Option<&Device>) -> Result<f64>
where
    I: IntoIterator<Item = Batch>,
{
    let device = match device {
        Some(device) => device.clone(),
        None => net
            .parameters()
            .first()
            .map(|(_, parameter)| parameter.device().clone())
            .unwrap_or_else(|| net.device().clone()),
    };
    // correct, total
    let mut metric = Accumulator::<2>::new();
    for batch in batches {
        let (x, y) = batch.to_device(&device)?;
        metric.add([accuracy(&net.forward(&x)?, &y)?, batch.len() as f64]);
    }
    Ok(metric.ratio(0, 1))
}

/// Trains `net` with minibatch SGD on `device`.
///
/// Parameters are reinitialized with `options.init` on `device` first. The loss is softmax cross entropy, averaged over
/// the batch. Training loss and accuracy are recorded 5 times per epoch, test accuracy at the end of each epoch.
///
/// Prints the final loss, accuracies, and throughput.
pub fn train(
    net: &mut Network,
    train_loader: &DataLoader,
    test_loader: &DataLoader,
    options: &TrainOptions,
    device: &Device,
) -> Result<TrainReport> {
    let device_name = device_name(device);
    tracing::info!("training on {device_name}");
    net.initialize(options.init, device)?;
    let mut optimizer = SGD::new(net.vars(), options.lr)?;
    let mut animator = Animator::new("epoch", &["train loss", "train acc", "test acc"])
        .xlim(1., options.epochs.max(1) as f64)
        .path(options.plot.clone());
    let mut timer = Timer::default();
    let num_batches = train_loader.num_batches();
    let record_every = (num_batches / 5).max(1);
    // sum of loss, correct, total
    let mut metric = Accumulator::<3>::new();
    let mut test_acc = 0.;
    for epoch in 0..options.epochs {
        metric.reset();
        for (i, batch) in train_loader.iter().enumerate() {
            timer.start();
            let (x, y) = batch.to_device(device)?;
            let y_hat = net.forward(&x)?;
            let loss = cross_entropy(&y_hat, &y)?;
            optimizer.backward_step(&loss)?;
            let n = batch.len() as f64;
            metric.add([
                f64::from(loss.to_scalar::<f32>()?) * n,
                accuracy(&y_hat, &y)?,
                n,
            ]);
            timer.stop();
            if (i + 1) % record_every == 0 || i + 1 == num_batches {
                animator.add(
                    epoch as f64 + (i + 1) as f64 / num_batches as f64,
                    &[Some(metric.ratio(0, 2)), Some(metric.ratio(1, 2)), None],
                )?;
            }
        }
        test_acc = evaluate_accuracy(net, test_loader, Some(device))?;
        animator.add((epoch + 1) as f64, &[None, None, Some(test_acc)])?;
        tracing::info!(
            "epoch {}: loss {:.3}, train acc {:.3}, test acc {:.3}",
            epoch + 1,
            metric.ratio(0, 2),
            metric.ratio(1, 2),
            test_acc,
        );
    }
    let seconds = timer.sum().as_secs_f64();
    let examples_per_sec = if seconds > 0. {
        metric[2] * options.epochs as f64 / seconds
    } else {
        0.
    };
    let report = TrainReport {
        train_loss: metric.ratio(0, 2),
        train_acc: metric.ratio(1, 2),
        test_acc,
        examples_per_sec,
        device: device_name,
        history: animator,
    };
    println!("{report}");
    Ok(report)
}

/// Returns (label, prediction) text pairs for the first `n` samples of `loader`.
pub fn predict(
    net: &Network,
    loader: &DataLoader,
    n: usize,
    kind: MnistKind,
) -> Result<Vec<(&'static str, &'static str)>> {
    let mut pairs = Vec::with_capacity(n);
    for batch in loader.iter() {
        if pairs.len() >= n {
            break;
        }
        let (x, _) = batch.to_device(net.device())?;
        let predicted = net.forward(&x)?.argmax(D::Minus1)?.to_vec1::<u32>()?;
        for (class, predicted) in batch.classes().iter().zip(predicted).take(n - pairs.len()) {
            let label = kind.text_label(*class as usize).unwrap_or("?");
            let prediction = kind.text_label(predicted as usize).unwrap_or("?");
            pairs.push((label, prediction));
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::neural_network::layer::Dense;
    use ndarray::{Array1, Array4};

    // Dark images are class 0, bright images are class 1.
    fn loader(n: usize, batch_size: usize) -> DataLoader {
        let classes: Array1<u8> = (0..n).map(|i| (i % 2) as u8).collect();
        let images = Array4::from_shape_fn([n, 1, 28, 28], |(i, _, _, _)| {
            if i % 2 == 0 {
                0
            } else {
                255
            }
        });
        DataLoader::new(images.into_shared(), classes.into_shared(), batch_size).unwrap()
    }

    fn linear() -> Network {
        Network::new(vec![Dense::from_outputs(2).into()], [1, 28, 28], &Device::Cpu).unwrap()
    }

    #[test]
    fn evaluate_infers_device() {
        let net = Network::lenet5(&Device::Cpu).unwrap();
        let loader = loader(10, 4);
        let inferred = evaluate_accuracy(&net, &loader, None).unwrap();
        let explicit = evaluate_accuracy(&net, &loader, Some(&Device::Cpu)).unwrap();
        assert!((0. ..=1.).contains(&inferred));
        assert_eq!(inferred, explicit);
    }

    #[test]
    fn evaluate_empty() {
        let net = linear();
        let accuracy = evaluate_accuracy(&net, std::iter::empty(), None).unwrap();
        assert_eq!(accuracy, 0.);
    }

    #[test]
    fn evaluate_batches_from_arrays() {
        let net = linear();
        let images = Array4::from_shape_fn([4, 1, 28, 28], |(i, _, _, _)| i as f32 / 3.);
        let (x, _) = Batch::from_arrays(images.clone(), Array1::zeros(4))
            .unwrap()
            .to_device(&Device::Cpu)
            .unwrap();
        let predicted = net
            .forward(&x)
            .unwrap()
            .argmax(D::Minus1)
            .unwrap()
            .to_vec1::<u32>()
            .unwrap();
        // label every other sample with its prediction
        let classes: Array1<u32> = predicted
            .iter()
            .enumerate()
            .map(|(i, class)| if i % 2 == 0 { *class } else { 1 - *class })
            .collect();
        let batches = vec![Batch::from_arrays(images, classes).unwrap()];
        let accuracy = evaluate_accuracy(&net, batches, None).unwrap();
        assert_eq!(accuracy, 0.5);
    }

    #[test]
    fn train_lenet5_one_epoch() {
        let mut net = Network::lenet5(&Device::Cpu).unwrap();
        let options = TrainOptions {
            epochs: 1,
            ..TrainOptions::default()
        };
        let report = train(&mut net, &loader(16, 8), &loader(6, 4), &options, &Device::Cpu).unwrap();
        assert!(report.train_loss.is_finite());
        assert!((0. ..=1.).contains(&report.train_acc));
        assert!((0. ..=1.).contains(&report.test_acc));
        assert!(report.examples_per_sec > 0.);
        assert_eq!(report.device, "cpu");
        let series = report.history.series();
        // 2 batches, both recorded
        assert_eq!(series[0].len(), 2);
        assert_eq!(series[0][1].0, 1.);
        assert_eq!(series[2], [(1., report.test_acc)]);
    }

    #[test]
    fn train_separates_classes() {
        let mut net = linear();
        let options = TrainOptions {
            epochs: 10,
            lr: 0.1,
            ..TrainOptions::default()
        };
        let report = train(&mut net, &loader(32, 8), &loader(8, 8), &options, &Device::Cpu).unwrap();
        assert!(report.test_acc > 0.9, "{report}");
        let losses = &report.history.series()[0];
        assert!(losses.last().unwrap().1 < losses.first().unwrap().1);
    }

    #[test]
    fn zero_epochs() {
        let mut net = linear();
        let options = TrainOptions {
            epochs: 0,
            ..TrainOptions::default()
        };
        let report = train(&mut net, &loader(4, 2), &loader(4, 2), &options, &Device::Cpu).unwrap();
        assert_eq!(report.examples_per_sec, 0.);
        assert!(report.history.series().iter().all(Vec::is_empty));
    }

    #[test]
    fn predict_text_labels() {
        let net = linear();
        let pairs = predict(&net, &loader(10, 4), 5, MnistKind::Fashion).unwrap();
        assert_eq!(pairs.len(), 5);
        let labels: Vec<_> = pairs.iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, ["t-shirt", "trouser", "t-shirt", "trouser", "t-shirt"]);
        assert!(pairs
            .iter()
            .all(|(_, prediction)| ["t-shirt", "trouser"].contains(prediction)));
    }
}
