use crate::result::Result;
use candle_core::{DType, Tensor, D};
use std::{
    ops::Index,
    time::{Duration, Instant},
};

/// The number of predictions in `y_hat` that match `y`.
///
/// `y_hat` is \[batch_size, classes\] (scores or probabilities), `y` is \[batch_size\] u32 classes.
pub fn accuracy(y_hat: &Tensor, y: &Tensor) -> Result<f64> {
    let predicted = if y_hat.rank() > 1 && y_hat.dim(D::Minus1)? > 1 {
        y_hat.argmax(D::Minus1)?
    } else {
        y_hat.flatten_all()?.to_dtype(DType::U32)?
    };
    let correct = predicted
        .eq(&y.to_dtype(DType::U32)?)?
        .to_dtype(DType::F32)?
        .sum_all()?
        .to_scalar::<f32>()?;
    Ok(f64::from(correct))
}

/// Accumulates sums over `N` variables.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Accumulator<const N: usize> {
    data: [f64; N],
}

impl<const N: usize> Default for Accumulator<N> {
    fn default() -> Self {
        Self { data: [0.; N] }
    }
}

impl<const N: usize> Accumulator<N> {
    /// Creates a new accumulator with all sums 0.
    pub fn new() -> Self {
        Self::default()
    }
    /// Adds `values` to the sums.
    pub fn add(&mut self, values: [f64; N]) {
        for (sum, value) in self.data.iter_mut().zip(values) {
            *sum += value;
        }
    }
    /// Resets all sums to 0.
    pub fn reset(&mut self) {
        self.data = [0.; N];
    }
    /// `self[numerator] / self[denominator]`, or 0 if the denominator is 0.
    pub fn ratio(&self, numerator: usize, denominator: usize) -> f64 {
        let denominator = self.data[denominator];
        if denominator == 0. {
            0.
        } else {
            self.data[numerator] / denominator
        }
    }
}

impl<const N: usize> Index<usize> for Accumulator<N> {
    type Output = f64;
    fn index(&self, index: usize) -> &f64 {
        &self.data[index]
    }
}

/// Records multiple running times.
#[derive(Clone, Debug, Default)]
pub struct Timer {
    start: Option<Instant>,
    times: Vec<Duration>,
}

impl Timer {
    /// Creates a started timer.
    pub fn new() -> Self {
        Self {
            start: Some(Instant::now()),
            times: Vec::new(),
        }
    }
    /// Starts the timer.
    pub fn start(&mut self) {
        self.start.replace(Instant::now());
    }
    /// Stops the timer, records and returns the time since [`.start()`](Self::start()).
    ///
    /// Returns 0 if the timer was not started.
    pub fn stop(&mut self) -> Duration {
        let time = self
            .start
            .take()
            .map(|start| start.elapsed())
            .unwrap_or_default();
        self.times.push(time);
        time
    }
    /// The recorded times.
    pub fn times(&self) -> &[Duration] {
        &self.times
    }
    /// The average time.
    pub fn avg(&self) -> Duration {
        match u32::try_from(self.times.len()) {
            Ok(n) if n > 0 => self.sum() / n,
            _ => Duration::ZERO,
        }
    }
    /// The total time.
    pub fn sum(&self) -> Duration {
        self.times.iter().sum()
    }
    /// The cumulative times.
    pub fn cumsum(&self) -> Vec<Duration> {
        self.times
            .iter()
            .scan(Duration::ZERO, |total, time| {
                *total += *time;
                Some(*total)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::Device;

    #[test]
    fn accuracy_counts_argmax_matches() {
        let y_hat = Tensor::new(
            &[[0.1f32, 0.3, 0.6], [0.3, 0.2, 0.5], [0.9, 0.05, 0.05]],
            &Device::Cpu,
        )
        .unwrap();
        let y = Tensor::new(&[2u32, 0, 0], &Device::Cpu).unwrap();
        assert_relative_eq!(accuracy(&y_hat, &y).unwrap(), 2.);
    }

    #[test]
    fn accuracy_of_class_vector() {
        let y_hat = Tensor::new(&[1u32, 2, 3], &Device::Cpu).unwrap();
        let y = Tensor::new(&[1u32, 0, 3], &Device::Cpu).unwrap();
        assert_relative_eq!(accuracy(&y_hat, &y).unwrap(), 2.);
    }

    #[test]
    fn accumulator() {
        let mut metric = Accumulator::<3>::new();
        metric.add([1.5, 2., 4.]);
        metric.add([0.5, 1., 4.]);
        assert_relative_eq!(metric[0], 2.);
        assert_relative_eq!(metric.ratio(1, 2), 3. / 8.);
        metric.reset();
        assert_eq!(metric, Accumulator::default());
        assert_eq!(metric.ratio(0, 2), 0.);
    }

    #[test]
    fn timer() {
        let mut timer = Timer::new();
        let first = timer.stop();
        assert_eq!(timer.stop(), Duration::ZERO);
        timer.start();
        std::thread::sleep(Duration::from_millis(2));
        let second = timer.stop();
        assert!(second >= Duration::from_millis(2));
        assert_eq!(timer.times().len(), 3);
        assert_eq!(timer.sum(), first + second);
        assert_eq!(timer.avg(), (first + second) / 3);
        assert_eq!(timer.cumsum(), [first, first, first + second]);
    }
}
