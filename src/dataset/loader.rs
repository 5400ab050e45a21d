use crate::{error::DatasetError, result::Result};
use candle_core::{Device, Tensor};
use crossbeam_channel::Receiver;
use ndarray::{ArcArray, ArcArray1, Array1, Array4, Axis, Ix4, Zip};
use rand::seq::SliceRandom;
use std::thread::{self, JoinHandle};

/// A batch of images and classes.
#[derive(Clone, Debug)]
pub struct Batch {
    images: Array4<f32>,
    classes: Array1<u32>,
}

impl Batch {
    fn gather(images: &ArcArray<u8, Ix4>, classes: &ArcArray1<u8>, indices: &[usize]) -> Self {
        let bytes = images.select(Axis(0), indices);
        let mut images = Array4::<f32>::zeros(bytes.raw_dim());
        // normalize the bytes to f32
        Zip::from(&mut images)
            .and(&bytes)
            .par_for_each(|x, &byte| *x = f32::from(byte) / 255.);
        let classes = indices.iter().map(|&i| u32::from(classes[i])).collect();
        Self { images, classes }
    }
    /// Creates a batch from arrays.
    ///
    /// **Errors**
    /// - The number of images and classes differ.
    pub fn from_arrays(images: Array4<f32>, classes: Array1<u32>) -> Result<Self> {
        if images.dim().0 != classes.len() {
            return Err(DatasetError::Count {
                what: "batch classes".into(),
                expected: images.dim().0,
                found: classes.len(),
            }
            .into());
        }
        Ok(Self { images, classes })
    }
    /// The number of samples.
    pub fn len(&self) -> usize {
        self.classes.len()
    }
    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
    /// The images, scaled to \[0, 1\].
    ///
    /// Shape = \[batch_size, 1, 28, 28\].
    pub fn images(&self) -> &Array4<f32> {
        &self.images
    }
    /// The classes.
    pub fn classes(&self) -> &Array1<u32> {
        &self.classes
    }
    /// Copies the batch to `device`, returning (images, classes) tensors.
    pub fn to_device(&self, device: &Device) -> Result<(Tensor, Tensor)> {
        let x = Tensor::from_vec(
            self.images.iter().copied().collect::<Vec<f32>>(),
            self.images.dim(),
            device,
        )?;
        let t = Tensor::from_vec(self.classes.to_vec(), self.classes.len(), device)?;
        Ok((x, t))
    }
}

/// Iterates over a dataset in batches.
///
/// Batches are assembled on a worker thread, up to `prefetch` ahead of the consumer.
#[derive(Clone, Debug)]
pub struct DataLoader {
    images: ArcArray<u8, Ix4>,
    classes: ArcArray1<u8>,
    batch_size: usize,
    shuffle: bool,
    prefetch: usize,
}

impl DataLoader {
    /// Creates a loader over `images` and `classes`.
    ///
    /// Does not shuffle, prefetches 4 batches.
    ///
    /// **Errors**
    /// - `batch_size` is 0.
    /// - The number of images and classes differ.
    pub fn new(
        images: ArcArray<u8, Ix4>,
        classes: ArcArray1<u8>,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(DatasetError::BatchSize.into());
        }
        if images.dim().0 != classes.len() {
            return Err(DatasetError::Count {
                what: "classes".into(),
                expected: images.dim().0,
                found: classes.len(),
            }
            .into());
        }
        Ok(Self {
            images,
            classes,
            batch_size,
            shuffle: false,
            prefetch: 4,
        })
    }
    /// Whether to shuffle the samples each time the loader is iterated.
    pub fn shuffle(self, shuffle: bool) -> Self {
        Self { shuffle, ..self }
    }
    /// The number of batches assembled ahead of the consumer.
    pub fn prefetch(self, prefetch: usize) -> Self {
        Self { prefetch, ..self }
    }
    /// The batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
    /// The number of samples.
    pub fn len(&self) -> usize {
        self.classes.len()
    }
    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
    /// The number of batches per iteration.
    pub fn num_batches(&self) -> usize {
        (self.len() + self.batch_size - 1) / self.batch_size
    }
    /// Iterates over the batches.
    ///
    /// Only the last batch may be smaller than the batch size.
    pub fn iter(&self) -> Batches {
        let (sender, receiver) = crossbeam_channel::bounded(self.prefetch);
        let images = self.images.clone();
        let classes = self.classes.clone();
        let batch_size = self.batch_size;
        let shuffle = self.shuffle;
        let worker = thread::spawn(move || {
            let mut indices: Vec<usize> = (0..classes.len()).collect();
            if shuffle {
                indices.shuffle(&mut rand::thread_rng());
            }
            for chunk in indices.chunks(batch_size) {
                // the receiver was dropped
                if sender.send(Batch::gather(&images, &classes, chunk)).is_err() {
                    break;
                }
            }
        });
        Batches {
            receiver,
            remaining: self.num_batches(),
            _worker: worker,
        }
    }
}

impl<'a> IntoIterator for &'a DataLoader {
    type Item = Batch;
    type IntoIter = Batches;
    fn into_iter(self) -> Batches {
        self.iter()
    }
}

/// Batch iterator.
///
/// See [`DataLoader::iter()`].
#[derive(Debug)]
pub struct Batches {
    receiver: Receiver<Batch>,
    remaining: usize,
    _worker: JoinHandle<()>,
}

impl Iterator for Batches {
    type Item = Batch;
    fn next(&mut self) -> Option<Batch> {
        let batch = self.receiver.recv().ok()?;
        self.remaining = self.remaining.saturating_sub(1);
        Some(batch)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Batches {}
