use super::loader::DataLoader;
use crate::{
    error::{DatasetError, IdxKind},
    result::Result,
};
use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::GzDecoder;
use ndarray::{ArcArray, ArcArray1, Array1, Array4, Ix4};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};

const FASHION_LABELS: [&str; 10] = [
    "t-shirt",
    "trouser",
    "pullover",
    "dress",
    "coat",
    "sandal",
    "shirt",
    "sneaker",
    "bag",
    "ankle boot",
];

const DIGIT_LABELS: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

const NAMES: [&str; 4] = [
    "train-images-idx3-ubyte",
    "train-labels-idx1-ubyte",
    "t10k-images-idx3-ubyte",
    "t10k-labels-idx1-ubyte",
];

/// The kind of Mnist.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MnistKind {
    /// [MNIST](<http://yann.lecun.com/exdb/mnist/>)
    Digits,
    /// [FashionMNIST](<https://github.com/zalandoresearch/fashion-mnist>)
    #[default]
    Fashion,
}

impl MnistKind {
    fn folder(&self) -> &'static str {
        match self {
            Self::Digits => "mnist",
            Self::Fashion => "fashion-mnist",
        }
    }
    #[cfg_attr(not(feature = "download"), allow(unused))]
    fn url(&self, name: &str) -> String {
        match self {
            Self::Digits => format!("https://ossci-datasets.s3.amazonaws.com/mnist/{name}.gz"),
            Self::Fashion => {
                format!("http://fashion-mnist.s3-website.eu-central-1.amazonaws.com/{name}.gz")
            }
        }
    }
    /// The text labels, indexed by class.
    pub fn text_labels(&self) -> &'static [&'static str; 10] {
        match self {
            Self::Digits => &DIGIT_LABELS,
            Self::Fashion => &FASHION_LABELS,
        }
    }
    /// The text label of `class`, or None if `class` is out of range.
    pub fn text_label(&self, class: usize) -> Option<&'static str> {
        self.text_labels().get(class).copied()
    }
}

/// Mnist builder.
pub mod builders {
    use super::{Mnist, MnistKind, Result};
    use std::path::Path;

    /// Mnist builder.
    #[derive(Debug)]
    pub struct MnistBuilder<'a> {
        pub(super) path: Option<&'a Path>,
        pub(super) kind: MnistKind,
        pub(super) download: bool,
    }

    impl Default for MnistBuilder<'_> {
        fn default() -> Self {
            Self {
                path: None,
                kind: MnistKind::Fashion,
                download: false,
            }
        }
    }

    impl MnistBuilder<'_> {
        /// The path to load the dataset from.
        ///
        /// Files are downloaded to / loaded from a folder named after the kind inside `path`. If not specified, uses the OS specific "Downloads" directory or the "Temp" directory.
        pub fn path(self, path: &Path) -> MnistBuilder {
            MnistBuilder {
                path: Some(path),
                kind: self.kind,
                download: self.download,
            }
        }
        /// The kind of Mnist to use. Defaults to [`MnistKind::Fashion`].
        pub fn kind(self, kind: MnistKind) -> Self {
            Self { kind, ..self }
        }
        /// Whether to download missing files. Defaults to false.
        pub fn download(self, download: bool) -> Self {
            Self { download, ..self }
        }
        /// Builds the dataset.
        ///
        /// **Errors**
        /// - The download failed.
        /// - The files were not found.
        /// - Decompressing / loading the data failed.
        pub fn build(&self) -> Result<Mnist> {
            Mnist::build(self)
        }
    }
}
use builders::MnistBuilder;

/// The MNIST / FashionMNIST dataset.
#[derive(Clone, Debug)]
pub struct Mnist {
    kind: MnistKind,
    train_images: ArcArray<u8, Ix4>,
    train_classes: ArcArray1<u8>,
    test_images: ArcArray<u8, Ix4>,
    test_classes: ArcArray1<u8>,
}

impl Mnist {
    /// Returns an [`MnistBuilder`] used to specify options.
    pub fn builder() -> MnistBuilder<'static> {
        MnistBuilder::default()
    }
    fn build(builder: &MnistBuilder) -> Result<Self> {
        let mnist_path = builder
            .path
            .map(Path::to_owned)
            .unwrap_or_else(|| dirs::download_dir().unwrap_or_else(std::env::temp_dir))
            .join(builder.kind.folder());
        let gz_path = |name: &str| mnist_path.join(name).with_extension("gz");
        if builder.download {
            fs::create_dir_all(&mnist_path)?;
            for name in NAMES.iter().filter(|name| !gz_path(name).exists()) {
                download(&builder.kind.url(name), &gz_path(name))?;
            }
        }
        let (train_images, train_classes, test_images, test_classes) = (
            read_idx(&gz_path(NAMES[0]), IdxKind::Images)?,
            read_idx(&gz_path(NAMES[1]), IdxKind::Labels)?,
            read_idx(&gz_path(NAMES[2]), IdxKind::Images)?,
            read_idx(&gz_path(NAMES[3]), IdxKind::Labels)?,
        );
        let mnist = Self::from_arrays(
            builder.kind,
            (
                Array4::from_shape_vec([train_images.0, 1, 28, 28], train_images.1)?,
                Array1::from(train_classes.1),
            ),
            (
                Array4::from_shape_vec([test_images.0, 1, 28, 28], test_images.1)?,
                Array1::from(test_classes.1),
            ),
        )?;
        tracing::info!(
            "loaded {:?} from {:?}: {} train, {} test",
            builder.kind,
            mnist_path,
            mnist.train_len(),
            mnist.test_len(),
        );
        Ok(mnist)
    }
    /// Creates the dataset from (images, classes) pairs for the train and test sets.
    ///
    /// **Errors**
    /// - The number of images and classes differ.
    pub fn from_arrays(
        kind: MnistKind,
        train: (Array4<u8>, Array1<u8>),
        test: (Array4<u8>, Array1<u8>),
    ) -> Result<Self> {
        for (what, (images, classes)) in [("train", &train), ("test", &test)] {
            if images.dim().0 != classes.len() {
                return Err(DatasetError::Count {
                    what: format!("{what} classes"),
                    expected: images.dim().0,
                    found: classes.len(),
                }
                .into());
            }
        }
        Ok(Self {
            kind,
            train_images: train.0.into_shared(),
            train_classes: train.1.into_shared(),
            test_images: test.0.into_shared(),
            test_classes: test.1.into_shared(),
        })
    }
    /// The kind.
    pub fn kind(&self) -> MnistKind {
        self.kind
    }
    /// The number of training samples.
    pub fn train_len(&self) -> usize {
        self.train_classes.len()
    }
    /// The number of test samples.
    pub fn test_len(&self) -> usize {
        self.test_classes.len()
    }
    /// The training images.
    ///
    /// Shape = \[60_000, 1, 28, 28\].
    pub fn train_images(&self) -> &ArcArray<u8, Ix4> {
        &self.train_images
    }
    /// The training classes.
    ///
    /// The classes range from 0 to 9 inclusive.
    pub fn train_classes(&self) -> &ArcArray1<u8> {
        &self.train_classes
    }
    /// The test images.
    ///
    /// Shape = \[10_000, 1, 28, 28\].
    pub fn test_images(&self) -> &ArcArray<u8, Ix4> {
        &self.test_images
    }
    /// The test classes.
    pub fn test_classes(&self) -> &ArcArray1<u8> {
        &self.test_classes
    }
    /// A shuffled loader over the training set.
    ///
    /// **Errors**
    /// - `batch_size` is 0.
    pub fn train_loader(&self, batch_size: usize) -> Result<DataLoader> {
        Ok(DataLoader::new(
            self.train_images.clone(),
            self.train_classes.clone(),
            batch_size,
        )?
        .shuffle(true))
    }
    /// An ordered loader over the test set.
    ///
    /// **Errors**
    /// - `batch_size` is 0.
    pub fn test_loader(&self, batch_size: usize) -> Result<DataLoader> {
        DataLoader::new(
            self.test_images.clone(),
            self.test_classes.clone(),
            batch_size,
        )
    }
}

/// Reads a gzipped IDX file, returning the item count and the payload.
fn read_idx(path: &Path, kind: IdxKind) -> Result<(usize, Vec<u8>)> {
    if !path.exists() {
        return Err(DatasetError::Missing {
            path: path.to_owned(),
        }
        .into());
    }
    let mut decoder = GzDecoder::new(File::open(path)?);
    let magic = decoder.read_i32::<BigEndian>()?;
    if magic != kind.magic() {
        return Err(DatasetError::Magic {
            path: path.to_owned(),
            kind,
            expected: kind.magic(),
            found: magic,
        }
        .into());
    }
    let n = decoder.read_i32::<BigEndian>()?.max(0) as usize;
    let item_len = match kind {
        IdxKind::Images => {
            let rows = decoder.read_i32::<BigEndian>()?;
            let cols = decoder.read_i32::<BigEndian>()?;
            if (rows, cols) != (28, 28) {
                return Err(DatasetError::Dims {
                    path: path.to_owned(),
                    rows,
                    cols,
                }
                .into());
            }
            28 * 28
        }
        IdxKind::Labels => 1,
    };
    // the header count is untrusted, read at most one byte past it
    let expected = n.saturating_mul(item_len);
    let limit = u64::try_from(expected).unwrap_or(u64::MAX).saturating_add(1);
    let mut data = Vec::new();
    decoder.take(limit).read_to_end(&mut data)?;
    if n.checked_mul(item_len) != Some(data.len()) {
        return Err(DatasetError::Count {
            what: format!("{}", path.display()),
            expected,
            found: data.len(),
        }
        .into());
    }
    Ok((n, data))
}

#[cfg(feature = "download")]
fn download(url: &str, path: &Path) -> Result<()> {
    use curl::easy::Easy;
    use indicatif::{ProgressBar, ProgressStyle};
    use std::io::Write;

    tracing::debug!("downloading {url} to {path:?}");
    let style = ProgressStyle::default_bar()
        .template("{msg} [{bar}] {bytes:>9}/{total_bytes:9} [eta: {eta}]")?
        .progress_chars("=> ");
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bar = ProgressBar::new(0).with_style(style).with_message(name);
    let part_path = PathBuf::from(format!("{}.part", path.display()));
    let mut file = File::create(&part_path)?;
    let mut easy = Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.fail_on_error(true)?;
    easy.progress(true)?;
    {
        let mut transfer = easy.transfer();
        // returning less than data.len() aborts the transfer
        transfer.write_function(|data| Ok(file.write_all(data).map_or(0, |_| data.len())))?;
        transfer.progress_function(|total, done, _, _| {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
            true
        })?;
        transfer.perform()?;
    }
    bar.finish();
    file.flush()?;
    fs::rename(&part_path, path)?;
    Ok(())
}

#[cfg(not(feature = "download"))]
fn download(url: &str, _path: &Path) -> Result<()> {
    anyhow::bail!("unable to download {url}, requires the `download` feature")
}
