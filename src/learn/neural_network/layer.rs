use crate::error::ShapeError;
use candle_core::{Module, Tensor};
use candle_nn::{Conv2d, Linear};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// Activation applied to the output of a [`Conv`] or [`Dense`] layer.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// 1 / (1 + exp(-x))
    #[display(fmt = "sigmoid")]
    Sigmoid,
    /// max(x, 0)
    #[display(fmt = "relu")]
    Relu,
}

impl Activation {
    fn apply(&self, input: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::Sigmoid => candle_nn::ops::sigmoid(input),
            Self::Relu => input.relu(),
        }
    }
}

/// A layer of a sequential network.
///
/// Layers are declarative: they describe hyper-parameters only. The number of inputs
/// of each layer is inferred from the previous layer when the [`Network`](super::Network)
/// is built, and parameters are allocated then.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    /// Convolution.
    Conv(Conv),
    /// Pooling.
    Pool(Pool),
    /// Dense.
    Dense(Dense),
}

impl From<Conv> for Layer {
    fn from(conv: Conv) -> Self {
        Self::Conv(conv)
    }
}

impl From<Pool> for Layer {
    fn from(pool: Pool) -> Self {
        Self::Pool(pool)
    }
}

impl From<Dense> for Layer {
    fn from(dense: Dense) -> Self {
        Self::Dense(dense)
    }
}

impl Layer {
    /// The name prefix, ie "conv".
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Conv(_) => "conv",
            Self::Pool(_) => "pool",
            Self::Dense(_) => "dense",
        }
    }
    /// Computes the output shape for `input`, excluding the batch dimension.
    ///
    /// **Errors**
    /// - A hyper-parameter is 0.
    /// - A spatial dimension would be reduced to 0.
    /// - A [`Conv`] or [`Pool`] follows a [`Dense`].
    pub fn output_dims(&self, name: &str, input: &[usize]) -> Result<Vec<usize>, ShapeError> {
        let zero = |param| ShapeError::Zero {
            layer: name.to_string(),
            param,
        };
        let spatial = |input: &[usize]| -> Result<[usize; 3], ShapeError> {
            <[usize; 3]>::try_from(input).map_err(|_| ShapeError::Flattened {
                layer: name.to_string(),
                input: input.to_vec(),
            })
        };
        let incompatible = || ShapeError::Incompatible {
            layer: name.to_string(),
            input: input.to_vec(),
        };
        match self {
            Self::Conv(conv) => {
                if conv.outputs == 0 {
                    return Err(zero("outputs"));
                }
                if conv.kernel == 0 {
                    return Err(zero("kernel"));
                }
                if conv.strides == 0 {
                    return Err(zero("strides"));
                }
                let [_, h, w] = spatial(input)?;
                let out = |x: usize| {
                    (x + 2 * conv.padding)
                        .checked_sub(conv.kernel)
                        .map(|x| x / conv.strides + 1)
                };
                match (out(h), out(w)) {
                    (Some(h), Some(w)) => Ok(vec![conv.outputs, h, w]),
                    _ => Err(incompatible()),
                }
            }
            Self::Pool(pool) => {
                if pool.size == 0 {
                    return Err(zero("size"));
                }
                if pool.strides == 0 {
                    return Err(zero("strides"));
                }
                let [c, h, w] = spatial(input)?;
                let out = |x: usize| x.checked_sub(pool.size).map(|x| x / pool.strides + 1);
                match (out(h), out(w)) {
                    (Some(h), Some(w)) => Ok(vec![c, h, w]),
                    _ => Err(incompatible()),
                }
            }
            Self::Dense(dense) => {
                if dense.outputs == 0 {
                    return Err(zero("outputs"));
                }
                Ok(vec![dense.outputs])
            }
        }
    }
}

/// Convolutional layer.
///
/// Square kernels only. The bias is always present.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv {
    outputs: usize,
    kernel: usize,
    #[serde(default)]
    padding: usize,
    #[serde(default = "one")]
    strides: usize,
    #[serde(default)]
    activation: Option<Activation>,
}

fn one() -> usize {
    1
}

impl Conv {
    /// Creates a new [`Conv`] with `outputs` channels and a `kernel` x `kernel` filter.
    ///
    /// Defaults:
    /// - padding: 0
    /// - strides: 1
    /// - activation: None
    ///
    /// # Example
    /// ```
    /// # use lenet::learn::neural_network::layer::{Activation, Conv};
    /// let conv = Conv::from_outputs_kernel(6, 5)
    ///     .with_padding(2)
    ///     .with_activation(Activation::Sigmoid);
    /// ```
    pub fn from_outputs_kernel(outputs: usize, kernel: usize) -> Self {
        Self {
            outputs,
            kernel,
            padding: 0,
            strides: 1,
            activation: None,
        }
    }
    /// Adds zero `padding` to both sides of each spatial dimension.
    pub fn with_padding(self, padding: usize) -> Self {
        Self { padding, ..self }
    }
    /// Adds `strides`.
    pub fn with_strides(self, strides: usize) -> Self {
        Self { strides, ..self }
    }
    /// Adds an activation.
    pub fn with_activation(self, activation: Activation) -> Self {
        Self {
            activation: Some(activation),
            ..self
        }
    }
    /// The number of output channels.
    pub fn outputs(&self) -> usize {
        self.outputs
    }
    /// The kernel size.
    pub fn kernel(&self) -> usize {
        self.kernel
    }
    /// The padding.
    pub fn padding(&self) -> usize {
        self.padding
    }
    /// The strides.
    pub fn strides(&self) -> usize {
        self.strides
    }
    /// The activation.
    pub fn activation(&self) -> Option<Activation> {
        self.activation
    }
}

impl Debug for Conv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("Conv");
        builder.field("outputs", &self.outputs);
        builder.field("kernel", &self.kernel);
        if self.padding != 0 {
            builder.field("padding", &self.padding);
        }
        if self.strides != 1 {
            builder.field("strides", &self.strides);
        }
        if let Some(activation) = self.activation.as_ref() {
            builder.field("activation", activation);
        }
        builder.finish()
    }
}

/// The reduction of a [`Pool`].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// Average.
    #[display(fmt = "mean")]
    Mean,
    /// Maximum.
    #[display(fmt = "max")]
    Max,
}

/// Pooling layer.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    kind: PoolKind,
    size: usize,
    strides: usize,
}

impl Pool {
    /// Creates a new average pool with a `size` x `size` window.
    ///
    /// Defaults:
    /// - strides: size (non-overlapping)
    pub fn mean(size: usize) -> Self {
        Self {
            kind: PoolKind::Mean,
            size,
            strides: size,
        }
    }
    /// Creates a new max pool with a `size` x `size` window.
    ///
    /// Defaults:
    /// - strides: size (non-overlapping)
    pub fn max(size: usize) -> Self {
        Self {
            kind: PoolKind::Max,
            size,
            strides: size,
        }
    }
    /// Adds `strides`.
    pub fn with_strides(self, strides: usize) -> Self {
        Self { strides, ..self }
    }
    /// The kind.
    pub fn kind(&self) -> PoolKind {
        self.kind
    }
    /// The window size.
    pub fn size(&self) -> usize {
        self.size
    }
    /// The strides.
    pub fn strides(&self) -> usize {
        self.strides
    }
}

impl Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ty = match self.kind {
            PoolKind::Mean => "MeanPool",
            PoolKind::Max => "MaxPool",
        };
        let mut builder = f.debug_struct(ty);
        builder.field("size", &self.size);
        if self.strides != self.size {
            builder.field("strides", &self.strides);
        }
        builder.finish()
    }
}

/// Dense / fully connected layer.
///
/// Inputs with more than 2 dimensions are flattened. The bias is always present.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    outputs: usize,
    #[serde(default)]
    activation: Option<Activation>,
}

impl Dense {
    /// Creates a new [`Dense`] with `outputs`.
    pub fn from_outputs(outputs: usize) -> Self {
        Self {
            outputs,
            activation: None,
        }
    }
    /// Adds an activation.
    pub fn with_activation(self, activation: Activation) -> Self {
        Self {
            activation: Some(activation),
            ..self
        }
    }
    /// The number of outputs.
    pub fn outputs(&self) -> usize {
        self.outputs
    }
    /// The activation.
    pub fn activation(&self) -> Option<Activation> {
        self.activation
    }
}

impl Debug for Dense {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("Dense");
        builder.field("outputs", &self.outputs);
        if let Some(activation) = self.activation.as_ref() {
            builder.field("activation", activation);
        }
        builder.finish()
    }
}

/// A layer with its parameters allocated.
#[derive(Clone, Debug)]
pub(super) enum Built {
    Conv {
        conv: Conv2d,
        activation: Option<Activation>,
    },
    Pool(Pool),
    Dense {
        linear: Linear,
        activation: Option<Activation>,
    },
}

impl Module for Built {
    fn forward(&self, input: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::Conv { conv, activation } => {
                let y = conv.forward(input)?;
                match activation {
                    Some(activation) => activation.apply(&y),
                    None => Ok(y),
                }
            }
            Self::Pool(pool) => match pool.kind {
                PoolKind::Mean => input.avg_pool2d_with_stride(pool.size, pool.strides),
                PoolKind::Max => input.max_pool2d_with_stride(pool.size, pool.strides),
            },
            Self::Dense { linear, activation } => {
                let y = if input.rank() > 2 {
                    linear.forward(&input.flatten_from(1)?)?
                } else {
                    linear.forward(input)?
                };
                match activation {
                    Some(activation) => activation.apply(&y),
                    None => Ok(y),
                }
            }
        }
    }
}
