/*!
Sequential networks.

A [`Network`] is built from a list of declarative [`Layer`]s and the shape of one input sample.
Shapes are inferred layer by layer, so mismatches are reported before any parameters are allocated.

```no_run
# use lenet::{result::Result, learn::neural_network::Network};
# use candle_core::Device;
# fn main() -> Result<()> {
let net = Network::lenet5(&Device::Cpu)?;
// conv0 output shape:	[1, 6, 28, 28]
// pool0 output shape:	[1, 6, 14, 14]
// ...
net.print_shapes()?;
# Ok(())
# }
```
*/
use crate::{error::ShapeError, result::Result};
use candle_core::{DType, Device, Module, Tensor, Var};
use candle_nn::{Conv2d, Conv2dConfig, Init, Linear};
use layer::{Activation, Built, Conv, Dense, Pool};
use serde::{Deserialize, Serialize};

/// Layers.
pub mod layer;
use layer::Layer;

#[cfg(test)]
mod tests;

/// The LeNet-5 topology, for 1 x 28 x 28 inputs and 10 classes.
///
/// Sigmoid activations and average pooling, as in the original architecture. The first convolution is padded by 2 so that
/// 28 x 28 images are treated like the original 32 x 32 inputs.
pub fn lenet5() -> Vec<Layer> {
    vec![
        Conv::from_outputs_kernel(6, 5)
            .with_padding(2)
            .with_activation(Activation::Sigmoid)
            .into(),
        Pool::mean(2).with_strides(2).into(),
        Conv::from_outputs_kernel(16, 5)
            .with_activation(Activation::Sigmoid)
            .into(),
        Pool::mean(2).with_strides(2).into(),
        Dense::from_outputs(120)
            .with_activation(Activation::Sigmoid)
            .into(),
        Dense::from_outputs(84)
            .with_activation(Activation::Sigmoid)
            .into(),
        Dense::from_outputs(10).into(),
    ]
}

/// Parameter initialization.
///
/// Biases are always initialized to 0.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initializer {
    /// Uniform in (-scale, scale).
    Uniform(f64),
    /// Normal with mean 0.
    Normal(f64),
    /// Uniform in (-a, a) where a = sqrt(6 / (fan_in + fan_out)).
    Xavier,
}

impl Default for Initializer {
    fn default() -> Self {
        Self::Uniform(0.07)
    }
}

impl Initializer {
    fn init(&self, fan_in: usize, fan_out: usize) -> Init {
        match *self {
            Self::Uniform(scale) => Init::Uniform {
                lo: -scale,
                up: scale,
            },
            Self::Normal(stdev) => Init::Randn { mean: 0., stdev },
            Self::Xavier => {
                let a = (6. / (fan_in + fan_out) as f64).sqrt();
                Init::Uniform { lo: -a, up: a }
            }
        }
    }
}

/// A sequential network.
#[derive(Clone, Debug)]
pub struct Network {
    layers: Vec<Layer>,
    names: Vec<String>,
    input_dims: [usize; 3],
    // output dims of each layer, excluding the batch dimension
    dims: Vec<Vec<usize>>,
    modules: Vec<Built>,
    parameters: Vec<(String, Var)>,
    device: Device,
}

impl Network {
    /// Builds a network from `layers` for inputs of shape `input_dims` (channels, height, width).
    ///
    /// Parameters are allocated on `device` and initialized with [`Initializer::default()`].
    ///
    /// **Errors**
    /// - See [`Layer::output_dims()`].
    /// - Parameters could not be allocated.
    pub fn new(layers: Vec<Layer>, input_dims: [usize; 3], device: &Device) -> Result<Self> {
        if layers.is_empty() {
            return Err(ShapeError::Empty.into());
        }
        let mut counts = [0usize; 3];
        let names: Vec<String> = layers
            .iter()
            .map(|layer| {
                let count = match layer {
                    Layer::Conv(_) => &mut counts[0],
                    Layer::Pool(_) => &mut counts[1],
                    Layer::Dense(_) => &mut counts[2],
                };
                let name = format!("{}{}", layer.prefix(), count);
                *count += 1;
                name
            })
            .collect();
        let mut dims = Vec::with_capacity(layers.len());
        let mut input = input_dims.to_vec();
        for (layer, name) in layers.iter().zip(names.iter()) {
            input = layer.output_dims(name, &input)?;
            dims.push(input.clone());
        }
        let mut network = Self {
            layers,
            names,
            input_dims,
            dims,
            modules: Vec::new(),
            parameters: Vec::new(),
            device: device.clone(),
        };
        network.initialize(Initializer::default(), device)?;
        Ok(network)
    }
    /// Builds [`lenet5()`] for 1 x 28 x 28 inputs.
    pub fn lenet5(device: &Device) -> Result<Self> {
        Self::new(lenet5(), [1, 28, 28], device)
    }
    /// (Re)initializes all parameters with `init` on `device`.
    ///
    /// Previous parameters are discarded, so an optimizer bound to them must be recreated.
    pub fn initialize(&mut self, init: Initializer, device: &Device) -> Result<()> {
        let mut modules = Vec::with_capacity(self.layers.len());
        let mut parameters = Vec::new();
        let layer_inputs =
            std::iter::once(self.input_dims.to_vec()).chain(self.dims.iter().cloned());
        for ((layer, name), input) in self.layers.iter().zip(self.names.iter()).zip(layer_inputs) {
            let module = match layer {
                Layer::Conv(conv) => {
                    let (inputs, k) = (input[0], conv.kernel());
                    let fan_in = inputs * k * k;
                    let fan_out = conv.outputs() * k * k;
                    let weight = init.init(fan_in, fan_out).var(
                        (conv.outputs(), inputs, k, k),
                        DType::F32,
                        device,
                    )?;
                    let bias = Init::Const(0.).var(conv.outputs(), DType::F32, device)?;
                    let config = Conv2dConfig {
                        padding: conv.padding(),
                        stride: conv.strides(),
                        ..Default::default()
                    };
                    let module = Built::Conv {
                        conv: Conv2d::new(
                            weight.as_tensor().clone(),
                            Some(bias.as_tensor().clone()),
                            config,
                        ),
                        activation: conv.activation(),
                    };
                    parameters.push((format!("{name}.weight"), weight));
                    parameters.push((format!("{name}.bias"), bias));
                    module
                }
                Layer::Pool(pool) => Built::Pool(pool.clone()),
                Layer::Dense(dense) => {
                    let inputs: usize = input.iter().product();
                    let weight = init.init(inputs, dense.outputs()).var(
                        (dense.outputs(), inputs),
                        DType::F32,
                        device,
                    )?;
                    let bias = Init::Const(0.).var(dense.outputs(), DType::F32, device)?;
                    let module = Built::Dense {
                        linear: Linear::new(
                            weight.as_tensor().clone(),
                            Some(bias.as_tensor().clone()),
                        ),
                        activation: dense.activation(),
                    };
                    parameters.push((format!("{name}.weight"), weight));
                    parameters.push((format!("{name}.bias"), bias));
                    module
                }
            };
            modules.push(module);
        }
        self.modules = modules;
        self.parameters = parameters;
        self.device = device.clone();
        Ok(())
    }
    /// The layers.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
    /// The layer names, ie "conv0", "pool0", "dense2".
    pub fn names(&self) -> &[String] {
        &self.names
    }
    /// The shape of one input sample (channels, height, width).
    pub fn input_dims(&self) -> [usize; 3] {
        self.input_dims
    }
    /// The inferred output shape of each layer, excluding the batch dimension.
    pub fn output_dims(&self) -> &[Vec<usize>] {
        &self.dims
    }
    /// The device the parameters are on.
    pub fn device(&self) -> &Device {
        &self.device
    }
    /// The named parameters, in layer order.
    pub fn parameters(&self) -> &[(String, Var)] {
        &self.parameters
    }
    /// The parameters, for binding an optimizer.
    pub fn vars(&self) -> Vec<Var> {
        self.parameters.iter().map(|(_, var)| var.clone()).collect()
    }
    /// The number of trainable scalars.
    pub fn parameter_count(&self) -> usize {
        self.parameters.iter().map(|(_, var)| var.elem_count()).sum()
    }
    /// Runs `input` through each layer, returning the name and output shape of each.
    pub fn forward_shapes(&self, input: &Tensor) -> Result<Vec<(String, Vec<usize>)>> {
        let mut x = input.clone();
        let mut shapes = Vec::with_capacity(self.modules.len());
        for (module, name) in self.modules.iter().zip(self.names.iter()) {
            x = module.forward(&x)?;
            shapes.push((name.clone(), x.dims().to_vec()));
        }
        Ok(shapes)
    }
    /// Prints the output shape of each layer for a single zero input.
    pub fn print_shapes(&self) -> Result<()> {
        let [c, h, w] = self.input_dims;
        let x = Tensor::zeros((1, c, h, w), DType::F32, &self.device)?;
        for (name, dims) in self.forward_shapes(&x)? {
            println!("{name} output shape:\t{dims:?}");
        }
        Ok(())
    }
}

impl Module for Network {
    fn forward(&self, input: &Tensor) -> candle_core::Result<Tensor> {
        self.modules
            .iter()
            .try_fold(input.clone(), |x, module| module.forward(&x))
    }
}
