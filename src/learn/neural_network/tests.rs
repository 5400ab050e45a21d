use super::{
    layer::{Activation, Conv, Dense, Layer, Pool},
    lenet5, Initializer, Network,
};
use crate::error::ShapeError;
use candle_core::{DType, Device, Module, Tensor};

#[test]
fn lenet5_shapes() {
    let net = Network::lenet5(&Device::Cpu).unwrap();
    let x = Tensor::zeros((1, 1, 28, 28), DType::F32, &Device::Cpu).unwrap();
    let shapes = net.forward_shapes(&x).unwrap();
    let expected: [(&str, &[usize]); 7] = [
        ("conv0", &[1, 6, 28, 28]),
        ("pool0", &[1, 6, 14, 14]),
        ("conv1", &[1, 16, 10, 10]),
        ("pool1", &[1, 16, 5, 5]),
        ("dense0", &[1, 120]),
        ("dense1", &[1, 84]),
        ("dense2", &[1, 10]),
    ];
    assert_eq!(shapes.len(), expected.len());
    for ((name, dims), (expected_name, expected_dims)) in shapes.iter().zip(expected) {
        assert_eq!(name, expected_name);
        assert_eq!(dims.as_slice(), expected_dims);
    }
    // inferred shapes agree with the forward pass
    for ((_, dims), inferred) in shapes.iter().zip(net.output_dims()) {
        assert_eq!(&dims[1..], inferred.as_slice());
    }
}

#[test]
fn lenet5_parameter_count() {
    let net = Network::lenet5(&Device::Cpu).unwrap();
    assert_eq!(net.parameters().len(), 10);
    assert_eq!(net.parameters()[0].0, "conv0.weight");
    assert_eq!(net.parameters()[9].0, "dense2.bias");
    assert_eq!(net.parameter_count(), 61_706);
}

#[test]
fn forward_batch() {
    let net = Network::lenet5(&Device::Cpu).unwrap();
    let x = Tensor::rand(0f32, 1f32, (3, 1, 28, 28), &Device::Cpu).unwrap();
    let y = net.forward(&x).unwrap();
    assert_eq!(y.dims(), [3, 10]);
}

#[test]
fn xavier_bounds_and_zero_bias() {
    let mut net = Network::lenet5(&Device::Cpu).unwrap();
    net.initialize(Initializer::Xavier, &Device::Cpu).unwrap();
    let fans = [(25, 150), (150, 400), (400, 120), (120, 84), (84, 10)];
    for (i, (fan_in, fan_out)) in fans.into_iter().enumerate() {
        let a = (6. / (fan_in + fan_out) as f32).sqrt();
        let weight = net.parameters()[2 * i]
            .1
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert!(weight.iter().all(|x| x.abs() <= a + 1e-6), "{}", net.parameters()[2 * i].0);
        let bias = net.parameters()[2 * i + 1].1.to_vec1::<f32>().unwrap();
        assert!(bias.iter().all(|x| *x == 0.));
    }
}

#[test]
fn initialize_replaces_parameters() {
    let mut net = Network::lenet5(&Device::Cpu).unwrap();
    let before = net.parameters()[0].1.as_tensor().clone();
    net.initialize(Initializer::Normal(0.01), &Device::Cpu).unwrap();
    let after = net.parameters()[0].1.as_tensor();
    assert_ne!(before.id(), after.id());
    assert_eq!(before.dims(), after.dims());
}

#[test]
fn input_too_small() {
    let error = Network::new(lenet5(), [1, 8, 8], &Device::Cpu).unwrap_err();
    match error.downcast_ref::<ShapeError>() {
        Some(ShapeError::Incompatible { layer, input }) => {
            assert_eq!(layer, "conv1");
            assert_eq!(input, &[6, 4, 4]);
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn conv_after_dense() {
    let layers: Vec<Layer> = vec![
        Dense::from_outputs(10).into(),
        Conv::from_outputs_kernel(1, 1).into(),
    ];
    let error = Network::new(layers, [1, 28, 28], &Device::Cpu).unwrap_err();
    assert!(matches!(
        error.downcast_ref::<ShapeError>(),
        Some(ShapeError::Flattened { .. })
    ));
}

#[test]
fn zero_outputs() {
    let layers: Vec<Layer> = vec![Dense::from_outputs(0).into()];
    let error = Network::new(layers, [1, 28, 28], &Device::Cpu).unwrap_err();
    assert!(matches!(
        error.downcast_ref::<ShapeError>(),
        Some(ShapeError::Zero { param: "outputs", .. })
    ));
}

#[test]
fn empty() {
    let error = Network::new(Vec::new(), [1, 28, 28], &Device::Cpu).unwrap_err();
    assert!(matches!(
        error.downcast_ref::<ShapeError>(),
        Some(ShapeError::Empty)
    ));
}

#[test]
fn max_pool_relu_variant() {
    let layers: Vec<Layer> = vec![
        Conv::from_outputs_kernel(4, 3)
            .with_padding(1)
            .with_activation(Activation::Relu)
            .into(),
        Pool::max(2).into(),
        Dense::from_outputs(10).into(),
    ];
    let net = Network::new(layers, [1, 28, 28], &Device::Cpu).unwrap();
    assert_eq!(net.output_dims()[1], [4, 14, 14]);
    let x = Tensor::rand(-1f32, 1f32, (2, 1, 28, 28), &Device::Cpu).unwrap();
    let y = net.forward_shapes(&x).unwrap();
    assert_eq!(y[2].1, [2, 10]);
}

#[test]
fn topology_from_json() {
    let json = r#"[
        {"type": "conv", "outputs": 6, "kernel": 5, "padding": 2, "activation": "sigmoid"},
        {"type": "pool", "kind": "mean", "size": 2, "strides": 2},
        {"type": "conv", "outputs": 16, "kernel": 5, "activation": "sigmoid"},
        {"type": "pool", "kind": "mean", "size": 2, "strides": 2},
        {"type": "dense", "outputs": 120, "activation": "sigmoid"},
        {"type": "dense", "outputs": 84, "activation": "sigmoid"},
        {"type": "dense", "outputs": 10}
    ]"#;
    let layers: Vec<Layer> = serde_json::from_str(json).unwrap();
    assert_eq!(layers, lenet5());
}
