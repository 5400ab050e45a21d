/// Batching.
pub mod loader;
/// The MNIST and FashionMNIST datasets.
pub mod mnist;
