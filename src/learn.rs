/// Metrics and timing.
pub mod metric;
/// Neural networks.
pub mod neural_network;
/// Training and evaluation.
pub mod trainer;
