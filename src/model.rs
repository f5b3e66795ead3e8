//! Regression network definition.
//!
//! A deliberately thin multilayer perceptron: dense layers over `ndarray`
//! matrices, per-layer activation from an exhaustive enum, serde-backed
//! persistence. Topology (hidden widths, activations) comes entirely from
//! configuration; the training loop in [`crate::trainer`] treats the
//! network as a swappable component.

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::Rng;
use std::fs::File;
use std::path::Path;

/// Activation function, applied element-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Activation {
    /// f(x) = x
    Identity,
    /// f(x) = max(0, x)
    Relu,
    /// Gaussian error linear unit (tanh approximation)
    Gelu,
    /// f(x) = tanh(x)
    Tanh,
    /// f(x) = 1 / (1 + e^-x)
    Sigmoid,
}

// Constant of the GELU tanh approximation: sqrt(2 / pi).
const GELU_C: f64 = 0.797_884_560_802_865_4;
const GELU_A: f64 = 0.044_715;

impl Activation {
    /// Apply the activation to a pre-activation value.
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Activation::Identity => x,
            Activation::Relu => x.max(0.0),
            Activation::Gelu => {
                let inner = GELU_C * (x + GELU_A * x.powi(3));
                0.5 * x * (1.0 + inner.tanh())
            }
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }

    /// Derivative with respect to the pre-activation value.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            Activation::Identity => 1.0,
            Activation::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Gelu => {
                let inner = GELU_C * (x + GELU_A * x.powi(3));
                let t = inner.tanh();
                let sech2 = 1.0 - t * t;
                0.5 * (1.0 + t) + 0.5 * x * sech2 * GELU_C * (1.0 + 3.0 * GELU_A * x * x)
            }
            Activation::Tanh => 1.0 - x.tanh().powi(2),
            Activation::Sigmoid => {
                let s = 1.0 / (1.0 + (-x).exp());
                s * (1.0 - s)
            }
        }
    }
}

/// One hidden layer of the regression network.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct LayerSpec {
    /// Number of units
    pub width: usize,

    /// Activation applied to the layer output
    pub activation: Activation,
}

/// Fully connected layer.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DenseLayer {
    /// `[n_in, n_out]` weight matrix
    pub weights: Array2<f64>,
    /// `[n_out]` bias vector
    pub biases: Array1<f64>,
    /// Activation on the layer output
    pub activation: Activation,
}

impl DenseLayer {
    /// Scaled uniform (Glorot) initialization.
    pub fn new(n_in: usize, n_out: usize, activation: Activation, rng: &mut StdRng) -> Self {
        let scale = (6.0 / (n_in + n_out) as f64).sqrt();
        let weights = Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-scale..scale));
        Self {
            weights,
            biases: Array1::zeros(n_out),
            activation,
        }
    }

    /// Batched forward pass, returning pre-activations and activations.
    pub fn forward(&self, inputs: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let z = inputs.dot(&self.weights) + &self.biases;
        let a = z.mapv(|v| self.activation.apply(v));
        (z, a)
    }
}

/// Per-batch forward cache used by backpropagation.
pub struct ForwardCache {
    /// Layer inputs: the batch, then each layer's activation
    pub activations: Vec<Array2<f64>>,
    /// Pre-activation values per layer
    pub pre_activations: Vec<Array2<f64>>,
}

impl ForwardCache {
    /// Final layer output, one prediction per batch row.
    pub fn output(&self) -> Array1<f64> {
        self.activations
            .last()
            .map(|a| a.column(0).to_owned())
            .unwrap_or_else(|| Array1::zeros(0))
    }
}

/// Multilayer perceptron with a single output unit.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Mlp {
    /// Layers, input to output order
    pub layers: Vec<DenseLayer>,
}

impl Mlp {
    /// Build a network from configuration.
    pub fn new(
        input_size: usize,
        hidden: &[LayerSpec],
        output_activation: Activation,
        rng: &mut StdRng,
    ) -> Self {
        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut n_in = input_size;
        for spec in hidden {
            layers.push(DenseLayer::new(n_in, spec.width, spec.activation, rng));
            n_in = spec.width;
        }
        layers.push(DenseLayer::new(n_in, 1, output_activation, rng));
        Self { layers }
    }

    /// Number of input features the network expects.
    pub fn input_size(&self) -> usize {
        self.layers.first().map(|l| l.weights.nrows()).unwrap_or(0)
    }

    /// Forward pass retaining the per-layer cache for backpropagation.
    pub fn forward(&self, inputs: &Array2<f64>) -> ForwardCache {
        let mut activations = vec![inputs.clone()];
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (z, a) = layer.forward(activations.last().unwrap_or(inputs));
            pre_activations.push(z);
            activations.push(a);
        }
        ForwardCache {
            activations,
            pre_activations,
        }
    }

    /// Predict one value per input row.
    pub fn predict(&self, inputs: &Array2<f64>) -> Array1<f64> {
        self.forward(inputs).output()
    }

    /// Gradients of the mean-squared-error loss for one batch.
    ///
    /// Returns `(weight_grads, bias_grads)` in layer order.
    pub fn mse_gradients(
        &self,
        cache: &ForwardCache,
        targets: &Array1<f64>,
    ) -> (Vec<Array2<f64>>, Vec<Array1<f64>>) {
        let batch = targets.len().max(1) as f64;
        let predictions = cache.output();

        // dL/da for the output column, shaped as a column matrix.
        let residual = &predictions - targets;
        let mut delta =
            Array2::from_shape_fn((targets.len(), 1), |(i, _)| 2.0 * residual[i] / batch);

        let n_layers = self.layers.len();
        let mut weight_grads = vec![Array2::zeros((0, 0)); n_layers];
        let mut bias_grads = vec![Array1::zeros(0); n_layers];

        for i in (0..n_layers).rev() {
            let z = &cache.pre_activations[i];
            let act = self.layers[i].activation;
            let local = &delta * &z.mapv(|v| act.derivative(v));

            weight_grads[i] = cache.activations[i].t().dot(&local);
            bias_grads[i] = local.sum_axis(Axis(0));

            if i > 0 {
                delta = local.dot(&self.layers[i].weights.t());
            }
        }

        (weight_grads, bias_grads)
    }

    /// Persist the network as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer(file, self)
            .map_err(|e| PipelineError::Artifact(format!("Failed to write model: {e}")))
    }

    /// Load a previously persisted network.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file)
            .map_err(|e| PipelineError::Artifact(format!("Failed to read model: {e}")))
    }
}

/// Mean squared error between predictions and targets.
pub fn mse(predictions: &Array1<f64>, targets: &Array1<f64>) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let diff = predictions - targets;
    diff.mapv(|d| d * d).sum() / targets.len() as f64
}

/// Mean absolute error between predictions and targets.
pub fn mae(predictions: &Array1<f64>, targets: &Array1<f64>) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let diff = predictions - targets;
    diff.mapv(f64::abs).sum() / targets.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn tiny_net(seed: u64) -> Mlp {
        let mut rng = StdRng::seed_from_u64(seed);
        Mlp::new(
            3,
            &[LayerSpec {
                width: 4,
                activation: Activation::Tanh,
            }],
            Activation::Identity,
            &mut rng,
        )
    }

    #[test]
    fn forward_shapes_follow_topology() {
        let net = tiny_net(1);
        let inputs = Array2::zeros((5, 3));
        let cache = net.forward(&inputs);

        assert_eq!(cache.activations.len(), 3);
        assert_eq!(cache.pre_activations[0].dim(), (5, 4));
        assert_eq!(cache.pre_activations[1].dim(), (5, 1));
        assert_eq!(cache.output().len(), 5);
    }

    #[test]
    fn same_seed_builds_identical_networks() {
        let a = tiny_net(99);
        let b = tiny_net(99);
        assert_eq!(a.layers[0].weights, b.layers[0].weights);
    }

    #[test]
    fn activations_match_definitions() {
        assert_eq!(Activation::Relu.apply(-2.0), 0.0);
        assert_eq!(Activation::Relu.apply(2.0), 2.0);
        assert_eq!(Activation::Identity.apply(-7.5), -7.5);
        assert!((Activation::Sigmoid.apply(0.0) - 0.5).abs() < 1e-12);
        // GELU is near-linear for large positive inputs, near-zero for
        // large negative ones.
        assert!((Activation::Gelu.apply(10.0) - 10.0).abs() < 1e-6);
        assert!(Activation::Gelu.apply(-10.0).abs() < 1e-6);
    }

    #[test]
    fn gelu_derivative_matches_finite_difference() {
        let eps = 1e-6;
        for &x in &[-2.0, -0.5, 0.0, 0.3, 1.7] {
            let numeric =
                (Activation::Gelu.apply(x + eps) - Activation::Gelu.apply(x - eps)) / (2.0 * eps);
            let analytic = Activation::Gelu.derivative(x);
            assert!(
                (numeric - analytic).abs() < 1e-5,
                "derivative mismatch at {x}: {numeric} vs {analytic}"
            );
        }
    }

    #[test]
    fn mse_gradients_match_finite_difference() {
        let mut net = tiny_net(7);
        let inputs = array![[0.2, -0.1, 0.5], [0.9, 0.3, -0.4]];
        let targets = array![0.7, -0.2];

        let cache = net.forward(&inputs);
        let (weight_grads, _) = net.mse_gradients(&cache, &targets);

        let eps = 1e-6;
        let base = mse(&net.predict(&inputs), &targets);
        let original = net.layers[0].weights[[0, 0]];

        net.layers[0].weights[[0, 0]] = original + eps;
        let bumped = mse(&net.predict(&inputs), &targets);
        net.layers[0].weights[[0, 0]] = original;

        let numeric = (bumped - base) / eps;
        let analytic = weight_grads[0][[0, 0]];
        assert!(
            (numeric - analytic).abs() < 1e-4,
            "gradient mismatch: {numeric} vs {analytic}"
        );
    }

    #[test]
    fn model_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let net = tiny_net(3);
        net.save(&path).unwrap();
        let loaded = Mlp::load(&path).unwrap();

        let inputs = array![[0.1, 0.2, 0.3]];
        assert_eq!(net.predict(&inputs), loaded.predict(&inputs));
    }
}
