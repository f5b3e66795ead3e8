//! Model lifecycle: training runs, early stopping, artifact promotion.
//!
//! The [`TrainingController`] owns the process-local "best validation loss
//! so far" (initialized to +infinity) as an explicit field; there is no
//! global state. Each run trains a fresh network with mini-batch Adam,
//! watches the validation loss after every epoch, and halts once the loss
//! fails to improve for `patience` consecutive epochs.
//!
//! The run's final loss is the **last** observed validation loss, not the
//! best epoch's. That matches the observed behavior of the system this
//! pipeline replaces and is kept deliberately; see DESIGN.md.
//!
//! Promotion is strict: only a run whose final loss is strictly lower
//! than the recorded best persists its model and scaler. Equal or worse
//! runs write nothing, so a numeric failure mid-run can never corrupt a
//! previously promoted artifact.

use crate::config::TrainingConfig;
use crate::error::{PipelineError, Result};
use crate::model::{mae, mse, Mlp};
use crate::partition::SplitBundle;
use crate::scaler::ScalerState;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted model file name inside the artifact directory.
pub const MODEL_FILE: &str = "closing_price_model.json";
/// Persisted scaler file name inside the artifact directory.
pub const SCALER_FILE: &str = "target_scaler.json";

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

/// Loss observations for one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    /// Epoch index, 0-based
    pub epoch: usize,
    /// Mean squared error over the training split
    pub train_loss: f64,
    /// Mean squared error over the validation split
    pub validation_loss: f64,
}

/// Outcome of one training run.
#[derive(Debug, Clone)]
pub struct TrainingResult {
    /// The trained network
    pub model: Mlp,
    /// Last observed validation loss (the run's "final" loss)
    pub final_validation_loss: f64,
    /// Epochs actually run
    pub epochs_run: usize,
    /// Whether early stopping halted the run before `max_epochs`
    pub stopped_early: bool,
    /// Whether this run replaced the persisted best artifact
    pub promoted: bool,
    /// Per-epoch loss history
    pub history: Vec<EpochStats>,
}

/// Metrics from evaluating a model on the held-out test split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationReport {
    /// Mean squared error
    pub mse: f64,
    /// Mean absolute error
    pub mae: f64,
    /// Rows evaluated
    pub n_rows: usize,
}

/// Per-layer Adam accumulator state.
struct AdamState {
    m_weights: Vec<Array2<f64>>,
    v_weights: Vec<Array2<f64>>,
    m_biases: Vec<Array1<f64>>,
    v_biases: Vec<Array1<f64>>,
    step: u64,
}

impl AdamState {
    fn new(model: &Mlp) -> Self {
        Self {
            m_weights: model
                .layers
                .iter()
                .map(|l| Array2::zeros(l.weights.dim()))
                .collect(),
            v_weights: model
                .layers
                .iter()
                .map(|l| Array2::zeros(l.weights.dim()))
                .collect(),
            m_biases: model
                .layers
                .iter()
                .map(|l| Array1::zeros(l.biases.len()))
                .collect(),
            v_biases: model
                .layers
                .iter()
                .map(|l| Array1::zeros(l.biases.len()))
                .collect(),
            step: 0,
        }
    }

    fn update(
        &mut self,
        model: &mut Mlp,
        weight_grads: &[Array2<f64>],
        bias_grads: &[Array1<f64>],
        learning_rate: f64,
    ) {
        self.step += 1;
        let bias1 = 1.0 - ADAM_BETA1.powi(self.step as i32);
        let bias2 = 1.0 - ADAM_BETA2.powi(self.step as i32);

        for (i, layer) in model.layers.iter_mut().enumerate() {
            self.m_weights[i] =
                &self.m_weights[i] * ADAM_BETA1 + &(&weight_grads[i] * (1.0 - ADAM_BETA1));
            self.v_weights[i] = &self.v_weights[i] * ADAM_BETA2
                + &(weight_grads[i].mapv(|g| g * g) * (1.0 - ADAM_BETA2));
            let m_hat = &self.m_weights[i] / bias1;
            let v_hat = &self.v_weights[i] / bias2;
            layer.weights =
                &layer.weights - &(m_hat / (v_hat.mapv(f64::sqrt) + ADAM_EPS) * learning_rate);

            self.m_biases[i] =
                &self.m_biases[i] * ADAM_BETA1 + &(&bias_grads[i] * (1.0 - ADAM_BETA1));
            self.v_biases[i] = &self.v_biases[i] * ADAM_BETA2
                + &(bias_grads[i].mapv(|g| g * g) * (1.0 - ADAM_BETA2));
            let m_hat = &self.m_biases[i] / bias1;
            let v_hat = &self.v_biases[i] / bias2;
            layer.biases =
                &layer.biases - &(m_hat / (v_hat.mapv(f64::sqrt) + ADAM_EPS) * learning_rate);
        }
    }
}

/// Owns the model lifecycle across training runs.
#[derive(Debug)]
pub struct TrainingController {
    artifact_dir: PathBuf,
    best_loss: f64,
}

impl TrainingController {
    /// Create a controller persisting artifacts under `artifact_dir`.
    ///
    /// The best-loss tracker starts at +infinity and lives for this
    /// controller's lifetime only.
    pub fn new<P: AsRef<Path>>(artifact_dir: P) -> Self {
        Self {
            artifact_dir: artifact_dir.as_ref().to_path_buf(),
            best_loss: f64::INFINITY,
        }
    }

    /// Best validation loss recorded across this controller's lifetime.
    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    /// Path of the persisted model artifact.
    pub fn model_path(&self) -> PathBuf {
        self.artifact_dir.join(MODEL_FILE)
    }

    /// Path of the persisted scaler artifact.
    pub fn scaler_path(&self) -> PathBuf {
        self.artifact_dir.join(SCALER_FILE)
    }

    /// Load the promoted model and its scaler.
    pub fn load_best(&self) -> Result<(Mlp, ScalerState)> {
        let model = Mlp::load(self.model_path())?;
        let scaler = ScalerState::load(self.scaler_path())?;
        Ok((model, scaler))
    }

    /// Run one training pass and apply the promotion rule.
    ///
    /// `scaler` is the fitted state that produced `train` and
    /// `validation`; it is persisted alongside the model on promotion so
    /// inference can reproduce the scaling.
    pub fn train(
        &mut self,
        train: &SplitBundle,
        validation: &SplitBundle,
        scaler: &ScalerState,
        config: &TrainingConfig,
    ) -> Result<TrainingResult> {
        config.validate()?;
        if train.n_rows() == 0 {
            return Err(PipelineError::Configuration(
                "training split is empty".to_string(),
            ));
        }
        if validation.n_features() != train.n_features() {
            return Err(PipelineError::Configuration(format!(
                "validation features ({}) do not match training features ({})",
                validation.n_features(),
                train.n_features()
            )));
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut model = Mlp::new(
            train.n_features(),
            &config.hidden,
            config.output_activation,
            &mut rng,
        );
        let mut adam = AdamState::new(&model);

        let n = train.n_rows();
        let batch_size = ((n as f64 * config.batch_fraction).round() as usize).max(1);
        log::info!(
            "Training on {} rows ({} features), batch size {}",
            n,
            train.n_features(),
            batch_size
        );

        let mut order: Vec<usize> = (0..n).collect();
        let mut history = Vec::new();
        let mut best_in_run = f64::INFINITY;
        let mut stalled = 0usize;
        let mut stopped_early = false;
        let mut final_loss = f64::INFINITY;

        for epoch in 0..config.max_epochs {
            order.shuffle(&mut rng);

            let mut squared_error = 0.0;
            for chunk in order.chunks(batch_size) {
                let inputs = train.inputs.select(Axis(0), chunk);
                let targets = train.targets.select(Axis(0), chunk);

                let cache = model.forward(&inputs);
                let predictions = cache.output();
                squared_error += (&predictions - &targets).mapv(|d| d * d).sum();

                let (weight_grads, bias_grads) = model.mse_gradients(&cache, &targets);
                adam.update(&mut model, &weight_grads, &bias_grads, config.learning_rate);
            }
            let train_loss = squared_error / n as f64;

            let validation_loss = mse(&model.predict(&validation.inputs), &validation.targets);
            if !train_loss.is_finite() || !validation_loss.is_finite() {
                return Err(PipelineError::Training(format!(
                    "non-finite loss at epoch {epoch} (train {train_loss}, validation {validation_loss})"
                )));
            }

            history.push(EpochStats {
                epoch,
                train_loss,
                validation_loss,
            });
            final_loss = validation_loss;

            if validation_loss < best_in_run {
                best_in_run = validation_loss;
                stalled = 0;
            } else {
                stalled += 1;
                if stalled >= config.patience {
                    stopped_early = true;
                    log::info!(
                        "Early stopping at epoch {} (no improvement for {} epochs)",
                        epoch,
                        config.patience
                    );
                    break;
                }
            }
        }

        // Promotion: strict improvement over the lifetime best persists
        // both artifacts; anything else is discarded silently.
        let promoted = final_loss < self.best_loss;
        if promoted {
            fs::create_dir_all(&self.artifact_dir)?;
            model.save(self.model_path())?;
            scaler.save(self.scaler_path())?;
            self.best_loss = final_loss;
            log::info!("Promoted model with validation loss {final_loss:.6}");
        }

        Ok(TrainingResult {
            model,
            final_validation_loss: final_loss,
            epochs_run: history.len(),
            stopped_early,
            promoted,
            history,
        })
    }
}

/// Evaluate a model on the held-out test split.
///
/// Reporting only; never touches the controller's best-loss bookkeeping.
pub fn evaluate(model: &Mlp, split: &SplitBundle) -> EvaluationReport {
    let predictions = model.predict(&split.inputs);
    EvaluationReport {
        mse: mse(&predictions, &split.targets),
        mae: mae(&predictions, &split.targets),
        n_rows: split.n_rows(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activation, LayerSpec};
    use crate::scaler::{ColumnScaler, ScalerState};
    use ndarray::{Array1, Array2};

    fn linear_split(n: usize, seed_offset: f64) -> SplitBundle {
        // y = 0.5 * x0 + 0.25 * x1, all values inside [0, 1]
        let inputs = Array2::from_shape_fn((n, 2), |(i, j)| {
            ((i as f64 + seed_offset) * (j as f64 + 1.0) * 0.37) % 1.0
        });
        let targets = Array1::from_shape_fn(n, |i| {
            0.5 * inputs[[i, 0]] + 0.25 * inputs[[i, 1]]
        });
        SplitBundle { inputs, targets }
    }

    fn fast_config(seed: u64) -> TrainingConfig {
        TrainingConfig {
            batch_fraction: 0.25,
            max_epochs: 40,
            patience: 10,
            hidden: vec![LayerSpec {
                width: 8,
                activation: Activation::Tanh,
            }],
            output_activation: Activation::Identity,
            learning_rate: 0.01,
            seed: Some(seed),
        }
    }

    fn dummy_scaler() -> ScalerState {
        let mut state = ScalerState::new();
        state.push("Targets", ColumnScaler::fit(&[0.0, 1.0]));
        state
    }

    #[test]
    fn first_run_is_promoted_and_persists_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = TrainingController::new(dir.path());

        let result = controller
            .train(
                &linear_split(64, 0.0),
                &linear_split(16, 100.0),
                &dummy_scaler(),
                &fast_config(5),
            )
            .unwrap();

        assert!(result.promoted);
        assert_eq!(controller.best_loss(), result.final_validation_loss);
        assert!(controller.model_path().exists());
        assert!(controller.scaler_path().exists());
    }

    #[test]
    fn equal_loss_run_is_not_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = TrainingController::new(dir.path());

        let train = linear_split(64, 0.0);
        let validation = linear_split(16, 100.0);
        let scaler = dummy_scaler();
        let config = fast_config(5);

        let first = controller.train(&train, &validation, &scaler, &config).unwrap();
        assert!(first.promoted);
        let persisted_before = std::fs::read(controller.model_path()).unwrap();

        // Same seed and data: identical final loss, which is not a strict
        // improvement, so the artifact must stay untouched.
        let second = controller.train(&train, &validation, &scaler, &config).unwrap();
        assert_eq!(
            second.final_validation_loss,
            first.final_validation_loss
        );
        assert!(!second.promoted);
        let persisted_after = std::fs::read(controller.model_path()).unwrap();
        assert_eq!(persisted_before, persisted_after);
        assert_eq!(controller.best_loss(), first.final_validation_loss);
    }

    #[test]
    fn strictly_better_run_replaces_the_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = TrainingController::new(dir.path());

        let train = linear_split(64, 0.0);
        let validation = linear_split(16, 100.0);
        let scaler = dummy_scaler();

        // Updates vanish in f64 rounding at this learning rate, so the
        // first run ends at the untrained network's loss.
        let mut weak = fast_config(5);
        weak.max_epochs = 2;
        weak.learning_rate = 1e-30;
        let first = controller.train(&train, &validation, &scaler, &weak).unwrap();
        assert!(first.promoted);
        let persisted_first = std::fs::read(controller.model_path()).unwrap();

        let second = controller
            .train(&train, &validation, &scaler, &fast_config(5))
            .unwrap();
        assert!(
            second.final_validation_loss < first.final_validation_loss,
            "trained run should beat the untrained one: {} vs {}",
            second.final_validation_loss,
            first.final_validation_loss
        );
        assert!(second.promoted);
        assert_eq!(controller.best_loss(), second.final_validation_loss);
        let persisted_second = std::fs::read(controller.model_path()).unwrap();
        assert_ne!(persisted_first, persisted_second);
    }

    #[test]
    fn training_reduces_validation_loss() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = TrainingController::new(dir.path());

        let result = controller
            .train(
                &linear_split(64, 0.0),
                &linear_split(16, 100.0),
                &dummy_scaler(),
                &fast_config(11),
            )
            .unwrap();

        let first = result.history.first().unwrap().validation_loss;
        let last = result.history.last().unwrap().validation_loss;
        assert!(last < first, "expected loss to drop: {first} -> {last}");
    }

    #[test]
    fn early_stopping_bounds_epochs() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = TrainingController::new(dir.path());

        let mut config = fast_config(2);
        config.max_epochs = 500;
        config.patience = 3;
        // Updates this small vanish in f64 rounding, so the validation
        // loss never improves after the first epoch.
        config.learning_rate = 1e-30;

        let result = controller
            .train(
                &linear_split(32, 0.0),
                &linear_split(8, 50.0),
                &dummy_scaler(),
                &config,
            )
            .unwrap();

        assert!(result.stopped_early);
        assert!(result.epochs_run < 500);
        assert_eq!(
            result.final_validation_loss,
            result.history.last().unwrap().validation_loss
        );
    }

    #[test]
    fn batch_size_has_floor_of_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = TrainingController::new(dir.path());

        let mut config = fast_config(1);
        config.batch_fraction = 0.005;
        config.max_epochs = 2;

        // 10 rows * 0.005 rounds to 0; the floor keeps training alive.
        let result = controller
            .train(
                &linear_split(10, 0.0),
                &linear_split(4, 20.0),
                &dummy_scaler(),
                &config,
            )
            .unwrap();
        assert_eq!(result.epochs_run, 2);
    }

    #[test]
    fn evaluation_never_touches_best_loss() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = TrainingController::new(dir.path());

        let result = controller
            .train(
                &linear_split(64, 0.0),
                &linear_split(16, 100.0),
                &dummy_scaler(),
                &fast_config(9),
            )
            .unwrap();

        let best_before = controller.best_loss();
        let report = evaluate(&result.model, &linear_split(12, 7.0));
        assert!(report.mse.is_finite());
        assert!(report.mae.is_finite());
        assert_eq!(report.n_rows, 12);
        assert_eq!(controller.best_loss(), best_before);
    }

    #[test]
    fn empty_training_split_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = TrainingController::new(dir.path());

        let empty = SplitBundle {
            inputs: Array2::zeros((0, 2)),
            targets: Array1::zeros(0),
        };
        assert!(controller
            .train(&empty, &linear_split(4, 0.0), &dummy_scaler(), &fast_config(1))
            .is_err());
    }
}
