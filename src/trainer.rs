//! Full-batch unsupervised training of the autoencoder.
//!
//! Every epoch runs the whole graph forward, takes the mean squared
//! reconstruction loss and applies a single Adam step. There is no early
//! stopping: training always runs the configured number of epochs unless the
//! loss stops being finite.

use crate::attention::Neighborhoods;
use crate::autoencoder::Autoencoder;
use crate::config::TrainingConfig;
use crate::error::{DetectionError, Result};
use crate::graph_builder::TransactionGraph;
use crate::optimizer::Adam;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    Initialized,
    /// Epoch `epoch` (0-based) was the last one run.
    Training { epoch: usize },
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossObservation {
    pub epoch: usize,
    pub loss: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    /// Sampled every `log_every` epochs
    pub observations: Vec<LossObservation>,
    pub epochs_run: usize,
    pub final_loss: Option<f64>,
}

pub struct Trainer {
    config: TrainingConfig,
    optimizer: Adam,
    state: TrainerState,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            optimizer: Adam::new(config.learning_rate),
            config,
            state: TrainerState::Initialized,
        }
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    fn next_epoch(&self) -> Option<usize> {
        match self.state {
            TrainerState::Initialized if self.config.epochs > 0 => Some(0),
            TrainerState::Training { epoch } if epoch + 1 < self.config.epochs => Some(epoch + 1),
            _ => None,
        }
    }

    /// Run one epoch and return its loss, or `None` once the epoch budget is
    /// spent. The loss is measured before the parameter update.
    pub fn step(
        &mut self,
        model: &mut Autoencoder,
        graph: &TransactionGraph,
        nbrs: &Neighborhoods,
    ) -> Result<Option<f64>> {
        let Some(epoch) = self.next_epoch() else {
            self.state = TrainerState::Stopped;
            return Ok(None);
        };
        check_width(model, graph)?;

        let (loss, grads) = model.loss_and_gradients(&graph.features, nbrs);
        if !loss.is_finite() {
            self.state = TrainerState::Stopped;
            return Err(DetectionError::Diverged { epoch, loss });
        }
        self.optimizer.step(model.parameters_mut(), grads.tensors());

        self.state = if epoch + 1 == self.config.epochs {
            TrainerState::Stopped
        } else {
            TrainerState::Training { epoch }
        };
        Ok(Some(loss))
    }

    pub fn train(&mut self, model: &mut Autoencoder, graph: &TransactionGraph) -> Result<TrainingReport> {
        let nbrs = Neighborhoods::from_graph(graph);
        let mut report = TrainingReport::default();

        log::info!(
            "training {} parameters for {} epochs (lr={})",
            model.num_parameters(),
            self.config.epochs,
            self.config.learning_rate
        );

        while let Some(loss) = self.step(model, graph, &nbrs)? {
            let epoch = report.epochs_run;
            if self.config.log_every > 0 && epoch % self.config.log_every == 0 {
                log::info!("Epoch {epoch}, Loss: {loss:.4}");
                report.observations.push(LossObservation { epoch, loss });
            }
            report.epochs_run += 1;
            report.final_loss = Some(loss);
        }

        Ok(report)
    }
}

pub(crate) fn check_width(model: &Autoencoder, graph: &TransactionGraph) -> Result<()> {
    if model.in_channels() != graph.feature_width() {
        return Err(DetectionError::FeatureWidth {
            expected: model.in_channels(),
            actual: graph.feature_width(),
        });
    }
    Ok(())
}
