//! A thin supervised training loop.
//!
//! Batches are `(inputs, one-hot targets)` pairs, typically produced by
//! [`collate_batch`](crate::data::collate::collate_batch) over a
//! [`DataLoader`](crate::data::loader::DataLoader).

use tracing::{debug, info};

use crate::{
    backend::{Backend, Elm},
    engine::{
        autodiff::value_with_gradient,
        context::TrainingContext,
        layer::Layer,
        loss::Loss,
        metric::Accuracy,
        optimizer::Optimizer,
    },
};

/// Sample-weighted averages over one pass of the data.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochStats {
    pub loss: Elm,
    pub accuracy: Elm,
    pub samples: usize,
}

#[derive(Default)]
struct Accumulator {
    loss_sum: Elm,
    correct: usize,
    samples: usize,
}

impl Accumulator {
    fn record(&mut self, loss: Elm, correct: usize, batch: usize) {
        self.loss_sum += loss * batch as Elm;
        self.correct += correct;
        self.samples += batch;
    }

    fn finish(self) -> EpochStats {
        if self.samples == 0 {
            return EpochStats::default();
        }
        EpochStats {
            loss: self.loss_sum / self.samples as Elm,
            accuracy: self.correct as Elm / self.samples as Elm,
            samples: self.samples,
        }
    }
}

/// One pass over `batches` in training mode, updating `model` after every batch.
pub fn train_epoch<B, M, L, I>(
    model: &mut M,
    optimizer: &mut Optimizer<B>,
    loss: &L,
    batches: I,
    epoch: usize,
) -> EpochStats
where
    B: Backend,
    M: Layer<B>,
    L: Loss<B>,
    I: IntoIterator<Item = (B::Tensor, B::Tensor)>,
{
    let ctx = TrainingContext::training();
    let mut acc = Accumulator::default();
    for (i, (inputs, targets)) in batches.into_iter().enumerate() {
        let batch = B::shape(&inputs).first().copied().unwrap_or(0);
        let mut correct = 0;
        let (value, gradient) =
            value_with_gradient::<B, M, _>(&*model, &ctx, &inputs, |logits: &B::Tensor| {
                correct = Accuracy::count_correct::<B>(logits, &targets);
                loss.value_with_gradient(logits, &targets)
            });
        optimizer.update(model, &gradient);
        acc.record(value, correct, batch);
        debug!(epoch, batch = i, loss = value, "batch done");
    }
    let stats = acc.finish();
    info!(
        epoch,
        loss = stats.loss,
        accuracy = stats.accuracy,
        samples = stats.samples,
        optimizer = optimizer.name(),
        "epoch finished"
    );
    stats
}

/// Scores `model` on `batches` in inference mode without touching any state.
pub fn evaluate<B, M, L, I>(model: &M, loss: &L, batches: I) -> EpochStats
where
    B: Backend,
    M: Layer<B>,
    L: Loss<B>,
    I: IntoIterator<Item = (B::Tensor, B::Tensor)>,
{
    let ctx = TrainingContext::inference();
    let mut acc = Accumulator::default();
    for (inputs, targets) in batches {
        let batch = B::shape(&inputs).first().copied().unwrap_or(0);
        let logits = model.forward(&ctx, &inputs);
        let value = loss.value(&logits, &targets);
        acc.record(value, Accuracy::count_correct::<B>(&logits, &targets), batch);
    }
    let stats = acc.finish();
    info!(
        loss = stats.loss,
        accuracy = stats.accuracy,
        samples = stats.samples,
        "evaluation finished"
    );
    stats
}
