use crate::backend::{Backend, Elm};

pub struct Accuracy;

impl Accuracy {
    /// Fraction of rows whose arg-max matches the target's arg-max.
    ///
    /// pred: [Batch, Classes] (logits or probabilities)
    /// target: [Batch, Classes] (one-hot)
    pub fn compute<B: Backend>(pred: &B::Tensor, target: &B::Tensor) -> Elm {
        let correct = Self::count_correct::<B>(pred, target);
        let total = B::shape(pred).first().copied().unwrap_or(0);
        if total == 0 {
            return 0.0;
        }
        correct as Elm / total as Elm
    }

    pub fn count_correct<B: Backend>(pred: &B::Tensor, target: &B::Tensor) -> usize {
        let axis = B::shape(pred).len() - 1;
        let pred_idx = B::argmax(pred, axis);
        let target_idx = B::argmax(target, axis);
        pred_idx
            .iter()
            .zip(target_idx.iter())
            .filter(|(p, t)| p == t)
            .count()
    }
}
