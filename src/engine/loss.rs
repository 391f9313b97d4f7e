use crate::backend::{Backend, Elm};

/// A scalar objective over a prediction and a target of the same shape.
pub trait Loss<B: Backend> {
    fn value(&self, prediction: &B::Tensor, target: &B::Tensor) -> Elm {
        self.value_with_gradient(prediction, target).0
    }

    /// Loss value and its gradient with respect to `prediction`.
    fn value_with_gradient(&self, prediction: &B::Tensor, target: &B::Tensor) -> (Elm, B::Tensor);
}

fn scalar<B: Backend>(t: &B::Tensor) -> Elm {
    B::to_vec(t).first().copied().unwrap_or(0.0)
}

/// Mean of squared differences over every element.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredError;

impl<B: Backend> Loss<B> for MeanSquaredError {
    fn value_with_gradient(&self, prediction: &B::Tensor, target: &B::Tensor) -> (Elm, B::Tensor) {
        assert_eq!(
            B::shape(prediction),
            B::shape(target),
            "MSE expects prediction and target of the same shape"
        );
        let n = B::shape(prediction).iter().product::<usize>().max(1) as Elm;
        let diff = B::sub(prediction, target);
        let value = scalar::<B>(&B::sum(&B::powi(&diff, 2), None, false)) / n;
        (value, B::scale(&diff, 2.0 / n))
    }
}

/// Softmax over the last axis followed by cross entropy against
/// one-hot (or probability) targets, averaged over the batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftmaxCrossEntropy;

impl<B: Backend> Loss<B> for SoftmaxCrossEntropy {
    // logits: [Batch, Classes], target: [Batch, Classes]
    fn value_with_gradient(&self, logits: &B::Tensor, target: &B::Tensor) -> (Elm, B::Tensor) {
        let shape = B::shape(logits);
        assert_eq!(
            shape,
            B::shape(target),
            "cross entropy expects logits and targets of the same shape"
        );
        let axis = shape.len() - 1;
        let batch = shape.first().copied().unwrap_or(1).max(1) as Elm;

        // log(softmax)を直接計算してlog(0)を避ける
        let log_probs = B::log_softmax(logits, Some(axis));
        let nll = B::mul(target, &log_probs);
        let value = -scalar::<B>(&B::sum(&nll, None, false)) / batch;

        let probs = B::softmax(logits, Some(axis));
        let grad = B::scale(&B::sub(&probs, target), 1.0 / batch);
        (value, grad)
    }
}
