//! Reverse-mode differentiation by composing per-layer pullbacks.
//!
//! A forward pass returns its output together with a [`Pullback`]. Feeding the
//! pullback the gradient of some scalar with respect to that output yields the
//! gradient with respect to the layer's parameters (as a [`TensorTree`]) and
//! with respect to its input. Containers chain the pullbacks of their children
//! in reverse order.

use crate::{
    backend::{Backend, Elm},
    engine::{
        context::TrainingContext,
        layer::Layer,
        tree::{ParameterTree, TensorTree},
    },
};

type PullbackFn<'a, B> =
    Box<dyn FnOnce(&<B as Backend>::Tensor) -> (TensorTree<B>, <B as Backend>::Tensor) + 'a>;

/// Maps an output-space gradient to `(parameter gradient, input gradient)`.
pub struct Pullback<'a, B: Backend> {
    f: PullbackFn<'a, B>,
}

impl<'a, B: Backend> Pullback<'a, B> {
    pub fn new(f: impl FnOnce(&B::Tensor) -> (TensorTree<B>, B::Tensor) + 'a) -> Self {
        Self { f: Box::new(f) }
    }

    /// Pullback of a layer without parameters.
    pub fn input_only(f: impl FnOnce(&B::Tensor) -> B::Tensor + 'a) -> Self {
        Self::new(move |g| (TensorTree::new(), f(g)))
    }

    pub fn identity() -> Self {
        Self::input_only(|g| g.clone())
    }

    pub fn apply(self, grad_output: &B::Tensor) -> (TensorTree<B>, B::Tensor) {
        (self.f)(grad_output)
    }
}

impl<B: Backend> std::fmt::Debug for Pullback<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Pullback(..)")
    }
}

pub fn value_with_pullback<'a, B, L>(
    layer: &'a L,
    ctx: &TrainingContext,
    x: &B::Tensor,
) -> (B::Tensor, Pullback<'a, B>)
where
    B: Backend,
    L: Layer<B> + ?Sized,
{
    layer.forward_with_pullback(ctx, x)
}

/// Runs `layer` forward, scores the output with `loss_fn` and pulls the loss
/// gradient back to the parameters.
///
/// `loss_fn` returns the scalar loss and its gradient with respect to the
/// layer output. The returned tree is congruent with `layer`.
pub fn value_with_gradient<B, L, F>(
    layer: &L,
    ctx: &TrainingContext,
    x: &B::Tensor,
    loss_fn: F,
) -> (Elm, TensorTree<B>)
where
    B: Backend,
    L: Layer<B> + ?Sized,
    F: FnOnce(&B::Tensor) -> (Elm, B::Tensor),
{
    let (y, pullback) = layer.forward_with_pullback(ctx, x);
    let (loss, grad_output) = loss_fn(&y);
    let (gradient, _) = pullback.apply(&grad_output);
    layer.assert_congruent(&gradient);
    (loss, gradient)
}
