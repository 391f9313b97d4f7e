use crate::{
    backend::Backend,
    engine::{autodiff::Pullback, context::TrainingContext, layer::Layer},
    parameter_tree,
};

/// `[N, d1, d2, ...] -> [N, d1 * d2 * ...]`
#[derive(Debug, Clone, Copy, Default)]
pub struct Flatten;

parameter_tree!(impl<B> for Flatten {});

impl<B: Backend> Layer<B> for Flatten {
    fn forward_with_pullback<'a>(
        &'a self,
        _ctx: &TrainingContext,
        x: &B::Tensor,
    ) -> (B::Tensor, Pullback<'a, B>) {
        let shape = B::shape(x);
        let batch = shape.first().copied().unwrap_or(1);
        let features: usize = shape.iter().skip(1).product();
        let y = B::reshape(x, &[batch, features]);
        let pullback = Pullback::input_only(move |g: &B::Tensor| B::reshape(g, &shape));
        (y, pullback)
    }
}
