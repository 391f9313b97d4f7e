// 活性化関数もLayerとして定義することで、Chainやモデルの中にそのまま組み込める
// いずれも学習可能なパラメータは持たない

use crate::{
    backend::Backend,
    engine::{autodiff::Pullback, context::TrainingContext, layer::Layer},
    parameter_tree,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct Relu;

parameter_tree!(impl<B> for Relu {});

impl<B: Backend> Layer<B> for Relu {
    fn forward_with_pullback<'a>(
        &'a self,
        _ctx: &TrainingContext,
        x: &B::Tensor,
    ) -> (B::Tensor, Pullback<'a, B>) {
        let mask = B::gt_zero(x);
        let y = B::relu(x);
        (y, Pullback::input_only(move |g: &B::Tensor| B::mul(g, &mask)))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sigmoid;

parameter_tree!(impl<B> for Sigmoid {});

impl<B: Backend> Layer<B> for Sigmoid {
    fn forward_with_pullback<'a>(
        &'a self,
        _ctx: &TrainingContext,
        x: &B::Tensor,
    ) -> (B::Tensor, Pullback<'a, B>) {
        let y = B::sigmoid(x);
        let out = y.clone();
        // σ'(x) = σ(x)(1 - σ(x))
        let pullback = Pullback::input_only(move |g: &B::Tensor| {
            let one_minus = B::add_scalar(&B::neg(&out), 1.0);
            B::mul(g, &B::mul(&out, &one_minus))
        });
        (y, pullback)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Tanh;

parameter_tree!(impl<B> for Tanh {});

impl<B: Backend> Layer<B> for Tanh {
    fn forward_with_pullback<'a>(
        &'a self,
        _ctx: &TrainingContext,
        x: &B::Tensor,
    ) -> (B::Tensor, Pullback<'a, B>) {
        let y = B::tanh(x);
        let out = y.clone();
        let pullback = Pullback::input_only(move |g: &B::Tensor| {
            let one_minus_sq = B::add_scalar(&B::neg(&B::powi(&out, 2)), 1.0);
            B::mul(g, &one_minus_sq)
        });
        (y, pullback)
    }
}
