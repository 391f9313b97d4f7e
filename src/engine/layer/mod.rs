use crate::{
    backend::{Backend, Elm},
    engine::{autodiff::Pullback, context::TrainingContext, tree::ParameterTree},
    error::{NnError, Result},
    parameter_tree,
};

pub mod activations;
pub mod batch_norm;
pub mod conv;
pub mod dense;
pub mod pool;
pub mod reshape;

pub use activations::{Relu, Sigmoid, Tanh};
pub use batch_norm::{BatchNorm, RunningStatistics};
pub use conv::Conv2D;
pub use dense::Dense;
pub use pool::{AvgPool2D, MaxPool2D};
pub use reshape::Flatten;

// 学習可能なパラメータ(ParameterTree)と、順伝播・逆伝播をまとめたレイヤーのトレイト
// モデル全体もこのレイヤーとして定義できるようにする
pub trait Layer<B: Backend>: ParameterTree<B> {
    /// Runs the layer and returns the pullback of this call.
    fn forward_with_pullback<'a>(
        &'a self,
        ctx: &TrainingContext,
        x: &B::Tensor,
    ) -> (B::Tensor, Pullback<'a, B>);

    fn forward(&self, ctx: &TrainingContext, x: &B::Tensor) -> B::Tensor {
        self.forward_with_pullback(ctx, x).0
    }
}

// 重みの初期化戦略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitStrategy {
    #[default]
    GlorotUniform,
    GlorotNormal,
    HeUniform,
    HeNormal,
}

impl InitStrategy {
    /// Samples a weight tensor of `shape` for the given fan sizes.
    pub fn sample<B: Backend>(
        self,
        shape: &[usize],
        fan_in: usize,
        fan_out: usize,
        seed: Option<u64>,
    ) -> Result<B::Tensor> {
        if fan_in + fan_out == 0 {
            return Err(NnError::InvalidShape(format!(
                "cannot initialise weights of shape {:?}: fan_in + fan_out is zero",
                shape
            )));
        }
        let tensor = match self {
            InitStrategy::GlorotUniform => {
                let limit = (6.0 / (fan_in + fan_out) as Elm).sqrt();
                B::random_uniform(shape, -limit, limit, seed)
            }
            InitStrategy::GlorotNormal => {
                let std = (2.0 / (fan_in + fan_out) as Elm).sqrt();
                B::random_normal(shape, 0.0, std, seed)
            }
            InitStrategy::HeUniform | InitStrategy::HeNormal if fan_in == 0 => {
                return Err(NnError::InvalidShape(format!(
                    "He initialisation needs a positive fan_in (shape {:?})",
                    shape
                )));
            }
            InitStrategy::HeUniform => {
                let limit = (6.0 / fan_in as Elm).sqrt();
                B::random_uniform(shape, -limit, limit, seed)
            }
            InitStrategy::HeNormal => {
                let std = (2.0 / fan_in as Elm).sqrt();
                B::random_normal(shape, 0.0, std, seed)
            }
        };
        Ok(tensor)
    }
}

/// Runs `first`, then feeds its output to `second`.
#[derive(Debug, Clone)]
pub struct Chain<A, C> {
    pub first: A,
    pub second: C,
}

impl<A, C> Chain<A, C> {
    pub fn new(first: A, second: C) -> Self {
        Self { first, second }
    }
}

parameter_tree!(impl<B, A, C> for Chain<A, C>
    where A: ParameterTree<B>, C: ParameterTree<B>
    { tree first, tree second });

impl<B, A, C> Layer<B> for Chain<A, C>
where
    B: Backend,
    A: Layer<B>,
    C: Layer<B>,
{
    fn forward_with_pullback<'a>(
        &'a self,
        ctx: &TrainingContext,
        x: &B::Tensor,
    ) -> (B::Tensor, Pullback<'a, B>) {
        let (hidden, first_pb) = self.first.forward_with_pullback(ctx, x);
        let (y, second_pb) = self.second.forward_with_pullback(ctx, &hidden);
        let pullback = Pullback::new(move |g| {
            let (second_grad, d_hidden) = second_pb.apply(g);
            let (first_grad, dx) = first_pb.apply(&d_hidden);
            let tree = crate::engine::tree::TensorTree::new()
                .with_subtree("first", first_grad)
                .with_subtree("second", second_grad);
            (tree, dx)
        });
        (y, pullback)
    }
}

pub(crate) fn positive_pair(name: &str, pair: (usize, usize)) -> Result<(usize, usize)> {
    if pair.0 == 0 || pair.1 == 0 {
        return Err(NnError::InvalidShape(format!(
            "{} must be positive in both dimensions, got {:?}",
            name, pair
        )));
    }
    Ok(pair)
}
