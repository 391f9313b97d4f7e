use crate::{
    backend::Backend,
    engine::{
        autodiff::Pullback,
        context::TrainingContext,
        layer::{InitStrategy, Layer},
        tree::TensorTree,
    },
    error::{NnError, Result},
    parameter_tree,
};

/// Fully connected layer: `y = x·weight + bias` on `[batch, in]` inputs.
#[derive(Debug, Clone)]
pub struct Dense<B: Backend> {
    /// `[in_features, out_features]`
    pub weight: B::Tensor,
    /// `[out_features]`
    pub bias: B::Tensor,
}

parameter_tree!(impl<B> for Dense<B> { leaf weight, leaf bias });

impl<B: Backend> Dense<B> {
    pub fn new(in_features: usize, out_features: usize, strategy: InitStrategy) -> Result<Self> {
        Self::build(in_features, out_features, strategy, None)
    }

    /// Same as [`Dense::new`] with a reproducible weight draw.
    pub fn seeded(
        in_features: usize,
        out_features: usize,
        strategy: InitStrategy,
        seed: u64,
    ) -> Result<Self> {
        Self::build(in_features, out_features, strategy, Some(seed))
    }

    fn build(
        in_features: usize,
        out_features: usize,
        strategy: InitStrategy,
        seed: Option<u64>,
    ) -> Result<Self> {
        let weight = strategy.sample::<B>(
            &[in_features, out_features],
            in_features,
            out_features,
            seed,
        )?;
        let bias = B::zeros(&[out_features]);
        Ok(Self { weight, bias })
    }

    pub fn from_parts(weight: B::Tensor, bias: B::Tensor) -> Result<Self> {
        let (w_shape, b_shape) = (B::shape(&weight), B::shape(&bias));
        if w_shape.len() != 2 || b_shape != [w_shape[1]] {
            return Err(NnError::InvalidShape(format!(
                "Dense expects weight [in, out] and bias [out], got {:?} and {:?}",
                w_shape, b_shape
            )));
        }
        Ok(Self { weight, bias })
    }

    pub fn in_features(&self) -> usize {
        B::shape(&self.weight)[0]
    }

    pub fn out_features(&self) -> usize {
        B::shape(&self.weight)[1]
    }
}

impl<B: Backend> Layer<B> for Dense<B> {
    fn forward_with_pullback<'a>(
        &'a self,
        _ctx: &TrainingContext,
        x: &B::Tensor,
    ) -> (B::Tensor, Pullback<'a, B>) {
        let y = B::add(&B::matmul(x, &self.weight), &self.bias);
        let x = x.clone();
        let pullback = Pullback::new(move |g: &B::Tensor| {
            let d_weight = B::matmul(&B::transpose(&x), g);
            let d_bias = B::sum(g, Some(0), false);
            let dx = B::matmul(g, &B::transpose(&self.weight));
            let tree = TensorTree::new()
                .with_leaf("weight", d_weight)
                .with_leaf("bias", d_bias);
            (tree, dx)
        });
        (y, pullback)
    }

    fn forward(&self, _ctx: &TrainingContext, x: &B::Tensor) -> B::Tensor {
        B::add(&B::matmul(x, &self.weight), &self.bias)
    }
}
