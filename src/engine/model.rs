//! Ready-made image classifiers built from the layers in [`crate::engine::layer`].

use crate::{
    backend::{Backend, Padding},
    engine::{
        autodiff::Pullback,
        context::TrainingContext,
        layer::{BatchNorm, Conv2D, Dense, Flatten, InitStrategy, Layer, MaxPool2D, Relu, Sigmoid},
        tree::TensorTree,
    },
    error::Result,
    parameter_tree,
};

/// `Dense -> sigmoid -> Dense`, producing unnormalized class scores.
#[derive(Debug, Clone)]
pub struct Classifier<B: Backend> {
    pub dense1: Dense<B>,
    activation: Sigmoid,
    pub dense2: Dense<B>,
}

parameter_tree!(impl<B> for Classifier<B> { tree dense1, tree dense2 });

impl<B: Backend> Classifier<B> {
    pub fn new(
        input_size: usize,
        hidden_size: usize,
        num_classes: usize,
        seed: Option<u64>,
    ) -> Result<Self> {
        let strategy = InitStrategy::GlorotUniform;
        let (dense1, dense2) = match seed {
            Some(s) => (
                Dense::seeded(input_size, hidden_size, strategy, s)?,
                Dense::seeded(hidden_size, num_classes, strategy, s.wrapping_add(1))?,
            ),
            None => (
                Dense::new(input_size, hidden_size, strategy)?,
                Dense::new(hidden_size, num_classes, strategy)?,
            ),
        };
        Ok(Self {
            dense1,
            activation: Sigmoid,
            dense2,
        })
    }
}

impl<B: Backend> Layer<B> for Classifier<B> {
    fn forward_with_pullback<'a>(
        &'a self,
        ctx: &TrainingContext,
        x: &B::Tensor,
    ) -> (B::Tensor, Pullback<'a, B>) {
        let (h, pb1) = self.dense1.forward_with_pullback(ctx, x);
        let (a, pb_act) = Layer::<B>::forward_with_pullback(&self.activation, ctx, &h);
        let (y, pb2) = self.dense2.forward_with_pullback(ctx, &a);
        let pullback = Pullback::new(move |g: &B::Tensor| {
            let (g2, da) = pb2.apply(g);
            let (_, dh) = pb_act.apply(&da);
            let (g1, dx) = pb1.apply(&dh);
            let tree = TensorTree::new()
                .with_subtree("dense1", g1)
                .with_subtree("dense2", g2);
            (tree, dx)
        });
        (y, pullback)
    }
}

/// `Conv2D(3x3, same) -> BatchNorm -> ReLU -> MaxPool2D(2x2) -> Flatten -> Dense`
/// over `[N, C, H, W]` images.
#[derive(Debug, Clone)]
pub struct ConvClassifier<B: Backend> {
    pub conv: Conv2D<B>,
    pub norm: BatchNorm<B>,
    relu: Relu,
    pool: MaxPool2D,
    flatten: Flatten,
    pub dense: Dense<B>,
}

parameter_tree!(impl<B> for ConvClassifier<B> { tree conv, tree norm, tree dense });

impl<B: Backend> ConvClassifier<B> {
    pub fn new(
        in_channels: usize,
        image_size: (usize, usize),
        filters: usize,
        num_classes: usize,
        seed: Option<u64>,
    ) -> Result<Self> {
        let strategy = InitStrategy::GlorotUniform;
        let (kernel, unit) = ((3, 3), (1, 1));
        let conv = match seed {
            Some(s) => Conv2D::seeded(in_channels, filters, kernel, unit, Padding::Same, strategy, s)?,
            None => Conv2D::new(in_channels, filters, kernel, unit, Padding::Same, strategy)?,
        };
        let norm = BatchNorm::new(filters, 1)?;
        let pool = MaxPool2D::new((2, 2), (2, 2), Padding::Valid)?;
        let flat = filters * (image_size.0 / 2) * (image_size.1 / 2);
        let dense = match seed {
            Some(s) => Dense::seeded(flat, num_classes, strategy, s.wrapping_add(1))?,
            None => Dense::new(flat, num_classes, strategy)?,
        };
        Ok(Self {
            conv,
            norm,
            relu: Relu,
            pool,
            flatten: Flatten,
            dense,
        })
    }
}

impl<B: Backend> Layer<B> for ConvClassifier<B> {
    fn forward_with_pullback<'a>(
        &'a self,
        ctx: &TrainingContext,
        x: &B::Tensor,
    ) -> (B::Tensor, Pullback<'a, B>) {
        let (c, pb_conv) = self.conv.forward_with_pullback(ctx, x);
        let (n, pb_norm) = self.norm.forward_with_pullback(ctx, &c);
        let (r, pb_relu) = Layer::<B>::forward_with_pullback(&self.relu, ctx, &n);
        let (p, pb_pool) = Layer::<B>::forward_with_pullback(&self.pool, ctx, &r);
        let (f, pb_flat) = Layer::<B>::forward_with_pullback(&self.flatten, ctx, &p);
        let (y, pb_dense) = self.dense.forward_with_pullback(ctx, &f);
        let pullback = Pullback::new(move |g: &B::Tensor| {
            let (g_dense, df) = pb_dense.apply(g);
            let (_, dp) = pb_flat.apply(&df);
            let (_, dr) = pb_pool.apply(&dp);
            let (_, dn) = pb_relu.apply(&dr);
            let (g_norm, dc) = pb_norm.apply(&dn);
            let (g_conv, dx) = pb_conv.apply(&dc);
            let tree = TensorTree::new()
                .with_subtree("conv", g_conv)
                .with_subtree("norm", g_norm)
                .with_subtree("dense", g_dense);
            (tree, dx)
        });
        (y, pullback)
    }
}
