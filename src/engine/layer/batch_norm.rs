use std::cell::{Ref, RefCell};

use tracing::trace;

use crate::{
    backend::{Backend, Elm},
    engine::{
        autodiff::Pullback,
        context::{Mode, TrainingContext},
        layer::Layer,
        tree::TensorTree,
    },
    error::{NnError, Result, positive, unit_interval},
    parameter_tree,
};

pub const DEFAULT_MOMENTUM: Elm = 0.99;
pub const DEFAULT_EPSILON: Elm = 0.001;

/// Exponential moving averages of per-feature mean and variance.
#[derive(Debug, Clone)]
pub struct RunningStatistics<B: Backend> {
    /// `[C]`, starts at 0
    pub mean: B::Tensor,
    /// `[C]`, starts at 1
    pub variance: B::Tensor,
}

impl<B: Backend> RunningStatistics<B> {
    pub fn new(features: usize) -> Self {
        Self {
            mean: B::zeros(&[features]),
            variance: B::ones(&[features]),
        }
    }

    /// `running += (batch - running) * (1 - momentum)`
    pub fn accumulate(&mut self, batch_mean: &B::Tensor, batch_variance: &B::Tensor, momentum: Elm) {
        let rate = 1.0 - momentum;
        self.mean = B::add(&self.mean, &B::scale(&B::sub(batch_mean, &self.mean), rate));
        self.variance = B::add(
            &self.variance,
            &B::scale(&B::sub(batch_variance, &self.variance), rate),
        );
    }
}

/// Batch normalization along one feature axis.
///
/// In training mode the layer normalizes with the statistics of the current
/// batch and folds them into its running statistics. In inference mode it
/// normalizes with the running statistics and leaves them untouched. The
/// running statistics sit behind a `RefCell` because forward passes only get
/// `&self`.
#[derive(Debug)]
pub struct BatchNorm<B: Backend> {
    axis: usize,
    momentum: Elm,
    epsilon: Elm,
    /// `[C]`, starts at 1
    pub scale: B::Tensor,
    /// `[C]`, starts at 0
    pub offset: B::Tensor,
    running: RefCell<RunningStatistics<B>>,
}

parameter_tree!(impl<B> for BatchNorm<B> { leaf scale, leaf offset });

impl<B: Backend> Clone for BatchNorm<B> {
    fn clone(&self) -> Self {
        Self {
            axis: self.axis,
            momentum: self.momentum,
            epsilon: self.epsilon,
            scale: self.scale.clone(),
            offset: self.offset.clone(),
            running: RefCell::new(self.running.borrow().clone()),
        }
    }
}

impl<B: Backend> BatchNorm<B> {
    /// `features` is the size of `axis`. Uses momentum 0.99 and epsilon 0.001.
    pub fn new(features: usize, axis: usize) -> Result<Self> {
        Self::with_hyperparameters(features, axis, DEFAULT_MOMENTUM, DEFAULT_EPSILON)
    }

    pub fn with_hyperparameters(
        features: usize,
        axis: usize,
        momentum: Elm,
        epsilon: Elm,
    ) -> Result<Self> {
        if features == 0 {
            return Err(NnError::InvalidShape(
                "BatchNorm needs at least one feature".into(),
            ));
        }
        let momentum = unit_interval("momentum", momentum)?;
        let epsilon = positive("epsilon", epsilon)?;
        Ok(Self {
            axis,
            momentum,
            epsilon,
            scale: B::ones(&[features]),
            offset: B::zeros(&[features]),
            running: RefCell::new(RunningStatistics::new(features)),
        })
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn momentum(&self) -> Elm {
        self.momentum
    }

    pub fn epsilon(&self) -> Elm {
        self.epsilon
    }

    pub fn features(&self) -> usize {
        B::shape(&self.scale)[0]
    }

    pub fn running_statistics(&self) -> Ref<'_, RunningStatistics<B>> {
        self.running.borrow()
    }

    pub fn running_mean(&self) -> B::Tensor {
        self.running.borrow().mean.clone()
    }

    pub fn running_variance(&self) -> B::Tensor {
        self.running.borrow().variance.clone()
    }

    /// `[1, .., C, .., 1]`: a per-feature vector broadcastable against the input.
    fn broadcast_shape(&self, input_shape: &[usize]) -> Vec<usize> {
        assert!(
            self.axis < input_shape.len(),
            "BatchNorm axis {} out of range for input shape {:?}",
            self.axis,
            input_shape
        );
        assert_eq!(
            input_shape[self.axis],
            self.features(),
            "BatchNorm expects {} features on axis {}, got shape {:?}",
            self.features(),
            self.axis,
            input_shape
        );
        let mut shape = vec![1; input_shape.len()];
        shape[self.axis] = self.features();
        shape
    }

    fn reduction_axes(&self, rank: usize) -> Vec<usize> {
        (0..rank).filter(|&ax| ax != self.axis).collect()
    }

    fn forward_training<'a>(&'a self, x: &B::Tensor) -> (B::Tensor, Pullback<'a, B>) {
        let x_shape = B::shape(x);
        let bshape = self.broadcast_shape(&x_shape);
        let axes = self.reduction_axes(x_shape.len());
        let count: usize = axes.iter().map(|&ax| x_shape[ax]).product();
        let features = [self.features()];

        let mean = B::mean_axes(x, &axes);
        let centered = B::sub(x, &mean);
        let variance = B::mean_axes(&B::powi(&centered, 2), &axes);
        let inv_std = B::rsqrt(&B::add_scalar(&variance, self.epsilon));
        let x_hat = B::mul(&centered, &inv_std);

        let scale = B::reshape(&self.scale, &bshape);
        let offset = B::reshape(&self.offset, &bshape);
        let y = B::add(&B::mul(&x_hat, &scale), &offset);

        self.running.borrow_mut().accumulate(
            &B::reshape(&mean, &features),
            &B::reshape(&variance, &features),
            self.momentum,
        );
        trace!(count, momentum = self.momentum, "batch norm statistics accumulated");

        let pullback = Pullback::new(move |g: &B::Tensor| {
            let d_offset = B::reshape(&B::sum_axes(g, &axes), &features);
            let d_scale = B::reshape(&B::sum_axes(&B::mul(g, &x_hat), &axes), &features);

            // dx = inv_std / m * (m·dx̂ - Σdx̂ - x̂·Σ(dx̂·x̂))
            let m = count as Elm;
            let dx_hat = B::mul(g, &scale);
            let sum_dx_hat = B::sum_axes(&dx_hat, &axes);
            let sum_dx_hat_x_hat = B::sum_axes(&B::mul(&dx_hat, &x_hat), &axes);
            let inner = B::sub(
                &B::sub(&B::scale(&dx_hat, m), &sum_dx_hat),
                &B::mul(&x_hat, &sum_dx_hat_x_hat),
            );
            let dx = B::mul(&inner, &B::scale(&inv_std, 1.0 / m));

            let tree = TensorTree::new()
                .with_leaf("scale", d_scale)
                .with_leaf("offset", d_offset);
            (tree, dx)
        });
        (y, pullback)
    }

    fn forward_inference<'a>(&'a self, x: &B::Tensor) -> (B::Tensor, Pullback<'a, B>) {
        let x_shape = B::shape(x);
        let bshape = self.broadcast_shape(&x_shape);
        let axes = self.reduction_axes(x_shape.len());
        let features = [self.features()];

        let (mean, variance) = {
            let running = self.running.borrow();
            (
                B::reshape(&running.mean, &bshape),
                B::reshape(&running.variance, &bshape),
            )
        };
        let inv_std = B::rsqrt(&B::add_scalar(&variance, self.epsilon));
        let x_hat = B::mul(&B::sub(x, &mean), &inv_std);

        let scale = B::reshape(&self.scale, &bshape);
        let offset = B::reshape(&self.offset, &bshape);
        let y = B::add(&B::mul(&x_hat, &scale), &offset);

        // 推論時は統計量を定数として扱う
        let pullback = Pullback::new(move |g: &B::Tensor| {
            let d_offset = B::reshape(&B::sum_axes(g, &axes), &features);
            let d_scale = B::reshape(&B::sum_axes(&B::mul(g, &x_hat), &axes), &features);
            let dx = B::mul(g, &B::mul(&scale, &inv_std));
            let tree = TensorTree::new()
                .with_leaf("scale", d_scale)
                .with_leaf("offset", d_offset);
            (tree, dx)
        });
        (y, pullback)
    }
}

impl<B: Backend> Layer<B> for BatchNorm<B> {
    fn forward_with_pullback<'a>(
        &'a self,
        ctx: &TrainingContext,
        x: &B::Tensor,
    ) -> (B::Tensor, Pullback<'a, B>) {
        match ctx.mode() {
            Mode::Training => self.forward_training(x),
            Mode::Inference => self.forward_inference(x),
        }
    }
}
