use crate::{
    backend::{Backend, Padding},
    engine::{
        autodiff::Pullback,
        context::TrainingContext,
        layer::{InitStrategy, Layer, positive_pair},
        tree::TensorTree,
    },
    error::{NnError, Result},
    parameter_tree,
};

/// 2-D convolution over NCHW inputs, without bias.
#[derive(Debug, Clone)]
pub struct Conv2D<B: Backend> {
    /// `[out_channels, in_channels, kernel_h, kernel_w]`
    pub filter: B::Tensor,
    strides: (usize, usize),
    padding: Padding,
}

// strides / padding はハイパーパラメータなので葉には含めない
parameter_tree!(impl<B> for Conv2D<B> { leaf filter });

impl<B: Backend> Conv2D<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
        strategy: InitStrategy,
    ) -> Result<Self> {
        Self::build(in_channels, out_channels, kernel, strides, padding, strategy, None)
    }

    pub fn seeded(
        in_channels: usize,
        out_channels: usize,
        kernel: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
        strategy: InitStrategy,
        seed: u64,
    ) -> Result<Self> {
        Self::build(
            in_channels,
            out_channels,
            kernel,
            strides,
            padding,
            strategy,
            Some(seed),
        )
    }

    fn build(
        in_channels: usize,
        out_channels: usize,
        kernel: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
        strategy: InitStrategy,
        seed: Option<u64>,
    ) -> Result<Self> {
        let strides = positive_pair("strides", strides)?;
        let (kh, kw) = kernel;
        let receptive = kh * kw;
        let fan_in = in_channels * receptive;
        let fan_out = out_channels * receptive;
        let filter = strategy.sample::<B>(
            &[out_channels, in_channels, kh, kw],
            fan_in,
            fan_out,
            seed,
        )?;
        Ok(Self {
            filter,
            strides,
            padding,
        })
    }

    pub fn from_filter(filter: B::Tensor, strides: (usize, usize), padding: Padding) -> Result<Self> {
        let shape = B::shape(&filter);
        if shape.len() != 4 {
            return Err(NnError::InvalidShape(format!(
                "Conv2D filter must be [out, in, kh, kw], got {:?}",
                shape
            )));
        }
        Ok(Self {
            filter,
            strides: positive_pair("strides", strides)?,
            padding,
        })
    }

    pub fn strides(&self) -> (usize, usize) {
        self.strides
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    pub fn filter_shape(&self) -> Vec<usize> {
        B::shape(&self.filter)
    }
}

impl<B: Backend> Layer<B> for Conv2D<B> {
    fn forward_with_pullback<'a>(
        &'a self,
        _ctx: &TrainingContext,
        x: &B::Tensor,
    ) -> (B::Tensor, Pullback<'a, B>) {
        let y = B::conv2d(x, &self.filter, self.strides, self.padding);
        let x = x.clone();
        let pullback = Pullback::new(move |g: &B::Tensor| {
            let dx = B::conv2d_backprop_input(
                &B::shape(&x),
                &self.filter,
                g,
                self.strides,
                self.padding,
            );
            let d_filter = B::conv2d_backprop_filter(
                &x,
                &B::shape(&self.filter),
                g,
                self.strides,
                self.padding,
            );
            (TensorTree::new().with_leaf("filter", d_filter), dx)
        });
        (y, pullback)
    }
}
