use crate::{
    backend::{Backend, Padding},
    engine::{
        autodiff::Pullback,
        context::TrainingContext,
        layer::{Layer, positive_pair},
    },
    error::Result,
    parameter_tree,
};

/// Geometry shared by the pooling layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolGeometry {
    pub pool_size: (usize, usize),
    pub strides: (usize, usize),
    pub padding: Padding,
}

impl PoolGeometry {
    fn new(pool_size: (usize, usize), strides: (usize, usize), padding: Padding) -> Result<Self> {
        Ok(Self {
            pool_size: positive_pair("pool_size", pool_size)?,
            strides: positive_pair("strides", strides)?,
            padding,
        })
    }
}

/// Windowed maximum over H and W. The gradient flows to the first maximum.
#[derive(Debug, Clone, Copy)]
pub struct MaxPool2D {
    geometry: PoolGeometry,
}

parameter_tree!(impl<B> for MaxPool2D {});

impl MaxPool2D {
    pub fn new(pool_size: (usize, usize), strides: (usize, usize), padding: Padding) -> Result<Self> {
        Ok(Self {
            geometry: PoolGeometry::new(pool_size, strides, padding)?,
        })
    }

    pub fn geometry(&self) -> PoolGeometry {
        self.geometry
    }
}

impl<B: Backend> Layer<B> for MaxPool2D {
    fn forward_with_pullback<'a>(
        &'a self,
        _ctx: &TrainingContext,
        x: &B::Tensor,
    ) -> (B::Tensor, Pullback<'a, B>) {
        let PoolGeometry {
            pool_size,
            strides,
            padding,
        } = self.geometry;
        let y = B::max_pool2d(x, pool_size, strides, padding);
        let x = x.clone();
        let pullback = Pullback::input_only(move |g: &B::Tensor| {
            B::max_pool2d_backprop(&x, g, pool_size, strides, padding)
        });
        (y, pullback)
    }
}

/// Windowed mean over H and W. Padding cells are not counted.
#[derive(Debug, Clone, Copy)]
pub struct AvgPool2D {
    geometry: PoolGeometry,
}

parameter_tree!(impl<B> for AvgPool2D {});

impl AvgPool2D {
    pub fn new(pool_size: (usize, usize), strides: (usize, usize), padding: Padding) -> Result<Self> {
        Ok(Self {
            geometry: PoolGeometry::new(pool_size, strides, padding)?,
        })
    }

    pub fn geometry(&self) -> PoolGeometry {
        self.geometry
    }
}

impl<B: Backend> Layer<B> for AvgPool2D {
    fn forward_with_pullback<'a>(
        &'a self,
        _ctx: &TrainingContext,
        x: &B::Tensor,
    ) -> (B::Tensor, Pullback<'a, B>) {
        let PoolGeometry {
            pool_size,
            strides,
            padding,
        } = self.geometry;
        let y = B::avg_pool2d(x, pool_size, strides, padding);
        let input_shape = B::shape(x);
        let pullback = Pullback::input_only(move |g: &B::Tensor| {
            B::avg_pool2d_backprop(&input_shape, g, pool_size, strides, padding)
        });
        (y, pullback)
    }
}
