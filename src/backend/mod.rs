use std::fmt::Debug;

use serde::Deserialize;

pub mod ndarray;

pub type Elm = f32;

/// Padding policy shared by convolution and pooling kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    /// Zero padding so that the output size only depends on the stride.
    Same,
    /// No padding; windows never leave the input.
    #[default]
    Valid,
}

/// Spatial geometry of a sliding 2-D window over an `[N, C, H, W]` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window2D {
    pub input: (usize, usize),
    pub kernel: (usize, usize),
    pub strides: (usize, usize),
    pub output: (usize, usize),
    /// Cells of padding inserted before the first row / column.
    pub pad_before: (usize, usize),
}

impl Window2D {
    pub fn new(
        input: (usize, usize),
        kernel: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    ) -> Self {
        let (oh, ph) = axis_geometry(input.0, kernel.0, strides.0, padding);
        let (ow, pw) = axis_geometry(input.1, kernel.1, strides.1, padding);
        Self {
            input,
            kernel,
            strides,
            output: (oh, ow),
            pad_before: (ph, pw),
        }
    }

    /// 出力セル(oy, ox)とカーネル内オフセット(ky, kx)に対応する入力座標。
    /// パディング領域に落ちる場合はNoneを返す。
    #[inline]
    pub fn source(&self, oy: usize, ox: usize, ky: usize, kx: usize) -> Option<(usize, usize)> {
        let y = (oy * self.strides.0 + ky).checked_sub(self.pad_before.0)?;
        let x = (ox * self.strides.1 + kx).checked_sub(self.pad_before.1)?;
        if y < self.input.0 && x < self.input.1 {
            Some((y, x))
        } else {
            None
        }
    }
}

fn axis_geometry(input: usize, kernel: usize, stride: usize, padding: Padding) -> (usize, usize) {
    assert!(
        kernel > 0 && stride > 0,
        "kernel and stride must be positive"
    );
    match padding {
        Padding::Valid => {
            assert!(
                input >= kernel,
                "Window larger than input with valid padding: input={}, kernel={}",
                input,
                kernel
            );
            ((input - kernel) / stride + 1, 0)
        }
        Padding::Same => {
            let out = input.div_ceil(stride);
            let needed = ((out.max(1) - 1) * stride + kernel).saturating_sub(input);
            (out, needed / 2)
        }
    }
}

/// Tensor facade. Every operation returns a fresh tensor; shape violations panic.
pub trait Backend: Clone + Debug + 'static {
    type Tensor: Clone + Debug + 'static;

    fn zeros(shape: &[usize]) -> Self::Tensor;
    fn ones(shape: &[usize]) -> Self::Tensor;
    fn zeros_like(tensor: &Self::Tensor) -> Self::Tensor;
    fn ones_like(tensor: &Self::Tensor) -> Self::Tensor;
    fn random_normal(shape: &[usize], mean: Elm, std: Elm, seed: Option<u64>) -> Self::Tensor;
    /// Samples uniformly from the closed interval `[low, high]`.
    fn random_uniform(shape: &[usize], low: Elm, high: Elm, seed: Option<u64>) -> Self::Tensor;

    // CPU配列からの作成
    fn from_vec(vec: Vec<Elm>, shape: &[usize]) -> Self::Tensor;
    // CPU配列への変換(基本的に重い処理となる)
    fn to_vec(tensor: &Self::Tensor) -> Vec<Elm>;

    fn shape(tensor: &Self::Tensor) -> Vec<usize>;
    fn reshape(tensor: &Self::Tensor, shape: &[usize]) -> Self::Tensor;
    fn stack(tensors: &[Self::Tensor], axis: usize) -> Self::Tensor;

    // 基本的な演算(ブロードキャスト対応)
    fn add(a: &Self::Tensor, b: &Self::Tensor) -> Self::Tensor;
    fn sub(a: &Self::Tensor, b: &Self::Tensor) -> Self::Tensor;
    fn mul(a: &Self::Tensor, b: &Self::Tensor) -> Self::Tensor; // 要素ごとの積
    fn div(a: &Self::Tensor, b: &Self::Tensor) -> Self::Tensor;
    fn scale(a: &Self::Tensor, k: Elm) -> Self::Tensor;
    fn add_scalar(a: &Self::Tensor, k: Elm) -> Self::Tensor;

    fn matmul(a: &Self::Tensor, b: &Self::Tensor) -> Self::Tensor; // 行列積
    fn transpose(tensor: &Self::Tensor) -> Self::Tensor;

    fn sum(a: &Self::Tensor, axis: Option<usize>, keep_dims: bool) -> Self::Tensor;
    /// Sums over every listed axis, keeping them as size-1 dimensions.
    fn sum_axes(a: &Self::Tensor, axes: &[usize]) -> Self::Tensor;
    /// Means over every listed axis, keeping them as size-1 dimensions.
    fn mean_axes(a: &Self::Tensor, axes: &[usize]) -> Self::Tensor;
    fn max(a: &Self::Tensor, axis: Option<usize>) -> Self::Tensor;
    /// Index of the first maximum along `axis`, for every lane in row-major order.
    fn argmax(a: &Self::Tensor, axis: usize) -> Vec<usize>;

    fn neg(a: &Self::Tensor) -> Self::Tensor;
    fn sqrt(a: &Self::Tensor) -> Self::Tensor;
    fn rsqrt(a: &Self::Tensor) -> Self::Tensor;
    fn powi(a: &Self::Tensor, n: i32) -> Self::Tensor;
    fn exp(a: &Self::Tensor) -> Self::Tensor;
    fn log(a: &Self::Tensor) -> Self::Tensor;
    fn relu(a: &Self::Tensor) -> Self::Tensor;
    fn sigmoid(a: &Self::Tensor) -> Self::Tensor;
    fn tanh(a: &Self::Tensor) -> Self::Tensor;
    /// 1.0 where the element is strictly positive, 0.0 elsewhere.
    fn gt_zero(a: &Self::Tensor) -> Self::Tensor;
    fn softmax(a: &Self::Tensor, axis: Option<usize>) -> Self::Tensor;
    fn log_softmax(a: &Self::Tensor, axis: Option<usize>) -> Self::Tensor;

    // 畳み込み・プーリング (NCHW, filterは[out, in, kh, kw])
    fn conv2d(
        input: &Self::Tensor,
        filter: &Self::Tensor,
        strides: (usize, usize),
        padding: Padding,
    ) -> Self::Tensor;
    fn conv2d_backprop_input(
        input_shape: &[usize],
        filter: &Self::Tensor,
        grad: &Self::Tensor,
        strides: (usize, usize),
        padding: Padding,
    ) -> Self::Tensor;
    fn conv2d_backprop_filter(
        input: &Self::Tensor,
        filter_shape: &[usize],
        grad: &Self::Tensor,
        strides: (usize, usize),
        padding: Padding,
    ) -> Self::Tensor;
    fn max_pool2d(
        input: &Self::Tensor,
        pool_size: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    ) -> Self::Tensor;
    fn max_pool2d_backprop(
        input: &Self::Tensor,
        grad: &Self::Tensor,
        pool_size: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    ) -> Self::Tensor;
    fn avg_pool2d(
        input: &Self::Tensor,
        pool_size: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    ) -> Self::Tensor;
    fn avg_pool2d_backprop(
        input_shape: &[usize],
        grad: &Self::Tensor,
        pool_size: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    ) -> Self::Tensor;
}
