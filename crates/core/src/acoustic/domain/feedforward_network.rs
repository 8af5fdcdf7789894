use ndarray::{Array1, Array2, Axis};

use crate::shared::decode_error::DecodeError;

/// One stage of the feed-forward stack.
#[derive(Clone, Debug, PartialEq)]
pub enum Layer {
    /// `y = x W^T + b`, with `weights` shaped `(output_dim, input_dim)`.
    Affine {
        weights: Array2<f32>,
        bias: Array1<f32>,
    },
    Relu,
    Tanh,
    LogSoftmax,
}

impl Layer {
    fn name(&self) -> &'static str {
        match self {
            Layer::Affine { .. } => "Affine",
            Layer::Relu => "ReLU",
            Layer::Tanh => "Tanh",
            Layer::LogSoftmax => "LogSoftmax",
        }
    }

    fn apply(&self, mut x: Array2<f32>) -> Array2<f32> {
        match self {
            Layer::Affine { weights, bias } => {
                let mut y = x.dot(&weights.t());
                y += bias;
                y
            }
            Layer::Relu => {
                x.mapv_inplace(|v| v.max(0.0));
                x
            }
            Layer::Tanh => {
                x.mapv_inplace(f32::tanh);
                x
            }
            Layer::LogSoftmax => {
                for mut row in x.axis_iter_mut(Axis(0)) {
                    let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                    let log_sum = row.iter().map(|&v| (v - max).exp()).sum::<f32>().ln() + max;
                    row.mapv_inplace(|v| v - log_sum);
                }
                x
            }
        }
    }
}

/// Frame-spliced feed-forward acoustic network.
///
/// Each output frame sees the input frames `t - left_context ..= t +
/// right_context` concatenated into one vector. Outputs are log-posteriors
/// over emission classes; when log-priors are present they are subtracted,
/// turning posteriors into scaled log-likelihoods.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedForwardNetwork {
    feature_dim: usize,
    left_context: usize,
    right_context: usize,
    layers: Vec<Layer>,
    log_priors: Option<Array1<f32>>,
    output_dim: usize,
}

impl FeedForwardNetwork {
    pub fn new(
        feature_dim: usize,
        left_context: usize,
        right_context: usize,
        layers: Vec<Layer>,
        log_priors: Option<Array1<f32>>,
    ) -> Result<Self, DecodeError> {
        let invalid = |reason: String| DecodeError::resource_load("acoustic network", reason);
        if feature_dim == 0 {
            return Err(invalid("feature dimension is zero".into()));
        }

        let mut dim = feature_dim * (left_context + right_context + 1);
        for (i, layer) in layers.iter().enumerate() {
            if let Layer::Affine { weights, bias } = layer {
                if weights.ncols() != dim {
                    return Err(invalid(format!(
                        "layer {i} expects input {} but receives {dim}",
                        weights.ncols()
                    )));
                }
                if bias.len() != weights.nrows() {
                    return Err(invalid(format!(
                        "layer {i} bias has {} entries for {} outputs",
                        bias.len(),
                        weights.nrows()
                    )));
                }
                dim = weights.nrows();
            }
        }
        if !layers.iter().any(|l| matches!(l, Layer::Affine { .. })) {
            return Err(invalid("network has no affine layer".into()));
        }
        if let Some(priors) = &log_priors {
            if priors.len() != dim {
                return Err(invalid(format!(
                    "{} priors for {dim} outputs",
                    priors.len()
                )));
            }
        }

        Ok(Self {
            feature_dim,
            left_context,
            right_context,
            layers,
            log_priors,
            output_dim: dim,
        })
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn left_context(&self) -> usize {
        self.left_context
    }

    pub fn right_context(&self) -> usize {
        self.right_context
    }

    /// Width of one spliced input row.
    pub fn input_dim(&self) -> usize {
        self.feature_dim * (self.left_context + self.right_context + 1)
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn has_priors(&self) -> bool {
        self.log_priors.is_some()
    }

    /// Evaluates a batch of spliced rows, one output row per input row.
    pub fn forward(&self, input: Array2<f32>) -> Array2<f32> {
        let mut x = input;
        for layer in &self.layers {
            x = layer.apply(x);
        }
        if let Some(priors) = &self.log_priors {
            x -= priors;
        }
        x
    }

    pub fn describe_layers(&self) -> String {
        self.layers
            .iter()
            .map(|l| match l {
                Layer::Affine { weights, .. } => {
                    format!("Affine({}->{})", weights.ncols(), weights.nrows())
                }
                other => other.name().to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
