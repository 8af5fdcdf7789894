use ndarray::Array2;

use crate::graph::domain::decoding_graph::Label;
use crate::shared::decode_error::DecodeError;

/// Per-frame acoustic evidence as seen by the search.
///
/// `ilabel` is a graph input label (a transition id, 1-based). The search
/// visits frames strictly in order, so implementations may evaluate lazily
/// and keep only the current chunk.
pub trait Decodable {
    fn num_frames(&self) -> usize;

    /// Log-likelihood of `ilabel` at `frame`.
    fn log_likelihood(&mut self, frame: usize, ilabel: Label) -> Result<f32, DecodeError>;
}

/// Precomputed log-likelihood table where input label `k` reads column `k - 1`.
#[derive(Clone, Debug)]
pub struct MatrixDecodable {
    log_likes: Array2<f32>,
}

impl MatrixDecodable {
    pub fn new(log_likes: Array2<f32>) -> Self {
        Self { log_likes }
    }
}

impl Decodable for MatrixDecodable {
    fn num_frames(&self) -> usize {
        self.log_likes.nrows()
    }

    fn log_likelihood(&mut self, frame: usize, ilabel: Label) -> Result<f32, DecodeError> {
        let column = (ilabel as usize).checked_sub(1).filter(|&c| c < self.log_likes.ncols());
        match column {
            Some(c) => Ok(self.log_likes[[frame, c]]),
            None => Err(DecodeError::invalid_config(format!(
                "input label {ilabel} has no score column"
            ))),
        }
    }
}
