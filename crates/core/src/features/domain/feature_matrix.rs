use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::shared::decode_error::DecodeError;

/// Per-utterance acoustic features: one row per frame, one column per
/// feature coefficient.
///
/// A matrix may have zero rows; the session reports such utterances as
/// failures instead of decoding them.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatrix {
    data: Array2<f32>,
}

impl FeatureMatrix {
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Builds a matrix from row-major values with an explicit shape.
    pub fn from_flat(
        values: Vec<f32>,
        frame_count: usize,
        dim: usize,
    ) -> Result<Self, DecodeError> {
        if values.len() != frame_count * dim {
            return Err(DecodeError::invalid_config(format!(
                "feature buffer holds {} values, expected {frame_count} frames x {dim} dims",
                values.len()
            )));
        }
        let data = Array2::from_shape_vec((frame_count, dim), values)
            .map_err(|e| DecodeError::invalid_config(format!("bad feature shape: {e}")))?;
        Ok(Self { data })
    }

    /// Builds a matrix from frame rows, all of which must share one width.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, DecodeError> {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|r| r.len() != dim) {
            return Err(DecodeError::InvalidFeatureDimension {
                expected: dim,
                actual: bad.len(),
            });
        }
        let frame_count = rows.len();
        Self::from_flat(rows.into_iter().flatten().collect(), frame_count, dim)
    }

    pub fn empty(dim: usize) -> Self {
        Self {
            data: Array2::zeros((0, dim)),
        }
    }

    pub fn num_frames(&self) -> usize {
        self.data.nrows()
    }

    pub fn dim(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.num_frames() == 0
    }

    pub fn frame(&self, index: usize) -> ArrayView1<'_, f32> {
        self.data.row(index)
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }
}
