use ndarray::Array2;

use super::transition_model::TransitionModel;
use crate::features::domain::feature_matrix::FeatureMatrix;
use crate::shared::decode_error::DecodeError;

/// Turns feature frames into per-class log-likelihoods.
///
/// Implementations are shared by every decode worker, so any internal
/// caching must be synchronized.
pub trait AcousticScorer: Send + Sync {
    /// Width of one input feature vector.
    fn feature_dim(&self) -> usize;

    fn num_classes(&self) -> usize;

    fn transitions(&self) -> &TransitionModel;

    fn frames_per_chunk(&self) -> usize;

    /// Scores frames `start..start + len`, one row per frame and one column
    /// per emission class.
    fn score_chunk(
        &self,
        features: &FeatureMatrix,
        start: usize,
        len: usize,
    ) -> Result<Array2<f32>, DecodeError>;

    /// Scores a single frame by evaluating the chunk that contains it.
    fn score(&self, features: &FeatureMatrix, frame: usize) -> Result<Vec<f32>, DecodeError> {
        let chunk = self.frames_per_chunk().max(1);
        let start = frame / chunk * chunk;
        let len = chunk.min(features.num_frames().saturating_sub(start));
        let scores = self.score_chunk(features, start, len)?;
        Ok(scores.row(frame - start).to_vec())
    }
}

/// Shared dimension check used by scorer implementations.
pub fn check_feature_dim(expected: usize, features: &FeatureMatrix) -> Result<(), DecodeError> {
    if features.dim() != expected {
        return Err(DecodeError::InvalidFeatureDimension {
            expected,
            actual: features.dim(),
        });
    }
    Ok(())
}
