use std::sync::Arc;

use ndarray::{s, Array2};

use super::computation_cache::{ChunkComputation, ChunkShape, ComputationCache};
use crate::acoustic::domain::acoustic_model::AcousticModel;
use crate::acoustic::domain::acoustic_scorer::{check_feature_dim, AcousticScorer};
use crate::acoustic::domain::scorer_config::ScorerConfig;
use crate::acoustic::domain::transition_model::TransitionModel;
use crate::features::domain::feature_matrix::FeatureMatrix;
use crate::shared::decode_error::DecodeError;

/// Evaluates the acoustic network chunk by chunk.
///
/// Each chunk gathers a window of input frames (network context plus the
/// configured extra context, edge frames repeated at the utterance
/// boundaries), splices it through a cached [`ChunkComputation`] and runs the
/// network forward.
pub struct NnetAcousticScorer {
    model: Arc<AcousticModel>,
    config: ScorerConfig,
    cache: ComputationCache,
}

impl NnetAcousticScorer {
    pub fn new(model: Arc<AcousticModel>, config: ScorerConfig) -> Result<Self, DecodeError> {
        config.validate()?;
        Ok(Self {
            model,
            config,
            cache: ComputationCache::new(),
        })
    }

    pub fn cache(&self) -> &ComputationCache {
        &self.cache
    }

    fn chunk_shape(&self, start: usize, len: usize, num_frames: usize) -> ChunkShape {
        let network = self.model.network();
        let is_last = start + len == num_frames;
        ChunkShape {
            output_frames: len,
            left: network.left_context() + self.config.left_context_for(start),
            right: network.right_context() + self.config.right_context_for(is_last),
        }
    }

    fn gather_window(features: &FeatureMatrix, start: usize, shape: &ChunkShape) -> Array2<f32> {
        let last = features.num_frames() as isize - 1;
        let first = start as isize - shape.left as isize;
        let mut window = Array2::zeros((shape.window_frames(), features.dim()));
        for (w, mut row) in window.rows_mut().into_iter().enumerate() {
            let source = (first + w as isize).clamp(0, last) as usize;
            row.assign(&features.frame(source));
        }
        window
    }

    fn splice(window: &Array2<f32>, computation: &ChunkComputation) -> Array2<f32> {
        let dim = window.ncols();
        let width = computation.splice_width;
        let mut spliced = Array2::zeros((computation.shape.output_frames, width * dim));
        for (r, mut row) in spliced.rows_mut().into_iter().enumerate() {
            let rows = &computation.row_indices[r * width..(r + 1) * width];
            for (j, &w) in rows.iter().enumerate() {
                row.slice_mut(s![j * dim..(j + 1) * dim])
                    .assign(&window.row(w));
            }
        }
        spliced
    }
}

impl AcousticScorer for NnetAcousticScorer {
    fn feature_dim(&self) -> usize {
        self.model.feature_dim()
    }

    fn num_classes(&self) -> usize {
        self.model.num_classes()
    }

    fn transitions(&self) -> &TransitionModel {
        self.model.transitions()
    }

    fn frames_per_chunk(&self) -> usize {
        self.config.frames_per_chunk
    }

    fn score_chunk(
        &self,
        features: &FeatureMatrix,
        start: usize,
        len: usize,
    ) -> Result<Array2<f32>, DecodeError> {
        check_feature_dim(self.feature_dim(), features)?;
        if len == 0 || start + len > features.num_frames() {
            return Err(DecodeError::invalid_config(format!(
                "chunk {start}+{len} outside utterance of {} frames",
                features.num_frames()
            )));
        }

        let network = self.model.network();
        let shape = self.chunk_shape(start, len, features.num_frames());
        let computation = self.cache.get_or_compile(shape, || {
            ChunkComputation::compile(shape, network.left_context(), network.right_context())
        });

        let window = Self::gather_window(features, start, &shape);
        let spliced = Self::splice(&window, &computation);
        Ok(network.forward(spliced))
    }
}
