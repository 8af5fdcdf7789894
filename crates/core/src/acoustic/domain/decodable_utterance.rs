use ndarray::Array2;

use super::acoustic_scorer::{check_feature_dim, AcousticScorer};
use crate::decoder::domain::decodable::Decodable;
use crate::features::domain::feature_matrix::FeatureMatrix;
use crate::graph::domain::decoding_graph::Label;
use crate::shared::decode_error::DecodeError;

/// Adapts one utterance's features to the search's [`Decodable`] view.
///
/// Scores are produced one chunk at a time as the search advances; only the
/// current chunk is held in memory.
pub struct DecodableUtterance<'a> {
    scorer: &'a dyn AcousticScorer,
    features: &'a FeatureMatrix,
    chunk_start: usize,
    chunk: Option<Array2<f32>>,
    chunks_scored: usize,
}

impl<'a> DecodableUtterance<'a> {
    pub fn new(
        scorer: &'a dyn AcousticScorer,
        features: &'a FeatureMatrix,
    ) -> Result<Self, DecodeError> {
        check_feature_dim(scorer.feature_dim(), features)?;
        Ok(Self {
            scorer,
            features,
            chunk_start: 0,
            chunk: None,
            chunks_scored: 0,
        })
    }

    pub fn chunks_scored(&self) -> usize {
        self.chunks_scored
    }

    fn ensure_chunk(&mut self, frame: usize) -> Result<&Array2<f32>, DecodeError> {
        let per_chunk = self.scorer.frames_per_chunk().max(1);
        let start = frame / per_chunk * per_chunk;
        let loaded = matches!(&self.chunk, Some(_) if self.chunk_start == start);
        if !loaded {
            let len = per_chunk.min(self.features.num_frames() - start);
            let scores = self.scorer.score_chunk(self.features, start, len)?;
            self.chunk_start = start;
            self.chunks_scored += 1;
            self.chunk = Some(scores);
        }
        self.chunk
            .as_ref()
            .ok_or_else(|| DecodeError::invalid_config("acoustic chunk missing"))
    }
}

impl Decodable for DecodableUtterance<'_> {
    fn num_frames(&self) -> usize {
        self.features.num_frames()
    }

    fn log_likelihood(&mut self, frame: usize, ilabel: Label) -> Result<f32, DecodeError> {
        let class = self.scorer.transitions().emission_class(ilabel).ok_or_else(|| {
            DecodeError::invalid_config(format!("input label {ilabel} is not a transition id"))
        })?;
        let start = {
            let per_chunk = self.scorer.frames_per_chunk().max(1);
            frame / per_chunk * per_chunk
        };
        let chunk = self.ensure_chunk(frame)?;
        Ok(chunk[[frame - start, class]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acoustic::domain::transition_model::TransitionModel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores class `c` at frame `t` as `-(t * 10 + c)`.
    struct StubScorer {
        transitions: TransitionModel,
        calls: AtomicUsize,
    }

    impl StubScorer {
        fn new() -> Self {
            Self {
                transitions: TransitionModel::new(vec![0, 1, 1], 2).unwrap(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl AcousticScorer for StubScorer {
        fn feature_dim(&self) -> usize {
            1
        }
        fn num_classes(&self) -> usize {
            2
        }
        fn transitions(&self) -> &TransitionModel {
            &self.transitions
        }
        fn frames_per_chunk(&self) -> usize {
            2
        }
        fn score_chunk(
            &self,
            _features: &FeatureMatrix,
            start: usize,
            len: usize,
        ) -> Result<Array2<f32>, DecodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Array2::from_shape_fn((len, 2), |(r, c)| {
                -(((start + r) * 10 + c) as f32)
            }))
        }
    }

    fn features(frames: usize, dim: usize) -> FeatureMatrix {
        FeatureMatrix::from_flat(vec![0.0; frames * dim], frames, dim).unwrap()
    }

    #[test]
    fn test_maps_transition_ids_to_classes() {
        let scorer = StubScorer::new();
        let feats = features(3, 1);
        let mut d = DecodableUtterance::new(&scorer, &feats).unwrap();
        assert_eq!(d.num_frames(), 3);
        assert_eq!(d.log_likelihood(0, 1).unwrap(), 0.0);
        assert_eq!(d.log_likelihood(1, 2).unwrap(), -11.0);
        assert_eq!(d.log_likelihood(2, 3).unwrap(), -21.0);
    }

    #[test]
    fn test_scores_each_chunk_once() {
        let scorer = StubScorer::new();
        let feats = features(5, 1);
        let mut d = DecodableUtterance::new(&scorer, &feats).unwrap();
        for t in 0..5 {
            d.log_likelihood(t, 1).unwrap();
            d.log_likelihood(t, 2).unwrap();
        }
        assert_eq!(d.chunks_scored(), 3);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_rejects_wrong_feature_width() {
        let scorer = StubScorer::new();
        let feats = features(2, 4);
        let result = DecodableUtterance::new(&scorer, &feats);
        assert!(matches!(
            result,
            Err(DecodeError::InvalidFeatureDimension {
                expected: 1,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_epsilon_label_is_an_error() {
        let scorer = StubScorer::new();
        let feats = features(1, 1);
        let mut d = DecodableUtterance::new(&scorer, &feats).unwrap();
        assert!(d.log_likelihood(0, 0).is_err());
    }

    #[test]
    fn test_default_score_reads_one_frame() {
        let scorer = StubScorer::new();
        let feats = features(3, 1);
        assert_eq!(scorer.score(&feats, 2).unwrap(), vec![-20.0, -21.0]);
    }
}
