use std::collections::VecDeque;

use crate::features::domain::feature_matrix::FeatureMatrix;
use crate::features::domain::feature_source::{FeatureSource, Utterance};
use crate::shared::decode_error::DecodeError;

/// In-memory feature store, yielded in insertion order.
#[derive(Default)]
pub struct VecFeatureSource {
    entries: VecDeque<Utterance>,
}

impl VecFeatureSource {
    pub fn new(entries: Vec<Utterance>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    pub fn push(&mut self, id: impl Into<String>, features: FeatureMatrix) {
        self.entries.push_back(Utterance::new(id, features));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FeatureSource for VecFeatureSource {
    fn next_utterance(&mut self) -> Option<Result<Utterance, DecodeError>> {
        self.entries.pop_front().map(Ok)
    }
}
