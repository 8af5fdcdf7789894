use super::feature_matrix::FeatureMatrix;
use crate::shared::decode_error::DecodeError;

/// One entry of a feature store.
#[derive(Clone, Debug, PartialEq)]
pub struct Utterance {
    pub id: String,
    pub features: FeatureMatrix,
}

impl Utterance {
    pub fn new(id: impl Into<String>, features: FeatureMatrix) -> Self {
        Self {
            id: id.into(),
            features,
        }
    }
}

/// Domain interface for a sequential key-value feature store.
///
/// Entries are yielded lazily and in store order. A read error for one entry
/// is reported as an `Err` item; sources decide whether they can continue
/// past it.
pub trait FeatureSource: Send {
    fn next_utterance(&mut self) -> Option<Result<Utterance, DecodeError>>;
}
