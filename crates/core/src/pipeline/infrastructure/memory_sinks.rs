use std::sync::{Arc, Mutex, PoisonError};

use crate::acoustic::domain::transition_model::AlignmentSegment;
use crate::lattice::domain::result_extractor::OutputLattice;
use crate::pipeline::output_sink::{AlignmentSink, LatticeSink, Transcript, TranscriptSink};
use crate::shared::decode_error::DecodeError;

/// Sink that keeps every record in memory.
///
/// Clones share one buffer, so a caller can hand a clone to the session and
/// read the records back through the first handle afterwards.
pub struct CollectingSink<T> {
    records: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for CollectingSink<T> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl<T> Default for CollectingSink<T> {
    fn default() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> CollectingSink<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<T> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, record: T) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

impl LatticeSink for CollectingSink<(String, OutputLattice)> {
    fn write_lattice(
        &mut self,
        utterance_id: &str,
        lattice: &OutputLattice,
    ) -> Result<(), DecodeError> {
        self.push((utterance_id.to_string(), lattice.clone()));
        Ok(())
    }
}

impl TranscriptSink for CollectingSink<Transcript> {
    fn write_transcript(&mut self, transcript: &Transcript) -> Result<(), DecodeError> {
        self.push(transcript.clone());
        Ok(())
    }
}

impl AlignmentSink for CollectingSink<(String, Vec<AlignmentSegment>)> {
    fn write_alignment(
        &mut self,
        utterance_id: &str,
        alignment: &[AlignmentSegment],
    ) -> Result<(), DecodeError> {
        self.push((utterance_id.to_string(), alignment.to_vec()));
        Ok(())
    }
}
