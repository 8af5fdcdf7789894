use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::features::domain::feature_source::{FeatureSource, Utterance};
use crate::pipeline::utterance_decoder::{UtteranceDecoder, UtteranceResult};
use crate::shared::decode_error::DecodeError;

/// What happened to one entry of the feature source.
#[derive(Debug)]
pub enum UtteranceOutcome {
    Decoded(UtteranceResult),
    /// The utterance was read but could not be decoded.
    Failed {
        utterance_id: String,
        error: DecodeError,
    },
    /// The source reported an error instead of an utterance.
    ReadFailed(DecodeError),
}

/// Why an executor stopped pulling utterances.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunEnd {
    Exhausted,
    Cancelled,
    OutOfTime,
}

/// Stop conditions checked between utterances, never mid-utterance.
#[derive(Clone, Debug, Default)]
pub struct SessionControl {
    pub cancelled: Arc<AtomicBool>,
    pub deadline: Option<Instant>,
}

impl SessionControl {
    pub fn new(cancelled: Arc<AtomicBool>) -> Self {
        Self {
            cancelled,
            deadline: None,
        }
    }

    /// Deadline `budget` from now.
    pub fn with_budget(mut self, budget: Option<Duration>) -> Self {
        self.deadline = budget.map(|b| Instant::now() + b);
        self
    }

    pub fn stop_reason(&self) -> Option<RunEnd> {
        if self.cancelled.load(Ordering::Relaxed) {
            Some(RunEnd::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(RunEnd::OutOfTime)
        } else {
            None
        }
    }
}

/// Callback receiving outcomes in source order. An `Err` aborts the run.
pub type OutcomeHandler<'a> = dyn FnMut(UtteranceOutcome) -> Result<(), DecodeError> + 'a;

/// Abstracts how utterances flow from the source through the decoder.
///
/// This is a port; infrastructure provides a sequential and a threaded
/// implementation. Either way outcomes reach `on_outcome` on the calling
/// thread and in source order, so the caller stays the single owner of
/// statistics and sinks.
pub trait DecodeExecutor: Send {
    fn execute(
        &self,
        source: Box<dyn FeatureSource>,
        decoder: &UtteranceDecoder,
        control: &SessionControl,
        on_outcome: &mut OutcomeHandler<'_>,
    ) -> Result<RunEnd, DecodeError>;
}

/// Decodes one source entry into its outcome.
pub(crate) fn decode_entry(
    decoder: &UtteranceDecoder,
    entry: Result<Utterance, DecodeError>,
) -> UtteranceOutcome {
    match entry {
        Ok(utterance) => match decoder.decode(&utterance) {
            Ok(result) => UtteranceOutcome::Decoded(result),
            Err(error) => UtteranceOutcome::Failed {
                utterance_id: utterance.id,
                error,
            },
        },
        Err(error) => UtteranceOutcome::ReadFailed(error),
    }
}
