use crate::features::domain::feature_source::FeatureSource;
use crate::pipeline::decode_executor::{
    decode_entry, DecodeExecutor, OutcomeHandler, RunEnd, SessionControl,
};
use crate::pipeline::utterance_decoder::UtteranceDecoder;
use crate::shared::decode_error::DecodeError;

/// Reads, decodes and reports one utterance at a time on the calling thread.
#[derive(Default)]
pub struct SequentialDecodeExecutor;

impl SequentialDecodeExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl DecodeExecutor for SequentialDecodeExecutor {
    fn execute(
        &self,
        mut source: Box<dyn FeatureSource>,
        decoder: &UtteranceDecoder,
        control: &SessionControl,
        on_outcome: &mut OutcomeHandler<'_>,
    ) -> Result<RunEnd, DecodeError> {
        loop {
            if let Some(end) = control.stop_reason() {
                return Ok(end);
            }
            let Some(entry) = source.next_utterance() else {
                return Ok(RunEnd::Exhausted);
            };
            on_outcome(decode_entry(decoder, entry))?;
        }
    }
}
