use serde::{Deserialize, Serialize};

use crate::acoustic::domain::transition_model::AlignmentSegment;
use crate::graph::domain::decoding_graph::Label;
use crate::graph::domain::symbol_table::SymbolTable;
use crate::lattice::domain::best_path::WordTiming;
use crate::lattice::domain::result_extractor::OutputLattice;
use crate::pipeline::utterance_decoder::UtteranceResult;
use crate::shared::decode_error::DecodeError;

/// Receives one lattice per successfully decoded utterance.
pub trait LatticeSink: Send {
    fn write_lattice(&mut self, utterance_id: &str, lattice: &OutputLattice)
        -> Result<(), DecodeError>;

    fn flush(&mut self) -> Result<(), DecodeError> {
        Ok(())
    }
}

/// Receives the best-path transcription of each decoded utterance.
pub trait TranscriptSink: Send {
    fn write_transcript(&mut self, transcript: &Transcript) -> Result<(), DecodeError>;

    fn flush(&mut self) -> Result<(), DecodeError> {
        Ok(())
    }
}

/// Receives the frame-level (class, duration) alignment of each utterance.
pub trait AlignmentSink: Send {
    fn write_alignment(
        &mut self,
        utterance_id: &str,
        alignment: &[AlignmentSegment],
    ) -> Result<(), DecodeError>;

    fn flush(&mut self) -> Result<(), DecodeError> {
        Ok(())
    }
}

/// Best-path record for one utterance.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Transcript {
    pub utterance_id: String,
    /// Surface forms; ids missing from the symbol table appear as numbers.
    pub words: Vec<String>,
    pub word_ids: Vec<Label>,
    pub word_timings: Vec<WordTiming>,
    pub log_likelihood: f64,
    pub num_frames: usize,
    pub partial: bool,
}

impl Transcript {
    pub fn from_result(result: &UtteranceResult, symbols: Option<&SymbolTable>) -> Self {
        let word_ids = result.best_path.word_ids.clone();
        let words = match symbols {
            Some(table) => table.render(&word_ids),
            None => word_ids.iter().map(ToString::to_string).collect(),
        };
        Self {
            utterance_id: result.utterance_id.clone(),
            words,
            word_ids,
            word_timings: result.best_path.word_timings.clone(),
            log_likelihood: result.log_likelihood(),
            num_frames: result.num_frames,
            partial: result.partial,
        }
    }
}

/// What the session does when a sink rejects a record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkErrorPolicy {
    /// Stop the session and return the error.
    #[default]
    Abort,
    /// Count the utterance as failed and continue.
    Skip,
}

impl std::fmt::Display for SinkErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkErrorPolicy::Abort => write!(f, "abort"),
            SinkErrorPolicy::Skip => write!(f, "skip"),
        }
    }
}

/// The optional output destinations of a session.
#[derive(Default)]
pub struct OutputSinks {
    pub lattice: Option<Box<dyn LatticeSink>>,
    pub transcript: Option<Box<dyn TranscriptSink>>,
    pub alignment: Option<Box<dyn AlignmentSink>>,
}

impl OutputSinks {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn wants_lattice(&self) -> bool {
        self.lattice.is_some()
    }

    pub fn write(
        &mut self,
        result: &UtteranceResult,
        symbols: Option<&SymbolTable>,
    ) -> Result<(), DecodeError> {
        if let (Some(sink), Some(lattice)) = (self.lattice.as_mut(), result.lattice.as_ref()) {
            sink.write_lattice(&result.utterance_id, lattice)?;
        }
        if let Some(sink) = self.transcript.as_mut() {
            sink.write_transcript(&Transcript::from_result(result, symbols))?;
        }
        if let Some(sink) = self.alignment.as_mut() {
            sink.write_alignment(&result.utterance_id, &result.alignment)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), DecodeError> {
        if let Some(sink) = self.lattice.as_mut() {
            sink.flush()?;
        }
        if let Some(sink) = self.transcript.as_mut() {
            sink.flush()?;
        }
        if let Some(sink) = self.alignment.as_mut() {
            sink.flush()?;
        }
        Ok(())
    }
}
