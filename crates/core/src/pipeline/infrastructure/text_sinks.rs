use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::acoustic::domain::transition_model::AlignmentSegment;
use crate::pipeline::output_sink::{AlignmentSink, Transcript, TranscriptSink};
use crate::shared::decode_error::DecodeError;

fn create_file(path: &Path, what: &str) -> Result<BufWriter<File>, DecodeError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| DecodeError::resource_load(format!("{what} {}", path.display()), e.to_string()))
}

/// Line layout of [`TextTranscriptWriter`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TranscriptFormat {
    /// `utt-id word word ...`
    #[default]
    Text,
    /// One JSON object per line.
    JsonLines,
}

pub struct TextTranscriptWriter<W: Write + Send> {
    out: W,
    format: TranscriptFormat,
}

impl TextTranscriptWriter<BufWriter<File>> {
    pub fn create(path: &Path, format: TranscriptFormat) -> Result<Self, DecodeError> {
        Ok(Self::new(create_file(path, "transcript output")?, format))
    }
}

impl<W: Write + Send> TextTranscriptWriter<W> {
    pub fn new(out: W, format: TranscriptFormat) -> Self {
        Self { out, format }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> TranscriptSink for TextTranscriptWriter<W> {
    fn write_transcript(&mut self, transcript: &Transcript) -> Result<(), DecodeError> {
        let id = transcript.utterance_id.as_str();
        let line = match self.format {
            TranscriptFormat::Text => {
                let mut line = id.to_string();
                for word in &transcript.words {
                    line.push(' ');
                    line.push_str(word);
                }
                line
            }
            TranscriptFormat::JsonLines => {
                serde_json::to_string(transcript).map_err(|e| DecodeError::sink_write(id, e))?
            }
        };
        writeln!(self.out, "{line}").map_err(|e| DecodeError::sink_write(id, e))
    }

    fn flush(&mut self) -> Result<(), DecodeError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Writes `utt-id class duration ; class duration ...` per utterance.
pub struct TextAlignmentWriter<W: Write + Send> {
    out: W,
}

impl TextAlignmentWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, DecodeError> {
        Ok(Self::new(create_file(path, "alignment output")?))
    }
}

impl<W: Write + Send> TextAlignmentWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> AlignmentSink for TextAlignmentWriter<W> {
    fn write_alignment(
        &mut self,
        utterance_id: &str,
        alignment: &[AlignmentSegment],
    ) -> Result<(), DecodeError> {
        let segments: Vec<String> = alignment
            .iter()
            .map(|s| format!("{} {}", s.class, s.duration))
            .collect();
        writeln!(self.out, "{utterance_id} {}", segments.join(" ; "))
            .map_err(|e| DecodeError::sink_write(utterance_id, e))
    }

    fn flush(&mut self) -> Result<(), DecodeError> {
        self.out.flush()?;
        Ok(())
    }
}
