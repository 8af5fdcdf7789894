use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use crate::features::domain::feature_matrix::FeatureMatrix;
use crate::features::domain::feature_source::{FeatureSource, Utterance};
use crate::shared::decode_error::DecodeError;

/// Reads a text feature archive lazily, one utterance at a time.
///
/// Format, one record per utterance:
///
/// ```text
/// utt-001  [
///   0.12 -1.3 4.0
///   0.10 -1.1 3.9 ]
/// utt-002  [ ]
/// ```
///
/// A record with bad numbers or ragged rows is reported and skipped; the
/// stream ends only when the reader loses its place (no `[` after the id,
/// a matrix never closed, or an I/O error).
pub struct TextFeatureReader<R: BufRead> {
    lines: Lines<R>,
    line_number: usize,
    source_name: String,
    failed: bool,
}

impl TextFeatureReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path).map_err(|e| {
            DecodeError::resource_load(format!("feature archive {}", path.display()), e.to_string())
        })?;
        Ok(Self::new(BufReader::new(file), path.display().to_string()))
    }
}

impl<R: BufRead> TextFeatureReader<R> {
    pub fn new(reader: R, source_name: impl Into<String>) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
            source_name: source_name.into(),
            failed: false,
        }
    }

    fn error(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::resource_load(
            format!("feature archive {}", self.source_name),
            format!("line {}: {}", self.line_number, reason.into()),
        )
    }

    fn next_line(&mut self) -> Option<Result<String, DecodeError>> {
        let line = self.lines.next()?;
        self.line_number += 1;
        Some(line.map_err(DecodeError::from))
    }

    fn read_record(&mut self) -> Option<Result<Utterance, RecordError>> {
        let header = loop {
            match self.next_line()? {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => break line,
                Err(e) => return Some(Err(RecordError::Lost(e))),
            }
        };

        let mut tokens = header.split_whitespace();
        let id = match tokens.next() {
            Some(id) => id.to_string(),
            None => return Some(Err(RecordError::Lost(self.error("missing utterance id")))),
        };
        if tokens.next() != Some("[") {
            let err = self.error(format!("expected '[' after id {id}"));
            return Some(Err(RecordError::Lost(err)));
        }

        let mut rows: Vec<Vec<f32>> = Vec::new();
        let mut invalid: Option<DecodeError> = None;
        let mut pending: Vec<String> = tokens.map(str::to_string).collect();
        loop {
            let closed = pending.last().map(String::as_str) == Some("]");
            if closed {
                pending.pop();
            }
            if !pending.is_empty() && invalid.is_none() {
                match parse_row(&pending) {
                    Ok(row) => rows.push(row),
                    Err(bad) => {
                        invalid = Some(self.error(format!("invalid number '{bad}' in {id}")));
                    }
                }
            }
            if closed {
                break;
            }
            let line = match self.next_line() {
                Some(Ok(line)) => line,
                Some(Err(e)) => return Some(Err(RecordError::Lost(e))),
                None => {
                    let err = self.error(format!("unterminated matrix for {id}"));
                    return Some(Err(RecordError::Lost(err)));
                }
            };
            pending = line.split_whitespace().map(str::to_string).collect();
        }

        if let Some(err) = invalid {
            return Some(Err(RecordError::Skipped(err)));
        }
        Some(
            FeatureMatrix::from_rows(rows)
                .map(|features| Utterance::new(id, features))
                .map_err(RecordError::Skipped),
        )
    }
}

/// A record that could not be read, and whether the next one can still be
/// found.
enum RecordError {
    /// The record was read up to its closing `]`.
    Skipped(DecodeError),
    /// The reader no longer knows where the next record starts.
    Lost(DecodeError),
}

fn parse_row(tokens: &[String]) -> Result<Vec<f32>, &str> {
    tokens
        .iter()
        .map(|t| t.parse::<f32>().map_err(|_| t.as_str()))
        .collect()
}

impl<R: BufRead + Send> FeatureSource for TextFeatureReader<R> {
    fn next_utterance(&mut self) -> Option<Result<Utterance, DecodeError>> {
        if self.failed {
            return None;
        }
        match self.read_record()? {
            Ok(utterance) => Some(Ok(utterance)),
            Err(RecordError::Skipped(e)) => {
                log::warn!("Skipping record in feature archive {}: {e}", self.source_name);
                Some(Err(e))
            }
            Err(RecordError::Lost(e)) => {
                log::warn!("Stopping feature archive {}: {e}", self.source_name);
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
