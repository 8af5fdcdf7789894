use thiserror::Error;

/// Every failure the decoding core can report.
///
/// Resource and configuration errors are fatal to session construction.
/// Per-utterance errors (see [`DecodeError::is_utterance_local`]) are
/// recovered by the session: the utterance is counted as failed and the run
/// moves on.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to load {resource}: {reason}")]
    ResourceLoad { resource: String, reason: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("feature dimension mismatch: model expects {expected}, got {actual}")]
    InvalidFeatureDimension { expected: usize, actual: usize },
    #[error("utterance {0} has no frames")]
    EmptyUtterance(String),
    #[error("search exhausted at frame {frame}: no surviving hypothesis")]
    SearchExhausted { frame: usize },
    #[error("failed to write output for {utterance_id}: {reason}")]
    SinkWrite {
        utterance_id: String,
        reason: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decoding cancelled")]
    Cancelled,
    #[error("worker thread failed: {0}")]
    WorkerPanic(String),
}

impl DecodeError {
    pub fn resource_load(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResourceLoad {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn sink_write(utterance_id: &str, reason: impl ToString) -> Self {
        Self::SinkWrite {
            utterance_id: utterance_id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for errors that only invalidate the current utterance.
    pub fn is_utterance_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidFeatureDimension { .. }
                | Self::EmptyUtterance(_)
                | Self::SearchExhausted { .. }
        )
    }
}
