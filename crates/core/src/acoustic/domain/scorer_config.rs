use serde::{Deserialize, Serialize};

use crate::shared::constants::{AUTO_CONTEXT, DEFAULT_FRAMES_PER_CHUNK};
use crate::shared::decode_error::DecodeError;

/// Chunking and context options for network evaluation.
///
/// `extra_left_context_initial` and `extra_right_context_final` apply to the
/// first and last chunk of an utterance; [`AUTO_CONTEXT`] (-1) makes them
/// fall back to `extra_left_context` / `extra_right_context`. Frames beyond
/// the utterance edges are filled by repeating the edge frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub frames_per_chunk: usize,
    pub extra_left_context: i32,
    pub extra_right_context: i32,
    pub extra_left_context_initial: i32,
    pub extra_right_context_final: i32,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            frames_per_chunk: DEFAULT_FRAMES_PER_CHUNK,
            extra_left_context: 0,
            extra_right_context: 0,
            extra_left_context_initial: AUTO_CONTEXT,
            extra_right_context_final: AUTO_CONTEXT,
        }
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.frames_per_chunk == 0 {
            return Err(DecodeError::invalid_config("frames_per_chunk must be > 0"));
        }
        if self.extra_left_context < 0 || self.extra_right_context < 0 {
            return Err(DecodeError::invalid_config(
                "extra_left_context and extra_right_context must be >= 0",
            ));
        }
        if self.extra_left_context_initial < AUTO_CONTEXT
            || self.extra_right_context_final < AUTO_CONTEXT
        {
            return Err(DecodeError::invalid_config(
                "extra_left_context_initial and extra_right_context_final must be >= -1",
            ));
        }
        Ok(())
    }

    /// Extra left frames for the chunk starting at `chunk_start`.
    pub fn left_context_for(&self, chunk_start: usize) -> usize {
        let extra = if chunk_start == 0 && self.extra_left_context_initial != AUTO_CONTEXT {
            self.extra_left_context_initial
        } else {
            self.extra_left_context
        };
        extra.max(0) as usize
    }

    /// Extra right frames for a chunk; `is_last` marks the utterance's final chunk.
    pub fn right_context_for(&self, is_last: bool) -> usize {
        let extra = if is_last && self.extra_right_context_final != AUTO_CONTEXT {
            self.extra_right_context_final
        } else {
            self.extra_right_context
        };
        extra.max(0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = ScorerConfig::default();
        assert_eq!(config.frames_per_chunk, 50);
        assert_eq!(config.extra_left_context_initial, -1);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case::zero_chunk(ScorerConfig { frames_per_chunk: 0, ..Default::default() })]
    #[case::negative_left(ScorerConfig { extra_left_context: -1, ..Default::default() })]
    #[case::below_sentinel(ScorerConfig { extra_right_context_final: -2, ..Default::default() })]
    fn test_validate_rejects(#[case] config: ScorerConfig) {
        assert!(matches!(
            config.validate(),
            Err(DecodeError::InvalidConfig(_))
        ));
    }

    #[rstest]
    #[case::first_chunk_auto(0, -1, 3)]
    #[case::first_chunk_explicit(0, 1, 1)]
    #[case::later_chunk_ignores_initial(50, 1, 3)]
    fn test_left_context_for(#[case] start: usize, #[case] initial: i32, #[case] expected: usize) {
        let config = ScorerConfig {
            extra_left_context: 3,
            extra_left_context_initial: initial,
            ..Default::default()
        };
        assert_eq!(config.left_context_for(start), expected);
    }

    #[test]
    fn test_right_context_for_last_chunk() {
        let config = ScorerConfig {
            extra_right_context: 2,
            extra_right_context_final: 0,
            ..Default::default()
        };
        assert_eq!(config.right_context_for(false), 2);
        assert_eq!(config.right_context_for(true), 0);
    }

    #[test]
    fn test_deserialises_partial_json() {
        let config: ScorerConfig = serde_json::from_str(r#"{"frames_per_chunk": 20}"#).unwrap();
        assert_eq!(config.frames_per_chunk, 20);
        assert_eq!(config.extra_right_context_final, -1);
    }
}
