use serde::{Deserialize, Serialize};

use crate::shared::constants::{
    DEFAULT_ACOUSTIC_SCALE, DEFAULT_BEAM, DEFAULT_LATTICE_BEAM, DEFAULT_MAX_ACTIVE,
    DEFAULT_MIN_ACTIVE,
};
use crate::shared::decode_error::DecodeError;

/// Search and pruning options for [`LatticeDecoder`](super::lattice_decoder::LatticeDecoder).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Cost window around the best token kept after each frame.
    pub beam: f32,
    /// Cost window around the best path kept in the output lattice.
    pub lattice_beam: f32,
    pub max_active: usize,
    pub min_active: usize,
    /// Multiplier on acoustic log-likelihoods relative to graph weights.
    pub acoustic_scale: f32,
    /// Return the best incomplete path instead of failing when no final
    /// state is reached.
    pub allow_partial: bool,
    /// Widest beam `min_active` may loosen to; `None` means unbounded.
    pub max_beam: Option<f32>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            beam: DEFAULT_BEAM,
            lattice_beam: DEFAULT_LATTICE_BEAM,
            max_active: DEFAULT_MAX_ACTIVE,
            min_active: DEFAULT_MIN_ACTIVE,
            acoustic_scale: DEFAULT_ACOUSTIC_SCALE,
            allow_partial: true,
            max_beam: None,
        }
    }
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<(), DecodeError> {
        if !(self.acoustic_scale > 0.0 && self.acoustic_scale.is_finite()) {
            return Err(DecodeError::invalid_config(format!(
                "acoustic_scale must be > 0, got {}",
                self.acoustic_scale
            )));
        }
        for (name, value) in [("beam", self.beam), ("lattice_beam", self.lattice_beam)] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(DecodeError::invalid_config(format!(
                    "{name} must be finite and >= 0, got {value}"
                )));
            }
        }
        if self.max_active == 0 {
            return Err(DecodeError::invalid_config("max_active must be > 0"));
        }
        if self.min_active > self.max_active {
            return Err(DecodeError::invalid_config(format!(
                "min_active ({}) exceeds max_active ({})",
                self.min_active, self.max_active
            )));
        }
        if let Some(max_beam) = self.max_beam {
            if !(max_beam >= self.beam) {
                return Err(DecodeError::invalid_config(format!(
                    "max_beam ({max_beam}) must be >= beam ({})",
                    self.beam
                )));
            }
        }
        Ok(())
    }
}
