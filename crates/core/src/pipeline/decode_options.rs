use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::acoustic::domain::scorer_config::ScorerConfig;
use crate::decoder::domain::decoder_config::DecoderConfig;
use crate::pipeline::output_sink::SinkErrorPolicy;
use crate::shared::decode_error::DecodeError;

/// Every tunable of a decoding session, loadable from JSON.
///
/// Missing fields take their defaults, so a file only needs the options it
/// changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    pub decoder: DecoderConfig,
    pub scorer: ScorerConfig,
    /// Collapse lattices to one path per word sequence before writing.
    pub determinize: bool,
    pub sink_error_policy: SinkErrorPolicy,
    /// 1 decodes on the calling thread.
    pub num_workers: usize,
    /// Wall-clock budget for the whole run, checked between utterances.
    pub time_budget_secs: Option<f64>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            decoder: DecoderConfig::default(),
            scorer: ScorerConfig::default(),
            determinize: true,
            sink_error_policy: SinkErrorPolicy::Abort,
            num_workers: 1,
            time_budget_secs: None,
        }
    }
}

impl DecodeOptions {
    pub fn from_json_file(path: &Path) -> Result<Self, DecodeError> {
        let resource = path.display().to_string();
        let json = fs::read_to_string(path)
            .map_err(|e| DecodeError::resource_load(&resource, e.to_string()))?;
        let options: Self = serde_json::from_str(&json)
            .map_err(|e| DecodeError::resource_load(&resource, e.to_string()))?;
        log::info!("Loaded decode options from {resource}");
        Ok(options)
    }

    pub fn to_json_file(&self, path: &Path) -> Result<(), DecodeError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DecodeError::invalid_config(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        self.decoder.validate()?;
        self.scorer.validate()?;
        if self.num_workers == 0 {
            return Err(DecodeError::invalid_config("num_workers must be > 0"));
        }
        if let Some(budget) = self.time_budget_secs {
            if !(budget > 0.0 && budget.is_finite()) {
                return Err(DecodeError::invalid_config(format!(
                    "time_budget_secs must be > 0, got {budget}"
                )));
            }
        }
        Ok(())
    }
}
