use std::sync::Arc;
use std::time::Instant;

use crate::acoustic::domain::acoustic_scorer::AcousticScorer;
use crate::acoustic::domain::decodable_utterance::DecodableUtterance;
use crate::acoustic::domain::transition_model::AlignmentSegment;
use crate::decoder::domain::decoder_config::DecoderConfig;
use crate::decoder::domain::lattice_decoder::LatticeDecoder;
use crate::features::domain::feature_source::Utterance;
use crate::graph::domain::decoding_graph::DecodingGraph;
use crate::lattice::domain::best_path::BestPath;
use crate::lattice::domain::result_extractor::{OutputLattice, ResultExtractor};
use crate::shared::decode_error::DecodeError;

/// Wall-clock time spent in each stage of one utterance, in milliseconds.
///
/// Scoring happens lazily inside the search and is counted under `search`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DecodeTimings {
    pub search_ms: f64,
    pub extract_ms: f64,
    /// Mean number of active tokens per frame.
    pub active_tokens: f64,
}

/// Everything produced for one successfully decoded utterance.
#[derive(Clone, Debug, PartialEq)]
pub struct UtteranceResult {
    pub utterance_id: String,
    pub num_frames: usize,
    pub best_path: BestPath,
    /// Present when the session writes lattices.
    pub lattice: Option<OutputLattice>,
    pub alignment: Vec<AlignmentSegment>,
    pub partial: bool,
    pub timings: DecodeTimings,
}

impl UtteranceResult {
    pub fn log_likelihood(&self) -> f64 {
        self.best_path.log_likelihood()
    }
}

/// Decodes single utterances against shared, read-only resources.
///
/// Holds no per-utterance state, so one instance serves every worker
/// thread.
pub struct UtteranceDecoder {
    graph: Arc<DecodingGraph>,
    scorer: Arc<dyn AcousticScorer>,
    config: DecoderConfig,
    extractor: ResultExtractor,
    determinize: bool,
    produce_lattice: bool,
}

impl UtteranceDecoder {
    pub fn new(
        graph: Arc<DecodingGraph>,
        scorer: Arc<dyn AcousticScorer>,
        config: DecoderConfig,
        determinize: bool,
    ) -> Result<Self, DecodeError> {
        config.validate()?;
        Ok(Self {
            extractor: ResultExtractor::new(config.lattice_beam),
            graph,
            scorer,
            config,
            determinize,
            produce_lattice: true,
        })
    }

    /// Skips lattice extraction when nobody consumes lattices.
    pub fn with_lattice_output(mut self, produce_lattice: bool) -> Self {
        self.produce_lattice = produce_lattice;
        self
    }

    pub fn scorer(&self) -> &dyn AcousticScorer {
        self.scorer.as_ref()
    }

    pub fn decode(&self, utterance: &Utterance) -> Result<UtteranceResult, DecodeError> {
        if utterance.features.is_empty() {
            return Err(DecodeError::EmptyUtterance(utterance.id.clone()));
        }

        let search_start = Instant::now();
        let mut decodable = DecodableUtterance::new(self.scorer.as_ref(), &utterance.features)?;
        let decoder = LatticeDecoder::new(&self.graph, self.config.clone())?;
        let search = decoder.decode(&mut decodable)?;
        let search_ms = search_start.elapsed().as_secs_f64() * 1000.0;

        let extract_start = Instant::now();
        let best_path = search.best_path();
        let lattice = self
            .produce_lattice
            .then(|| self.extractor.extract(&search, self.determinize));
        let alignment = self.scorer.transitions().alignment(&best_path.transition_ids);
        let extract_ms = extract_start.elapsed().as_secs_f64() * 1000.0;

        let frames = search.frames();
        let active_tokens = frames[1..].iter().map(|f| f.active.len()).sum::<usize>() as f64
            / (frames.len() - 1).max(1) as f64;

        Ok(UtteranceResult {
            utterance_id: utterance.id.clone(),
            num_frames: utterance.features.num_frames(),
            best_path,
            lattice,
            alignment,
            partial: search.is_partial(),
            timings: DecodeTimings {
                search_ms,
                extract_ms,
                active_tokens,
            },
        })
    }
}
