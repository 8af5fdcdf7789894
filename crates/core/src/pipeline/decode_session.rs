use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::acoustic::infrastructure::nnet_acoustic_scorer::NnetAcousticScorer;
use crate::features::domain::feature_source::{FeatureSource, Utterance};
use crate::graph::domain::symbol_table::SymbolTable;
use crate::pipeline::decode_executor::{DecodeExecutor, RunEnd, SessionControl, UtteranceOutcome};
use crate::pipeline::decode_logger::{DecodeLogger, NullDecodeLogger};
use crate::pipeline::decode_options::DecodeOptions;
use crate::pipeline::decode_resources::DecodeResources;
use crate::pipeline::decode_statistics::DecodeStatistics;
use crate::pipeline::infrastructure::sequential_decode_executor::SequentialDecodeExecutor;
use crate::pipeline::infrastructure::threaded_decode_executor::ThreadedDecodeExecutor;
use crate::pipeline::output_sink::{OutputSinks, SinkErrorPolicy};
use crate::pipeline::utterance_decoder::{UtteranceDecoder, UtteranceResult};
use crate::shared::decode_error::DecodeError;

/// Orchestrates decoding runs over feature sources.
///
/// Owns the aggregate statistics and the sinks; per-utterance work is
/// delegated to a stateless [`UtteranceDecoder`] driven by a
/// [`DecodeExecutor`]. A failed utterance is counted and skipped, never
/// fatal. Only resource errors (at construction), sink errors under
/// [`SinkErrorPolicy::Abort`] and worker panics end a run with an error.
pub struct DecodeSession {
    resources: DecodeResources,
    decoder: UtteranceDecoder,
    sinks: OutputSinks,
    executor: Box<dyn DecodeExecutor>,
    logger: Box<dyn DecodeLogger>,
    policy: SinkErrorPolicy,
    cancelled: Arc<AtomicBool>,
    time_budget: Option<Duration>,
    statistics: DecodeStatistics,
}

impl DecodeSession {
    pub fn new(
        resources: &DecodeResources,
        options: &DecodeOptions,
        sinks: OutputSinks,
    ) -> Result<Self, DecodeError> {
        options.validate()?;
        resources.check_compatible()?;

        let scorer = NnetAcousticScorer::new(Arc::clone(&resources.model), options.scorer.clone())?;
        let decoder = UtteranceDecoder::new(
            Arc::clone(&resources.graph),
            Arc::new(scorer),
            options.decoder.clone(),
            options.determinize,
        )?
        .with_lattice_output(sinks.wants_lattice());

        let executor: Box<dyn DecodeExecutor> = if options.num_workers > 1 {
            Box::new(ThreadedDecodeExecutor::new(options.num_workers))
        } else {
            Box::new(SequentialDecodeExecutor::new())
        };

        Ok(Self {
            resources: resources.clone(),
            decoder,
            sinks,
            executor,
            logger: Box::new(NullDecodeLogger),
            policy: options.sink_error_policy,
            cancelled: Arc::new(AtomicBool::new(false)),
            time_budget: options.time_budget_secs.map(Duration::from_secs_f64),
            statistics: DecodeStatistics::default(),
        })
    }

    pub fn with_executor(mut self, executor: Box<dyn DecodeExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn DecodeLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Shares a cancellation flag with the caller, e.g. a signal handler.
    pub fn with_cancellation(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.time_budget = budget;
        self
    }

    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Snapshot of the totals so far.
    pub fn statistics(&self) -> &DecodeStatistics {
        &self.statistics
    }

    /// Decodes every utterance of `source` and returns the session totals.
    ///
    /// Stops early, with `interrupted` set, when cancelled or out of time.
    pub fn run(&mut self, source: Box<dyn FeatureSource>) -> Result<DecodeStatistics, DecodeError> {
        let control = SessionControl::new(Arc::clone(&self.cancelled)).with_budget(self.time_budget);
        let mut recorder = Recorder {
            sinks: &mut self.sinks,
            symbols: self.resources.symbols.as_deref(),
            logger: self.logger.as_mut(),
            statistics: &mut self.statistics,
            policy: self.policy,
        };

        let executed =
            self.executor
                .execute(source, &self.decoder, &control, &mut |outcome| recorder.handle(outcome));
        let flushed = self.sinks.flush();
        let end = executed?;
        flushed?;

        match end {
            RunEnd::Exhausted => {}
            RunEnd::Cancelled => {
                log::warn!("Decoding cancelled after {} utterances", self.statistics.processed());
                self.statistics.interrupted = true;
            }
            RunEnd::OutOfTime => {
                log::warn!(
                    "Time budget exhausted after {} utterances",
                    self.statistics.processed()
                );
                self.statistics.interrupted = true;
            }
        }

        self.logger.summary();
        log::info!("{}", self.statistics.summary());
        Ok(self.statistics.clone())
    }

    /// Decodes one in-memory utterance with the same bookkeeping as [`run`].
    ///
    /// Per-utterance errors are counted as failures and also returned.
    ///
    /// [`run`]: DecodeSession::run
    pub fn decode_one(&mut self, utterance: &Utterance) -> Result<UtteranceResult, DecodeError> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(DecodeError::Cancelled);
        }
        let mut recorder = Recorder {
            sinks: &mut self.sinks,
            symbols: self.resources.symbols.as_deref(),
            logger: self.logger.as_mut(),
            statistics: &mut self.statistics,
            policy: self.policy,
        };
        match self.decoder.decode(utterance) {
            Ok(result) => {
                recorder.record_decoded(&result)?;
                Ok(result)
            }
            Err(error) => {
                recorder.record_failed(&utterance.id, &error);
                Err(error)
            }
        }
    }
}

/// Applies outcomes to the session state; the only mutator of statistics.
struct Recorder<'a> {
    sinks: &'a mut OutputSinks,
    symbols: Option<&'a SymbolTable>,
    logger: &'a mut dyn DecodeLogger,
    statistics: &'a mut DecodeStatistics,
    policy: SinkErrorPolicy,
}

impl Recorder<'_> {
    fn handle(&mut self, outcome: UtteranceOutcome) -> Result<(), DecodeError> {
        match outcome {
            UtteranceOutcome::Decoded(result) => self.record_decoded(&result),
            UtteranceOutcome::Failed {
                utterance_id,
                error,
            } => {
                self.record_failed(&utterance_id, &error);
                Ok(())
            }
            UtteranceOutcome::ReadFailed(error) => {
                log::warn!("Failed to read features: {error}");
                self.count_failure();
                Ok(())
            }
        }
    }

    fn record_decoded(&mut self, result: &UtteranceResult) -> Result<(), DecodeError> {
        let id = result.utterance_id.as_str();
        let write_start = Instant::now();
        if let Err(error) = self.sinks.write(result, self.symbols) {
            return match self.policy {
                SinkErrorPolicy::Abort => Err(error),
                SinkErrorPolicy::Skip => {
                    log::warn!("Skipping {id}: {error}");
                    self.count_failure();
                    Ok(())
                }
            };
        }

        self.logger.timing("search", result.timings.search_ms);
        self.logger.timing("extract", result.timings.extract_ms);
        self.logger
            .timing("write", write_start.elapsed().as_secs_f64() * 1000.0);
        self.logger.metric("active_tokens", result.timings.active_tokens);
        if let Some(lattice) = &result.lattice {
            self.logger.metric("lattice_states", lattice.num_states() as f64);
        }

        let log_likelihood = result.log_likelihood();
        self.statistics
            .record_success(result.num_frames, log_likelihood, result.partial);
        log::info!(
            "Utterance {id}: {} frames, average log-likelihood per frame {:.4}{}",
            result.num_frames,
            log_likelihood / result.num_frames as f64,
            if result.partial { " (partial)" } else { "" }
        );
        self.logger.progress(self.statistics.processed());
        Ok(())
    }

    fn record_failed(&mut self, utterance_id: &str, error: &DecodeError) {
        log::warn!("Failed to decode {utterance_id}: {error}");
        self.count_failure();
    }

    fn count_failure(&mut self) {
        self.statistics.record_failure();
        self.logger.progress(self.statistics.processed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acoustic::domain::acoustic_model::AcousticModel;
    use crate::acoustic::domain::feedforward_network::{FeedForwardNetwork, Layer};
    use crate::acoustic::domain::transition_model::TransitionModel;
    use crate::features::domain::feature_matrix::FeatureMatrix;
    use crate::features::infrastructure::vec_feature_source::VecFeatureSource;
    use crate::graph::domain::decoding_graph::{GraphArc, GraphBuilder};
    use crate::pipeline::infrastructure::memory_sinks::CollectingSink;
    use crate::pipeline::output_sink::{Transcript, TranscriptSink};
    use ndarray::{Array1, Array2};
    use std::sync::Mutex;

    // --- Stubs ---

    /// Rejects the transcript of one utterance.
    struct FailingTranscriptSink {
        fail_on: String,
        written: Arc<Mutex<Vec<String>>>,
    }

    impl TranscriptSink for FailingTranscriptSink {
        fn write_transcript(&mut self, transcript: &Transcript) -> Result<(), DecodeError> {
            if transcript.utterance_id == self.fail_on {
                return Err(DecodeError::sink_write(&transcript.utterance_id, "disk full"));
            }
            self.written
                .lock()
                .unwrap()
                .push(transcript.utterance_id.clone());
            Ok(())
        }
    }

    /// Yields one good utterance, then a read error, then another utterance.
    struct FlakySource {
        step: usize,
    }

    impl FeatureSource for FlakySource {
        fn next_utterance(&mut self) -> Option<Result<Utterance, DecodeError>> {
            self.step += 1;
            match self.step {
                1 => Some(Ok(utterance("a", 2))),
                2 => Some(Err(DecodeError::resource_load("features", "bad record"))),
                3 => Some(Ok(utterance("b", 3))),
                _ => None,
            }
        }
    }

    // --- Helpers ---

    /// Two classes scored by log-softmax of the raw features; tid 1 is
    /// class 0 and emits word 1, tid 2 is class 1 and emits word 2.
    fn resources() -> DecodeResources {
        let network = FeedForwardNetwork::new(
            2,
            0,
            0,
            vec![
                Layer::Affine {
                    weights: Array2::eye(2),
                    bias: Array1::zeros(2),
                },
                Layer::LogSoftmax,
            ],
            None,
        )
        .unwrap();
        let model =
            AcousticModel::new(TransitionModel::new(vec![0, 1], 2).unwrap(), network).unwrap();

        let mut b = GraphBuilder::new();
        b.set_start(0)
            .add_arc(0, GraphArc::new(1, 1, 0.0, 1))
            .add_arc(0, GraphArc::new(2, 2, 0.0, 1))
            .add_arc(1, GraphArc::new(1, 0, 0.0, 1))
            .add_arc(1, GraphArc::new(2, 0, 0.0, 1))
            .set_final(1, 0.0);
        DecodeResources::from_parts(model, b.build().unwrap(), None).unwrap()
    }

    fn options() -> DecodeOptions {
        let mut options = DecodeOptions::default();
        options.decoder.acoustic_scale = 1.0;
        options
    }

    fn utterance(id: &str, frames: usize) -> Utterance {
        let rows = (0..frames).map(|t| vec![t as f32 * 0.1, 1.0]).collect();
        Utterance::new(id, FeatureMatrix::from_rows(rows).unwrap())
    }

    fn source(entries: Vec<Utterance>) -> Box<dyn FeatureSource> {
        Box::new(VecFeatureSource::new(entries))
    }

    fn transcript_sinks() -> (OutputSinks, CollectingSink<Transcript>) {
        let collected = CollectingSink::new();
        let sinks = OutputSinks {
            transcript: Some(Box::new(collected.clone())),
            ..OutputSinks::none()
        };
        (sinks, collected)
    }

    fn ids(sink: &CollectingSink<Transcript>) -> Vec<String> {
        sink.records().into_iter().map(|t| t.utterance_id).collect()
    }

    // --- Tests ---

    #[test]
    fn test_empty_utterance_counted_and_skipped() {
        let (sinks, collected) = transcript_sinks();
        let mut session = DecodeSession::new(&resources(), &options(), sinks).unwrap();
        let empty = Utterance::new("empty", FeatureMatrix::empty(2));

        let stats = session
            .run(source(vec![utterance("u1", 4), empty, utterance("u3", 2)]))
            .unwrap();

        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.total_frames, 6);
        assert!(!stats.interrupted);
        assert_eq!(ids(&collected), vec!["u1", "u3"]);
    }

    #[test]
    fn test_wrong_dimension_counted_as_failure() {
        let mut session = DecodeSession::new(&resources(), &options(), OutputSinks::none()).unwrap();
        let wide = Utterance::new("wide", FeatureMatrix::from_rows(vec![vec![0.0; 3]]).unwrap());
        let stats = session.run(source(vec![wide, utterance("ok", 2)])).unwrap();
        assert_eq!((stats.success_count, stats.failure_count), (1, 1));
    }

    #[test]
    fn test_read_error_counted_as_failure() {
        let mut session = DecodeSession::new(&resources(), &options(), OutputSinks::none()).unwrap();
        let stats = session.run(Box::new(FlakySource { step: 0 })).unwrap();
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.failure_count, 1);
    }

    #[test]
    fn test_sink_error_aborts_by_default() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let sinks = OutputSinks {
            transcript: Some(Box::new(FailingTranscriptSink {
                fail_on: "u2".into(),
                written: Arc::clone(&written),
            })),
            ..OutputSinks::none()
        };
        let mut session = DecodeSession::new(&resources(), &options(), sinks).unwrap();

        let err = session
            .run(source(vec![utterance("u1", 2), utterance("u2", 2), utterance("u3", 2)]))
            .unwrap_err();

        assert!(matches!(err, DecodeError::SinkWrite { utterance_id, .. } if utterance_id == "u2"));
        assert_eq!(*written.lock().unwrap(), vec!["u1"]);
        assert_eq!(session.statistics().success_count, 1);
    }

    #[test]
    fn test_sink_error_skipped_counts_failure() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let sinks = OutputSinks {
            transcript: Some(Box::new(FailingTranscriptSink {
                fail_on: "u2".into(),
                written: Arc::clone(&written),
            })),
            ..OutputSinks::none()
        };
        let mut opts = options();
        opts.sink_error_policy = SinkErrorPolicy::Skip;
        let mut session = DecodeSession::new(&resources(), &opts, sinks).unwrap();

        let stats = session
            .run(source(vec![utterance("u1", 2), utterance("u2", 2), utterance("u3", 2)]))
            .unwrap();

        assert_eq!((stats.success_count, stats.failure_count), (2, 1));
        assert_eq!(*written.lock().unwrap(), vec!["u1", "u3"]);
    }

    #[test]
    fn test_cancelled_before_start_processes_nothing() {
        let cancelled = Arc::new(AtomicBool::new(true));
        let mut session = DecodeSession::new(&resources(), &options(), OutputSinks::none())
            .unwrap()
            .with_cancellation(Arc::clone(&cancelled));

        let stats = session.run(source(vec![utterance("u1", 2)])).unwrap();
        assert_eq!(stats.processed(), 0);
        assert!(stats.interrupted);
        assert!(matches!(
            session.decode_one(&utterance("u2", 2)),
            Err(DecodeError::Cancelled)
        ));
    }

    #[test]
    fn test_expired_budget_interrupts() {
        let mut session = DecodeSession::new(&resources(), &options(), OutputSinks::none())
            .unwrap()
            .with_time_budget(Some(Duration::ZERO));
        let stats = session.run(source(vec![utterance("u1", 2)])).unwrap();
        assert!(stats.interrupted);
        assert_eq!(stats.processed(), 0);
    }

    #[test]
    fn test_threaded_run_matches_sequential() {
        let entries: Vec<Utterance> = (0..12).map(|i| utterance(&format!("u{i}"), 1 + i % 4)).collect();

        let (sinks, sequential_out) = transcript_sinks();
        let mut sequential = DecodeSession::new(&resources(), &options(), sinks).unwrap();
        let expected = sequential.run(source(entries.clone())).unwrap();

        let (sinks, threaded_out) = transcript_sinks();
        let mut opts = options();
        opts.num_workers = 3;
        let mut threaded = DecodeSession::new(&resources(), &opts, sinks).unwrap();
        let actual = threaded.run(source(entries)).unwrap();

        assert_eq!(actual.success_count, expected.success_count);
        assert_eq!(actual.total_frames, expected.total_frames);
        assert!((actual.total_log_likelihood - expected.total_log_likelihood).abs() < 1e-6);
        assert_eq!(ids(&threaded_out), ids(&sequential_out));
    }

    #[test]
    fn test_decode_one_updates_statistics() {
        let (sinks, collected) = transcript_sinks();
        let mut session = DecodeSession::new(&resources(), &options(), sinks).unwrap();

        let result = session.decode_one(&utterance("single", 3)).unwrap();
        assert_eq!(result.num_frames, 3);
        assert!(session
            .decode_one(&Utterance::new("empty", FeatureMatrix::empty(2)))
            .is_err());

        let stats = session.statistics();
        assert_eq!((stats.success_count, stats.failure_count), (1, 1));
        assert_eq!(collected.len(), 1);
    }

    #[test]
    fn test_invalid_options_rejected_before_decoding() {
        let mut opts = options();
        opts.decoder.acoustic_scale = 0.0;
        assert!(matches!(
            DecodeSession::new(&resources(), &opts, OutputSinks::none()),
            Err(DecodeError::InvalidConfig(_))
        ));
    }
}
