use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use latgen_core::acoustic::infrastructure::model_reader::read_model_file;
use latgen_core::features::infrastructure::text_feature_reader::TextFeatureReader;
use latgen_core::lattice::infrastructure::text_lattice_writer::TextLatticeWriter;
use latgen_core::pipeline::decode_logger::SummaryDecodeLogger;
use latgen_core::pipeline::decode_options::DecodeOptions;
use latgen_core::pipeline::decode_resources::DecodeResources;
use latgen_core::pipeline::decode_session::DecodeSession;
use latgen_core::pipeline::infrastructure::text_sinks::{
    TextAlignmentWriter, TextTranscriptWriter, TranscriptFormat,
};
use latgen_core::pipeline::output_sink::{OutputSinks, SinkErrorPolicy};
use latgen_core::shared::constants::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};

/// Decode feature archives into word lattices, transcripts and alignments.
#[derive(Parser)]
#[command(name = "latgen")]
struct Cli {
    /// Acoustic model (transition model followed by network).
    model: PathBuf,

    /// Decoding graph, OpenFst binary or AT&T text.
    graph: Option<PathBuf>,

    /// Text feature archive.
    features: Option<PathBuf>,

    /// Word symbol table for readable transcripts.
    #[arg(long)]
    words: Option<PathBuf>,

    /// JSON options file (default: <config dir>/latgen/decode.json if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write lattices here.
    #[arg(long)]
    lattice_out: Option<PathBuf>,

    /// Write best-path transcripts here.
    #[arg(long)]
    transcript_out: Option<PathBuf>,

    /// Write transcripts as JSON lines instead of plain text.
    #[arg(long)]
    json_transcript: bool,

    /// Write (class, duration) alignments here.
    #[arg(long)]
    alignment_out: Option<PathBuf>,

    /// Search beam.
    #[arg(long)]
    beam: Option<f32>,

    /// Lattice pruning beam.
    #[arg(long)]
    lattice_beam: Option<f32>,

    /// Upper bound on active tokens per frame.
    #[arg(long)]
    max_active: Option<usize>,

    /// Lower bound on active tokens per frame.
    #[arg(long)]
    min_active: Option<usize>,

    /// Widest beam --min-active may loosen to.
    #[arg(long)]
    max_beam: Option<f32>,

    /// Scale applied to acoustic log-likelihoods.
    #[arg(long)]
    acoustic_scale: Option<f32>,

    /// Emit the best partial path when no final state is reached.
    #[arg(long)]
    allow_partial: Option<bool>,

    /// Word-determinize lattices before writing them; `false` writes raw
    /// lattices.
    #[arg(long)]
    determinize: Option<bool>,

    /// Frames scored per network evaluation.
    #[arg(long)]
    frames_per_chunk: Option<usize>,

    /// Extra left context frames per chunk.
    #[arg(long)]
    extra_left_context: Option<i32>,

    /// Extra right context frames per chunk.
    #[arg(long)]
    extra_right_context: Option<i32>,

    /// Left context for the first chunk (-1 = same as --extra-left-context).
    #[arg(long)]
    extra_left_context_initial: Option<i32>,

    /// Right context for the last chunk (-1 = same as --extra-right-context).
    #[arg(long)]
    extra_right_context_final: Option<i32>,

    /// Decoding threads (1 = decode on the main thread).
    #[arg(long)]
    workers: Option<usize>,

    /// Stop starting new utterances after this many seconds.
    #[arg(long)]
    time_budget: Option<f64>,

    /// On output errors: abort or skip.
    #[arg(long)]
    on_sink_error: Option<String>,

    /// Print a description of the model and exit.
    #[arg(long)]
    model_info: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    if cli.model_info {
        let model = read_model_file(&cli.model)?;
        println!("{}", model.info());
        return Ok(());
    }

    let options = build_options(&cli)?;
    let (graph, features) = match (&cli.graph, &cli.features) {
        (Some(graph), Some(features)) => (graph, features),
        _ => return Err("Graph and features are required unless --model-info is used".into()),
    };

    let resources = DecodeResources::load(&cli.model, graph, cli.words.as_deref())?;
    let sinks = build_sinks(&cli)?;
    let source = TextFeatureReader::open(features)?;

    let mut session = DecodeSession::new(&resources, &options, sinks)?
        .with_logger(Box::new(SummaryDecodeLogger::default()));
    let stats = session.run(Box::new(source))?;

    if stats.success_count == 0 && stats.failure_count > 0 {
        return Err("No utterance was decoded successfully".into());
    }
    Ok(())
}

fn build_options(cli: &Cli) -> Result<DecodeOptions, Box<dyn std::error::Error>> {
    let mut options = match cli.config.clone().or_else(default_config_path) {
        Some(path) if cli.config.is_some() || path.exists() => DecodeOptions::from_json_file(&path)?,
        _ => DecodeOptions::default(),
    };

    let decoder = &mut options.decoder;
    override_with(&mut decoder.beam, cli.beam);
    override_with(&mut decoder.lattice_beam, cli.lattice_beam);
    override_with(&mut decoder.max_active, cli.max_active);
    override_with(&mut decoder.min_active, cli.min_active);
    override_with(&mut decoder.acoustic_scale, cli.acoustic_scale);
    override_with(&mut decoder.allow_partial, cli.allow_partial);
    if cli.max_beam.is_some() {
        decoder.max_beam = cli.max_beam;
    }

    let scorer = &mut options.scorer;
    override_with(&mut scorer.frames_per_chunk, cli.frames_per_chunk);
    override_with(&mut scorer.extra_left_context, cli.extra_left_context);
    override_with(&mut scorer.extra_right_context, cli.extra_right_context);
    override_with(&mut scorer.extra_left_context_initial, cli.extra_left_context_initial);
    override_with(&mut scorer.extra_right_context_final, cli.extra_right_context_final);

    override_with(&mut options.determinize, cli.determinize);
    override_with(&mut options.num_workers, cli.workers);
    if cli.time_budget.is_some() {
        options.time_budget_secs = cli.time_budget;
    }
    if let Some(policy) = &cli.on_sink_error {
        options.sink_error_policy = parse_sink_policy(policy);
    }

    options.validate()?;
    Ok(options)
}

fn build_sinks(cli: &Cli) -> Result<OutputSinks, Box<dyn std::error::Error>> {
    let mut sinks = OutputSinks::none();
    if let Some(path) = &cli.lattice_out {
        sinks.lattice = Some(Box::new(TextLatticeWriter::create(path)?));
    }
    if let Some(path) = &cli.transcript_out {
        let format = if cli.json_transcript {
            TranscriptFormat::JsonLines
        } else {
            TranscriptFormat::Text
        };
        sinks.transcript = Some(Box::new(TextTranscriptWriter::create(path, format)?));
    }
    if let Some(path) = &cli.alignment_out {
        sinks.alignment = Some(Box::new(TextAlignmentWriter::create(path)?));
    }
    if sinks.lattice.is_none() && sinks.transcript.is_none() && sinks.alignment.is_none() {
        log::warn!("No output requested; decoding for statistics only");
    }
    Ok(sinks)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    check_exists(&cli.model, "Model")?;
    if cli.model_info {
        return Ok(());
    }
    match (&cli.graph, &cli.features) {
        (Some(graph), Some(features)) => {
            check_exists(graph, "Graph")?;
            check_exists(features, "Feature archive")?;
        }
        _ => return Err("Graph and features are required unless --model-info is used".into()),
    }
    if let Some(words) = &cli.words {
        check_exists(words, "Word symbol table")?;
    }
    if let Some(policy) = &cli.on_sink_error {
        if policy != "abort" && policy != "skip" {
            return Err(
                format!("On-sink-error must be 'abort' or 'skip', got '{policy}'").into(),
            );
        }
    }
    if cli.workers == Some(0) {
        return Err("Workers must be at least 1".into());
    }
    Ok(())
}

fn check_exists(path: &Path, what: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("{what} not found: {}", path.display()).into());
    }
    Ok(())
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn parse_sink_policy(policy: &str) -> SinkErrorPolicy {
    if policy == "skip" {
        SinkErrorPolicy::Skip
    } else {
        SinkErrorPolicy::Abort
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("latgen").chain(args.iter().copied()))
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let cli = cli(&[
            "final.mdl",
            "graph.txt",
            "feats.ark",
            "--config",
            "/nonexistent/decode.json",
            "--beam",
            "11",
            "--workers",
            "4",
        ]);
        assert!(build_options(&cli).is_err());
    }

    #[test]
    fn test_overrides_applied_without_config() {
        let mut options = DecodeOptions::default();
        override_with(&mut options.decoder.beam, Some(11.0));
        override_with(&mut options.num_workers, None);
        assert_eq!(options.decoder.beam, 11.0);
        assert_eq!(options.num_workers, 1);
    }

    #[test]
    fn test_determinize_flag_overrides_config_both_ways() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = dir.path().join("decode.json");
        std::fs::write(&config, r#"{"determinize": false}"#).unwrap();
        let config = config.to_str().unwrap();

        let from_file = build_options(&cli(&["m", "g", "f", "--config", config])).unwrap();
        assert!(!from_file.determinize);

        let args = ["m", "g", "f", "--config", config, "--determinize", "true"];
        assert!(build_options(&cli(&args)).unwrap().determinize);

        let args = ["m", "g", "f", "--determinize", "false", "--config", config];
        assert!(!build_options(&cli(&args)).unwrap().determinize);
    }

    #[test]
    fn test_parse_sink_policy() {
        assert_eq!(parse_sink_policy("skip"), SinkErrorPolicy::Skip);
        assert_eq!(parse_sink_policy("abort"), SinkErrorPolicy::Abort);
    }

    #[test]
    fn test_missing_model_fails_validation() {
        let cli = cli(&["/nonexistent/final.mdl", "--model-info"]);
        assert!(validate(&cli).is_err());
    }
}
