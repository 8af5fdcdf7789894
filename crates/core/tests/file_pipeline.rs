use std::fs;
use std::path::Path;

use latgen_core::features::infrastructure::text_feature_reader::TextFeatureReader;
use latgen_core::lattice::infrastructure::text_lattice_writer::TextLatticeWriter;
use latgen_core::pipeline::decode_options::DecodeOptions;
use latgen_core::pipeline::decode_resources::DecodeResources;
use latgen_core::pipeline::decode_session::DecodeSession;
use latgen_core::pipeline::infrastructure::text_sinks::{
    TextAlignmentWriter, TextTranscriptWriter, TranscriptFormat,
};
use latgen_core::pipeline::output_sink::OutputSinks;
use tempfile::TempDir;

const MODEL: &str = "
<TransitionModel> <NumClasses> 2 <Classes> [ 0 1 ] </TransitionModel>
<Nnet> <InputDim> 2 <LeftContext> 0 <RightContext> 0
  <Affine> <Input> 2 <Output> 2 <Weights> [ 1 0 0 1 ] <Bias> [ 0 0 ]
</Nnet>
";

const GRAPH: &str = "0\t1\t1\t1\t1.0\n\
                     0\t1\t2\t2\t2.0\n\
                     1\t1\t1\t0\n\
                     1\t1\t2\t0\n\
                     1\n";

const WORDS: &str = "<eps>\t0\nyes\t1\nno\t2\n";

const FEATURES: &str = "\
utt1  [
  -0.1 -0.05 ]
utt2  [ -5.0 -0.05 ]
empty  [ ]
utt3  [
  -0.1 -3.0
  -0.1 -3.0 ]
";

struct Fixture {
    dir: TempDir,
    resources: DecodeResources,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let write = |name: &str, text: &str| {
            let path = dir.path().join(name);
            fs::write(&path, text).unwrap();
            path
        };
        let model = write("final.mdl", MODEL);
        let graph = write("graph.txt", GRAPH);
        let words = write("words.txt", WORDS);
        write("feats.txt", FEATURES);

        let resources = DecodeResources::load(&model, &graph, Some(&words)).unwrap();
        Self { dir, resources }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    fn options() -> DecodeOptions {
        let mut options = DecodeOptions::default();
        options.decoder.acoustic_scale = 1.0;
        options
    }

    fn run(&self, sinks: OutputSinks, options: &DecodeOptions) {
        let source = TextFeatureReader::open(&self.path("feats.txt")).unwrap();
        let mut session = DecodeSession::new(&self.resources, options, sinks).unwrap();
        let stats = session.run(Box::new(source)).unwrap();
        assert_eq!((stats.success_count, stats.failure_count), (3, 1));
        assert_eq!(stats.total_frames, 4);
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_text_outputs_for_a_feature_archive() {
    let fx = Fixture::new();
    let sinks = OutputSinks {
        lattice: Some(Box::new(TextLatticeWriter::create(&fx.path("lat.txt")).unwrap())),
        transcript: Some(Box::new(
            TextTranscriptWriter::create(&fx.path("text"), TranscriptFormat::Text).unwrap(),
        )),
        alignment: Some(Box::new(
            TextAlignmentWriter::create(&fx.path("ali.txt")).unwrap(),
        )),
    };
    fx.run(sinks, &Fixture::options());

    assert_eq!(read(&fx.path("text")), "utt1 yes\nutt2 no\nutt3 yes\n");
    assert_eq!(read(&fx.path("ali.txt")), "utt1 0 1\nutt2 1 1\nutt3 0 2\n");

    let lattices = read(&fx.path("lat.txt"));
    let keys: Vec<&str> = lattices
        .split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .map(|block| block.lines().next().unwrap())
        .collect();
    assert_eq!(keys, vec!["utt1", "utt2", "utt3"]);
}

#[test]
fn test_json_transcripts_and_parallel_workers() {
    let fx = Fixture::new();
    let sinks = OutputSinks {
        transcript: Some(Box::new(
            TextTranscriptWriter::create(&fx.path("text.jsonl"), TranscriptFormat::JsonLines)
                .unwrap(),
        )),
        ..OutputSinks::none()
    };
    let mut options = Fixture::options();
    options.num_workers = 2;
    fx.run(sinks, &options);

    let lines: Vec<serde_json::Value> = read(&fx.path("text.jsonl"))
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1]["utterance_id"], "utt2");
    assert_eq!(lines[1]["words"], serde_json::json!(["no"]));
    assert_eq!(lines[2]["word_timings"][0]["end_frame"], 2);
}

#[test]
fn test_options_file_drives_the_session() {
    let fx = Fixture::new();
    let config = fx.path("decode.json");
    fs::write(
        &config,
        r#"{"decoder": {"acoustic_scale": 1.0, "beam": 12.0}, "determinize": false}"#,
    )
    .unwrap();
    let options = DecodeOptions::from_json_file(&config).unwrap();
    assert!(!options.determinize);

    let sinks = OutputSinks {
        lattice: Some(Box::new(TextLatticeWriter::create(&fx.path("raw.txt")).unwrap())),
        ..OutputSinks::none()
    };
    fx.run(sinks, &options);

    // expanded lattices carry ilabel and olabel columns
    let raw = read(&fx.path("raw.txt"));
    let first_arc = raw.lines().nth(1).unwrap();
    assert_eq!(first_arc.split_whitespace().count(), 5);
}

#[test]
fn test_malformed_record_does_not_hide_later_utterances() {
    let fx = Fixture::new();
    let archive = fx.path("ragged.txt");
    fs::write(
        &archive,
        "u1 [ -0.1 -0.05 ]\nbad [\n  -0.1 -0.05\n  -0.1 ]\nu3 [ -5.0 -0.05 ]\nu4 [ -0.1 -0.05 ]\n",
    )
    .unwrap();

    let stats = {
        let sinks = OutputSinks {
            transcript: Some(Box::new(
                TextTranscriptWriter::create(&fx.path("text"), TranscriptFormat::Text).unwrap(),
            )),
            ..OutputSinks::none()
        };
        let source = TextFeatureReader::open(&archive).unwrap();
        let options = Fixture::options();
        let mut session = DecodeSession::new(&fx.resources, &options, sinks).unwrap();
        session.run(Box::new(source)).unwrap()
    };

    assert_eq!((stats.success_count, stats.failure_count), (3, 1));
    assert_eq!(read(&fx.path("text")), "u1 yes\nu3 no\nu4 yes\n");
}
