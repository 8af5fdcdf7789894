#![allow(dead_code)]

use latgen_core::acoustic::domain::acoustic_model::AcousticModel;
use latgen_core::acoustic::domain::feedforward_network::{FeedForwardNetwork, Layer};
use latgen_core::acoustic::domain::transition_model::TransitionModel;
use latgen_core::features::domain::feature_matrix::FeatureMatrix;
use latgen_core::features::domain::feature_source::{FeatureSource, Utterance};
use latgen_core::features::infrastructure::vec_feature_source::VecFeatureSource;
use latgen_core::graph::domain::decoding_graph::{DecodingGraph, GraphArc, GraphBuilder};
use latgen_core::pipeline::decode_options::DecodeOptions;
use latgen_core::pipeline::decode_resources::DecodeResources;
use latgen_core::pipeline::infrastructure::memory_sinks::CollectingSink;
use latgen_core::pipeline::output_sink::{OutputSinks, Transcript};
use ndarray::{Array1, Array2};

/// Model whose network is the identity, so feature column `c` is the
/// log-likelihood of class `c`. Transition id `k` emits class `k - 1`.
pub fn passthrough_model(num_classes: usize) -> AcousticModel {
    let network = FeedForwardNetwork::new(
        num_classes,
        0,
        0,
        vec![Layer::Affine {
            weights: Array2::eye(num_classes),
            bias: Array1::zeros(num_classes),
        }],
        None,
    )
    .unwrap();
    let transitions = TransitionModel::new((0..num_classes).collect(), num_classes).unwrap();
    AcousticModel::new(transitions, network).unwrap()
}

/// Arcs are `(src, dst, ilabel, olabel, weight)`; state 0 is the start.
pub fn graph(arcs: &[(u32, u32, u32, u32, f32)], finals: &[(u32, f32)]) -> DecodingGraph {
    let mut b = GraphBuilder::new();
    b.set_start(0);
    for &(src, dst, ilabel, olabel, weight) in arcs {
        b.add_arc(src, GraphArc::new(ilabel, olabel, weight, dst));
    }
    for &(state, cost) in finals {
        b.set_final(state, cost);
    }
    b.build().unwrap()
}

pub fn resources(num_classes: usize, graph: DecodingGraph) -> DecodeResources {
    DecodeResources::from_parts(passthrough_model(num_classes), graph, None).unwrap()
}

pub fn utterance(id: &str, rows: Vec<Vec<f32>>) -> Utterance {
    Utterance::new(id, FeatureMatrix::from_rows(rows).unwrap())
}

pub fn source(entries: Vec<Utterance>) -> Box<dyn FeatureSource> {
    Box::new(VecFeatureSource::new(entries))
}

pub fn options(acoustic_scale: f32) -> DecodeOptions {
    let mut options = DecodeOptions::default();
    options.decoder.acoustic_scale = acoustic_scale;
    options
}

pub fn transcript_sinks() -> (OutputSinks, CollectingSink<Transcript>) {
    let collected = CollectingSink::new();
    let sinks = OutputSinks {
        transcript: Some(Box::new(collected.clone())),
        ..OutputSinks::none()
    };
    (sinks, collected)
}
