use super::best_path::{cheapest_path, BestPath, PathArc, PathStep};
use super::compact_lattice::CompactLattice;
use super::determinizer::determinize;
use super::lattice::{Lattice, LatticeArc, LatticeState, LatticeWeight};
use crate::decoder::domain::search_lattice::{SearchLattice, TokenId};
use crate::graph::domain::decoding_graph::StateId;
use crate::shared::constants::EPSILON;

/// Lattice handed to the output sink.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputLattice {
    /// Raw state-level lattice, possibly with several paths per word sequence.
    Expanded(Lattice),
    /// Word-determinized lattice with alignments on the arcs.
    Compact(CompactLattice),
}

impl OutputLattice {
    pub fn num_states(&self) -> usize {
        match self {
            OutputLattice::Expanded(lat) => lat.num_states(),
            OutputLattice::Compact(lat) => lat.num_states(),
        }
    }

    pub fn num_arcs(&self) -> usize {
        match self {
            OutputLattice::Expanded(lat) => lat.num_arcs(),
            OutputLattice::Compact(lat) => lat.num_arcs(),
        }
    }

    pub fn is_compact(&self) -> bool {
        matches!(self, OutputLattice::Compact(_))
    }
}

/// Turns a finished search into output lattices and best paths.
///
/// Tokens and links are kept only when some complete path through them
/// costs at most `lattice_beam` more than the best path.
#[derive(Clone, Debug)]
pub struct ResultExtractor {
    lattice_beam: f32,
}

impl ResultExtractor {
    pub fn new(lattice_beam: f32) -> Self {
        Self { lattice_beam }
    }

    pub fn extract(&self, search: &SearchLattice, determinize_lattice: bool) -> OutputLattice {
        let raw = self.raw_lattice(search);
        if determinize_lattice {
            OutputLattice::Compact(determinize(&raw))
        } else {
            OutputLattice::Expanded(raw)
        }
    }

    /// Builds the beam-pruned, topologically numbered state-level lattice.
    pub fn raw_lattice(&self, search: &SearchLattice) -> Lattice {
        let scale = search.acoustic_scale();
        let frames = search.frames();
        let last = search.last_frame();

        // Global topological numbering: frame by frame, in each frame's order.
        let mut position: Vec<Vec<usize>> = frames
            .iter()
            .map(|f| vec![usize::MAX; f.tokens.len()])
            .collect();
        let mut topo: Vec<TokenId> = Vec::with_capacity(search.num_tokens());
        for (frame, tokens) in frames.iter().enumerate() {
            for &index in &tokens.order {
                position[frame][index] = topo.len();
                topo.push(TokenId { frame, index });
            }
        }
        let pos = |id: TokenId| position[id.frame][id.index];

        let alpha: Vec<f32> = topo.iter().map(|&id| search.token(id).cost).collect();

        let mut beta = vec![f32::INFINITY; topo.len()];
        for f in search.finals() {
            let p = pos(TokenId {
                frame: last,
                index: f.index,
            });
            beta[p] = beta[p].min(f.final_cost);
        }
        for (p, &id) in topo.iter().enumerate().rev() {
            let to_end = beta[p];
            if !to_end.is_finite() {
                continue;
            }
            for link in &search.token(id).links {
                let q = pos(link.from);
                let cost = link.weight().cost(scale) + to_end;
                if cost < beta[q] {
                    beta[q] = cost;
                }
            }
        }

        let best = search.best_cost();
        let cutoff = best + self.lattice_beam + 1e-4 * best.abs().max(1.0);

        let mut new_id = vec![None; topo.len()];
        let mut count: StateId = 0;
        for p in 0..topo.len() {
            if alpha[p] + beta[p] <= cutoff {
                new_id[p] = Some(count);
                count += 1;
            }
        }

        let mut states = vec![LatticeState::default(); count as usize];
        for (p, &id) in topo.iter().enumerate() {
            let Some(dest) = new_id[p] else { continue };
            for link in &search.token(id).links {
                let q = pos(link.from);
                let Some(src) = new_id[q] else { continue };
                if alpha[q] + link.weight().cost(scale) + beta[p] > cutoff {
                    continue;
                }
                states[src as usize].arcs.push(LatticeArc {
                    ilabel: link.ilabel,
                    olabel: link.olabel,
                    weight: link.weight(),
                    next_state: dest,
                });
            }
        }
        for f in search.finals() {
            let p = pos(TokenId {
                frame: last,
                index: f.index,
            });
            if let Some(s) = new_id[p] {
                if alpha[p] + f.final_cost <= cutoff {
                    states[s as usize].final_weight = Some(LatticeWeight::new(f.final_cost, 0.0));
                }
            }
        }

        log::debug!(
            "Lattice: {} of {} tokens kept within beam {}",
            count,
            topo.len(),
            self.lattice_beam
        );
        Lattice::new(states, scale)
    }

    /// Cheapest path through an output lattice, or `None` if no final state
    /// is reachable. Equally cheap paths are ranked as in
    /// [`SearchLattice::best_path`], so both lattice forms agree with it.
    pub fn best_path(lattice: &OutputLattice) -> Option<BestPath> {
        match lattice {
            OutputLattice::Expanded(lat) => expanded_best_path(lat),
            OutputLattice::Compact(lat) => compact_best_path(lat),
        }
    }
}

/// Cheapest path of an expanded lattice; arcs always point to higher states.
pub(crate) fn expanded_best_path(lat: &Lattice) -> Option<BestPath> {
    let arcs: Vec<Vec<PathArc<'_>>> = lat
        .states()
        .iter()
        .map(|state| {
            state
                .arcs
                .iter()
                .map(|arc| PathArc {
                    step: PathStep {
                        word: arc.olabel,
                        transition_ids: std::slice::from_ref(&arc.ilabel),
                        weight: arc.weight,
                    },
                    next_state: arc.next_state as usize,
                })
                .collect()
        })
        .collect();
    let finals: Vec<Option<PathStep<'_>>> = lat
        .states()
        .iter()
        .map(|state| {
            state.final_weight.map(|weight| PathStep {
                word: EPSILON,
                transition_ids: &[],
                weight,
            })
        })
        .collect();
    let order: Vec<usize> = (0..lat.num_states()).collect();
    cheapest_path(&order, &arcs, &finals, lat.acoustic_scale())
}

fn compact_best_path(lat: &CompactLattice) -> Option<BestPath> {
    let order: Vec<usize> = lat
        .topological_order()?
        .into_iter()
        .map(|s| s as usize)
        .collect();
    let arcs: Vec<Vec<PathArc<'_>>> = lat
        .states()
        .iter()
        .map(|state| {
            state
                .arcs
                .iter()
                .map(|arc| PathArc {
                    step: PathStep {
                        word: arc.word,
                        transition_ids: &arc.transition_ids,
                        weight: arc.weight,
                    },
                    next_state: arc.next_state as usize,
                })
                .collect()
        })
        .collect();
    let finals: Vec<Option<PathStep<'_>>> = lat
        .states()
        .iter()
        .map(|state| {
            state.final_weight.as_ref().map(|f| PathStep {
                word: EPSILON,
                transition_ids: &f.transition_ids,
                weight: f.weight,
            })
        })
        .collect();
    cheapest_path(&order, &arcs, &finals, lat.acoustic_scale())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::domain::decodable::MatrixDecodable;
    use crate::decoder::domain::decoder_config::DecoderConfig;
    use crate::decoder::domain::lattice_decoder::LatticeDecoder;
    use crate::graph::domain::decoding_graph::{DecodingGraph, GraphArc, GraphBuilder};
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    /// Word 1 via two different state paths (1 and 2), word 2 via state 3.
    fn redundant_graph() -> DecodingGraph {
        let mut b = GraphBuilder::new();
        b.set_start(0)
            .add_arc(0, GraphArc::new(1, 1, 0.5, 1))
            .add_arc(0, GraphArc::new(2, 1, 0.8, 2))
            .add_arc(0, GraphArc::new(3, 2, 1.5, 3))
            .add_arc(1, GraphArc::new(1, 0, 0.0, 4))
            .add_arc(2, GraphArc::new(2, 0, 0.0, 4))
            .add_arc(3, GraphArc::new(3, 0, 0.0, 4))
            .set_final(4, 0.0);
        b.build().unwrap()
    }

    fn search(graph: &DecodingGraph, log_likes: Array2<f32>) -> SearchLattice {
        let config = DecoderConfig {
            acoustic_scale: 1.0,
            ..Default::default()
        };
        LatticeDecoder::new(graph, config)
            .unwrap()
            .decode(&mut MatrixDecodable::new(log_likes))
            .unwrap()
    }

    fn scores() -> Array2<f32> {
        array![[-0.2, -0.1, -0.3], [-0.2, -0.1, -0.3]]
    }

    #[test]
    fn test_raw_lattice_is_topological_and_finite() {
        let graph = redundant_graph();
        let lat = ResultExtractor::new(8.0).raw_lattice(&search(&graph, scores()));
        for (s, state) in lat.states().iter().enumerate() {
            for arc in &state.arcs {
                assert!(arc.next_state as usize > s);
                assert!(arc.weight.is_finite());
            }
        }
        assert!(lat.states().iter().any(|s| s.final_weight.is_some()));
    }

    #[test]
    fn test_determinize_preserves_best_path() {
        let graph = redundant_graph();
        let result = search(&graph, scores());
        let extractor = ResultExtractor::new(8.0);

        let raw = extractor.extract(&result, false);
        let compact = extractor.extract(&result, true);
        assert!(!raw.is_compact());
        assert!(compact.is_compact());

        let a = ResultExtractor::best_path(&raw).unwrap();
        let b = ResultExtractor::best_path(&compact).unwrap();
        let direct = result.best_path();
        assert_eq!(a.word_ids, b.word_ids);
        assert_eq!(a.word_ids, direct.word_ids);
        assert_eq!(a.transition_ids, b.transition_ids);
        assert_relative_eq!(a.total_cost, b.total_cost, epsilon = 1e-5);
        assert_relative_eq!(a.total_cost, direct.total_cost, epsilon = 1e-5);
    }

    #[test]
    fn test_determinize_collapses_duplicate_word_paths() {
        let graph = redundant_graph();
        let result = search(&graph, scores());
        let extractor = ResultExtractor::new(8.0);
        let OutputLattice::Compact(compact) = extractor.extract(&result, true) else {
            panic!("expected compact lattice");
        };
        let words: Vec<_> = compact.state(0).arcs.iter().map(|a| a.word).collect();
        assert_eq!(words, vec![1, 2]);
        let OutputLattice::Expanded(raw) = extractor.extract(&result, false) else {
            panic!("expected expanded lattice");
        };
        let raw_word_arcs = raw.state(0).arcs.iter().filter(|a| a.olabel == 1).count();
        assert_eq!(raw_word_arcs, 2);
    }

    #[test]
    fn test_lattice_beam_drops_expensive_paths() {
        let graph = redundant_graph();
        let result = search(&graph, scores());
        let OutputLattice::Compact(narrow) = ResultExtractor::new(0.5).extract(&result, true) else {
            panic!("expected compact lattice");
        };
        // word 2 costs 1.5 + 0.6 = 2.1 against the best 0.5 + 0.4 = 0.9
        let words: Vec<_> = narrow.state(0).arcs.iter().map(|a| a.word).collect();
        assert_eq!(words, vec![1]);
    }

    #[test]
    fn test_partial_search_still_extracts() {
        let mut b = GraphBuilder::new();
        b.set_start(0).add_arc(0, GraphArc::new(1, 3, 0.0, 1));
        let graph = b.build().unwrap();
        let result = search(&graph, array![[-1.0]]);
        assert!(result.is_partial());
        let lat = ResultExtractor::new(8.0).extract(&result, true);
        let path = ResultExtractor::best_path(&lat).unwrap();
        assert_eq!(path.word_ids, vec![3]);
        assert_relative_eq!(path.total_cost, 1.0);
    }

    #[test]
    fn test_word_timings_from_compact_lattice() {
        let graph = redundant_graph();
        let result = search(&graph, scores());
        let lat = ResultExtractor::new(8.0).extract(&result, true);
        let path = ResultExtractor::best_path(&lat).unwrap();
        assert_eq!(path.word_timings.len(), 1);
        assert_eq!(path.word_timings[0].start_frame, 0);
        assert_eq!(path.word_timings[0].end_frame, 2);
    }
}
