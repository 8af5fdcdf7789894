use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};

use rustfst::prelude::{Semiring, Trs};

use super::decodable::Decodable;
use super::decoder_config::DecoderConfig;
use super::search_lattice::{FinalToken, FrameTokens, SearchLattice, Token, TokenId, TokenLink};
use crate::graph::domain::decoding_graph::{DecodingGraph, StateId};
use crate::shared::constants::EPSILON;
use crate::shared::decode_error::DecodeError;

/// Beam-pruned Viterbi search over a decoding graph, keeping the token
/// links needed to build a lattice afterwards.
///
/// Frames are processed strictly in order. For each frame the surviving
/// tokens are expanded along emitting arcs, the new token set is closed
/// over epsilon arcs in cost order and then pruned. When two paths reach the
/// same state in the same frame the cheaper one wins; on equal cost the one
/// seen first wins.
///
/// [`DecodingGraph`] rejects negative weights on epsilon arcs, so the closure
/// settles every state of a frame exactly once.
pub struct LatticeDecoder<'g> {
    graph: &'g DecodingGraph,
    config: DecoderConfig,
}

impl<'g> LatticeDecoder<'g> {
    pub fn new(graph: &'g DecodingGraph, config: DecoderConfig) -> Result<Self, DecodeError> {
        config.validate()?;
        Ok(Self { graph, config })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn decode(&self, decodable: &mut dyn Decodable) -> Result<SearchLattice, DecodeError> {
        let num_frames = decodable.num_frames();

        let mut start = FrameBuilder::default();
        start.relax(self.graph.start(), 0.0, None);
        let mut frames = vec![self.close_and_prune(0, start)?];

        for t in 0..num_frames {
            let emitted = self.expand_emitting(&frames[t], t, decodable)?;
            let next = self.close_and_prune(t + 1, emitted)?;
            if next.active.is_empty() {
                log::debug!("Search collapsed at frame {t}");
                if !self.config.allow_partial {
                    return Err(DecodeError::SearchExhausted { frame: t });
                }
                return Ok(self.partial(frames));
            }
            frames.push(next);
        }

        self.finish(frames)
    }

    /// Wide pruning window used by `min_active`.
    fn wide_beam(&self) -> f32 {
        self.config.max_beam.unwrap_or(f32::INFINITY)
    }

    fn expand_emitting(
        &self,
        prev: &FrameTokens,
        frame: usize,
        decodable: &mut dyn Decodable,
    ) -> Result<FrameBuilder, DecodeError> {
        let scale = self.config.acoustic_scale;
        let wide = self.wide_beam();
        let mut next = FrameBuilder::default();
        let mut best_new = f32::INFINITY;

        for &index in &prev.active {
            let token = &prev.tokens[index];
            let arcs = self.graph.arcs(token.state)?;
            for arc in arcs.trs().iter().filter(|a| a.ilabel != EPSILON) {
                let weight = *arc.weight.value();
                let acoustic_cost = -decodable.log_likelihood(frame, arc.ilabel)?;
                let cost = token.cost + weight + scale * acoustic_cost;
                if !cost.is_finite() || cost > best_new + wide {
                    continue;
                }
                best_new = best_new.min(cost);
                next.relax(
                    arc.nextstate,
                    cost,
                    Some(TokenLink {
                        from: TokenId { frame, index },
                        ilabel: arc.ilabel,
                        olabel: arc.olabel,
                        graph_cost: weight,
                        acoustic_cost,
                    }),
                );
            }
        }
        Ok(next)
    }

    /// Epsilon closure in cost order (Dijkstra), pruning as tokens are
    /// finalized.
    ///
    /// Tokens pop cheapest first, so the n-th popped token has rank n and
    /// the beam, `max_active` and `min_active` rules can be applied on the
    /// spot. Only survivors are expanded. Links into already finalized tokens
    /// are dropped so the frame's link graph stays acyclic.
    fn close_and_prune(
        &self,
        frame: usize,
        mut builder: FrameBuilder,
    ) -> Result<FrameTokens, DecodeError> {
        let DecoderConfig {
            beam,
            max_active,
            min_active,
            ..
        } = self.config;
        let wide = self.wide_beam();

        let mut heap: BinaryHeap<QueueEntry> = builder
            .tokens
            .iter()
            .enumerate()
            .map(|(index, t)| QueueEntry {
                cost: t.cost,
                index,
            })
            .collect();
        let mut finalized = vec![false; builder.tokens.len()];
        let mut order = Vec::with_capacity(builder.tokens.len());
        let mut active = Vec::new();
        let mut best: Option<f32> = None;

        while let Some(QueueEntry { cost, index }) = heap.pop() {
            if finalized[index] {
                continue;
            }
            let best = *best.get_or_insert(cost);
            let rank = active.len();
            let keep = rank < max_active
                && (cost <= best + beam || (rank < min_active && cost <= best + wide));
            if !keep {
                break;
            }
            finalized[index] = true;
            order.push(index);
            active.push(index);

            let state = builder.tokens[index].state;
            let arcs = self.graph.arcs(state)?;
            for arc in arcs.trs().iter().filter(|a| a.ilabel == EPSILON) {
                let weight = *arc.weight.value();
                let next_cost = cost + weight;
                if !next_cost.is_finite() {
                    continue;
                }
                if matches!(builder.find(arc.nextstate), Some(d) if finalized[d]) {
                    continue;
                }
                let link = TokenLink {
                    from: TokenId { frame, index },
                    ilabel: EPSILON,
                    olabel: arc.olabel,
                    graph_cost: weight,
                    acoustic_cost: 0.0,
                };
                let (dest, improved) = builder.relax(arc.nextstate, next_cost, Some(link));
                if dest == finalized.len() {
                    finalized.push(false);
                }
                if improved {
                    heap.push(QueueEntry {
                        cost: next_cost,
                        index: dest,
                    });
                }
            }
        }

        // Pruned tokens were never expanded, so only incoming links reach them.
        order.extend((0..builder.tokens.len()).filter(|&i| !finalized[i]));

        Ok(FrameTokens {
            tokens: builder.tokens,
            order,
            active,
        })
    }

    fn finish(&self, frames: Vec<FrameTokens>) -> Result<SearchLattice, DecodeError> {
        let last = frames.len() - 1;
        let tokens = &frames[last];
        let finals: Vec<FinalToken> = tokens
            .active
            .iter()
            .filter_map(|&index| {
                let final_cost = self.graph.final_cost(tokens.tokens[index].state);
                final_cost
                    .is_finite()
                    .then_some(FinalToken { index, final_cost })
            })
            .collect();

        if finals.is_empty() {
            log::debug!("No final state reached after {last} frames");
            if !self.config.allow_partial {
                return Err(DecodeError::SearchExhausted { frame: last });
            }
            return Ok(self.partial(frames));
        }

        let mut best_final = 0;
        for (i, f) in finals.iter().enumerate() {
            let best = &finals[best_final];
            let cost = tokens.tokens[f.index].cost + f.final_cost;
            if cost < tokens.tokens[best.index].cost + best.final_cost {
                best_final = i;
            }
        }

        Ok(SearchLattice::new(
            frames,
            finals,
            best_final,
            self.config.acoustic_scale,
            false,
        ))
    }

    /// Treats every surviving token of the last frame as final at zero cost.
    fn partial(&self, frames: Vec<FrameTokens>) -> SearchLattice {
        let finals = frames[frames.len() - 1]
            .active
            .iter()
            .map(|&index| FinalToken {
                index,
                final_cost: 0.0,
            })
            .collect();
        // active is cheapest first
        SearchLattice::new(frames, finals, 0, self.config.acoustic_scale, true)
    }
}

/// Token set of the frame under construction, indexed by graph state.
#[derive(Default)]
struct FrameBuilder {
    tokens: Vec<Token>,
    index_of: HashMap<StateId, usize>,
}

impl FrameBuilder {
    fn find(&self, state: StateId) -> Option<usize> {
        self.index_of.get(&state).copied()
    }

    /// Records a path into `state`. Returns the token index and whether the
    /// token's cost improved (new tokens count as improved).
    fn relax(&mut self, state: StateId, cost: f32, link: Option<TokenLink>) -> (usize, bool) {
        match self.index_of.entry(state) {
            Entry::Occupied(entry) => {
                let index = *entry.get();
                let token = &mut self.tokens[index];
                if let Some(link) = link {
                    token.links.push(link);
                    if cost < token.cost {
                        token.cost = cost;
                        token.best_link = Some(token.links.len() - 1);
                        return (index, true);
                    }
                }
                (index, false)
            }
            Entry::Vacant(entry) => {
                let index = self.tokens.len();
                entry.insert(index);
                self.tokens.push(Token {
                    state,
                    cost,
                    best_link: link.as_ref().map(|_| 0),
                    links: link.into_iter().collect(),
                });
                (index, true)
            }
        }
    }
}

/// Min-heap entry: lowest cost first, then lowest (earliest created) index.
#[derive(Clone, Copy, Debug)]
struct QueueEntry {
    cost: f32,
    index: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.index.cmp(&self.index))
    }
}
