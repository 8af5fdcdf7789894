use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, VecDeque};

use super::best_path::{prefer, shortlex};
use super::compact_lattice::{CompactArc, CompactFinal, CompactLattice, CompactState};
use super::lattice::{Lattice, LatticeWeight};
use crate::graph::domain::decoding_graph::{Label, StateId};
use crate::shared::constants::EPSILON;

/// One member of a determinized state: an input state reached with a
/// residual weight and a residual transition-id string not yet emitted.
#[derive(Clone, Debug)]
struct Element {
    state: StateId,
    weight: LatticeWeight,
    string: Vec<Label>,
}

type SubsetKey = Vec<(StateId, u32, u32, Vec<Label>)>;

/// Word-level determinization of an expanded lattice.
///
/// Subset construction over word labels where each subset element keeps
/// its residual weight and alignment string. Arcs with the same word leaving
/// one subset are merged: the merged arc takes the cheapest weight and the
/// longest common prefix of the alignment strings. When two paths reach the
/// same input state the cheaper one is kept, so every word sequence appears
/// once, with its minimum cost and that path's alignment. Equally cheap
/// alignments go to the shortlex-smaller transition-id string, matching
/// the best-path ranking.
///
/// The input must be acyclic and topologically numbered, as produced by
/// the result extractor; this guarantees termination.
pub struct Determinizer<'a> {
    input: &'a Lattice,
    scale: f32,
    states: Vec<CompactState>,
    ids: HashMap<SubsetKey, StateId>,
    queue: VecDeque<(StateId, Vec<Element>)>,
}

impl<'a> Determinizer<'a> {
    pub fn new(input: &'a Lattice) -> Self {
        Self {
            input,
            scale: input.acoustic_scale(),
            states: Vec::new(),
            ids: HashMap::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn determinize(mut self) -> CompactLattice {
        let Some(start) = self.input.start() else {
            return CompactLattice::new(Vec::new(), self.scale);
        };
        let initial = self.closure(vec![Element {
            state: start,
            weight: LatticeWeight::ONE,
            string: Vec::new(),
        }]);
        self.state_for(initial);

        while let Some((id, subset)) = self.queue.pop_front() {
            let final_weight = self.final_of(&subset);
            let arcs = self.expand(&subset);
            let state = &mut self.states[id as usize];
            state.final_weight = final_weight;
            state.arcs = arcs;
        }

        CompactLattice::new(self.states, self.scale)
    }

    fn cost(&self, weight: &LatticeWeight) -> f32 {
        weight.cost(self.scale)
    }

    /// Keeps the cheaper element per input state.
    fn insert_min(&self, into: &mut BTreeMap<StateId, Element>, element: Element) {
        match into.entry(element.state) {
            Entry::Vacant(slot) => {
                slot.insert(element);
            }
            Entry::Occupied(mut slot) => {
                if self.beats(&element.weight, &element.string, slot.get()) {
                    slot.insert(element);
                }
            }
        }
    }

    fn beats(&self, weight: &LatticeWeight, string: &[Label], incumbent: &Element) -> bool {
        prefer(self.cost(weight), self.cost(&incumbent.weight), || {
            shortlex(string, &incumbent.string)
        })
    }

    /// Follows word-epsilon arcs. Successors always have higher ids, so
    /// popping the lowest state first never revisits a settled element.
    fn closure(&self, elements: Vec<Element>) -> Vec<Element> {
        let mut pending = BTreeMap::new();
        for element in elements {
            self.insert_min(&mut pending, element);
        }
        let mut settled = Vec::with_capacity(pending.len());
        while let Some((state, element)) = pending.pop_first() {
            for arc in &self.input.state(state).arcs {
                if arc.olabel != EPSILON {
                    continue;
                }
                let mut string = element.string.clone();
                if arc.ilabel != EPSILON {
                    string.push(arc.ilabel);
                }
                let next = Element {
                    state: arc.next_state,
                    weight: element.weight + arc.weight,
                    string,
                };
                self.insert_min(&mut pending, next);
            }
            settled.push(element);
        }
        settled
    }

    fn state_for(&mut self, subset: Vec<Element>) -> StateId {
        let key: SubsetKey = subset
            .iter()
            .map(|e| {
                (
                    e.state,
                    e.weight.graph.to_bits(),
                    e.weight.acoustic.to_bits(),
                    e.string.clone(),
                )
            })
            .collect();
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }
        let id = self.states.len() as StateId;
        self.states.push(CompactState::default());
        self.ids.insert(key, id);
        self.queue.push_back((id, subset));
        id
    }

    fn final_of(&self, subset: &[Element]) -> Option<CompactFinal> {
        let mut best: Option<CompactFinal> = None;
        for element in subset {
            let Some(final_weight) = self.input.state(element.state).final_weight else {
                continue;
            };
            let weight = element.weight + final_weight;
            let better = match &best {
                None => true,
                Some(b) => prefer(self.cost(&weight), self.cost(&b.weight), || {
                    shortlex(&element.string, &b.transition_ids)
                }),
            };
            if better {
                best = Some(CompactFinal {
                    weight,
                    transition_ids: element.string.clone(),
                });
            }
        }
        best
    }

    fn expand(&mut self, subset: &[Element]) -> Vec<CompactArc> {
        let mut by_word: BTreeMap<Label, BTreeMap<StateId, Element>> = BTreeMap::new();
        for element in subset {
            for arc in &self.input.state(element.state).arcs {
                if arc.olabel == EPSILON {
                    continue;
                }
                let mut string = element.string.clone();
                if arc.ilabel != EPSILON {
                    string.push(arc.ilabel);
                }
                let next = Element {
                    state: arc.next_state,
                    weight: element.weight + arc.weight,
                    string,
                };
                let group = by_word.entry(arc.olabel).or_default();
                self.insert_min(group, next);
            }
        }

        let mut arcs = Vec::with_capacity(by_word.len());
        for (word, group) in by_word {
            let members: Vec<Element> = group.into_values().collect();
            let (weight, prefix) = self.common_divisor(&members);
            let residuals = members
                .into_iter()
                .map(|e| Element {
                    state: e.state,
                    weight: e.weight - weight,
                    string: e.string[prefix.len()..].to_vec(),
                })
                .collect();
            let subset = self.closure(residuals);
            let next_state = self.state_for(subset);
            arcs.push(CompactArc {
                word,
                weight,
                transition_ids: prefix,
                next_state,
            });
        }
        arcs
    }

    /// Cheapest weight in the group and the longest common string prefix.
    fn common_divisor(&self, members: &[Element]) -> (LatticeWeight, Vec<Label>) {
        let mut weight = members[0].weight;
        for member in &members[1..] {
            if self.cost(&member.weight) < self.cost(&weight) {
                weight = member.weight;
            }
        }
        let first = &members[0].string;
        let prefix_len = members[1..].iter().fold(first.len(), |len, m| {
            first
                .iter()
                .zip(&m.string)
                .take(len)
                .take_while(|(a, b)| a == b)
                .count()
        });
        (weight, first[..prefix_len].to_vec())
    }
}

/// Convenience wrapper around [`Determinizer`].
pub fn determinize(lattice: &Lattice) -> CompactLattice {
    Determinizer::new(lattice).determinize()
}
