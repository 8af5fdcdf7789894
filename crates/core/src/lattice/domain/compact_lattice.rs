use super::lattice::LatticeWeight;
use crate::graph::domain::decoding_graph::{Label, StateId};

/// Word arc of a compact lattice, carrying the frame-level transition ids
/// it spans.
#[derive(Clone, Debug, PartialEq)]
pub struct CompactArc {
    pub word: Label,
    pub weight: LatticeWeight,
    pub transition_ids: Vec<Label>,
    pub next_state: StateId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompactFinal {
    pub weight: LatticeWeight,
    pub transition_ids: Vec<Label>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompactState {
    pub arcs: Vec<CompactArc>,
    pub final_weight: Option<CompactFinal>,
}

/// Word-level lattice with alignments folded into the arc labels.
///
/// After determinization each word sequence appears on exactly one path.
/// State 0 is the start; state ids are not necessarily topological.
#[derive(Clone, Debug, PartialEq)]
pub struct CompactLattice {
    states: Vec<CompactState>,
    acoustic_scale: f32,
}

impl CompactLattice {
    pub fn new(states: Vec<CompactState>, acoustic_scale: f32) -> Self {
        Self {
            states,
            acoustic_scale,
        }
    }

    pub fn start(&self) -> Option<StateId> {
        (!self.states.is_empty()).then_some(0)
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.states.iter().map(|s| s.arcs.len()).sum()
    }

    pub fn state(&self, id: StateId) -> &CompactState {
        &self.states[id as usize]
    }

    pub fn states(&self) -> &[CompactState] {
        &self.states
    }

    pub fn acoustic_scale(&self) -> f32 {
        self.acoustic_scale
    }

    /// State ids in topological order (Kahn's algorithm), or `None` if the
    /// lattice has a cycle.
    pub fn topological_order(&self) -> Option<Vec<StateId>> {
        let mut in_degree = vec![0usize; self.states.len()];
        for state in &self.states {
            for arc in &state.arcs {
                in_degree[arc.next_state as usize] += 1;
            }
        }
        let mut ready: Vec<StateId> = (0..self.states.len() as StateId)
            .filter(|&s| in_degree[s as usize] == 0)
            .rev()
            .collect();
        let mut order = Vec::with_capacity(self.states.len());
        while let Some(s) = ready.pop() {
            order.push(s);
            for arc in self.states[s as usize].arcs.iter().rev() {
                let d = &mut in_degree[arc.next_state as usize];
                *d -= 1;
                if *d == 0 {
                    ready.push(arc.next_state);
                }
            }
        }
        (order.len() == self.states.len()).then_some(order)
    }
}
