use std::ops::{Add, Sub};

use crate::graph::domain::decoding_graph::{Label, StateId};

/// Two-part lattice weight: graph cost and unscaled acoustic cost.
///
/// Both parts are costs (negated log-probabilities). They are kept apart so
/// the acoustic scale can be changed after decoding; [`LatticeWeight::cost`]
/// combines them.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LatticeWeight {
    pub graph: f32,
    pub acoustic: f32,
}

impl LatticeWeight {
    pub const ONE: LatticeWeight = LatticeWeight {
        graph: 0.0,
        acoustic: 0.0,
    };

    pub fn new(graph: f32, acoustic: f32) -> Self {
        Self { graph, acoustic }
    }

    pub fn cost(&self, acoustic_scale: f32) -> f32 {
        self.graph + acoustic_scale * self.acoustic
    }

    pub fn is_finite(&self) -> bool {
        self.graph.is_finite() && self.acoustic.is_finite()
    }
}

impl Add for LatticeWeight {
    type Output = LatticeWeight;

    fn add(self, rhs: LatticeWeight) -> LatticeWeight {
        LatticeWeight::new(self.graph + rhs.graph, self.acoustic + rhs.acoustic)
    }
}

impl Sub for LatticeWeight {
    type Output = LatticeWeight;

    fn sub(self, rhs: LatticeWeight) -> LatticeWeight {
        LatticeWeight::new(self.graph - rhs.graph, self.acoustic - rhs.acoustic)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LatticeArc {
    /// Transition id consumed, or epsilon.
    pub ilabel: Label,
    /// Word emitted, or epsilon.
    pub olabel: Label,
    pub weight: LatticeWeight,
    pub next_state: StateId,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LatticeState {
    pub arcs: Vec<LatticeArc>,
    pub final_weight: Option<LatticeWeight>,
}

/// Expanded lattice: one arc per graph transition taken, states are
/// (graph state, frame) pairs.
///
/// States are numbered in topological order: every arc goes from a lower
/// to a higher state id, and state 0 is the start.
#[derive(Clone, Debug, PartialEq)]
pub struct Lattice {
    states: Vec<LatticeState>,
    acoustic_scale: f32,
}

impl Lattice {
    pub fn new(states: Vec<LatticeState>, acoustic_scale: f32) -> Self {
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

    pub fn state(&self, id: StateId) -> &LatticeState {
        &self.states[id as usize]
    }

    pub fn states(&self) -> &[LatticeState] {
        &self.states
    }

    pub fn acoustic_scale(&self) -> f32 {
        self.acoustic_scale
    }
}
