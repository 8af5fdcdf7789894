use std::fmt;

use rustfst::prelude::{
    CoreFst, ExpandedFst, MutableFst, Semiring, StateIterator, Tr, Trs, TropicalWeight, VectorFst,
};

use crate::shared::constants::EPSILON;
use crate::shared::decode_error::DecodeError;

pub type StateId = rustfst::StateId;
pub type Label = rustfst::Label;
pub type StdVectorFst = VectorFst<TropicalWeight>;

/// Arc list of one graph state, shared with the underlying automaton.
pub type GraphTrs = <StdVectorFst as CoreFst<TropicalWeight>>::TRS;

/// One weighted transition handed to [`GraphBuilder`].
///
/// `ilabel` is the emission label consumed from the acoustic scorer
/// (`EPSILON` consumes no frame), `olabel` the word emitted (`EPSILON` for
/// none), `weight` a cost (negated log-probability).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GraphArc {
    pub ilabel: Label,
    pub olabel: Label,
    pub weight: f32,
    pub next_state: StateId,
}

impl GraphArc {
    pub fn new(ilabel: Label, olabel: Label, weight: f32, next_state: StateId) -> Self {
        Self {
            ilabel,
            olabel,
            weight,
            next_state,
        }
    }
}

/// Immutable weighted automaton describing the allowed word sequences.
///
/// Wraps a tropical-semiring `VectorFst` checked for decoding: it has a
/// start state, no NaN weights, and no negative weight on an arc that
/// consumes no frame. Once built, a graph is shared read-only (usually
/// behind an `Arc`) by every session that decodes with it.
pub struct DecodingGraph {
    fst: StdVectorFst,
    start: StateId,
    final_costs: Vec<f32>,
    num_arcs: usize,
    max_input_label: Label,
}

impl DecodingGraph {
    /// Validates `fst` and caches the per-state data the decoder reads on
    /// every frame.
    pub fn from_fst(fst: StdVectorFst) -> Result<Self, DecodeError> {
        let invalid = |reason: String| DecodeError::resource_load("decoding graph", reason);
        let start = fst
            .start()
            .ok_or_else(|| invalid("no start state".to_string()))?;

        let mut final_costs = Vec::with_capacity(fst.num_states());
        let mut num_arcs = 0;
        let mut max_input_label = EPSILON;
        for state in fst.states_iter() {
            let trs = fst.get_trs(state).map_err(fst_error)?;
            for tr in trs.trs() {
                let weight = *tr.weight.value();
                if weight.is_nan() {
                    return Err(invalid(format!(
                        "NaN weight on arc {state} -> {}",
                        tr.nextstate
                    )));
                }
                // The per-frame epsilon closure settles each state once.
                if tr.ilabel == EPSILON && weight < 0.0 {
                    return Err(invalid(format!(
                        "negative weight {weight} on epsilon arc {state} -> {}",
                        tr.nextstate
                    )));
                }
                max_input_label = max_input_label.max(tr.ilabel);
            }
            num_arcs += trs.trs().len();

            let cost = match fst.final_weight(state).map_err(fst_error)? {
                Some(weight) => *weight.value(),
                None => f32::INFINITY,
            };
            if cost.is_nan() {
                return Err(invalid(format!("NaN final cost on state {state}")));
            }
            final_costs.push(cost);
        }

        Ok(Self {
            fst,
            start,
            final_costs,
            num_arcs,
            max_input_label,
        })
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    pub fn num_states(&self) -> usize {
        self.final_costs.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.num_arcs
    }

    pub fn arcs(&self, state: StateId) -> Result<GraphTrs, DecodeError> {
        self.fst.get_trs(state).map_err(fst_error)
    }

    /// Final cost of `state`; `f32::INFINITY` when the state is not final.
    pub fn final_cost(&self, state: StateId) -> f32 {
        self.final_costs
            .get(state as usize)
            .copied()
            .unwrap_or(f32::INFINITY)
    }

    pub fn is_final(&self, state: StateId) -> bool {
        self.final_cost(state).is_finite()
    }

    pub fn max_input_label(&self) -> Label {
        self.max_input_label
    }

    pub fn fst(&self) -> &StdVectorFst {
        &self.fst
    }
}

impl fmt::Debug for DecodingGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodingGraph")
            .field("start", &self.start)
            .field("num_states", &self.num_states())
            .field("num_arcs", &self.num_arcs)
            .finish()
    }
}

/// Incremental constructor for [`DecodingGraph`].
#[derive(Default)]
pub struct GraphBuilder {
    start: Option<StateId>,
    arcs: Vec<Vec<GraphArc>>,
    final_costs: Vec<f32>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&mut self) -> StateId {
        self.arcs.push(Vec::new());
        self.final_costs.push(f32::INFINITY);
        (self.arcs.len() - 1) as StateId
    }

    /// Grows the state table so that `state` exists.
    pub fn ensure_state(&mut self, state: StateId) {
        while self.arcs.len() <= state as usize {
            self.add_state();
        }
    }

    pub fn set_start(&mut self, state: StateId) -> &mut Self {
        self.ensure_state(state);
        self.start = Some(state);
        self
    }

    pub fn set_final(&mut self, state: StateId, cost: f32) -> &mut Self {
        self.ensure_state(state);
        self.final_costs[state as usize] = cost;
        self
    }

    pub fn add_arc(&mut self, from: StateId, arc: GraphArc) -> &mut Self {
        self.ensure_state(from);
        self.ensure_state(arc.next_state);
        self.arcs[from as usize].push(arc);
        self
    }

    pub fn build(self) -> Result<DecodingGraph, DecodeError> {
        let start = self
            .start
            .ok_or_else(|| DecodeError::resource_load("decoding graph", "no start state"))?;

        let mut fst = StdVectorFst::new();
        fst.add_states(self.arcs.len());
        fst.set_start(start).map_err(fst_error)?;
        for (state, arcs) in self.arcs.into_iter().enumerate() {
            let state = state as StateId;
            for arc in arcs {
                let tr = Tr::new(
                    arc.ilabel,
                    arc.olabel,
                    TropicalWeight::new(arc.weight),
                    arc.next_state,
                );
                fst.add_tr(state, tr).map_err(fst_error)?;
            }
            let cost = self.final_costs[state as usize];
            if !cost.is_infinite() {
                fst.set_final(state, TropicalWeight::new(cost))
                    .map_err(fst_error)?;
            }
        }
        DecodingGraph::from_fst(fst)
    }
}

fn fst_error(e: impl fmt::Display) -> DecodeError {
    DecodeError::resource_load("decoding graph", format!("{e:#}"))
}
