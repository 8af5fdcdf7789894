use crate::graph::domain::decoding_graph::{Label, StateId};
use crate::lattice::domain::best_path::{BestPath, PathStep};
use crate::lattice::domain::lattice::LatticeWeight;
use crate::lattice::domain::result_extractor::{expanded_best_path, ResultExtractor};

/// Position of a token: `frame` counts the acoustic frames consumed so far.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId {
    pub frame: usize,
    pub index: usize,
}

/// Incoming edge of a token.
///
/// Emitting links come from the previous frame, epsilon links from the same
/// frame.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenLink {
    pub from: TokenId,
    pub ilabel: Label,
    pub olabel: Label,
    pub graph_cost: f32,
    /// Negated, unscaled log-likelihood; zero for epsilon links.
    pub acoustic_cost: f32,
}

impl TokenLink {
    pub fn weight(&self) -> LatticeWeight {
        LatticeWeight::new(self.graph_cost, self.acoustic_cost)
    }
}

/// A search hypothesis: one graph state at one frame.
#[derive(Clone, Debug)]
pub struct Token {
    pub state: StateId,
    /// Best accumulated scaled cost from the start token.
    pub cost: f32,
    /// Index into `links` of the link that achieved `cost`.
    pub best_link: Option<usize>,
    pub links: Vec<TokenLink>,
}

/// Tokens of one frame.
#[derive(Clone, Debug, Default)]
pub struct FrameTokens {
    pub tokens: Vec<Token>,
    /// Every token index, ordered so links within the frame point forward.
    pub order: Vec<usize>,
    /// Survivors of pruning, cheapest first. Only these were expanded.
    pub active: Vec<usize>,
}

/// A token that ends the search, with its final graph cost.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FinalToken {
    pub index: usize,
    pub final_cost: f32,
}

/// Everything the search kept for one utterance.
///
/// Token backpointers always lead back to the start token at frame 0.
#[derive(Clone, Debug)]
pub struct SearchLattice {
    frames: Vec<FrameTokens>,
    finals: Vec<FinalToken>,
    best_final: usize,
    acoustic_scale: f32,
    partial: bool,
}

impl SearchLattice {
    pub(crate) fn new(
        frames: Vec<FrameTokens>,
        finals: Vec<FinalToken>,
        best_final: usize,
        acoustic_scale: f32,
        partial: bool,
    ) -> Self {
        Self {
            frames,
            finals,
            best_final,
            acoustic_scale,
            partial,
        }
    }

    pub fn frames(&self) -> &[FrameTokens] {
        &self.frames
    }

    /// Frame index of the last token set.
    pub fn last_frame(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn finals(&self) -> &[FinalToken] {
        &self.finals
    }

    pub fn token(&self, id: TokenId) -> &Token {
        &self.frames[id.frame].tokens[id.index]
    }

    pub fn acoustic_scale(&self) -> f32 {
        self.acoustic_scale
    }

    /// True when no final state was reached and the cheapest surviving
    /// token was used instead.
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Cost of the best complete path, final cost included.
    pub fn best_cost(&self) -> f32 {
        let best = self.finals[self.best_final];
        self.frames[self.last_frame()].tokens[best.index].cost + best.final_cost
    }

    /// Cheapest complete path.
    ///
    /// Read from the lattice of paths tied with the best cost, so equally
    /// cheap alternatives are ranked exactly as [`ResultExtractor::best_path`]
    /// ranks them.
    pub fn best_path(&self) -> BestPath {
        let tied = ResultExtractor::new(0.0).raw_lattice(self);
        expanded_best_path(&tied).unwrap_or_else(|| self.backpointer_path())
    }

    /// Follows best-link backpointers from the best final token.
    fn backpointer_path(&self) -> BestPath {
        let best = self.finals[self.best_final];
        let mut links = Vec::new();
        let mut id = TokenId {
            frame: self.last_frame(),
            index: best.index,
        };
        while let Some(link) = self.token(id).best_link.map(|l| &self.token(id).links[l]) {
            links.push(link);
            id = link.from;
        }

        let steps = links.into_iter().rev().map(|link| PathStep {
            word: link.olabel,
            transition_ids: std::slice::from_ref(&link.ilabel),
            weight: link.weight(),
        });
        BestPath::from_steps(
            steps,
            LatticeWeight::new(best.final_cost, 0.0),
            self.acoustic_scale,
        )
    }

    pub fn num_tokens(&self) -> usize {
        self.frames.iter().map(|f| f.tokens.len()).sum()
    }
}
