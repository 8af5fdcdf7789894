use std::cmp::Ordering;

use serde::Serialize;

use super::lattice::LatticeWeight;
use crate::graph::domain::decoding_graph::Label;
use crate::shared::constants::EPSILON;

/// Frame span of one recognised word; `end_frame` is exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct WordTiming {
    pub word: Label,
    pub start_frame: usize,
    pub end_frame: usize,
}

/// Relative cost difference below which two paths count as equally cheap.
const TIE_TOLERANCE: f32 = 1e-5;

/// One step along a path: the word it emits (or epsilon), the transition
/// ids it consumes and its weight.
#[derive(Clone, Copy, Debug)]
pub struct PathStep<'a> {
    pub word: Label,
    pub transition_ids: &'a [Label],
    pub weight: LatticeWeight,
}

/// Lowest-cost path through a search result or lattice.
#[derive(Clone, Debug, PartialEq)]
pub struct BestPath {
    pub word_ids: Vec<Label>,
    pub word_timings: Vec<WordTiming>,
    /// One transition id per decoded frame.
    pub transition_ids: Vec<Label>,
    /// Graph cost including the final cost.
    pub graph_cost: f32,
    /// Unscaled acoustic cost.
    pub acoustic_cost: f32,
    /// `graph_cost + acoustic_scale * acoustic_cost`.
    pub total_cost: f32,
}

impl BestPath {
    /// Builds a path from its steps in order plus the final weight.
    ///
    /// A word starts at the frame where its step begins and ends where the
    /// next word starts (or at the end of the path).
    pub fn from_steps<'a, I>(steps: I, final_weight: LatticeWeight, acoustic_scale: f32) -> Self
    where
        I: IntoIterator<Item = PathStep<'a>>,
    {
        let mut word_ids = Vec::new();
        let mut word_timings: Vec<WordTiming> = Vec::new();
        let mut transition_ids = Vec::new();
        let mut weight = final_weight;

        for step in steps {
            if step.word != EPSILON {
                let start = transition_ids.len();
                if let Some(prev) = word_timings.last_mut() {
                    prev.end_frame = start;
                }
                word_ids.push(step.word);
                word_timings.push(WordTiming {
                    word: step.word,
                    start_frame: start,
                    end_frame: start,
                });
            }
            transition_ids.extend(step.transition_ids.iter().filter(|&&t| t != EPSILON));
            weight = weight + step.weight;
        }
        if let Some(last) = word_timings.last_mut() {
            last.end_frame = transition_ids.len();
        }

        Self {
            word_ids,
            word_timings,
            transition_ids,
            graph_cost: weight.graph,
            acoustic_cost: weight.acoustic,
            total_cost: weight.cost(acoustic_scale),
        }
    }

    pub fn num_frames(&self) -> usize {
        self.transition_ids.len()
    }

    /// Path log-likelihood: the negated total cost.
    pub fn log_likelihood(&self) -> f64 {
        -(self.total_cost as f64)
    }
}

/// True when two path costs are equal up to rounding.
pub fn costs_tie(a: f32, b: f32) -> bool {
    a == b || (a - b).abs() <= TIE_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Shorter sequences first, then lexicographic.
pub fn shortlex(a: &[Label], b: &[Label]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Whether a path costing `candidate` replaces one costing `incumbent`.
///
/// The cheaper path wins. Equally cheap paths are settled by `labels`,
/// which orders the candidate against the incumbent; the candidate has to
/// come first to win.
pub fn prefer(candidate: f32, incumbent: f32, labels: impl FnOnce() -> Ordering) -> bool {
    if !candidate.is_finite() {
        return false;
    }
    if !incumbent.is_finite() {
        return true;
    }
    if costs_tie(candidate, incumbent) {
        labels() == Ordering::Less
    } else {
        candidate < incumbent
    }
}

/// Output and input label sequences of a path prefix, epsilons dropped.
#[derive(Debug, Default, PartialEq, Eq)]
struct PathLabels {
    words: Vec<Label>,
    transition_ids: Vec<Label>,
}

impl PathLabels {
    fn of<'a>(steps: &[PathStep<'a>], last: Option<&PathStep<'a>>) -> Self {
        let mut labels = Self::default();
        for step in steps.iter().chain(last) {
            labels.push(step);
        }
        labels
    }

    fn push(&mut self, step: &PathStep<'_>) {
        if step.word != EPSILON {
            self.words.push(step.word);
        }
        self.transition_ids
            .extend(step.transition_ids.iter().filter(|&&t| t != EPSILON));
    }

    /// Ranking of equally cheap paths: word sequence first, then
    /// transition ids, both shortlex.
    fn order(&self, other: &Self) -> Ordering {
        shortlex(&self.words, &other.words)
            .then_with(|| shortlex(&self.transition_ids, &other.transition_ids))
    }
}

/// Arc of an acyclic lattice as read by [`cheapest_path`].
pub(crate) struct PathArc<'a> {
    pub step: PathStep<'a>,
    pub next_state: usize,
}

/// Cheapest path from state 0 of an acyclic lattice.
///
/// `order` lists the states so that every arc points forward. `finals`
/// holds, per state, the step taken when the path ends there (its weight
/// is the final weight). Ties between equally cheap paths go to the
/// shortlex-smaller word sequence and then to the shortlex-smaller
/// transition ids, so every lattice derived from one search yields the
/// same path.
pub(crate) fn cheapest_path(
    order: &[usize],
    arcs: &[Vec<PathArc<'_>>],
    finals: &[Option<PathStep<'_>>],
    acoustic_scale: f32,
) -> Option<BestPath> {
    let n = arcs.len();
    if n == 0 {
        return None;
    }
    let mut cost = vec![f32::INFINITY; n];
    let mut back: Vec<Option<(usize, usize)>> = vec![None; n];
    cost[0] = 0.0;

    let steps_to = |back: &[Option<(usize, usize)>], mut s: usize| {
        let mut steps = Vec::new();
        while let Some((prev, a)) = back[s] {
            steps.push(arcs[prev][a].step);
            s = prev;
        }
        steps.reverse();
        steps
    };
    for &s in order {
        if !cost[s].is_finite() {
            continue;
        }
        for (a, arc) in arcs[s].iter().enumerate() {
            let t = arc.next_state;
            let d = cost[s] + arc.step.weight.cost(acoustic_scale);
            let better = prefer(d, cost[t], || {
                let candidate = PathLabels::of(&steps_to(&back, s), Some(&arc.step));
                let incumbent = PathLabels::of(&steps_to(&back, t), None);
                candidate.order(&incumbent)
            });
            if better {
                cost[t] = d;
                back[t] = Some((s, a));
            }
        }
    }

    let mut best: Option<(usize, f32)> = None;
    for &s in order {
        let Some(last) = &finals[s] else { continue };
        let total = cost[s] + last.weight.cost(acoustic_scale);
        let better = match best {
            None => total.is_finite(),
            Some((b, b_total)) => prefer(total, b_total, || {
                let candidate = PathLabels::of(&steps_to(&back, s), Some(last));
                let incumbent = PathLabels::of(&steps_to(&back, b), finals[b].as_ref());
                candidate.order(&incumbent)
            }),
        };
        if better {
            best = Some((s, total));
        }
    }

    let (end, _) = best?;
    let last = finals[end]?;
    let steps = steps_to(&back, end).into_iter().chain(std::iter::once(PathStep {
        weight: LatticeWeight::ONE,
        ..last
    }));
    Some(BestPath::from_steps(steps, last.weight, acoustic_scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_word_timings_split_at_word_starts() {
        let steps = vec![
            PathStep {
                word: 7,
                transition_ids: &[1],
                weight: LatticeWeight::new(1.0, 2.0),
            },
            PathStep {
                word: 0,
                transition_ids: &[1],
                weight: LatticeWeight::new(0.0, 2.0),
            },
            PathStep {
                word: 9,
                transition_ids: &[2, 2],
                weight: LatticeWeight::new(0.5, 4.0),
            },
        ];
        let path = BestPath::from_steps(steps, LatticeWeight::new(0.25, 0.0), 0.5);
        assert_eq!(path.word_ids, vec![7, 9]);
        assert_eq!(path.transition_ids, vec![1, 1, 2, 2]);
        assert_eq!(
            path.word_timings,
            vec![
                WordTiming { word: 7, start_frame: 0, end_frame: 2 },
                WordTiming { word: 9, start_frame: 2, end_frame: 4 },
            ]
        );
        assert_relative_eq!(path.graph_cost, 1.75);
        assert_relative_eq!(path.acoustic_cost, 8.0);
        assert_relative_eq!(path.total_cost, 5.75);
        assert_relative_eq!(path.log_likelihood(), -5.75);
        assert_eq!(path.num_frames(), 4);
    }

    #[test]
    fn test_prefer_breaks_ties_by_labels() {
        assert!(prefer(1.0, 2.0, || Ordering::Greater));
        assert!(!prefer(2.0, 1.0, || Ordering::Less));
        assert!(prefer(1.0, 1.0 + 1e-7, || Ordering::Less));
        assert!(!prefer(1.0, 1.0, || Ordering::Greater));
        assert!(prefer(5.0, f32::INFINITY, || Ordering::Greater));
        assert!(!prefer(f32::INFINITY, f32::INFINITY, || Ordering::Less));
    }

    #[test]
    fn test_shortlex() {
        assert_eq!(shortlex(&[9], &[1, 2]), Ordering::Less);
        assert_eq!(shortlex(&[1, 3], &[1, 2]), Ordering::Greater);
        assert_eq!(shortlex(&[], &[]), Ordering::Equal);
    }

    fn step(word: Label, tid: &[Label], cost: f32) -> PathStep<'_> {
        PathStep {
            word,
            transition_ids: tid,
            weight: LatticeWeight::new(cost, 0.0),
        }
    }

    #[test]
    fn test_cheapest_path_prefers_smaller_words_on_ties() {
        // 0 -(word 4)-> 1 and 0 -(word 3)-> 1, equal cost
        let arcs = vec![
            vec![
                PathArc { step: step(4, &[1], 1.0), next_state: 1 },
                PathArc { step: step(3, &[2], 1.0), next_state: 1 },
            ],
            Vec::new(),
        ];
        let finals = vec![None, Some(step(EPSILON, &[], 0.5))];
        let path = cheapest_path(&[0, 1], &arcs, &finals, 1.0).unwrap();
        assert_eq!(path.word_ids, vec![3]);
        assert_eq!(path.transition_ids, vec![2]);
        assert_relative_eq!(path.total_cost, 1.5);
    }

    #[test]
    fn test_cheapest_path_takes_cheaper_final() {
        let arcs = vec![
            vec![
                PathArc { step: step(1, &[1], 0.0), next_state: 1 },
                PathArc { step: step(2, &[1], 0.5), next_state: 2 },
            ],
            Vec::new(),
            Vec::new(),
        ];
        let finals = vec![
            None,
            Some(step(EPSILON, &[], 2.0)),
            Some(step(EPSILON, &[7], 0.0)),
        ];
        let path = cheapest_path(&[0, 1, 2], &arcs, &finals, 1.0).unwrap();
        assert_eq!(path.word_ids, vec![2]);
        assert_eq!(path.transition_ids, vec![1, 7]);
        assert_relative_eq!(path.graph_cost, 0.5);
    }

    #[test]
    fn test_cheapest_path_without_final() {
        let arcs = vec![vec![PathArc { step: step(1, &[1], 0.0), next_state: 1 }], Vec::new()];
        assert!(cheapest_path(&[0, 1], &arcs, &[None, None], 1.0).is_none());
        assert!(cheapest_path(&[], &[], &[], 1.0).is_none());
    }

    #[test]
    fn test_epsilon_only_path() {
        let path = BestPath::from_steps(Vec::new(), LatticeWeight::ONE, 1.0);
        assert!(path.word_ids.is_empty());
        assert_eq!(path.total_cost, 0.0);
    }
}
