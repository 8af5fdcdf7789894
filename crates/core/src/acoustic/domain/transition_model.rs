use crate::graph::domain::decoding_graph::Label;
use crate::shared::constants::EPSILON;
use crate::shared::decode_error::DecodeError;

/// Maps transition ids (the graph's input labels) to emission classes (the
/// acoustic network's outputs).
///
/// Transition ids are 1-based; id 0 is reserved for epsilon.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionModel {
    classes: Vec<usize>,
    num_classes: usize,
}

/// A run of consecutive frames aligned to one emission class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct AlignmentSegment {
    pub class: usize,
    pub duration: usize,
}

impl TransitionModel {
    /// `classes[i]` is the emission class of transition id `i + 1`.
    pub fn new(classes: Vec<usize>, num_classes: usize) -> Result<Self, DecodeError> {
        if classes.is_empty() {
            return Err(DecodeError::resource_load(
                "transition model",
                "no transition ids",
            ));
        }
        if let Some(bad) = classes.iter().find(|&&c| c >= num_classes) {
            return Err(DecodeError::resource_load(
                "transition model",
                format!("emission class {bad} out of range for {num_classes} classes"),
            ));
        }
        Ok(Self {
            classes,
            num_classes,
        })
    }

    /// Identity mapping: transition id `k` emits class `k - 1`.
    pub fn identity(num_classes: usize) -> Self {
        Self {
            classes: (0..num_classes).collect(),
            num_classes,
        }
    }

    pub fn num_transition_ids(&self) -> usize {
        self.classes.len()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn emission_class(&self, transition_id: Label) -> Option<usize> {
        if transition_id == EPSILON {
            return None;
        }
        self.classes.get(transition_id as usize - 1).copied()
    }

    /// Collapses a per-frame transition-id sequence into class runs.
    pub fn alignment(&self, transition_ids: &[Label]) -> Vec<AlignmentSegment> {
        let mut segments: Vec<AlignmentSegment> = Vec::new();
        for class in transition_ids.iter().filter_map(|&t| self.emission_class(t)) {
            match segments.last_mut() {
                Some(last) if last.class == class => last.duration += 1,
                _ => segments.push(AlignmentSegment { class, duration: 1 }),
            }
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_one_based_ids() {
        let tm = TransitionModel::new(vec![0, 0, 1, 2], 3).unwrap();
        assert_eq!(tm.num_transition_ids(), 4);
        assert_eq!(tm.emission_class(0), None);
        assert_eq!(tm.emission_class(1), Some(0));
        assert_eq!(tm.emission_class(4), Some(2));
        assert_eq!(tm.emission_class(5), None);
    }

    #[test]
    fn test_rejects_out_of_range_class() {
        let err = TransitionModel::new(vec![0, 3], 3).unwrap_err();
        assert!(err.to_string().contains("class 3"));
    }

    #[test]
    fn test_alignment_merges_runs_across_transition_ids() {
        // ids 1 and 2 both emit class 0
        let tm = TransitionModel::new(vec![0, 0, 1], 2).unwrap();
        let ali = tm.alignment(&[1, 2, 2, 3, 3, 1]);
        assert_eq!(
            ali,
            vec![
                AlignmentSegment { class: 0, duration: 3 },
                AlignmentSegment { class: 1, duration: 2 },
                AlignmentSegment { class: 0, duration: 1 },
            ]
        );
    }

    #[test]
    fn test_identity() {
        let tm = TransitionModel::identity(3);
        assert_eq!(tm.emission_class(3), Some(2));
    }
}
