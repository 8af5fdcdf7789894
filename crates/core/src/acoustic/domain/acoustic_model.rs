use super::feedforward_network::FeedForwardNetwork;
use super::transition_model::TransitionModel;
use crate::shared::decode_error::DecodeError;

/// Immutable bundle of the transition structure and the scoring network.
///
/// Loaded once and shared behind an `Arc` by every session.
#[derive(Clone, Debug)]
pub struct AcousticModel {
    transitions: TransitionModel,
    network: FeedForwardNetwork,
}

impl AcousticModel {
    pub fn new(
        transitions: TransitionModel,
        network: FeedForwardNetwork,
    ) -> Result<Self, DecodeError> {
        if network.output_dim() != transitions.num_classes() {
            return Err(DecodeError::resource_load(
                "acoustic model",
                format!(
                    "network has {} outputs but the transition model uses {} classes",
                    network.output_dim(),
                    transitions.num_classes()
                ),
            ));
        }
        Ok(Self {
            transitions,
            network,
        })
    }

    pub fn transitions(&self) -> &TransitionModel {
        &self.transitions
    }

    pub fn network(&self) -> &FeedForwardNetwork {
        &self.network
    }

    pub fn feature_dim(&self) -> usize {
        self.network.feature_dim()
    }

    pub fn num_classes(&self) -> usize {
        self.transitions.num_classes()
    }

    /// Human-readable summary of the loaded model.
    pub fn info(&self) -> String {
        format!(
            "input-dim: {}\nleft-context: {}\nright-context: {}\nnum-classes: {}\nnum-transition-ids: {}\npriors: {}\nlayers: {}",
            self.network.feature_dim(),
            self.network.left_context(),
            self.network.right_context(),
            self.num_classes(),
            self.transitions.num_transition_ids(),
            if self.network.has_priors() { "yes" } else { "no" },
            self.network.describe_layers(),
        )
    }
}
