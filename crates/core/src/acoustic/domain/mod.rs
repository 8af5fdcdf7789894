pub mod acoustic_model;
pub mod acoustic_scorer;
pub mod decodable_utterance;
pub mod feedforward_network;
pub mod scorer_config;
pub mod transition_model;
