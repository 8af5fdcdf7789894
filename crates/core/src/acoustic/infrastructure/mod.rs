pub mod computation_cache;
pub mod model_reader;
pub mod nnet_acoustic_scorer;
