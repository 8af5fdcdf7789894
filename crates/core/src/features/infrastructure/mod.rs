pub mod text_feature_reader;
pub mod vec_feature_source;
