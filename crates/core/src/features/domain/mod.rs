pub mod feature_matrix;
pub mod feature_source;
