pub mod best_path;
pub mod compact_lattice;
pub mod determinizer;
pub mod lattice;
pub mod result_extractor;
