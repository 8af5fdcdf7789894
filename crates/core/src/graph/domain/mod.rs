pub mod decoding_graph;
pub mod symbol_table;
