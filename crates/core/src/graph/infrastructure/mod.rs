pub mod fst_graph_reader;
