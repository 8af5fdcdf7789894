pub mod text_lattice_writer;
