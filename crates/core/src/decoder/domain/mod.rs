pub mod decodable;
pub mod decoder_config;
pub mod lattice_decoder;
pub mod search_lattice;
