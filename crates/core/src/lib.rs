//! Lattice-generating speech decoder.
//!
//! Scores feature frames with a feed-forward acoustic model, searches a
//! weighted decoding graph with a beam-pruned token-passing decoder and
//! turns the surviving hypotheses into word lattices, transcripts and
//! frame alignments. [`pipeline::decode_session::DecodeSession`] ties the
//! pieces together.

pub mod acoustic;
pub mod decoder;
pub mod features;
pub mod graph;
pub mod lattice;
pub mod pipeline;
pub mod shared;
