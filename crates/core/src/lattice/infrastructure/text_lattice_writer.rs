use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::graph::domain::decoding_graph::Label;
use crate::lattice::domain::lattice::LatticeWeight;
use crate::lattice::domain::result_extractor::OutputLattice;
use crate::pipeline::output_sink::LatticeSink;
use crate::shared::decode_error::DecodeError;

/// Writes lattices as text, one block per utterance.
///
/// ```text
/// utt-001
/// 0 1 3 0 0.5,1.25
/// 1 2 4 7 0,0.75
/// 2 0,0
///
/// ```
///
/// Expanded lattices use `src dst ilabel olabel graph,acoustic`; compact
/// lattices use `src dst word graph,acoustic,tid_tid_...`. Final states are
/// `state graph,acoustic` (plus `,tids` when compact). A blank line ends the
/// block.
pub struct TextLatticeWriter<W: Write + Send> {
    out: W,
}

impl TextLatticeWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, DecodeError> {
        let file = File::create(path).map_err(|e| {
            DecodeError::resource_load(format!("lattice output {}", path.display()), e.to_string())
        })?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> TextLatticeWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> LatticeSink for TextLatticeWriter<W> {
    fn write_lattice(
        &mut self,
        utterance_id: &str,
        lattice: &OutputLattice,
    ) -> Result<(), DecodeError> {
        self.out
            .write_all(format_lattice(utterance_id, lattice).as_bytes())
            .map_err(|e| DecodeError::sink_write(utterance_id, e))
    }

    fn flush(&mut self) -> Result<(), DecodeError> {
        self.out.flush()?;
        Ok(())
    }
}

pub fn format_lattice(key: &str, lattice: &OutputLattice) -> String {
    let mut text = format!("{key}\n");
    match lattice {
        OutputLattice::Expanded(lat) => {
            for (src, state) in lat.states().iter().enumerate() {
                for arc in &state.arcs {
                    let _ = writeln!(
                        text,
                        "{src} {} {} {} {}",
                        arc.next_state,
                        arc.ilabel,
                        arc.olabel,
                        weight(&arc.weight)
                    );
                }
                if let Some(w) = &state.final_weight {
                    let _ = writeln!(text, "{src} {}", weight(w));
                }
            }
        }
        OutputLattice::Compact(lat) => {
            for (src, state) in lat.states().iter().enumerate() {
                for arc in &state.arcs {
                    let _ = writeln!(
                        text,
                        "{src} {} {} {},{}",
                        arc.next_state,
                        arc.word,
                        weight(&arc.weight),
                        transition_ids(&arc.transition_ids)
                    );
                }
                if let Some(f) = &state.final_weight {
                    let _ = writeln!(
                        text,
                        "{src} {},{}",
                        weight(&f.weight),
                        transition_ids(&f.transition_ids)
                    );
                }
            }
        }
    }
    text.push('\n');
    text
}

fn weight(w: &LatticeWeight) -> String {
    format!("{},{}", w.graph, w.acoustic)
}

fn transition_ids(ids: &[Label]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("_")
}
