use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use rustfst::prelude::{
    ConstFst, CoreFst, ExpandedFst, MutableFst, SerializableFst, StateIterator, Trs,
    TropicalWeight,
};

use crate::graph::domain::decoding_graph::{DecodingGraph, StdVectorFst};
use crate::shared::decode_error::DecodeError;

/// Leading bytes of an OpenFst binary file.
const FST_MAGIC: [u8; 4] = 2_125_659_606_i32.to_le_bytes();

/// Loads a decoding graph from disk.
///
/// Binary OpenFst files (`vector` or `const` type) are recognised by their
/// magic number. Anything else is parsed as AT&T text:
///
/// ```text
/// src dst ilabel olabel [weight]
/// state [final_weight]
/// ```
///
/// where the source state of the first line is the start state.
pub fn read_graph_file(path: &Path) -> Result<DecodingGraph, DecodeError> {
    let resource = format!("decoding graph {}", path.display());
    let fst = if is_binary_fst(path).map_err(|e| load_error(&resource, e))? {
        read_binary(path, &resource)?
    } else {
        StdVectorFst::read_text(path).map_err(|e| load_error(&resource, e))?
    };
    let graph = DecodingGraph::from_fst(fst)?;
    log::info!(
        "Loaded {resource}: {} states, {} arcs",
        graph.num_states(),
        graph.num_arcs()
    );
    Ok(graph)
}

/// Parses an AT&T text graph held in memory.
pub fn read_graph_text(text: &str, resource: &str) -> Result<DecodingGraph, DecodeError> {
    let fst = StdVectorFst::from_text_string(text).map_err(|e| load_error(resource, e))?;
    DecodingGraph::from_fst(fst)
}

fn is_binary_fst(path: &Path) -> std::io::Result<bool> {
    let mut head = [0u8; 4];
    match File::open(path)?.read_exact(&mut head) {
        Ok(()) => Ok(head == FST_MAGIC),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_binary(path: &Path, resource: &str) -> Result<StdVectorFst, DecodeError> {
    match StdVectorFst::read(path) {
        Ok(fst) => Ok(fst),
        Err(vector_err) => {
            log::debug!("{resource} is not a vector fst ({vector_err}), trying const");
            let fst = ConstFst::<TropicalWeight>::read(path)
                .map_err(|e| load_error(resource, e))?;
            to_vector_fst(&fst, resource)
        }
    }
}

fn to_vector_fst(
    fst: &ConstFst<TropicalWeight>,
    resource: &str,
) -> Result<StdVectorFst, DecodeError> {
    let err = |e: &dyn fmt::Display| load_error(resource, e);
    let mut out = StdVectorFst::new();
    out.add_states(fst.num_states());
    if let Some(start) = fst.start() {
        out.set_start(start).map_err(|e| err(&e))?;
    }
    for state in fst.states_iter() {
        let trs = fst.get_trs(state).map_err(|e| err(&e))?;
        for tr in trs.trs() {
            out.add_tr(state, tr.clone()).map_err(|e| err(&e))?;
        }
        if let Some(weight) = fst.final_weight(state).map_err(|e| err(&e))? {
            out.set_final(state, weight).map_err(|e| err(&e))?;
        }
    }
    Ok(out)
}

fn load_error(resource: &str, e: impl fmt::Display) -> DecodeError {
    DecodeError::resource_load(resource, format!("{e:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rustfst::Semiring;
    use std::io::Write;

    fn graph(text: &str) -> Result<DecodingGraph, DecodeError> {
        read_graph_text(text, "test")
    }

    #[test]
    fn test_reads_arcs_and_finals() {
        let g = graph("0\t1\t1\t10\t0.5\n0\t1\t2\t20\n1\t2\t0\t0\t0.25\n2\t1.5\n").unwrap();
        assert_eq!(g.start(), 0);
        assert_eq!(g.num_states(), 3);
        let arcs = g.arcs(0).unwrap();
        assert_eq!(arcs.trs().len(), 2);
        assert_relative_eq!(*arcs.trs()[0].weight.value(), 0.5);
        assert_relative_eq!(*arcs.trs()[1].weight.value(), 0.0);
        assert_relative_eq!(g.final_cost(2), 1.5);
        assert!(!g.is_final(1));
    }

    #[test]
    fn test_start_is_first_source() {
        let g = graph("3\t0\t1\t1\n0\n").unwrap();
        assert_eq!(g.start(), 3);
        assert!(g.is_final(0));
        assert_relative_eq!(g.final_cost(0), 0.0);
    }

    #[test]
    fn test_rejects_malformed_lines() {
        assert!(matches!(graph("0\tx\t1\t1\n"), Err(DecodeError::ResourceLoad { .. })));
    }

    #[test]
    fn test_rejects_negative_epsilon_weight() {
        let err = graph("0\t1\t1\t1\n0\t2\t2\t2\t1.0\n2\t1\t0\t0\t-1.5\n1\n").unwrap_err();
        assert!(err.to_string().contains("epsilon arc 2 -> 1"));
    }

    #[test]
    fn test_read_graph_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "0\t1\t1\t1\t1.0\n1\t0.0\n").unwrap();
        let g = read_graph_file(file.path()).unwrap();
        assert_eq!(g.num_arcs(), 1);
        assert!(g.is_final(1));
    }

    #[test]
    fn test_read_binary_graph_file() {
        let text = graph("0\t1\t4\t2\t0.5\n1\n").unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        text.fst().write(file.path()).unwrap();

        let g = read_graph_file(file.path()).unwrap();
        assert_eq!(g.num_arcs(), 1);
        assert_eq!(g.max_input_label(), 4);
    }

    #[test]
    fn test_missing_file() {
        let result = read_graph_file(Path::new("/nonexistent/HCLG.fst"));
        assert!(matches!(result, Err(DecodeError::ResourceLoad { .. })));
    }
}
