use std::path::Path;
use std::sync::Arc;

use crate::acoustic::domain::acoustic_model::AcousticModel;
use crate::acoustic::infrastructure::model_reader::read_model_file;
use crate::graph::domain::decoding_graph::DecodingGraph;
use crate::graph::domain::symbol_table::SymbolTable;
use crate::graph::infrastructure::fst_graph_reader::read_graph_file;
use crate::shared::decode_error::DecodeError;

/// The read-only resources every session decodes against.
///
/// Loaded once and shared by reference count; nothing mutates them after
/// construction, so any number of sessions and worker threads may hold
/// them at the same time.
#[derive(Clone, Debug)]
pub struct DecodeResources {
    pub model: Arc<AcousticModel>,
    pub graph: Arc<DecodingGraph>,
    pub symbols: Option<Arc<SymbolTable>>,
}

impl DecodeResources {
    /// Loads model, graph and optional word symbols, failing before any
    /// decoding if one is missing, malformed or they do not fit together.
    pub fn load(
        model_path: &Path,
        graph_path: &Path,
        words_path: Option<&Path>,
    ) -> Result<Self, DecodeError> {
        let model = read_model_file(model_path)?;
        let graph = read_graph_file(graph_path)?;
        let symbols = match words_path {
            Some(path) => {
                let table = SymbolTable::from_file(path)?;
                log::info!("Loaded {} word symbols from {}", table.len(), path.display());
                Some(table)
            }
            None => None,
        };
        Self::from_parts(model, graph, symbols)
    }

    pub fn from_parts(
        model: AcousticModel,
        graph: DecodingGraph,
        symbols: Option<SymbolTable>,
    ) -> Result<Self, DecodeError> {
        let resources = Self {
            model: Arc::new(model),
            graph: Arc::new(graph),
            symbols: symbols.map(Arc::new),
        };
        resources.check_compatible()?;
        Ok(resources)
    }

    /// Every graph input label must be a transition id the model knows.
    pub fn check_compatible(&self) -> Result<(), DecodeError> {
        let max_label = self.graph.max_input_label() as usize;
        let num_ids = self.model.transitions().num_transition_ids();
        if max_label > num_ids {
            return Err(DecodeError::resource_load(
                "decoding graph",
                format!("input label {max_label} exceeds the model's {num_ids} transition ids"),
            ));
        }
        Ok(())
    }

    pub fn symbols(&self) -> Option<&SymbolTable> {
        self.symbols.as_deref()
    }
}
