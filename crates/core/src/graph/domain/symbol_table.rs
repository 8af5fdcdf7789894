use std::path::Path;

use super::decoding_graph::Label;
use crate::shared::decode_error::DecodeError;

/// Bidirectional mapping between word ids and their surface strings.
///
/// Backed by an OpenFst-style text symbol table, one `word id` pair per line.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    symbols: rustfst::SymbolTable,
}

impl SymbolTable {
    pub fn from_file(path: &Path) -> Result<Self, DecodeError> {
        let resource = format!("symbol table {}", path.display());
        let symbols = rustfst::SymbolTable::read_text(path)
            .map_err(|e| DecodeError::resource_load(&resource, format!("{e:#}")))?;
        if symbols.len() == 0 {
            return Err(DecodeError::resource_load(&resource, "no symbols"));
        }
        log::debug!("Loaded {resource}: {} symbols", symbols.len());
        Ok(Self { symbols })
    }

    pub fn word(&self, id: Label) -> Option<&str> {
        self.symbols.get_symbol(id)
    }

    pub fn id(&self, word: &str) -> Option<Label> {
        self.symbols.get_label(word)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.len() == 0
    }

    /// Renders word ids as text, falling back to the number for unknown ids.
    pub fn render(&self, ids: &[Label]) -> Vec<String> {
        ids.iter()
            .map(|&id| self.word(id).map_or_else(|| id.to_string(), str::to_string))
            .collect()
    }
}

impl From<rustfst::SymbolTable> for SymbolTable {
    fn from(symbols: rustfst::SymbolTable) -> Self {
        Self { symbols }
    }
}
