// Process-scoped cache of the newest combined book per symbol.
//
// Lifecycle: created empty with the router, each symbol's entry swapped whole at the
// end of every cycle, cleared when the run loop shuts down. Readers get `Arc`s and
// never observe a half-written book.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::engine::types::SymbolId;
use crate::market_data::combined_book::CombinedBook;

#[derive(Debug, Clone, Default)]
pub struct LatestBooks {
    inner: Arc<RwLock<BTreeMap<SymbolId, Arc<CombinedBook>>>>,
}

impl LatestBooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the book for its symbol, returning the one it superseded.
    pub fn publish(&self, book: Arc<CombinedBook>) -> Option<Arc<CombinedBook>> {
        self.inner.write().insert(book.symbol().clone(), book)
    }

    pub fn get(&self, symbol: &SymbolId) -> Option<Arc<CombinedBook>> {
        self.inner.read().get(symbol).cloned()
    }

    pub fn snapshot(&self) -> Vec<Arc<CombinedBook>> {
        self.inner.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}
