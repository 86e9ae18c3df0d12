// Single-venue book primitives
pub mod book;   // immutable per-venue OrderBook
pub mod ladder; // build / fill / netting over one best-first side
pub mod types;  // ids, levels, sides, level errors
