// Market data module entrypoint
pub mod adapters;      // venue transports + per-venue payload parsers
pub mod normaliser;    // payload -> OrderBook, shared parsing helpers
pub mod fetcher;       // concurrent per-venue fetch under one deadline
pub mod combined_book; // merged, venue-tagged book for one symbol
pub mod combiner;      // merges per-venue books into a CombinedBook
pub mod latest;        // newest CombinedBook per symbol
pub mod router;        // runs cycles and feeds the sinks
