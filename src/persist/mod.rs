pub mod types;
pub use types::*;
pub mod json_file;
use async_trait::async_trait;

use crate::market_data::router::CycleReport;

/// Downstream consumer of finished cycles (rendering, files, ...).
///
/// Only ever handed fully merged books. A failing sink is logged by the router
/// and never stops the cycle loop.
#[async_trait]
pub trait BookSink: Send + Sync {
    fn name(&self) -> &str;
    async fn publish(&mut self, report: &CycleReport) -> PersistResult<()>;
    async fn flush(&mut self) -> PersistResult<()>;
}
