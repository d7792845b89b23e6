use crate::core::{error::CrawlError, table::CrawlerState};

/// Persistence of one crawler's state. Each crawler owns its own handle.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<Option<CrawlerState>, CrawlError>;
    fn save(&self, state: &CrawlerState) -> Result<(), CrawlError>;
}
