use serde::Serialize;
use tracing::{info, warn};

use crate::db::Store;
use crate::error::StoreError;
use crate::fetch::PageSource;
use crate::parser::parse_author_page;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnrichReport {
    pub fetched_records: usize,
    pub total: usize,
    pub failed: usize,
}

impl EnrichReport {
    /// Every eligible author was attempted and none succeeded.
    pub fn all_failed(&self) -> bool {
        self.total > 0 && self.failed == self.total
    }
}

/// Fills dob, country and description for staging authors that still lack them.
///
/// A failed fetch or parse is logged and counted; it never stops the remaining authors.
/// `on_progress` is called after every author.
pub async fn enrich_authors(
    store: &Store,
    source: &dyn PageSource,
    mut on_progress: impl FnMut(&EnrichReport),
) -> Result<EnrichReport, StoreError> {
    let pending = store.scraped_authors_missing_biography()?;
    let mut report = EnrichReport {
        total: pending.len(),
        ..Default::default()
    };
    on_progress(&report);

    for author in pending {
        let bio = match source.fetch_detail(&author.link).await {
            Ok(html) => parse_author_page(&html).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match bio {
            Ok(bio) => {
                store.update_scraped_biography(author.id, &bio)?;
                report.fetched_records += 1;
                info!(name = %author.name, dob = %bio.dob, "Enriched author");
            }
            Err(e) => {
                report.failed += 1;
                warn!("Author {} ({}) not enriched: {}", author.name, author.link, e);
            }
        }
        on_progress(&report);
    }

    Ok(report)
}
