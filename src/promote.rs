use serde::Serialize;
use tracing::{info, warn};

use crate::db::Store;
use crate::error::StoreError;
use crate::models::ScrapedAuthor;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PromoteStats {
    pub created: usize,
    pub merged: usize,
    pub relinked_quotes: usize,
}

/// Copies every staging author into the canonical collection and repoints its quotes.
///
/// Staging rows stay in place. Running it again is harmless: names already promoted take
/// the merge branch and no quote still carries a staging reference.
pub fn promote_authors(store: &Store) -> Result<PromoteStats, StoreError> {
    let mut stats = PromoteStats::default();

    for staged in store.scraped_authors()? {
        promote_one(store, &staged, &mut stats)?;
    }

    Ok(stats)
}

/// A staging row purged after it was listed has nothing left to promote and is skipped.
fn promote_one(
    store: &Store,
    staged: &ScrapedAuthor,
    stats: &mut PromoteStats,
) -> Result<(), StoreError> {
    let upsert = match store.upsert_promoted_author(staged) {
        Ok(upsert) => upsert,
        Err(e) if e.is_dangling_reference() => {
            warn!(name = %staged.name, staging_id = staged.id, "Staging author purged, skipped");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    if upsert.was_created() {
        stats.created += 1;
    } else {
        stats.merged += 1;
    }

    let relinked = store.relink_quotes(staged.id, upsert.id())?;
    stats.relinked_quotes += relinked;
    if relinked > 0 {
        info!(
            name = %staged.name,
            author_id = upsert.id(),
            relinked,
            "Promoted staging author"
        );
    }
    Ok(())
}
