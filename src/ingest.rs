use serde::Serialize;
use tracing::{debug, warn};

use crate::db::Store;
use crate::error::StoreError;
use crate::models::RawQuote;

/// Running totals for the quote phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub fetched_records: usize,
    pub quotes_created: usize,
    pub quotes_updated: usize,
    pub authors_created: usize,
    pub skipped: usize,
}

/// Writes one page worth of quotes into staging.
///
/// Each record is its own upsert, so a duplicate quote text turns into an update of the
/// existing row instead of aborting the page.
pub fn ingest_batch(
    store: &Store,
    quotes: &[RawQuote],
    stats: &mut IngestStats,
) -> Result<(), StoreError> {
    for quote in quotes {
        let author_id = stage_author(store, quote, stats)?;
        write_quote(store, quote, author_id, stats)?;
    }
    Ok(())
}

fn stage_author(
    store: &Store,
    quote: &RawQuote,
    stats: &mut IngestStats,
) -> Result<i64, StoreError> {
    let author = store.get_or_create_scraped_author(&quote.author.name, &quote.author.link)?;
    if author.was_created() {
        stats.authors_created += 1;
        debug!(name = %quote.author.name, link = %quote.author.link, "New staging author");
    }
    Ok(author.id())
}

/// Upserts the quote against `author_id`. A retention purge may delete that staging row
/// between lookup and write; the author is then staged again and the write retried once.
fn write_quote(
    store: &Store,
    quote: &RawQuote,
    author_id: i64,
    stats: &mut IngestStats,
) -> Result<(), StoreError> {
    let upsert = match store.upsert_scraped_quote(&quote.text, &quote.tags, author_id) {
        Err(e) if e.is_dangling_reference() => {
            warn!(link = %quote.author.link, "Staging author vanished mid-write, restaging");
            let author_id = stage_author(store, quote, stats)?;
            store.upsert_scraped_quote(&quote.text, &quote.tags, author_id)?
        }
        other => other?,
    };
    if upsert.was_created() {
        stats.quotes_created += 1;
    } else {
        stats.quotes_updated += 1;
        debug!(quote_id = upsert.id(), "Quote already stored, updated");
    }
    stats.fetched_records += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_listing;
    use chrono::{Duration, Utc};
    use url::Url;

    fn page_one() -> Vec<RawQuote> {
        let html = std::fs::read_to_string("tests/fixtures/listing_page1.html").unwrap();
        parse_listing(&html, &Url::parse("https://quotes.example/").unwrap()).quotes
    }

    #[test]
    fn page_fixture_yields_ten_quotes_and_eight_authors() {
        let store = Store::open_in_memory().unwrap();
        let mut stats = IngestStats::default();
        ingest_batch(&store, &page_one(), &mut stats).unwrap();

        assert_eq!(store.count_all_quotes().unwrap(), 10);
        assert_eq!(store.count_scraped_authors().unwrap(), 8);
        assert_eq!(stats.quotes_created, 10);
        assert_eq!(stats.authors_created, 8);
    }

    #[test]
    fn reingest_does_not_grow() {
        let store = Store::open_in_memory().unwrap();
        let quotes = page_one();
        ingest_batch(&store, &quotes, &mut IngestStats::default()).unwrap();

        let mut second = IngestStats::default();
        ingest_batch(&store, &quotes, &mut second).unwrap();

        assert_eq!(store.count_all_quotes().unwrap(), 10);
        assert_eq!(store.count_scraped_authors().unwrap(), 8);
        assert_eq!(second.quotes_created, 0);
        assert_eq!(second.quotes_updated, 10);
        assert_eq!(second.authors_created, 0);
    }

    #[test]
    fn repeated_author_shares_one_staging_record() {
        let store = Store::open_in_memory().unwrap();
        ingest_batch(&store, &page_one(), &mut IngestStats::default()).unwrap();

        let einstein = store
            .find_scraped_author_by_link("https://quotes.example/author/Albert-Einstein")
            .unwrap()
            .unwrap();
        assert_eq!(store.quotes_by_scraped_author(einstein.id).unwrap().len(), 3);
        assert!(!einstein.has_biography());
    }

    #[test]
    fn author_purged_between_lookup_and_write_is_restaged() {
        let store = Store::open_in_memory().unwrap();
        let quote = page_one().remove(0);
        let mut stats = IngestStats::default();

        let stale = stage_author(&store, &quote, &mut stats).unwrap();
        let purged = store
            .purge_scraped_authors(Utc::now() + Duration::seconds(5))
            .unwrap();
        assert_eq!(purged, 1);

        write_quote(&store, &quote, stale, &mut stats).unwrap();

        assert_eq!(store.count_all_quotes().unwrap(), 1);
        assert_eq!(store.count_scraped_authors().unwrap(), 1);
        assert_eq!(stats.authors_created, 2);
        assert_eq!(stats.quotes_created, 1);
        let restaged = store
            .find_scraped_author_by_link(&quote.author.link)
            .unwrap()
            .unwrap();
        assert_eq!(store.quotes_by_scraped_author(restaged.id).unwrap().len(), 1);
    }
}
