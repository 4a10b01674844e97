use serde::Serialize;

use crate::db::Store;
use crate::error::StoreError;

const TOP_TAGS: usize = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopAuthor {
    pub id: i64,
    pub name: String,
    pub quotes: usize,
    pub top_tags: Vec<String>,
}

/// Popularity figures over quotes that already belong to a canonical author.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub total_quotes: usize,
    pub total_authors: usize,
    pub top_tags: Vec<String>,
    pub top_author: Option<TopAuthor>,
}

pub fn catalog_stats(store: &Store) -> Result<CatalogStats, StoreError> {
    let top_author = match store.top_author()? {
        Some((author, quotes)) => Some(TopAuthor {
            top_tags: store.top_tags(Some(author.id), TOP_TAGS)?,
            id: author.id,
            name: author.name,
            quotes,
        }),
        None => None,
    };

    Ok(CatalogStats {
        total_quotes: store.count_quotes()?,
        total_authors: store.count_authors()?,
        top_tags: store.top_tags(None, TOP_TAGS)?,
        top_author,
    })
}

pub fn print_stats(stats: &CatalogStats) {
    println!("\n=== Catalog Stats ===");
    println!("  Quotes:  {}", stats.total_quotes);
    println!("  Authors: {}", stats.total_authors);
    println!("\n  Top tags: {}", stats.top_tags.join(", "));
    match &stats.top_author {
        Some(a) => {
            println!("\n  Top author: {} ({} quotes)", a.name, a.quotes);
            println!("    tags: {}", a.top_tags.join(", "));
        }
        None => println!("\n  Top author: -"),
    }
}
