use std::collections::HashSet;

use tracing::{info, warn};
use url::Url;

use crate::error::FetchError;
use crate::fetch::PageSource;
use crate::parser::{parse_listing, ListingPage};

/// Walks a paginated listing one page at a time, following its "next" link.
///
/// Only a failure to load the first page is an error. Any later fetch failure, a page
/// without a next link, or a link back to an already visited page ends the walk.
pub struct PageWalker<'a> {
    source: &'a dyn PageSource,
    next: Option<Url>,
    single_page: bool,
    visited: HashSet<Url>,
}

impl<'a> PageWalker<'a> {
    pub fn new(source: &'a dyn PageSource, start: Url, single_page: bool) -> Self {
        Self {
            source,
            next: Some(start),
            single_page,
            visited: HashSet::new(),
        }
    }

    pub fn pages_visited(&self) -> usize {
        self.visited.len()
    }

    pub async fn next_page(&mut self) -> Result<Option<ListingPage>, FetchError> {
        let Some(url) = self.next.take() else {
            return Ok(None);
        };
        if !self.visited.insert(url.clone()) {
            warn!("Listing links back to {}, stopping", url);
            return Ok(None);
        }

        let html = match self.source.fetch(url.as_str()).await {
            Ok(html) => html,
            Err(e) if self.visited.len() == 1 => return Err(e),
            Err(e) => {
                warn!("Fetch of {} failed, ending walk: {}", url, e);
                return Ok(None);
            }
        };

        let page = parse_listing(&html, &url);
        info!(
            page = self.visited.len(),
            quotes = page.quotes.len(),
            skipped = page.skipped,
            "Parsed {}",
            url
        );
        if !self.single_page {
            self.next = page.next.clone();
        }
        Ok(Some(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{fixture, StaticSource};

    const BASE: &str = "https://quotes.example/";

    fn source() -> StaticSource {
        StaticSource::default()
            .with(BASE, fixture("listing_page1"))
            .with("https://quotes.example/page/2/", fixture("listing_page2"))
    }

    async fn walk(source: &StaticSource, single_page: bool) -> Vec<ListingPage> {
        let mut walker = PageWalker::new(source, Url::parse(BASE).unwrap(), single_page);
        let mut pages = Vec::new();
        while let Some(page) = walker.next_page().await.unwrap() {
            pages.push(page);
        }
        pages
    }

    #[tokio::test]
    async fn follows_next_until_exhausted() {
        let source = source();
        let pages = walk(&source, false).await;
        assert_eq!(pages.len(), 2);
        assert_eq!(pages.iter().map(|p| p.quotes.len()).sum::<usize>(), 12);
        assert_eq!(source.requests().len(), 2);
    }

    #[tokio::test]
    async fn single_page_never_follows_next() {
        let source = source();
        let pages = walk(&source, true).await;
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].quotes.len(), 10);
        assert!(pages[0].next.is_some());
        assert_eq!(source.requests(), vec![BASE.to_string()]);
    }

    #[tokio::test]
    async fn later_page_failure_ends_walk() {
        let source = StaticSource::default().with(BASE, fixture("listing_page1"));
        let pages = walk(&source, false).await;
        assert_eq!(pages.len(), 1);
        assert_eq!(source.requests().len(), 2);
    }

    #[tokio::test]
    async fn first_page_failure_is_an_error() {
        let source = StaticSource::default();
        let mut walker = PageWalker::new(&source, Url::parse(BASE).unwrap(), false);
        assert!(walker.next_page().await.is_err());
    }
}
