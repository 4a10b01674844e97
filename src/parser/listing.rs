use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

use crate::error::ParseError;
use crate::models::RawQuote;
use crate::parser::normalize;

static QUOTE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.quote").unwrap());
static TEXT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.text").unwrap());
static AUTHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("small.author").unwrap());
static ABOUT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("small.author ~ a[href]").unwrap());
static TAG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a.tag").unwrap());
static NEXT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li.next a[href]").unwrap());

/// Everything one listing page yields.
#[derive(Debug, Default)]
pub struct ListingPage {
    pub quotes: Vec<RawQuote>,
    /// Quote blocks that lacked an expected element.
    pub skipped: usize,
    /// Absolute URL of the following page, if the page links one.
    pub next: Option<Url>,
}

pub fn parse_listing(html: &str, page_url: &Url) -> ListingPage {
    let doc = Html::parse_document(html);
    let mut page = ListingPage::default();

    for block in doc.select(&QUOTE) {
        match parse_block(block, page_url) {
            Ok(quote) => page.quotes.push(quote),
            Err(e) => {
                warn!("Skipping quote block on {}: {}", page_url, e);
                page.skipped += 1;
            }
        }
    }

    page.next = doc
        .select(&NEXT)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| page_url.join(href).ok());

    page
}

fn parse_block(block: ElementRef<'_>, page_url: &Url) -> Result<RawQuote, ParseError> {
    let text = first_text(block, &TEXT).ok_or(ParseError::MissingElement("span.text"))?;
    let author = first_text(block, &AUTHOR).ok_or(ParseError::MissingElement("small.author"))?;
    // The "(about)" link sits next to the author name; tag links never qualify.
    let href = block
        .select(&ABOUT)
        .next()
        .and_then(|a| a.value().attr("href"))
        .ok_or(ParseError::MissingElement("author link"))?;
    let link = page_url
        .join(href)
        .map_err(|_| ParseError::MissingElement("author link"))?;
    let tags = block
        .select(&TAG)
        .map(|t| t.text().collect::<String>())
        .collect();

    Ok(normalize::normalize(&text, tags, &author, link.to_string()))
}

fn first_text(block: ElementRef<'_>, selector: &Selector) -> Option<String> {
    block
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn base() -> Url {
        Url::parse("https://quotes.example/").unwrap()
    }

    #[test]
    fn page_one_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/listing_page1.html").unwrap();
        let page = parse_listing(&html, &base());

        assert_eq!(page.quotes.len(), 10);
        assert_eq!(page.skipped, 0);
        let links: HashSet<_> = page.quotes.iter().map(|q| q.author.link.as_str()).collect();
        assert_eq!(links.len(), 8);
        assert_eq!(
            page.next.as_ref().map(Url::as_str),
            Some("https://quotes.example/page/2/")
        );

        let first = &page.quotes[0];
        assert!(first.text.starts_with("The world as we have created it"));
        assert!(!first.text.contains('“'));
        assert_eq!(first.author.name, "Albert Einstein");
        assert_eq!(first.author.link, "https://quotes.example/author/Albert-Einstein");
        assert_eq!(first.tags, vec!["change", "deep-thoughts", "thinking", "world"]);
    }

    #[test]
    fn last_page_has_no_next() {
        let html = std::fs::read_to_string("tests/fixtures/listing_page2.html").unwrap();
        let page = parse_listing(&html, &base().join("/page/2/").unwrap());
        assert_eq!(page.quotes.len(), 2);
        assert!(page.next.is_none());
    }

    #[test]
    fn malformed_block_is_skipped() {
        let html = r#"
            <div class="quote"><span class="text">“Orphan”</span></div>
            <div class="quote">
              <span class="text">“Kept”</span>
              <span>by <small class="author">Someone</small> <a href="/author/Someone">(about)</a></span>
            </div>"#;
        let page = parse_listing(html, &base());
        assert_eq!(page.skipped, 1);
        assert_eq!(page.quotes.len(), 1);
        assert_eq!(page.quotes[0].text, "Kept");
        assert!(page.quotes[0].tags.is_empty());
    }

    #[test]
    fn tag_link_is_not_taken_for_author_link() {
        let html = r#"
            <div class="quote">
              <span class="text">“No about link”</span>
              <span>by <small class="author">Someone</small></span>
              <div class="tags"><a class="tag" href="/tag/life/page/1/">life</a></div>
            </div>"#;
        let page = parse_listing(html, &base());
        assert_eq!(page.skipped, 1);
        assert!(page.quotes.is_empty());
    }
}
