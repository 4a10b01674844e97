use std::sync::LazyLock;

use chrono::NaiveDate;
use scraper::{Html, Selector};

use crate::error::ParseError;
use crate::models::Biography;

static BORN_DATE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".author-born-date").unwrap());
static BORN_LOCATION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".author-born-location").unwrap());
static DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".author-description").unwrap());

const DOB_FORMAT: &str = "%B %d, %Y";
const LOCATION_PREFIX: &str = "in ";

pub fn parse_dob(raw: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(raw.trim(), DOB_FORMAT)
        .map_err(|_| ParseError::InvalidDate(raw.trim().to_string()))
}

/// "in Ulm, Germany" -> "Ulm, Germany".
pub fn parse_location(raw: &str) -> String {
    let raw = raw.trim();
    raw.strip_prefix(LOCATION_PREFIX).unwrap_or(raw).trim().to_string()
}

pub fn parse_author_page(html: &str) -> Result<Biography, ParseError> {
    let doc = Html::parse_document(html);
    let text = |selector: &Selector, what: &'static str| {
        doc.select(selector)
            .next()
            .map(|el| el.text().collect::<String>())
            .ok_or(ParseError::MissingElement(what))
    };

    Ok(Biography {
        dob: parse_dob(&text(&BORN_DATE, "author-born-date")?)?,
        country: parse_location(&text(&BORN_LOCATION, "author-born-location")?),
        description: text(&DESCRIPTION, "author-description")?.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn einstein_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/author_albert_einstein.html").unwrap();
        let bio = parse_author_page(&html).unwrap();
        assert_eq!(bio.dob, NaiveDate::from_ymd_opt(1879, 3, 14).unwrap());
        assert_eq!(bio.country, "Ulm, Germany");
        assert!(bio.description.starts_with("In 1879, Albert Einstein was born"));
        assert!(!bio.description.ends_with(char::is_whitespace));
    }

    #[test]
    fn dates_use_long_month_names() {
        assert_eq!(
            parse_dob("December 16, 1775"),
            Ok(NaiveDate::from_ymd_opt(1775, 12, 16).unwrap())
        );
        assert_eq!(
            parse_dob("1775-12-16"),
            Err(ParseError::InvalidDate("1775-12-16".into()))
        );
    }

    #[test]
    fn location_prefix_is_stripped_once() {
        assert_eq!(
            parse_location("in Steventon Rectory, Hampshire, The United Kingdom"),
            "Steventon Rectory, Hampshire, The United Kingdom"
        );
        assert_eq!(parse_location("Paris, France"), "Paris, France");
        assert_eq!(parse_location("in India"), "India");
    }

    #[test]
    fn missing_markup_is_reported() {
        let err = parse_author_page("<html><body><p>gone</p></body></html>").unwrap_err();
        assert_eq!(err, ParseError::MissingElement("author-born-date"));
    }
}
