use std::sync::LazyLock;

use regex::Regex;

use crate::models::{RawAuthor, RawQuote};

/// Curly quotation marks the listing wraps every quote in.
static DECORATIVE_QUOTES: LazyLock<Regex> = LazyLock::new(|| Regex::new("[“”]").unwrap());

/// Removes the decorative quotation glyphs, leaving every other character untouched.
pub fn strip_decorative_quotes(text: &str) -> String {
    DECORATIVE_QUOTES.replace_all(text, "").into_owned()
}

/// Builds the record handed to ingest from the raw pieces of a quote block.
pub fn normalize(
    text: &str,
    tags: Vec<String>,
    author_name: &str,
    author_link: String,
) -> RawQuote {
    RawQuote {
        text: strip_decorative_quotes(text.trim()),
        tags: tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        author: RawAuthor {
            name: author_name.trim().to_string(),
            link: author_link,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_only_curly_quotes() {
        assert_eq!(
            strip_decorative_quotes("“It's \"plain\" — and ‘single’.”"),
            "It's \"plain\" — and ‘single’."
        );
        assert_eq!(strip_decorative_quotes("no glyphs"), "no glyphs");
    }

    #[test]
    fn normalizes_a_block() {
        let q = normalize(
            " “Be yourself.” ",
            vec![" life ".into(), "".into(), "humor".into()],
            " Oscar Wilde\n",
            "https://q/author/Oscar-Wilde".into(),
        );
        assert_eq!(q.text, "Be yourself.");
        assert_eq!(q.tags, vec!["life", "humor"]);
        assert_eq!(q.author.name, "Oscar Wilde");
    }
}
