//! Title and description extraction from fetched HTML.

use scraper::{ElementRef, Html, Node, Selector};
use std::sync::OnceLock;

/// Raw fields pulled from a page, before capping and sanitising.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSummary {
    pub title: Option<String>,
    /// The meta description, or the flattened body text when there is none.
    pub description: Option<String>,
}

/// Elements whose text never counts as page content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

struct PageSelectors {
    title: Selector,
    meta: Selector,
    body: Selector,
}

fn selectors() -> Option<&'static PageSelectors> {
    static SELECTORS: OnceLock<Option<PageSelectors>> = OnceLock::new();
    SELECTORS
        .get_or_init(|| {
            Some(PageSelectors {
                title: Selector::parse("head title").ok()?,
                meta: Selector::parse("meta[name]").ok()?,
                body: Selector::parse("body").ok()?,
            })
        })
        .as_ref()
}

/// Extract the head title and the meta description (or body text).
pub fn extract(html: &str) -> PageSummary {
    let Some(sel) = selectors() else {
        return PageSummary::default();
    };
    let document = Html::parse_document(html);

    let title = document
        .select(&sel.title)
        .next()
        .map(|t| collapse_whitespace(t.text()))
        .filter(|t| !t.is_empty());

    let description = meta_description(&document, sel)
        .or_else(|| document.select(&sel.body).next().map(body_text))
        .filter(|d| !d.is_empty());

    PageSummary { title, description }
}

fn meta_description(document: &Html, sel: &PageSelectors) -> Option<String> {
    document
        .select(&sel.meta)
        .filter(|meta| {
            meta.value()
                .attr("name")
                .is_some_and(|n| n.trim().eq_ignore_ascii_case("description"))
        })
        .find_map(|meta| meta.value().attr("content"))
        .map(|content| collapse_whitespace(std::iter::once(content)))
        .filter(|d| !d.is_empty())
}

/// Visible text under `body`, skipping script-like elements.
fn body_text(body: ElementRef<'_>) -> String {
    let texts = body.descendants().filter_map(|node| {
        let Node::Text(text) = node.value() else {
            return None;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()))
        });
        (!hidden).then_some(&**text)
    });
    collapse_whitespace(texts)
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_and_meta_description() {
        let html = r#"<html><head>
            <title>  Example
              Domain </title>
            <meta charset="utf-8">
            <meta content="A page   about &amp; things" name="Description">
        </head><body><p>ignored body</p></body></html>"#;

        let summary = extract(html);
        assert_eq!(summary.title.as_deref(), Some("Example Domain"));
        assert_eq!(summary.description.as_deref(), Some("A page about & things"));
    }

    #[test]
    fn body_text_is_used_without_meta_description() {
        let html = "<html><head><title>T</title><style>p{}</style></head>\
                    <body><script>var x = 1;</script><h1>Hello</h1>\n<p>world  again</p>\
                    <!-- note --><noscript>enable js</noscript></body></html>";
        let summary = extract(html);
        assert_eq!(summary.description.as_deref(), Some("Hello world again"));
    }

    #[test]
    fn title_outside_head_is_ignored() {
        let html = "<html><head></head><body><svg><title>icon</title></svg></body></html>";
        let summary = extract(html);
        assert_eq!(summary.title, None);
        assert_eq!(summary.description.as_deref(), Some("icon"));
    }

    #[test]
    fn empty_document() {
        assert_eq!(extract(""), PageSummary::default());
    }

    #[test]
    fn single_quoted_attributes() {
        let html = "<head><meta name='description' content='quoted'></head>";
        assert_eq!(extract(html).description.as_deref(), Some("quoted"));
    }

    #[test]
    fn title_without_explicit_head() {
        let html = "<!doctype html><html><title>Docs</title><body>hi</body></html>";
        let summary = extract(html);
        assert_eq!(summary.title.as_deref(), Some("Docs"));
        assert_eq!(summary.description.as_deref(), Some("hi"));
    }

    #[test]
    fn angle_bracket_inside_attribute_value() {
        let html = r#"<html><head><meta name="description" content="a > b comparison"></head>
            <body><p>fallback</p></body></html>"#;
        assert_eq!(extract(html).description.as_deref(), Some("a > b comparison"));
    }

    #[test]
    fn numeric_entities_are_decoded() {
        let html = "<html><head><title>Caf&#233; &#8211; Menu</title></head><body></body></html>";
        let summary = extract(html);
        assert_eq!(summary.title.as_deref(), Some("Café – Menu"));
        assert_eq!(summary.description, None);
    }
}
