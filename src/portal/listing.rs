//! Listing page parsing.
//!
//! Row containers and the "next page" control are both located by trying an
//! ordered list of candidates, because the portal markup changes between
//! releases. The first candidate that matches wins.

use scraper::{ElementRef, Html, Selector};

/// Row container selectors in priority order.
pub const ROW_SELECTORS: &[&str] = &[
    "div.list-group-item",
    "div.nota-item",
    "tr",
    "div[data-nota]",
    ".resultado-nota",
];

/// Selector for download links inside a row.
const DOWNLOAD_LINK_SELECTOR: &str = r#"a[href*="Download"]"#;

/// One result row as seen on the listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingRow {
    /// Visible text, whitespace-collapsed.
    pub text: String,
    /// `href` values of download links, in document order.
    pub download_links: Vec<String>,
}

/// A clickable "next page" anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextControl {
    /// Position among all `<a>` elements of the document.
    pub anchor_index: usize,
    pub href: Option<String>,
    /// Name of the candidate rule that matched.
    pub rule: &'static str,
}

/// Parsed view of the current listing page.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub rows: Vec<ListingRow>,
    /// Row selector that produced `rows`, if any matched.
    pub row_selector: Option<&'static str>,
    pub next: Option<NextControl>,
}

impl ListingPage {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

type AnchorRule = fn(&ElementRef<'_>) -> bool;

/// "Next page" candidate rules in priority order.
const NEXT_RULES: &[(&str, AnchorRule)] = &[
    ("page-param-arrow", is_page_param_arrow),
    ("tooltip-title", has_tooltip_next),
    ("title", has_title_next),
    ("text", has_text_next),
    ("pagination-class", has_pagination_class),
    ("list-item-next", is_in_next_list_item),
];

const NEXT_LABEL: &str = "Próxima";

/// Parse a listing page into rows and an optional next control.
pub fn parse_listing(html: &str) -> ListingPage {
    let document = Html::parse_document(html);
    let (rows, row_selector) = extract_rows(&document);
    let next = find_next_control(&document);

    ListingPage {
        rows,
        row_selector,
        next,
    }
}

fn extract_rows(document: &Html) -> (Vec<ListingRow>, Option<&'static str>) {
    let Ok(link_selector) = Selector::parse(DOWNLOAD_LINK_SELECTOR) else {
        return (Vec::new(), None);
    };

    for &candidate in ROW_SELECTORS {
        let Ok(selector) = Selector::parse(candidate) else {
            continue;
        };

        let rows: Vec<ListingRow> = document
            .select(&selector)
            .filter(|el| candidate != "tr" || has_data_cell(el))
            .map(|el| ListingRow {
                text: visible_text(&el),
                download_links: el
                    .select(&link_selector)
                    .filter_map(|a| a.value().attr("href"))
                    .map(str::to_string)
                    .collect(),
            })
            .collect();

        if !rows.is_empty() {
            return (rows, Some(candidate));
        }
    }

    (Vec::new(), None)
}

// Header rows only carry <th>.
fn has_data_cell(row: &ElementRef<'_>) -> bool {
    row.children()
        .filter_map(ElementRef::wrap)
        .any(|child| child.value().name() == "td")
}

fn visible_text(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn find_next_control(document: &Html) -> Option<NextControl> {
    let selector = Selector::parse("a").ok()?;
    let anchors: Vec<ElementRef<'_>> = document.select(&selector).collect();

    NEXT_RULES.iter().find_map(|&(rule, matches)| {
        anchors
            .iter()
            .enumerate()
            .find(|(_, a)| matches(a) && is_live(a))
            .map(|(index, a)| NextControl {
                anchor_index: index,
                href: a.value().attr("href").map(str::to_string),
                rule,
            })
    })
}

fn is_page_param_arrow(a: &ElementRef<'_>) -> bool {
    let href_matches = a
        .value()
        .attr("href")
        .is_some_and(|href| href.contains("pg="));
    href_matches
        && a.descendants().filter_map(ElementRef::wrap).any(|child| {
            child.value().name() == "i" && child.value().has_class("fa-angle-right", CASE_SENSITIVE)
        })
}

fn has_tooltip_next(a: &ElementRef<'_>) -> bool {
    a.value().attr("data-original-title") == Some(NEXT_LABEL)
}

fn has_title_next(a: &ElementRef<'_>) -> bool {
    a.value()
        .attr("title")
        .is_some_and(|title| title.contains(NEXT_LABEL))
}

fn has_text_next(a: &ElementRef<'_>) -> bool {
    a.text().any(|t| t.contains(NEXT_LABEL))
}

fn has_pagination_class(a: &ElementRef<'_>) -> bool {
    a.value().has_class("pagination-next", CASE_SENSITIVE)
}

fn is_in_next_list_item(a: &ElementRef<'_>) -> bool {
    a.parent()
        .and_then(ElementRef::wrap)
        .is_some_and(|li| li.value().name() == "li" && li.value().has_class("next", CASE_SENSITIVE))
}

const CASE_SENSITIVE: scraper::CaseSensitivity = scraper::CaseSensitivity::CaseSensitive;

/// Static approximation of "visible and enabled".
fn is_live(a: &ElementRef<'_>) -> bool {
    std::iter::once(*a)
        .chain(a.ancestors().filter_map(ElementRef::wrap))
        .all(|el| {
            let v = el.value();
            let hidden_style = v.attr("style").is_some_and(|style| {
                let style = style.replace(' ', "").to_ascii_lowercase();
                style.contains("display:none") || style.contains("visibility:hidden")
            });
            v.attr("hidden").is_none()
                && v.attr("aria-disabled") != Some("true")
                && !v.has_class("disabled", CASE_SENSITIVE)
                && !hidden_style
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &str = "35123456789012345678901234567890123456789012345678";
    const KEY_B: &str = "31987654321098765432109876543210987654321098765432";

    fn page(body: &str) -> String {
        format!("<html><body>{}</body></html>", body)
    }

    #[test]
    fn test_list_group_rows_take_priority() {
        let html = page(&format!(
            r#"<div class="list-group-item">Nota 1 <a href="/Notas/Download/NFSe/{KEY_A}">XML</a></div>
               <div class="list-group-item">Nota 2 {KEY_B}</div>
               <table><tr><td>ignored</td></tr></table>"#
        ));
        let listing = parse_listing(&html);

        assert_eq!(listing.row_selector, Some("div.list-group-item"));
        assert_eq!(listing.rows.len(), 2);
        assert_eq!(
            listing.rows[0].download_links,
            vec![format!("/Notas/Download/NFSe/{KEY_A}")]
        );
        assert!(listing.rows[1].text.contains(KEY_B));
    }

    #[test]
    fn test_table_rows_skip_header() {
        let html = page(&format!(
            r#"<table>
                 <tr><th>Chave</th><th>Valor</th></tr>
                 <tr><td>{KEY_A}</td><td>10,00</td></tr>
               </table>"#
        ));
        let listing = parse_listing(&html);

        assert_eq!(listing.row_selector, Some("tr"));
        assert_eq!(listing.rows.len(), 1);
        assert_eq!(listing.rows[0].text, format!("{KEY_A} 10,00"));
    }

    #[test]
    fn test_no_rows() {
        let listing = parse_listing(&page("<p>Nenhum registro encontrado</p>"));
        assert!(listing.rows.is_empty());
        assert_eq!(listing.row_selector, None);
        assert!(!listing.has_next());
    }

    #[test]
    fn test_next_control_by_arrow_icon() {
        let html = page(
            r#"<a href="/home">Home</a>
               <ul class="pagination">
                 <li><a href="?pg=1">1</a></li>
                 <li><a href="?pg=2"><i class="fa fa-angle-right"></i></a></li>
               </ul>"#,
        );
        let next = parse_listing(&html).next.expect("next control");
        assert_eq!(next.anchor_index, 2);
        assert_eq!(next.href.as_deref(), Some("?pg=2"));
        assert_eq!(next.rule, "page-param-arrow");
    }

    #[test]
    fn test_next_control_rule_order() {
        // The title rule outranks the text rule even when it appears later.
        let html = page(
            r#"<a href="?x=1">Próxima</a>
               <a href="?x=2" title="Próxima página">&gt;</a>"#,
        );
        let next = parse_listing(&html).next.expect("next control");
        assert_eq!(next.rule, "title");
        assert_eq!(next.anchor_index, 1);
    }

    #[test]
    fn test_disabled_next_is_not_live() {
        let html = page(
            r##"<ul class="pagination">
                 <li class="next disabled"><a href="#">Próxima</a></li>
               </ul>
               <a style="display: none" class="pagination-next" href="?pg=9">next</a>"##,
        );
        assert!(parse_listing(&html).next.is_none());
    }

    #[test]
    fn test_next_in_list_item() {
        let html = page(r#"<ul><li class="next"><a href="?page=3">&raquo;</a></li></ul>"#);
        let next = parse_listing(&html).next.expect("next control");
        assert_eq!(next.rule, "list-item-next");
    }
}
