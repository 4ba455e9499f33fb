use scraper::{node::Node, ElementRef, Html, Selector};
use url::Url;

/// One anchor pulled out of a page, with its surrounding container text so
/// extraction heuristics can run without re-walking the DOM. All fields are
/// owned: the parsed document never crosses an await point.
#[derive(Debug, Clone)]
pub struct AnchorLink {
    pub href: String,
    pub text: String,
    pub context: String,
}

/// Flatten a document to plain text, one line per block-level element —
/// the shape every downstream line heuristic expects.
pub fn flatten_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut out = String::new();
    walk_text(doc.root_element(), &mut out);
    out
}

fn walk_text(el: ElementRef, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&text.text),
            Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = child_el.value().name();
                if matches!(name, "script" | "style" | "head") {
                    continue;
                }
                let block = matches!(
                    name,
                    "p" | "div" | "br" | "tr" | "li" | "table" | "ul" | "ol" | "h1" | "h2"
                        | "h3" | "h4" | "h5" | "h6" | "title"
                );
                if block {
                    end_line(out);
                }
                if matches!(name, "td" | "th") && !out.ends_with(char::is_whitespace) {
                    out.push(' ');
                }
                walk_text(child_el, out);
                if block {
                    end_line(out);
                }
            }
            _ => {}
        }
    }
}

fn end_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// All tables on the page as rows of cell text (td cells only, so header
/// rows built from th drop out on their own).
pub fn tables(html: &str) -> Vec<Vec<Vec<String>>> {
    let doc = Html::parse_document(html);
    let table_sel = Selector::parse("table").unwrap();
    let row_sel = Selector::parse("tr").unwrap();
    let cell_sel = Selector::parse("td").unwrap();

    doc.select(&table_sel)
        .map(|table| {
            table
                .select(&row_sel)
                .map(|row| {
                    row.select(&cell_sel)
                        .map(|cell| collapse_ws(&cell.text().collect::<String>()))
                        .collect()
                })
                .collect()
        })
        .collect()
}

/// Every `<a href>` on the page with the href resolved against `base_url`.
/// Anchors whose href cannot be resolved are dropped.
pub fn anchor_links(html: &str, base_url: &str) -> Vec<AnchorLink> {
    let doc = Html::parse_document(html);
    let anchor_sel = Selector::parse("a[href]").unwrap();
    let base = Url::parse(base_url).ok();

    doc.select(&anchor_sel)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let resolved = match &base {
                Some(base) => base.join(href).ok()?.to_string(),
                None => href.to_string(),
            };
            let context = a
                .parent()
                .and_then(ElementRef::wrap)
                .map(|parent| element_text(parent))
                .unwrap_or_default();
            Some(AnchorLink {
                href: resolved,
                text: collapse_ws(&a.text().collect::<String>()),
                context,
            })
        })
        .collect()
}

/// Text of one element with block boundaries preserved as newlines.
fn element_text(el: ElementRef) -> String {
    let mut out = String::new();
    walk_text(el, &mut out);
    out
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_breaks_on_blocks() {
        let text = flatten_text("<html><body><p>one</p><p>two</p><div>three</div></body></html>");
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn flatten_skips_script_and_style() {
        let text = flatten_text("<body><script>var x=1;</script><p>kept</p><style>p{}</style></body>");
        assert!(text.contains("kept"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("p{}"));
    }

    #[test]
    fn table_rows_to_cells() {
        let html = "<table>\
            <tr><th>Id</th><th>Name</th></tr>\
            <tr><td>MOPA</td><td>Monday Poster Session A</td></tr>\
            </table>";
        let tables = tables(html);
        assert_eq!(tables.len(), 1);
        // th-only header row yields no cells
        assert!(tables[0][0].is_empty());
        assert_eq!(tables[0][1], vec!["MOPA", "Monday Poster Session A"]);
    }

    #[test]
    fn anchors_resolve_relative_hrefs() {
        let links = anchor_links(
            r#"<p>Paper: <a href="pdf/MOPA001.pdf">MOPA001</a></p>"#,
            "https://proceedings.jacow.org/ipac2023/",
        );
        assert_eq!(links.len(), 1);
        assert_eq!(
            links[0].href,
            "https://proceedings.jacow.org/ipac2023/pdf/MOPA001.pdf"
        );
        assert_eq!(links[0].text, "MOPA001");
        assert!(links[0].context.contains("Paper:"));
    }

    #[test]
    fn absolute_hrefs_pass_through() {
        let links = anchor_links(
            r#"<a href="https://elsewhere.org/x.pdf">x</a>"#,
            "https://proceedings.jacow.org/ipac2023/",
        );
        assert_eq!(links[0].href, "https://elsewhere.org/x.pdf");
    }
}
