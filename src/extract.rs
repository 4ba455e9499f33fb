use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;

static PAGE_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{1,3}$").unwrap());
static TITLE_TAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(DOI:|Cite:|Author:|Abstract:).*").unwrap());
static MARKER_AUTHORS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"■\s*([^■\n]+)").unwrap());
static LABEL_AUTHORS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*(?:Authors?|By):\s*(.+)$").unwrap());

/// Line-start labels that mark metadata, never abstract text.
const METADATA_PREFIXES: &[&str] = &["Funding:", "DOI:", "Received:", "Accepted:"];

/// Prefixes that rule a text block out as a title in link-context mode.
const NON_TITLE_PREFIXES: &[&str] = &["author", "doi", "cite"];

/// Fields recovered from a paper's content window. Absent fields are empty,
/// never an error: the input is whatever the site happens to serve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperDetails {
    pub title: String,
    pub page_number: Option<String>,
    pub authors: Vec<String>,
    pub institutions: Vec<String>,
    pub abstract_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    PageNumber,
    Institution,
    Authors,
    Metadata,
    Abstract,
    Noise,
}

/// Classify one line of a content window. Institution check runs before the
/// comma-author check: organization names often contain commas too.
fn classify_line(line: &str, config: &Config) -> LineKind {
    if PAGE_NUMBER_RE.is_match(line) {
        return LineKind::PageNumber;
    }
    if config.institution_keywords.iter().any(|k| line.contains(k.as_str())) {
        return LineKind::Institution;
    }
    let lower = line.to_lowercase();
    if line.contains(',')
        && line.split(',').count() > 1
        && !config.metadata_keywords.iter().any(|k| lower.contains(k.as_str()))
    {
        return LineKind::Authors;
    }
    if METADATA_PREFIXES.iter().any(|p| line.starts_with(p)) {
        return LineKind::Metadata;
    }
    if line.len() > 20 {
        return LineKind::Abstract;
    }
    LineKind::Noise
}

/// Window mode: extract all fields from the dense text block between one
/// paper id and the next (full session-page template).
pub fn extract_window(window: &str, config: &Config) -> PaperDetails {
    let lines: Vec<&str> = window
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut details = PaperDetails::default();

    // Title: first line that is not a bare page number.
    let title_idx = lines.iter().position(|l| !PAGE_NUMBER_RE.is_match(l));
    if let Some(idx) = title_idx {
        details.title = lines[idx].to_string();
    }

    details.page_number = lines
        .iter()
        .find(|l| PAGE_NUMBER_RE.is_match(l))
        .map(|l| l.to_string());

    let mut abstract_lines: Vec<&str> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if Some(i) == title_idx {
            continue;
        }
        match classify_line(line, config) {
            LineKind::Institution => details.institutions.push(line.to_string()),
            LineKind::Authors => details.authors.extend(
                line.split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(String::from),
            ),
            LineKind::Abstract => abstract_lines.push(line),
            LineKind::PageNumber | LineKind::Metadata | LineKind::Noise => {}
        }
    }
    details.abstract_text = abstract_lines.join(" ");

    details
}

/// Link-context mode: recover a title for an anchor-based paper link.
/// Ordered waterfall, first hit wins, bare code as the floor.
pub fn title_from_context(link_text: &str, context: &str, paper_code: &str) -> String {
    // (a) the link's own text, when it says more than the code itself
    if !link_text.is_empty() && link_text != paper_code && link_text.len() > paper_code.len() {
        return clean_title(link_text);
    }

    // (b) "<code> <title...>" inside the enclosing container
    if !paper_code.is_empty() {
        let code_re = Regex::new(&format!(r"{}\s+(.+)", regex::escape(paper_code)));
        if let Ok(re) = code_re {
            if let Some(caps) = re.captures(context) {
                let title = clean_title(&caps[1]);
                if !title.is_empty() {
                    return title;
                }
            }
        }
    }

    // (c) first later text block that is long enough and not a label
    let mut past_code = paper_code.is_empty();
    for line in context.lines().map(str::trim) {
        if !past_code {
            past_code = line.contains(paper_code);
            continue;
        }
        let lower = line.to_lowercase();
        if line.len() > 10 && !NON_TITLE_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            let title = clean_title(line);
            if !title.is_empty() {
                return title;
            }
        }
    }

    // (d) nothing better than the code itself
    paper_code.to_string()
}

/// Link-context mode: author run following a marker glyph or label.
/// Runs longer than 200 chars are noise, not author lists.
pub fn authors_from_context(context: &str) -> Vec<String> {
    let captured = MARKER_AUTHORS_RE
        .captures(context)
        .or_else(|| LABEL_AUTHORS_RE.captures(context))
        .map(|caps| caps[1].trim().to_string());

    let Some(run) = captured else {
        return Vec::new();
    };
    let run = collapse_ws(&run);
    if run.is_empty() || run.len() > 200 {
        return Vec::new();
    }
    run.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect()
}

/// Drop trailing metadata labels, collapse whitespace, trim punctuation.
pub fn clean_title(raw: &str) -> String {
    let cut = TITLE_TAIL_RE.replace(raw, "");
    collapse_ws(&cut).trim_matches(['.', ',', ';', ':']).to_string()
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::default()
    }

    #[test]
    fn window_fields_partition() {
        let window = "\
Design of the New Injection Line
J. Smith, A. Johnson, B. Wilson
CERN, Geneva, Switzerland
12
The new injection line improves capture efficiency by a factor of two over the previous design.
Funding: authority grant 42\n";
        let d = extract_window(window, &config());
        assert_eq!(d.title, "Design of the New Injection Line");
        assert_eq!(d.authors, vec!["J. Smith", "A. Johnson", "B. Wilson"]);
        assert_eq!(d.institutions, vec!["CERN, Geneva, Switzerland"]);
        assert_eq!(d.page_number.as_deref(), Some("12"));
        assert!(d.abstract_text.starts_with("The new injection line"));
        assert!(!d.abstract_text.contains("Funding"));
    }

    #[test]
    fn authors_and_institutions_are_disjoint() {
        let window = "\
Title Line Long Enough
P. One, Q. Two
Paul Scherrer Institute, Villigen
National Laboratory for Science, Somewhere\n";
        let d = extract_window(window, &config());
        for inst in &d.institutions {
            assert!(!d.authors.contains(inst));
        }
        // comma-bearing institution lines stay institutions
        assert_eq!(d.institutions.len(), 2);
        assert_eq!(d.authors, vec!["P. One", "Q. Two"]);
    }

    #[test]
    fn leading_page_number_is_not_a_title() {
        let d = extract_window("9\nActual Title Here\n", &config());
        assert_eq!(d.title, "Actual Title Here");
        assert_eq!(d.page_number.as_deref(), Some("9"));
    }

    #[test]
    fn empty_window_yields_empty_fields() {
        let d = extract_window("", &config());
        assert!(d.title.is_empty());
        assert!(d.authors.is_empty());
        assert!(d.institutions.is_empty());
        assert!(d.abstract_text.is_empty());
        assert!(d.page_number.is_none());
    }

    #[test]
    fn metadata_lines_never_become_authors() {
        let d = extract_window(
            "Some Title Of Paper\nReceived: 2023-05-01, Accepted: 2023-05-20\n",
            &config(),
        );
        assert!(d.authors.is_empty());
    }

    #[test]
    fn title_prefers_link_text() {
        let title = title_from_context(
            "Design and Optimization of the Thing",
            "MOPA001 ignored context",
            "MOPA001",
        );
        assert_eq!(title, "Design and Optimization of the Thing");
    }

    #[test]
    fn title_from_code_pattern_in_context() {
        let title = title_from_context(
            "MOPA001",
            "MOPA001 Beam Loss Studies at High Current DOI: 10.18429/x",
            "MOPA001",
        );
        assert_eq!(title, "Beam Loss Studies at High Current");
    }

    #[test]
    fn title_falls_back_to_code() {
        assert_eq!(title_from_context("", "", "MOPA001"), "MOPA001");
    }

    #[test]
    fn title_skips_label_lines_in_forward_scan() {
        // "." after the code makes strategy (b) clean to empty, so the
        // sibling scan has to do the work and skip the author label line.
        let context = "MOPA001 .\nauthor: someone quite long indeed\nA Reasonably Long Real Title";
        let title = title_from_context("MOPA001", context, "MOPA001");
        assert_eq!(title, "A Reasonably Long Real Title");
    }

    #[test]
    fn authors_after_marker_glyph() {
        let authors = authors_from_context("■ J. Smith, A. Johnson, B. Wilson");
        assert_eq!(authors, vec!["J. Smith", "A. Johnson", "B. Wilson"]);
    }

    #[test]
    fn authors_after_label() {
        let authors = authors_from_context("Authors: C. Lee, D. Park");
        assert_eq!(authors, vec!["C. Lee", "D. Park"]);
    }

    #[test]
    fn oversized_author_run_is_noise() {
        let blob = format!("Authors: {}", "x".repeat(250));
        assert!(authors_from_context(&blob).is_empty());
    }

    #[test]
    fn clean_title_strips_tail_and_punctuation() {
        assert_eq!(
            clean_title("  Beam   Dynamics Overview. DOI: 10.1/x "),
            "Beam Dynamics Overview"
        );
    }
}
