use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::classify::{UrlClassifier, Verdict};
use crate::config::Config;
use crate::extract;
use crate::fetch::{ArtifactProber, Fetcher};
use crate::page;
use crate::records::{
    ArtifactInfo, ArtifactKind, Artifacts, PaperRecord, SessionRecord,
};

static NEXT_PAPER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z]{4,}\d+").unwrap());

/// Keywords that close a paper's content window when no further paper id
/// follows on the page.
const END_MARKERS: &[&str] = &["DOI:", "Received:", "Accepted:", "Paper:", "Cite:", "Export:"];

/// Fetch one session page and turn it into paper records, availability
/// probed. A missing page yields an empty list.
pub async fn assemble_session(
    fetcher: &Fetcher,
    config: &Config,
    conf_code: &str,
    session: &SessionRecord,
) -> Vec<PaperRecord> {
    let Some(html) = fetcher.fetch_page(&session.url).await else {
        return Vec::new();
    };
    let text = page::flatten_text(&html);
    let mut records = build_session_records(&text, &session.id, conf_code, config);
    for record in &mut records {
        probe_artifacts(fetcher, record).await;
    }
    records
}

/// The pure half of assembly: candidate scan, window slicing, extraction,
/// URL computation. Availability stays false until probing.
pub fn build_session_records(
    page_text: &str,
    session_id: &str,
    conf_code: &str,
    config: &Config,
) -> Vec<PaperRecord> {
    let ids = candidate_ids(page_text, session_id);
    if ids.is_empty() {
        warn!("No papers found in session {}", session_id);
        return Vec::new();
    }
    info!("Found {} potential papers in session {}", ids.len(), session_id);

    ids.iter()
        .map(|paper_id| {
            let window = match paper_window(page_text, paper_id) {
                Some(w) => w,
                None => {
                    warn!("Could not find paper section for {}", paper_id);
                    ""
                }
            };
            build_record(window, paper_id, session_id, conf_code, config)
        })
        .collect()
}

/// All `<sessionId><digits>` occurrences on the page, de-duplicated and
/// sorted by paper number.
pub fn candidate_ids(page_text: &str, session_id: &str) -> Vec<String> {
    let Ok(re) = Regex::new(&format!(r"{}(\d+)", regex::escape(session_id))) else {
        return Vec::new();
    };
    let mut numbers: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for caps in re.captures_iter(page_text) {
        let num = caps[1].to_string();
        if seen.insert(num.clone()) {
            numbers.push(num);
        }
    }
    numbers.sort_by_key(|n| n.parse::<u32>().unwrap_or(u32::MAX));
    numbers
        .into_iter()
        .map(|n| format!("{}{}", session_id, n))
        .collect()
}

/// The content window for one paper: from just after its first occurrence
/// to the next paper-id-shaped token, or the nearest end marker when no
/// further id follows, or the end of the page.
pub fn paper_window<'a>(page_text: &'a str, paper_id: &str) -> Option<&'a str> {
    let pos = page_text.find(paper_id)?;
    let remaining = &page_text[pos + paper_id.len()..];

    if let Some(m) = NEXT_PAPER_RE.find(remaining) {
        return Some(&remaining[..m.start()]);
    }

    let end = END_MARKERS
        .iter()
        .filter_map(|marker| remaining.find(marker))
        .min()
        .unwrap_or(remaining.len());
    Some(&remaining[..end])
}

fn build_record(
    window: &str,
    paper_id: &str,
    session_id: &str,
    conf_code: &str,
    config: &Config,
) -> PaperRecord {
    let details = extract::extract_window(window, config);
    PaperRecord {
        paper_id: paper_id.to_string(),
        title: details.title,
        authors: details.authors,
        institutions: details.institutions,
        abstract_text: details.abstract_text,
        artifacts: Artifacts {
            paper: ArtifactInfo::unprobed(config.artifact_url(
                ArtifactKind::Paper,
                conf_code,
                paper_id,
            )),
            presentation: ArtifactInfo::unprobed(config.artifact_url(
                ArtifactKind::Presentation,
                conf_code,
                paper_id,
            )),
            poster: ArtifactInfo::unprobed(config.artifact_url(
                ArtifactKind::Poster,
                conf_code,
                paper_id,
            )),
        },
        doi: config.doi_url(conf_code, paper_id),
        session_id: session_id.to_string(),
        page_number: details.page_number,
    }
}

/// Probe each artifact slot independently. A failed probe marks the slot
/// unavailable; it never fails the record.
pub async fn probe_artifacts<P: ArtifactProber>(prober: &P, record: &mut PaperRecord) {
    for kind in ArtifactKind::ALL {
        let url = record.artifacts.get(kind).url.clone();
        record.artifacts.get_mut(kind).available = prober.artifact_exists(&url).await;
    }
}

/// A paper found on the anchor-based site template, where each paper has
/// its own PDF link instead of a shared text block.
#[derive(Debug, Clone, Serialize)]
pub struct IndividualPaper {
    pub code: String,
    pub title: String,
    pub authors: Vec<String>,
    pub url: String,
    pub session: String,
}

/// Individual-paper variant: walk PDF anchors, keep only links the
/// classifier accepts as individual papers, de-duplicated by absolute URL.
pub fn individual_papers_from_page(
    html: &str,
    base_url: &str,
    classifier: &UrlClassifier,
) -> Vec<IndividualPaper> {
    let mut seen = HashSet::new();
    page::anchor_links(html, base_url)
        .into_iter()
        .filter_map(|link| {
            if !link.href.to_lowercase().ends_with(".pdf") {
                return None;
            }
            if classifier.classify(&link.href) != Verdict::Individual {
                return None;
            }
            if !seen.insert(link.href.clone()) {
                return None;
            }
            let code = paper_code_from_url(&link.href);
            Some(IndividualPaper {
                title: extract::title_from_context(&link.text, &link.context, &code),
                authors: extract::authors_from_context(&link.context),
                session: session_from_url(base_url),
                code,
                url: link.href,
            })
        })
        .collect()
}

/// Filename stem of a PDF URL, e.g. ".../pdf/MOPA001.pdf" -> "MOPA001".
fn paper_code_from_url(url: &str) -> String {
    let filename = url.rsplit('/').next().unwrap_or(url);
    filename
        .strip_suffix(".pdf")
        .or_else(|| filename.strip_suffix(".PDF"))
        .unwrap_or(filename)
        .to_string()
}

/// Session code from a session page URL, e.g.
/// ".../session/238-mopa/index.html" -> "MOPA".
fn session_from_url(url: &str) -> String {
    let Some((_, tail)) = url.split_once("/session/") else {
        return "unknown".to_string();
    };
    let segment = tail.split('/').next().unwrap_or("");
    let code = segment.split_once('-').map(|(_, c)| c).unwrap_or(segment);
    if code.is_empty() {
        "unknown".to_string()
    } else {
        code.to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config() -> Config {
        Config::default()
    }

    #[test]
    fn candidates_dedup_and_sort_numerically() {
        let text = "MOPA010 x MOPA002 y MOPA002 z MOPA010 MOPA001";
        assert_eq!(
            candidate_ids(text, "MOPA"),
            vec!["MOPA001", "MOPA002", "MOPA010"]
        );
    }

    #[test]
    fn window_ends_before_next_paper() {
        let text = "MOPA001 Title A by someone MOPA002 Title B";
        let window = paper_window(text, "MOPA001").unwrap();
        assert_eq!(window, " Title A by someone ");
        assert!(!window.contains("MOPA002"));
        assert!(!window.contains("Title B"));
    }

    #[test]
    fn window_ends_at_nearest_marker_when_last_paper() {
        let text = "MOPA001 Title A\nsome text\nReceived: 2023 DOI: x";
        let window = paper_window(text, "MOPA001").unwrap();
        assert!(window.contains("Title A"));
        assert!(!window.contains("Received:"));
        assert!(!window.contains("DOI:"));
    }

    #[test]
    fn window_runs_to_end_without_markers() {
        let text = "MOPA001 only paper here";
        assert_eq!(paper_window(text, "MOPA001").unwrap(), " only paper here");
    }

    #[test]
    fn missing_id_yields_no_window() {
        assert!(paper_window("nothing here", "MOPA001").is_none());
    }

    #[test]
    fn records_carry_computed_urls_and_doi() {
        let text = "MOPA001\nA Long Enough Paper Title\n";
        let records = build_session_records(text, "MOPA", "ipac2023", &config());
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(
            r.artifacts.paper.url,
            "https://proceedings.jacow.org/ipac2023/papers/mopa001.pdf"
        );
        assert_eq!(
            r.artifacts.presentation.url,
            "https://proceedings.jacow.org/ipac2023/talks/mopa001_talk.pdf"
        );
        assert_eq!(
            r.artifacts.poster.url,
            "https://proceedings.jacow.org/ipac2023/posters/mopa001_poster.pdf"
        );
        assert_eq!(r.doi, "https://doi.org/10.18429/JACoW-IPAC2023-MOPA001");
        assert_eq!(r.session_id, "MOPA");
        assert!(r.artifacts.iter().all(|(_, a)| !a.available));
    }

    #[test]
    fn session_fixture_assembles_two_papers() {
        let html = std::fs::read_to_string("tests/fixtures/session_mopa.htm").unwrap();
        let text = page::flatten_text(&html);
        let records = build_session_records(&text, "MOPA", "ipac2023", &config());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].paper_id, "MOPA001");
        assert!(records[0].title.contains("Injection Line"));
        assert!(!records[0].title.contains("Cryomodule"));
        assert_eq!(records[1].paper_id, "MOPA002");
        assert!(records[1].title.contains("Cryomodule"));
    }

    struct StubProber {
        available: HashMap<String, bool>,
    }

    impl ArtifactProber for StubProber {
        async fn artifact_exists(&self, url: &str) -> bool {
            *self.available.get(url).unwrap_or(&false)
        }
    }

    #[tokio::test]
    async fn missing_artifact_probes_false_but_record_survives() {
        let mut records =
            build_session_records("MOPA001\nSome Paper Title Here\n", "MOPA", "ipac2023", &config());
        let record = &mut records[0];

        // Only the paper PDF exists; talk and poster 404.
        let prober = StubProber {
            available: HashMap::from([(record.artifacts.paper.url.clone(), true)]),
        };
        probe_artifacts(&prober, record).await;

        assert!(record.artifacts.paper.available);
        assert!(!record.artifacts.presentation.available);
        assert!(!record.artifacts.poster.available);
        assert_eq!(record.paper_id, "MOPA001");
    }

    #[test]
    fn individual_variant_filters_and_dedups() {
        let classifier = UrlClassifier::new(&config());
        let html = std::fs::read_to_string("tests/fixtures/session_anchors.htm").unwrap();
        let base = "https://proceedings.jacow.org/ipac2023/session/238-mopa/index.html";
        let papers = individual_papers_from_page(&html, base, &classifier);

        let urls: Vec<&str> = papers.iter().map(|p| p.url.as_str()).collect();
        assert!(urls.iter().any(|u| u.ends_with("mopa001.pdf")));
        // proceedings volume link filtered out by the classifier
        assert!(!urls.iter().any(|u| u.contains("proceedings_volume")));
        // duplicate anchor collapsed
        assert_eq!(
            urls.iter().filter(|u| u.ends_with("mopa001.pdf")).count(),
            1
        );
        assert!(papers.iter().all(|p| p.session == "MOPA"));
    }

    #[test]
    fn paper_code_strips_extension() {
        assert_eq!(paper_code_from_url("https://x/pdf/MOPA001.pdf"), "MOPA001");
    }

    #[test]
    fn session_code_from_url_drops_number_prefix() {
        assert_eq!(
            session_from_url("https://x/ipac2023/session/238-mopa/index.html"),
            "MOPA"
        );
        assert_eq!(session_from_url("https://x/no-session/"), "unknown");
    }
}
