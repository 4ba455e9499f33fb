use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::config::Config;
use crate::fetch::Fetcher;
use crate::page;
use crate::records::{ConferenceRecord, SessionRecord};

static SESSION_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/session/(?:\d+-)?([A-Za-z0-9]+)/index\.html$").unwrap());

/// Discover a conference's sessions. Walks the known index-URL suffixes in
/// order, skipping frame-redirect stubs, then tries the table strategy, the
/// line-scan fallback, and finally the anchor-based template. No usable
/// structure anywhere means an empty list, never an error.
pub async fn resolve(
    fetcher: &Fetcher,
    config: &Config,
    conference: &ConferenceRecord,
) -> Vec<SessionRecord> {
    let root = normalized_root(&conference.root_url);

    for suffix in &config.session_suffixes {
        let url = format!("{}{}", root, suffix);
        let Some(html) = fetcher.fetch_page(&url).await else {
            continue;
        };
        let text = page::flatten_text(&html);
        if uses_frames(&text) {
            debug!("Frame stub at {}, trying next suffix", url);
            continue;
        }

        let mut sessions = sessions_from_table(&html, &root);
        if sessions.is_empty() {
            sessions = sessions_from_text(&text, &root);
        }
        if !sessions.is_empty() {
            info!(
                "Found {} sessions for {} via {}",
                sessions.len(),
                conference.code,
                suffix
            );
            return dedup_by_id(sessions);
        }
    }

    // Newer template: a session index page linking each session's own page.
    for suffix in &config.session_link_suffixes {
        let url = format!("{}{}", root, suffix);
        let Some(html) = fetcher.fetch_page(&url).await else {
            continue;
        };
        let sessions = sessions_from_links(&html, &url);
        if !sessions.is_empty() {
            info!(
                "Found {} sessions for {} via {}",
                sessions.len(),
                conference.code,
                suffix
            );
            return dedup_by_id(sessions);
        }
    }

    info!("No session structure found for {}", conference.code);
    Vec::new()
}

/// Frame-redirect stubs mention frames in their body text; the real
/// session list lives elsewhere.
pub fn uses_frames(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("frames") || lower.contains("your browser doesn't support them")
}

/// Structured-table strategy: cell 1 is the id, cell 2 the name. Accept a
/// row only if the id is fully uppercase and at least 4 characters, which
/// filters header and junk rows.
pub fn sessions_from_table(html: &str, root: &str) -> Vec<SessionRecord> {
    let mut sessions = Vec::new();
    for table in page::tables(html) {
        for row in table {
            if row.len() < 2 {
                continue;
            }
            let id = row[0].trim();
            let name = row[1].trim();
            if id.is_empty() || name.is_empty() || id.len() < 4 {
                continue;
            }
            if !is_all_uppercase(id) || id.contains("Table of Sessions") {
                continue;
            }
            sessions.push(session_record(id, name, root));
        }
    }
    sessions
}

/// Line-scan fallback for pages without a table: an uppercase alphabetic
/// line of 4+ chars is a session id, and the following line (unless it is
/// itself uppercase, which would chain two ids) is its name.
pub fn sessions_from_text(text: &str, root: &str) -> Vec<SessionRecord> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut sessions = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let is_id = line.len() >= 4
            && line.chars().all(|c| c.is_ascii_alphabetic())
            && is_all_uppercase(line);
        if is_id {
            if let Some(next) = lines.get(i + 1) {
                if !is_all_uppercase(next) {
                    sessions.push(session_record(line, next, root));
                }
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    sessions
}

/// Anchor-based template: collect hrefs shaped like a session index link
/// and keep them verbatim as the session URLs.
pub fn sessions_from_links(html: &str, base_url: &str) -> Vec<SessionRecord> {
    page::anchor_links(html, base_url)
        .into_iter()
        .filter_map(|link| {
            let caps = SESSION_PATH_RE.captures(&link.href)?;
            let id = caps[1].to_uppercase();
            if link.text.is_empty() {
                return None;
            }
            Some(SessionRecord {
                display_name: format!("{} - {}", id, link.text),
                id,
                url: link.href,
            })
        })
        .collect()
}

/// At least one cased char and none lowercase (str.isupper semantics).
fn is_all_uppercase(s: &str) -> bool {
    s.chars().any(|c| c.is_uppercase()) && !s.chars().any(|c| c.is_lowercase())
}

fn session_record(id: &str, name: &str, root: &str) -> SessionRecord {
    SessionRecord {
        id: id.to_string(),
        display_name: format!("{} - {}", id, name),
        url: format!("{}html/{}.htm", root, id.to_lowercase()),
    }
}

fn dedup_by_id(sessions: Vec<SessionRecord>) -> Vec<SessionRecord> {
    let mut seen = HashSet::new();
    sessions
        .into_iter()
        .filter(|s| seen.insert(s.id.clone()))
        .collect()
}

fn normalized_root(root: &str) -> String {
    if root.ends_with('/') {
        root.to_string()
    } else {
        format!("{}/", root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "https://proceedings.jacow.org/ipac2023/";

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.htm", name)).unwrap()
    }

    #[test]
    fn table_rows_become_sessions_in_order() {
        let html = fixture("session_table");
        let sessions = sessions_from_table(&html, ROOT);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, "MOPA");
        assert_eq!(sessions[0].display_name, "MOPA - Monday Poster Session A");
        assert_eq!(
            sessions[0].url,
            "https://proceedings.jacow.org/ipac2023/html/mopa.htm"
        );
        assert_eq!(sessions[1].id, "TUPB");
    }

    #[test]
    fn header_and_junk_rows_are_filtered() {
        let html = "<table>\
            <tr><td>Table of Sessions</td><td>x</td></tr>\
            <tr><td>MO</td><td>too short</td></tr>\
            <tr><td>MixedCase</td><td>not an id</td></tr>\
            <tr><td>WEPL</td><td>Wednesday Posters</td></tr>\
            </table>";
        let sessions = sessions_from_table(html, ROOT);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "WEPL");
    }

    #[test]
    fn line_scan_pairs_ids_with_names() {
        let text = "Sessions\nMOPA\nMonday Poster Session A\nTUPB\nTuesday Poster Session B\n";
        let sessions = sessions_from_text(text, ROOT);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, "MOPA");
        assert_eq!(sessions[1].display_name, "TUPB - Tuesday Poster Session B");
    }

    #[test]
    fn line_scan_does_not_chain_two_ids() {
        // TUPB directly after MOPA: MOPA must not take TUPB as its name.
        let text = "MOPA\nTUPB\nTuesday Poster Session B\n";
        let sessions = sessions_from_text(text, ROOT);
        assert!(sessions.iter().all(|s| s.display_name != "MOPA - TUPB"));
    }

    #[test]
    fn link_template_keeps_discovered_urls() {
        let html = fixture("session_links");
        let base = "https://proceedings.jacow.org/ipac2023/session/index.html";
        let sessions = sessions_from_links(&html, base);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, "MOPA");
        assert_eq!(
            sessions[0].url,
            "https://proceedings.jacow.org/ipac2023/session/238-mopa/index.html"
        );
    }

    #[test]
    fn resolver_is_idempotent_on_static_input() {
        let html = fixture("session_table");
        let first = sessions_from_table(&html, ROOT);
        let second = sessions_from_table(&html, ROOT);
        assert_eq!(first, second);
    }

    #[test]
    fn frame_stub_is_detected() {
        let html = fixture("session_frames");
        assert!(uses_frames(&crate::page::flatten_text(&html)));
    }

    #[test]
    fn empty_page_yields_no_sessions() {
        assert!(sessions_from_table("<html><body></body></html>", ROOT).is_empty());
        assert!(sessions_from_text("", ROOT).is_empty());
        assert!(sessions_from_links("<html></html>", ROOT).is_empty());
    }

    #[test]
    fn duplicate_ids_collapse_keeping_first() {
        let sessions = vec![
            session_record("MOPA", "first", ROOT),
            session_record("TUPB", "second", ROOT),
            session_record("MOPA", "third", ROOT),
        ];
        let deduped = dedup_by_id(sessions);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].display_name, "MOPA - first");
    }
}
