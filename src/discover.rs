use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{info, warn};

use crate::assemble;
use crate::config::Config;
use crate::fetch::Fetcher;
use crate::page;
use crate::records::{ConferenceData, ConferenceRecord, CrawlStats, SessionRecord};
use crate::sessions;

// No word boundaries: years are usually glued to the series name, as in
// "ipac2023".
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(19[8-9]\d|20[0-5]\d)").unwrap());

/// Filters and windowing for a crawl run.
#[derive(Debug, Default, Clone)]
pub struct CrawlOptions {
    pub year: Option<i32>,
    pub conference: Option<String>,
    pub start_from: usize,
    pub max_conferences: Option<usize>,
}

/// Enumerate conferences from the proceedings index page.
pub async fn discover(fetcher: &Fetcher, config: &Config) -> Vec<ConferenceRecord> {
    let Some(html) = fetcher.fetch_page(&config.index_url).await else {
        warn!("Could not fetch proceedings index {}", config.index_url);
        return Vec::new();
    };
    let conferences = conferences_from_index(&html, config);
    info!("Found {} conferences on the proceedings index", conferences.len());
    conferences
}

/// Pure index parsing: anchors pointing at the proceedings host and ending
/// with "/" are conference roots; the code is the last path segment.
pub fn conferences_from_index(html: &str, config: &Config) -> Vec<ConferenceRecord> {
    let mut seen = HashSet::new();
    page::anchor_links(html, &config.index_url)
        .into_iter()
        .filter_map(|link| {
            if !link.href.contains(&config.proceedings_host) || !link.href.ends_with('/') {
                return None;
            }
            let name = link.text.trim().to_string();
            if name.len() <= 2 {
                return None;
            }
            let code = link
                .href
                .trim_end_matches('/')
                .rsplit('/')
                .next()?
                .to_string();
            if code.is_empty() || !seen.insert(code.clone()) {
                return None;
            }
            let discovered_year = extract_year(&format!("{} {}", link.href, name));
            Some(ConferenceRecord {
                name,
                code,
                root_url: link.href,
                discovered_year,
            })
        })
        .collect()
}

/// Four-digit year anywhere in the text, 1980-2059 window.
pub fn extract_year(text: &str) -> Option<i32> {
    YEAR_RE.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Structure-compatibility check: a conference qualifies when any known
/// session-index URL serves a page with either a session link or a table.
/// Non-conforming conferences are skipped, not failed.
pub async fn check_structure(
    fetcher: &Fetcher,
    config: &Config,
    conference: &ConferenceRecord,
) -> bool {
    let root = ensure_slash(&conference.root_url);
    for suffix in config
        .session_suffixes
        .iter()
        .chain(config.session_link_suffixes.iter())
    {
        let url = format!("{}{}", root, suffix);
        let Some(html) = fetcher.fetch_page(&url).await else {
            continue;
        };
        if !page::tables(&html).is_empty() {
            return true;
        }
        let has_session_link = page::anchor_links(&html, &url)
            .iter()
            .any(|a| a.href.contains("sessi0n") || a.href.contains("/session/"));
        if has_session_link {
            return true;
        }
    }
    false
}

/// Harvest one conference: resolve sessions, assemble papers per session
/// in discovery order, with a politeness pause between session fetches.
pub async fn process_conference(
    fetcher: &Fetcher,
    config: &Config,
    conference: &ConferenceRecord,
    cancel: &AtomicBool,
    stats: &mut CrawlStats,
) -> ConferenceData {
    info!("Processing conference {} ({})", conference.name, conference.code);

    let session_list = sessions::resolve(fetcher, config, conference).await;
    let mut papers = Vec::new();
    let mut kept_sessions: Vec<SessionRecord> = Vec::new();

    for session in &session_list {
        if cancel.load(Ordering::Relaxed) {
            info!("Interrupted; keeping partial results for {}", conference.code);
            break;
        }

        let session_papers =
            assemble::assemble_session(fetcher, config, &conference.code, session).await;
        stats.sessions_processed += 1;
        if session_papers.is_empty() {
            info!("Session {} found no papers", session.id);
        } else {
            info!("Session {} completed: {} papers", session.id, session_papers.len());
            papers.extend(session_papers);
            kept_sessions.push(session.clone());
        }

        fetcher.pause().await;
    }

    stats.total_papers += papers.len();
    ConferenceData {
        conference: conference.clone(),
        sessions: kept_sessions,
        papers,
    }
}

/// Top-level crawl: discover, filter, then process conferences one at a
/// time with the inter-conference delay. Ctrl-C lands between conferences;
/// whatever is already assembled is returned.
pub async fn crawl(
    fetcher: &Fetcher,
    config: &Config,
    options: &CrawlOptions,
    cancel: &AtomicBool,
) -> (Vec<ConferenceData>, CrawlStats) {
    let mut stats = CrawlStats::default();
    let conferences = discover(fetcher, config).await;
    stats.total_conferences = conferences.len();

    let selected = select_conferences(conferences, options);
    info!("Prepared to process {} conferences", selected.len());

    let mut results = Vec::new();
    for conference in &selected {
        if cancel.load(Ordering::Relaxed) {
            info!("Interrupted; stopping before {}", conference.code);
            break;
        }

        if !check_structure(fetcher, config, conference).await {
            warn!(
                "Conference {} does not follow the expected structure, skipping",
                conference.code
            );
            stats.skipped_conferences += 1;
            continue;
        }

        let data = process_conference(fetcher, config, conference, cancel, &mut stats).await;
        stats.processed_conferences += 1;
        if data.papers.is_empty() {
            info!("Conference {} found no papers", conference.code);
        } else {
            info!(
                "Conference {} completed: {} papers from {} sessions",
                conference.code,
                data.papers.len(),
                data.sessions.len()
            );
            results.push(data);
        }

        fetcher
            .pause_for(Duration::from_millis(config.conference_delay_ms))
            .await;
    }

    (results, stats)
}

/// Apply year/name filters and the start-from/limit window, preserving
/// index order.
pub fn select_conferences(
    conferences: Vec<ConferenceRecord>,
    options: &CrawlOptions,
) -> Vec<ConferenceRecord> {
    let filtered: Vec<ConferenceRecord> = conferences
        .into_iter()
        .filter(|c| match options.year {
            Some(year) => c.discovered_year == Some(year),
            None => true,
        })
        .filter(|c| match &options.conference {
            Some(name) => {
                let needle = name.to_uppercase();
                c.name.to_uppercase().contains(&needle)
                    || c.code.to_uppercase().contains(&needle)
            }
            None => true,
        })
        .collect();

    let start = options.start_from.min(filtered.len());
    let end = match options.max_conferences {
        Some(max) => (start + max).min(filtered.len()),
        None => filtered.len(),
    };
    filtered[start..end].to_vec()
}

/// One conference's individual-paper harvest.
#[derive(Debug, Clone)]
pub struct IndividualHarvest {
    pub conference: ConferenceRecord,
    pub papers: Vec<assemble::IndividualPaper>,
}

/// Individual-paper mode: walk each selected conference's session pages
/// and keep the PDF anchors the classifier accepts, up to `max_papers`
/// in total. Conferences without session structure get their root page
/// scanned directly.
pub async fn crawl_individual(
    fetcher: &Fetcher,
    config: &Config,
    options: &CrawlOptions,
    max_papers: Option<usize>,
    cancel: &AtomicBool,
) -> Vec<IndividualHarvest> {
    let classifier = crate::classify::UrlClassifier::new(config);
    let conferences = discover(fetcher, config).await;
    let selected = select_conferences(conferences, options);
    info!("Collecting individual papers from {} conferences", selected.len());

    let mut harvests = Vec::new();
    let mut collected = 0usize;

    for conference in &selected {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        info!("Collecting individual papers for {}", conference.code);

        let session_list = sessions::resolve(fetcher, config, conference).await;
        let mut papers = Vec::new();

        if session_list.is_empty() {
            if let Some(html) = fetcher.fetch_page(&conference.root_url).await {
                papers = assemble::individual_papers_from_page(
                    &html,
                    &conference.root_url,
                    &classifier,
                );
            }
        } else {
            for session in &session_list {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                if let Some(html) = fetcher.fetch_page(&session.url).await {
                    papers.extend(assemble::individual_papers_from_page(
                        &html,
                        &session.url,
                        &classifier,
                    ));
                }
                fetcher.pause().await;
            }
        }

        // Sessions can repeat links; de-dup per conference by URL.
        let mut seen = HashSet::new();
        papers.retain(|p| seen.insert(p.url.clone()));

        if let Some(max) = max_papers {
            papers.truncate(max.saturating_sub(collected));
        }
        collected += papers.len();
        info!("Conference {}: {} individual papers", conference.code, papers.len());
        if !papers.is_empty() {
            harvests.push(IndividualHarvest {
                conference: conference.clone(),
                papers,
            });
        }

        if max_papers.map(|m| collected >= m).unwrap_or(false) {
            break;
        }
        fetcher
            .pause_for(Duration::from_millis(config.conference_delay_ms))
            .await;
    }

    harvests
}

fn ensure_slash(root: &str) -> String {
    if root.ends_with('/') {
        root.to_string()
    } else {
        format!("{}/", root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conference(code: &str, name: &str, year: Option<i32>) -> ConferenceRecord {
        ConferenceRecord {
            name: name.to_string(),
            code: code.to_string(),
            root_url: format!("https://proceedings.jacow.org/{}/", code),
            discovered_year: year,
        }
    }

    #[test]
    fn index_fixture_yields_conferences() {
        let html = std::fs::read_to_string("tests/fixtures/proceedings_index.htm").unwrap();
        let conferences = conferences_from_index(&html, &Config::default());
        assert_eq!(conferences.len(), 2);
        assert_eq!(conferences[0].code, "ipac2023");
        assert_eq!(conferences[0].name, "IPAC'23 - Venice, Italy");
        assert_eq!(
            conferences[0].root_url,
            "https://proceedings.jacow.org/ipac2023/"
        );
        assert_eq!(conferences[0].discovered_year, Some(2023));
        assert_eq!(conferences[1].code, "srf2017");
    }

    #[test]
    fn non_proceedings_links_are_ignored() {
        let html = r#"<a href="https://elsewhere.org/ipac2023/">IPAC Mirror</a>
                      <a href="https://proceedings.jacow.org/ipac2023/papers/x.pdf">pdf</a>"#;
        assert!(conferences_from_index(html, &Config::default()).is_empty());
    }

    #[test]
    fn short_link_text_is_ignored() {
        let html = r#"<a href="https://proceedings.jacow.org/ipac2023/">go</a>"#;
        assert!(conferences_from_index(html, &Config::default()).is_empty());
    }

    #[test]
    fn year_extraction_window() {
        assert_eq!(extract_year("IPAC 2023 Venice"), Some(2023));
        assert_eq!(extract_year("srf2017"), Some(2017));
        assert_eq!(extract_year("established 1979"), None);
        assert_eq!(extract_year("room 2077"), None);
    }

    #[test]
    fn selection_applies_filters_then_window() {
        let all = vec![
            conference("ipac2022", "IPAC'22", Some(2022)),
            conference("ipac2023", "IPAC'23", Some(2023)),
            conference("srf2023", "SRF'23", Some(2023)),
            conference("linac2023", "LINAC'23", Some(2023)),
        ];

        let by_year = select_conferences(
            all.clone(),
            &CrawlOptions {
                year: Some(2023),
                ..Default::default()
            },
        );
        assert_eq!(by_year.len(), 3);

        let by_name = select_conferences(
            all.clone(),
            &CrawlOptions {
                conference: Some("ipac".into()),
                ..Default::default()
            },
        );
        assert_eq!(by_name.len(), 2);

        let windowed = select_conferences(
            all,
            &CrawlOptions {
                start_from: 1,
                max_conferences: Some(2),
                ..Default::default()
            },
        );
        assert_eq!(windowed.len(), 2);
        assert_eq!(windowed[0].code, "ipac2023");
    }

    #[test]
    fn window_past_the_end_is_empty() {
        let all = vec![conference("ipac2023", "IPAC'23", Some(2023))];
        let selected = select_conferences(
            all,
            &CrawlOptions {
                start_from: 5,
                ..Default::default()
            },
        );
        assert!(selected.is_empty());
    }
}
