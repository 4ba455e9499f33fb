use regex::Regex;
use tracing::warn;

use crate::config::{Config, TopicRule};

/// Individual paper vs. bulk proceedings artifact, decided from the URL
/// alone. Ephemeral: computed per link, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Individual,
    Bulk,
}

/// Filename-shape classifier. Total: any input yields a verdict.
pub struct UrlClassifier {
    bulk_keywords: Vec<String>,
    patterns: Vec<Regex>,
}

impl UrlClassifier {
    pub fn new(config: &Config) -> Self {
        let patterns = config
            .individual_patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Skipping invalid paper-shape pattern {:?}: {}", p, e);
                    None
                }
            })
            .collect();
        UrlClassifier {
            bulk_keywords: config.bulk_keywords.iter().map(|k| k.to_lowercase()).collect(),
            patterns,
        }
    }

    /// Bulk-keyword exclusion runs before the shape patterns: some volume
    /// filenames embed session-code-like text and must not slip through.
    pub fn classify(&self, url: &str) -> Verdict {
        let filename = filename_of(url);

        if self.bulk_keywords.iter().any(|k| filename.contains(k.as_str())) {
            return Verdict::Bulk;
        }

        let stem = filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&filename);

        if self.patterns.iter().any(|re| re.is_match(stem)) {
            return Verdict::Individual;
        }

        // Last resort: short names with a digit are usually paper codes.
        // Accepts false positives; the availability probe catches them later.
        if stem.len() < 20 && stem.chars().any(|c| c.is_ascii_digit()) {
            Verdict::Individual
        } else {
            Verdict::Bulk
        }
    }
}

/// Final path segment, lowercased, query/fragment stripped.
fn filename_of(url: &str) -> String {
    let path = url
        .split_once(['?', '#'])
        .map(|(path, _)| path)
        .unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path).to_lowercase()
}

/// Score title+abstract against the configured topic table; highest count
/// wins, ties go to the earlier rule, no hits lands in "Other".
pub fn classify_topic(topics: &[TopicRule], title: &str, abstract_text: &str) -> String {
    let text = format!("{} {}", title, abstract_text).to_lowercase();

    let mut best: Option<(&str, usize)> = None;
    for rule in topics {
        let score = rule
            .keywords
            .iter()
            .filter(|k| text.contains(k.to_lowercase().as_str()))
            .count();
        if score > 0 && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((&rule.name, score));
        }
    }

    best.map(|(name, _)| name.to_string())
        .unwrap_or_else(|| "Other".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> UrlClassifier {
        UrlClassifier::new(&Config::default())
    }

    #[test]
    fn individual_paper_codes() {
        let c = classifier();
        assert_eq!(c.classify("https://x/ipac2023/pdf/MOPA001.pdf"), Verdict::Individual);
        assert_eq!(c.classify("TUPB123.pdf"), Verdict::Individual);
        assert_eq!(c.classify("WEPL45.pdf"), Verdict::Individual);
    }

    #[test]
    fn bulk_keywords_win() {
        let c = classifier();
        assert_eq!(c.classify("ipac-23_proceedings_volume.pdf"), Verdict::Bulk);
        assert_eq!(c.classify("ipac-23_proceedings_brief.pdf"), Verdict::Bulk);
        assert_eq!(c.classify("conference_complete.pdf"), Verdict::Bulk);
    }

    #[test]
    fn exclusion_beats_shape_match() {
        // Embeds a valid paper code but names a proceedings file.
        let c = classifier();
        assert_eq!(c.classify("proceedings_MOPA001.pdf"), Verdict::Bulk);
    }

    #[test]
    fn long_digitless_name_is_bulk() {
        let c = classifier();
        let stem = "abcdefghijklmnopqrstuvwxy"; // 25 chars, no digits
        assert_eq!(stem.len(), 25);
        assert_eq!(c.classify(&format!("{}.pdf", stem)), Verdict::Bulk);
    }

    #[test]
    fn short_name_with_digit_falls_through_to_individual() {
        let c = classifier();
        assert_eq!(c.classify("talk_7.pdf"), Verdict::Individual);
    }

    #[test]
    fn query_string_ignored() {
        let c = classifier();
        assert_eq!(
            c.classify("https://x/MOPA001.pdf?download=1"),
            Verdict::Individual
        );
    }

    #[test]
    fn totality_on_junk_input() {
        let c = classifier();
        // No panic, some verdict, on shapes we never anticipated.
        for url in ["", "/", "????", "no-extension", "a/b/c/"] {
            let _ = c.classify(url);
        }
    }

    #[test]
    fn topic_scoring_picks_highest() {
        let topics = Config::default().topics;
        let topic = classify_topic(
            &topics,
            "Emittance and tune tracking in the new lattice",
            "beam dynamics studies with optics simulation",
        );
        assert_eq!(topic, "Beam_Dynamics");
    }

    #[test]
    fn topic_defaults_to_other() {
        let topics = Config::default().topics;
        assert_eq!(classify_topic(&topics, "Annual report", ""), "Other");
    }
}
