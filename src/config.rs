use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::records::ArtifactKind;

/// One topic bucket for post-download classification. Ordered: ties in
/// keyword score go to the earlier entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicRule {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Every tunable in one place: URLs, keyword sets, paper-shape patterns,
/// artifact URL templates, delays, retry policy, download limits. Defaults
/// match the live JACoW sites; a TOML file can override any field so new
/// site-template variants don't require code changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index_url: String,
    pub proceedings_host: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub request_delay_ms: u64,
    pub conference_delay_ms: u64,
    pub concurrent_downloads: usize,
    pub max_file_size_mb: u64,

    pub known_conferences: Vec<String>,
    pub session_suffixes: Vec<String>,
    pub session_link_suffixes: Vec<String>,

    /// Filenames containing any of these are bulk artifacts, checked before
    /// the individual-shape patterns.
    pub bulk_keywords: Vec<String>,
    /// Regexes matched against the lowercased filename stem.
    pub individual_patterns: Vec<String>,

    pub paper_url_template: String,
    pub talk_url_template: String,
    pub poster_url_template: String,
    pub doi_template: String,

    pub institution_keywords: Vec<String>,
    pub metadata_keywords: Vec<String>,
    pub topics: Vec<TopicRule>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            index_url: "https://www.jacow.org/Main/Proceedings".into(),
            proceedings_host: "proceedings.jacow.org".into(),
            user_agent: concat!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) ",
                "AppleWebKit/537.36 (KHTML, like Gecko) ",
                "Chrome/120.0.0.0 Safari/537.36"
            )
            .into(),
            timeout_secs: 30,
            retry_attempts: 3,
            retry_backoff_ms: 2000,
            request_delay_ms: 1000,
            conference_delay_ms: 2000,
            concurrent_downloads: 5,
            max_file_size_mb: 100,

            known_conferences: [
                "IPAC", "LINAC", "PAC", "EPAC", "DIPAC", "BIW", "SRF", "IBIC", "COOL", "HB",
                "CYCLOTRONS", "RuPAC", "NA-PAC", "ICALEPCS", "PCaPAC", "HIAT",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),

            // The sessi0n spelling is real: several conference years shipped
            // with the zero, and one year (SRF2017) appended a digit.
            session_suffixes: vec![
                "html/sessi0n.htm".into(),
                "html/sessi0n1.htm".into(),
                "html/session.htm".into(),
                "html/sessions.htm".into(),
            ],
            session_link_suffixes: vec![
                "session/index.html".into(),
                "session/".into(),
                "sessions/".into(),
            ],

            bulk_keywords: [
                "proceedings", "complete", "full", "entire", "all", "volume", "brief",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            individual_patterns: vec![
                r"^[a-z]{2,4}[a-z0-9]{2,6}$".into(),
                r"^[a-z]{2,6}\d{2,4}$".into(),
            ],

            paper_url_template: "https://proceedings.jacow.org/{code}/papers/{id}.pdf".into(),
            talk_url_template: "https://proceedings.jacow.org/{code}/talks/{id}_talk.pdf".into(),
            poster_url_template: "https://proceedings.jacow.org/{code}/posters/{id}_poster.pdf"
                .into(),
            doi_template: "https://doi.org/10.18429/JACoW-{CODE}-{ID}".into(),

            institution_keywords: [
                "University",
                "Laboratory",
                "Institute",
                "Center",
                "Corporation",
                "School",
                "Facility",
                "National",
                "Synchrotron",
                "KEK",
                "FRIB",
                "LBNL",
                "DESY",
                "SLAC",
                "CERN",
                "Jefferson Lab",
                "Argonne",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            metadata_keywords: ["funding", "doi", "received", "accepted"]
                .iter()
                .map(|s| s.to_string())
                .collect(),

            topics: vec![
                TopicRule {
                    name: "Accelerator_Technology".into(),
                    keywords: [
                        "accelerator", "magnet", "cavity", "rf", "superconducting", "cryogenic",
                        "vacuum", "mechanical", "power supply",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                },
                TopicRule {
                    name: "Beam_Dynamics".into(),
                    keywords: [
                        "beam dynamics", "optics", "emittance", "tune", "chromaticity",
                        "coupling", "lattice", "tracking", "simulation",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                },
                TopicRule {
                    name: "Beam_Instrumentation".into(),
                    keywords: [
                        "bpm", "beam position monitor", "diagnostics", "monitor", "measurement",
                        "instrumentation", "profile", "current",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                },
                TopicRule {
                    name: "Controls".into(),
                    keywords: [
                        "control", "epics", "software", "database", "automation", "interface",
                        "timing", "synchronization",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                },
                TopicRule {
                    name: "Power_Systems".into(),
                    keywords: [
                        "power supply", "converter", "modulator", "high voltage", "switching",
                        "regulation", "protection",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                },
                TopicRule {
                    name: "RF_Technology".into(),
                    keywords: [
                        "rf", "microwave", "klystron", "magnetron", "waveguide", "coupler",
                        "antenna", "frequency",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                },
            ],
        }
    }
}

impl Config {
    /// Load overrides from a TOML file on top of the defaults.
    pub fn load(path: &Path) -> Result<Config> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Deterministic artifact URL for (conference, paper, kind). The id is
    /// lowercased in the path; this format is a contract, not a heuristic.
    pub fn artifact_url(&self, kind: ArtifactKind, conf_code: &str, paper_id: &str) -> String {
        let template = match kind {
            ArtifactKind::Paper => &self.paper_url_template,
            ArtifactKind::Presentation => &self.talk_url_template,
            ArtifactKind::Poster => &self.poster_url_template,
        };
        template
            .replace("{code}", conf_code)
            .replace("{id}", &paper_id.to_lowercase())
    }

    /// DOI URL: conference code uppercased, paper id verbatim.
    pub fn doi_url(&self, conf_code: &str, paper_id: &str) -> String {
        self.doi_template
            .replace("{CODE}", &conf_code.to_uppercase())
            .replace("{ID}", paper_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_url_is_bit_exact() {
        let config = Config::default();
        assert_eq!(
            config.artifact_url(ArtifactKind::Paper, "ipac2023", "MOPA001"),
            "https://proceedings.jacow.org/ipac2023/papers/mopa001.pdf"
        );
    }

    #[test]
    fn talk_and_poster_urls() {
        let config = Config::default();
        assert_eq!(
            config.artifact_url(ArtifactKind::Presentation, "ipac2023", "MOPA001"),
            "https://proceedings.jacow.org/ipac2023/talks/mopa001_talk.pdf"
        );
        assert_eq!(
            config.artifact_url(ArtifactKind::Poster, "ipac2023", "MOPA001"),
            "https://proceedings.jacow.org/ipac2023/posters/mopa001_poster.pdf"
        );
    }

    #[test]
    fn doi_uppercases_code_only() {
        let config = Config::default();
        assert_eq!(
            config.doi_url("ipac2023", "MOPA001"),
            "https://doi.org/10.18429/JACoW-IPAC2023-MOPA001"
        );
    }

    #[test]
    fn toml_overrides_merge_over_defaults() {
        let config: Config = toml::from_str("request_delay_ms = 250").unwrap();
        assert_eq!(config.request_delay_ms, 250);
        // untouched fields keep their defaults
        assert_eq!(config.retry_attempts, 3);
        assert!(!config.bulk_keywords.is_empty());
    }
}
