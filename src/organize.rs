use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::classify::classify_topic;
use crate::config::Config;
use crate::download::{DownloadResult, Outcome};
use crate::records::{ConferenceData, PaperRecord};

/// Category counters produced by an organize pass.
#[derive(Debug, Default, Clone)]
pub struct OrganizeStats {
    /// "<Conference>/<Year>" -> files moved there.
    pub moved: BTreeMap<String, usize>,
    /// topic name -> papers scored into it.
    pub topics: BTreeMap<String, usize>,
}

/// File downloaded artifacts into `<base>/<Conference>/<Year>/` and score
/// every organized paper into a topic bucket. Files that cannot be moved
/// are logged and left in place.
pub fn organize_downloads(
    config: &Config,
    base_dir: &Path,
    results: &[DownloadResult],
    data: &[ConferenceData],
) -> Result<OrganizeStats> {
    let papers: HashMap<(&str, &str), &PaperRecord> = data
        .iter()
        .flat_map(|d| {
            d.papers
                .iter()
                .map(move |p| ((d.conference.code.as_str(), p.paper_id.as_str()), p))
        })
        .collect();
    let years: HashMap<&str, Option<i32>> = data
        .iter()
        .map(|d| (d.conference.code.as_str(), d.conference.discovered_year))
        .collect();

    let mut stats = OrganizeStats::default();
    let mut organized: Vec<&DownloadResult> = Vec::new();

    for result in results {
        if result.outcome != Outcome::Downloaded {
            continue;
        }
        if !result.path.exists() {
            continue;
        }

        let conference = conference_series(config, &result.conf_code);
        let year_dir = years
            .get(result.conf_code.as_str())
            .copied()
            .flatten()
            .filter(|y| *y > 1980)
            .map(|y| y.to_string())
            .unwrap_or_else(|| "Unknown_Year".to_string());

        let target_dir = base_dir.join(&conference).join(&year_dir);
        if let Err(e) = fs::create_dir_all(&target_dir) {
            warn!("Could not create {}: {}", target_dir.display(), e);
            continue;
        }

        let Some(filename) = result.path.file_name() else {
            continue;
        };
        let target = target_dir.join(filename);
        if target.exists() {
            continue;
        }
        match fs::rename(&result.path, &target) {
            Ok(()) => {
                debug!("Moved {} -> {}", result.path.display(), target.display());
                *stats
                    .moved
                    .entry(format!("{}/{}", conference, year_dir))
                    .or_default() += 1;
                organized.push(result);
            }
            Err(e) => warn!("Could not move {}: {}", result.path.display(), e),
        }
    }

    // Topic scoring is pure CPU work over title+abstract; run it in parallel.
    let topic_counts: Vec<String> = organized
        .par_iter()
        .map(|result| {
            let key = (result.conf_code.as_str(), result.paper_id.as_str());
            match papers.get(&key) {
                Some(paper) => classify_topic(&config.topics, &paper.title, &paper.abstract_text),
                None => "Other".to_string(),
            }
        })
        .collect();
    for topic in topic_counts {
        *stats.topics.entry(topic).or_default() += 1;
    }

    info!(
        "Organized {} files into {} categories",
        stats.moved.values().sum::<usize>(),
        stats.moved.len()
    );
    Ok(stats)
}

/// Write the classification report next to the organized tree.
pub fn write_classification_report(base_dir: &Path, stats: &OrganizeStats) -> Result<()> {
    fs::create_dir_all(base_dir)?;
    let path = base_dir.join("classification_report.txt");
    let mut out = fs::File::create(&path)?;

    let total: usize = stats.moved.values().sum();
    writeln!(out, "Paper Classification Report")?;
    writeln!(out, "{}", "=".repeat(50))?;
    writeln!(out)?;
    writeln!(out, "Total papers organized: {}", total)?;
    writeln!(out)?;

    if !stats.moved.is_empty() {
        writeln!(out, "Conference/year distribution:")?;
        writeln!(out, "{}", "-".repeat(30))?;
        for (category, count) in &stats.moved {
            let pct = if total > 0 {
                *count as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            writeln!(out, "{:<24} {:>5} ({:>5.1}%)", category, count, pct)?;
        }
        writeln!(out)?;
    }

    if !stats.topics.is_empty() {
        writeln!(out, "Topic distribution:")?;
        writeln!(out, "{}", "-".repeat(30))?;
        let mut topics: Vec<_> = stats.topics.iter().collect();
        topics.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (topic, count) in topics {
            writeln!(out, "{:<24} {:>5}", topic, count)?;
        }
    }

    info!("Wrote classification report to {}", path.display());
    Ok(())
}

/// Series name for a conference code: the known series it starts with,
/// else the leading alphabetic run uppercased ("ipac2023" -> "IPAC").
fn conference_series(config: &Config, code: &str) -> String {
    let upper = code.to_uppercase();
    for known in &config.known_conferences {
        if upper.contains(&known.to_uppercase()) {
            return known.clone();
        }
    }
    let series: String = code
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase();
    if series.is_empty() {
        "UNKNOWN".to_string()
    } else {
        series
    }
}
