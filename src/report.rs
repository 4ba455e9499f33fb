use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::json;
use tracing::info;

use crate::records::{ArtifactKind, ConferenceData, CrawlStats};

/// Make a string safe as a file or directory name: strip invalid
/// characters, collapse whitespace, and truncate on a word boundary.
pub fn sanitize_filename(name: &str, max_length: usize) -> String {
    let mut cleaned: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect();
    cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned = cleaned.trim_matches([' ', '.', '_']);

    if cleaned.is_empty() {
        return "unknown".to_string();
    }
    if cleaned.chars().count() <= max_length {
        return cleaned.to_string();
    }

    let truncated: String = cleaned.chars().take(max_length).collect();
    match truncated.rfind(' ') {
        Some(cut) if cut > 0 => truncated[..cut].to_string(),
        _ => truncated,
    }
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write one CSV row, quoting fields only when they need it.
pub fn write_csv_row<W: Write>(mut w: W, row: &[String]) -> io::Result<()> {
    let mut first = true;
    for cell in row {
        if !first {
            write!(w, ",")?;
        } else {
            first = false;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    writeln!(w)
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

const PAPER_CSV_HEADER: &[&str] = &[
    "conference_code",
    "conference_name",
    "session_id",
    "paper_id",
    "title",
    "authors",
    "institutions",
    "abstract",
    "paper_url",
    "paper_available",
    "presentation_url",
    "presentation_available",
    "poster_url",
    "poster_available",
    "doi",
    "page_number",
];

fn paper_csv_rows(data: &ConferenceData) -> Vec<Vec<String>> {
    data.papers
        .iter()
        .map(|p| {
            vec![
                data.conference.code.clone(),
                data.conference.name.clone(),
                p.session_id.clone(),
                p.paper_id.clone(),
                p.title.clone(),
                p.authors.join("; "),
                p.institutions.join("; "),
                p.abstract_text.clone(),
                p.artifacts.paper.url.clone(),
                p.artifacts.paper.available.to_string(),
                p.artifacts.presentation.url.clone(),
                p.artifacts.presentation.available.to_string(),
                p.artifacts.poster.url.clone(),
                p.artifacts.poster.available.to_string(),
                p.doi.clone(),
                p.page_number.clone().unwrap_or_default(),
            ]
        })
        .collect()
}

/// Write one conference's JSON, CSV, and text summary under
/// `<out>/Conferences/<code>/`.
pub fn write_conference(out_dir: &Path, data: &ConferenceData) -> Result<()> {
    let conf_dir = out_dir.join("Conferences").join(&data.conference.code);
    fs::create_dir_all(&conf_dir)
        .with_context(|| format!("Failed to create {}", conf_dir.display()))?;

    // JSON
    let payload = json!({
        "conference_info": data.conference,
        "sessions": data.sessions,
        "papers": data.papers,
        "stats": {
            "total_sessions": data.sessions.len(),
            "total_papers": data.papers.len(),
            "scrape_time": timestamp(),
        },
    });
    let json_path = conf_dir.join("conference_data.json");
    fs::write(&json_path, serde_json::to_string_pretty(&payload)?)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;

    // CSV
    let csv_path = conf_dir.join("all_papers.csv");
    let mut csv = fs::File::create(&csv_path)
        .with_context(|| format!("Failed to write {}", csv_path.display()))?;
    write_csv_row(&mut csv, &PAPER_CSV_HEADER.iter().map(|s| s.to_string()).collect::<Vec<_>>())?;
    for row in paper_csv_rows(data) {
        write_csv_row(&mut csv, &row)?;
    }

    // Text summary
    let txt_path = conf_dir.join("conference_summary.txt");
    let mut txt = fs::File::create(&txt_path)?;
    writeln!(txt, "Conference: {} ({})", data.conference.name, data.conference.code)?;
    writeln!(txt, "URL: {}", data.conference.root_url)?;
    writeln!(txt, "Scrape time: {}", timestamp())?;
    writeln!(txt, "Sessions processed: {}", data.sessions.len())?;
    writeln!(txt, "Total papers: {}", data.papers.len())?;
    writeln!(
        txt,
        "Available papers: {}/{}",
        data.available_count(ArtifactKind::Paper),
        data.papers.len()
    )?;
    writeln!(
        txt,
        "Available presentations: {}/{}",
        data.available_count(ArtifactKind::Presentation),
        data.papers.len()
    )?;
    writeln!(
        txt,
        "Available posters: {}/{}",
        data.available_count(ArtifactKind::Poster),
        data.papers.len()
    )?;
    writeln!(txt, "{}", "=".repeat(80))?;
    writeln!(txt)?;

    for session in &data.sessions {
        let session_papers: Vec<_> = data
            .papers
            .iter()
            .filter(|p| p.session_id == session.id)
            .collect();
        writeln!(txt, "Session: {}", session.display_name)?;
        writeln!(txt, "  Papers: {}", session_papers.len())?;
        for paper in session_papers {
            let mut flags = String::new();
            for (kind, artifact) in paper.artifacts.iter() {
                if artifact.available {
                    flags.push(match kind {
                        ArtifactKind::Paper => 'R',
                        ArtifactKind::Presentation => 'P',
                        ArtifactKind::Poster => 'T',
                    });
                }
            }
            let flags = if flags.is_empty() { "---".to_string() } else { flags };
            writeln!(txt, "    [{}] {}: {}", flags, paper.paper_id, truncate(&paper.title, 60))?;
        }
        writeln!(txt)?;
    }

    info!("Wrote conference reports to {}", conf_dir.display());
    Ok(())
}

/// Master index JSON, master CSV, and master text report across all
/// processed conferences, at the output root.
pub fn write_master(out_dir: &Path, data: &[ConferenceData], stats: &CrawlStats) -> Result<()> {
    fs::create_dir_all(out_dir)?;

    let index_path = out_dir.join("JACoW_Master_Index.json");
    let payload = json!({
        "scrape_info": {
            "scrape_time": timestamp(),
            "total_conferences": stats.total_conferences,
            "processed_conferences": stats.processed_conferences,
            "sessions_processed": stats.sessions_processed,
            "total_papers": stats.total_papers,
            "errors": stats.errors,
        },
        "conferences": data,
    });
    fs::write(&index_path, serde_json::to_string_pretty(&payload)?)
        .with_context(|| format!("Failed to write {}", index_path.display()))?;

    let csv_path = out_dir.join("JACoW_All_Papers.csv");
    let mut csv = fs::File::create(&csv_path)?;
    write_csv_row(&mut csv, &PAPER_CSV_HEADER.iter().map(|s| s.to_string()).collect::<Vec<_>>())?;
    for conf_data in data {
        for row in paper_csv_rows(conf_data) {
            write_csv_row(&mut csv, &row)?;
        }
    }

    let report_path = out_dir.join("JACoW_Master_Report.txt");
    let mut txt = fs::File::create(&report_path)?;
    writeln!(txt, "JACoW Conference Scraper - Master Report")?;
    writeln!(txt, "{}", "=".repeat(80))?;
    writeln!(txt, "Scrape completion time: {}", timestamp())?;
    writeln!(txt, "Total conferences discovered: {}", stats.total_conferences)?;
    writeln!(txt, "Conferences processed: {}", stats.processed_conferences)?;
    writeln!(txt, "Total papers: {}", stats.total_papers)?;
    writeln!(txt, "Errors: {}", stats.errors)?;
    writeln!(txt)?;
    writeln!(txt, "Conference summary:")?;
    writeln!(txt, "{}", "-".repeat(60))?;
    for conf_data in data {
        writeln!(txt, "{}: {}", conf_data.conference.code, conf_data.conference.name)?;
        writeln!(txt, "   Papers: {}", conf_data.papers.len())?;
        writeln!(
            txt,
            "   Available papers: {}",
            conf_data.available_count(ArtifactKind::Paper)
        )?;
        writeln!(
            txt,
            "   Available presentations: {}",
            conf_data.available_count(ArtifactKind::Presentation)
        )?;
        writeln!(
            txt,
            "   Available posters: {}",
            conf_data.available_count(ArtifactKind::Poster)
        )?;
        writeln!(txt, "   URL: {}", conf_data.conference.root_url)?;
        writeln!(txt)?;
    }

    info!("Wrote master reports to {}", out_dir.display());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}
