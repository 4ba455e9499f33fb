use serde::Serialize;

/// A conference discovered on the proceedings index page.
/// Identified by `code` (e.g. "ipac2023"); immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct ConferenceRecord {
    pub name: String,
    pub code: String,
    pub root_url: String,
    pub discovered_year: Option<i32>,
}

/// One session of a conference program (e.g. "MOPA").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub id: String,
    pub display_name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ArtifactKind {
    Paper,
    Presentation,
    Poster,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Paper,
        ArtifactKind::Presentation,
        ArtifactKind::Poster,
    ];

    /// Top-level output folder the downloader files this kind under.
    pub fn folder(self) -> &'static str {
        match self {
            ArtifactKind::Paper => "Papers",
            ArtifactKind::Presentation => "Presentations",
            ArtifactKind::Poster => "Posters",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    pub url: String,
    pub available: bool,
}

impl ArtifactInfo {
    pub fn unprobed(url: String) -> Self {
        ArtifactInfo {
            url,
            available: false,
        }
    }
}

/// The three artifact slots every paper carries. The URLs are computed from
/// templates, never scraped; `available` is filled in by the probing step.
#[derive(Debug, Clone, Serialize)]
pub struct Artifacts {
    pub paper: ArtifactInfo,
    pub presentation: ArtifactInfo,
    pub poster: ArtifactInfo,
}

impl Artifacts {
    pub fn get(&self, kind: ArtifactKind) -> &ArtifactInfo {
        match kind {
            ArtifactKind::Paper => &self.paper,
            ArtifactKind::Presentation => &self.presentation,
            ArtifactKind::Poster => &self.poster,
        }
    }

    pub fn get_mut(&mut self, kind: ArtifactKind) -> &mut ArtifactInfo {
        match kind {
            ArtifactKind::Paper => &mut self.paper,
            ArtifactKind::Presentation => &mut self.presentation,
            ArtifactKind::Poster => &mut self.poster,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArtifactKind, &ArtifactInfo)> {
        ArtifactKind::ALL.into_iter().map(move |k| (k, self.get(k)))
    }
}

/// One extracted paper. Created by the assembler, probed once, then
/// handed to writers as a read-only value.
#[derive(Debug, Clone, Serialize)]
pub struct PaperRecord {
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub institutions: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub artifacts: Artifacts,
    pub doi: String,
    pub session_id: String,
    pub page_number: Option<String>,
}

/// Everything harvested from one conference.
#[derive(Debug, Clone, Serialize)]
pub struct ConferenceData {
    pub conference: ConferenceRecord,
    pub sessions: Vec<SessionRecord>,
    pub papers: Vec<PaperRecord>,
}

impl ConferenceData {
    pub fn available_count(&self, kind: ArtifactKind) -> usize {
        self.papers
            .iter()
            .filter(|p| p.artifacts.get(kind).available)
            .count()
    }
}

/// Running totals for a crawl, printed at the end of a run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CrawlStats {
    pub total_conferences: usize,
    pub processed_conferences: usize,
    pub skipped_conferences: usize,
    pub sessions_processed: usize,
    pub total_papers: usize,
    pub errors: usize,
}

impl CrawlStats {
    pub fn print(&self) {
        println!("Conferences: {}/{} processed ({} skipped)",
            self.processed_conferences, self.total_conferences, self.skipped_conferences);
        println!("Sessions:    {}", self.sessions_processed);
        println!("Papers:      {}", self.total_papers);
        println!("Errors:      {}", self.errors);
    }
}
