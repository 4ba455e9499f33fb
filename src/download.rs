use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::assemble::IndividualPaper;
use crate::config::Config;
use crate::records::{ArtifactKind, ConferenceData};
use crate::report::sanitize_filename;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Downloaded,
    Skipped,
    TooLarge,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub conf_code: String,
    pub paper_id: String,
    pub kind: ArtifactKind,
    pub url: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub outcome: Outcome,
    pub error: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct DownloadStats {
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub too_large: usize,
    pub failed: usize,
    pub total_bytes: u64,
}

impl DownloadStats {
    pub fn log(&self) {
        info!("Download totals: {} artifacts", self.total);
        info!("  downloaded: {}", self.downloaded);
        info!("  skipped (already present): {}", self.skipped);
        info!("  over size limit: {}", self.too_large);
        info!("  failed: {}", self.failed);
        info!("  bytes written: {:.1} MB", self.total_bytes as f64 / (1024.0 * 1024.0));
    }
}

#[derive(Debug, Clone)]
struct DownloadJob {
    conf_code: String,
    paper_id: String,
    kind: ArtifactKind,
    url: String,
    dest: PathBuf,
}

/// Download every available artifact of every paper, a bounded number of
/// transfers at a time. Results stream back as they finish; batches are
/// awaited together so a stuck transfer cannot block submission forever.
pub async fn download_conferences(
    config: &Config,
    out_dir: &Path,
    data: &[ConferenceData],
    resume: bool,
    cancel: &AtomicBool,
) -> Result<(Vec<DownloadResult>, DownloadStats)> {
    let jobs = build_jobs(out_dir, data);
    run_batches(config, jobs, resume, cancel).await
}

/// Individual-paper mode: one direct PDF per discovered link, filed under
/// `<out>/Individual/<conf>/<session>/`.
pub async fn download_individual(
    config: &Config,
    out_dir: &Path,
    papers: &[(String, IndividualPaper)],
    resume: bool,
    cancel: &AtomicBool,
) -> Result<(Vec<DownloadResult>, DownloadStats)> {
    let jobs = papers
        .iter()
        .map(|(conf_code, paper)| {
            let stem = if paper.title.is_empty() || paper.title == paper.code {
                paper.code.clone()
            } else {
                format!("{} - {}", paper.code, paper.title)
            };
            let mut filename = sanitize_filename(&stem, 60);
            filename.push_str(".pdf");
            DownloadJob {
                conf_code: conf_code.clone(),
                paper_id: paper.code.clone(),
                kind: ArtifactKind::Paper,
                url: paper.url.clone(),
                dest: out_dir
                    .join("Individual")
                    .join(conf_code)
                    .join(sanitize_filename(&paper.session, 60))
                    .join(filename),
            }
        })
        .collect();
    run_batches(config, jobs, resume, cancel).await
}

async fn run_batches(
    config: &Config,
    jobs: Vec<DownloadJob>,
    resume: bool,
    cancel: &AtomicBool,
) -> Result<(Vec<DownloadResult>, DownloadStats)> {
    let mut stats = DownloadStats {
        total: jobs.len(),
        ..Default::default()
    };
    if jobs.is_empty() {
        info!("No available artifacts to download");
        return Ok((Vec::new(), stats));
    }
    info!("Downloading {} artifacts", jobs.len());

    let client = Arc::new(
        reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(300))
            .build()?,
    );
    let semaphore = Arc::new(Semaphore::new(config.concurrent_downloads.max(1)));
    let max_bytes = config.max_file_size_mb.saturating_mul(1024 * 1024);

    let pb = ProgressBar::new(jobs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let batch_size = (config.concurrent_downloads * 2).clamp(1, 20);
    let mut results = Vec::with_capacity(jobs.len());
    let mut jobs = jobs.into_iter().peekable();

    while jobs.peek().is_some() {
        if cancel.load(Ordering::Relaxed) {
            info!("Interrupted; keeping {} finished downloads", results.len());
            break;
        }
        let batch: Vec<DownloadJob> = jobs.by_ref().take(batch_size).collect();
        let (tx, mut rx) = mpsc::channel::<DownloadResult>(batch.len());

        for job in batch {
            let client = Arc::clone(&client);
            let sem = Arc::clone(&semaphore);
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = run_job(client, sem, job, resume, max_bytes).await;
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        while let Some(result) = rx.recv().await {
            match result.outcome {
                Outcome::Downloaded => {
                    stats.downloaded += 1;
                    stats.total_bytes += result.size_bytes;
                }
                Outcome::Skipped => {
                    stats.skipped += 1;
                    stats.total_bytes += result.size_bytes;
                }
                Outcome::TooLarge => stats.too_large += 1,
                Outcome::Failed => stats.failed += 1,
            }
            pb.inc(1);
            results.push(result);
        }
    }

    pb.finish_and_clear();
    stats.log();
    Ok((results, stats))
}

/// One job per available artifact, filed under
/// `<out>/<Kind folder>/<conf>/<session>/<id>[suffix] - <title>.pdf`.
fn build_jobs(out_dir: &Path, data: &[ConferenceData]) -> Vec<DownloadJob> {
    let mut jobs = Vec::new();
    for conf_data in data {
        let session_names: std::collections::HashMap<&str, &str> = conf_data
            .sessions
            .iter()
            .map(|s| (s.id.as_str(), s.display_name.as_str()))
            .collect();

        for paper in &conf_data.papers {
            let session_dir = sanitize_filename(
                session_names
                    .get(paper.session_id.as_str())
                    .copied()
                    .unwrap_or(paper.session_id.as_str()),
                60,
            );
            for (kind, artifact) in paper.artifacts.iter() {
                if !artifact.available {
                    continue;
                }
                let suffix = match kind {
                    ArtifactKind::Paper => "",
                    ArtifactKind::Presentation => "_talk",
                    ArtifactKind::Poster => "_poster",
                };
                let stem = if paper.title.is_empty() {
                    format!("{}{}", paper.paper_id, suffix)
                } else {
                    format!("{}{} - {}", paper.paper_id, suffix, paper.title)
                };
                let mut filename = sanitize_filename(&stem, 60);
                filename.push_str(".pdf");

                jobs.push(DownloadJob {
                    conf_code: conf_data.conference.code.clone(),
                    paper_id: paper.paper_id.clone(),
                    kind,
                    url: artifact.url.clone(),
                    dest: out_dir
                        .join(kind.folder())
                        .join(&conf_data.conference.code)
                        .join(&session_dir)
                        .join(filename),
                });
            }
        }
    }
    jobs
}

async fn run_job(
    client: Arc<reqwest::Client>,
    semaphore: Arc<Semaphore>,
    job: DownloadJob,
    resume: bool,
    max_bytes: u64,
) -> DownloadResult {
    let _permit = semaphore.acquire_owned().await.unwrap();

    let mut result = DownloadResult {
        conf_code: job.conf_code.clone(),
        paper_id: job.paper_id.clone(),
        kind: job.kind,
        url: job.url.clone(),
        path: job.dest.clone(),
        size_bytes: 0,
        outcome: Outcome::Failed,
        error: None,
    };

    // Resume: an existing non-empty file counts as done.
    if resume {
        if let Ok(meta) = tokio::fs::metadata(&job.dest).await {
            if meta.len() > 0 {
                debug!("Already present, skipping: {}", job.dest.display());
                result.outcome = Outcome::Skipped;
                result.size_bytes = meta.len();
                return result;
            }
        }
    }

    // Size precheck before committing to a streamed body.
    if let Some(length) = head_content_length(&client, &job.url).await {
        if length > max_bytes {
            warn!(
                "{} too large ({} bytes > {} bytes), skipping",
                job.url, length, max_bytes
            );
            result.outcome = Outcome::TooLarge;
            return result;
        }
    }

    match stream_to_file(&client, &job.url, &job.dest).await {
        Ok(written) => {
            debug!("Downloaded {} ({} bytes)", job.dest.display(), written);
            result.outcome = Outcome::Downloaded;
            result.size_bytes = written;
        }
        Err(e) => {
            warn!("Failed to download {}: {}", job.url, e);
            // Drop any partial file so a later resume re-fetches it.
            let _ = tokio::fs::remove_file(&job.dest).await;
            result.error = Some(e.to_string());
        }
    }
    result
}

async fn head_content_length(client: &reqwest::Client, url: &str) -> Option<u64> {
    let response = client.head(url).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    response
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

async fn stream_to_file(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut response = client.get(url).send().await?.error_for_status()?;
    let mut file = tokio::fs::File::create(dest).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
