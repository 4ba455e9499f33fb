mod assemble;
mod classify;
mod config;
mod discover;
mod download;
mod extract;
mod fetch;
mod organize;
mod page;
mod records;
mod report;
mod sessions;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::Config;
use crate::discover::CrawlOptions;
use crate::fetch::Fetcher;

#[derive(Parser)]
#[command(name = "jacow_scraper", about = "JACoW conference paper scraper")]
struct Cli {
    /// Output directory for reports and downloads
    #[arg(short, long, global = true, default_value = "./data")]
    output_dir: PathBuf,

    /// TOML file overriding the built-in configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Request delay between page fetches, in milliseconds
    #[arg(long, global = true)]
    delay: Option<u64>,

    /// Number of concurrent downloads
    #[arg(short, long, global = true)]
    concurrent: Option<usize>,

    /// Maximum artifact size in MB
    #[arg(long, global = true)]
    max_size: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List conferences found on the proceedings index
    Discover,
    /// Crawl conferences session by session and write reports
    Crawl {
        /// Only conferences whose name or code contains this string
        #[arg(long)]
        conference: Option<String>,
        /// Only conferences from this year
        #[arg(short, long)]
        year: Option<i32>,
        /// Skip this many conferences before starting
        #[arg(long, default_value = "0")]
        start_from: usize,
        /// Max conferences to process (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Download available artifacts after crawling
        #[arg(long)]
        download: bool,
        /// Skip artifacts that already exist on disk
        #[arg(long)]
        resume: bool,
        /// Show what would be downloaded without downloading
        #[arg(long)]
        dry_run: bool,
    },
    /// Collect individual paper PDFs instead of assembling full records
    Individual {
        /// Only conferences whose name or code contains this string
        #[arg(long)]
        conference: Option<String>,
        /// Only conferences from this year
        #[arg(short, long)]
        year: Option<i32>,
        /// Stop after this many papers in total
        #[arg(long)]
        max_papers: Option<usize>,
        /// Download the discovered PDFs
        #[arg(long)]
        download: bool,
        /// Skip papers that already exist on disk
        #[arg(long)]
        resume: bool,
        /// Show what would be downloaded without downloading
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(delay) = cli.delay {
        config.request_delay_ms = delay;
    }
    if let Some(concurrent) = cli.concurrent {
        config.concurrent_downloads = concurrent;
    }
    if let Some(max_size) = cli.max_size {
        config.max_file_size_mb = max_size;
    }

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupt received; finishing the current step...");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let fetcher = Fetcher::new(&config)?;

    let result = match cli.command {
        Commands::Discover => {
            let conferences = discover::discover(&fetcher, &config).await;
            if conferences.is_empty() {
                println!("No conferences found.");
                return Ok(());
            }
            println!("{:>3} | {:<40} | {:<14} | {:>5}", "#", "Conference", "Code", "Year");
            println!("{}", "-".repeat(72));
            for (i, c) in conferences.iter().enumerate() {
                let year = c
                    .discovered_year
                    .map(|y| y.to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:>3} | {:<40} | {:<14} | {:>5}",
                    i + 1,
                    truncate(&c.name, 40),
                    c.code,
                    year
                );
            }
            println!("\n{} conferences", conferences.len());
            Ok(())
        }
        Commands::Crawl {
            conference,
            year,
            start_from,
            limit,
            download,
            resume,
            dry_run,
        } => {
            let options = CrawlOptions {
                year,
                conference,
                start_from,
                max_conferences: limit,
            };
            let (data, mut stats) = discover::crawl(&fetcher, &config, &options, &cancel).await;
            stats.errors = fetcher.error_count();

            for conf_data in &data {
                report::write_conference(&cli.output_dir, conf_data)?;
            }
            report::write_master(&cli.output_dir, &data, &stats)?;

            if dry_run {
                print_planned_downloads(&data);
            } else if download {
                let (results, _dl_stats) = download::download_conferences(
                    &config,
                    &cli.output_dir,
                    &data,
                    resume,
                    &cancel,
                )
                .await?;
                let library = cli.output_dir.join("Library");
                let org_stats =
                    organize::organize_downloads(&config, &library, &results, &data)?;
                organize::write_classification_report(&library, &org_stats)?;
            }

            println!();
            stats.print();
            Ok(())
        }
        Commands::Individual {
            conference,
            year,
            max_papers,
            download,
            resume,
            dry_run,
        } => {
            let options = CrawlOptions {
                year,
                conference,
                ..Default::default()
            };
            let harvests =
                discover::crawl_individual(&fetcher, &config, &options, max_papers, &cancel)
                    .await;
            let total: usize = harvests.iter().map(|h| h.papers.len()).sum();
            if total == 0 {
                println!("No individual papers found.");
                return Ok(());
            }
            println!("Found {} individual papers", total);

            if dry_run {
                for h in &harvests {
                    for p in h.papers.iter().take(20) {
                        println!("  {} [{}] {}", p.code, h.conference.code, truncate(&p.title, 70));
                        println!("      {}", p.url);
                    }
                    if h.papers.len() > 20 {
                        println!("  ... {} more in {}", h.papers.len() - 20, h.conference.code);
                    }
                }
            } else if download {
                let papers: Vec<(String, assemble::IndividualPaper)> = harvests
                    .iter()
                    .flat_map(|h| {
                        h.papers
                            .iter()
                            .map(move |p| (h.conference.code.clone(), p.clone()))
                    })
                    .collect();
                download::download_individual(
                    &config,
                    &cli.output_dir,
                    &papers,
                    resume,
                    &cancel,
                )
                .await?;
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        info!("Done in {}", format_duration(elapsed));
    }

    result
}

fn print_planned_downloads(data: &[records::ConferenceData]) {
    let mut shown = 0;
    let mut total = 0;
    println!("Dry run - artifacts that would be downloaded:");
    for conf_data in data {
        for paper in &conf_data.papers {
            for (_, artifact) in paper.artifacts.iter() {
                if !artifact.available {
                    continue;
                }
                total += 1;
                if shown < 20 {
                    println!("  {}", artifact.url);
                    shown += 1;
                }
            }
        }
    }
    if total > shown {
        println!("  ... {} more", total - shown);
    }
    println!("{} artifacts in total", total);
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
