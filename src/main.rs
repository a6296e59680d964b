mod analysis;
mod cache;
mod chat;
mod citations;
mod config;
mod csv_input;
mod db;
mod error;
mod extract;
mod fetcher;
mod pipeline;
mod source;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::cache::PaperCache;
use crate::chat::{AnswerSource, GeminiClient, LanguageModel, PaperAssistant};
use crate::config::Settings;
use crate::extract::ContentExtractor;
use crate::fetcher::HttpFetcher;

#[derive(Parser)]
#[command(name = "paper_miner", about = "Scientific paper extraction and analysis")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Extract one paper URL and print the record as JSON
    Extract {
        url: String,
        /// Title to fall back on when the page has none
        #[arg(short, long)]
        title: Option<String>,
        /// Print the raw extracted content (all sections) instead of the record
        #[arg(long)]
        raw: bool,
    },
    /// Extract and store papers listed in a CSV (title + link columns)
    Ingest {
        csv: PathBuf,
        /// Max rows to process (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Seconds between fetches (clamped to 1-3)
        #[arg(short, long)]
        delay: Option<u64>,
    },
    /// Ingest PMC reference lists into the citation graph
    Citations {
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Summarize stored papers and extract keywords
    Summarize {
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Classify effects from summaries
    Effects,
    /// Assign themes to summarized papers
    Themes,
    /// Rebuild per-theme comparisons
    Compare,
    /// Rebuild the keyword relation graph and export it as JSON
    Graph {
        /// Show papers related to this paper id
        #[arg(short, long)]
        paper: Option<i64>,
    },
    /// Ingest + every analysis stage
    Pipeline {
        csv: PathBuf,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Ask a question about one paper from a CSV
    Ask {
        csv: PathBuf,
        /// 1-based row index or exact title
        #[arg(short, long)]
        paper: String,
        #[arg(short, long)]
        question: String,
    },
    /// Show database statistics
    Stats,
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
    let mut settings = Settings::load()?;

    let result = match cli.command {
        Commands::Init => {
            open_db(&settings)?;
            println!("Schema ready at {}", settings.database_path.display());
            Ok(())
        }
        Commands::Extract { url, title, raw } => {
            let extractor = extractor(&settings)?;
            let json = if raw {
                let content = extractor.extract(&url, title.as_deref()).await?;
                serde_json::to_string_pretty(&content)?
            } else {
                let record = extractor.extract_from_url(&url, title.as_deref()).await;
                serde_json::to_string_pretty(&record)?
            };
            println!("{}", json);
            Ok(())
        }
        Commands::Ingest { csv, limit, delay } => {
            if let Some(d) = delay {
                settings.batch_delay_secs = d;
            }
            let conn = open_db(&settings)?;
            let entries = load_csv(&csv, limit)?;
            if entries.is_empty() {
                println!("No usable rows in {}", csv.display());
                return Ok(());
            }
            println!("Ingesting {} papers...", entries.len());
            let s = pipeline::ingest(&conn, &extractor(&settings)?, &entries, settings.batch_delay())
                .await?;
            println!(
                "Done: {} total ({} new, {} updated, {} stubs, {} skipped, {} failed).",
                s.total, s.inserted, s.updated, s.stubs, s.skipped, s.failed
            );
            Ok(())
        }
        Commands::Citations { limit } => {
            let conn = open_db(&settings)?;
            let fetcher = http_fetcher(&settings)?;
            let s = citations::ingest_all(&conn, &fetcher, limit, settings.batch_delay()).await?;
            println!(
                "{} papers processed ({} failed): {} references, {} new citation edges.",
                s.papers, s.failed, s.refs_parsed, s.edges_created
            );
            Ok(())
        }
        Commands::Summarize { limit } => {
            let conn = open_db(&settings)?;
            let n = analysis::keywords::run(&conn, limit)?;
            println!("Summarized {} papers.", n);
            Ok(())
        }
        Commands::Effects => {
            let conn = open_db(&settings)?;
            println!("Added {} effects.", analysis::effects::run(&conn)?);
            Ok(())
        }
        Commands::Themes => {
            let conn = open_db(&settings)?;
            println!("Made {} theme assignments.", analysis::themes::run(&conn)?);
            Ok(())
        }
        Commands::Compare => {
            let conn = open_db(&settings)?;
            println!("Stored {} comparisons.", analysis::compare::run(&conn)?);
            Ok(())
        }
        Commands::Graph { paper } => {
            let conn = open_db(&settings)?;
            let g = analysis::graph::run(&conn, &settings.output_dir)?;
            println!(
                "{} relations, {} nodes exported to {}",
                g.relations,
                g.nodes,
                g.path.display()
            );
            if let Some(id) = paper {
                let relations = db::fetch_relations(&conn)?;
                let related = analysis::graph::neighbors(&relations, id);
                if related.is_empty() {
                    println!("No related papers for {}.", id);
                }
                for (other, strength) in related.into_iter().take(10) {
                    let title = db::fetch_paper(&conn, other)?
                        .map(|p| p.title)
                        .unwrap_or_default();
                    println!("  {:>6} | {:.3} | {}", other, strength, truncate(&title, 70));
                }
            }
            Ok(())
        }
        Commands::Pipeline { csv, limit } => {
            let conn = open_db(&settings)?;
            let entries = load_csv(&csv, limit)?;
            let r = pipeline::run_all(
                &conn,
                &extractor(&settings)?,
                &entries,
                settings.batch_delay(),
                &settings.output_dir,
            )
            .await?;
            println!(
                "Ingested {} new / {} updated / {} skipped ({} stubs).",
                r.ingest.inserted, r.ingest.updated, r.ingest.skipped, r.ingest.stubs
            );
            println!(
                "Citations +{} | summaries {} | themes {} | effects {} | comparisons {} | relations {}",
                r.citation_edges, r.summaries, r.themes, r.effects, r.comparisons, r.relations
            );
            Ok(())
        }
        Commands::Ask { csv, paper, question } => {
            let entries = csv_input::load_entries(&csv)?.entries;
            let entry = chat::select_paper(&entries, &paper)?;
            let model = GeminiClient::from_settings(&settings.llm, settings.request_timeout())?
                .map(|c| Box::new(c) as Box<dyn LanguageModel>);
            if model.is_none() {
                println!("(No Gemini API key configured, answering locally)");
            }
            let mut assistant = PaperAssistant::new(PaperCache::new(extractor(&settings)?), model);
            let answer = assistant.answer(entry, &question).await?;
            println!("\n--- {} ---\n", truncate(&entry.title, 80));
            println!("{}", answer.text);
            if answer.source == AnswerSource::Local {
                println!("\n(local answer from extracted content)");
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = open_db(&settings)?;
            let s = db::get_stats(&conn)?;
            println!("Papers:      {} ({} stubs)", s.papers, s.stubs);
            println!("Authors:     {}", s.authors);
            println!("Keywords:    {}", s.keywords);
            println!("Summaries:   {}", s.summaries);
            println!("Themes:      {}", s.themes);
            println!("Effects:     {}", s.effects);
            println!("Comparisons: {}", s.comparisons);
            println!("Citations:   {}", s.citations);
            println!("Relations:   {}", s.relations);
            if !s.by_year.is_empty() {
                println!("\n--- By year ---");
                for (year, n) in s.by_year.iter().take(15) {
                    println!("  {}: {}", year, n);
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_db(settings: &Settings) -> anyhow::Result<rusqlite::Connection> {
    let conn = db::connect(&settings.database_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

fn http_fetcher(settings: &Settings) -> anyhow::Result<HttpFetcher> {
    HttpFetcher::new(&settings.user_agent, settings.request_timeout())
        .context("Failed to build HTTP client")
}

fn extractor(settings: &Settings) -> anyhow::Result<ContentExtractor<HttpFetcher>> {
    Ok(ContentExtractor::new(http_fetcher(settings)?, settings.limits))
}

fn load_csv(path: &std::path::Path, limit: Option<usize>) -> anyhow::Result<Vec<csv_input::PaperEntry>> {
    let mut entries = csv_input::load_entries(path)?.entries;
    if let Some(n) = limit {
        entries.truncate(n);
    }
    Ok(entries)
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
