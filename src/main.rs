mod db;
mod error;
mod html;
mod index;
mod parser;
mod scraper;
mod settings;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use db::WellStore;
use settings::Settings;

#[derive(Parser)]
#[command(name = "marcellus", about = "Marcellus shale well production report scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in, walk the production index and queue every well
    Init {
        /// Only queue wells listed in this file (one well name per line)
        #[arg(long)]
        wells_file: Option<PathBuf>,
    },
    /// Fetch unvisited well reports
    Scrape {
        /// Max wells to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Parse fetched reports into production records
    Process {
        /// Max wells to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Scrape + process in one go
    Run {
        /// Max wells to scrape+process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Parse a saved well report page and print it as JSON
    Parse {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long)]
        well_id: String,
        #[arg(long)]
        county: String,
        #[arg(long)]
        township: String,
        #[arg(long)]
        well_name: String,
    },
    /// List canonical periods with production records
    Periods,
    /// Wells per county reporting production in one period
    Overview {
        /// Canonical period, e.g. 2020-12
        #[arg(short, long)]
        period: String,
    },
    /// Show scraping statistics
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
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Init { wells_file } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let wanted = wells_file.map(|p| read_well_list(&p)).transpose()?;

            let session = scraper::Session::login(&settings).await?;
            let page = session.fetch_index().await?;
            let rows = index::discover(&page);
            let total = rows.len();

            let mut queue = Vec::with_capacity(total);
            let mut stored = 0;
            for row in rows {
                let name = parser::report::normalize_well_name(&row.well_name);
                if wanted.as_ref().is_some_and(|w| !w.contains(&name)) {
                    continue;
                }
                if conn.exists(&name)? {
                    stored += 1;
                    continue;
                }
                queue.push(row);
            }
            let inserted = db::insert_wells(&conn, &queue)?;
            println!(
                "Queued {} new wells ({} found, {} already stored)",
                inserted, total, stored
            );
            Ok(())
        }
        Commands::Scrape { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let wells = db::fetch_unvisited(&conn, limit)?;
            if wells.is_empty() {
                println!("No unvisited wells. Run 'init' first or all reports are fetched.");
                return Ok(());
            }
            println!("Fetching {} well reports (streaming to DB)...", wells.len());
            let session = Arc::new(scraper::Session::login(&settings).await?);
            let stats =
                scraper::fetch_reports_streaming(&conn, session, wells, settings.concurrency).await?;
            println!(
                "Done: {} fetched ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Process { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let pages = db::fetch_unprocessed(&conn, limit)?;
            if pages.is_empty() {
                println!("No unprocessed reports. Run 'scrape' first.");
                return Ok(());
            }
            println!("Processing {} reports...", pages.len());
            let counts = process_pages(&conn, &pages)?;
            counts.print();
            Ok(())
        }
        Commands::Run { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let wells = db::fetch_unvisited(&conn, limit)?;
            if wells.is_empty() {
                println!("No unvisited wells. Run 'init' first.");
                return Ok(());
            }

            let t_fetch = Instant::now();
            println!("Pipeline: fetching {} well reports...", wells.len());
            let session = Arc::new(scraper::Session::login(&settings).await?);
            let stats =
                scraper::fetch_reports_streaming(&conn, session, wells, settings.concurrency).await?;
            println!(
                "Fetched {} reports ({} ok, {} errors) in {:.1}s",
                stats.total, stats.ok, stats.errors, t_fetch.elapsed().as_secs_f64()
            );

            let t_process = Instant::now();
            let pages = db::fetch_unprocessed(&conn, None)?;
            if pages.is_empty() {
                println!("Nothing to process (all fetches failed).");
                return Ok(());
            }
            println!("Processing {} reports...", pages.len());
            let counts = process_pages(&conn, &pages)?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();
            Ok(())
        }
        Commands::Parse { file, well_id, county, township, well_name } => {
            let page = std::fs::read(&file).with_context(|| format!("Failed to read {:?}", file))?;
            let parsed = parser::process_report(&page, &well_id, &county, &township, &well_name);
            if parsed.is_empty() {
                warn!("No report panel pro_{} in {:?}", well_id, file);
            }
            println!("{}", serde_json::to_string_pretty(&parsed)?);
            Ok(())
        }
        Commands::Periods => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let periods = db::fetch_periods(&conn)?;
            if periods.is_empty() {
                println!("No production records yet.");
            }
            for p in &periods {
                println!("{}", p);
            }
            Ok(())
        }
        Commands::Overview { period } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_overview(&conn, &period)?;
            if rows.is_empty() {
                println!("No records for period {}.", period);
                return Ok(());
            }
            println!("{:<20} | {:>7}", "County", "Wells");
            println!("{}", "-".repeat(30));
            for r in &rows {
                println!("{:<20} | {:>7}", r.county, r.wells);
            }
            let total: usize = rows.iter().map(|r| r.wells).sum();
            println!("\n{} wells across {} counties in {}", total, rows.len(), period);
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Queued:    {}", s.queued);
            println!("Visited:   {}", s.visited);
            println!("Unvisited: {}", s.unvisited);
            println!("Fetched:   {}", s.fetched);
            println!("Errors:    {}", s.errors);
            println!("Processed: {}", s.processed);
            println!("Records:   {}", s.records);
            println!("Rejected:  {}", s.rejected);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn read_well_list(path: &PathBuf) -> anyhow::Result<HashSet<String>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(parser::report::normalize_well_name)
        .collect())
}

struct ProcessCounts {
    wells: usize,
    requeued: usize,
    records: usize,
    rejected: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Saved {} wells, {} records, {} rejected periods ({} without report data requeued).",
            self.wells, self.records, self.rejected, self.requeued,
        );
    }
}

fn process_pages(
    conn: &rusqlite::Connection,
    pages: &[db::FetchedPage],
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts {
        wells: 0,
        requeued: 0,
        records: 0,
        rejected: 0,
    };

    for chunk in pages.chunks(500) {
        let parsed: Vec<_> = chunk
            .par_iter()
            .map(|page| {
                parser::process_report(
                    page.html.as_bytes(),
                    &page.well_id,
                    &page.county,
                    &page.township,
                    &page.raw_name,
                )
            })
            .collect();

        counts.rejected += parsed.iter().map(|w| w.rejected.len()).sum::<usize>();
        let saved = db::save_reports(conn, &parsed)?;
        counts.wells += saved.wells;
        counts.records += saved.records;
        counts.requeued += saved.requeued;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    info!(
        wells = counts.wells,
        records = counts.records,
        requeued = counts.requeued,
        "Processing finished"
    );
    Ok(counts)
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
