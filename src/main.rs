mod analysis;
mod artifact;
mod db;
mod error;
mod parser;
mod search;
mod settings;
mod source;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use tracing::info;

use parser::blocks::AllCapsName;
use parser::extract::candidate::CandidateRecord;
use parser::outline::{self, OutlineNode, Section, SectionNode, SharedPagePolicy};
use settings::Settings;
use source::{PageTextSource, TextDir};

#[derive(Parser)]
#[command(name = "merit_parser", about = "Merit-list extraction from bookmarked OCR page text")]
struct Cli {
    /// Range for bookmarks that share a page with the next one
    #[arg(long, global = true, value_enum)]
    shared_pages: Option<SharedPages>,
    /// Worker threads (0 = all cores)
    #[arg(short = 'j', long, global = true)]
    workers: Option<usize>,
    /// SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SharedPages {
    Empty,
    Extend,
}

impl From<SharedPages> for SharedPagePolicy {
    fn from(p: SharedPages) -> Self {
        match p {
            SharedPages::Empty => SharedPagePolicy::Empty,
            SharedPages::Extend => SharedPagePolicy::Extend,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Split OCR pages into sections along the bookmark outline
    Flatten {
        /// Outline JSON (list of bookmarks or a single root)
        #[arg(long)]
        outline: PathBuf,
        /// Directory with one .txt file per page
        #[arg(long)]
        pages: PathBuf,
        #[arg(short, long, default_value = "sections.json")]
        output: PathBuf,
    },
    /// Parse candidate records out of a section tree
    Parse {
        /// Section tree JSON written by `flatten`
        #[arg(long)]
        sections: PathBuf,
        #[arg(short, long, default_value = "candidates.json")]
        output: PathBuf,
    },
    /// Count candidates per gender, category and subject
    Analyze {
        /// Candidate JSON written by `parse`
        #[arg(long)]
        candidates: PathBuf,
        #[arg(short, long, default_value = "analytics.json")]
        output: PathBuf,
    },
    /// Flatten + parse + analyze in one pass, then store everything
    Run {
        #[arg(long)]
        outline: PathBuf,
        #[arg(long)]
        pages: PathBuf,
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
    },
    /// Stored records whose component scores do not add up
    Audit {
        /// Max rows to display
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show database statistics
    Stats,
    /// Find lines containing a phrase across all pages
    Search {
        phrase: String,
        #[arg(long)]
        pages: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load()?;
    if let Some(p) = cli.shared_pages {
        settings.shared_pages = p.into();
    }
    if let Some(w) = cli.workers {
        settings.workers = w;
    }
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    let result = match cli.command {
        Commands::Flatten {
            outline,
            pages,
            output,
        } => {
            let (forest, source) = load_inputs(&outline, &pages)?;
            let sections = flatten(&forest, &source, &settings)?;
            artifact::write_json(&output, &outline::section_tree(&forest, &sections))?;
            print_sections(&sections);
            println!("Wrote {}", output.display());
            Ok(())
        }
        Commands::Parse { sections: input, output } => {
            let tree: Vec<SectionNode> = artifact::read_json(&input)?;
            let sections = outline::sections_from_tree(&tree);
            if sections.is_empty() {
                println!("No sections in {}.", input.display());
                return Ok(());
            }
            println!("Parsing {} sections...", sections.len());
            let records = process_sections(&sections, &settings)?;
            artifact::write_json(&output, &records)?;
            print_records(&records);
            println!("Wrote {}", output.display());
            Ok(())
        }
        Commands::Analyze { candidates, output } => {
            let records: Vec<CandidateRecord> = artifact::read_json(&candidates)?;
            let table = analysis::aggregate(&records);
            if table.is_empty() {
                println!("No candidates in {}.", candidates.display());
                return Ok(());
            }
            let rows = table.rows();
            artifact::write_json(&output, &rows)?;
            print!("{}", analysis::render_table(&rows));
            println!("\n{} buckets from {} records | wrote {}", table.len(), records.len(), output.display());
            Ok(())
        }
        Commands::Run {
            outline,
            pages,
            out_dir,
        } => {
            let (forest, source) = load_inputs(&outline, &pages)?;

            // Phase 1: Flatten
            let t_flatten = Instant::now();
            let sections = flatten(&forest, &source, &settings)?;
            println!(
                "Flattened {} sections over {} pages in {:.1}s",
                sections.len(),
                source.page_count(),
                t_flatten.elapsed().as_secs_f64()
            );

            // Phase 2: Parse
            let t_parse = Instant::now();
            let records = process_sections(&sections, &settings)?;
            println!("Parsed in {:.1}s", t_parse.elapsed().as_secs_f64());
            print_records(&records);

            // Phase 3: Analyze
            let rows = analysis::aggregate(&records).rows();
            print!("\n{}", analysis::render_table(&rows));

            artifact::write_json(&out_dir.join("sections.json"), &outline::section_tree(&forest, &sections))?;
            artifact::write_json(&out_dir.join("candidates.json"), &records)?;
            artifact::write_json(&out_dir.join("analytics.json"), &rows)?;
            println!("\nArtifacts in {}", out_dir.display());

            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let run = db::start_run(&conn, &outline, &pages, source.page_count(), settings.shared_pages)?;
            db::save_sections(&conn, run, &sections)?;
            db::save_candidates(&conn, run, &records)?;
            db::save_analytics(&conn, run, &rows)?;
            db::finish_run(&conn, run)?;
            info!(run, db = %settings.db_path.display(), "run stored");
            println!("Stored as run #{} in {}", run, settings.db_path.display());
            Ok(())
        }
        Commands::Audit { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_invalid(&conn, limit)?;
            if rows.is_empty() {
                println!("No invalid records. Run 'run' first or every record adds up.");
                return Ok(());
            }

            println!(
                "{:>4} | {:<24} | {:<10} | {:<32} | {:>5} | {:>5} | {:>5} | {:>5} | {:>5}",
                "Run", "Name", "Roll", "Path", "Total", "Score", "Subj", "Exp", "Drift"
            );
            println!("{}", "-".repeat(117));
            for r in &rows {
                println!(
                    "{:>4} | {:<24} | {:<10} | {:<32} | {:>5} | {:>5} | {:>5} | {:>5} | {:>+5}",
                    r.run_id,
                    truncate(&r.name, 24),
                    truncate(&r.roll_no, 10),
                    truncate(&r.xpath, 32),
                    r.total_score,
                    r.score,
                    r.subject_score,
                    r.experience_score,
                    r.drift()
                );
            }
            println!("\n{} invalid records", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Runs:       {}", s.runs);
            println!("Sections:   {} ({} empty)", s.sections, s.empty_sections);
            println!("Candidates: {}", s.candidates);
            println!("Invalid:    {}", s.invalid);
            println!("Buckets:    {}", s.buckets);
            Ok(())
        }
        Commands::Search { phrase, pages } => {
            let source = TextDir::open(&pages)?;
            let hits = search::search_pages(&source, &phrase)?;
            for h in &hits {
                let file = source
                    .path_of(h.page)
                    .and_then(Path::file_name)
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("page {}", h.page + 1));
                println!("{}: {}", file, h.line);
            }
            let pages_hit = hits.iter().map(|h| h.page).unique().count();
            println!("\n{} matches on {} of {} pages", hits.len(), pages_hit, source.page_count());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn load_inputs(outline: &Path, pages: &Path) -> anyhow::Result<(Vec<OutlineNode>, TextDir)> {
    let forest = artifact::read_outline(outline)?;
    let source = TextDir::open(pages)?;
    if source.page_count() == 0 {
        anyhow::bail!("no .txt pages in {}", pages.display());
    }
    Ok((forest, source))
}

fn build_pool(settings: &Settings, jobs: usize) -> anyhow::Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(settings.worker_count(jobs))
        .build()
        .context("failed to start worker pool")
}

fn flatten(
    forest: &[OutlineNode],
    source: &TextDir,
    settings: &Settings,
) -> anyhow::Result<Vec<Section>> {
    let pool = build_pool(settings, source.page_count())?;
    let sections = pool
        .install(|| outline::flatten(forest, source.page_count(), source, settings.shared_pages))
        .context("failed to flatten outline")?;
    Ok(sections)
}

fn process_sections(sections: &[Section], settings: &Settings) -> anyhow::Result<Vec<CandidateRecord>> {
    use indicatif::{ProgressBar, ProgressStyle};

    let pool = build_pool(settings, sections.len())?;
    let pb = ProgressBar::new(sections.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut records = Vec::new();
    for chunk in sections.chunks(settings.chunk_size.max(1)) {
        records.extend(pool.install(|| {
            parser::process_sections(chunk, &AllCapsName, &settings.layout)
        }));
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(records)
}

fn print_sections(sections: &[Section]) {
    println!("{:>4} | {:<40} | {:>5} | {:<9} | {:>8}", "#", "Path", "Page", "Range", "Chars");
    println!("{}", "-".repeat(78));
    for s in sections {
        let path = if s.path_segments.is_empty() {
            s.title.clone()
        } else {
            s.xpath()
        };
        let page = s.page.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        let range = s
            .range
            .as_ref()
            .map(|r| format!("{}..{}", r.start, r.end))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:>4} | {:<40} | {:>5} | {:<9} | {:>8}",
            s.order,
            truncate(&path, 40),
            page,
            range,
            s.content.len()
        );
    }
    println!("\n{} sections", sections.len());
}

fn print_records(records: &[CandidateRecord]) {
    let invalid = records.iter().filter(|r| !r.valid).count();
    let paths = records.iter().map(|r| r.xpath.as_str()).unique().count();
    let bad_dob = records.iter().filter(|r| r.birth_date().is_none()).count();
    if bad_dob > 0 {
        tracing::warn!(records = bad_dob, "birth dates that are not calendar dates");
    }
    println!(
        "Extracted {} candidates from {} paths ({} fail the score check).",
        records.len(),
        paths,
        invalid
    );
}

/// At most `max` characters, with `...` appended when cut.
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    match (secs / 3600, secs / 60 % 60, secs % 60) {
        (0, 0, _) => format!("{:.1}s", d.as_secs_f64()),
        (0, m, s) => format!("{m}m {s}s"),
        (h, m, s) => format!("{h}h {m}m {s}s"),
    }
}
