use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use schemars::schema_for;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use time::macros::format_description;
use time::{Duration, OffsetDateTime};
use tracing::info;
use votum_core::config::{BackendKind, Config};
use votum_core::documents::DocumentSource;
use votum_core::feed::Snapshot;
use votum_core::logging::{LogFormat, init_logging};
use votum_core::mapper::parse_document_date;
use votum_core::query::{DateRange, MeasureFilter};
use votum_core::schema::{Measure, MeasureStatus, ProposalDraft, VoteChoice};
use votum_core::Portal;

#[derive(Parser)]
#[command(name = "votum")]
#[command(about = "Vote on parliamentary measures from the command line", long_about = None)]
struct Cli {
    /// TOML config file; defaults apply when it does not exist
    #[arg(long, global = true, default_value = "votum.toml")]
    config: PathBuf,

    /// Override the configured backend (local or remote)
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Override the configured SQLite path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the local user identity
    Whoami,
    /// List measures, optionally filtered
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Show one measure with its tally, your vote and comments
    Show { id: String },
    /// Cast or change your vote (for, against, abstain)
    Vote { id: String, choice: VoteChoice },
    /// Comment on a measure
    Comment { id: String, body: String },
    /// Submit a proposal of your own
    Submit {
        #[arg(long)]
        title: String,
        #[arg(long)]
        summary: String,
        #[arg(long)]
        category: String,
    },
    /// List known categories
    Categories,
    /// Import draft bills from the document API into the local store
    Import {
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Ask the remote backend to resync its documents
    Sync,
    /// Poll the measure listing at the configured interval
    Watch {
        #[arg(long, default_value_t = 10)]
        rounds: u32,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Export JSON schemas
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Export JSON Schema files for the stored record types
    Export {
        /// Output directory (default: ./schemas)
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,
    },
}

#[derive(clap::Args)]
struct FilterArgs {
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    status: Option<MeasureStatus>,
    /// Earliest start date, YYYY-MM-DD or RFC 3339
    #[arg(long)]
    from: Option<String>,
    /// Latest start date, inclusive
    #[arg(long)]
    to: Option<String>,
}

impl FilterArgs {
    fn into_filter(self) -> Result<MeasureFilter> {
        let start = self.from.as_deref().map(parse_date).transpose()?;
        let end = self
            .to
            .as_deref()
            .map(|value| {
                let at = parse_date(value)?;
                // a bare date covers the whole day
                Ok::<_, anyhow::Error>(if value.trim().len() == 10 {
                    at + Duration::days(1) - Duration::seconds(1)
                } else {
                    at
                })
            })
            .transpose()?;
        let date_range = (start.is_some() || end.is_some()).then_some(DateRange { start, end });

        Ok(MeasureFilter {
            search_text: self.search,
            date_range,
            category: self.category,
            status: self.status,
        })
    }
}

fn parse_date(value: &str) -> Result<OffsetDateTime> {
    parse_document_date(value).with_context(|| format!("invalid date: {value}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Schema { command } => match command {
            SchemaCommands::Export { out_dir } => schema_export(&out_dir),
        },
        command => {
            let mut config = Config::load_or_default(&cli.config)?;
            if let Some(backend) = cli.backend {
                config.backend = backend;
            }
            if let Some(db) = cli.db {
                config.db_path = db;
            }
            init_logging(LogFormat::parse(&config.log_format), &config.log_level);

            let portal = Portal::open(&config)?;
            run(&portal, &config, command)
        }
    }
}

fn run(portal: &Portal, config: &Config, command: Commands) -> Result<()> {
    match command {
        Commands::Whoami => {
            let user = portal.current_user();
            println!("{} ({})", user.display_name, user.id);
        }
        Commands::List { filter } => {
            let snapshot = portal.list_measures(&filter.into_filter()?)?;
            print_snapshot(&snapshot);
        }
        Commands::Show { id } => show(portal, &id)?,
        Commands::Vote { id, choice } => {
            let vote = portal.cast_vote(&id, choice)?;
            println!("Voted {} on {}", vote.choice, vote.measure_id);
        }
        Commands::Comment { id, body } => {
            let comment = portal.add_comment(&id, &body)?;
            println!("Comment {} added", comment.id);
        }
        Commands::Submit {
            title,
            summary,
            category,
        } => {
            let measure = portal.submit_proposal(&ProposalDraft {
                title,
                summary,
                category,
            })?;
            println!("Submitted {} as {}", measure.id, measure.status);
        }
        Commands::Categories => {
            for category in portal.categories()? {
                println!("{category}");
            }
        }
        Commands::Import { pages } => {
            let source = DocumentSource::new(
                &config.documents.base_url,
                config.documents.api_key.clone(),
                config.remote_timeout(),
            )?;
            let report = portal.import_documents(&source, pages)?;
            println!(
                "Imported {} new, {} updated, {} skipped",
                report.imported, report.updated, report.skipped
            );
        }
        Commands::Sync => {
            portal.trigger_sync()?;
            println!("Sync triggered on {}", portal.backend().name());
        }
        Commands::Watch { rounds, filter } => watch(portal, rounds, filter.into_filter()?)?,
        Commands::Schema { command } => match command {
            SchemaCommands::Export { out_dir } => schema_export(&out_dir)?,
        },
    }

    Ok(())
}

fn show(portal: &Portal, id: &str) -> Result<()> {
    let Some(measure) = portal.measure(id)? else {
        bail!("measure not found: {id}");
    };

    println!("{}", measure.title);
    println!(
        "{} | {} | {} - {}",
        measure.category,
        measure.status,
        format_date(measure.start_at),
        format_date(measure.end_at)
    );
    println!();
    println!("{}", measure.summary);
    println!();

    let totals = measure.totals;
    for choice in VoteChoice::ALL {
        println!(
            "  {:<8} {:>6}  {:>5.1}%",
            choice.as_str(),
            totals.get(choice),
            totals.percent(choice)
        );
    }
    println!(
        "  majority: {:?}, quorum {}/{}{}",
        totals.majority(),
        totals.total(),
        measure.quorum,
        if totals.quorum_reached(measure.quorum) {
            " reached"
        } else {
            ""
        }
    );

    match portal.my_vote(id)? {
        Some(vote) => println!("  your vote: {}", vote.choice),
        None => println!("  you have not voted"),
    }

    for source in &measure.sources {
        println!("  {}: {}", source.label, source.url);
    }

    let comments = portal.comments(id);
    if !comments.is_empty() {
        println!();
        for comment in comments {
            println!(
                "[{}] {}: {}",
                format_date(comment.created_at),
                comment.user_display_name,
                comment.body
            );
        }
    }
    Ok(())
}

fn watch(portal: &Portal, rounds: u32, filter: MeasureFilter) -> Result<()> {
    let interval = portal.poll_policy().interval;
    let pause = std::time::Duration::try_from(interval)
        .context("poll interval must not be negative")?;

    for round in 1..=rounds {
        let snapshot = portal.refresh_measures(&filter)?;
        info!(round, count = snapshot.measures.len(), "poll");
        print_snapshot(&snapshot);
        if round < rounds {
            thread::sleep(pause);
        }
    }
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot) {
    if snapshot.degraded {
        let note = if snapshot.stale { ", stale" } else { "" };
        println!(
            "(offline: showing data from {}{note})",
            format_date(snapshot.fetched_at)
        );
    }
    if snapshot.measures.is_empty() {
        println!("No measures match.");
    }
    for measure in &snapshot.measures {
        print_row(measure);
    }
}

fn print_row(measure: &Measure) {
    println!(
        "{:<28} {:<8} {:>5}/{:<5}/{:<5} {}",
        measure.id,
        measure.status.as_str(),
        measure.totals.for_votes,
        measure.totals.against,
        measure.totals.abstain,
        measure.title
    );
}

fn format_date(at: OffsetDateTime) -> String {
    at.format(format_description!("[day].[month].[year]"))
        .unwrap_or_else(|_| at.to_string())
}

fn schema_export(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)?;

    let measure_schema = schema_for!(votum_core::schema::Measure);
    fs::write(
        out_dir.join("Measure.schema.json"),
        serde_json::to_string_pretty(&measure_schema)?,
    )?;

    let vote_schema = schema_for!(votum_core::schema::Vote);
    fs::write(
        out_dir.join("Vote.schema.json"),
        serde_json::to_string_pretty(&vote_schema)?,
    )?;

    let comment_schema = schema_for!(votum_core::schema::Comment);
    fs::write(
        out_dir.join("Comment.schema.json"),
        serde_json::to_string_pretty(&comment_schema)?,
    )?;

    println!("Exported schemas to {}", out_dir.display());
    Ok(())
}
