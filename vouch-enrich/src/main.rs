//! vouch-enrich - candidate enrichment runner
//!
//! Collects corroborating evidence for one candidate from the code host and
//! web search, aggregates the profile, validates claimed skills and prints
//! the outcome as JSON.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use vouch_common::events::EventBus;

use vouch_enrich::collectors::CollectorRegistry;
use vouch_enrich::config::{EnrichConfig, DATABASE_ENV};
use vouch_enrich::queue::EnrichmentQueue;
use vouch_enrich::store::{init_database_pool, ProfileStore, SqliteProfileStore};
use vouch_enrich::types::{CandidateSubmission, ExternalIdentifiers, ProfileFields, SkillClaim};

/// Command-line arguments for vouch-enrich
#[derive(Parser, Debug)]
#[command(name = "vouch-enrich")]
#[command(about = "Candidate profile enrichment and skill validation")]
#[command(version)]
struct Cli {
    /// Config file (TOML)
    #[arg(short, long, env = "VOUCH_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enrich one candidate
    Run(RunArgs),
    /// Show collection progress, profile and validations of a submission
    Status { submission_id: Uuid },
    /// Delete a submission and everything derived from it
    Delete { submission_id: Uuid },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Submission JSON handed over by the extraction step
    #[arg(long, conflicts_with_all = ["github", "search_name", "name"])]
    submission: Option<PathBuf>,

    /// Code-host username or profile URL
    #[arg(long)]
    github: Option<String>,

    /// Name to search the web for (defaults to --name)
    #[arg(long)]
    search_name: Option<String>,

    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    website: Option<String>,

    /// Claimed skill (repeatable)
    #[arg(long = "skill")]
    skills: Vec<String>,

    /// Claimed skill the candidate uses today (repeatable)
    #[arg(long = "current-skill")]
    current_skills: Vec<String>,

    /// Last use of a claimed skill, as SKILL=YYYY-MM-DD (repeatable)
    #[arg(long = "last-used", value_parser = parse_last_used)]
    last_used: Vec<(String, NaiveDate)>,
}

fn parse_last_used(value: &str) -> std::result::Result<(String, NaiveDate), String> {
    let (skill, date) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("expected SKILL=YYYY-MM-DD, got '{}'", value))?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{}': {}", date, e))?;
    Ok((skill.trim().to_string(), date))
}

impl RunArgs {
    fn into_submission(self) -> Result<CandidateSubmission> {
        if let Some(path) = &self.submission {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return serde_json::from_str(&text)
                .with_context(|| format!("Invalid submission JSON in {}", path.display()));
        }

        let mut claims: Vec<SkillClaim> = self
            .skills
            .iter()
            .map(SkillClaim::new)
            .chain(self.current_skills.iter().map(|s| SkillClaim::new(s).current()))
            .collect();
        for (skill, date) in self.last_used {
            match claims.iter_mut().find(|c| c.name.eq_ignore_ascii_case(&skill)) {
                Some(claim) => claim.last_used = Some(date),
                None => claims.push(SkillClaim::new(skill).last_used(date)),
            }
        }

        Ok(CandidateSubmission::new(
            ExternalIdentifiers {
                code_host: self.github,
                search_name: self.search_name,
            },
            ProfileFields {
                name: self.name,
                email: self.email,
                location: self.location,
                company: self.company,
                website: self.website,
            },
            claims,
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = EnrichConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting vouch-enrich {}", env!("CARGO_PKG_VERSION"));

    let db_path = vouch_common::config::resolve_database_path(cli.database.as_deref(), DATABASE_ENV);
    info!("Database: {}", db_path.display());
    let pool = init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    let store: Arc<dyn ProfileStore> = Arc::new(
        SqliteProfileStore::new(pool).with_max_lock_wait(config.orchestrator.db_max_lock_wait_ms),
    );

    let collectors = CollectorRegistry::from_config(&config).context("Failed to build collectors")?;
    let pipeline = Arc::new(vouch_enrich::build_pipeline(
        &config,
        Arc::clone(&store),
        collectors,
        EventBus::new(vouch_enrich::EVENT_CAPACITY),
    ));
    let queue = EnrichmentQueue::start(pipeline, &config.orchestrator);

    match cli.command {
        Command::Run(args) => {
            let submission = args.into_submission()?;
            let handle = queue.enqueue(submission).await?;
            let submission_id = handle.submission_id();
            info!(submission_id = %submission_id, "Enrichment queued");

            let wait = handle.wait();
            tokio::pin!(wait);
            let outcome = tokio::select! {
                outcome = &mut wait => outcome,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, cancelling enrichment");
                    queue.cancel(submission_id).await;
                    (&mut wait).await
                }
            };

            let outcome = outcome?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Status { submission_id } => {
            let status = queue.status(submission_id).await?;
            let profile = store.load_profile(submission_id).await?;
            let validations = store.load_validations(submission_id).await?;
            let report = serde_json::json!({
                "status": status,
                "profile": profile,
                "validations": validations,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Delete { submission_id } => {
            if queue.delete_submission(submission_id).await? {
                println!("Deleted {}", submission_id);
            } else {
                println!("No submission {}", submission_id);
            }
        }
    }

    queue.shutdown().await;
    Ok(())
}
