//! CLI entry point for sessync.

use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Password};
use secrecy::SecretString;
use tracing_subscriber::{fmt, EnvFilter};

use sessync::status::{CredentialState, StatusReport};
use sessync::{ArtifactKind, ArtifactManager, SessionSync, SyncReport};
use sessync_core::workflow::{validate_summary, Validation};
use sessync_core::{extract, AggregateStatus, SessyncConfig};
use sessync_journal::SessionLogEntry;

/// Window used by `logs --recent`.
const RECENT_DAYS: u32 = 7;

#[derive(Parser)]
#[command(name = "sessync", version)]
#[command(about = "Sync work-session summaries to AI context files and external trackers")]
struct Cli {
    /// Config file prefix (default: sessync).
    #[arg(short, long, default_value = "sessync", global = true)]
    config: String,

    /// Emit logs as JSON on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a session summary and publish it to every enabled integration.
    Update {
        summary: String,
        /// Sync even when workflow checks report errors.
        #[arg(long)]
        force: bool,
    },
    /// Check a summary against the workflow rules without syncing it.
    Validate { summary: String },
    /// Print the Full context artifact (or the Quick one).
    Context {
        /// Regenerate both artifacts from the session log first.
        #[arg(long)]
        refresh: bool,
        #[arg(long)]
        quick: bool,
    },
    /// Last session, integration health and maintenance hints.
    Status,
    /// List logged sessions, most recent first.
    Logs {
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
        /// Only sessions from the last 7 days.
        #[arg(long)]
        recent: bool,
    },
    /// Store credentials for an integration.
    Setup { integration: String },
    /// Delete every stored credential of an integration.
    RemoveCredentials {
        integration: String,
        #[arg(short, long)]
        yes: bool,
    },
    /// List stored credential names (never values).
    Credentials,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let config = SessyncConfig::load(&cli.config)?;

    match cli.command {
        Command::Update { summary, force } => {
            let sync = open_sync(config)?;
            let validation = sync.validate(&summary);
            print_validation(&validation);
            if !validation.is_valid() && !force {
                anyhow::bail!("Summary fails workflow checks; fix it or pass --force");
            }

            let report = sync.update(&summary).await?;
            print_sync_report(&report);
            if !report.is_success() {
                return Ok(ExitCode::from(2));
            }
        }
        Command::Validate { summary } => {
            let patterns = config.extraction_patterns()?;
            let references = extract(&summary, &patterns);
            let validation = validate_summary(&summary, &references, &config.workflow);
            if references.work_items.is_empty() {
                println!("Work items: none");
            } else {
                println!("Work items: {}", references.work_items.join(", "));
            }
            print_validation(&validation);
            if !validation.is_valid() {
                return Ok(ExitCode::FAILURE);
            }
            println!("Summary passes workflow checks");
        }
        Command::Context { refresh, quick } => {
            let kind = if quick {
                ArtifactKind::Quick
            } else {
                ArtifactKind::Full
            };
            if refresh {
                let sync = open_sync(config)?;
                let artifacts = sync.refresh_context().await?;
                let artifact = if quick { artifacts.quick } else { artifacts.full };
                println!("{}", artifact.content);
            } else {
                let manager = ArtifactManager::from_config(&config);
                match manager.read(kind)? {
                    Some(content) => println!("{content}"),
                    None => anyhow::bail!(
                        "Context has not been generated yet; run `sessync context --refresh`"
                    ),
                }
            }
        }
        Command::Status => {
            let sync = open_sync(config)?;
            print_status(&sync.status().await?);
        }
        Command::Logs { count, recent } => {
            let sync = open_sync(config)?;
            let entries = sync
                .recent_entries(count, recent.then_some(RECENT_DAYS))
                .await?;
            if entries.is_empty() {
                println!("No sessions logged");
            }
            for entry in &entries {
                print_entry(entry);
            }
        }
        Command::Setup { integration } => {
            let kind = config
                .integrations
                .get(&integration)
                .map(|c| c.settings.kind())
                .with_context(|| format!("Integration `{integration}` is not configured"))?;
            let sync = open_sync(config)?;

            let mut fields = Vec::new();
            for field in kind.required_fields() {
                let value = Password::new()
                    .with_prompt(format!("{integration} {field}"))
                    .interact()?;
                fields.push((field.to_string(), SecretString::from(value)));
            }
            sync.setup(&integration, fields)?;
            println!(
                "Stored {} credential field(s) for `{integration}` in {}",
                kind.required_fields().len(),
                sync.vault_backend()
            );
        }
        Command::RemoveCredentials { integration, yes } => {
            let sync = open_sync(config)?;
            let confirmed = yes
                || Confirm::new()
                    .with_prompt(format!("Remove all stored credentials for `{integration}`?"))
                    .default(false)
                    .interact()?;
            if !confirmed {
                println!("Nothing removed");
                return Ok(ExitCode::SUCCESS);
            }
            sync.remove_credentials(&integration)?;
            println!("Removed credentials for `{integration}`");
        }
        Command::Credentials => {
            let sync = open_sync(config)?;
            let listings = sync.list_credentials()?;
            if listings.is_empty() {
                println!("No credentials stored ({})", sync.vault_backend());
            }
            for listing in listings {
                println!("{}: {}", listing.integration_id, listing.fields.join(", "));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_sync(config: SessyncConfig) -> anyhow::Result<SessionSync> {
    let vault = sessync_vault::open_vault(&config.vault)?;
    if vault.backend().is_degraded() {
        eprintln!(
            "note: credentials are kept in an encrypted file with a machine-derived key, \
             which is weaker than the OS keystore"
        );
    }
    Ok(SessionSync::new(config, vault)?)
}

fn print_validation(validation: &Validation) {
    for e in &validation.errors {
        println!("error: {e}");
    }
    for w in &validation.warnings {
        println!("warning: {w}");
    }
    for s in &validation.suggestions {
        println!("suggestion: {s}");
    }
}

fn print_sync_report(report: &SyncReport) {
    let entry = &report.entry;
    println!("Session {} logged", entry.id);
    if !entry.references.work_items.is_empty() {
        println!("  work items: {}", entry.references.work_items.join(", "));
    }
    if report.artifacts.is_some() {
        println!("  context: refreshed");
    }
    for r in &entry.outcomes {
        println!(
            "  {} ({}): {} [{} ms]",
            r.integration_id, r.kind, r.outcome, r.elapsed_ms
        );
    }
    for w in &entry.warnings {
        println!("  warning: {w}");
    }
    match &entry.status {
        AggregateStatus::Success => println!("Status: success"),
        AggregateStatus::PartialFailure { shortfalls } => {
            println!("Status: partial failure");
            for s in shortfalls {
                println!("  - {}: {}", s.subject, s.detail);
            }
        }
    }
}

fn print_entry(entry: &SessionLogEntry) {
    let status = if entry.status.is_success() {
        "ok"
    } else {
        "partial"
    };
    println!(
        "{}  {:<7}  {}",
        entry.timestamp.format("%Y-%m-%d %H:%M"),
        status,
        entry.headline()
    );
    if !entry.references.work_items.is_empty() {
        println!("    {}", entry.references.work_items.join(", "));
    }
}

fn print_status(report: &StatusReport) {
    println!("Project: {}", report.project);
    match &report.last_entry {
        Some(entry) => println!(
            "Last session: {} ({})",
            entry.timestamp.format("%Y-%m-%d %H:%M UTC"),
            entry.headline()
        ),
        None => println!("Last session: none"),
    }

    println!("\nIntegrations:");
    if report.integrations.is_empty() {
        println!("  none configured");
    }
    for i in &report.integrations {
        let credentials = match &i.credentials {
            CredentialState::Configured => "credentials configured".to_string(),
            CredentialState::Missing { fields } => format!("missing {}", fields.join(", ")),
            CredentialState::Unknown { reason } => format!("credentials unknown ({reason})"),
        };
        let last = i
            .last_outcome
            .as_ref()
            .map(|(at, o)| format!("{} at {}", o.label(), at.format("%Y-%m-%d %H:%M")))
            .unwrap_or_else(|| "never attempted".to_string());
        println!(
            "  {} ({}): {}, {}, last {}",
            i.id,
            i.kind,
            if i.enabled { "enabled" } else { "disabled" },
            credentials,
            last
        );
    }

    let stats = &report.stats;
    println!(
        "\nSessions: {} total, {} in the last 30 days, {:.1} per week",
        stats.total, stats.last_30_days, stats.weekly_average
    );

    let m = &report.maintenance;
    if m.past_retention > 0 {
        println!(
            "{} session(s) are older than the {}-day retention window",
            m.past_retention, m.retention_days
        );
    }
    if m.rejected_lines > 0 {
        println!(
            "{} session log line(s) are unreadable or fail their integrity check",
            m.rejected_lines
        );
    }
    match m.artifacts_written {
        Some(at) => println!("Context artifacts written {}", at.format("%Y-%m-%d %H:%M UTC")),
        None => println!("Context artifacts not generated"),
    }
    if m.refresh_recommended {
        println!("Refresh recommended: run `sessync context --refresh`");
    }
    println!(
        "Credential store: {}{}",
        report.vault_backend,
        if report.is_vault_degraded() {
            " (degraded)"
        } else {
            ""
        }
    );
}
