use anyhow::Context;
use clap::{Parser, Subcommand};
use finscope_core::auth::{AuthClient, AuthEvent, SessionContext};
use finscope_core::config::Settings;
use finscope_core::domain::analysis::AnalysisKey;
use finscope_core::domain::receipt::ReceiptFile;
use finscope_core::llm::gateway::GatewayClient;
use finscope_core::receipts::{ReceiptPipeline, VisionReceiptExtractor};
use finscope_core::storage::object::{content_type_for, SupabaseStorage};
use finscope_core::storage::PgStore;
use finscope_core::time::resolve_period;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "finscope_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload and extract local receipt images, then recompute the month's expenses.
    IngestReceipts {
        #[command(flatten)]
        target: Target,

        /// Validate the files and stop before any upload or database write.
        #[arg(long)]
        dry_run: bool,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Re-sum the month's receipts into its analysis row.
    RecomputeExpenses {
        #[command(flatten)]
        target: Target,
    },
}

#[derive(Debug, clap::Args)]
struct Target {
    #[arg(long, conflicts_with = "access_token", required_unless_present = "access_token")]
    user_id: Option<Uuid>,

    /// Resolve the user from a Supabase access token instead of --user-id.
    #[arg(long)]
    access_token: Option<String>,

    /// Month to operate on (YYYY-MM). Defaults to the current UTC month.
    #[arg(long)]
    period: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(&settings, args.command).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "worker run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(settings: &Settings, command: Command) -> anyhow::Result<()> {
    match command {
        Command::IngestReceipts {
            target,
            dry_run,
            files,
        } => {
            let (month, year) = resolve_period(target.period.as_deref(), chrono::Utc::now())?;
            let files = read_files(&files).await?;

            if dry_run {
                let mut valid = 0usize;
                for file in &files {
                    match file.validate() {
                        Ok(()) => valid += 1,
                        Err(e) => tracing::warn!(file_name = %file.file_name, error = %e, "would be rejected"),
                    }
                }
                tracing::info!(
                    month,
                    year,
                    dry_run = true,
                    files = files.len(),
                    valid,
                    "receipt ingest (dry-run)"
                );
                return Ok(());
            }

            let key = AnalysisKey::new(resolve_user(settings, &target).await?, month, year)?;
            let pipeline = build_pipeline(settings).await?;

            let report = pipeline
                .run_batch_with(key, files, |progress, job| {
                    tracing::info!(
                        file_name = %job.file_name,
                        state = job.state.name(),
                        finished = progress.finished,
                        total = progress.total,
                        percent = progress.percent(),
                        "receipt progress"
                    );
                })
                .await?;

            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::RecomputeExpenses { target } => {
            let (month, year) = resolve_period(target.period.as_deref(), chrono::Utc::now())?;
            let key = AnalysisKey::new(resolve_user(settings, &target).await?, month, year)?;
            let pipeline = build_pipeline(settings).await?;

            let status = pipeline.recompute_expenses(key).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}

async fn resolve_user(settings: &Settings, target: &Target) -> anyhow::Result<Uuid> {
    if let Some(user_id) = target.user_id {
        return Ok(user_id);
    }
    let token = target
        .access_token
        .as_deref()
        .context("either --user-id or --access-token is required")?;

    let client = AuthClient::from_settings(settings)?;
    let session = SessionContext::new();
    session.subscribe(|event| {
        if let AuthEvent::SignedIn(s) = event {
            tracing::info!(user_id = %s.user.id, email = ?s.user.email, "signed in");
        }
    });
    let session = session.sign_in_with_token(&client, token).await?;
    Ok(session.user.id)
}

async fn build_pipeline(settings: &Settings) -> anyhow::Result<ReceiptPipeline> {
    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;
    finscope_core::storage::migrate(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let objects = Arc::new(SupabaseStorage::from_settings(settings)?);
    let llm = Arc::new(GatewayClient::from_settings(settings)?);
    let extractor = Arc::new(VisionReceiptExtractor::new(llm, objects.clone()));

    Ok(ReceiptPipeline::new(objects, store.clone(), store, extractor))
}

async fn read_files(paths: &[PathBuf]) -> anyhow::Result<Vec<ReceiptFile>> {
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file_name = file_name(path);
        out.push(ReceiptFile {
            content_type: content_type_for(&file_name).to_string(),
            file_name,
            bytes,
        });
    }
    Ok(out)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "receipt".to_string())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ingest_command() {
        let args = Args::try_parse_from([
            "finscope_worker",
            "ingest-receipts",
            "--user-id",
            "00000000-0000-0000-0000-000000000000",
            "--period",
            "2026-03",
            "--dry-run",
            "a.jpg",
            "b.png",
        ])
        .unwrap();
        match args.command {
            Command::IngestReceipts {
                target,
                dry_run,
                files,
            } => {
                assert_eq!(target.user_id, Some(Uuid::nil()));
                assert_eq!(target.period.as_deref(), Some("2026-03"));
                assert!(dry_run);
                assert_eq!(files.len(), 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn requires_a_user_or_token() {
        assert!(Args::try_parse_from(["finscope_worker", "recompute-expenses"]).is_err());
        assert!(Args::try_parse_from([
            "finscope_worker",
            "recompute-expenses",
            "--access-token",
            "t"
        ])
        .is_ok());
        assert!(Args::try_parse_from([
            "finscope_worker",
            "recompute-expenses",
            "--user-id",
            "00000000-0000-0000-0000-000000000000",
            "--access-token",
            "t"
        ])
        .is_err());
    }

    #[test]
    fn file_name_falls_back_for_bare_paths() {
        assert_eq!(file_name(Path::new("/tmp/scans/lunch.jpg")), "lunch.jpg");
        assert_eq!(file_name(Path::new("/")), "receipt");
    }
}
