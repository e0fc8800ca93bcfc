//! Pressroom HTTP server
//!
//! Run with: pressroom-server

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pressroom::bucket::{MemoryGateway, ObjectGateway};
use pressroom::server::{serve, AppState, ServerConfig};
use pressroom::source::{ContentSource, FixtureSource, GithubSource};
use pressroom::storage::Storage;
use pressroom::sync::SyncEngine;
use pressroom::types::{AccessMode, EngineConfig};

#[derive(Parser, Debug)]
#[command(name = "pressroom-server")]
#[command(about = "Content sync and access-routing server")]
struct Args {
    /// Database path
    #[arg(
        long,
        env = "PRESSROOM_DB_PATH",
        default_value = "~/.local/share/pressroom/pressroom.db"
    )]
    db_path: String,

    /// Listen port
    #[arg(long, env = "PRESSROOM_PORT", default_value = "8787")]
    port: u16,

    /// API key guarding the internal surface
    #[arg(long, env = "PRESSROOM_API_KEY")]
    api_key: String,

    /// Webhook shared secret
    #[arg(long, env = "PRESSROOM_WEBHOOK_SECRET")]
    webhook_secret: String,

    /// Content repository owner
    #[arg(long, env = "PRESSROOM_GITHUB_OWNER", default_value = "")]
    github_owner: String,

    /// Content repository name
    #[arg(long, env = "PRESSROOM_GITHUB_REPO", default_value = "")]
    github_repo: String,

    /// Content repository branch
    #[arg(long, env = "PRESSROOM_GITHUB_BRANCH", default_value = "main")]
    github_branch: String,

    /// GitHub access token
    #[arg(long, env = "PRESSROOM_GITHUB_TOKEN", default_value = "")]
    github_token: String,

    /// Protected bucket name
    #[arg(long, env = "PRESSROOM_PROTECTED_BUCKET", default_value = "")]
    protected_bucket: String,

    /// Public bucket name
    #[arg(long, env = "PRESSROOM_PUBLIC_BUCKET", default_value = "")]
    public_bucket: String,

    /// Access mode applied when no rule exists (open, password, email-list)
    #[arg(long, env = "PRESSROOM_DEFAULT_ACCESS", default_value = "open")]
    default_access: String,

    /// Delete stale objects after full syncs
    #[arg(long, env = "PRESSROOM_RECONCILE_STALE", default_value = "true")]
    reconcile_stale: bool,

    /// Bounded fan-out for uploads and deletes
    #[arg(long, env = "PRESSROOM_SYNC_CONCURRENCY", default_value = "8")]
    sync_concurrency: usize,

    /// Session token lifetime in hours
    #[arg(long, env = "PRESSROOM_SESSION_TTL_HOURS", default_value = "24")]
    session_ttl_hours: i64,

    /// Run against in-memory source and buckets (no credentials needed)
    #[arg(long, env = "PRESSROOM_DRY_RUN")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "pressroom=info,tower_http=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let db_path = expand_home(&args.db_path);
    let storage = Storage::open(&db_path)?;
    tracing::info!("database ready at {}", db_path);

    let default_access: AccessMode = args
        .default_access
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let engine_config = EngineConfig {
        default_access,
        reconcile_stale: args.reconcile_stale,
        sync_concurrency: args.sync_concurrency,
        main_branch: args.github_branch.clone(),
        session_ttl_hours: args.session_ttl_hours,
        ..EngineConfig::default()
    };

    let source: Arc<dyn ContentSource> = if args.dry_run {
        tracing::warn!("dry run: using in-memory content source");
        Arc::new(FixtureSource::new())
    } else {
        if args.github_owner.is_empty() || args.github_repo.is_empty() {
            anyhow::bail!("github owner/repo are required (or use --dry-run)");
        }
        Arc::new(GithubSource::new(
            &args.github_owner,
            &args.github_repo,
            &args.github_branch,
            &args.github_token,
        )?)
    };

    let gateway: Arc<dyn ObjectGateway> = build_gateway(&args).await?;

    let engine = Arc::new(SyncEngine::new(
        source,
        gateway,
        storage.clone(),
        engine_config,
    ));

    let state = AppState::new(
        engine,
        storage,
        ServerConfig {
            api_key: args.api_key,
            webhook_secret: args.webhook_secret,
        },
    );

    serve(state, args.port).await?;
    Ok(())
}

#[cfg(feature = "cloud")]
async fn build_gateway(args: &Args) -> anyhow::Result<Arc<dyn ObjectGateway>> {
    use pressroom::bucket::S3Gateway;

    if args.dry_run {
        tracing::warn!("dry run: using in-memory object store");
        return Ok(Arc::new(MemoryGateway::new()));
    }
    Ok(Arc::new(
        S3Gateway::from_env(&args.protected_bucket, &args.public_bucket).await?,
    ))
}

#[cfg(not(feature = "cloud"))]
async fn build_gateway(_args: &Args) -> anyhow::Result<Arc<dyn ObjectGateway>> {
    tracing::warn!("built without the cloud feature: using in-memory object store");
    Ok(Arc::new(MemoryGateway::new()))
}

fn expand_home(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest).to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string()),
        None => path.to_string(),
    }
}
