//! Pressroom CLI
//!
//! Sync runs, bucket status, access-rule administration and local
//! transform previews without going through the HTTP surface.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pressroom::access::{RuleStore, UpsertRule};
use pressroom::bucket::{MemoryGateway, ObjectGateway};
use pressroom::content::transform;
use pressroom::source::{ContentSource, FixtureSource, GithubSource};
use pressroom::storage::{recent_builds, Storage};
use pressroom::sync::SyncEngine;
use pressroom::types::{AccessMode, EngineConfig};

#[derive(Parser, Debug)]
#[command(name = "pressroom-cli")]
#[command(about = "Pressroom content sync CLI")]
struct Args {
    /// Database path
    #[arg(
        long,
        env = "PRESSROOM_DB_PATH",
        default_value = "~/.local/share/pressroom/pressroom.db"
    )]
    db_path: String,

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

    /// Run against in-memory source and buckets
    #[arg(long, env = "PRESSROOM_DRY_RUN")]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a sync
    Sync {
        /// Recompute and reconcile the entire content set
        #[arg(long)]
        full: bool,
        /// Source path to sync; repeatable
        #[arg(long = "file")]
        files: Vec<String>,
    },
    /// Show bucket contents and recent builds
    Status,
    /// Manage access rules
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
    /// Render one local markdown file and print the transform output
    Render {
        /// Content path, e.g. content/notes/my-note.md
        path: String,
        /// Local file to read instead of the remote source
        #[arg(long)]
        from: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    /// List rules
    List {
        #[arg(long)]
        r#type: Option<String>,
    },
    /// Create or replace a rule
    Set {
        r#type: String,
        slug: String,
        /// open, password or email-list
        #[arg(long, default_value = "open")]
        mode: String,
        #[arg(long)]
        password: Option<String>,
        /// Allowed email; repeatable
        #[arg(long = "email")]
        emails: Vec<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a rule
    Delete { r#type: String, slug: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pressroom=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();
    let storage = Storage::open(&expand_home(&args.db_path))?;

    match &args.command {
        Command::Sync { full, files } => {
            let engine = build_engine(&args, storage).await?;
            let report = if *full {
                engine.run_full("cli").await?
            } else if !files.is_empty() {
                engine.run_partial(files.clone(), "cli").await?
            } else {
                anyhow::bail!("pass --full or at least one --file");
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.success {
                std::process::exit(1);
            }
        }
        Command::Status => {
            let engine = build_engine(&args, storage.clone()).await?;
            for (bucket, objects) in engine.bucket_status().await? {
                println!("{}: {} object(s)", bucket, objects.len());
                for object in objects {
                    println!("  {} ({} bytes)", object.key, object.size);
                }
            }
            let builds = storage.with_connection(|conn| recent_builds(conn, 5))?;
            println!("recent builds:");
            for build in builds {
                println!(
                    "  #{} {} {} ({})",
                    build.id,
                    build.build_type,
                    build.status,
                    build.triggered_by.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Rules { command } => run_rules(command, &storage)?,
        Command::Render { path, from } => {
            let raw = match from {
                Some(local) => std::fs::read_to_string(local)?,
                None => {
                    let engine = build_engine(&args, storage).await?;
                    engine
                        .source()
                        .get_file_content(path)
                        .await?
                        .ok_or_else(|| anyhow::anyhow!("{} not found in source", path))?
                }
            };
            let transformed = transform(path, &raw)?;
            println!("title:     {}", transformed.title);
            println!("date:      {}", transformed.date.format("%Y-%m-%d"));
            println!("read time: {}", transformed.read_time);
            println!("excerpt:   {}", transformed.excerpt);
            for warning in &transformed.warnings {
                eprintln!("warning: {}", warning);
            }
            println!("---\n{}", transformed.html);
        }
    }

    Ok(())
}

fn run_rules(command: &RulesCommand, storage: &Storage) -> anyhow::Result<()> {
    match command {
        RulesCommand::List { r#type } => {
            let rules = storage.with_connection(|conn| {
                RuleStore::new(conn).list_rules(r#type.as_deref(), None)
            })?;
            println!("{}", serde_json::to_string_pretty(&rules)?);
        }
        RulesCommand::Set {
            r#type,
            slug,
            mode,
            password,
            emails,
            description,
        } => {
            let access_mode: AccessMode =
                mode.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let input = UpsertRule {
                access_mode,
                description: description.clone(),
                password: password.clone(),
                allowed_emails: emails.clone(),
            };
            let rule = storage.with_transaction(|conn| {
                RuleStore::new(conn).upsert_rule(r#type, slug, &input)
            })?;
            println!("{}", serde_json::to_string_pretty(&rule)?);
        }
        RulesCommand::Delete { r#type, slug } => {
            let deleted = storage
                .with_connection(|conn| RuleStore::new(conn).delete_rule(r#type, slug))?;
            if deleted {
                println!("deleted {}/{}", r#type, slug);
            } else {
                anyhow::bail!("no rule for {}/{}", r#type, slug);
            }
        }
    }
    Ok(())
}

async fn build_engine(args: &Args, storage: Storage) -> anyhow::Result<Arc<SyncEngine>> {
    let source: Arc<dyn ContentSource> = if args.dry_run {
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

    let gateway = build_gateway(args).await?;

    Ok(Arc::new(SyncEngine::new(
        source,
        gateway,
        storage,
        EngineConfig {
            main_branch: args.github_branch.clone(),
            ..EngineConfig::default()
        },
    )))
}

#[cfg(feature = "cloud")]
async fn build_gateway(args: &Args) -> anyhow::Result<Arc<dyn ObjectGateway>> {
    use pressroom::bucket::S3Gateway;

    if args.dry_run {
        return Ok(Arc::new(MemoryGateway::new()));
    }
    let gateway = S3Gateway::from_env(&args.protected_bucket, &args.public_bucket).await?;
    Ok(Arc::new(gateway))
}

#[cfg(not(feature = "cloud"))]
async fn build_gateway(_args: &Args) -> anyhow::Result<Arc<dyn ObjectGateway>> {
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
