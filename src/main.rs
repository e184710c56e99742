use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use cosmic_client::config::{self, EnvConfig, EnvOverrides, Mode};
use cosmic_client::migrate::{self, UrlRewrite};
use cosmic_client::session::{ApiError, ClientStorage, HttpAuthApi, Role, SessionController, UserPatch};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("auth client setup failed: {0}")]
    Api(#[from] ApiError),
    #[error("login failed; see log for details")]
    LoginFailed,
    #[error("not logged in")]
    NotAuthenticated,
    #[error("nothing to update; pass --name or --email")]
    EmptyPatch,
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "cosmic", about = "Cosmic client session and maintenance CLI")]
struct Cli {
    /// Build mode: `production`, anything else means development.
    #[arg(long, env = "MODE")]
    mode: Option<String>,

    /// Directory holding the persisted token and the cached user.
    #[arg(long, env = "COSMIC_STATE_DIR", default_value = ".cosmic")]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resolved environment configuration.
    Env,
    /// Restore the session and print the current user.
    Whoami,
    Login(LoginArgs),
    Logout,
    /// Patch the cached user locally.
    Update(UpdateArgs),
    /// Rewrite hardcoded local backend URLs in source files.
    FixUrls(FixUrlsArgs),
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[arg(long)]
    email: String,

    #[arg(long, env = "COSMIC_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long)]
    role: Role,
}

#[derive(Args, Debug)]
struct UpdateArgs {
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    email: Option<String>,
}

#[derive(Args, Debug)]
struct FixUrlsArgs {
    #[arg(long, default_value = migrate::DEFAULT_ROOT)]
    root: PathBuf,

    #[arg(long, default_value = migrate::LOCAL_ADDRESS)]
    from: String,

    #[arg(long, default_value = migrate::PRODUCTION_ADDRESS)]
    to: String,

    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!(error = %e, "failed to load .env");
        }
    }

    let cli = Cli::parse();

    match cli.command {
        Command::Env => print_json(resolve_env(cli.mode.as_deref())),
        Command::Whoami => {
            let session = open_session(cli.mode.as_deref(), &cli.state_dir)?;
            let state = session.restore().await;
            print_json(&state.user)
        }
        Command::Login(args) => run_login(cli.mode.as_deref(), &cli.state_dir, args).await,
        Command::Logout => {
            let session = open_session(cli.mode.as_deref(), &cli.state_dir)?;
            session.logout().await;
            println!("logged out");
            Ok(())
        }
        Command::Update(args) => run_update(cli.mode.as_deref(), &cli.state_dir, args).await,
        Command::FixUrls(args) => {
            run_fix_urls(args);
            Ok(())
        }
    }
}

fn resolve_env(mode: Option<&str>) -> &'static EnvConfig {
    config::install(EnvConfig::resolve(Mode::parse(mode), &EnvOverrides::from_env()))
}

fn open_session(mode: Option<&str>, state_dir: &Path) -> Result<SessionController, CliError> {
    let api = HttpAuthApi::from_config(resolve_env(mode))?;
    Ok(SessionController::new(Arc::new(api), ClientStorage::on_disk(state_dir)))
}

async fn run_login(mode: Option<&str>, state_dir: &Path, args: LoginArgs) -> Result<(), CliError> {
    let session = open_session(mode, state_dir)?;
    if !session.login(&args.email, &args.password, args.role).await {
        return Err(CliError::LoginFailed);
    }
    print_json(&session.user())
}

async fn run_update(mode: Option<&str>, state_dir: &Path, args: UpdateArgs) -> Result<(), CliError> {
    let patch = UserPatch { name: args.name, email: args.email, ..UserPatch::default() };
    if patch.is_empty() {
        return Err(CliError::EmptyPatch);
    }
    let session = open_session(mode, state_dir)?;
    session.restore().await;
    let user = session.update_user(&patch).ok_or(CliError::NotAuthenticated)?;
    print_json(&user)
}

fn run_fix_urls(args: FixUrlsArgs) {
    let rewrite = UrlRewrite { from: args.from, to: args.to, dry_run: args.dry_run, ..UrlRewrite::default() };
    println!("Replacing {} with {} under {}", rewrite.from, rewrite.to, args.root.display());

    let report = rewrite.rewrite_tree(&args.root);
    for path in &report.updated {
        let verb = if rewrite.dry_run { "Would update" } else { "Updated" };
        println!("{verb}: {}", path.display());
    }
    for failure in &report.failed {
        println!("Error processing {}: {failure}", failure.path().display());
    }
    println!(
        "URL replacement complete: {} scanned, {} updated, {} failed",
        report.scanned,
        report.updated.len(),
        report.failed.len()
    );
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
