use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use shelf_app::modules::books::{persistence::CsvCatalogFile, store::Catalog};
use shelf_authz::{AuthContext, StaticCredentials};
use shelf_kernel::settings::Settings;

/// Authenticated book catalog service.
#[derive(Debug, Parser)]
#[command(name = "shelf", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Print a signed token for a configured user.
    Token {
        /// Account to issue the token for.
        #[arg(long)]
        user: String,
    },
    /// Load and validate configuration, then print a summary.
    CheckConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().with_context(|| "failed to load shelf settings")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings),
        Command::Token { user } => issue_token(&settings, &user),
        Command::CheckConfig => check_config(&settings),
    }
}

fn serve(settings: Settings) -> anyhow::Result<()> {
    shelf_telemetry::init(&settings.telemetry);
    tracing::info!(
        env = ?settings.environment,
        port = settings.server.port,
        "shelf cli starting server"
    );

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(shelf_app::run(settings, shelf_app::shutdown_signal()))
}

fn issue_token(settings: &Settings, user: &str) -> anyhow::Result<()> {
    let credentials = StaticCredentials::from_settings(&settings.auth.users)?;
    let identity = credentials
        .lookup(user)
        .ok_or_else(|| anyhow!("user '{user}' is not configured"))?;

    let auth = AuthContext::from_settings(&settings.auth)?;
    let issued = auth
        .tokens()
        .issue(&identity.user_id, identity.role)
        .context("failed to sign token")?;

    println!("{}", issued.token);
    Ok(())
}

fn check_config(settings: &Settings) -> anyhow::Result<()> {
    let credentials = StaticCredentials::from_settings(&settings.auth.users)?;
    AuthContext::from_settings(&settings.auth)?;

    let mut users: Vec<&str> = credentials.user_ids().collect();
    users.sort_unstable();

    println!("environment: {:?}", settings.environment);
    println!("listen: {}:{}", settings.server.host, settings.server.port);
    println!("token ttl: {}s", settings.auth.token_ttl_secs);
    println!("users: {}", users.join(", "));

    match &settings.catalog.data_file {
        None => println!("catalog: in-memory seed"),
        Some(path) => {
            let file = CsvCatalogFile::new(path);
            if file.exists() {
                let books = file
                    .load()
                    .with_context(|| format!("failed to load {}", path.display()))?;
                let catalog = Catalog::from_books(books)
                    .with_context(|| format!("invalid catalog data in {}", path.display()))?;
                println!("catalog: {} ({} books)", path.display(), catalog.len());
            } else {
                println!("catalog: {} (missing, will be created from seed)", path.display());
            }
        }
    }

    Ok(())
}
