use anyhow::Result;
use clap::Parser;
use dialoguer::Input;
use std::sync::Arc;

use amtd_auth::auth::{
    authorization_url, BearerCredential, SqliteStore, SystemClock, TokenClient, TokenManager,
    TokenState,
};
use amtd_auth::config::{self, CliArgs, Command, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    // Parse first so --help, --version and -k are honoured before any prompting
    let mut args = CliArgs::parse();

    // Interactive setup only when no API key came from -k, env or .env
    if config::needs_interactive_setup(&args) {
        let interactive_config = config::run_interactive_setup()?;
        args.apply_interactive(interactive_config);
    }

    let config = Config::from_args(&args)?;
    config.validate()?;

    // Initialize logging with a configured level; stdout is reserved for command output
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Token store: {}", config.db_file.display());
    tracing::debug!("Token endpoint: {}", config.token_url);

    let manager = build_manager(&config)?;

    match args.command {
        Command::LoginUrl => print_login_url(&config),
        Command::Authorize { redirect_uri } => {
            let redirect_uri = match redirect_uri {
                Some(uri) => uri,
                None => {
                    print_login_url(&config);
                    Input::<String>::new()
                        .with_prompt("Paste the full URL the browser was redirected to")
                        .interact_text()?
                }
            };

            let state = manager.complete_authorization(&redirect_uri).await?;
            println!("✅ Authorization complete");
            print_state(&state);
        }
        Command::Bearer => match manager.get_bearer_credential().await? {
            BearerCredential::Bearer(value) => println!("{}", value),
            BearerCredential::ReauthRequired => {
                eprintln!("Re-authentication needed! Open the consent page and run `amtd-auth authorize`:");
                eprintln!("  {}", login_url(&config));
                anyhow::bail!("Refresh token missing or expired");
            }
        },
        Command::Status => {
            let status = manager.status()?;
            println!("Status: {}", status);
            print_state(&manager.state()?);
            if status.requires_reauth() {
                println!();
                println!("Run `amtd-auth login-url` to start re-authentication.");
            }
        }
    }

    Ok(())
}

fn build_manager(config: &Config) -> Result<TokenManager> {
    let store = Arc::new(SqliteStore::open(&config.db_file)?);
    let client = TokenClient::new(
        config.token_url.clone(),
        config.api_key.clone(),
        config.redirect_uri.clone(),
        config.http_timeout,
    )?;

    Ok(TokenManager::new(store, Arc::new(SystemClock), client))
}

fn login_url(config: &Config) -> String {
    authorization_url(&config.auth_url, &config.api_key, &config.redirect_uri)
}

fn print_login_url(config: &Config) {
    println!("Open this URL, log in, and copy the address the browser lands on:");
    println!();
    println!("  {}", login_url(config));
    println!();
}

fn print_state(state: &TokenState) {
    let fmt_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
    };
    let fmt_token = |t: &Option<String>| match t {
        Some(t) => format!("{}...", t.chars().take(8).collect::<String>()),
        None => "-".to_string(),
    };

    println!("  Access token:  {}", fmt_token(&state.access_token));
    println!("  Access time:   {}", fmt_time(state.access_issued_at));
    println!("  Refresh token: {}", fmt_token(&state.refresh_token));
    println!("  Refresh time:  {}", fmt_time(state.refresh_issued_at));
}
