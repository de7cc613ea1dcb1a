use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Password};
use std::io::Write;
use std::path::PathBuf;

pub const DEFAULT_AUTH_URL: &str = "https://auth.tdameritrade.com/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://api.tdameritrade.com/v1/oauth2/token";
pub const DEFAULT_REDIRECT_URI: &str = "https://127.0.0.1";
pub const DEFAULT_DB_FILE: &str = "~/.amtd/tokens.sqlite3";

/// TD Ameritrade OAuth2 token manager
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// App consumer key registered with the developer portal
    #[arg(short = 'k', long, env = "AMTD_API_KEY")]
    pub api_key: Option<String>,

    /// Redirect URI registered for the app
    #[arg(long, env = "AMTD_REDIRECT_URI", default_value = DEFAULT_REDIRECT_URI)]
    pub redirect_uri: String,

    /// Consent page URL
    #[arg(long, env = "AMTD_AUTH_URL", default_value = DEFAULT_AUTH_URL)]
    pub auth_url: String,

    /// OAuth2 token endpoint
    #[arg(long, env = "AMTD_TOKEN_URL", default_value = DEFAULT_TOKEN_URL)]
    pub token_url: String,

    /// Path to the SQLite token store
    #[arg(short = 'd', long, env = "AMTD_DB_FILE", default_value = DEFAULT_DB_FILE)]
    pub db_file: String,

    /// Token endpoint request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the consent page URL to open in a browser
    LoginUrl,

    /// Exchange the redirect URI the browser landed on for tokens
    Authorize {
        /// Full redirect URI including `?code=...`; prompted for when omitted
        redirect_uri: Option<String>,
    },

    /// Print an Authorization header value, refreshing if needed
    Bearer,

    /// Show stored tokens and where they are in their lifecycle
    Status,
}

#[derive(Clone, Debug)]
pub struct Config {
    // OAuth client
    pub api_key: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,

    // Token store
    pub db_file: PathBuf,

    // HTTP client
    pub http_timeout: u64,

    // Logging
    pub log_level: String,
}

impl Config {
    /// Build configuration from parsed arguments (CLI > ENV > .env > defaults)
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let config = Config {
            api_key: args
                .api_key
                .clone()
                .context("AMTD_API_KEY is required (use -k or set AMTD_API_KEY env var)")?,
            redirect_uri: args.redirect_uri.clone(),
            auth_url: args.auth_url.clone(),
            token_url: args.token_url.clone(),
            db_file: expand_tilde(&args.db_file),
            http_timeout: args.http_timeout,
            log_level: args.log_level.clone(),
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            anyhow::bail!("AMTD_API_KEY cannot be empty");
        }

        if self.http_timeout == 0 {
            anyhow::bail!("HTTP_REQUEST_TIMEOUT must be at least 1 second");
        }

        if !has_http_scheme(&self.redirect_uri) {
            anyhow::bail!(
                "AMTD_REDIRECT_URI must start with http:// or https://: {}",
                self.redirect_uri
            );
        }

        Ok(())
    }
}

fn has_http_scheme(uri: &str) -> bool {
    uri.starts_with("https://") || uri.starts_with("http://")
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

// === Interactive Setup ===

/// Check if interactive setup is needed (no API key from -k or env, and no .env file)
pub fn needs_interactive_setup(args: &CliArgs) -> bool {
    args.api_key.is_none() && !std::path::Path::new(".env").exists()
}

/// Configuration collected from interactive setup
#[derive(Debug, Clone)]
pub struct InteractiveConfig {
    pub api_key: String,
    pub redirect_uri: String,
    pub db_file: String,
}

impl CliArgs {
    /// Fill in the settings collected by interactive setup
    pub fn apply_interactive(&mut self, config: InteractiveConfig) {
        self.api_key = Some(config.api_key);
        self.redirect_uri = config.redirect_uri;
        self.db_file = config.db_file;
    }
}

/// Run interactive setup to collect required configuration
pub fn run_interactive_setup() -> Result<InteractiveConfig> {
    println!();
    println!("No configuration found. Let's set up your TD Ameritrade app credentials.");
    println!();

    let api_key: String = Password::new()
        .with_prompt("Enter your app consumer key (AMTD_API_KEY)")
        .interact()
        .context("Failed to read AMTD_API_KEY")?;

    if api_key.trim().is_empty() {
        anyhow::bail!("AMTD_API_KEY cannot be empty");
    }

    let redirect_uri: String = Input::new()
        .with_prompt("Redirect URI registered for the app")
        .default(DEFAULT_REDIRECT_URI.to_string())
        .interact_text()
        .context("Failed to read AMTD_REDIRECT_URI")?;

    let db_file: String = Input::new()
        .with_prompt("Token database path")
        .default(DEFAULT_DB_FILE.to_string())
        .interact_text()
        .context("Failed to read AMTD_DB_FILE")?;

    let config = InteractiveConfig {
        api_key,
        redirect_uri,
        db_file,
    };

    println!();
    let save_to_env = Confirm::new()
        .with_prompt("Save configuration to .env file?")
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save_to_env {
        save_env_file(&config)?;
        println!();
        println!("✅ Configuration saved to .env file");
    }

    println!();
    Ok(config)
}

fn render_env_file(config: &InteractiveConfig) -> String {
    format!(
        r#"# amtd-auth configuration
# Generated by interactive setup

# App consumer key (required)
AMTD_API_KEY={}

# Redirect URI registered for the app
AMTD_REDIRECT_URI={}

# SQLite token store
AMTD_DB_FILE={}

# Logging (trace, debug, info, warn, error)
LOG_LEVEL=info
"#,
        config.api_key, config.redirect_uri, config.db_file,
    )
}

/// Save configuration to .env file
fn save_env_file(config: &InteractiveConfig) -> Result<()> {
    let mut file = std::fs::File::create(".env").context("Failed to create .env file")?;
    file.write_all(render_env_file(config).as_bytes())
        .context("Failed to write .env file")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            api_key: "MYKEY".to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            db_file: PathBuf::from("/tmp/tokens.sqlite3"),
            http_timeout: 30,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/test/file.txt");
        assert!(path.to_string_lossy().contains("test/file.txt"));
        assert!(!path.to_string_lossy().starts_with("~"));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_tilde_just_tilde() {
        // Just "~" without slash should not expand
        let path = expand_tilde("~");
        assert_eq!(path, PathBuf::from("~"));
    }

    #[test]
    fn test_parse_args_with_defaults() {
        let args = CliArgs::try_parse_from(["amtd-auth", "-k", "MYKEY", "status"]).unwrap();
        assert_eq!(args.command, Command::Status);
        assert_eq!(args.http_timeout, 30);

        let config = Config::from_args(&args).unwrap();
        assert_eq!(config.api_key, "MYKEY");
        assert_eq!(config.redirect_uri, DEFAULT_REDIRECT_URI);
        assert_eq!(config.token_url, DEFAULT_TOKEN_URL);
        assert!(config.db_file.ends_with(".amtd/tokens.sqlite3"));
    }

    #[test]
    fn test_parse_authorize_subcommand() {
        let args = CliArgs::try_parse_from([
            "amtd-auth",
            "-k",
            "MYKEY",
            "authorize",
            "https://127.0.0.1/?code=abc",
        ])
        .unwrap();
        assert_eq!(
            args.command,
            Command::Authorize {
                redirect_uri: Some("https://127.0.0.1/?code=abc".to_string())
            }
        );

        let args = CliArgs::try_parse_from(["amtd-auth", "-k", "MYKEY", "authorize"]).unwrap();
        assert_eq!(args.command, Command::Authorize { redirect_uri: None });
    }

    #[test]
    fn test_api_key_flag_skips_interactive_setup() {
        let args = CliArgs::try_parse_from(["amtd-auth", "-k", "FLAGKEY", "bearer"]).unwrap();
        assert!(!needs_interactive_setup(&args));

        let config = Config::from_args(&args).unwrap();
        assert_eq!(config.api_key, "FLAGKEY");
    }

    #[test]
    fn test_help_and_version_exit_before_setup() {
        let err = CliArgs::try_parse_from(["amtd-auth", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);

        let err = CliArgs::try_parse_from(["amtd-auth", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_apply_interactive_fills_args() {
        let mut args = CliArgs::try_parse_from(["amtd-auth", "status"]).unwrap();
        args.apply_interactive(InteractiveConfig {
            api_key: "SETUPKEY".to_string(),
            redirect_uri: "https://localhost:8443".to_string(),
            db_file: "/tmp/amtd/tokens.sqlite3".to_string(),
        });

        let config = Config::from_args(&args).unwrap();
        assert_eq!(config.api_key, "SETUPKEY");
        assert_eq!(config.redirect_uri, "https://localhost:8443");
        assert_eq!(config.db_file, PathBuf::from("/tmp/amtd/tokens.sqlite3"));
    }

    #[test]
    fn test_validate() {
        assert!(config().validate().is_ok());

        let mut c = config();
        c.api_key = "  ".to_string();
        assert!(c.validate().is_err());

        let mut c = config();
        c.http_timeout = 0;
        assert!(c.validate().is_err());

        let mut c = config();
        c.redirect_uri = "127.0.0.1".to_string();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_render_env_file() {
        let rendered = render_env_file(&InteractiveConfig {
            api_key: "MYKEY".to_string(),
            redirect_uri: "https://127.0.0.1".to_string(),
            db_file: "~/.amtd/tokens.sqlite3".to_string(),
        });
        assert!(rendered.contains("AMTD_API_KEY=MYKEY\n"));
        assert!(rendered.contains("AMTD_REDIRECT_URI=https://127.0.0.1\n"));
        assert!(rendered.contains("AMTD_DB_FILE=~/.amtd/tokens.sqlite3\n"));
    }
}
