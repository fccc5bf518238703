use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::client::{ClientMode, ExpensifyClient};
use crate::config::token_path;
use crate::proxy::{DEFAULT_PARTNER_NAME, DEFAULT_UPSTREAM_URL, ProxyConfig, ProxyState};
use crate::render::DEFAULT_TARGET_FRAMES;
use crate::types::{EntryKind, SortKey, SortType};

mod auth;
mod render;
mod transactions;

#[derive(Debug, Clone, Copy, ValueEnum, Serialize, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "extx")]
#[command(about = "CLI and credential proxy for Expensify transactions (unofficial)", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    pub output: OutputFormat,

    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    pub color: ColorMode,

    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Skip confirmation prompts for write actions (required in non-interactive runs).
    #[arg(long, global = true, default_value_t = false)]
    pub yes: bool,

    /// Endpoint of a running `extx serve` (or any compatible proxy).
    #[arg(
        long,
        global = true,
        env = "EXTX_PROXY_URL",
        default_value = "http://127.0.0.1:8080/proxy"
    )]
    pub proxy_url: String,

    #[arg(long, global = true, env = "EXTX_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, global = true, env = "EXTX_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    #[arg(long, global = true, env = "EXTX_FIXTURES_DIR", hide = true)]
    pub fixtures_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    Auth {
        #[command(subcommand)]
        cmd: AuthCmd,
    },
    Transactions {
        #[command(subcommand)]
        cmd: TransactionsCmd,
    },
    /// Run the credential-injecting proxy.
    Serve(ServeArgs),
    Version,
}

#[derive(Debug, Clone, Subcommand)]
pub enum AuthCmd {
    Status,
    Login(AuthLoginArgs),
    Logout,
}

#[derive(Debug, Clone, Args)]
pub struct AuthLoginArgs {
    #[arg(long, env = "EXTX_EMAIL")]
    pub email: Option<String>,

    /// Prompted for when omitted.
    #[arg(long, env = "EXTX_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum TransactionsCmd {
    List(TransactionsListArgs),
    Add(TransactionsAddArgs),
}

#[derive(Debug, Clone, Args)]
pub struct TransactionsListArgs {
    /// Case-insensitive match on merchant or comment.
    #[arg(long)]
    pub search: Option<String>,

    /// Sort by a column. Repeating the same column flips the direction.
    #[arg(long, value_enum)]
    pub sort: Vec<SortKey>,

    /// Comparison to use for every `--sort` (defaults to the column's natural type).
    #[arg(long, value_enum)]
    pub sort_type: Option<SortType>,

    /// Show the details of the row at this position in the view.
    #[arg(long)]
    pub show: Option<usize>,

    #[arg(long, default_value_t = DEFAULT_TARGET_FRAMES)]
    pub target_frames: usize,
}

#[derive(Debug, Clone, Args)]
pub struct TransactionsAddArgs {
    /// YYYY-MM-DD, today or earlier.
    #[arg(long)]
    pub date: String,

    #[arg(long)]
    pub merchant: String,

    /// Amount in dollars, e.g. `12.50`.
    #[arg(long, allow_hyphen_values = true)]
    pub amount: String,

    #[arg(long)]
    pub note: Option<String>,

    #[arg(long, value_enum, default_value_t = EntryKind::Debit)]
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[arg(long, env = "EXTX_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    #[arg(long, env = "EXTX_UPSTREAM_URL", default_value = DEFAULT_UPSTREAM_URL)]
    pub upstream_url: String,

    #[arg(long, env = "PARTNER_NAME", default_value = DEFAULT_PARTNER_NAME)]
    pub partner_name: String,

    #[arg(long, env = "PARTNER_PASSWORD", hide_env_values = true)]
    pub partner_password: Option<String>,
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Command::Version => {
            println!("expensify-tx-cli {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Command::Serve(args) => return serve(args.clone()),
        Command::Auth { .. } | Command::Transactions { .. } => {}
    }

    let mode = match &cli.fixtures_dir {
        Some(dir) => ClientMode::Fixtures(dir.clone()),
        None => ClientMode::Http {
            proxy_url: cli.proxy_url.clone(),
            token: cli.token.clone(),
            token_file: cli.token_file.clone().unwrap_or_else(token_path),
        },
    };
    let client = ExpensifyClient::new(mode);

    match &cli.command {
        Command::Auth { cmd } => auth::run_auth(&cli, &client, cmd.clone()),
        Command::Transactions { cmd } => {
            transactions::run_transactions(&cli, &client, cmd.clone())
        }
        Command::Serve(_) | Command::Version => Ok(()),
    }
}

fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = ProxyConfig::new(args.upstream_url, args.partner_name, args.partner_password);
    if config.partner_password.is_none() {
        tracing::warn!("PARTNER_PASSWORD is not set; every proxied call will fail");
    }
    let state = ProxyState::new(config).context("failed to build upstream HTTP client")?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&args.bind)
            .await
            .with_context(|| format!("failed to bind {}", args.bind))?;
        eprintln!("proxy listening on http://{}/proxy", listener.local_addr()?);
        crate::proxy::run_with_listener(state, listener).await?;
        Ok::<(), anyhow::Error>(())
    })
}

fn should_color(cli: &Cli) -> bool {
    match cli.color {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => std::io::stdout().is_terminal(),
    }
}

fn confirm_write(cli: &Cli, action: &str) -> anyhow::Result<()> {
    if cli.dry_run || cli.yes {
        return Ok(());
    }
    if !std::io::stdin().is_terminal() {
        anyhow::bail!("refusing to write in non-interactive mode without --yes");
    }

    eprintln!("{action}");
    let input = rpassword::prompt_password("Proceed? Type 'yes' to confirm: ")?;
    if input.trim() != "yes" {
        anyhow::bail!("aborted");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_sort_flags_are_collected_in_order() {
        let cli = Cli::try_parse_from([
            "extx",
            "transactions",
            "list",
            "--sort",
            "merchant",
            "--sort",
            "merchant",
            "--sort-type",
            "text",
        ])
        .unwrap();
        let Command::Transactions {
            cmd: TransactionsCmd::List(args),
        } = cli.command
        else {
            panic!("expected transactions list");
        };
        assert_eq!(args.sort, vec![SortKey::Merchant, SortKey::Merchant]);
        assert_eq!(args.sort_type, Some(SortType::Text));
        assert_eq!(args.target_frames, DEFAULT_TARGET_FRAMES);
    }

    #[test]
    fn add_defaults_to_debit() {
        let cli = Cli::try_parse_from([
            "extx", "transactions", "add", "--date", "2024-01-01", "--merchant", "Cafe",
            "--amount", "3.20",
        ])
        .unwrap();
        let Command::Transactions {
            cmd: TransactionsCmd::Add(args),
        } = cli.command
        else {
            panic!("expected transactions add");
        };
        assert_eq!(args.kind, EntryKind::Debit);
        assert_eq!(args.note, None);
    }

    #[test]
    fn serve_defaults_point_at_expensify() {
        let cli = Cli::try_parse_from(["extx", "serve", "--partner-password", "pw"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.upstream_url, "https://www.expensify.com/api");
        assert_eq!(args.partner_password.as_deref(), Some("pw"));
    }
}
