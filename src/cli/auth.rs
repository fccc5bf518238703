use std::io::IsTerminal;

use crate::client::ExpensifyClient;
use crate::config::{erase_token, load_stored_token, save_token, token_path};

use super::render::{KeyValueRow, render_output};
use super::{AuthCmd, AuthLoginArgs, Cli};

pub(super) fn run_auth(cli: &Cli, client: &ExpensifyClient, cmd: AuthCmd) -> anyhow::Result<()> {
    match cmd {
        AuthCmd::Status => status(cli, client),
        AuthCmd::Login(args) => login(cli, client, args),
        AuthCmd::Logout => {
            let p = cli.token_file.clone().unwrap_or_else(token_path);
            if erase_token(&p)? {
                println!("removed token at {}", p.display());
            } else {
                println!("no token stored at {}", p.display());
            }
            Ok(())
        }
    }
}

fn status(cli: &Cli, client: &ExpensifyClient) -> anyhow::Result<()> {
    let p = cli.token_file.clone().unwrap_or_else(token_path);
    let stored = load_stored_token(&p).ok();
    let source = match (&cli.token, &stored) {
        (Some(_), _) => "env",
        (None, Some(s)) if s.expires_at > chrono::Utc::now() => "file",
        (None, Some(_)) => "expired",
        (None, None) => "none",
    };
    let configured = matches!(source, "env" | "file");

    let mut rows = vec![
        KeyValueRow::new("token_configured", configured.to_string()),
        KeyValueRow::new("token_source", source),
        KeyValueRow::new("token_file", p.display().to_string()),
    ];
    if let Some(s) = &stored {
        rows.push(KeyValueRow::new("expires_at", s.expires_at.to_rfc3339()));
    }
    let valid = configured.then(|| client.get_transactions().is_ok());
    rows.push(KeyValueRow::new(
        "token_valid",
        valid
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    ));
    render_output(cli, &rows)
}

fn login(cli: &Cli, client: &ExpensifyClient, args: AuthLoginArgs) -> anyhow::Result<()> {
    let Some(email) = args.email.filter(|e| !e.trim().is_empty()) else {
        anyhow::bail!("missing --email (or EXTX_EMAIL)");
    };
    if cli.dry_run {
        println!("dry-run: would authenticate {email} and store the returned token");
        return Ok(());
    }

    let password = match args.password {
        Some(p) => p,
        None if std::io::stdin().is_terminal() => {
            rpassword::prompt_password(format!("Password for {email} (input hidden): "))?
        }
        None => anyhow::bail!("missing password: set EXTX_PASSWORD in non-interactive runs"),
    };
    if password.is_empty() {
        anyhow::bail!("empty password");
    }

    let token = client
        .authenticate(email.trim(), &password)
        .map_err(|e| anyhow::anyhow!(e.user_message("Authentication failed.")))?;

    let p = cli.token_file.clone().unwrap_or_else(token_path);
    let stored = save_token(&p, &token)?;
    tracing::info!(path = %p.display(), "token saved");
    println!(
        "logged in as {}; token saved to {} (expires {})",
        email.trim(),
        p.display(),
        stored.expires_at.to_rfc3339()
    );
    Ok(())
}
