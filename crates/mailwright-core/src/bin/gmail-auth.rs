//! Obtains (or renews) the Gmail credential ahead of time so the server never
//! has to open a browser.
//!
//! Usage: `gmail-auth [--config <path>] [--force]`

use std::env;
use std::error::Error;
use std::path::PathBuf;

use chrono::Utc;
use mailwright_core::bootstrap::{credential_store, http_client};
use mailwright_core::{Config, Credential, init_logging};
use tracing::info;

type AnyError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    force: bool,
}

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let args = parse_args(env::args().skip(1))?;
    let config_path = args.config.unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;
    let _guard = init_logging(&config.app.env)?;

    let http = http_client(&config.gmail)?;
    let store = credential_store(&config.gmail, http)?;

    let credential = if args.force {
        info!("discarding stored credential and requesting consent");
        store.regrant().await?
    } else {
        store.acquire().await?
    };

    println!("{}", describe(&credential, &config.gmail.token_path));
    Ok(())
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, AnyError> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--force" => parsed.force = true,
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            other => return Err(format!("unknown argument `{other}`").into()),
        }
    }
    Ok(parsed)
}

fn describe(credential: &Credential, token_path: &std::path::Path) -> String {
    let remaining = credential.expires_at - Utc::now();
    let scopes: Vec<&str> = credential.scopes.iter().map(String::as_str).collect();
    format!(
        "Credential stored at {}\n  expires: {} ({} minutes from now)\n  refreshable: {}\n  scopes: {}",
        token_path.display(),
        credential.expires_at.to_rfc3339(),
        remaining.num_minutes(),
        if credential.can_refresh() { "yes" } else { "no" },
        scopes.join(" "),
    )
}
