//!
//! panelgate CLI binary
//! --------------------
//! Command-line tool for interacting with a running panelgate server and its
//! identity provider: allow-list checks, sign-in flows, and the settings API.

use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use panelgate::client::PanelClient;
use panelgate::identity::{AuthProvider, RestAuthProvider};
use panelgate::settings::Setting;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--server <url>] validate-admin <email>\n  {program} [--server <url>] magic-link <email>\n  {program} [--server <url>] login <email> <password>\n  {program} [--server <url>] settings get [--code <code>]\n  {program} [--server <url>] settings set <name=value>... [--code <code>]\n\nFlags:\n  --server <url>   Panelgate server base URL (default: http://127.0.0.1:8080)\n  --code <code>    Exchange code from a magic-link callback; establishes the\n                   session cookie before talking to gated routes\n  -h, --help       Show this help\n\nEnvironment:\n  PANELGATE_PROVIDER_URL   Hosted identity provider root URL (required)\n  PANELGATE_PROVIDER_KEY   Provider public API key (required)\n\nExamples:\n  {program} validate-admin admin@x.com\n  {program} magic-link admin@x.com\n  {program} login admin@x.com hunter2\n  {program} settings set site_name=Panel session_timeout=30 --code ab12"
    );
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            let value = args.remove(i + 1);
            args.remove(i);
            return Some(value);
        }
        i += 1;
    }
    None
}

fn provider_from_env() -> Result<Arc<dyn AuthProvider>> {
    let url = env::var("PANELGATE_PROVIDER_URL").context("Missing env PANELGATE_PROVIDER_URL")?;
    let key = env::var("PANELGATE_PROVIDER_KEY").context("Missing env PANELGATE_PROVIDER_KEY")?;
    Ok(Arc::new(RestAuthProvider::new(&url, &key)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);
    if args.iter().any(|a| a == "-h" || a == "--help") || args.is_empty() {
        print_usage(&program);
        return Ok(());
    }

    let server = take_flag(&mut args, "--server").unwrap_or_else(|| "http://127.0.0.1:8080".to_string());
    let code = take_flag(&mut args, "--code");

    let client = PanelClient::new(&server, provider_from_env()?)?;
    if let Some(code) = &code {
        client.follow_callback(code).await?;
    }

    let Some(command) = args.first().cloned() else {
        print_usage(&program);
        return Err(anyhow!("missing command"));
    };

    match command.as_str() {
        "validate-admin" => {
            let email = args.get(1).ok_or_else(|| anyhow!("validate-admin requires an email"))?;
            let is_admin = client.validate_admin(email).await;
            println!("{}", serde_json::json!({"email": email, "isAdmin": is_admin}));
        }
        "magic-link" => {
            let email = args.get(1).ok_or_else(|| anyhow!("magic-link requires an email"))?;
            client.sign_in_with_magic_link(email).await?;
            println!("magic link requested for {email}");
        }
        "login" => {
            let email = args.get(1).ok_or_else(|| anyhow!("login requires an email"))?;
            let password = args.get(2).ok_or_else(|| anyhow!("login requires a password"))?;
            let principal = client.sign_in_with_email(email, password).await?;
            println!("{}", serde_json::to_string_pretty(&principal)?);
        }
        "settings" => match args.get(1).map(|s| s.as_str()) {
            Some("get") => {
                let rows = client.fetch_settings().await?;
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
            Some("set") => {
                let mut rows: Vec<Setting> = Vec::new();
                for pair in args.iter().skip(2) {
                    let Some((name, value)) = pair.split_once('=') else {
                        return Err(anyhow!("settings set expects name=value pairs, got '{pair}'"));
                    };
                    rows.push(Setting { name: name.to_string(), value: value.to_string() });
                }
                if rows.is_empty() {
                    return Err(anyhow!("settings set requires at least one name=value pair"));
                }
                client.save_settings(&rows).await?;
                println!("saved {} settings", rows.len());
            }
            _ => {
                print_usage(&program);
                return Err(anyhow!("settings requires 'get' or 'set'"));
            }
        },
        other => {
            print_usage(&program);
            return Err(anyhow!("unknown command: {other}"));
        }
    }

    Ok(())
}
