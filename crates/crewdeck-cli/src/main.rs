//! Crewdeck CLI - manage a crewdeck back-office session from the terminal.
//!
//! The session is restored (and verified) on every invocation, so each
//! command sees the same state a long-running front end would.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crewdeck_core::{
    ActivityHub, ActivityKind, AuthSnapshot, Config, FileSessionStore, GuardDecision,
    HttpAuthClient, KeyringSessionStore, RouteGuard, SessionEvent, SessionManager, SessionStore,
    StorageBackend, TokioScheduler,
};

// ============================================================================
// Constants
// ============================================================================

const ENV_PASSWORD: &str = "CREWDECK_PASSWORD";

/// How often `watch` checks whether the access token needs renewing
const TOKEN_CHECK_INTERVAL: Duration = Duration::from_secs(30);

const USAGE: &str = "\
Usage: crewdeck <command> [args]

Commands:
  login [email]    Sign in (password from CREWDECK_PASSWORD or prompt)
  logout           Sign out and forget the stored session
  status [--json]  Show the current session
  refresh          Renew the access token
  roles            Reload the signed-in user's roles
  guard <path>     Show what the route guard decides for <path>
  watch            Keep the session open; press Enter to count as activity
";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and, when `log_dir` is usable, to a daily file there.
/// The returned guard must stay alive until exit so the file writer flushes.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let appender = log_dir.and_then(|dir| {
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("crewdeck")
            .filename_suffix("log")
            .build(dir)
            .ok()
    });
    let (file_layer, guard) = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("status");
    if matches!(command, "help" | "-h" | "--help") {
        print!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load()?;
    let log_dir = config.cache_dir().ok();
    let _log_guard = init_tracing(log_dir.as_deref());
    debug!(command, "crewdeck starting");

    let (manager, activity) = connect(&config).await?;

    match command {
        "login" => login(&manager, &mut config, args.get(1).map(String::as_str)).await,
        "logout" => {
            manager.logout();
            println!("Signed out");
            Ok(())
        }
        "status" => status(&manager, args.iter().any(|a| a == "--json")),
        "refresh" => refresh(&manager).await,
        "roles" => roles(&manager).await,
        "guard" => {
            let path = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("Usage: crewdeck guard <path>"))?;
            guard(&manager, path);
            Ok(())
        }
        "watch" => watch(&manager, &activity).await,
        other => {
            eprint!("{}", USAGE);
            bail!("Unknown command: {}", other)
        }
    }
}

/// Build the session service from config and reconcile any stored session.
async fn connect(config: &Config) -> Result<(SessionManager, ActivityHub)> {
    let client = HttpAuthClient::new(config.api_base_url()?)?;
    let store: Arc<dyn SessionStore> = match config.storage {
        StorageBackend::File => Arc::new(FileSessionStore::new(config.cache_dir()?)),
        StorageBackend::Keyring => Arc::new(KeyringSessionStore::new()?),
    };
    let activity = ActivityHub::new();

    let manager = SessionManager::start(
        config.inactivity()?,
        Arc::new(client),
        store,
        Arc::new(TokioScheduler::current()),
        Arc::new(activity.clone()),
    )
    .await;

    Ok((manager, activity))
}

// ============================================================================
// Commands
// ============================================================================

async fn login(manager: &SessionManager, config: &mut Config, email: Option<&str>) -> Result<()> {
    let email = match email.map(str::to_string).or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt_email()?,
    };
    let password = match std::env::var(ENV_PASSWORD) {
        Ok(password) if !password.is_empty() => password,
        _ => rpassword::prompt_password("Password: ")?,
    };

    let ready = match manager.login(&email, &password).await {
        Ok(ready) => ready,
        Err(e) => bail!(e.user_message()),
    };

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    let snapshot = manager.snapshot();
    let name = snapshot.user.as_ref().map(|u| u.label()).unwrap_or_default();
    if ready {
        println!("Signed in as {}", name);
    } else {
        println!(
            "Signed in as {}, but roles could not be loaded yet. Run `crewdeck roles` to retry.",
            name
        );
    }
    Ok(())
}

fn status(manager: &SessionManager, json: bool) -> Result<()> {
    let snapshot = manager.snapshot();
    if json {
        let value = serde_json::json!({
            "state": snapshot.state.to_string(),
            "is_authenticated": snapshot.is_authenticated,
            "is_loading": snapshot.is_loading,
            "is_roles_loaded": snapshot.is_roles_loaded,
            "user": snapshot.user,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_status(&snapshot);
    }
    Ok(())
}

async fn refresh(manager: &SessionManager) -> Result<()> {
    if !manager.is_authenticated() {
        bail!("Not signed in");
    }
    if !manager.refresh_token().await {
        bail!("Session could not be renewed. Please sign in again.");
    }
    println!("Session renewed");
    Ok(())
}

async fn roles(manager: &SessionManager) -> Result<()> {
    if !manager.is_authenticated() {
        bail!("Not signed in");
    }
    if !manager.fetch_user_roles().await {
        bail!("Roles could not be loaded");
    }
    print_status(&manager.snapshot());
    Ok(())
}

fn guard(manager: &SessionManager, path: &str) {
    match RouteGuard::default().decide(path, &manager.snapshot()) {
        GuardDecision::Render => println!("render"),
        GuardDecision::Loading => println!("loading"),
        GuardDecision::Redirect(to) => println!("redirect {}", to),
    }
}

/// Hold the session open until it ends or stdin closes.
async fn watch(manager: &SessionManager, activity: &ActivityHub) -> Result<()> {
    if !manager.is_authenticated() {
        bail!("Not signed in");
    }

    let mut events = manager.events();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut token_check = tokio::time::interval(TOKEN_CHECK_INTERVAL);

    print_status(&manager.snapshot());
    println!("Watching session. Press Enter to stay active, Ctrl-D to stop.");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(_) => activity.record(ActivityKind::KeyPress),
                    None => break,
                }
            }
            event = events.recv() => {
                match event {
                    Ok(SessionEvent::InactivityWarning { remaining }) => {
                        println!(
                            "Still there? The session closes in {}s. Press Enter to stay signed in.",
                            remaining.as_secs()
                        );
                    }
                    Ok(SessionEvent::SignedOut(reason)) => {
                        println!("Session ended: {}", reason);
                        break;
                    }
                    Ok(SessionEvent::RolesUnavailable(e)) => {
                        println!("Roles unavailable: {}", e);
                    }
                    Ok(SessionEvent::StateChanged(state)) => {
                        info!(%state, "Session state changed");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed session events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = token_check.tick() => {
                if manager.valid_access_token().await.is_none() {
                    debug!("No usable access token");
                }
            }
        }
    }
    Ok(())
}

// ============================================================================
// Output helpers
// ============================================================================

fn print_status(snapshot: &AuthSnapshot) {
    println!("State: {}", snapshot.state);
    let Some(user) = &snapshot.user else {
        return;
    };
    println!("User:  {} <{}>", user.label(), user.email);
    if !snapshot.is_roles_loaded {
        println!("Roles: not loaded");
    } else if user.roles.is_empty() {
        println!("Roles: (none)");
    } else {
        println!("Roles: {}", user.roles);
    }
}

fn prompt_email() -> Result<String> {
    print!("Email: ");
    io::stdout().flush()?;

    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    Ok(email.trim().to_string())
}
