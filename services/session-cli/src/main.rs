//! OAuth session CLI
//!
//! Host binary for the session manager:
//! 1. Loads the credential and provider endpoints from TOML
//! 2. Opens the persisted session bound to the credential hash
//! 3. Runs one command: login, token, status, invalidate, logout
//!
//! Login serves the redirect URI on a loopback listener until the provider
//! redirects back (or Ctrl+C cancels the authorization).

mod callback;
mod config;
mod error;
mod presenter;

use anyhow::{Context, Result};
use session::{SessionController, UnauthorizedSignal, unauthorized_channel};
use session_auth::{TokenExchanger, TokenStore, now_millis};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::callback::LoopbackTarget;
use crate::config::Config;
use crate::error::Error;
use crate::presenter::ConsolePresenter;

/// How long `invalidate` waits for the forced refresh to land
const INVALIDATE_WAIT: Duration = Duration::from_secs(30);

/// Subcommands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Login,
    Token,
    Status,
    /// Report the current token as rejected, forcing a refresh
    Invalidate,
    Logout,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "login" => Some(Command::Login),
            "token" => Some(Command::Token),
            "status" => Some(Command::Status),
            "invalidate" => Some(Command::Invalidate),
            "logout" => Some(Command::Logout),
            _ => None,
        }
    }
}

const USAGE: &str = "usage: oauth-session [--config <path>] <login|token|status|invalidate|logout>";

/// Split argv into the command and an optional `--config` value.
fn parse_args(args: &[String]) -> Result<(Command, Option<&str>)> {
    let mut config = None;
    let mut command = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let value = iter.next().context("--config requires a path")?;
            config = Some(value.as_str());
        } else if command.is_none() {
            let parsed = Command::parse(arg)
                .with_context(|| format!("unknown command {arg:?}\n{USAGE}"))?;
            command = Some(parsed);
        } else {
            anyhow::bail!("unexpected argument {arg:?}\n{USAGE}");
        }
    }
    let command = command.context(USAGE)?;
    Ok((command, config))
}

/// Wired-up session for one CLI invocation
struct App {
    controller: Arc<SessionController>,
    signal: UnauthorizedSignal,
    redirect_uri: String,
    store_path: String,
}

impl App {
    async fn build(config: &Config) -> Result<Self> {
        let credential = config
            .credential_config()
            .context("invalid credential configuration")?;
        let credential_hash = config.credential_hash(&credential);

        let store = TokenStore::open(config.session.store_path.clone(), &credential_hash)
            .await
            .with_context(|| {
                format!(
                    "failed to open session store {}",
                    config.session.store_path.display()
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("failed to build HTTP client")?;

        let redirect_uri = credential.redirect_uri.clone();
        let (signal, listener) = unauthorized_channel();
        let controller = SessionController::new(
            TokenExchanger::new(client, credential),
            store,
            Arc::new(ConsolePresenter::new()),
            listener,
            config.refresh_policy(),
        );

        Ok(Self {
            controller,
            signal,
            redirect_uri,
            store_path: config.session.store_path.display().to_string(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support.
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (command, cli_config_path) = parse_args(&args)?;

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), ?command, "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let app = App::build(&config).await?;

    match command {
        Command::Login => login(&app).await,
        Command::Token => token(&app).await,
        Command::Status => status(&app).await,
        Command::Invalidate => invalidate(&app).await,
        Command::Logout => {
            app.controller.logout().await;
            println!("Logged out.");
            Ok(())
        }
    }
}

/// Run the authorization-code flow through the loopback listener.
async fn login(app: &App) -> Result<()> {
    let target = LoopbackTarget::parse(&app.redirect_uri)?;
    let listener = target.bind().await?;
    info!(addr = %target.addr, path = %target.path, "callback listener ready");

    let router = callback::router(app.controller.clone(), &target);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<session_auth::Result<()>>();
    let err_tx = done_tx.clone();
    app.controller
        .login(
            move || {
                let _ = done_tx.send(Ok(()));
            },
            move |e| {
                let _ = err_tx.send(Err(e));
            },
        )
        .await;

    let outcome = tokio::select! {
        outcome = done_rx.recv() => outcome,
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, cancelling authorization");
            app.controller.cancel_authorization().await;
            done_rx.recv().await
        }
    };

    let _ = shutdown_tx.send(());
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "callback listener error"),
        Err(e) => warn!(error = %e, "callback listener task panicked"),
    }

    match outcome {
        Some(Ok(())) => {
            println!("Logged in.");
            Ok(())
        }
        Some(Err(e)) => Err(Error::Login(e).into()),
        None => Err(Error::LoginAbandoned.into()),
    }
}

/// Print a valid access token, refreshing it first if needed.
async fn token(app: &App) -> Result<()> {
    let token = app
        .controller
        .current_access_token()
        .await
        .ok_or(Error::NotLoggedIn)?;
    println!("{token}");
    Ok(())
}

/// Print the session summary as JSON. Token values are never shown.
async fn status(app: &App) -> Result<()> {
    println!("{}", status_json(app).await);
    Ok(())
}

async fn status_json(app: &App) -> serde_json::Value {
    let phase = app.controller.phase().await;
    let state = app.controller.session_state().await;
    let now = now_millis();
    let expiry = state.token.as_ref().map(|t| {
        serde_json::json!({
            "expires_at_ms": t.expires_at,
            "expired": t.is_expired_at(now),
            "expires_in_seconds": t.expires_at.saturating_sub(now) / 1000,
        })
    });
    serde_json::json!({
        "phase": phase.label(),
        "logged_in": state.is_logged_in(),
        "credential_hash": state.credential_hash,
        "token": expiry,
        "store_path": app.store_path,
    })
}

/// Publish an unauthorized signal and wait for the forced refresh.
///
/// Returns once the refresh attempt has finished, whatever its outcome.
async fn invalidate(app: &App) -> Result<()> {
    let before = app.controller.session_state().await;
    if before.token.is_none() {
        return Err(Error::NotLoggedIn.into());
    }
    let attempts = app.controller.refresh_attempts();

    app.signal.publish();

    let waited = tokio::time::timeout(INVALIDATE_WAIT, async {
        while app.controller.refresh_attempts() == attempts {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        app.controller.session_state().await
    })
    .await;

    match waited {
        Ok(state) if !state.is_logged_in() => {
            Err(Error::NotLoggedIn).context("refresh rejected, session cleared")
        }
        Ok(state) if state != before => {
            println!("Token refreshed.");
            Ok(())
        }
        Ok(_) => anyhow::bail!("refresh failed; session kept, the next read retries"),
        Err(_) => {
            warn!(
                wait_secs = INVALIDATE_WAIT.as_secs(),
                "forced refresh did not complete"
            );
            anyhow::bail!("refresh did not complete; session kept")
        }
    }
}
