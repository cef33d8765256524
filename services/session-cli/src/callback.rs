//! Loopback redirect listener
//!
//! Serves the redirect URI's path on its host and port while a login is in
//! progress. Every hit is rebuilt into the full redirect URL and handed to
//! `SessionController::handle_redirect`; the browser gets a short HTML page.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use session::SessionController;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};

/// Where the redirect listener binds and what it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackTarget {
    pub addr: SocketAddr,
    /// Scheme and authority exactly as configured, e.g. `http://127.0.0.1:8765`
    pub origin: String,
    pub path: String,
}

impl LoopbackTarget {
    /// Derive the listener address from an `http` loopback redirect URI.
    pub fn parse(redirect_uri: &str) -> Result<Self> {
        let not_loopback = || Error::RedirectNotLoopback(redirect_uri.to_owned());
        let url = Url::parse(redirect_uri).map_err(|_| not_loopback())?;
        if url.scheme() != "http" {
            return Err(not_loopback());
        }

        let ip = match url.host() {
            Some(url::Host::Ipv4(ip)) if ip.is_loopback() => IpAddr::V4(ip),
            Some(url::Host::Ipv6(ip)) if ip.is_loopback() => IpAddr::V6(ip),
            Some(url::Host::Domain("localhost")) => IpAddr::V4(Ipv4Addr::LOCALHOST),
            _ => return Err(not_loopback()),
        };
        let port = url.port_or_known_default().ok_or_else(not_loopback)?;
        let origin = url.origin().ascii_serialization();

        Ok(Self {
            addr: SocketAddr::new(ip, port),
            origin,
            path: url.path().to_owned(),
        })
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.addr)
            .await
            .map_err(|e| Error::CallbackBind {
                addr: self.addr.to_string(),
                reason: e.to_string(),
            })
    }
}

#[derive(Clone)]
struct CallbackState {
    controller: Arc<SessionController>,
    origin: Arc<str>,
}

/// Router answering on the redirect path; everything else is 404.
pub fn router(controller: Arc<SessionController>, target: &LoopbackTarget) -> Router {
    let state = CallbackState {
        controller,
        origin: Arc::from(target.origin.as_str()),
    };
    Router::new()
        .route(&target.path, get(callback_handler))
        .with_state(state)
}

async fn callback_handler(State(state): State<CallbackState>, uri: Uri) -> Response {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let redirect = format!("{}{path_and_query}", state.origin);
    debug!(path = uri.path(), "redirect received on loopback listener");

    if state.controller.handle_redirect(&redirect).await {
        info!("redirect consumed");
        html(
            StatusCode::OK,
            "Authorization received. You can close this window and return to the terminal.",
        )
    } else {
        html(
            StatusCode::NOT_FOUND,
            "No login is waiting for this redirect.",
        )
    }
}

fn html(status: StatusCode, message: &str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        format!("<!doctype html><html><body><p>{message}</p></body></html>"),
    )
        .into_response()
}
