//! Redirect callback handling
//!
//! The host forwards every URL it is asked to open. Only URLs that match the
//! configured redirect URI (scheme, host, port, path) and carry either a
//! `code` or an `error` parameter are consumed; everything else is left for
//! other handlers, untouched.

use url::Url;

use crate::error::{Error, Result};
use crate::token::{TokenExchanger, TokenPair};

/// What a consumed redirect carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// Authorization code ready for exchange
    Code(String),
    /// Provider reported an authorization error (`error`, `error_description`)
    Denied {
        error: String,
        description: Option<String>,
    },
}

/// Parses redirects and completes the code exchange.
#[derive(Debug, Clone)]
pub struct RedirectHandler {
    /// `None` when the configured redirect URI is not an absolute URL; such
    /// a handler consumes nothing, and `login` reports the configuration error.
    redirect_uri: Option<Url>,
    exchanger: TokenExchanger,
}

impl RedirectHandler {
    pub fn new(exchanger: TokenExchanger) -> Self {
        let redirect_uri = Url::parse(&exchanger.config().redirect_uri).ok();
        Self {
            redirect_uri,
            exchanger,
        }
    }

    pub fn exchanger(&self) -> &TokenExchanger {
        &self.exchanger
    }

    /// Parse a redirect without side effects.
    ///
    /// Returns `None` when the URL does not belong to this redirect URI or
    /// carries neither a code nor an error.
    pub fn parse(&self, raw: &str) -> Option<RedirectOutcome> {
        let url = Url::parse(raw).ok()?;
        if !self.matches(&url) {
            return None;
        }

        let mut code = None;
        let mut error = None;
        let mut description = None;

        // Query first, then fragment (implicit-style providers put params there)
        let fragment_pairs = url
            .fragment()
            .map(|f| url::form_urlencoded::parse(f.as_bytes()).into_owned().collect::<Vec<_>>())
            .unwrap_or_default();
        let query_pairs = url.query_pairs().into_owned();

        for (key, value) in query_pairs.chain(fragment_pairs) {
            match key.as_str() {
                "code" if code.is_none() && !value.is_empty() => code = Some(value),
                "error" if error.is_none() && !value.is_empty() => error = Some(value),
                "error_description" if description.is_none() => description = Some(value),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Some(RedirectOutcome::Denied { error, description });
        }
        code.map(RedirectOutcome::Code)
    }

    /// Consume a redirect and exchange its code.
    ///
    /// `None`: the URL was not ours (no side effects). `Some(Ok)`: exchange
    /// succeeded. `Some(Err)`: the provider denied authorization or the
    /// exchange failed; the error is never swallowed.
    pub async fn handle(&self, raw: &str) -> Option<Result<TokenPair>> {
        let outcome = self.parse(raw)?;
        Some(match outcome {
            RedirectOutcome::Code(code) => self.exchanger.exchange_code(&code).await,
            RedirectOutcome::Denied { error, description } => Err(Error::Provider(match description {
                Some(d) if !d.is_empty() => format!("authorization denied: {error}: {d}"),
                _ => format!("authorization denied: {error}"),
            })),
        })
    }

    fn matches(&self, url: &Url) -> bool {
        let Some(expected) = &self.redirect_uri else {
            return false;
        };
        url.scheme() == expected.scheme()
            && url.host_str() == expected.host_str()
            && url.port_or_known_default() == expected.port_or_known_default()
            && normalized_path(url) == normalized_path(expected)
    }
}

/// Path without a trailing slash, so `/callback` and `/callback/` match.
fn normalized_path(url: &Url) -> &str {
    let path = url.path();
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn handler(base: &str) -> RedirectHandler {
        RedirectHandler::new(TokenExchanger::new(reqwest::Client::new(), test_config(base)))
    }

    #[test]
    fn parses_code_from_query() {
        let h = handler("https://accounts.test");
        assert_eq!(
            h.parse("myapp://oauth/callback?code=abc123"),
            Some(RedirectOutcome::Code("abc123".into()))
        );
    }

    #[test]
    fn parses_code_from_fragment() {
        let h = handler("https://accounts.test");
        assert_eq!(
            h.parse("myapp://oauth/callback#code=frag-code&state=xyz"),
            Some(RedirectOutcome::Code("frag-code".into()))
        );
    }

    #[test]
    fn parses_provider_error() {
        let h = handler("https://accounts.test");
        assert_eq!(
            h.parse("myapp://oauth/callback?error=access_denied&error_description=User%20said%20no"),
            Some(RedirectOutcome::Denied {
                error: "access_denied".into(),
                description: Some("User said no".into()),
            })
        );
    }

    #[test]
    fn error_wins_over_code() {
        let h = handler("https://accounts.test");
        assert!(matches!(
            h.parse("myapp://oauth/callback?code=abc&error=server_error"),
            Some(RedirectOutcome::Denied { .. })
        ));
    }

    #[test]
    fn rejects_foreign_scheme_host_and_path() {
        let h = handler("https://accounts.test");
        assert_eq!(h.parse("otherapp://oauth/callback?code=abc"), None);
        assert_eq!(h.parse("myapp://evil/callback?code=abc"), None);
        assert_eq!(h.parse("myapp://oauth/elsewhere?code=abc"), None);
        assert_eq!(h.parse("https://example.com/?code=abc"), None);
    }

    #[test]
    fn rejects_missing_code_and_garbage() {
        let h = handler("https://accounts.test");
        assert_eq!(h.parse("myapp://oauth/callback"), None);
        assert_eq!(h.parse("myapp://oauth/callback?code="), None);
        assert_eq!(h.parse("not a url at all"), None);
    }

    #[test]
    fn loopback_redirect_matches_port_and_trailing_slash() {
        let mut config = test_config("https://accounts.test");
        config.redirect_uri = "http://127.0.0.1:8765/callback".into();
        let h = RedirectHandler::new(TokenExchanger::new(reqwest::Client::new(), config));

        assert!(h.parse("http://127.0.0.1:8765/callback/?code=c").is_some());
        assert_eq!(h.parse("http://127.0.0.1:9999/callback?code=c"), None);
    }

    #[test]
    fn invalid_redirect_uri_consumes_nothing() {
        let mut config = test_config("https://accounts.test");
        config.redirect_uri = "callback".into();
        let h = RedirectHandler::new(TokenExchanger::new(reqwest::Client::new(), config));
        assert_eq!(h.parse("callback?code=abc"), None);
        assert_eq!(h.parse("myapp://oauth/callback?code=abc"), None);
    }

    #[tokio::test]
    async fn handle_exchanges_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("code=abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "A",
                "refresh_token": "R",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let h = handler(&server.uri());
        let pair = h
            .handle("myapp://oauth/callback?code=abc123")
            .await
            .expect("redirect should be consumed")
            .unwrap();
        assert_eq!(pair.access_token, "A");
    }

    #[tokio::test]
    async fn handle_ignores_foreign_url_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let h = handler(&server.uri());
        assert!(h.handle("https://example.com/?code=abc").await.is_none());
    }

    #[tokio::test]
    async fn handle_reports_denial_as_provider_error() {
        let h = handler("https://accounts.test");
        let result = h
            .handle("myapp://oauth/callback?error=access_denied")
            .await
            .expect("error redirects are consumed");
        match result {
            Err(Error::Provider(msg)) => assert!(msg.contains("access_denied"), "got: {msg}"),
            other => panic!("expected Provider error, got {other:?}"),
        }
    }
}
