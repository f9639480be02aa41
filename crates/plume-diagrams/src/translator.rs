//! `PlantUML` rendering with parallel HTTP requests.
//!
//! [`Translator`] turns diagram schemes into styled SVG:
//! - encodes every scheme into a `PlantUML` token
//! - requests `{base_url}/{format}/{token}` for all schemes in parallel on a
//!   dedicated rayon pool
//! - post-processes successful responses (see [`crate::svg`])
//!
//! One failing diagram never affects the others: its position in the output
//! holds a [`RenderFailure`] instead.

use std::time::Duration;

use plume_config::{ConfigError, PlantUmlConfig};
use plume_store::{RenderFailure, RenderResult};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError};
use ureq::Agent;
use ureq::tls::TlsConfig;

use crate::encoder::encode;
use crate::svg;

/// Error constructing a [`Translator`].
#[derive(Debug, thiserror::Error)]
pub enum TranslatorError {
    /// Invalid rendering configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The request thread pool could not be created.
    #[error("failed to create thread pool: {0}")]
    ThreadPool(#[from] ThreadPoolBuildError),
}

/// Client for a `PlantUML` server.
///
/// # Example
///
/// ```no_run
/// use plume_config::PlantUmlConfig;
/// use plume_diagrams::Translator;
///
/// let translator = Translator::new(&PlantUmlConfig::new("https://www.plantuml.com/plantuml"))?;
/// let results = translator.translate(&["@startuml\nBob -> Alice : hello\n@enduml"]);
/// assert_eq!(results.len(), 1);
/// # Ok::<(), plume_diagrams::TranslatorError>(())
/// ```
pub struct Translator {
    /// Server URL including the output format, always ending with `/`.
    base_url: String,
    agent: Agent,
    pool: ThreadPool,
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator")
            .field("base_url", &self.base_url)
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl Translator {
    /// Create a translator from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `TranslatorError::Config` if the configuration is invalid
    /// (e.g., zero `max_concurrency`) and `TranslatorError::ThreadPool` if the
    /// worker pool cannot be started.
    pub fn new(config: &PlantUmlConfig) -> Result<Self, TranslatorError> {
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_concurrency)
            .thread_name(|i| format!("plume-render-{i}"))
            .build()?;

        Ok(Self {
            base_url: format!("{}{}/", sanitize_url(&config.url), config.output_format),
            agent: create_agent(config.timeout(), config.verify_ssl),
            pool,
        })
    }

    /// URL prefix every token is appended to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Render `schemes`, returning one result per scheme in input order.
    ///
    /// Blocks until every request has completed or failed.
    pub fn translate<S: AsRef<str> + Sync>(&self, schemes: &[S]) -> Vec<RenderResult> {
        if schemes.is_empty() {
            return Vec::new();
        }

        let tokens: Vec<String> = schemes.iter().map(|s| encode(s.as_ref())).collect();

        let results: Vec<RenderResult> = self.pool.install(|| {
            schemes
                .par_iter()
                .zip(tokens.par_iter())
                .map(|(scheme, token)| self.render_one(scheme.as_ref(), token))
                .collect()
        });

        let failed = results.iter().filter(|r| r.is_err()).count();
        tracing::info!(
            total = results.len(),
            failed,
            "Rendered diagrams via PlantUML"
        );
        results
    }

    fn render_one(&self, scheme: &str, token: &str) -> RenderResult {
        let body = self.request(scheme, token)?;
        svg::stylize(&body).map_err(|e| {
            tracing::warn!(error = %e, "PlantUML returned malformed SVG for diagram\n\n{scheme}\n");
            RenderFailure::MalformedResponse(e.to_string())
        })
    }

    /// Request one token and return the decoded response body.
    fn request(&self, scheme: &str, token: &str) -> Result<String, RenderFailure> {
        let url = format!("{}{token}", self.base_url);

        let response = self.agent.get(&url).call().map_err(|e| {
            tracing::warn!(error = %e, "Request failed while building diagram\n\n{scheme}\n");
            RenderFailure::Transport(e.to_string())
        })?;

        let status = response.status().as_u16();
        let mut body = response.into_body();
        let bytes = body.read_to_vec().map_err(|e| {
            tracing::warn!(error = %e, "Reading response failed while building diagram\n\n{scheme}\n");
            RenderFailure::Transport(e.to_string())
        })?;
        let content = String::from_utf8_lossy(&bytes).into_owned();

        if !(200..300).contains(&status) {
            tracing::warn!(
                status,
                "While building diagram\n\n{scheme}\n\nserver responded with status {status}"
            );
            return Err(RenderFailure::Status {
                status,
                message: content,
            });
        }

        Ok(content)
    }
}

/// Create HTTP agent with the specified timeout and TLS verification mode.
fn create_agent(timeout: Duration, verify_ssl: bool) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .tls_config(
            TlsConfig::builder()
                .disable_verification(!verify_ssl)
                .build(),
        )
        .build()
        .into()
}

/// Ensure `url` ends with a single `/`.
fn sanitize_url(url: &str) -> String {
    format!("{}/", url.trim_end_matches('/'))
}
