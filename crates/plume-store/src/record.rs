//! Diagram records and render outcomes.

use serde::{Deserialize, Serialize};

/// Cache key identifying a diagram record within a store.
pub type CacheKey = String;

/// Outcome of rendering one diagram: SVG markup or a failure.
pub type RenderResult = Result<String, RenderFailure>;

/// Visual variant a diagram record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
}

/// Why a diagram could not be rendered.
///
/// Failures are terminal for the current build. They are never persisted, so
/// the diagram is requested again on the next build.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderFailure {
    /// The server answered with a non-success status.
    #[error("{status}. {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, decoded lossily as UTF-8.
        message: String,
    },
    /// The request never produced a response (connection error, timeout).
    #[error("request failed: {0}")]
    Transport(String),
    /// The server answered with success but the body is not an SVG document.
    #[error("malformed SVG response: {0}")]
    MalformedResponse(String),
}

impl RenderFailure {
    /// HTTP status code, if the server responded at all.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) | Self::MalformedResponse(_) => None,
        }
    }
}

/// Render state of a record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RenderState {
    /// Not yet sent to the rendering service.
    #[default]
    Pending,
    /// Rendered (successfully or not).
    Resolved(RenderResult),
}

/// A diagram scheme together with its rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramRecord {
    scheme: String,
    mode: ThemeMode,
    state: RenderState,
}

impl DiagramRecord {
    /// Create a pending record.
    #[must_use]
    pub fn new(scheme: impl Into<String>, mode: ThemeMode) -> Self {
        Self {
            scheme: scheme.into(),
            mode,
            state: RenderState::Pending,
        }
    }

    /// Create a record that already holds rendered SVG.
    #[must_use]
    pub fn rendered(scheme: impl Into<String>, mode: ThemeMode, svg: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            mode,
            state: RenderState::Resolved(Ok(svg.into())),
        }
    }

    /// Diagram source text.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn mode(&self) -> ThemeMode {
        self.mode
    }

    #[must_use]
    pub fn state(&self) -> &RenderState {
        &self.state
    }

    /// Whether the record still awaits rendering.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.state, RenderState::Pending)
    }

    /// Rendered SVG, if rendering succeeded.
    #[must_use]
    pub fn svg(&self) -> Option<&str> {
        match &self.state {
            RenderState::Resolved(Ok(svg)) => Some(svg),
            _ => None,
        }
    }

    /// Render failure, if rendering failed.
    #[must_use]
    pub fn failure(&self) -> Option<&RenderFailure> {
        match &self.state {
            RenderState::Resolved(Err(failure)) => Some(failure),
            _ => None,
        }
    }

    /// Store the outcome of rendering.
    pub fn resolve(&mut self, result: RenderResult) {
        self.state = RenderState::Resolved(result);
    }

    /// Return the record to the pending state.
    pub fn reset(&mut self) {
        self.state = RenderState::Pending;
    }
}

/// Number of records per theme mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagramCount {
    pub light: usize,
    pub dark: usize,
}

impl DiagramCount {
    #[must_use]
    pub fn total(&self) -> usize {
        self.light + self.dark
    }
}
