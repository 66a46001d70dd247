//! `{{placeholder}}` template engine.
//!
//! Flow-authored strings may embed dotted paths like
//! `{{interaction.user.mention}}` or `{{nodes.5.result}}`. Resolution walks
//! a chain of lazily-evaluated providers: the first path segment selects a
//! namespace from the root registry, each further segment asks the current
//! provider for the next one, and the final provider renders itself to a
//! string. Unknown placeholders become empty strings so a typo degrades a
//! message instead of failing the flow; any other provider failure aborts
//! the fill.

mod providers;

pub use providers::{
    EventProvider, InteractionProvider, NodesProvider, ThingProvider, VariablesProvider,
};

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PlaceholderError {
    /// Missing key anywhere along the chain; renders as an empty string.
    #[error("placeholder not found")]
    NotFound,

    #[error("placeholder '{key}' failed: {message}")]
    #[diagnostic(code(flowcord::placeholder::failed))]
    Failed { key: String, message: String },
}

#[async_trait]
pub trait PlaceholderProvider: Send + Sync {
    /// Descend one path segment.
    async fn get_placeholder(
        &self,
        key: &str,
    ) -> Result<Arc<dyn PlaceholderProvider>, PlaceholderError>;

    /// Render this provider as the substituted value.
    async fn resolve(&self) -> Result<String, PlaceholderError>;
}

#[derive(Clone, Default)]
pub struct PlaceholderEngine {
    root: FxHashMap<String, Arc<dyn PlaceholderProvider>>,
}

impl PlaceholderEngine {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_provider(
        mut self,
        namespace: impl Into<String>,
        provider: Arc<dyn PlaceholderProvider>,
    ) -> Self {
        self.root.insert(namespace.into(), provider);
        self
    }

    pub fn add_provider(
        &mut self,
        namespace: impl Into<String>,
        provider: Arc<dyn PlaceholderProvider>,
    ) {
        self.root.insert(namespace.into(), provider);
    }

    /// Substitutes every `{{...}}` tag in `input`. Text outside tags and
    /// unterminated tags pass through verbatim.
    pub async fn fill(&self, input: &str) -> Result<String, PlaceholderError> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let key = after[..end].trim();
            match self.resolve_key(key).await {
                Ok(value) => out.push_str(&value),
                Err(PlaceholderError::NotFound) => {}
                Err(err) => return Err(err),
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }

    async fn resolve_key(&self, key: &str) -> Result<String, PlaceholderError> {
        let mut segments = key.split('.');
        let namespace = segments.next().unwrap_or_default();
        let mut provider = self
            .root
            .get(namespace)
            .cloned()
            .ok_or(PlaceholderError::NotFound)?;
        for segment in segments {
            provider = provider
                .get_placeholder(segment)
                .await
                .map_err(|e| annotate(key, e))?;
        }
        provider.resolve().await.map_err(|e| annotate(key, e))
    }
}

fn annotate(key: &str, err: PlaceholderError) -> PlaceholderError {
    match err {
        PlaceholderError::NotFound => PlaceholderError::NotFound,
        PlaceholderError::Failed { message, .. } => PlaceholderError::Failed {
            key: key.to_owned(),
            message,
        },
    }
}
