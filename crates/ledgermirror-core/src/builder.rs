//! Fluent builder for mirrors.
//!
//! # Example
//!
//! ```rust
//! use ledgermirror_core::{MemoryStore, MirrorBuilder};
//!
//! let reconciler = MirrorBuilder::new()
//!     .id("elections")
//!     .namespace("bb3cb0")
//!     .build(MemoryStore::new())
//!     .unwrap();
//! assert_eq!(reconciler.config().id, "elections");
//! ```

use std::sync::Arc;

use crate::config::MirrorConfig;
use crate::decoder::{JsonStateDecoder, StateDecoder};
use crate::engine::Reconciler;
use crate::error::MirrorError;
use crate::store::MirrorStore;

/// Fluent builder for [`MirrorConfig`] and [`Reconciler`].
#[derive(Default)]
pub struct MirrorBuilder {
    config: MirrorConfig,
    decoder: Option<Arc<dyn StateDecoder>>,
}

impl MirrorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing config.
    pub fn from_config(config: MirrorConfig) -> Self {
        Self {
            config,
            decoder: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set the namespace prefix to mirror.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = url.into();
        self
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.config.max_connections = n;
        self
    }

    /// Use a custom decoder instead of [`JsonStateDecoder`].
    pub fn decoder(mut self, decoder: Arc<dyn StateDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn build_config(self) -> MirrorConfig {
        self.config
    }

    /// Validate the config and build a reconciler over `store`.
    pub fn build<S: MirrorStore>(self, store: S) -> Result<Reconciler<S>, MirrorError> {
        self.config.validate()?;
        let decoder = self
            .decoder
            .unwrap_or_else(|| Arc::new(JsonStateDecoder::new()));
        Ok(Reconciler::from_config(store, decoder, self.config))
    }
}
