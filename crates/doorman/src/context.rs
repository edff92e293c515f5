//! Provider context.
//!
//! Holds the fully-resolved configuration for request processing:
//! options, the derived field keys, and the pluggable collaborators.
//! Built once at startup and shared as `Arc<ProviderContext>` across
//! request handlers; the keys are immutable after derivation.

use std::fmt;
use std::sync::Arc;

use doorman_core::error::ProviderError;
use doorman_core::logger::ProviderLogger;
use doorman_core::options::ProviderOptions;
use doorman_core::scope::ScopeSet;
use doorman_core::session::{RefreshTokenVerifier, TokenMinter};
use doorman_core::store::Store;

use crate::crypto::KeySet;

pub struct ProviderContext {
    pub options: ProviderOptions,
    pub keys: KeySet,
    pub store: Arc<dyn Store>,
    pub minter: Arc<dyn TokenMinter>,
    pub refresh_verifier: Arc<dyn RefreshTokenVerifier>,
    pub logger: ProviderLogger,
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("options", &self.options)
            .field("keys", &self.keys)
            .field("store", &self.store)
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

impl ProviderContext {
    /// Validate the options, derive the field keys, and assemble the
    /// shared context.
    pub fn new(
        options: ProviderOptions,
        store: Arc<dyn Store>,
        minter: Arc<dyn TokenMinter>,
        refresh_verifier: Arc<dyn RefreshTokenVerifier>,
    ) -> Result<Arc<Self>, ProviderError> {
        options.validate()?;
        let keys = KeySet::derive(&options.secret);
        let logger = ProviderLogger::new(options.logger.clone());

        Ok(Arc::new(Self {
            options,
            keys,
            store,
            minter,
            refresh_verifier,
            logger,
        }))
    }

    /// The configured application scope universe.
    pub fn app_scopes(&self) -> ScopeSet {
        self.options.scopes.iter().map(String::as_str).collect()
    }

    /// Purge grants past their expiry. Idempotent; meant to be driven
    /// by the host's scheduler.
    pub async fn sweep_expired_grants(&self) -> Result<u64, ProviderError> {
        let removed = self.store.delete_expired_grants(chrono::Utc::now()).await?;
        if removed > 0 {
            self.logger.info(&format!("swept {removed} expired grants"));
        }
        Ok(removed)
    }
}
