//! Static symbol registry.
//!
//! Instrument ids are the normalised `BASE/QUOTE` form of the configured
//! symbols. Aliases map extra spellings (e.g. `XBT`) onto a registered id.

use crate::domain::market::symbol::normalize_crypto_symbol;
use crate::domain::ports::IdentityResolver;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

pub struct StaticIdentityResolver {
    known: HashSet<String>,
    aliases: HashMap<String, String>,
}

impl StaticIdentityResolver {
    /// Registers each symbol under its normalised form. Symbols that cannot
    /// be normalised are kept verbatim (upper-cased).
    pub fn new(symbols: &[String]) -> Self {
        let known = symbols
            .iter()
            .map(|s| Self::normalize(s))
            .collect::<HashSet<_>>();
        Self {
            known,
            aliases: HashMap::new(),
        }
    }

    pub fn with_alias(mut self, alias: &str, symbol: &str) -> Self {
        let target = Self::normalize(symbol);
        if !self.known.contains(&target) {
            warn!(
                "StaticIdentityResolver: Alias {} points at unregistered symbol {}",
                alias, target
            );
        }
        self.aliases.insert(alias.trim().to_uppercase(), target);
        self
    }

    pub fn instruments(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.known.iter().cloned().collect();
        ids.sort();
        ids
    }

    fn normalize(symbol: &str) -> String {
        normalize_crypto_symbol(symbol).unwrap_or_else(|_| symbol.trim().to_uppercase())
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve_strict(&self, symbol: &str) -> Result<Option<String>> {
        let key = symbol.trim().to_uppercase();
        let candidate = self
            .aliases
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Self::normalize(&key));

        if self.known.contains(&candidate) {
            Ok(Some(candidate))
        } else {
            debug!("StaticIdentityResolver: Unknown symbol {}", symbol);
            Ok(None)
        }
    }
}
