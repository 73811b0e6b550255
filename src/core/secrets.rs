//! # Secrets Module / 密钥模块
//!
//! Named opaque credentials resolved once from the orchestrator's environment.
//! A secret is only handed to the steps that declare it, and its value is
//! redacted from everything the orchestrator prints or persists.
//!
//! 从编排器环境中一次性解析的具名不透明凭据。密钥只会交给声明它的步骤，
//! 并且其值会从编排器打印或持久化的所有内容中删除。

use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

const REDACTED: &str = "***";

#[derive(Clone, Default)]
pub struct SecretStore {
    values: BTreeMap<String, String>,
    declared: Vec<String>,
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretStore")
            .field("declared", &self.declared)
            .field("resolved", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SecretStore {
    /// Resolves the declared secret names from the process environment.
    pub fn from_env(names: &[String]) -> Self {
        let values = names
            .iter()
            .filter_map(|name| match std::env::var(name) {
                Ok(value) => Some((name.clone(), value)),
                Err(_) => {
                    warn!(secret = %name, "secret is declared but not set in the environment");
                    None
                }
            })
            .collect();
        Self {
            values,
            declared: names.to_vec(),
        }
    }

    /// Builds a store from explicit name/value pairs; every name is declared.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        let declared = values.keys().cloned().collect();
        Self { values, declared }
    }

    /// Adds names that must be withheld from steps even if unresolved.
    pub fn with_declared(mut self, names: &[String]) -> Self {
        for name in names {
            if !self.declared.contains(name) {
                self.declared.push(name.clone());
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Every declared secret name, resolved or not.
    pub fn declared(&self) -> &[String] {
        &self.declared
    }

    /// Replaces every secret value occurring in `text` with `***`.
    pub fn redact(&self, text: &str) -> String {
        let mut redacted = text.to_string();
        // Longest first so a secret containing another is fully masked.
        let mut values: Vec<&String> = self.values.values().filter(|v| !v.is_empty()).collect();
        values.sort_by_key(|v| std::cmp::Reverse(v.len()));
        for value in values {
            if redacted.contains(value.as_str()) {
                redacted = redacted.replace(value.as_str(), REDACTED);
            }
        }
        redacted
    }
}
