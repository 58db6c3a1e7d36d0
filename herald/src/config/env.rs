//! Typed access to environment-style key/value settings.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::utils::secret::mask_secret;

/// Parse a boolean flag. Accepts `true/1/yes/on` and `false/0/no/off`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A credential that was found, with its value masked for display.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MaskedCredential {
    pub key: &'static str,
    pub masked: String,
}

/// Reader over a lookup function.
///
/// Blank values count as unset. Every secret read through [`Env::secret`]
/// is remembered in masked form for the `check` overview.
pub struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
    credentials: Vec<MaskedCredential>,
}

impl<'a> Env<'a> {
    pub fn new(lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            lookup,
            credentials: Vec::new(),
        }
    }

    /// Trimmed value of `key`, `None` when unset or blank.
    pub fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Read a secret and remember its masked form.
    pub fn secret(&mut self, key: &'static str) -> Option<String> {
        let value = self.get(key)?;
        self.credentials.push(MaskedCredential {
            key,
            masked: mask_secret(&value),
        });
        Some(value)
    }

    /// Parse a value, failing on malformed input.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| Error::config(format!("{key}: invalid value {raw:?}: {e}")))
            })
            .transpose()
    }

    pub fn flag(&self, key: &str) -> Result<Option<bool>> {
        self.get(key)
            .map(|raw| {
                parse_bool(&raw).ok_or_else(|| {
                    Error::config(format!("{key}: expected a boolean, got {raw:?}"))
                })
            })
            .transpose()
    }

    /// Duration given in (possibly fractional) seconds.
    pub fn seconds(&self, key: &str) -> Result<Option<Duration>> {
        match self.parse::<f64>(key)? {
            None => Ok(None),
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(|e| Error::config(format!("{key}: invalid duration {secs}: {e}"))),
        }
    }

    /// `ENABLE_<NAME>` when set, otherwise whether any credential was found.
    pub fn enabled(&self, name: &str, credentials_present: bool) -> Result<bool> {
        Ok(self
            .flag(&format!("ENABLE_{name}"))?
            .unwrap_or(credentials_present))
    }

    pub fn into_credentials(self) -> Vec<MaskedCredential> {
        self.credentials
    }
}
