//! The registry of tenants allowed to request signatures

use std::{collections::HashMap, fmt, fs, io, path::Path};

use serde::Deserialize;
use thiserror::Error;

use crate::{AppId, AppIdRef, AppSecret, AppSecretRef};

/// An error loading the tenant registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry file could not be read
    #[error("unable to read tenant registry")]
    Io(#[from] io::Error),
    /// The registry is not a JSON object of `appId` to secret
    #[error("tenant registry is not a JSON object of appId to secret")]
    Parse(#[from] serde_json::Error),
}

/// An immutable mapping of `appId` to shared secret
///
/// Loaded once at start-up and never mutated afterwards.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct TenantRegistry {
    tenants: HashMap<AppId, AppSecret>,
}

impl TenantRegistry {
    /// Constructs a registry from `(appId, secret)` pairs
    pub fn new<I>(tenants: I) -> Self
    where
        I: IntoIterator<Item = (AppId, AppSecret)>,
    {
        Self {
            tenants: tenants.into_iter().collect(),
        }
    }

    /// Reads a registry from a JSON object such as `{"wx123": "secret"}`
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, RegistryError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Loads a registry from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let file = fs::File::open(path)?;
        Self::from_reader(io::BufReader::new(file))
    }

    /// Looks up the secret registered for a tenant
    #[inline]
    pub fn secret(&self, app_id: &AppIdRef) -> Option<&AppSecretRef> {
        self.tenants.get(app_id).map(|s| &**s)
    }

    /// Whether the tenant is registered
    #[inline]
    pub fn contains(&self, app_id: &AppIdRef) -> bool {
        self.tenants.contains_key(app_id)
    }

    /// The number of registered tenants
    #[inline]
    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    /// Whether no tenants are registered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    /// Iterates over the registered tenant identifiers
    pub fn app_ids(&self) -> impl Iterator<Item = &AppIdRef> {
        self.tenants.keys().map(|k| &**k)
    }
}

impl fmt::Debug for TenantRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TenantRegistry")
            .field("tenants", &self.app_ids().collect::<Vec<_>>())
            .finish()
    }
}
