use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    core::{
        codec::PaddingPolicy,
        marshal::{Marshaler, CRED_MAX_CREDENTIAL_BLOB_SIZE, CRED_MAX_USERNAME_LENGTH},
    },
    store::{CredentialType, MemoryStore, Persist},
};

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub marshal: MarshalConfig,
    pub store: StoreConfig,
}

impl Config {
    /// Parses a JSON configuration document. Missing fields take their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("unable to parse configuration")
    }

    pub fn marshaler(&self) -> Marshaler {
        Marshaler::new(self.marshal.clone())
    }

    /// An empty in-memory store that validates user names with the same
    /// marshal settings as [`Config::marshaler`].
    pub fn memory_store(&self) -> MemoryStore {
        MemoryStore::with_config(self.store.clone()).with_marshaler(self.marshaler())
    }
}

/// Settings of the credential marshaling codec.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct MarshalConfig {
    /// Treatment of padding bits when decoding a token body.
    pub padding: PaddingPolicy,
    /// Longest user name, in UTF-16 code units.
    pub max_username_length: usize,
    /// Largest binary blob, in bytes.
    pub max_blob_size: usize,
}

impl Default for MarshalConfig {
    fn default() -> Self {
        Self {
            padding: PaddingPolicy::Strict,
            max_username_length: CRED_MAX_USERNAME_LENGTH,
            max_blob_size: CRED_MAX_CREDENTIAL_BLOB_SIZE,
        }
    }
}

/// Session type policy of the in-memory credential store.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Highest persistence granted to any credential type.
    pub max_persist: Persist,
    /// Credential types that cannot be stored in this logon session.
    pub disabled_types: Vec<CredentialType>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_persist: Persist::Enterprise,
            disabled_types: Vec::new(),
        }
    }
}

impl StoreConfig {
    /// Highest persistence allowed for `cred_type`.
    pub fn max_persist_for(&self, cred_type: CredentialType) -> Persist {
        if self.disabled_types.contains(&cred_type) {
            Persist::None
        } else {
            self.max_persist
        }
    }
}
