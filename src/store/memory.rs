use std::{collections::BTreeMap, sync::Arc, time::SystemTime};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{config::StoreConfig, core::marshal::Marshaler};

use super::{
    validate_credential, Credential, CredentialStore, CredentialType, Persist, StoreError,
    TargetInformation, CRED_ENUMERATE_ALL_CREDENTIALS, CRED_PRESERVE_CREDENTIAL_BLOB,
};

/// Target names compare case-insensitively.
type Key = (String, CredentialType);

fn key(target_name: &str, cred_type: CredentialType) -> Key {
    (target_name.to_lowercase(), cred_type)
}

/// A local in-memory store. Not for production use!
///
/// # Warning
/// Nothing is persisted and blobs are kept in clear. This store exists to
/// exercise the [`CredentialStore`] contract in tests and tools.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    store: Arc<Mutex<BTreeMap<Key, Credential>>>,
    config: StoreConfig,
    marshaler: Marshaler,
}

impl MemoryStore {
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            store: Default::default(),
            config,
            marshaler: Marshaler::default(),
        }
    }

    /// Validates marshaled user names with `marshaler` instead of the default
    /// settings.
    pub fn with_marshaler(mut self, marshaler: Marshaler) -> Self {
        self.marshaler = marshaler;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn marshaler(&self) -> &Marshaler {
        &self.marshaler
    }
}

/// Domain password blobs belong to the authentication packages and are never
/// handed back to callers.
fn redacted(mut credential: Credential) -> Credential {
    if credential.cred_type == CredentialType::DomainPassword {
        credential.credential_blob = Vec::new();
    }
    credential
}

fn matches_filter(target_name: &str, filter: &str) -> bool {
    let target_name = target_name.to_lowercase();
    let filter = filter.to_lowercase();
    match filter.strip_suffix('*') {
        Some(prefix) => target_name.starts_with(prefix),
        None => target_name == filter,
    }
}

/// A stored domain target matches a server name exactly, or by suffix when
/// it is a `*.domain` wildcard.
fn matches_domain_target(stored: &str, name: &str) -> bool {
    let stored = stored.to_lowercase();
    let name = name.to_lowercase();
    match stored.strip_prefix('*') {
        Some(suffix) if suffix.starts_with('.') => name.ends_with(suffix),
        _ => stored == name,
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn write(&self, mut credential: Credential, flags: u32) -> Result<(), StoreError> {
        validate_credential(&credential, flags, &self.marshaler).map_err(|e| {
            debug!(error = %e, "rejected credential write");
            e
        })?;

        let cred_type = credential.cred_type;
        let max_persist = self.config.max_persist_for(cred_type);
        if credential.persist > max_persist {
            debug!(%cred_type, ?max_persist, "persist not supported by this logon session");
            return Err(StoreError::NoSuchLogonSession(cred_type));
        }

        let target_name = credential.target_name.clone().unwrap_or_default();
        let key = key(&target_name, cred_type);
        let mut store = self.store.lock().await;

        if flags & CRED_PRESERVE_CREDENTIAL_BLOB != 0 {
            if let Some(existing) = store.get(&key) {
                credential.credential_blob = existing.credential_blob.clone();
            }
        }
        credential.last_written = Some(SystemTime::now());

        info!(%cred_type, %target_name, "credential written");
        store.insert(key, credential);

        Ok(())
    }

    async fn read(
        &self,
        target_name: &str,
        cred_type: CredentialType,
        flags: u32,
    ) -> Result<Credential, StoreError> {
        check_lookup(target_name, flags)?;

        self.store
            .lock()
            .await
            .get(&key(target_name, cred_type))
            .cloned()
            .map(redacted)
            .ok_or(StoreError::NotFound)
    }

    async fn delete(
        &self,
        target_name: &str,
        cred_type: CredentialType,
        flags: u32,
    ) -> Result<(), StoreError> {
        check_lookup(target_name, flags)?;

        if self
            .store
            .lock()
            .await
            .remove(&key(target_name, cred_type))
            .is_some()
        {
            info!(%cred_type, target_name, "credential deleted");
            return Ok(());
        }

        Err(StoreError::NotFound)
    }

    async fn enumerate(
        &self,
        filter: Option<&str>,
        flags: u32,
    ) -> Result<Vec<Credential>, StoreError> {
        if flags & !CRED_ENUMERATE_ALL_CREDENTIALS != 0 {
            return Err(StoreError::InvalidFlags(flags));
        }
        if let Some(filter) = filter {
            if flags & CRED_ENUMERATE_ALL_CREDENTIALS != 0 {
                return Err(StoreError::InvalidFlags(flags));
            }
            if filter.is_empty() || filter.trim_end_matches('*').contains('*') {
                return Err(StoreError::invalid(format!("invalid filter `{filter}`")));
            }
        }

        let credentials: Vec<Credential> = self
            .store
            .lock()
            .await
            .values()
            .filter(|credential| {
                let target_name = credential.target_name.as_deref().unwrap_or_default();
                filter.map_or(true, |filter| matches_filter(target_name, filter))
            })
            .cloned()
            .map(redacted)
            .collect();

        debug!(?filter, count = credentials.len(), "enumerated credentials");

        if credentials.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(credentials)
    }

    async fn rename(
        &self,
        old_target_name: &str,
        new_target_name: &str,
        cred_type: CredentialType,
        flags: u32,
    ) -> Result<(), StoreError> {
        check_lookup(old_target_name, flags)?;
        if new_target_name.is_empty() {
            return Err(StoreError::invalid("new target name is required"));
        }

        let old_key = key(old_target_name, cred_type);
        let new_key = key(new_target_name, cred_type);
        let mut store = self.store.lock().await;

        if !store.contains_key(&old_key) {
            return Err(StoreError::NotFound);
        }
        if old_key != new_key && store.contains_key(&new_key) {
            return Err(StoreError::AlreadyExists);
        }

        if let Some(mut credential) = store.remove(&old_key) {
            credential.target_name = Some(new_target_name.to_owned());
            credential.last_written = Some(SystemTime::now());
            store.insert(new_key, credential);
        }

        info!(%cred_type, old_target_name, new_target_name, "credential renamed");
        Ok(())
    }

    async fn read_domain_credentials(
        &self,
        target_info: Option<&TargetInformation>,
        flags: u32,
    ) -> Result<Vec<Credential>, StoreError> {
        let target_info =
            target_info.ok_or_else(|| StoreError::invalid("target information is required"))?;
        if flags != 0 {
            return Err(StoreError::invalid(format!("unsupported flags {flags:#x}")));
        }

        let names: Vec<&str> = target_info.names().collect();
        if names.is_empty() {
            return Err(StoreError::invalid("target information names no server"));
        }

        let credentials: Vec<Credential> = self
            .store
            .lock()
            .await
            .values()
            .filter(|credential| {
                credential.cred_type.is_domain()
                    && (target_info.cred_types.is_empty()
                        || target_info.cred_types.contains(&credential.cred_type))
            })
            .filter(|credential| {
                let stored = credential.target_name.as_deref().unwrap_or_default();
                names.iter().any(|name| matches_domain_target(stored, name))
            })
            .cloned()
            .map(redacted)
            .collect();

        if credentials.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(credentials)
    }

    fn session_types(&self, count: usize) -> Vec<Persist> {
        (0..count)
            .map(|id| {
                u32::try_from(id)
                    .ok()
                    .and_then(|id| CredentialType::try_from(id).ok())
                    .map_or(Persist::None, |ty| self.config.max_persist_for(ty))
            })
            .collect()
    }
}

fn check_lookup(target_name: &str, flags: u32) -> Result<(), StoreError> {
    if flags != 0 {
        return Err(StoreError::InvalidFlags(flags));
    }
    if target_name.is_empty() {
        return Err(StoreError::invalid("target name is required"));
    }
    Ok(())
}
