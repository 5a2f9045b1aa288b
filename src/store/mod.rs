//! The credential manager contract that marshaled credentials travel through.
//!
//! [`CredentialStore`] mirrors the native write / read / delete / enumerate
//! surface, including its parameter validation. Returned credentials are owned
//! values; dropping them is the only release step.

use std::{
    fmt::{self, Debug},
    time::SystemTime,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{
    credential::CredentialIdentifier,
    marshal::{Marshaler, CRED_MAX_CREDENTIAL_BLOB_SIZE},
};

mod memory;

pub use memory::MemoryStore;

/// Keep the stored blob when overwriting a credential (write flag).
pub const CRED_PRESERVE_CREDENTIAL_BLOB: u32 = 0x1;
/// Enumerate credentials of every logon session (enumerate flag).
pub const CRED_ENUMERATE_ALL_CREDENTIALS: u32 = 0x1;

/// Ask for the credential at the next prompt (credential flag).
pub const CRED_FLAGS_PROMPT_NOW: u32 = 0x2;
/// The target name is a user name (credential flag).
pub const CRED_FLAGS_USERNAME_TARGET: u32 = 0x4;

pub const CRED_MAX_GENERIC_TARGET_NAME_LENGTH: usize = 32767;
pub const CRED_MAX_DOMAIN_TARGET_NAME_LENGTH: usize = 256 + 1 + 80;
pub const CRED_MAX_STRING_LENGTH: usize = 256;
pub const CRED_MAX_VALUE_SIZE: usize = 256;
pub const CRED_MAX_ATTRIBUTES: usize = 64;

/// Credential manager error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid flags {0:#x}")]
    InvalidFlags(u32),

    #[error("credential not found")]
    NotFound,

    #[error("bad user name: {0}")]
    BadUsername(String),

    #[error("{0} credentials cannot be stored in this logon session")]
    NoSuchLogonSession(CredentialType),

    #[error("a credential with that target name already exists")]
    AlreadyExists,
}

impl StoreError {
    pub(crate) fn invalid(e: impl ToString) -> Self {
        Self::InvalidParameter(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum CredentialType {
    Generic = 1,
    DomainPassword = 2,
    DomainCertificate = 3,
    DomainVisiblePassword = 4,
    GenericCertificate = 5,
    DomainExtended = 6,
}

/// One past the highest credential type identifier.
pub const CRED_TYPE_MAXIMUM: u32 = 7;

impl CredentialType {
    pub const ALL: [CredentialType; 6] = [
        CredentialType::Generic,
        CredentialType::DomainPassword,
        CredentialType::DomainCertificate,
        CredentialType::DomainVisiblePassword,
        CredentialType::GenericCertificate,
        CredentialType::DomainExtended,
    ];

    pub fn id(self) -> u32 {
        self as u32
    }

    /// Domain credentials are used by the authentication packages and require a
    /// qualified user name.
    pub fn is_domain(self) -> bool {
        matches!(
            self,
            CredentialType::DomainPassword
                | CredentialType::DomainCertificate
                | CredentialType::DomainVisiblePassword
                | CredentialType::DomainExtended
        )
    }

    /// Whether the user name must be a marshaled certificate reference.
    pub fn is_certificate(self) -> bool {
        matches!(
            self,
            CredentialType::DomainCertificate | CredentialType::GenericCertificate
        )
    }

    fn max_target_name_length(self) -> usize {
        if self.is_domain() {
            CRED_MAX_DOMAIN_TARGET_NAME_LENGTH
        } else {
            CRED_MAX_GENERIC_TARGET_NAME_LENGTH
        }
    }
}

impl TryFrom<u32> for CredentialType {
    type Error = StoreError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        CredentialType::ALL
            .into_iter()
            .find(|ty| ty.id() == id)
            .ok_or_else(|| StoreError::InvalidParameter(format!("unknown credential type {id}")))
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CredentialType::Generic => "generic",
            CredentialType::DomainPassword => "domain password",
            CredentialType::DomainCertificate => "domain certificate",
            CredentialType::DomainVisiblePassword => "domain visible password",
            CredentialType::GenericCertificate => "generic certificate",
            CredentialType::DomainExtended => "domain extended",
        };
        f.write_str(name)
    }
}

/// How long a credential outlives the logon session that wrote it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum Persist {
    #[default]
    None = 0,
    Session = 1,
    LocalMachine = 2,
    Enterprise = 3,
}

impl TryFrom<u32> for Persist {
    type Error = StoreError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(Persist::None),
            1 => Ok(Persist::Session),
            2 => Ok(Persist::LocalMachine),
            3 => Ok(Persist::Enterprise),
            _ => Err(StoreError::InvalidParameter(format!("unknown persist {id}"))),
        }
    }
}

/// Application defined data attached to a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialAttribute {
    pub keyword: String,
    #[serde(default)]
    pub flags: u32,
    #[serde(with = "crate::utils::base64_bytes", default)]
    pub value: Vec<u8>,
}

/// A stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub flags: u32,
    #[serde(rename = "type")]
    pub cred_type: CredentialType,
    pub target_name: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(with = "crate::utils::base64_bytes", default)]
    pub credential_blob: Vec<u8>,
    #[serde(default)]
    pub persist: Persist,
    #[serde(default)]
    pub attributes: Vec<CredentialAttribute>,
    #[serde(default)]
    pub target_alias: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    /// Set by the store on every write.
    #[serde(default)]
    pub last_written: Option<SystemTime>,
}

impl Credential {
    pub fn new(cred_type: CredentialType, target_name: impl Into<String>) -> Self {
        Self {
            flags: 0,
            cred_type,
            target_name: Some(target_name.into()),
            comment: None,
            credential_blob: Vec::new(),
            persist: Persist::LocalMachine,
            attributes: Vec::new(),
            target_alias: None,
            user_name: None,
            last_written: None,
        }
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    pub fn with_blob(mut self, blob: impl Into<Vec<u8>>) -> Self {
        self.credential_blob = blob.into();
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_persist(mut self, persist: Persist) -> Self {
        self.persist = persist;
        self
    }

    pub fn with_attribute(mut self, attribute: CredentialAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Marshaled user names of certificate credentials, decoded with the
    /// default [`Marshaler`].
    pub fn certificate_reference(&self) -> Option<CredentialIdentifier> {
        self.certificate_reference_with(&Marshaler::default())
    }

    pub fn certificate_reference_with(&self, marshaler: &Marshaler) -> Option<CredentialIdentifier> {
        match marshaler.unmarshal(self.user_name.as_deref()?) {
            Ok(id @ CredentialIdentifier::Certificate(_)) => Some(id),
            _ => None,
        }
    }
}

/// Names under which a server may be known, used to look up domain
/// credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetInformation {
    pub target_name: Option<String>,
    pub netbios_server_name: Option<String>,
    pub dns_server_name: Option<String>,
    pub netbios_domain_name: Option<String>,
    pub dns_domain_name: Option<String>,
    pub dns_tree_name: Option<String>,
    pub package_name: Option<String>,
    pub flags: u32,
    /// Restricts the lookup to these types when not empty.
    pub cred_types: Vec<CredentialType>,
}

impl TargetInformation {
    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        [
            &self.target_name,
            &self.netbios_server_name,
            &self.dns_server_name,
            &self.netbios_domain_name,
            &self.dns_domain_name,
            &self.dns_tree_name,
        ]
        .into_iter()
        .filter_map(|name| name.as_deref())
        .filter(|name| !name.is_empty())
    }
}

/// Storage interface of the credential manager.
#[async_trait]
pub trait CredentialStore: Debug + Send + Sync {
    /// Create or overwrite a credential.
    async fn write(&self, credential: Credential, flags: u32) -> Result<(), StoreError>;

    /// Read the credential stored for a target name and type.
    async fn read(
        &self,
        target_name: &str,
        cred_type: CredentialType,
        flags: u32,
    ) -> Result<Credential, StoreError>;

    /// Delete the credential stored for a target name and type.
    async fn delete(
        &self,
        target_name: &str,
        cred_type: CredentialType,
        flags: u32,
    ) -> Result<(), StoreError>;

    /// List credentials whose target name matches `filter`, or all of them.
    async fn enumerate(
        &self,
        filter: Option<&str>,
        flags: u32,
    ) -> Result<Vec<Credential>, StoreError>;

    /// Move a credential to a new target name.
    async fn rename(
        &self,
        old_target_name: &str,
        new_target_name: &str,
        cred_type: CredentialType,
        flags: u32,
    ) -> Result<(), StoreError>;

    /// Read the domain credentials matching any name of `target_info`.
    async fn read_domain_credentials(
        &self,
        target_info: Option<&TargetInformation>,
        flags: u32,
    ) -> Result<Vec<Credential>, StoreError>;

    /// Highest persistence supported for the first `count` credential type
    /// identifiers. Entry 0 is always [`Persist::None`].
    fn session_types(&self, count: usize) -> Vec<Persist>;
}

/// Checks a credential about to be written. User name limits and certificate
/// references follow the settings of `marshaler`.
pub(crate) fn validate_credential(
    credential: &Credential,
    flags: u32,
    marshaler: &Marshaler,
) -> Result<(), StoreError> {
    if flags & !CRED_PRESERVE_CREDENTIAL_BLOB != 0 {
        return Err(StoreError::InvalidFlags(flags));
    }
    if credential.flags & !(CRED_FLAGS_PROMPT_NOW | CRED_FLAGS_USERNAME_TARGET) != 0 {
        return Err(StoreError::InvalidFlags(credential.flags));
    }

    let cred_type = credential.cred_type;
    let target_name = credential
        .target_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| StoreError::invalid("target name is required"))?;
    if target_name.chars().count() > cred_type.max_target_name_length() {
        return Err(StoreError::invalid("target name is too long"));
    }

    if credential.persist == Persist::None {
        return Err(StoreError::invalid("persist must be set"));
    }
    if credential.credential_blob.len() > CRED_MAX_CREDENTIAL_BLOB_SIZE {
        return Err(StoreError::invalid("credential blob is too large"));
    }

    if credential.attributes.len() > CRED_MAX_ATTRIBUTES {
        return Err(StoreError::invalid("too many attributes"));
    }
    for attribute in &credential.attributes {
        if attribute.keyword.is_empty() || attribute.keyword.len() > CRED_MAX_STRING_LENGTH {
            return Err(StoreError::invalid("invalid attribute keyword"));
        }
        if attribute.value.len() > CRED_MAX_VALUE_SIZE {
            return Err(StoreError::invalid("attribute value is too large"));
        }
    }

    validate_user_name(cred_type, credential.user_name.as_deref(), marshaler)
}

fn validate_user_name(
    cred_type: CredentialType,
    user_name: Option<&str>,
    marshaler: &Marshaler,
) -> Result<(), StoreError> {
    let user_name = user_name.filter(|name| !name.is_empty());

    if let Some(name) = user_name {
        if name.encode_utf16().count() > marshaler.config().max_username_length {
            return Err(StoreError::BadUsername("user name is too long".into()));
        }
    }

    if cred_type.is_certificate() {
        let name = user_name
            .ok_or_else(|| StoreError::BadUsername("certificate reference is required".into()))?;
        return match marshaler.unmarshal(name) {
            Ok(CredentialIdentifier::Certificate(_)) => Ok(()),
            _ => Err(StoreError::BadUsername(
                "user name is not a marshaled certificate".into(),
            )),
        };
    }

    if cred_type.is_domain() {
        let name = user_name
            .ok_or_else(|| StoreError::BadUsername("domain credentials need a user name".into()))?;
        if !is_qualified_user_name(name) {
            return Err(StoreError::BadUsername(format!(
                "`{name}` has no domain qualifier"
            )));
        }
    }

    Ok(())
}

/// `DOMAIN\user` or `user@domain`, with both parts present.
fn is_qualified_user_name(name: &str) -> bool {
    let split = |separator: char| {
        name.split_once(separator)
            .is_some_and(|(a, b)| !a.is_empty() && !b.is_empty())
    };
    split('\\') || split('@')
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        config::MarshalConfig,
        core::{codec::PaddingPolicy, credential::CertificateCredential, marshal::marshal},
    };

    #[test]
    fn credential_type_range() {
        assert_eq!(CredentialType::try_from(1u32).unwrap(), CredentialType::Generic);
        assert_eq!(
            CredentialType::try_from(6u32).unwrap(),
            CredentialType::DomainExtended
        );
        for id in [0, CRED_TYPE_MAXIMUM, u32::MAX] {
            assert!(matches!(
                CredentialType::try_from(id),
                Err(StoreError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn qualified_user_names() {
        assert!(is_qualified_user_name("test\\winetest"));
        assert!(is_qualified_user_name("winetest@example.org"));
        assert!(!is_qualified_user_name("winetest"));
        assert!(!is_qualified_user_name("\\winetest"));
        assert!(!is_qualified_user_name("winetest@"));
    }

    #[test]
    fn certificate_user_names() {
        let marshaler = Marshaler::default();
        let token = marshal(&CertificateCredential::new([7; 20]).into()).unwrap();
        for cred_type in [
            CredentialType::DomainCertificate,
            CredentialType::GenericCertificate,
        ] {
            assert!(validate_user_name(cred_type, Some(&token), &marshaler).is_ok());
        }
        for name in ["test\\winetest", "@@CCAAAAA0BA"] {
            assert!(matches!(
                validate_user_name(CredentialType::DomainCertificate, Some(name), &marshaler),
                Err(StoreError::BadUsername(_))
            ));
        }

        let credential = Credential::new(CredentialType::DomainCertificate, "server")
            .with_user_name(token);
        assert_eq!(
            credential.certificate_reference(),
            Some(CertificateCredential::new([7; 20]).into())
        );
    }

    #[test]
    fn user_names_follow_marshal_settings() {
        // Certificate token with a set padding bit.
        let token = "@@BAAAAAAAAAAAAAAAAAAAAAAAAAAQ";
        let lenient = Marshaler::new(MarshalConfig {
            padding: PaddingPolicy::Lenient,
            ..Default::default()
        });

        assert!(validate_user_name(CredentialType::DomainCertificate, Some(token), &lenient).is_ok());
        assert!(matches!(
            validate_user_name(
                CredentialType::DomainCertificate,
                Some(token),
                &Marshaler::default()
            ),
            Err(StoreError::BadUsername(_))
        ));

        let credential = Credential::new(CredentialType::DomainCertificate, "server")
            .with_user_name(token);
        assert_eq!(credential.certificate_reference(), None);
        assert_eq!(
            credential.certificate_reference_with(&lenient),
            Some(CertificateCredential::new([0; 20]).into())
        );

        let short = Marshaler::new(MarshalConfig {
            max_username_length: 8,
            ..Default::default()
        });
        assert!(validate_user_name(CredentialType::Generic, Some("winetest"), &short).is_ok());
        assert!(matches!(
            validate_user_name(CredentialType::Generic, Some("winetest1"), &short),
            Err(StoreError::BadUsername(_))
        ));
    }

    #[test]
    fn serde_blob_is_base64() {
        let credential = Credential::new(CredentialType::Generic, "target").with_blob(*b"p4$$");
        let json = serde_json::to_value(&credential).unwrap();
        assert_eq!(json["credential_blob"], "cDQkJA==");
        assert_eq!(json["type"], "generic");

        let back: Credential = serde_json::from_value(json).unwrap();
        assert_eq!(back, credential);
    }
}
