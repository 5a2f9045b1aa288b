use std::fmt;
use std::str::FromStr;

use crate::utils::WideString;

use super::marshal::{unmarshal, MarshalError};

/// Size of a certificate hash, in bytes.
pub const CERT_HASH_LENGTH: usize = 20;

/// Identifier of a marshaled credential variant.
///
/// The numeric value is carried by the token's type character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum MarshalType {
    Certificate = 1,
    UsernameTarget = 2,
    BinaryBlob = 3,
}

impl MarshalType {
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Whether the body of this variant opens with a length prefix.
    pub(crate) fn is_variable_length(self) -> bool {
        !matches!(self, MarshalType::Certificate)
    }
}

impl TryFrom<u32> for MarshalType {
    type Error = MarshalError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(MarshalType::Certificate),
            2 => Ok(MarshalType::UsernameTarget),
            3 => Ok(MarshalType::BinaryBlob),
            _ => Err(MarshalError::UnsupportedType(id)),
        }
    }
}

impl fmt::Display for MarshalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarshalType::Certificate => "certificate",
            MarshalType::UsernameTarget => "username_target",
            MarshalType::BinaryBlob => "binary_blob",
        };
        f.write_str(name)
    }
}

/// Reference to a certificate by the SHA-1 hash of its encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CertificateCredential {
    hash_of_cert: [u8; CERT_HASH_LENGTH],
}

impl CertificateCredential {
    pub fn new(hash_of_cert: [u8; CERT_HASH_LENGTH]) -> Self {
        Self { hash_of_cert }
    }

    /// Builds a certificate reference from a hash slice.
    ///
    /// # Errors
    /// Returns [`MarshalError::InvalidHashLength`] unless `hash` is exactly
    /// [`CERT_HASH_LENGTH`] bytes long.
    pub fn from_slice(hash: &[u8]) -> Result<Self, MarshalError> {
        hash.try_into()
            .map(Self::new)
            .map_err(|_| MarshalError::InvalidHashLength(hash.len()))
    }

    pub fn hash_of_cert(&self) -> &[u8; CERT_HASH_LENGTH] {
        &self.hash_of_cert
    }
}

impl fmt::Display for CertificateCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.hash_of_cert))
    }
}

/// Parses a hex encoded certificate hash (a "thumbprint").
impl FromStr for CertificateCredential {
    type Err = MarshalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| MarshalError::InvalidHash(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

/// A user name that the credential manager resolves to a stored target
/// credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UsernameTargetCredential {
    pub user_name: WideString,
}

impl UsernameTargetCredential {
    pub fn new(user_name: impl Into<WideString>) -> Self {
        Self {
            user_name: user_name.into(),
        }
    }
}

/// An opaque blob handed to the credential manager by reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryBlobCredential {
    pub blob: Vec<u8>,
}

impl BinaryBlobCredential {
    pub fn new(blob: impl Into<Vec<u8>>) -> Self {
        Self { blob: blob.into() }
    }
}

/// A credential identifier that can be marshaled into a printable token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CredentialIdentifier {
    Certificate(CertificateCredential),
    UsernameTarget(UsernameTargetCredential),
    BinaryBlob(BinaryBlobCredential),
}

impl CredentialIdentifier {
    pub fn marshal_type(&self) -> MarshalType {
        match self {
            CredentialIdentifier::Certificate(_) => MarshalType::Certificate,
            CredentialIdentifier::UsernameTarget(_) => MarshalType::UsernameTarget,
            CredentialIdentifier::BinaryBlob(_) => MarshalType::BinaryBlob,
        }
    }
}

impl From<CertificateCredential> for CredentialIdentifier {
    fn from(value: CertificateCredential) -> Self {
        CredentialIdentifier::Certificate(value)
    }
}

impl From<UsernameTargetCredential> for CredentialIdentifier {
    fn from(value: UsernameTargetCredential) -> Self {
        CredentialIdentifier::UsernameTarget(value)
    }
}

impl From<BinaryBlobCredential> for CredentialIdentifier {
    fn from(value: BinaryBlobCredential) -> Self {
        CredentialIdentifier::BinaryBlob(value)
    }
}

/// Parses a marshaled token with the default [`Marshaler`](super::marshal::Marshaler).
impl FromStr for CredentialIdentifier {
    type Err = MarshalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        unmarshal(s)
    }
}
