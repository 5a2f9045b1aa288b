//! Framing of credential identifiers into marshaled tokens.
//!
//! A token is `@@`, one type character, then the body. Certificate bodies are
//! the encoded 20-byte hash. Variable length bodies start with the encoded
//! little-endian `u32` byte count (always six symbols) followed by the
//! separately encoded payload; user names are UTF-16LE without a terminator.

use tracing::{debug, trace};

use crate::{config::MarshalConfig, utils::WideString};

use super::{
    alphabet,
    codec::{self, DecodeError},
    credential::{
        BinaryBlobCredential, CertificateCredential, CredentialIdentifier, MarshalType,
        UsernameTargetCredential, CERT_HASH_LENGTH,
    },
};

/// Marker opening every marshaled token.
pub const TOKEN_PREFIX: &str = "@@";

/// Longest user name accepted by default, in UTF-16 code units.
pub const CRED_MAX_USERNAME_LENGTH: usize = 256 + 1 + 256;

/// Largest binary blob accepted by default, in bytes.
pub const CRED_MAX_CREDENTIAL_BLOB_SIZE: usize = 5 * 512;

/// Length of a certificate token.
pub const CERT_TOKEN_LENGTH: usize = 3 + 27;

const LENGTH_PREFIX_SYMBOLS: usize = 6;

/// Coarse classification of a [`MarshalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required field of the payload is missing or out of range.
    InvalidArgument,
    /// The token is not a well formed marshaled credential.
    InvalidFormat,
    /// The requested marshal type is not known.
    Unsupported,
}

/// Credential marshaling error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarshalError {
    #[error("user name is empty")]
    EmptyUserName,

    #[error("user name contains a NUL code unit")]
    NulInUserName,

    #[error("user name is {length} code units long (at most {max} allowed)")]
    UserNameTooLong { length: usize, max: usize },

    #[error("binary blob is empty")]
    EmptyBlob,

    #[error("binary blob is {size} bytes (at most {max} allowed)")]
    BlobTooLarge { size: usize, max: usize },

    #[error("certificate hash must be 20 bytes, got {0}")]
    InvalidHashLength(usize),

    #[error("invalid certificate hash: {0}")]
    InvalidHash(String),

    #[error("unsupported marshal type {0}")]
    UnsupportedType(u32),

    #[error("token does not start with `@@`")]
    MissingPrefix,

    #[error("token has no type character")]
    MissingType,

    #[error("unknown marshal type character {0:?}")]
    UnknownType(char),

    #[error("invalid token body: {0}")]
    Decode(#[from] DecodeError),

    #[error("invalid {marshal_type} body: {reason}")]
    InvalidLayout {
        marshal_type: MarshalType,
        reason: &'static str,
    },
}

impl MarshalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarshalError::EmptyUserName
            | MarshalError::NulInUserName
            | MarshalError::UserNameTooLong { .. }
            | MarshalError::EmptyBlob
            | MarshalError::BlobTooLarge { .. }
            | MarshalError::InvalidHashLength(_)
            | MarshalError::InvalidHash(_) => ErrorKind::InvalidArgument,
            MarshalError::UnsupportedType(_) => ErrorKind::Unsupported,
            MarshalError::MissingPrefix
            | MarshalError::MissingType
            | MarshalError::UnknownType(_)
            | MarshalError::Decode(_)
            | MarshalError::InvalidLayout { .. } => ErrorKind::InvalidFormat,
        }
    }

    fn layout(marshal_type: MarshalType, reason: &'static str) -> Self {
        MarshalError::InvalidLayout {
            marshal_type,
            reason,
        }
    }
}

/// Converts credential identifiers to and from marshaled tokens.
///
/// A `Marshaler` holds no state besides its configuration and may be shared
/// freely between threads.
#[derive(Debug, Clone, Default)]
pub struct Marshaler {
    config: MarshalConfig,
}

impl Marshaler {
    pub fn new(config: MarshalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MarshalConfig {
        &self.config
    }

    /// Marshals a credential identifier into a printable token.
    ///
    /// # Errors
    /// Returns an [`ErrorKind::InvalidArgument`] error for an empty, oversized or
    /// NUL-bearing user name, and for an empty or oversized blob.
    pub fn marshal(&self, credential: &CredentialIdentifier) -> Result<String, MarshalError> {
        let marshal_type = credential.marshal_type();
        let token = self.marshal_payload(credential).map_err(|e| {
            debug!(%marshal_type, error = %e, "refusing to marshal credential");
            e
        })?;
        trace!(%marshal_type, length = token.len(), "marshaled credential");
        Ok(token)
    }

    /// Parses a printable token back into a credential identifier.
    ///
    /// Nothing is returned unless the whole token is valid.
    pub fn unmarshal(&self, token: &str) -> Result<CredentialIdentifier, MarshalError> {
        let credential = self.parse(token).map_err(|e| {
            debug!(error = %e, length = token.len(), "rejected marshaled credential");
            e
        })?;
        trace!(marshal_type = %credential.marshal_type(), "unmarshaled credential");
        Ok(credential)
    }

    /// Whether `token` is a valid marshaled credential.
    pub fn is_marshaled(&self, token: &str) -> bool {
        self.parse(token).is_ok()
    }

    fn marshal_payload(&self, credential: &CredentialIdentifier) -> Result<String, MarshalError> {
        match credential {
            CredentialIdentifier::Certificate(cert) => {
                let mut token = header(MarshalType::Certificate, CERT_TOKEN_LENGTH);
                codec::encode_into(cert.hash_of_cert(), &mut token);
                Ok(token)
            }
            CredentialIdentifier::UsernameTarget(UsernameTargetCredential { user_name }) => {
                if user_name.is_empty() {
                    return Err(MarshalError::EmptyUserName);
                }
                if user_name.contains_nul() {
                    return Err(MarshalError::NulInUserName);
                }
                let max = self.config.max_username_length;
                if user_name.len() > max {
                    return Err(MarshalError::UserNameTooLong {
                        length: user_name.len(),
                        max,
                    });
                }
                let bytes = user_name.to_le_bytes();
                let size = size_prefix(bytes.len()).ok_or(MarshalError::UserNameTooLong {
                    length: user_name.len(),
                    max,
                })?;
                Ok(framed(MarshalType::UsernameTarget, size, &bytes))
            }
            CredentialIdentifier::BinaryBlob(BinaryBlobCredential { blob }) => {
                if blob.is_empty() {
                    return Err(MarshalError::EmptyBlob);
                }
                let max = self.config.max_blob_size;
                if blob.len() > max {
                    return Err(MarshalError::BlobTooLarge {
                        size: blob.len(),
                        max,
                    });
                }
                let size = size_prefix(blob.len()).ok_or(MarshalError::BlobTooLarge {
                    size: blob.len(),
                    max,
                })?;
                Ok(framed(MarshalType::BinaryBlob, size, blob))
            }
        }
    }

    fn parse(&self, token: &str) -> Result<CredentialIdentifier, MarshalError> {
        let rest = token
            .strip_prefix(TOKEN_PREFIX)
            .ok_or(MarshalError::MissingPrefix)?;

        let mut chars = rest.chars();
        let type_char = chars.next().ok_or(MarshalError::MissingType)?;
        let body = chars.as_str();

        let marshal_type = alphabet::value_of(type_char)
            .and_then(|id| MarshalType::try_from(id as u32).ok())
            .ok_or(MarshalError::UnknownType(type_char))?;

        match marshal_type {
            MarshalType::Certificate => {
                let hash = codec::decode(body, self.config.padding)?;
                CertificateCredential::from_slice(&hash)
                    .map(Into::into)
                    .map_err(|_| MarshalError::layout(marshal_type, "hash is not 20 bytes"))
            }
            MarshalType::UsernameTarget => {
                let bytes = self.decode_framed(marshal_type, body)?;
                let user_name = WideString::from_le_bytes(&bytes)
                    .ok_or_else(|| MarshalError::layout(marshal_type, "odd byte count"))?;
                if user_name.contains_nul() {
                    return Err(MarshalError::layout(marshal_type, "embedded NUL"));
                }
                Ok(UsernameTargetCredential { user_name }.into())
            }
            MarshalType::BinaryBlob => {
                let blob = self.decode_framed(marshal_type, body)?;
                Ok(BinaryBlobCredential { blob }.into())
            }
        }
    }

    /// Decodes a length-prefixed body, checking the prefix against the
    /// configured limits and the actual body length.
    fn decode_framed(&self, marshal_type: MarshalType, body: &str) -> Result<Vec<u8>, MarshalError> {
        debug_assert!(marshal_type.is_variable_length());

        let split = body
            .char_indices()
            .nth(LENGTH_PREFIX_SYMBOLS)
            .map_or(body.len(), |(i, _)| i);
        let (prefix, payload) = body.split_at(split);
        if prefix.chars().count() < LENGTH_PREFIX_SYMBOLS {
            return Err(MarshalError::layout(marshal_type, "missing length prefix"));
        }

        let size_bytes: [u8; 4] = codec::decode(prefix, self.config.padding)?
            .try_into()
            .map_err(|_| MarshalError::layout(marshal_type, "malformed length prefix"))?;
        let size = u32::from_le_bytes(size_bytes) as usize;

        if size == 0 {
            return Err(MarshalError::layout(marshal_type, "zero length"));
        }
        if size > self.max_payload_size(marshal_type) {
            return Err(MarshalError::layout(marshal_type, "length exceeds the limit"));
        }
        if marshal_type == MarshalType::UsernameTarget && size % 2 != 0 {
            return Err(MarshalError::layout(marshal_type, "odd byte count"));
        }
        if payload.chars().count() != codec::encoded_len(size) {
            return Err(MarshalError::layout(
                marshal_type,
                "body length does not match the length prefix",
            ));
        }

        Ok(codec::decode(payload, self.config.padding)?)
    }

    fn max_payload_size(&self, marshal_type: MarshalType) -> usize {
        match marshal_type {
            MarshalType::Certificate => CERT_HASH_LENGTH,
            MarshalType::UsernameTarget => self.config.max_username_length.saturating_mul(2),
            MarshalType::BinaryBlob => self.config.max_blob_size,
        }
    }
}

fn header(marshal_type: MarshalType, capacity: usize) -> String {
    let mut token = String::with_capacity(capacity);
    token.push_str(TOKEN_PREFIX);
    token.push(alphabet::symbol(marshal_type.id() as u8));
    token
}

/// The length prefix is a `u32`, whatever limits the configuration allows.
fn size_prefix(len: usize) -> Option<u32> {
    u32::try_from(len).ok()
}

fn framed(marshal_type: MarshalType, size: u32, payload: &[u8]) -> String {
    let mut token = header(
        marshal_type,
        3 + LENGTH_PREFIX_SYMBOLS + codec::encoded_len(payload.len()),
    );
    codec::encode_into(&size.to_le_bytes(), &mut token);
    codec::encode_into(payload, &mut token);
    token
}

/// Marshals a credential identifier with the default configuration.
pub fn marshal(credential: &CredentialIdentifier) -> Result<String, MarshalError> {
    Marshaler::default().marshal(credential)
}

/// Unmarshals a token with the default configuration.
pub fn unmarshal(token: &str) -> Result<CredentialIdentifier, MarshalError> {
    Marshaler::default().unmarshal(token)
}

/// Whether `token` is a marshaled credential under the default configuration.
pub fn is_marshaled(token: &str) -> bool {
    Marshaler::default().is_marshaled(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::codec::PaddingPolicy;

    fn user(name: &str) -> CredentialIdentifier {
        UsernameTargetCredential::new(name).into()
    }

    #[test]
    fn empty_user_name() {
        let err = marshal(&user("")).unwrap_err();
        assert_eq!(err, MarshalError::EmptyUserName);
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn nul_in_user_name() {
        let err = marshal(&user("a\0b")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn user_name_limit() {
        let marshaler = Marshaler::new(MarshalConfig {
            max_username_length: 4,
            ..Default::default()
        });
        assert!(marshaler.marshal(&user("test")).is_ok());
        assert_eq!(
            marshaler.marshal(&user("test1")),
            Err(MarshalError::UserNameTooLong { length: 5, max: 4 })
        );

        // A longer name marshaled elsewhere is refused on the way back in.
        let token = marshal(&user("test1")).unwrap();
        assert_eq!(
            marshaler.unmarshal(&token).unwrap_err().kind(),
            ErrorKind::InvalidFormat
        );
    }

    #[test]
    fn blob_limits() {
        let empty = BinaryBlobCredential::new(Vec::new()).into();
        assert_eq!(marshal(&empty), Err(MarshalError::EmptyBlob));

        let huge = BinaryBlobCredential::new(vec![0; CRED_MAX_CREDENTIAL_BLOB_SIZE + 1]).into();
        assert_eq!(marshal(&huge).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn blob_round_trip() {
        for blob in [vec![0x00], vec![0xff, 0x01, 0x80], (0..=255).collect()] {
            let credential: CredentialIdentifier = BinaryBlobCredential::new(blob).into();
            let token = marshal(&credential).unwrap();
            assert!(token.starts_with("@@D"));
            assert_eq!(unmarshal(&token).unwrap(), credential);
        }
    }

    #[test]
    fn malformed_tokens() {
        for token in [
            "",
            "@",
            "@@",
            "AA",
            "@A",
            "@@A",
            "@@E",
            "@@?AAAA",
            "@@BAAA",
            "@@CAAAAAA",
            "@@CAAAAAA0BA",
            "@@CCAAAAA0B",
            "@@CCAAAAA0BAA",
            "@@CBAAAAAdA",
            "@@CCAAAAAAAA",
            "@@CCAA",
            "@@CCAAAAA0B+",
            "@@CCAAAéA0BA",
        ] {
            let err = unmarshal(token).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFormat, "{token:?}: {err}");
            assert!(!is_marshaled(token));
        }
    }

    #[test]
    fn padding_policy_applies_to_bodies() {
        // All-zero certificate whose final symbol carries a set padding bit.
        let token = "@@BAAAAAAAAAAAAAAAAAAAAAAAAAAQ";
        assert!(matches!(
            unmarshal(token),
            Err(MarshalError::Decode(DecodeError::NonZeroPadding))
        ));

        let lenient = Marshaler::new(MarshalConfig {
            padding: PaddingPolicy::Lenient,
            ..Default::default()
        });
        assert_eq!(
            lenient.unmarshal(token).unwrap(),
            CertificateCredential::new([0; CERT_HASH_LENGTH]).into()
        );
    }

    #[test]
    fn unbounded_limits() {
        let marshaler = Marshaler::new(MarshalConfig {
            max_username_length: usize::MAX,
            max_blob_size: usize::MAX,
            ..Default::default()
        });

        let credential = marshaler.unmarshal("@@CCAAAAA0BA").unwrap();
        assert_eq!(credential, user("t"));
        assert_eq!(marshaler.marshal(&credential).unwrap(), "@@CCAAAAA0BA");

        assert_eq!(size_prefix(u32::MAX as usize), Some(u32::MAX));
        if let Some(len) = (u32::MAX as usize).checked_add(1) {
            assert_eq!(size_prefix(len), None);
        }
    }

    #[test]
    fn unknown_type_character() {
        assert_eq!(unmarshal("@@A"), Err(MarshalError::UnknownType('A')));
        assert_eq!(unmarshal("@@!"), Err(MarshalError::UnknownType('!')));
        assert_eq!(unmarshal("@@"), Err(MarshalError::MissingType));
    }
}
