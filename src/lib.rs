//! This library marshals credential identifiers into printable tokens, the
//! representation credential managers use to pass a certificate reference, a
//! user name or an opaque blob wherever a plain user name string is expected.
//!
//! # Marshaling
//!
//! ```
//! use credmarshal::core::credential::{CertificateCredential, CredentialIdentifier, UsernameTargetCredential};
//! use credmarshal::core::marshal::{marshal, unmarshal};
//!
//! let cert: CredentialIdentifier = CertificateCredential::new([0; 20]).into();
//! assert_eq!(marshal(&cert)?, "@@BAAAAAAAAAAAAAAAAAAAAAAAAAAA");
//!
//! let user: CredentialIdentifier = UsernameTargetCredential::new("test").into();
//! let token = marshal(&user)?;
//! assert_eq!(token, "@@CIAAAAA0BQZAMHA0BA");
//! assert_eq!(unmarshal(&token)?, user);
//! # Ok::<(), credmarshal::core::marshal::MarshalError>(())
//! ```
//!
//! # Token Format
//!
//! A token is the marker `@@`, one type character, then the body:
//!
//! 1. *Type character*: the alphabet symbol whose index is the [`MarshalType`]
//!    identifier (`B` for certificates, `C` for user names, `D` for blobs).
//! 2. *Body*: the payload packed six bits per symbol, least significant bit
//!    first, over the alphabet `A-Z a-z 0-9 # -`. Certificate bodies are the
//!    20-byte hash. User name and blob bodies start with their byte count as a
//!    little-endian `u32`, encoded on its own in six symbols.
//!
//! The codec core lives in [`core::codec`] and the framing in [`core::marshal`].
//! Decoding strictness is set by [`PaddingPolicy`] through [`Config`].
//!
//! [`MarshalType`]: crate::core::credential::MarshalType
//! [`core::codec`]: crate::core::codec
//! [`core::marshal`]: crate::core::marshal
//! [`PaddingPolicy`]: crate::core::codec::PaddingPolicy
//! [`Config`]: crate::config::Config
//!
//! # Credential Store
//!
//! Marshaled tokens are consumed by a credential manager, modeled by the
//! [`CredentialStore`] trait. [`MemoryStore`] implements it in memory and
//! enforces the same parameter validation as the native API, e.g. certificate
//! credentials must carry a marshaled certificate as their user name.
//!
//! [`CredentialStore`]: crate::store::CredentialStore
//! [`MemoryStore`]: crate::store::MemoryStore

pub mod config;
pub mod core;
pub mod store;
pub mod utils;
