use credmarshal::{
    core::{
        credential::{
            BinaryBlobCredential, CertificateCredential, CredentialIdentifier, MarshalType,
            UsernameTargetCredential,
        },
        marshal::{is_marshaled, marshal, unmarshal, ErrorKind, MarshalError, CERT_TOKEN_LENGTH},
    },
    utils::WideString,
};
use rand::Rng;

fn cert(hash: [u8; 20]) -> CredentialIdentifier {
    CertificateCredential::new(hash).into()
}

fn user(name: &str) -> CredentialIdentifier {
    UsernameTargetCredential::new(name).into()
}

fn hash_with_prefix(prefix: &[u8]) -> [u8; 20] {
    let mut hash = [0; 20];
    hash[..prefix.len()].copy_from_slice(prefix);
    hash
}

#[test]
fn certificate_vectors() {
    let vectors = [
        ([0; 20], "@@BAAAAAAAAAAAAAAAAAAAAAAAAAAA"),
        (hash_with_prefix(&[2]), "@@BCAAAAAAAAAAAAAAAAAAAAAAAAAA"),
        (hash_with_prefix(&[255]), "@@B-DAAAAAAAAAAAAAAAAAAAAAAAAA"),
        (hash_with_prefix(&[1, 1]), "@@BBEAAAAAAAAAAAAAAAAAAAAAAAAA"),
        (hash_with_prefix(&[1, 1, 1]), "@@BBEQAAAAAAAAAAAAAAAAAAAAAAAA"),
        (hash_with_prefix(b"Wine"), "@@BXlmblBAAAAAAAAAAAAAAAAAAAAA"),
        ([0xff; 20], "@@B--------------------------P"),
    ];

    for (hash, expected) in vectors {
        let token = marshal(&cert(hash)).unwrap();
        assert_eq!(token, expected);
        assert_eq!(token.len(), CERT_TOKEN_LENGTH);
        assert_eq!(unmarshal(&token).unwrap(), cert(hash));
    }
}

#[test]
fn username_vectors() {
    let vectors = [
        ("t", "@@CCAAAAA0BA"),
        ("te", "@@CEAAAAA0BQZAA"),
        ("tes", "@@CGAAAAA0BQZAMHA"),
        ("test", "@@CIAAAAA0BQZAMHA0BA"),
        ("test1", "@@CKAAAAA0BQZAMHA0BQMAA"),
        ("winetest", "@@CQAAAAA3BQaA4GAlBAdAUGAzBAdAA"),
    ];

    for (name, expected) in vectors {
        let token = marshal(&user(name)).unwrap();
        assert_eq!(token, expected);

        let CredentialIdentifier::UsernameTarget(decoded) = unmarshal(&token).unwrap() else {
            panic!("{token} did not decode to a user name");
        };
        assert_eq!(decoded.user_name, name);
    }
}

#[test]
fn binary_blob_vector() {
    let credential: CredentialIdentifier = BinaryBlobCredential::new(vec![0xff, 0x01, 0x80]).into();
    let token = marshal(&credential).unwrap();
    assert_eq!(token, "@@DDAAAAA-HAg");
    assert_eq!(unmarshal(&token).unwrap(), credential);
}

#[test]
fn username_token_growth() {
    // Two bytes per code unit at six bits per symbol: 8 symbols every 3 units.
    let mut previous = marshal(&user("x")).unwrap().len();
    for len in 2..=60 {
        let length = marshal(&user(&"x".repeat(len))).unwrap().len();
        assert!(length > previous);
        assert_eq!(length, 3 + 6 + (len * 16).div_ceil(6));
        previous = length;
    }
}

#[test]
fn unmarshal_rejections() {
    for token in ["", "@@CAAAAAA", "@@CAAAAAA0BA", "BAAAAAAAAAAAAAAAAAAAAAAAAAAA"] {
        assert_eq!(
            unmarshal(token).unwrap_err().kind(),
            ErrorKind::InvalidFormat,
            "{token:?}"
        );
    }
}

#[test]
fn empty_user_name_is_invalid_argument() {
    let err = marshal(&user("")).unwrap_err();
    assert_eq!(err, MarshalError::EmptyUserName);
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn deterministic() {
    let credential = cert(hash_with_prefix(b"deterministic"));
    assert_eq!(marshal(&credential).unwrap(), marshal(&credential).unwrap());
}

#[test]
fn random_round_trips() {
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let hash: [u8; 20] = rng.gen();
        let credential = cert(hash);
        assert_eq!(unmarshal(&marshal(&credential).unwrap()).unwrap(), credential);

        let len = rng.gen_range(1..=64);
        let units: Vec<u16> = (0..len).map(|_| rng.gen_range(1..=u16::MAX)).collect();
        let credential: CredentialIdentifier =
            UsernameTargetCredential::new(WideString::new(units)).into();
        let token = marshal(&credential).unwrap();
        assert!(is_marshaled(&token));
        assert_eq!(unmarshal(&token).unwrap(), credential);

        let len = rng.gen_range(1..=128);
        let blob: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        let credential: CredentialIdentifier = BinaryBlobCredential::new(blob).into();
        assert_eq!(unmarshal(&marshal(&credential).unwrap()).unwrap(), credential);
    }
}

#[test]
fn parse_from_str() {
    let credential: CredentialIdentifier = "@@CIAAAAA0BQZAMHA0BA".parse().unwrap();
    assert_eq!(credential.marshal_type(), MarshalType::UsernameTarget);
    assert!("test".parse::<CredentialIdentifier>().is_err());
}
