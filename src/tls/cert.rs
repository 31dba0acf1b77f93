//! Certificate handling module
//!
//! Helpers over PEM-encoded X.509 material: subject and fingerprint for
//! logging, the subject common name used as the default node identity, and
//! self-signed identities for test harnesses.

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509Builder, X509NameBuilder, X509};

use crate::common::{ProxyError, Result};

/// Parse the first certificate of a PEM bundle
pub fn load_cert(pem: &[u8]) -> Result<X509> {
    X509::from_pem(pem).map_err(|e| ProxyError::Certificate(format!("Invalid PEM certificate: {}", e)))
}

/// Get the subject common name
///
/// Nodes are issued certificates whose CN is their logical identifier; this
/// is what the outbound leg verifies against when no explicit override is
/// configured.
///
/// # Errors
///
/// Returns an error if the certificate cannot be parsed or has no CN.
pub fn certificate_common_name(pem: &[u8]) -> Result<String> {
    let cert = load_cert(pem)?;
    let entry = cert
        .subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .ok_or_else(|| ProxyError::Certificate("Certificate subject has no common name".to_string()))?;
    let name = entry.data().as_utf8()?;
    Ok(name.to_string())
}

/// Get certificate subject information, e.g. `CN=node-0, O=example`
pub fn certificate_subject(pem: &[u8]) -> Result<String> {
    let cert = load_cert(pem)?;
    let mut parts = Vec::new();
    for entry in cert.subject_name().entries() {
        let key = entry.object().nid().short_name().unwrap_or("?");
        let value = entry.data().as_utf8()?;
        parts.push(format!("{}={}", key, value));
    }
    Ok(parts.join(", "))
}

/// Get the SHA-256 fingerprint as colon-separated hex
pub fn certificate_fingerprint(pem: &[u8]) -> Result<String> {
    let cert = load_cert(pem)?;
    let digest = cert.digest(MessageDigest::sha256())?;
    Ok(digest.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(":"))
}

/// Generate a self-signed identity
///
/// EC P-256 key, CN set to `common_name`, and SANs covering the common name,
/// `localhost` and `127.0.0.1`, so the certificate can be both the server
/// identity and the root trust of a local proxy/node pair.
///
/// # Returns
///
/// `(certificate_pem, private_key_pem)`
pub fn generate_self_signed(common_name: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
    let key = PKey::from_ec_key(EcKey::generate(&group)?)?;

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    let name = name.build();

    let serial = {
        let mut bn = BigNum::new()?;
        bn.rand(128, MsbOption::MAYBE_ZERO, false)?;
        bn.to_asn1_integer()?
    };

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(&key)?;
    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(365)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;

    let san = SubjectAlternativeName::new()
        .dns(common_name)
        .dns("localhost")
        .ip("127.0.0.1")
        .build(&builder.x509v3_context(None, None))?;
    builder.append_extension(san)?;
    builder.sign(&key, MessageDigest::sha256())?;

    let cert = builder.build();
    Ok((cert.to_pem()?, key.private_key_to_pem_pkcs8()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_name_roundtrip() {
        let (cert, key) = generate_self_signed("4d80a1b2").unwrap();
        assert_eq!(certificate_common_name(&cert).unwrap(), "4d80a1b2");
        assert!(String::from_utf8(key).unwrap().contains("PRIVATE KEY"));
    }

    #[test]
    fn test_subject_and_fingerprint() {
        let (cert, _) = generate_self_signed("node-0").unwrap();
        assert_eq!(certificate_subject(&cert).unwrap(), "CN=node-0");

        let fingerprint = certificate_fingerprint(&cert).unwrap();
        assert_eq!(fingerprint.split(':').count(), 32);
    }

    #[test]
    fn test_self_signed_validity_window() {
        let (pem, _) = generate_self_signed("node-0").unwrap();
        let cert = load_cert(&pem).unwrap();

        let now = Asn1Time::days_from_now(0).unwrap();
        let in_a_year = Asn1Time::days_from_now(364).unwrap();
        assert_ne!(cert.not_before().compare(&now).unwrap(), std::cmp::Ordering::Greater);
        assert_eq!(cert.not_after().compare(&in_a_year).unwrap(), std::cmp::Ordering::Greater);
    }

    #[test]
    fn test_invalid_pem() {
        assert!(matches!(
            certificate_common_name(b"not a certificate"),
            Err(ProxyError::Certificate(_))
        ));
    }
}
