// Crypto layer - X.509 issuance, parsing and format conversion over OpenSSL
//
// The engine's state machine is agnostic to issuance details; everything that
// touches key material lives here. Operations are CPU-bound and treated as
// blocking by callers (spawn_blocking in async contexts).

use crate::error::EngineError;
use crate::model::certificate::{KeyType, SanEntry, SanKind};
use crate::Result;
use chrono::{DateTime, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
use openssl::pkey::{Id, PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::symm::Cipher;
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName, SubjectKeyIdentifier,
};
use openssl::x509::{X509, X509Builder, X509NameBuilder, X509Ref};
use sha2::{Digest, Sha256};

/// Issuance parameters shared by self-signed and CA-signed paths
#[derive(Debug, Clone)]
pub struct IssueParams {
    pub subject: Vec<SanEntry>,
    pub validity_days: u32,
    pub is_ca: bool,
}

/// Parsed view of a stored certificate
#[derive(Debug, Clone)]
pub struct ParsedCert {
    pub subject: Vec<SanEntry>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub key_type: KeyType,
    pub key_size: u32,
    pub sig_alg: String,
    pub is_ca: bool,
    pub serial: String,
    pub issuer_cn: Option<String>,
}

/// Generate a fresh private key
pub fn generate_key(key_type: KeyType, bits: u32) -> Result<PKey<Private>> {
    match key_type {
        KeyType::Rsa => {
            let rsa = Rsa::generate(bits)?;
            Ok(PKey::from_rsa(rsa)?)
        }
        KeyType::Ecdsa => {
            // bits selects the curve; P-256 and P-384 are what we issue
            let nid = if bits >= 384 {
                Nid::SECP384R1
            } else {
                Nid::X9_62_PRIME256V1
            };
            let group = EcGroup::from_curve_name(nid)?;
            let ec = EcKey::generate(&group)?;
            Ok(PKey::from_ec_key(ec)?)
        }
    }
}

/// Create a self-signed certificate (root CA or standalone leaf)
pub fn create_self_signed(params: &IssueParams, key: &PKeyRef<Private>) -> Result<X509> {
    build_certificate(params, key, None)
}

/// Create a certificate signed by the given CA
pub fn sign_with_ca(
    params: &IssueParams,
    key: &PKeyRef<Private>,
    ca_cert: &X509Ref,
    ca_key: &PKeyRef<Private>,
) -> Result<X509> {
    build_certificate(params, key, Some((ca_cert, ca_key)))
}

fn build_certificate(
    params: &IssueParams,
    key: &PKeyRef<Private>,
    issuer: Option<(&X509Ref, &PKeyRef<Private>)>,
) -> Result<X509> {
    let cn = params
        .subject
        .first()
        .map(|e| e.value.as_str())
        .ok_or_else(|| EngineError::invalid("Certificate subject must have at least one SAN"))?;

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, cn)?;
    let subject_name = name.build();

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_subject_name(&subject_name)?;
    builder.set_pubkey(key)?;

    match issuer {
        Some((ca_cert, _)) => builder.set_issuer_name(ca_cert.subject_name())?,
        None => builder.set_issuer_name(&subject_name)?,
    }

    // Random 159-bit serial, matching common CA practice
    let mut serial_bn = BigNum::new()?;
    serial_bn.rand(159, MsbOption::MAYBE_ZERO, false)?;
    let serial = serial_bn.to_asn1_integer()?;
    builder.set_serial_number(&serial)?;

    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(params.validity_days)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;

    if params.is_ca {
        builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
        builder.append_extension(
            KeyUsage::new()
                .critical()
                .key_cert_sign()
                .crl_sign()
                .build()?,
        )?;
    } else {
        builder.append_extension(BasicConstraints::new().critical().build()?)?;
        builder.append_extension(
            KeyUsage::new()
                .critical()
                .digital_signature()
                .key_encipherment()
                .build()?,
        )?;
        builder.append_extension(ExtendedKeyUsage::new().server_auth().client_auth().build()?)?;
    }

    {
        let issuer_ref = issuer.map(|(cert, _)| cert);
        let ctx = builder.x509v3_context(issuer_ref, None);

        let mut san = SubjectAlternativeName::new();
        for entry in &params.subject {
            match entry.kind {
                SanKind::Domain => san.dns(&entry.value),
                SanKind::Ip => san.ip(&entry.value),
            };
        }
        let san_ext = san.build(&ctx)?;
        let ski_ext = SubjectKeyIdentifier::new().build(&ctx)?;

        builder.append_extension(san_ext)?;
        builder.append_extension(ski_ext)?;
    }

    let signing_key = issuer.map(|(_, ca_key)| ca_key).unwrap_or(key);
    builder.sign(signing_key, MessageDigest::sha256())?;

    Ok(builder.build())
}

/// Parse a PEM certificate into the engine's view of it
pub fn parse_cert(pem: &[u8]) -> Result<(X509, ParsedCert)> {
    let cert = X509::from_pem(pem).map_err(|e| EngineError::InvalidInput {
        message: format!("Certificate parse error: {}", e),
    })?;
    let parsed = describe(&cert)?;
    Ok((cert, parsed))
}

/// Extract the parsed view from an already-loaded certificate
pub fn describe(cert: &X509Ref) -> Result<ParsedCert> {
    let mut subject = Vec::new();

    if let Some(sans) = cert.subject_alt_names() {
        for name in sans.iter() {
            if let Some(dns) = name.dnsname() {
                subject.push(SanEntry::domain(dns));
            } else if let Some(ip) = name.ipaddress() {
                subject.push(SanEntry::ip(format_ip(ip)));
            }
        }
    }

    // Fall back to the subject CN for SAN-less certificates
    if subject.is_empty() {
        if let Some(entry) = cert.subject_name().entries_by_nid(Nid::COMMONNAME).next() {
            if let Ok(cn) = entry.data().as_utf8() {
                subject.push(SanEntry::domain(cn.to_string()));
            }
        }
    }

    let pubkey = cert.public_key()?;
    let key_type = match pubkey.id() {
        Id::RSA => KeyType::Rsa,
        Id::EC => KeyType::Ecdsa,
        other => {
            return Err(EngineError::InvalidInput {
                message: format!("Unsupported key algorithm: {:?}", other),
            })
        }
    };

    let sig_alg = cert
        .signature_algorithm()
        .object()
        .nid()
        .long_name()
        .unwrap_or("unknown")
        .to_string();

    let serial = cert
        .serial_number()
        .to_bn()
        .and_then(|bn| bn.to_hex_str().map(|s| s.to_string().to_lowercase()))
        .unwrap_or_default();

    let issuer_cn = cert
        .issuer_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|e| e.data().as_utf8().ok().map(|s| s.to_string()));

    // The openssl bindings only expose pathlen directly; fall back to the
    // textual dump for CA certificates issued without a path length.
    let is_ca = cert.pathlen().is_some()
        || cert
            .to_text()
            .map(|t| String::from_utf8_lossy(&t).contains("CA:TRUE"))
            .unwrap_or(false);

    Ok(ParsedCert {
        subject,
        not_before: asn1_to_datetime(cert.not_before())?,
        not_after: asn1_to_datetime(cert.not_after())?,
        key_type,
        key_size: pubkey.bits(),
        sig_alg,
        is_ca,
        serial,
        issuer_cn,
    })
}

fn format_ip(raw: &[u8]) -> String {
    match raw.len() {
        4 => std::net::Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]).to_string(),
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(raw);
            std::net::Ipv6Addr::from(octets).to_string()
        }
        _ => hex::encode(raw),
    }
}

fn asn1_to_datetime(t: &Asn1TimeRef) -> Result<DateTime<Utc>> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(t)?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| EngineError::Internal("Certificate timestamp out of range".into()))
}

/// SHA-256 fingerprint of the DER encoding, lowercase hex
pub fn compute_fingerprint(cert: &X509Ref) -> Result<String> {
    let der = cert.to_der()?;
    Ok(hex::encode(Sha256::digest(&der)))
}

/// Whether a PEM private key is passphrase-protected
pub fn key_needs_passphrase(key_pem: &[u8]) -> bool {
    let text = String::from_utf8_lossy(key_pem);
    if text.contains("ENCRYPTED") {
        return true;
    }
    PKey::private_key_from_pem(key_pem).is_err()
}

/// Load a private key, decrypting with the passphrase when given
pub fn load_key(key_pem: &[u8], passphrase: Option<&str>) -> Result<PKey<Private>> {
    match passphrase {
        Some(pass) => PKey::private_key_from_pem_passphrase(key_pem, pass.as_bytes()).map_err(
            |e| EngineError::InvalidInput {
                message: format!("Failed to decrypt private key: {}", e),
            },
        ),
        None => PKey::private_key_from_pem(key_pem).map_err(|e| EngineError::InvalidInput {
            message: format!("Failed to load private key: {}", e),
        }),
    }
}

/// Serialize a private key to PEM, encrypting when a passphrase is given
pub fn key_to_pem(key: &PKeyRef<Private>, passphrase: Option<&str>) -> Result<Vec<u8>> {
    match passphrase {
        Some(pass) => Ok(key
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), pass.as_bytes())?),
        None => Ok(key.private_key_to_pem_pkcs8()?),
    }
}

/// Target of a format conversion
pub struct ConvertInput<'a> {
    pub cert: &'a X509Ref,
    pub key: Option<&'a PKeyRef<Private>>,
    /// Signer chain, leaf-most first
    pub chain: &'a [X509],
    pub password: Option<&'a str>,
    pub friendly_name: &'a str,
}

/// Derive a non-canonical artifact form. Returns the raw bytes to write.
pub fn convert(input: &ConvertInput<'_>, form: crate::model::ArtifactForm) -> Result<Vec<u8>> {
    use crate::model::ArtifactForm;

    match form {
        ArtifactForm::Der | ArtifactForm::Cer => Ok(input.cert.to_der()?),
        ArtifactForm::Pem => {
            let mut out = input.cert.to_pem()?;
            if let Some(key) = input.key {
                out.extend_from_slice(&key_to_pem(key, input.password)?);
            }
            Ok(out)
        }
        ArtifactForm::Chain => {
            let mut out = Vec::new();
            for cert in input.chain {
                out.extend_from_slice(&cert.to_pem()?);
            }
            Ok(out)
        }
        ArtifactForm::Fullchain => {
            let mut out = input.cert.to_pem()?;
            for cert in input.chain {
                out.extend_from_slice(&cert.to_pem()?);
            }
            Ok(out)
        }
        ArtifactForm::P12 | ArtifactForm::Pfx => {
            let key = input.key.ok_or_else(|| {
                EngineError::invalid("PKCS#12 export requires the private key")
            })?;
            let fingerprint = compute_fingerprint(input.cert)?;
            let password = input
                .password
                .ok_or(EngineError::PassphraseRequired { fingerprint })?;

            let mut ca_stack = Stack::new()?;
            for cert in input.chain {
                ca_stack.push(cert.clone())?;
            }

            let mut builder = Pkcs12::builder();
            builder.name(input.friendly_name);
            builder.pkey(key);
            builder.cert(input.cert);
            builder.ca(ca_stack);
            let p12 = builder.build2(password)?;
            Ok(p12.to_der()?)
        }
        ArtifactForm::P7b => {
            let key = input.key.ok_or_else(|| {
                EngineError::invalid("PKCS#7 export requires the private key")
            })?;
            let mut certs = Stack::new()?;
            for cert in input.chain {
                certs.push(cert.clone())?;
            }
            let p7 = Pkcs7::sign(
                input.cert,
                key,
                &certs,
                &[],
                Pkcs7Flags::DETACHED | Pkcs7Flags::NOATTR,
            )?;
            Ok(p7.to_pem()?)
        }
        ArtifactForm::Crt | ArtifactForm::Key | ArtifactForm::Csr | ArtifactForm::Ext => {
            Err(EngineError::invalid(format!(
                "'{}' is a canonical form, not a conversion target",
                form
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArtifactForm;

    fn issue_leaf() -> (X509, PKey<Private>) {
        let key = generate_key(KeyType::Rsa, 2048).unwrap();
        let params = IssueParams {
            subject: vec![SanEntry::domain("leaf.example.com"), SanEntry::ip("10.0.0.5")],
            validity_days: 90,
            is_ca: false,
        };
        let cert = create_self_signed(&params, &key).unwrap();
        (cert, key)
    }

    #[test]
    fn test_self_signed_roundtrip() {
        let (cert, _key) = issue_leaf();
        let parsed = describe(&cert).unwrap();

        assert_eq!(parsed.subject[0], SanEntry::domain("leaf.example.com"));
        assert_eq!(parsed.subject[1], SanEntry::ip("10.0.0.5"));
        assert_eq!(parsed.key_type, KeyType::Rsa);
        assert_eq!(parsed.key_size, 2048);
        assert!(!parsed.is_ca);
        assert!(parsed.not_after > parsed.not_before);
    }

    #[test]
    fn test_ca_signing_chain() {
        let ca_key = generate_key(KeyType::Rsa, 2048).unwrap();
        let ca_params = IssueParams {
            subject: vec![SanEntry::domain("Test Root CA")],
            validity_days: 3650,
            is_ca: true,
        };
        let ca_cert = create_self_signed(&ca_params, &ca_key).unwrap();
        assert!(describe(&ca_cert).unwrap().is_ca);

        let leaf_key = generate_key(KeyType::Rsa, 2048).unwrap();
        let leaf_params = IssueParams {
            subject: vec![SanEntry::domain("svc.example.com")],
            validity_days: 90,
            is_ca: false,
        };
        let leaf = sign_with_ca(&leaf_params, &leaf_key, &ca_cert, &ca_key).unwrap();

        // Signature verifies against the CA public key
        assert!(leaf.verify(&ca_key).unwrap());
        let parsed = describe(&leaf).unwrap();
        assert_eq!(parsed.issuer_cn.as_deref(), Some("Test Root CA"));
    }

    #[test]
    fn test_fingerprint_stable_and_content_derived() {
        let (cert, _) = issue_leaf();
        let fp1 = compute_fingerprint(&cert).unwrap();
        let fp2 = compute_fingerprint(&cert).unwrap();
        assert_eq!(fp1, fp2);
        assert_eq!(fp1.len(), 64);

        let (other, _) = issue_leaf();
        assert_ne!(fp1, compute_fingerprint(&other).unwrap());
    }

    #[test]
    fn test_convert_der_preserves_fingerprint() {
        let (cert, key) = issue_leaf();
        let input = ConvertInput {
            cert: &cert,
            key: Some(&key),
            chain: &[],
            password: None,
            friendly_name: "leaf",
        };
        let der = convert(&input, ArtifactForm::Der).unwrap();
        let reparsed = X509::from_der(&der).unwrap();
        assert_eq!(
            compute_fingerprint(&cert).unwrap(),
            compute_fingerprint(&reparsed).unwrap()
        );
    }

    #[test]
    fn test_p12_requires_password() {
        let (cert, key) = issue_leaf();
        let input = ConvertInput {
            cert: &cert,
            key: Some(&key),
            chain: &[],
            password: None,
            friendly_name: "leaf",
        };
        let err = convert(&input, ArtifactForm::P12).unwrap_err();
        assert_eq!(err.kind(), "PassphraseRequired");
    }

    #[test]
    fn test_p12_roundtrip_with_password() {
        let (cert, key) = issue_leaf();
        let input = ConvertInput {
            cert: &cert,
            key: Some(&key),
            chain: &[],
            password: Some("export-pass"),
            friendly_name: "leaf",
        };
        let der = convert(&input, ArtifactForm::P12).unwrap();
        let p12 = Pkcs12::from_der(&der).unwrap();
        let parsed = p12.parse2("export-pass").unwrap();
        let inner = parsed.cert.unwrap();
        assert_eq!(
            compute_fingerprint(&cert).unwrap(),
            compute_fingerprint(&inner).unwrap()
        );
    }

    #[test]
    fn test_encrypted_key_detection_and_decrypt() {
        let key = generate_key(KeyType::Rsa, 2048).unwrap();
        let plain_pem = key_to_pem(&key, None).unwrap();
        assert!(!key_needs_passphrase(&plain_pem));

        let enc_pem = key_to_pem(&key, Some("hunter2")).unwrap();
        assert!(key_needs_passphrase(&enc_pem));

        assert!(load_key(&enc_pem, None).is_err());
        let loaded = load_key(&enc_pem, Some("hunter2")).unwrap();
        assert!(loaded.public_eq(&key));
    }

    #[test]
    fn test_ecdsa_keygen() {
        let key = generate_key(KeyType::Ecdsa, 256).unwrap();
        let params = IssueParams {
            subject: vec![SanEntry::domain("ec.example.com")],
            validity_days: 30,
            is_ca: false,
        };
        let cert = create_self_signed(&params, &key).unwrap();
        let parsed = describe(&cert).unwrap();
        assert_eq!(parsed.key_type, KeyType::Ecdsa);
        assert_eq!(parsed.key_size, 256);
    }
}
