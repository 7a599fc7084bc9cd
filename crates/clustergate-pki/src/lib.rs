//! PKI operations for per-identity client certificates
//!
//! Each remote cluster carries its own certificate authority. The proxy
//! loads that CA on demand and signs client certificates whose subject is the
//! calling identity, so requests reach the remote control plane with the
//! caller's authority instead of a shared service credential.
//!
//! # Certificates
//!
//! - Client certs carry `CN=<principal>` and at most one `O=<organization>`
//! - Extended key usage is `clientAuth` only
//! - Validity is [`CLIENT_CERT_VALIDITY_DAYS`] from issuance

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue, IsCa, Issuer,
    KeyPair, KeyUsagePurpose,
};
use thiserror::Error;
use x509_parser::prelude::*;

/// Validity period for CA certificates generated by [`CertificateAuthority::new`] (10 years)
pub const CA_VALIDITY_DAYS: i64 = 10 * 365;

/// Validity period for issued client certificates (1 year)
pub const CLIENT_CERT_VALIDITY_DAYS: i64 = 365;

/// Compute certificate validity period from now
fn compute_validity(days: i64) -> (::time::OffsetDateTime, ::time::OffsetDateTime) {
    let now = ::time::OffsetDateTime::now_utc();
    (now, now + ::time::Duration::days(days))
}

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// CA material is missing or empty
    #[error("CA not initialized: {0}")]
    CaNotInitialized(String),

    /// Certificate generation failed
    #[error("certificate generation failed: {0}")]
    CertificateGenerationFailed(String),

    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Certificate parsing error
    #[error("certificate parsing error: {0}")]
    ParseError(String),
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

/// Parse PEM-encoded data and return the DER bytes of the first block
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

/// Subject and validity of a certificate
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// When the certificate becomes valid (Unix timestamp)
    pub not_before: i64,
    /// When the certificate expires (Unix timestamp)
    pub not_after: i64,
    /// Subject common name
    pub common_name: String,
    /// Subject organization entries
    pub organizations: Vec<String>,
    /// Whether the certificate is a CA
    pub is_ca: bool,
}

impl CertificateInfo {
    /// Parse certificate info from PEM-encoded certificate
    pub fn from_pem(pem_data: &str) -> Result<Self> {
        let der = parse_pem(pem_data)?;
        Self::from_der(&der)
    }

    /// Parse certificate info from DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        let organizations = cert
            .subject()
            .iter_organization()
            .filter_map(|o| o.as_str().ok())
            .map(String::from)
            .collect();

        Ok(Self {
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            common_name,
            organizations,
            is_ca: cert.is_ca(),
        })
    }

    /// Total lifetime of the certificate in seconds
    pub fn lifetime_secs(&self) -> i64 {
        self.not_after - self.not_before
    }
}

/// Certificate authority of one remote cluster
#[derive(Clone)]
pub struct CertificateAuthority {
    /// CA key pair serialized as PEM (KeyPair isn't Clone)
    ca_key_pem: String,
    /// PEM-encoded CA certificate
    ca_cert_pem: String,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("ca_cert_pem", &self.ca_cert_pem.len())
            .finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Create a new self-signed CA
    pub fn new(common_name: &str) -> Result<Self> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_string()),
        );
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let (not_before, not_after) = compute_validity(CA_VALIDITY_DAYS);
        params.not_before = not_before;
        params.not_after = not_after;

        let key_pair = KeyPair::generate().map_err(|e| {
            PkiError::KeyGenerationFailed(format!("failed to generate CA key: {}", e))
        })?;
        let ca_key_pem = key_pair.serialize_pem();

        let cert = params.self_signed(&key_pair).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to create CA cert: {}", e))
        })?;

        Ok(Self {
            ca_key_pem,
            ca_cert_pem: cert.pem(),
        })
    }

    /// Load a CA from PEM bytes
    ///
    /// Empty input is reported as [`PkiError::CaNotInitialized`] so callers can
    /// tell "no CA configured" apart from "CA is corrupt".
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        if cert_pem.is_empty() {
            return Err(PkiError::CaNotInitialized("CA certificate is empty".into()));
        }
        if key_pem.is_empty() {
            return Err(PkiError::CaNotInitialized("CA key is empty".into()));
        }

        let cert_pem = std::str::from_utf8(cert_pem)
            .map_err(|e| PkiError::ParseError(format!("CA certificate is not UTF-8: {}", e)))?;
        let key_pem = std::str::from_utf8(key_pem)
            .map_err(|e| PkiError::ParseError(format!("CA key is not UTF-8: {}", e)))?;

        let _ = KeyPair::from_pem(key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to parse CA key: {}", e)))?;
        let _ = parse_pem(cert_pem)?;

        Ok(Self {
            ca_key_pem: key_pem.to_string(),
            ca_cert_pem: cert_pem.to_string(),
        })
    }

    /// PEM-encoded CA certificate
    pub fn ca_cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// PEM-encoded CA private key
    pub fn ca_key_pem(&self) -> &str {
        &self.ca_key_pem
    }

    fn load_key_pair(&self) -> Result<KeyPair> {
        KeyPair::from_pem(&self.ca_key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to load CA key: {}", e)))
    }

    /// Issue a client certificate for `common_name`
    ///
    /// Returns `(cert_pem, key_pem)`. A single entry in `organizations` becomes
    /// the `O=` attribute of the subject; more than one is rejected since the
    /// subject holds a single value per attribute type.
    pub fn issue_client_cert(
        &self,
        common_name: &str,
        organizations: &[String],
    ) -> Result<(String, String)> {
        if common_name.is_empty() {
            return Err(PkiError::CertificateGenerationFailed(
                "client certificate common name is empty".into(),
            ));
        }
        if organizations.len() > 1 {
            return Err(PkiError::CertificateGenerationFailed(format!(
                "at most one organization is supported, got {}",
                organizations.len()
            )));
        }

        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_string()),
        );
        for org in organizations {
            dn.push(DnType::OrganizationName, DnValue::Utf8String(org.clone()));
        }
        params.distinguished_name = dn;

        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![rcgen::ExtendedKeyUsagePurpose::ClientAuth];

        let (not_before, not_after) = compute_validity(CLIENT_CERT_VALIDITY_DAYS);
        params.not_before = not_before;
        params.not_after = not_after;

        let client_key = KeyPair::generate().map_err(|e| {
            PkiError::KeyGenerationFailed(format!("failed to generate client key: {}", e))
        })?;
        let client_key_pem = client_key.serialize_pem();

        let ca_key = self.load_key_pair()?;
        let issuer = Issuer::from_ca_cert_pem(&self.ca_cert_pem, &ca_key)
            .map_err(|e| PkiError::ParseError(format!("failed to create issuer: {}", e)))?;

        let client_cert = params.signed_by(&client_key, &issuer).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to sign client cert: {}", e))
        })?;

        Ok((client_cert.pem(), client_key_pem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ca_is_self_signed_ca() {
        let ca = CertificateAuthority::new("cls-1-ca").unwrap();
        let info = CertificateInfo::from_pem(ca.ca_cert_pem()).unwrap();
        assert_eq!(info.common_name, "cls-1-ca");
        assert!(info.is_ca);
        assert!(ca.ca_key_pem().contains("PRIVATE KEY"));
    }

    #[test]
    fn from_pem_round_trips_generated_ca() {
        let ca = CertificateAuthority::new("cls-1-ca").unwrap();
        let loaded =
            CertificateAuthority::from_pem(ca.ca_cert_pem().as_bytes(), ca.ca_key_pem().as_bytes())
                .unwrap();
        assert_eq!(loaded.ca_cert_pem(), ca.ca_cert_pem());
    }

    #[test]
    fn from_pem_rejects_empty_material() {
        assert!(matches!(
            CertificateAuthority::from_pem(b"", b"key"),
            Err(PkiError::CaNotInitialized(_))
        ));
        assert!(matches!(
            CertificateAuthority::from_pem(b"cert", b""),
            Err(PkiError::CaNotInitialized(_))
        ));
    }

    #[test]
    fn from_pem_rejects_garbage() {
        assert!(matches!(
            CertificateAuthority::from_pem(b"not a cert", b"not a key"),
            Err(PkiError::ParseError(_))
        ));
    }

    #[test]
    fn client_cert_binds_principal() {
        let ca = CertificateAuthority::new("cls-1-ca").unwrap();
        let (cert_pem, key_pem) = ca.issue_client_cert("100001", &[]).unwrap();

        let info = CertificateInfo::from_pem(&cert_pem).unwrap();
        assert_eq!(info.common_name, "100001");
        assert!(info.organizations.is_empty());
        assert!(!info.is_ca);
        assert!(key_pem.contains("PRIVATE KEY"));
    }

    #[test]
    fn client_cert_carries_organization() {
        let ca = CertificateAuthority::new("cls-1-ca").unwrap();
        let orgs = vec!["system:masters".to_string()];
        let (cert_pem, _) = ca.issue_client_cert("alice", &orgs).unwrap();

        let info = CertificateInfo::from_pem(&cert_pem).unwrap();
        assert_eq!(info.organizations, orgs);
    }

    #[test]
    fn client_cert_rejects_multiple_organizations() {
        let ca = CertificateAuthority::new("cls-1-ca").unwrap();
        let orgs = vec!["system:masters".to_string(), "dev".to_string()];
        assert!(matches!(
            ca.issue_client_cert("alice", &orgs),
            Err(PkiError::CertificateGenerationFailed(_))
        ));
    }

    #[test]
    fn client_cert_validity_is_one_year() {
        let ca = CertificateAuthority::new("cls-1-ca").unwrap();
        let (cert_pem, _) = ca.issue_client_cert("alice", &[]).unwrap();
        let info = CertificateInfo::from_pem(&cert_pem).unwrap();
        // DER timestamps drop sub-second precision
        let expected = CLIENT_CERT_VALIDITY_DAYS * 24 * 3600;
        assert!((info.lifetime_secs() - expected).abs() <= 1);
    }

    #[test]
    fn each_issue_generates_a_fresh_key() {
        let ca = CertificateAuthority::new("cls-1-ca").unwrap();
        let (_, key_a) = ca.issue_client_cert("alice", &[]).unwrap();
        let (_, key_b) = ca.issue_client_cert("alice", &[]).unwrap();
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn empty_common_name_is_rejected() {
        let ca = CertificateAuthority::new("cls-1-ca").unwrap();
        assert!(matches!(
            ca.issue_client_cert("", &[]),
            Err(PkiError::CertificateGenerationFailed(_))
        ));
    }
}
