//! Certificate authority primitive
//!
//! Signs a client certificate for a principal with a cluster's CA.

use clustergate_pki::CertificateAuthority;
use tracing::debug;

use crate::credentials::ClientCertPair;
use crate::error::Result;

/// Issues client certificates from caller-supplied CA material
#[cfg_attr(test, mockall::automock)]
pub trait CertificateIssuer: Send + Sync {
    /// Issue a client certificate/key for `principal` signed by the given CA
    fn issue(
        &self,
        principal: &str,
        organizations: &[String],
        ca_cert: &[u8],
        ca_key: &[u8],
    ) -> Result<ClientCertPair>;
}

/// [`CertificateIssuer`] backed by `clustergate-pki`
#[derive(Clone, Copy, Debug, Default)]
pub struct PkiCertificateIssuer;

impl CertificateIssuer for PkiCertificateIssuer {
    fn issue(
        &self,
        principal: &str,
        organizations: &[String],
        ca_cert: &[u8],
        ca_key: &[u8],
    ) -> Result<ClientCertPair> {
        let ca = CertificateAuthority::from_pem(ca_cert, ca_key)?;
        let (cert_pem, key_pem) = ca.issue_client_cert(principal, organizations)?;
        debug!(principal = %principal, "Issued client certificate");
        Ok(ClientCertPair::new(cert_pem.into_bytes(), key_pem.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use clustergate_pki::CertificateInfo;

    #[test]
    fn issues_cert_for_principal() {
        let ca = CertificateAuthority::new("cls-1-ca").unwrap();
        let pair = PkiCertificateIssuer
            .issue(
                "100001",
                &[],
                ca.ca_cert_pem().as_bytes(),
                ca.ca_key_pem().as_bytes(),
            )
            .unwrap();

        let info =
            CertificateInfo::from_pem(std::str::from_utf8(pair.cert_pem()).unwrap()).unwrap();
        assert_eq!(info.common_name, "100001");
    }

    #[test]
    fn missing_ca_is_internal() {
        let err = PkiCertificateIssuer
            .issue("100001", &[], b"", b"")
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
