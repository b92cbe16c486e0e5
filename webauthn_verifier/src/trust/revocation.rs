use std::collections::HashMap;

use x509_parser::prelude::*;
use x509_parser::revocation_list::CertificateRevocationList;

use crate::errors::CertificateError;

/// Provides CRLs for certificate issuers.
///
/// Implementations backed by the network or the filesystem block the calling thread;
/// callers bound the validation with their own timeout.
pub trait CrlSource: Send + Sync {
    /// DER encoded CRLs published by the issuer with the given raw DER name.
    fn crls_for_issuer(&self, issuer: &[u8]) -> Vec<Vec<u8>>;
}

/// CRLs held in memory, indexed by issuer name.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCrlSource {
    crls: HashMap<Vec<u8>, Vec<Vec<u8>>>,
}

impl InMemoryCrlSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// * `CertificateError::Parse` - the CRL cannot be parsed
    pub fn add(&mut self, crl: Vec<u8>) -> Result<(), CertificateError> {
        let issuer = {
            let (_, parsed) = CertificateRevocationList::from_der(&crl)
                .map_err(|e| CertificateError::Parse(format!("Invalid CRL: {e}")))?;
            parsed.issuer().as_raw().to_vec()
        };
        self.crls.entry(issuer).or_default().push(crl);
        Ok(())
    }
}

impl CrlSource for InMemoryCrlSource {
    fn crls_for_issuer(&self, issuer: &[u8]) -> Vec<Vec<u8>> {
        self.crls.get(issuer).cloned().unwrap_or_default()
    }
}

/// Confirms that `cert` is not revoked by its issuer.
///
/// A CRL counts only when it is signed by `issuer_key` and current at `now`. Without
/// at least one such CRL the status is unknown, which is an error.
pub(crate) fn check_revocation(
    source: &dyn CrlSource,
    cert: &X509Certificate<'_>,
    issuer_key: &SubjectPublicKeyInfo<'_>,
    now: ASN1Time,
) -> Result<(), CertificateError> {
    let serial = cert.raw_serial_as_string();
    let mut confirmed = false;

    for der in source.crls_for_issuer(cert.issuer().as_raw()) {
        let Ok((_, crl)) = CertificateRevocationList::from_der(&der) else {
            tracing::warn!("Skipping unparsable CRL for issuer {}", cert.issuer());
            continue;
        };
        if crl.verify_signature(issuer_key).is_err() {
            tracing::warn!("Skipping CRL with invalid signature for issuer {}", cert.issuer());
            continue;
        }
        match crl.next_update() {
            Some(next_update) if now <= next_update && crl.last_update() <= now => {}
            _ => {
                tracing::debug!("Skipping CRL that is not current for issuer {}", cert.issuer());
                continue;
            }
        }

        if crl
            .iter_revoked_certificates()
            .any(|revoked| revoked.raw_serial() == cert.raw_serial())
        {
            return Err(CertificateError::Revoked(serial));
        }
        confirmed = true;
    }

    if confirmed {
        Ok(())
    } else {
        Err(CertificateError::RevocationUnknown(format!(
            "no current CRL covers serial {serial}"
        )))
    }
}
