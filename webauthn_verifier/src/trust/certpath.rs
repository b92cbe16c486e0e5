use std::sync::Arc;

use x509_parser::prelude::*;

use super::revocation::{CrlSource, check_revocation};
use crate::anchor::{TrustAnchor, TrustAnchorSet};
use crate::config::PathValidationConfig;
use crate::errors::CertificateError;

fn parse(der: &[u8]) -> Result<X509Certificate<'_>, CertificateError> {
    X509Certificate::from_der(der)
        .map(|(_, cert)| cert)
        .map_err(|e| CertificateError::Parse(e.to_string()))
}

/// `(ca, pathLenConstraint)` from the basic constraints extension.
fn ca_constraints(cert: &X509Certificate<'_>) -> Result<(bool, Option<u32>), CertificateError> {
    match cert.basic_constraints() {
        Ok(Some(ext)) => Ok((ext.value.ca, ext.value.path_len_constraint)),
        Ok(None) => Ok((false, None)),
        Err(e) => Err(CertificateError::Parse(format!(
            "Invalid basic constraints in {}: {e}",
            cert.subject()
        ))),
    }
}

fn check_validity(cert: &X509Certificate<'_>, now: ASN1Time) -> Result<(), CertificateError> {
    let validity = cert.validity();
    if now < validity.not_before {
        return Err(CertificateError::NotYetValid(cert.subject().to_string()));
    }
    if now > validity.not_after {
        return Err(CertificateError::Expired(cert.subject().to_string()));
    }
    Ok(())
}

/// Checks that `issuer` may sign `subject` and that it did.
fn check_link(
    subject: &X509Certificate<'_>,
    issuer: &X509Certificate<'_>,
) -> Result<(), CertificateError> {
    if subject.issuer().as_raw() != issuer.subject().as_raw() {
        return Err(CertificateError::BrokenChain(format!(
            "issuer of {} is {}, next certificate is {}",
            subject.subject(),
            subject.issuer(),
            issuer.subject()
        )));
    }
    subject
        .verify_signature(Some(issuer.public_key()))
        .map_err(|e| {
            CertificateError::BrokenChain(format!(
                "signature of {} does not verify with {}: {e}",
                subject.subject(),
                issuer.subject()
            ))
        })
}

/// X.509 path validation against a set of trust anchors.
pub(crate) struct CertPathValidator {
    config: PathValidationConfig,
    crl_source: Option<Arc<dyn CrlSource>>,
}

impl CertPathValidator {
    pub(crate) fn new(config: PathValidationConfig, crl_source: Option<Arc<dyn CrlSource>>) -> Self {
        Self { config, crl_source }
    }

    /// Validates `path` (leaf first) and returns the anchor it terminates at.
    ///
    /// A certificate of the path that is itself an anchor ends the path there.
    pub(crate) fn validate<'a>(
        &self,
        path: &[Vec<u8>],
        anchors: &'a TrustAnchorSet,
        now: ASN1Time,
    ) -> Result<&'a TrustAnchor, CertificateError> {
        if path.is_empty() {
            return Err(CertificateError::EmptyPath);
        }

        let mut certs = Vec::with_capacity(path.len());
        let mut anchored = None;
        for der in path {
            if let Some(anchor) = anchors.iter().find(|a| a.certificate() == der.as_slice()) {
                anchored = Some(anchor);
                break;
            }
            certs.push(parse(der)?);
        }

        if certs.is_empty() {
            // The leaf itself is an anchor
            let anchor = anchored.ok_or(CertificateError::UntrustedRoot)?;
            check_validity(&parse(anchor.certificate())?, now)?;
            return Ok(anchor);
        }

        for (i, pair) in certs.windows(2).enumerate() {
            let (subject, issuer) = (&pair[0], &pair[1]);
            check_link(subject, issuer)?;

            let (ca, path_len) = ca_constraints(issuer)?;
            if !ca {
                return Err(CertificateError::NotCa(issuer.subject().to_string()));
            }
            // Intermediates below `issuer`, not counting the leaf
            if path_len.is_some_and(|max| i as u32 > max) {
                return Err(CertificateError::PathLengthExceeded(
                    issuer.subject().to_string(),
                ));
            }
        }

        for cert in &certs {
            check_validity(cert, now)?;
        }

        let (anchor, anchor_cert) = self.find_anchor(&certs, anchored, anchors, now)?;

        if let Some(constraints) = anchor.name_constraints() {
            for cert in &certs {
                if cert.subject().iter().next().is_none() {
                    continue;
                }
                if !constraints.permits(cert.subject()) {
                    return Err(CertificateError::NameConstraintViolation(
                        cert.subject().to_string(),
                    ));
                }
            }
        }

        if self.config.revocation_check_enabled {
            let source = self.crl_source.as_deref().ok_or_else(|| {
                CertificateError::RevocationUnknown("no CRL source configured".to_string())
            })?;
            for (i, cert) in certs.iter().enumerate() {
                let issuer_key = match certs.get(i + 1) {
                    Some(issuer) => issuer.public_key(),
                    None => anchor_cert.public_key(),
                };
                check_revocation(source, cert, issuer_key, now)?;
            }
        }

        tracing::debug!(
            "Certificate path of {} certificates terminates at {}",
            certs.len(),
            anchor.subject()
        );
        Ok(anchor)
    }

    /// Finds the anchor that issued the last certificate of the path.
    fn find_anchor<'a>(
        &self,
        certs: &[X509Certificate<'_>],
        anchored: Option<&'a TrustAnchor>,
        anchors: &'a TrustAnchorSet,
        now: ASN1Time,
    ) -> Result<(&'a TrustAnchor, X509Certificate<'a>), CertificateError> {
        let Some(last) = certs.last() else {
            return Err(CertificateError::EmptyPath);
        };
        let intermediates = certs.len() - 1;

        let candidates: Vec<&TrustAnchor> = match anchored {
            Some(anchor) => vec![anchor],
            None => anchors.iter().collect(),
        };

        for anchor in candidates {
            let anchor_cert = parse(anchor.certificate())?;
            if last.issuer().as_raw() != anchor_cert.subject().as_raw()
                || last.verify_signature(Some(anchor_cert.public_key())).is_err()
            {
                continue;
            }

            check_validity(&anchor_cert, now)?;
            let (_, path_len) = ca_constraints(&anchor_cert)?;
            if path_len.is_some_and(|max| intermediates as u32 > max) {
                return Err(CertificateError::PathLengthExceeded(anchor.subject().to_string()));
            }
            return Ok((anchor, anchor_cert));
        }

        match anchored {
            Some(anchor) => Err(CertificateError::BrokenChain(format!(
                "{} is not issued by {}",
                last.subject(),
                anchor.subject()
            ))),
            None => Err(CertificateError::UntrustedRoot),
        }
    }
}
