//! Revocation status of the fetched leaf certificate.
//!
//! The oracle asks the certificate's OCSP responders first (faster and
//! preferred) and falls back to its CRL distribution points. Nothing in
//! here aborts the pipeline: every transport, parse or protocol failure
//! folds into [`RevocationStatus::Unknown`] through `reconcile`, the one
//! place where raw oracle outcomes become a status.

use std::time::Duration;

use log::debug;
use openssl::hash::MessageDigest;
use openssl::ocsp::{
    OcspCertId, OcspCertIdRef, OcspCertStatus, OcspRequest, OcspResponse, OcspResponseStatus,
    OcspRevokedStatus, OcspStatus,
};
use openssl::x509::{CrlStatus, X509, X509Crl};
use reqwest::blocking::Client;
use x509_parser::prelude::*;

use crate::probe::{format_name, PeerCertificate};

/// HTTP timeout for OCSP and CRL traffic, in seconds.
const HTTP_TIMEOUT: u64 = 10;
/// Allowed clock skew when checking OCSP response freshness, in seconds.
const OCSP_LEEWAY_SECS: u32 = 300;

const OID_AD_OCSP: &str = "1.3.6.1.5.5.7.48.1";
const OID_AD_CA_ISSUERS: &str = "1.3.6.1.5.5.7.48.2";

/// Revocation status of a certificate.
///
/// Only valid states are representable; "revoked but unconfirmed" does not
/// exist by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationStatus {
    /// Confirmed not revoked.
    Good,
    /// Confirmed revoked. Carries mechanism, reason code and revocation
    /// time where the oracle provided them.
    Revoked(String),
    /// Status could not be confirmed. Carries the underlying reason.
    Unknown(String),
}

/// Final verdict over the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// True iff the revocation status is confirmed good.
    pub valid: bool,
    /// Human-readable reasons when invalid.
    pub reasons: Vec<String>,
}

impl Verdict {
    /// Derives the verdict from the revocation status alone. The strict
    /// probe result is reported as a warning and never enters here.
    pub fn derive(revocation: &RevocationStatus) -> Verdict {
        match revocation {
            RevocationStatus::Good => Verdict {
                valid: true,
                reasons: Vec::new(),
            },
            RevocationStatus::Revoked(detail) => Verdict {
                valid: false,
                reasons: vec![format!("certificate is revoked: {}", detail)],
            },
            RevocationStatus::Unknown(_) => Verdict {
                valid: false,
                reasons: vec!["revocation status could not be confirmed".to_string()],
            },
        }
    }
}

/// Folds a raw oracle outcome into a status.
///
/// A revoked answer wins outright, confirmed or not. Any error makes the
/// status `Unknown` with the error as the reason, even when the lookup
/// claims it completed; an unconfirmed answer without an error gets the
/// generic wording. Only a confirmed, error-free clean answer is `Good`.
fn reconcile(revoked: Option<String>, confirmed: bool, error: Option<String>) -> RevocationStatus {
    if let Some(detail) = revoked {
        return RevocationStatus::Revoked(detail);
    }
    if let Some(text) = error {
        return RevocationStatus::Unknown(text);
    }
    if !confirmed {
        return RevocationStatus::Unknown("could not verify revocation status".to_string());
    }
    RevocationStatus::Good
}

/// OCSP and CRL endpoints advertised by a certificate.
#[derive(Debug, Default, PartialEq, Eq)]
struct RevocationEndpoints {
    ocsp: Vec<String>,
    crl: Vec<String>,
    ca_issuers: Vec<String>,
}

/// The revocation oracle.
pub struct RevocationChecker {
    http_timeout: Duration,
}

impl RevocationChecker {
    pub fn new() -> RevocationChecker {
        RevocationChecker {
            http_timeout: Duration::from_secs(HTTP_TIMEOUT),
        }
    }

    /// Determines the leaf's revocation status.
    ///
    /// Never fails: anything that prevents a confirmed answer comes back as
    /// `Unknown`. A leaf advertising no OCSP responder and no distribution
    /// point has nothing that could mark it revoked, which counts as a
    /// confirmed clean answer.
    pub fn check(&self, cert: &PeerCertificate) -> RevocationStatus {
        let der = match cert.leaf.to_der() {
            Ok(der) => der,
            Err(e) => {
                return reconcile(
                    None,
                    false,
                    Some(format!("failed to encode leaf certificate: {}", e)),
                )
            }
        };
        let endpoints = match revocation_endpoints(&der) {
            Ok(endpoints) => endpoints,
            Err(reason) => return reconcile(None, false, Some(reason)),
        };

        if endpoints.ocsp.is_empty() && endpoints.crl.is_empty() {
            debug!("leaf advertises no OCSP responder and no CRL distribution point");
            return reconcile(None, true, None);
        }

        let http = match Client::builder().timeout(self.http_timeout).build() {
            Ok(http) => http,
            Err(e) => {
                return reconcile(None, false, Some(format!("failed to build HTTP client: {}", e)))
            }
        };

        let mut failures: Vec<String> = Vec::new();

        if !endpoints.ocsp.is_empty() {
            match issuer_certificate(cert, &endpoints.ca_issuers, &http) {
                Ok(issuer) => {
                    for url in &endpoints.ocsp {
                        debug!("querying OCSP responder {}", url);
                        match query_ocsp(&http, url, &cert.leaf, &issuer) {
                            Ok(RevocationStatus::Revoked(detail)) => {
                                return reconcile(Some(detail), true, None)
                            }
                            Ok(RevocationStatus::Good) => return reconcile(None, true, None),
                            Ok(RevocationStatus::Unknown(reason)) | Err(reason) => {
                                failures.push(reason)
                            }
                        }
                    }
                }
                Err(reason) => failures.push(format!("cannot query OCSP: {}", reason)),
            }
        }

        for url in &endpoints.crl {
            debug!("checking CRL distribution point {}", url);
            match query_crl(&http, url, &cert.leaf) {
                Ok(RevocationStatus::Revoked(detail)) => return reconcile(Some(detail), true, None),
                Ok(RevocationStatus::Good) => return reconcile(None, true, None),
                Ok(RevocationStatus::Unknown(reason)) | Err(reason) => failures.push(reason),
            }
        }

        let error = if failures.is_empty() {
            None
        } else {
            Some(failures.join("; "))
        };
        reconcile(None, false, error)
    }
}

impl Default for RevocationChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Pulls OCSP responder, caIssuers and CRL distribution point URLs out of
/// the leaf's extensions.
fn revocation_endpoints(der: &[u8]) -> Result<RevocationEndpoints, String> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| format!("failed to parse leaf certificate: {:?}", e))?;

    let mut endpoints = RevocationEndpoints::default();
    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::AuthorityInfoAccess(aia) => {
                for desc in &aia.accessdescs {
                    if let GeneralName::URI(uri) = &desc.access_location {
                        let method = desc.access_method.to_string();
                        if method == OID_AD_OCSP {
                            endpoints.ocsp.push(uri.to_string());
                        } else if method == OID_AD_CA_ISSUERS {
                            endpoints.ca_issuers.push(uri.to_string());
                        }
                    }
                }
            }
            ParsedExtension::CRLDistributionPoints(crl_dp) => {
                for point in &crl_dp.points {
                    if let Some(DistributionPointName::FullName(names)) = &point.distribution_point
                    {
                        for name in names {
                            if let GeneralName::URI(uri) = name {
                                if uri.starts_with("http") {
                                    endpoints.crl.push(uri.to_string());
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(endpoints)
}

/// Finds the certificate that issued the leaf: first a chain entry whose
/// subject matches the leaf's issuer, then a download from the leaf's
/// caIssuers URLs.
fn issuer_certificate(
    cert: &PeerCertificate,
    ca_issuers: &[String],
    http: &Client,
) -> Result<X509, String> {
    if let Some(issuer) = issuer_from_chain(cert) {
        return Ok(issuer);
    }
    fetch_issuer(http, ca_issuers)
}

fn issuer_from_chain(cert: &PeerCertificate) -> Option<X509> {
    let leaf_issuer = format_name(cert.leaf.issuer_name());
    cert.chain
        .iter()
        .find(|candidate| format_name(candidate.subject_name()) == leaf_issuer)
        .map(|candidate| candidate.to_owned())
}

fn fetch_issuer(http: &Client, urls: &[String]) -> Result<X509, String> {
    let mut last_error =
        String::from("the peer sent no issuer and the leaf names no caIssuers URL");
    for url in urls {
        debug!("fetching issuer certificate from {}", url);
        match http.get(url).send() {
            Ok(response) if response.status().is_success() => match response.bytes() {
                Ok(body) => {
                    if let Ok(cert) = X509::from_der(&body) {
                        return Ok(cert);
                    }
                    if let Ok(cert) = X509::from_pem(&body) {
                        return Ok(cert);
                    }
                    last_error = format!("issuer from {} is neither DER nor PEM", url);
                }
                Err(e) => last_error = format!("failed to read issuer from {}: {}", url, e),
            },
            Ok(response) => {
                last_error =
                    format!("issuer fetch from {} returned HTTP {}", url, response.status())
            }
            Err(e) => last_error = format!("failed to fetch issuer from {}: {}", url, e),
        }
    }
    Err(last_error)
}

/// Asks one OCSP responder about the leaf. `Err` carries the reason the
/// responder gave no usable answer; the caller decides what that means.
fn query_ocsp(
    http: &Client,
    url: &str,
    leaf: &X509,
    issuer: &X509,
) -> Result<RevocationStatus, String> {
    let build_id = || {
        OcspCertId::from_cert(MessageDigest::sha1(), leaf, issuer)
            .map_err(|e| format!("failed to build OCSP certificate id: {}", e))
    };
    // add_id consumes its id, so the lookup needs a second one.
    let request_id = build_id()?;
    let lookup_id = build_id()?;

    let mut request =
        OcspRequest::new().map_err(|e| format!("failed to build OCSP request: {}", e))?;
    request
        .add_id(request_id)
        .map_err(|e| format!("failed to build OCSP request: {}", e))?;
    let body = request
        .to_der()
        .map_err(|e| format!("failed to encode OCSP request: {}", e))?;

    let response = http
        .post(url)
        .header("Content-Type", "application/ocsp-request")
        .body(body)
        .send()
        .map_err(|e| format!("OCSP request to {} failed: {}", url, e))?;
    if !response.status().is_success() {
        return Err(format!(
            "OCSP responder {} returned HTTP {}",
            url,
            response.status()
        ));
    }
    let raw = response
        .bytes()
        .map_err(|e| format!("failed to read OCSP response from {}: {}", url, e))?;

    interpret_ocsp_response(&raw, &lookup_id, url)
}

/// Decodes a DER OCSP response and maps it onto a revocation status.
fn interpret_ocsp_response(
    raw: &[u8],
    cert_id: &OcspCertIdRef,
    url: &str,
) -> Result<RevocationStatus, String> {
    let response = OcspResponse::from_der(raw)
        .map_err(|e| format!("malformed OCSP response from {}: {}", url, e))?;
    let status = response.status();
    if status != OcspResponseStatus::SUCCESSFUL {
        return Err(format!(
            "OCSP responder {} answered {}",
            url,
            responder_status_name(status)
        ));
    }

    let basic = response
        .basic()
        .map_err(|e| format!("OCSP response from {} has no basic payload: {}", url, e))?;
    let single = basic
        .find_status(cert_id)
        .ok_or_else(|| format!("OCSP response from {} does not cover the certificate", url))?;
    if let Err(e) = single.check_validity(OCSP_LEEWAY_SECS, None) {
        return Err(format!("stale OCSP response from {}: {}", url, e));
    }

    if single.status == OcspCertStatus::REVOKED {
        Ok(RevocationStatus::Revoked(revocation_detail(&single, url)))
    } else if single.status == OcspCertStatus::GOOD {
        Ok(RevocationStatus::Good)
    } else {
        Err(format!(
            "OCSP responder {} does not know the certificate",
            url
        ))
    }
}

fn revocation_detail(status: &OcspStatus<'_>, url: &str) -> String {
    let reason = revocation_reason_name(status.reason);
    match status.revocation_time {
        Some(time) => format!(
            "OCSP responder {} reports it revoked ({}) since {}",
            url, reason, time
        ),
        None => format!("OCSP responder {} reports it revoked ({})", url, reason),
    }
}

/// RFC 6960 names for the responder status codes.
fn responder_status_name(status: OcspResponseStatus) -> &'static str {
    if status == OcspResponseStatus::SUCCESSFUL {
        "successful"
    } else if status == OcspResponseStatus::MALFORMED_REQUEST {
        "malformedRequest"
    } else if status == OcspResponseStatus::INTERNAL_ERROR {
        "internalError"
    } else if status == OcspResponseStatus::TRY_LATER {
        "tryLater"
    } else if status == OcspResponseStatus::SIG_REQUIRED {
        "sigRequired"
    } else if status == OcspResponseStatus::UNAUTHORIZED {
        "unauthorized"
    } else {
        "unrecognized"
    }
}

fn revocation_reason_name(reason: OcspRevokedStatus) -> &'static str {
    if reason == OcspRevokedStatus::KEY_COMPROMISE {
        "key compromise"
    } else if reason == OcspRevokedStatus::CA_COMPROMISE {
        "CA compromise"
    } else if reason == OcspRevokedStatus::AFFILIATION_CHANGED {
        "affiliation changed"
    } else if reason == OcspRevokedStatus::STATUS_SUPERSEDED {
        "superseded"
    } else if reason == OcspRevokedStatus::STATUS_CESSATION_OF_OPERATION {
        "cessation of operation"
    } else if reason == OcspRevokedStatus::STATUS_CERTIFICATE_HOLD {
        "certificate hold"
    } else if reason == OcspRevokedStatus::REMOVE_FROM_CRL {
        "remove from CRL"
    } else {
        "unspecified"
    }
}

/// Downloads one CRL and looks the leaf's serial number up in it.
fn query_crl(http: &Client, url: &str, leaf: &X509) -> Result<RevocationStatus, String> {
    let response = http
        .get(url)
        .send()
        .map_err(|e| format!("CRL download from {} failed: {}", url, e))?;
    if !response.status().is_success() {
        return Err(format!(
            "CRL endpoint {} returned HTTP {}",
            url,
            response.status()
        ));
    }
    let raw = response
        .bytes()
        .map_err(|e| format!("failed to read CRL from {}: {}", url, e))?;

    let crl = match X509Crl::from_der(&raw) {
        Ok(crl) => crl,
        Err(_) => X509Crl::from_pem(&raw)
            .map_err(|e| format!("CRL from {} is neither DER nor PEM: {}", url, e))?,
    };

    match crl.get_by_serial(leaf.serial_number()) {
        CrlStatus::Revoked(entry) => Ok(RevocationStatus::Revoked(format!(
            "listed in CRL {} since {}",
            url,
            entry.revocation_date()
        ))),
        // An entry held and later released counts as not revoked.
        CrlStatus::RemoveFromCrl(_) => Ok(RevocationStatus::Good),
        CrlStatus::NotRevoked => Ok(RevocationStatus::Good),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::nid::Nid;
    use openssl::pkey::{PKey, Private};
    use openssl::rsa::Rsa;
    use openssl::x509::{X509Extension, X509Name, X509NameBuilder, X509NameRef};

    fn test_key() -> PKey<Private> {
        PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
    }

    fn test_name(cn: &str) -> X509Name {
        let mut builder = X509NameBuilder::new().unwrap();
        builder.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
        builder.build()
    }

    #[allow(deprecated)]
    fn build_cert(
        subject: &X509NameRef,
        issuer: &X509NameRef,
        key: &PKey<Private>,
        signer: &PKey<Private>,
        serial: u32,
        extensions: &[(Nid, &str)],
    ) -> X509 {
        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(subject).unwrap();
        builder.set_issuer_name(issuer).unwrap();
        builder.set_pubkey(key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(30).unwrap())
            .unwrap();
        for (nid, value) in extensions {
            let ext = X509Extension::new_nid(None, None, *nid, value).unwrap();
            builder.append_extension(ext).unwrap();
        }
        builder.sign(signer, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    fn peer_cert(leaf: X509, chain: Vec<X509>) -> PeerCertificate {
        PeerCertificate::from_x509(leaf, chain).unwrap()
    }

    #[test]
    fn reconcile_revoked_wins_regardless_of_confirmation() {
        let status = reconcile(Some("listed in CRL".to_string()), false, None);
        assert_eq!(status, RevocationStatus::Revoked("listed in CRL".to_string()));

        let status = reconcile(
            Some("listed in CRL".to_string()),
            true,
            Some("later failure".to_string()),
        );
        assert!(matches!(status, RevocationStatus::Revoked(_)));
    }

    #[test]
    fn reconcile_unconfirmed_without_error_is_generic_unknown() {
        let status = reconcile(None, false, None);
        assert_eq!(
            status,
            RevocationStatus::Unknown("could not verify revocation status".to_string())
        );
    }

    #[test]
    fn reconcile_error_text_takes_precedence() {
        let status = reconcile(None, false, Some("responder unreachable".to_string()));
        assert_eq!(
            status,
            RevocationStatus::Unknown("responder unreachable".to_string())
        );
    }

    #[test]
    fn reconcile_error_overrides_a_confirmed_lookup() {
        let status = reconcile(None, true, Some("stale response".to_string()));
        assert_eq!(
            status,
            RevocationStatus::Unknown("stale response".to_string())
        );
    }

    #[test]
    fn reconcile_confirmed_clean_is_good() {
        assert_eq!(reconcile(None, true, None), RevocationStatus::Good);
    }

    #[test]
    fn verdict_good_is_valid() {
        let verdict = Verdict::derive(&RevocationStatus::Good);
        assert!(verdict.valid);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn verdict_revoked_is_invalid_with_reason() {
        let verdict = Verdict::derive(&RevocationStatus::Revoked("listed in CRL".to_string()));
        assert!(!verdict.valid);
        assert_eq!(verdict.reasons.len(), 1);
        assert!(verdict.reasons[0].contains("revoked"));
    }

    #[test]
    fn verdict_unknown_is_invalid() {
        let verdict = Verdict::derive(&RevocationStatus::Unknown("timeout".to_string()));
        assert!(!verdict.valid);
        assert_eq!(
            verdict.reasons,
            vec!["revocation status could not be confirmed".to_string()]
        );
    }

    #[test]
    fn endpoints_are_extracted_from_extensions() {
        let key = test_key();
        let name = test_name("endpoints.test");
        let cert = build_cert(
            &name,
            &name,
            &key,
            &key,
            1,
            &[
                (
                    Nid::INFO_ACCESS,
                    "OCSP;URI:http://ocsp.example.test,caIssuers;URI:http://ca.example.test/ca.der",
                ),
                (
                    Nid::CRL_DISTRIBUTION_POINTS,
                    "URI:http://crl.example.test/test.crl",
                ),
            ],
        );

        let endpoints = revocation_endpoints(&cert.to_der().unwrap()).unwrap();
        assert_eq!(endpoints.ocsp, vec!["http://ocsp.example.test"]);
        assert_eq!(endpoints.ca_issuers, vec!["http://ca.example.test/ca.der"]);
        assert_eq!(endpoints.crl, vec!["http://crl.example.test/test.crl"]);
    }

    #[test]
    fn cert_without_endpoints_is_confirmed_clean() {
        let key = test_key();
        let name = test_name("plain.test");
        let cert = peer_cert(build_cert(&name, &name, &key, &key, 2, &[]), Vec::new());

        let status = RevocationChecker::new().check(&cert);
        assert_eq!(status, RevocationStatus::Good);
    }

    #[test]
    fn issuer_is_found_in_peer_chain() {
        let ca_key = test_key();
        let ca_name = test_name("Test Intermediate CA");
        let ca = build_cert(&ca_name, &ca_name, &ca_key, &ca_key, 3, &[]);

        let leaf_key = test_key();
        let leaf_name = test_name("leaf.test");
        let leaf = build_cert(&leaf_name, &ca_name, &leaf_key, &ca_key, 4, &[]);

        let cert = peer_cert(leaf, vec![ca]);
        let issuer = issuer_from_chain(&cert).unwrap();
        assert_eq!(
            format_name(issuer.subject_name()),
            "CN=Test Intermediate CA"
        );
    }

    #[test]
    fn missing_issuer_yields_none_from_chain() {
        let key = test_key();
        let ca_name = test_name("Absent CA");
        let leaf_name = test_name("orphan.test");
        let leaf = build_cert(&leaf_name, &ca_name, &key, &key, 5, &[]);

        let cert = peer_cert(leaf, Vec::new());
        assert!(issuer_from_chain(&cert).is_none());
    }

    #[test]
    fn unsuccessful_responder_status_is_an_error() {
        let key = test_key();
        let name = test_name("ocsp.test");
        let cert = build_cert(&name, &name, &key, &key, 6, &[]);
        let id = OcspCertId::from_cert(MessageDigest::sha1(), &cert, &cert).unwrap();

        let raw = OcspResponse::create(OcspResponseStatus::TRY_LATER, None)
            .unwrap()
            .to_der()
            .unwrap();
        let err = interpret_ocsp_response(&raw, &id, "http://ocsp.example.test").unwrap_err();
        assert!(err.contains("tryLater"), "unexpected reason: {}", err);
    }

    #[test]
    fn responder_status_names_follow_rfc6960() {
        assert_eq!(
            responder_status_name(OcspResponseStatus::MALFORMED_REQUEST),
            "malformedRequest"
        );
        assert_eq!(
            responder_status_name(OcspResponseStatus::UNAUTHORIZED),
            "unauthorized"
        );
    }

    #[test]
    fn revocation_reasons_have_readable_names() {
        assert_eq!(
            revocation_reason_name(OcspRevokedStatus::KEY_COMPROMISE),
            "key compromise"
        );
        assert_eq!(
            revocation_reason_name(OcspRevokedStatus::STATUS_SUPERSEDED),
            "superseded"
        );
        assert_eq!(
            revocation_reason_name(OcspRevokedStatus::STATUS_CERTIFICATE_HOLD),
            "certificate hold"
        );
        assert_eq!(
            revocation_reason_name(OcspRevokedStatus::NO_STATUS),
            "unspecified"
        );
    }
}
