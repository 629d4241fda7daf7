//! TLS probes against a resolved endpoint.
//!
//! Two independent dial-and-handshake attempts, each on its own TCP
//! connection: a strictly verified handshake that measures connectivity
//! health, and a verification-disabled handshake that extracts the leaf
//! certificate even from peers the platform trust store rejects.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use chrono::{DateTime, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::ssl::{Ssl, SslConnector, SslContext, SslMethod, SslVerifyMode};
use openssl::x509::{X509, X509NameRef};

use crate::endpoint::Endpoint;
use crate::error::CheckError;

/// TCP connect and read timeout for both probes, in seconds.
const TIMEOUT: u64 = 30;

/// Outcome of the strict probe. A failure here is a warning, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connectivity {
    /// Handshake with full chain and hostname verification succeeded.
    Ok,
    /// Dial or verified handshake failed; carries the underlying error text.
    Failed(String),
}

/// Leaf certificate summary extracted over the permissive handshake.
///
/// The raw leaf and the peer-presented chain are retained so the revocation
/// checker can build OCSP requests without re-handshaking.
#[derive(Debug)]
pub struct PeerCertificate {
    /// Subject distinguished name as `KEY=value, ...`.
    pub subject: String,
    /// Issuer distinguished name as `KEY=value, ...`.
    pub issuer: String,
    /// Start of the validity window.
    pub not_before: DateTime<Utc>,
    /// End of the validity window.
    pub not_after: DateTime<Utc>,
    /// DNS names from the subject alternative name extension.
    pub dns_names: Vec<String>,
    /// The leaf itself.
    pub leaf: X509,
    /// Chain as presented by the peer, leaf first. May be empty.
    pub chain: Vec<X509>,
}

impl PeerCertificate {
    /// Builds the summary from a leaf and the chain the peer presented.
    pub fn from_x509(leaf: X509, chain: Vec<X509>) -> Result<PeerCertificate, CheckError> {
        let subject = format_name(leaf.subject_name());
        let issuer = format_name(leaf.issuer_name());
        let not_before = asn1_to_utc(leaf.not_before())?;
        let not_after = asn1_to_utc(leaf.not_after())?;
        let dns_names = leaf
            .subject_alt_names()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| name.dnsname().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(PeerCertificate {
            subject,
            issuer,
            not_before,
            not_after,
            dns_names,
            leaf,
            chain,
        })
    }
}

/// Dials the endpoint and handshakes with platform trust roots, full chain
/// verification and hostname verification against the SNI name.
pub fn probe_connectivity(endpoint: &Endpoint) -> Connectivity {
    match strict_handshake(endpoint) {
        Ok(()) => Connectivity::Ok,
        Err(e) => Connectivity::Failed(e.to_string()),
    }
}

fn strict_handshake(endpoint: &Endpoint) -> Result<(), CheckError> {
    let connector = SslConnector::builder(SslMethod::tls())?.build();
    let tcp_stream = tcp_connect(&endpoint.dial_target)?;
    let mut stream = connector.connect(&endpoint.sni_hostname, tcp_stream)?;
    let _ = stream.shutdown();
    Ok(())
}

/// Dials the endpoint again and fetches the leaf certificate with
/// verification disabled. SNI is still sent so name-based virtual hosts
/// return the right certificate. Any failure here is fatal to the run.
pub fn fetch_certificate(endpoint: &Endpoint) -> Result<PeerCertificate, CheckError> {
    let mut context = SslContext::builder(SslMethod::tls())?;
    context.set_verify(SslVerifyMode::NONE);
    let context = context.build();

    let mut ssl = Ssl::new(&context)?;
    ssl.set_hostname(&endpoint.sni_hostname)?;

    let tcp_stream = tcp_connect(&endpoint.dial_target)?;
    let mut stream = ssl.connect(tcp_stream)?;

    let leaf = stream
        .ssl()
        .peer_certificate()
        .ok_or_else(|| CheckError::CertificateError {
            reason: "no peer certificate presented".to_string(),
        })?;
    let chain = stream
        .ssl()
        .peer_cert_chain()
        .map(|stack| stack.iter().map(|c| c.to_owned()).collect())
        .unwrap_or_default();
    let _ = stream.shutdown();

    PeerCertificate::from_x509(leaf, chain)
}

fn tcp_connect(dial_target: &str) -> Result<TcpStream, CheckError> {
    let connection_error = |source: io::Error| CheckError::ConnectionFailed {
        address: dial_target.to_string(),
        source,
    };

    let mut addrs = dial_target.to_socket_addrs().map_err(connection_error)?;
    let addr = addrs.next().ok_or_else(|| {
        connection_error(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no socket addresses for target",
        ))
    })?;

    let stream =
        TcpStream::connect_timeout(&addr, Duration::from_secs(TIMEOUT)).map_err(connection_error)?;
    stream
        .set_read_timeout(Some(Duration::from_secs(TIMEOUT)))
        .map_err(connection_error)?;
    Ok(stream)
}

/// Renders an X.509 name as `KEY=value, ...` in certificate order.
pub(crate) fn format_name(name: &X509NameRef) -> String {
    let mut parts = Vec::new();
    for entry in name.entries() {
        let key = entry.object().nid().short_name().unwrap_or("UNDEF");
        let value = match entry.data().as_utf8() {
            Ok(text) => text.to_string(),
            Err(_) => String::from_utf8_lossy(entry.data().as_slice()).into_owned(),
        };
        parts.push(format!("{}={}", key, value));
    }
    parts.join(", ")
}

/// Converts an ASN.1 time to UTC by diffing against the UNIX epoch.
fn asn1_to_utc(time: &Asn1TimeRef) -> Result<DateTime<Utc>, CheckError> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    let timestamp = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(timestamp, 0).ok_or_else(|| CheckError::CertificateError {
        reason: "certificate date out of range".to_string(),
    })
}
