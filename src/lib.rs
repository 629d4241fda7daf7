//! One-shot TLS certificate inspection.
//!
//! `certcheck` resolves a target, probes it twice (a strictly verified
//! handshake for connectivity health, a permissive one to obtain the leaf
//! certificate even when verification would fail), determines the leaf's
//! revocation status via OCSP and CRL, and reports a colored summary with
//! a pass/fail exit code.
//!
//! The pipeline is strictly sequential and stateless: resolver, prober,
//! revocation checker, renderer.

pub mod endpoint;
pub mod error;
pub mod probe;
pub mod report;
pub mod revocation;

pub use endpoint::{resolve, Endpoint};
pub use error::CheckError;
pub use probe::{fetch_certificate, probe_connectivity, Connectivity, PeerCertificate};
pub use revocation::{RevocationChecker, RevocationStatus, Verdict};
