//! Console rendering of the inspection results.
//!
//! The renderer owns every report line on stdout; warnings travel through
//! the logger, which also writes to stdout so the documented line order
//! survives piping.

use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::endpoint::Endpoint;
use crate::probe::PeerCertificate;
use crate::revocation::Verdict;

/// Label column width. Continuation lines of multi-valued fields are
/// indented to align under it.
const FIELD_PAD: usize = 12;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

pub fn print_preamble(endpoint: &Endpoint) {
    println!(
        "Connecting to {} as {}...",
        endpoint.dial_target, endpoint.sni_hostname
    );
}

pub fn print_connected() {
    println!("{}", "Successfully connected to server".green());
}

/// Prints the certificate summary block.
pub fn print_certificate(cert: &PeerCertificate) {
    let now = Utc::now();
    println!("{}", format_field("Issued by:", &cert.issuer));
    println!("{}", format_field("Issued:", &format_date(&cert.not_before, &now)));
    println!("{}", format_field("Expires:", &format_date(&cert.not_after, &now)));
    println!("{}", format_field("Subject:", &cert.subject));
    println!("{}", format_list("DNS Names:", &cert.dns_names));
}

/// Prints the final verdict line, green when valid, red with the collected
/// reasons otherwise.
pub fn print_verdict(verdict: &Verdict) {
    if verdict.valid {
        println!("{}", "Certificate seems to be valid".green());
    } else if verdict.reasons.is_empty() {
        println!("{}", "Certificate is invalid".red());
    } else {
        let line = format!("Certificate is invalid ({})", verdict.reasons.join("; "));
        println!("{}", line.red());
    }
}

fn format_date(date: &DateTime<Utc>, now: &DateTime<Utc>) -> String {
    format!("{} ({})", date, humanize_time(date, now))
}

/// Renders a scalar field. A value containing newlines continues under the
/// label gutter.
fn format_field(label: &str, value: &str) -> String {
    format!(
        "{:<pad$}{}",
        label,
        gutter_join(value.split('\n')),
        pad = FIELD_PAD
    )
}

/// Renders a list field: first value on the label line, every further value
/// on its own line indented to the gutter. An empty list renders the label
/// with an empty value.
fn format_list(label: &str, values: &[String]) -> String {
    format!(
        "{:<pad$}{}",
        label,
        gutter_join(values.iter().map(String::as_str)),
        pad = FIELD_PAD
    )
}

fn gutter_join<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            out.push('\n');
            out.push_str(&" ".repeat(FIELD_PAD));
        }
        out.push_str(value);
    }
    out
}

/// Relative-time annotation, "3 weeks ago" / "2 months from now" style.
fn humanize_time(date: &DateTime<Utc>, now: &DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(*date).num_seconds();
    if delta.abs() < 1 {
        return "now".to_string();
    }
    let (seconds, suffix) = if delta < 0 {
        (-delta, "from now")
    } else {
        (delta, "ago")
    };
    format!("{} {}", relative_phrase(seconds), suffix)
}

fn relative_phrase(seconds: i64) -> String {
    if seconds < 2 {
        "1 second".to_string()
    } else if seconds < MINUTE {
        format!("{} seconds", seconds)
    } else if seconds < 2 * MINUTE {
        "1 minute".to_string()
    } else if seconds < HOUR {
        format!("{} minutes", seconds / MINUTE)
    } else if seconds < 2 * HOUR {
        "1 hour".to_string()
    } else if seconds < DAY {
        format!("{} hours", seconds / HOUR)
    } else if seconds < 2 * DAY {
        "1 day".to_string()
    } else if seconds < WEEK {
        format!("{} days", seconds / DAY)
    } else if seconds < 2 * WEEK {
        "1 week".to_string()
    } else if seconds < MONTH {
        format!("{} weeks", seconds / WEEK)
    } else if seconds < 2 * MONTH {
        "1 month".to_string()
    } else if seconds < YEAR {
        format!("{} months", seconds / MONTH)
    } else if seconds < 2 * YEAR {
        "1 year".to_string()
    } else {
        format!("{} years", seconds / YEAR)
    }
}
