use std::process;

use clap::Parser;
use colored::Colorize;
use log::{error, warn};

use certcheck::report;
use certcheck::{
    fetch_certificate, probe_connectivity, resolve, Connectivity, RevocationChecker,
    RevocationStatus, Verdict,
};

/// Inspect a server's TLS certificate and its revocation status.
#[derive(Parser, Debug)]
#[command(name = "certcheck", version, about, long_about = None)]
struct Cli {
    /// Server to inspect: hostname, IP, host:port or URL
    #[arg(value_name = "SERVER")]
    server: String,

    /// Hostname to present via SNI instead of the parsed one
    #[arg(value_name = "SNI")]
    sni: Option<String>,

    /// SNI override as a flag, equivalent to the second positional
    #[arg(
        short = 's',
        long = "sni",
        value_name = "HOSTNAME",
        conflicts_with = "sni"
    )]
    sni_flag: Option<String>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Usage errors exit 1; --help and --version are not failures.
            process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    init_logger();

    let sni_override = cli.sni_flag.as_deref().or(cli.sni.as_deref());
    process::exit(run(&cli.server, sni_override));
}

/// Drives the pipeline and decides what is fatal. Returns the exit code.
fn run(server: &str, sni_override: Option<&str>) -> i32 {
    let endpoint = match resolve(server, sni_override) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    report::print_preamble(&endpoint);

    match probe_connectivity(&endpoint) {
        Connectivity::Ok => report::print_connected(),
        Connectivity::Failed(reason) => {
            warn!("Failed to verify cert by connecting to the server: {}", reason);
        }
    }
    println!();

    let cert = match fetch_certificate(&endpoint) {
        Ok(cert) => cert,
        Err(e) => {
            error!("Failed to load the cert by connecting to the server: {}", e);
            return 1;
        }
    };
    report::print_certificate(&cert);
    println!();

    let status = RevocationChecker::new().check(&cert);
    if let RevocationStatus::Unknown(reason) = &status {
        warn!("Failed to verify certificate revocation status: {}", reason);
    }

    let verdict = Verdict::derive(&status);
    report::print_verdict(&verdict);
    if verdict.valid {
        0
    } else {
        1
    }
}

/// Warnings and errors share stdout with the report so the documented line
/// order holds. The crate logs at warn by default; RUST_LOG overrides.
fn init_logger() {
    let env = env_logger::Env::default().default_filter_or("certcheck=warn");
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Stdout)
        .format(|buf, record| {
            use std::io::Write;

            let message = record.args().to_string();
            let message = match record.level() {
                log::Level::Error => message.red(),
                log::Level::Warn => message.yellow(),
                _ => message.normal(),
            };
            writeln!(buf, "{}", message)
        })
        .init();
}
