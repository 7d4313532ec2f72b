//! minipki binary entrypoint.
//!
//! `generate` writes a fresh CA, server and client certificate set; `serve`
//! and `connect` run the mutual-TLS smoke test against a generated set.

use std::io;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use minipki::bootstrap::{BootstrapConfig, bootstrap};
use minipki::cert::Certificate;
use minipki::key::{DEFAULT_RSA_BITS, KeyPair};
use minipki::tls::{self, ClientAuth};
use minipki::{encoder, persist};

/// Private PKI for mutual TLS.
#[derive(Parser, Debug)]
#[command(name = "minipki")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate ca, server and client certificates and keys.
    Generate {
        /// Extra host name the server certificate is valid for.
        #[arg(short, long, env = "MINIPKI_DOMAIN", default_value = "localhost")]
        domain: String,

        /// Directory the six PEM files are written to.
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// RSA modulus size for every key.
        #[arg(long, default_value_t = DEFAULT_RSA_BITS)]
        key_bits: usize,
    },

    /// Accept mutual-TLS connections and echo one line per connection.
    Serve {
        #[arg(short, long, default_value = "127.0.0.1:8443")]
        addr: String,

        /// Directory holding ca.pem, server.pem and server.key.
        #[arg(short, long, default_value = ".")]
        certs: PathBuf,

        /// Accept clients that present no certificate.
        #[arg(long)]
        optional_client_auth: bool,
    },

    /// Dial a server, send `hello` and print the reply.
    Connect {
        #[arg(short, long, default_value = "127.0.0.1:8443")]
        addr: String,

        /// Name the server certificate is checked against.
        #[arg(short, long, default_value = "localhost")]
        server_name: String,

        /// Directory holding ca.pem, client.pem and client.key.
        #[arg(short, long, default_value = ".")]
        certs: PathBuf,

        /// Do not present the client certificate.
        #[arg(long)]
        no_client_cert: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate {
            domain,
            out_dir,
            key_bits,
        } => {
            let config = BootstrapConfig::builder()
                .server_host(domain)
                .key_bits(key_bits)
                .build();
            let bundle = bootstrap(config).context("bootstrap failed")?;
            let written = persist::write_bundle(&out_dir, &bundle)?;
            info!(count = written.len(), dir = %out_dir.display(), "certificates generated");
        }
        Commands::Serve {
            addr,
            certs,
            optional_client_auth,
        } => {
            let ca = load_certificate(&certs, "ca.pem")?;
            let cert = load_certificate(&certs, "server.pem")?;
            let key = load_key(&certs, "server.key")?;
            let client_auth = if optional_client_auth {
                ClientAuth::Optional
            } else {
                ClientAuth::Required
            };
            let config = tls::server_config(&ca, &cert, &key, client_auth)?;

            let listener =
                TcpListener::bind(&addr).with_context(|| format!("failed to bind {addr}"))?;
            info!(%addr, ?client_auth, "listening");
            loop {
                // a failed handshake only ends that connection
                if let Err(e) = tls::serve_once(&listener, config.clone()) {
                    error!(error = %e, "connection failed");
                }
            }
        }
        Commands::Connect {
            addr,
            server_name,
            certs,
            no_client_cert,
        } => {
            let ca = load_certificate(&certs, "ca.pem")?;
            let config = if no_client_cert {
                tls::client_config(&ca, None)?
            } else {
                let cert = load_certificate(&certs, "client.pem")?;
                let key = load_key(&certs, "client.key")?;
                tls::client_config(&ca, Some((&cert, &key)))?
            };
            let reply = tls::exchange_line(addr.as_str(), &server_name, config, "hello\n")?;
            print!("{reply}");
        }
    }

    Ok(())
}

fn load_certificate(dir: &Path, name: &str) -> anyhow::Result<Certificate> {
    let armored = persist::read_artifact(dir, name)?;
    encoder::decode_certificate(armored).with_context(|| format!("failed to load {name}"))
}

fn load_key(dir: &Path, name: &str) -> anyhow::Result<KeyPair> {
    let armored = persist::read_artifact(dir, name)?;
    encoder::decode_key(armored).with_context(|| format!("failed to load {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_generate_defaults() {
        let cli = Cli::parse_from(["minipki", "generate"]);
        match cli.command {
            Commands::Generate {
                domain,
                out_dir,
                key_bits,
            } => {
                assert_eq!(domain, "localhost");
                assert_eq!(out_dir, PathBuf::from("."));
                assert_eq!(key_bits, DEFAULT_RSA_BITS);
            }
            _ => panic!("expected generate command"),
        }
    }

    #[test]
    fn cli_parses_generate_domain() {
        let cli = Cli::parse_from(["minipki", "generate", "--domain", "example.test"]);
        assert!(matches!(
            cli.command,
            Commands::Generate { ref domain, .. } if domain == "example.test"
        ));
    }

    #[test]
    fn cli_parses_connect_flags() {
        let cli = Cli::parse_from([
            "minipki",
            "connect",
            "--addr",
            "127.0.0.1:9000",
            "--no-client-cert",
        ]);
        match cli.command {
            Commands::Connect {
                addr,
                server_name,
                no_client_cert,
                ..
            } => {
                assert_eq!(addr, "127.0.0.1:9000");
                assert_eq!(server_name, "localhost");
                assert!(no_client_cert);
            }
            _ => panic!("expected connect command"),
        }
    }

    #[test]
    fn run_generate_rejects_weak_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "minipki",
            "generate",
            "--key-bits",
            "1024",
            "--out-dir",
            dir.path().to_str().unwrap(),
        ]);
        assert!(run(cli).is_err());
        assert!(!dir.path().join("ca.pem").exists());
    }
}
