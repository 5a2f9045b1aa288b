use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use credmarshal::{
    config::Config,
    core::credential::{
        BinaryBlobCredential, CertificateCredential, CredentialIdentifier, UsernameTargetCredential,
    },
};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "credmarshal")]
#[command(about = "Marshal and unmarshal credential identifiers")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "CREDMARSHAL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Marshal a certificate reference given its hex encoded SHA-1 hash
    Cert { thumbprint: String },
    /// Marshal a user name target
    User { user_name: String },
    /// Marshal a hex encoded binary blob
    Blob { hex: String },
    /// Decode a marshaled token
    Unmarshal { token: String },
    /// Exit with status 1 unless the token is a marshaled credential
    Check { token: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level);

    let config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("unable to read {}", path.display()))?;
            Config::from_json(&json)?
        }
        None => Config::default(),
    };
    let marshaler = config.marshaler();

    let credential: CredentialIdentifier = match cli.command {
        Command::Cert { thumbprint } => thumbprint
            .parse::<CertificateCredential>()
            .context("invalid certificate thumbprint")?
            .into(),
        Command::User { user_name } => UsernameTargetCredential::new(user_name).into(),
        Command::Blob { hex } => BinaryBlobCredential::new(
            hex::decode(hex.trim()).context("blob is not valid hex")?,
        )
        .into(),
        Command::Unmarshal { token } => {
            let credential = marshaler
                .unmarshal(&token)
                .context("unable to unmarshal token")?;
            print_credential(&credential);
            return Ok(());
        }
        Command::Check { token } => {
            if marshaler.is_marshaled(&token) {
                info!("token is a marshaled credential");
                return Ok(());
            }
            bail!("`{token}` is not a marshaled credential")
        }
    };

    let token = marshaler
        .marshal(&credential)
        .context("unable to marshal credential")?;
    println!("{token}");

    Ok(())
}

fn print_credential(credential: &CredentialIdentifier) {
    println!("type: {}", credential.marshal_type());
    match credential {
        CredentialIdentifier::Certificate(cert) => println!("hash: {cert}"),
        CredentialIdentifier::UsernameTarget(user) => println!("user name: {}", user.user_name),
        CredentialIdentifier::BinaryBlob(blob) => println!("blob: {}", hex::encode(&blob.blob)),
    }
}

/// Setup tracing subscriber for logging
fn setup_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}
