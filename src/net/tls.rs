use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use ring::digest::{digest, SHA256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};
use wtransport::Identity;

use crate::config::ServerConfig;

// Dev certificate location (same as `scripts/gen-dev-cert.rs`)
const DEV_CERT_DIR: &str = "certs";
const CERT_FILE_NAME: &str = "cert.pem";
const KEY_FILE_NAME: &str = "key.pem";

/// Browsers refuse pinned certificate hashes for certs valid longer than this
const DEV_CERT_VALIDITY: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// TLS configuration for WebTransport server
pub struct TlsConfig {
    /// The wtransport Identity containing certificate and key
    pub identity: Identity,
    /// Base64-encoded SHA-256 hash of the certificate (for browser flag)
    pub cert_hash: String,
}

impl TlsConfig {
    /// Load TLS configuration
    ///
    /// Production: TLS_CERT_PATH and TLS_KEY_PATH (carried by `ServerConfig`)
    /// Development: certs/, generated on first start when missing
    pub async fn load(config: &ServerConfig) -> Result<Self> {
        if let (Some(cert_path), Some(key_path)) = (&config.tls_cert_path, &config.tls_key_path) {
            info!("Loading TLS certificate from configured paths");
            return Self::load_from_paths(Path::new(cert_path), Path::new(key_path)).await;
        }

        let dir = Path::new(DEV_CERT_DIR);
        let (cert_path, key_path) = (dir.join(CERT_FILE_NAME), dir.join(KEY_FILE_NAME));
        if !cert_path.exists() || !key_path.exists() {
            warn!("No certificate in {}/, generating a development certificate", DEV_CERT_DIR);
            generate_dev_cert(dir)?;
        } else {
            info!("Loading dev certificate from {}/", DEV_CERT_DIR);
        }
        Self::load_from_paths(&cert_path, &key_path).await
    }

    /// Load certificate from PEM file paths
    pub async fn load_from_paths(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let identity = Identity::load_pemfiles(cert_path, key_path)
            .await
            .with_context(|| format!("Failed to load certificate from {}", cert_path.display()))?;

        let cert_hash = Self::compute_cert_hash(&identity);
        Self::log_cert_info(&cert_hash);

        Ok(Self {
            identity,
            cert_hash,
        })
    }

    fn compute_cert_hash(identity: &Identity) -> String {
        identity
            .certificate_chain()
            .as_slice()
            .first()
            .map(|cert| {
                let hash = digest(&SHA256, cert.der());
                STANDARD.encode(hash.as_ref())
            })
            .unwrap_or_default()
    }

    fn log_cert_info(cert_hash: &str) {
        info!("Certificate hash: {}", cert_hash);
        info!(
            "Chrome flag: --ignore-certificate-errors-spki-list={}",
            cert_hash
        );
    }

    /// Get the certificate hash for client configuration
    pub fn cert_hash(&self) -> &str {
        &self.cert_hash
    }
}

/// Write a 14-day self-signed localhost certificate into `dir`
pub fn generate_dev_cert(dir: &Path) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut params = CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])
        .context("Invalid certificate subject names")?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, "Marble Arena Dev");
    params
        .distinguished_name
        .push(DnType::OrganizationName, "Development");

    let now = SystemTime::now();
    params.not_before = now.into();
    params.not_after = (now + DEV_CERT_VALIDITY).into();

    let key_pair = KeyPair::generate().context("Failed to generate key pair")?;
    let cert = params
        .self_signed(&key_pair)
        .context("Failed to self-sign certificate")?;

    let cert_path = dir.join(CERT_FILE_NAME);
    let key_path = dir.join(KEY_FILE_NAME);
    fs::write(&cert_path, cert.pem()).context("Failed to write certificate")?;
    fs::write(&key_path, key_pair.serialize_pem()).context("Failed to write private key")?;

    info!("Development certificate written to {}", dir.display());
    Ok((cert_path, key_path))
}
