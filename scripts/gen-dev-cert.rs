//! Dev certificate generator - run with `cargo run --manifest-path scripts/Cargo.toml`
//!
//! Writes a self-signed localhost certificate for the arena server into
//! `certs/`. Validity is 14 days, the longest browsers accept for pinned
//! WebTransport certificate hashes. The server generates the same
//! certificate on first start; this tool exists to pin the hash in display
//! and phone clients ahead of time.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, PublicKeyData};
use ring::digest::{digest, SHA256};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

const CERT_DIR: &str = "../certs";
const CERT_FILE: &str = "../certs/cert.pem";
const KEY_FILE: &str = "../certs/key.pem";
const VALIDITY: Duration = Duration::from_secs(14 * 24 * 60 * 60);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let force = std::env::args().any(|a| a == "--force");

    if !force && Path::new(CERT_FILE).exists() && Path::new(KEY_FILE).exists() {
        println!("Certificates already exist at {}/ (pass --force to replace)", CERT_DIR);
        print_hash()?;
        return Ok(());
    }

    println!("Generating arena development certificate for localhost...\n");
    fs::create_dir_all(CERT_DIR)?;

    let mut params = CertificateParams::new(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, "Marble Arena Dev");
    params
        .distinguished_name
        .push(DnType::OrganizationName, "Development");

    let now = SystemTime::now();
    params.not_before = now.into();
    params.not_after = (now + VALIDITY).into();

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    fs::write(CERT_FILE, cert.pem())?;
    fs::write(KEY_FILE, key_pair.serialize_pem())?;

    println!("Certificate saved to {}", CERT_FILE);
    println!("Private key saved to {}\n", KEY_FILE);

    print_hash()
}

fn print_hash() -> Result<(), Box<dyn std::error::Error>> {
    let cert_pem = fs::read_to_string(CERT_FILE)?;
    let pem = pem::parse(&cert_pem)?;

    // SHA-256 of the DER certificate, as the server logs it on start
    let hash = STANDARD.encode(digest(&SHA256, pem.contents()).as_ref());

    println!("Certificate hash (serverCertificateHashes):");
    println!("  {}\n", hash);
    println!("Chrome flag:");
    println!("  --ignore-certificate-errors-spki-list={}", spki_hash()?);

    Ok(())
}

/// SHA-256 of the SubjectPublicKeyInfo, which is what Chrome's SPKI list pins
fn spki_hash() -> Result<String, Box<dyn std::error::Error>> {
    let key_pair = KeyPair::from_pem(&fs::read_to_string(KEY_FILE)?)?;
    Ok(spki_hash_of(&key_pair))
}

fn spki_hash_of(key_pair: &KeyPair) -> String {
    let spki = key_pair.subject_public_key_info();
    STANDARD.encode(digest(&SHA256, &spki).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spki_hash_covers_public_key_only() {
        let key_pair = KeyPair::generate().unwrap();
        let params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let cert = params.self_signed(&key_pair).unwrap();

        let spki = key_pair.subject_public_key_info();
        let der: &[u8] = cert.der();
        assert!(der.windows(spki.len()).any(|w| w == spki.as_slice()));

        let cert_hash = STANDARD.encode(digest(&SHA256, der).as_ref());
        assert_ne!(spki_hash_of(&key_pair), cert_hash);

        let reloaded = KeyPair::from_pem(&key_pair.serialize_pem()).unwrap();
        assert_eq!(spki_hash_of(&reloaded), spki_hash_of(&key_pair));
    }
}
