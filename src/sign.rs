//! Produces CloudFront signed URLs using a canned policy: the URL is
//! granted until a fixed expiry, and the policy is signed with
//! RSA-SHA1 using the private half of a key registered with
//! CloudFront.

use anyhow::{anyhow, bail, Context, Result};
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::{Digest, Sha1};
use std::fs;
use std::path::Path;

/// Builds the canned policy CloudFront reconstructs on its side from
/// the `Expires` parameter. Must match byte for byte.
pub fn canned_policy(url: &str, expires: i64) -> Result<String> {
    let resource = serde_json::to_string(url)
        .with_context(|| format!("Failed to encode {:?} as a policy resource", url))?;
    Ok(format!(
        r#"{{"Statement":[{{"Resource":{},"Condition":{{"DateLessThan":{{"AWS:EpochTime":{}}}}}}}]}}"#,
        resource, expires
    ))
}

/// Base64 with the characters CloudFront forbids in query strings
/// substituted.
fn url_safe_base64(data: &[u8]) -> String {
    Base64::encode_string(data)
        .chars()
        .map(|c| match c {
            '+' => '-',
            '=' => '_',
            '/' => '~',
            other => other,
        })
        .collect()
}

/// Signs URLs for a single CloudFront key pair.
pub struct UrlSigner {
    key_pair_id: String,
    key: RsaPrivateKey,
}

impl UrlSigner {
    pub fn new(key_pair_id: &str, key: RsaPrivateKey) -> Self {
        UrlSigner {
            key_pair_id: String::from(key_pair_id),
            key,
        }
    }

    /// Parses a PEM private key, either PKCS#1 or PKCS#8.
    pub fn from_pem(key_pair_id: &str, pem: &str) -> Result<Self> {
        let key = if pem.contains("BEGIN RSA PRIVATE KEY") {
            RsaPrivateKey::from_pkcs1_pem(pem)
                .map_err(|e| anyhow!("Invalid PKCS#1 private key: {}", e))?
        } else {
            RsaPrivateKey::from_pkcs8_pem(pem)
                .map_err(|e| anyhow!("Invalid PKCS#8 private key: {}", e))?
        };
        Ok(UrlSigner::new(key_pair_id, key))
    }

    /// Loads a PEM private key file.
    pub fn from_pem_file(key_pair_id: &str, path: &Path) -> Result<Self> {
        let pem = fs::read_to_string(path)
            .with_context(|| format!("Failed to load private key file {:?}", path))?;
        UrlSigner::from_pem(key_pair_id, &pem)
            .with_context(|| format!("Failed to parse private key file {:?}", path))
    }

    /// Signs `url` so that it stays valid until `expires`.
    pub fn sign(&self, url: &str, expires: DateTime<Utc>) -> Result<String> {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            bail!("Can't sign {:?}: only http and https URLs are supported", url);
        }
        if self.key_pair_id.is_empty() {
            bail!("Can't sign {:?} without a key pair id", url);
        }
        let expires = expires.timestamp();
        let policy = canned_policy(url, expires)?;
        let digest = Sha1::digest(policy.as_bytes());
        let signature = self
            .key
            .sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
            .map_err(|e| anyhow!("Failed to sign policy for {:?}: {}", url, e))?;
        let separator = if url.contains('?') { '&' } else { '?' };
        Ok(format!(
            "{}{}Expires={}&Signature={}&Key-Pair-Id={}",
            url,
            separator,
            expires,
            url_safe_base64(&signature),
            self.key_pair_id
        ))
    }
}
