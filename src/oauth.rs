// ABOUTME: OAuth 1.0a request signing (HMAC-SHA256) for Penzu API calls
// ABOUTME: Builds the Authorization header from browser-session credentials

use crate::{Error, Result};
use base64::prelude::*;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::Sha256;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_METHOD: &str = "HMAC-SHA256";

/// Consumer and access-token pairs read from the `pz-session` local storage item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub token: String,
    pub token_secret: String,
}

fn encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

impl Credentials {
    /// Authorization header for a request, with a fresh nonce and timestamp.
    pub fn authorization(&self, method: &str, url: &str) -> Result<String> {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let timestamp = chrono::Utc::now().timestamp();
        self.sign_with(method, url, &nonce, timestamp)
    }

    pub fn sign_with(&self, method: &str, url: &str, nonce: &str, timestamp: i64) -> Result<String> {
        let timestamp = timestamp.to_string();
        let oauth_params = [
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", SIGNATURE_METHOD),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.token.as_str()),
            ("oauth_version", "1.0"),
        ];

        let base = signature_base_string(method, url, &oauth_params)?;
        let key = format!("{}&{}", encode(&self.consumer_secret), encode(&self.token_secret));

        let mut mac = HmacSha256::new_from_slice(key.as_bytes())
            .map_err(|e| Error::Auth(format!("Invalid signing key: {}", e)))?;
        mac.update(base.as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        let mut header_params: Vec<(&str, String)> = oauth_params
            .iter()
            .map(|(k, v)| (*k, v.to_string()))
            .collect();
        header_params.push(("oauth_signature", signature));
        header_params.sort_by(|a, b| a.0.cmp(b.0));

        let fields: Vec<String> = header_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect();
        Ok(format!("OAuth {}", fields.join(", ")))
    }
}

/// `METHOD&base-url&params`, with query parameters folded into the sorted set.
fn signature_base_string(method: &str, url: &str, oauth_params: &[(&str, &str)]) -> Result<String> {
    let parsed =
        Url::parse(url).map_err(|e| Error::Auth(format!("Cannot sign URL {}: {}", url, e)))?;

    let host = parsed.host_str().unwrap_or_default();
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
    let base_url = format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path());

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (encode(&k), encode(&v)))
        .collect();
    params.extend(oauth_params.iter().map(|(k, v)| (encode(k), encode(v))));
    params.sort();

    let param_string = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    Ok(format!(
        "{}&{}&{}",
        method.to_uppercase(),
        encode(&base_url),
        encode(&param_string)
    ))
}
