//! Per-exchange request signing.
//!
//! Both exchanges authenticate with an HMAC-SHA256 over a concatenated
//! pre-hash string, but disagree on its layout and on the signature
//! encoding. The bytes signed here must be the exact bytes transmitted;
//! adapters build each payload once and pass the same string to the signer
//! and to the HTTP client.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::Sha256;

use crate::error::{RelayError, Result};

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(secret: &str, message: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| RelayError::Signature(format!("HMAC init failed: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| RelayError::Signature(format!("invalid {} header: {}", name, e)))
}

/// Bybit v5 request signing (hex HMAC scheme).
///
/// Pre-hash: `timestamp ∥ api_key ∥ recv_window ∥ payload`, where payload
/// is the compact JSON body for POST and the query string for GET.
#[derive(Clone)]
pub struct BybitSigner {
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
}

impl BybitSigner {
    pub fn new(api_key: String, api_secret: String, recv_window_ms: u64) -> Self {
        Self {
            api_key,
            api_secret,
            recv_window_ms,
        }
    }

    /// Hex signature over one (timestamp, payload) pair
    pub fn sign(&self, timestamp: i64, payload: &str) -> Result<String> {
        let message = format!(
            "{}{}{}{}",
            timestamp, self.api_key, self.recv_window_ms, payload
        );
        Ok(hex::encode(hmac_sha256(&self.api_secret, &message)?))
    }

    /// Authentication headers valid for exactly this (timestamp, payload) pair
    pub fn headers(&self, timestamp: i64, payload: &str) -> Result<HeaderMap> {
        let signature = self.sign(timestamp, payload)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-bapi-api-key"),
            header_value("X-BAPI-API-KEY", &self.api_key)?,
        );
        headers.insert(
            HeaderName::from_static("x-bapi-timestamp"),
            header_value("X-BAPI-TIMESTAMP", &timestamp.to_string())?,
        );
        headers.insert(
            HeaderName::from_static("x-bapi-recv-window"),
            header_value("X-BAPI-RECV-WINDOW", &self.recv_window_ms.to_string())?,
        );
        headers.insert(
            HeaderName::from_static("x-bapi-sign"),
            header_value("X-BAPI-SIGN", &signature)?,
        );

        Ok(headers)
    }
}

/// Bitget request signing (base64 HMAC scheme).
///
/// Pre-hash: `timestamp ∥ METHOD ∥ request_path ∥ body`. GET requests carry
/// their lexicographically-sorted query string on the path and sign an
/// empty body; POST requests sign the compact JSON body with keys sorted.
#[derive(Clone)]
pub struct BitgetSigner {
    api_key: String,
    api_secret: String,
    passphrase: String,
}

impl BitgetSigner {
    pub fn new(api_key: String, api_secret: String, passphrase: String) -> Self {
        Self {
            api_key,
            api_secret,
            passphrase,
        }
    }

    /// The exact string fed to HMAC; exposed for signature troubleshooting
    pub fn prehash(timestamp: i64, method: &str, request_path: &str, body: &str) -> String {
        format!(
            "{}{}{}{}",
            timestamp,
            method.to_uppercase(),
            request_path,
            body
        )
    }

    /// Base64 signature over one (timestamp, method, path, body) tuple
    pub fn sign(&self, timestamp: i64, method: &str, request_path: &str, body: &str) -> Result<String> {
        let message = Self::prehash(timestamp, method, request_path, body);
        Ok(BASE64.encode(hmac_sha256(&self.api_secret, &message)?))
    }

    /// Authentication headers valid for exactly this signing tuple
    pub fn headers(
        &self,
        timestamp: i64,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> Result<HeaderMap> {
        let signature = self.sign(timestamp, method, request_path, body)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("access-key"),
            header_value("ACCESS-KEY", &self.api_key)?,
        );
        headers.insert(
            HeaderName::from_static("access-sign"),
            header_value("ACCESS-SIGN", &signature)?,
        );
        headers.insert(
            HeaderName::from_static("access-timestamp"),
            header_value("ACCESS-TIMESTAMP", &timestamp.to_string())?,
        );
        headers.insert(
            HeaderName::from_static("access-passphrase"),
            header_value("ACCESS-PASSPHRASE", &self.passphrase)?,
        );
        headers.insert(
            HeaderName::from_static("locale"),
            HeaderValue::from_static("en-US"),
        );

        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: i64 = 1_700_000_000_000;

    fn bybit_signer() -> BybitSigner {
        BybitSigner::new("test-key".to_string(), "test-secret".to_string(), 5000)
    }

    fn bitget_signer() -> BitgetSigner {
        BitgetSigner::new(
            "test-key".to_string(),
            "test-secret".to_string(),
            "test-pass".to_string(),
        )
    }

    #[test]
    fn bybit_signature_matches_golden_vector() {
        let body = r#"{"category":"linear","orderType":"Market","qty":"10","reduceOnly":true,"side":"Sell","symbol":"BTCUSDT","timeInForce":"IOC"}"#;
        let sig = bybit_signer().sign(TS, body).expect("sign should succeed");
        assert_eq!(
            sig,
            "8bc0c0d25c56040e990492fa8720da528fcbb23c7f17b18f2ec581365e98e194"
        );
    }

    #[test]
    fn bitget_post_prehash_and_signature_match_golden_vector() {
        let path = "/api/v2/mix/order/place-order";
        let body = r#"{"marginCoin":"USDT","orderType":"market","productType":"USDT-FUTURES","reduceOnly":"YES","side":"sell","size":"10","symbol":"BTCUSDT"}"#;

        let prehash = BitgetSigner::prehash(TS, "POST", path, body);
        assert_eq!(
            prehash,
            format!("{}POST{}{}", TS, path, body),
        );

        let sig = bitget_signer()
            .sign(TS, "POST", path, body)
            .expect("sign should succeed");
        assert_eq!(sig, "QJr6V/UI4jJPeBC5oYAn1TIyeGMe5P70X7oM0oof6N8=");
    }

    #[test]
    fn bitget_get_signs_sorted_query_on_path() {
        let path =
            "/api/v2/mix/position/single-position?marginCoin=USDT&productType=USDT-FUTURES&symbol=BTCUSDT";
        let sig = bitget_signer()
            .sign(TS, "GET", path, "")
            .expect("sign should succeed");
        assert_eq!(sig, "QiK6FqptfjHMJibBnsT4PrYpu5XGBD27Z7TMKqDZ9LU=");
    }

    #[test]
    fn signatures_are_deterministic() {
        let body = r#"{"symbol":"BTCUSDT"}"#;
        let a = bybit_signer().sign(TS, body).expect("sign should succeed");
        let b = bybit_signer().sign(TS, body).expect("sign should succeed");
        assert_eq!(a, b);

        let c = bitget_signer().sign(TS, "POST", "/x", body).expect("sign should succeed");
        let d = bitget_signer().sign(TS, "POST", "/x", body).expect("sign should succeed");
        assert_eq!(c, d);
    }

    #[test]
    fn differing_bodies_produce_differing_signatures() {
        let a = bybit_signer()
            .sign(TS, r#"{"qty":"10"}"#)
            .expect("sign should succeed");
        let b = bybit_signer()
            .sign(TS, r#"{"qty":"11"}"#)
            .expect("sign should succeed");
        assert_ne!(a, b);

        let c = bitget_signer()
            .sign(TS, "POST", "/x", r#"{"size":"10"}"#)
            .expect("sign should succeed");
        let d = bitget_signer()
            .sign(TS, "POST", "/x", r#"{"size":"11"}"#)
            .expect("sign should succeed");
        assert_ne!(c, d);
    }

    #[test]
    fn bybit_headers_carry_all_auth_fields() {
        let headers = bybit_signer().headers(TS, "{}").expect("headers should build");
        assert!(headers.contains_key("x-bapi-api-key"));
        assert!(headers.contains_key("x-bapi-timestamp"));
        assert!(headers.contains_key("x-bapi-recv-window"));
        assert!(headers.contains_key("x-bapi-sign"));
    }

    #[test]
    fn bitget_headers_carry_all_auth_fields() {
        let headers = bitget_signer()
            .headers(TS, "POST", "/x", "{}")
            .expect("headers should build");
        assert!(headers.contains_key("access-key"));
        assert!(headers.contains_key("access-sign"));
        assert!(headers.contains_key("access-timestamp"));
        assert!(headers.contains_key("access-passphrase"));
        assert!(headers.contains_key("locale"));
    }
}
