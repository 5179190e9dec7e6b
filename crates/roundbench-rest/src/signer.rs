//! HMAC-SHA256 request signing.
//!
//! The signature covers the query string exactly as sent: caller parameters
//! in their given order, then `timestamp`. `signature` is appended last and is
//! not itself signed.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::credentials::ApiCredentials;

type HmacSha256 = Hmac<Sha256>;

/// Signs canonical query strings with the account secret.
pub struct RequestSigner<'a> {
    credentials: &'a ApiCredentials,
}

impl<'a> RequestSigner<'a> {
    pub fn new(credentials: &'a ApiCredentials) -> Self {
        Self { credentials }
    }

    /// Lowercase hex HMAC-SHA256 of `message`.
    pub fn sign(&self, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.credentials.expose_secret().as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Build `k1=v1&...&timestamp=T&signature=S`, preserving parameter order.
    pub fn signed_query(&self, params: &[(&str, String)], timestamp_ms: u64) -> String {
        let query = canonical_query(params, timestamp_ms);
        let signature = self.sign(&query);
        format!("{query}&signature={signature}")
    }
}

/// Parameters joined in the given order with `timestamp` appended.
pub fn canonical_query(params: &[(&str, String)], timestamp_ms: u64) -> String {
    let mut parts: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    parts.push(format!("timestamp={timestamp_ms}"));
    parts.join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC_SECRET: &str = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";

    #[test]
    fn test_sign_known_vector() {
        let creds = ApiCredentials::new("unused", DOC_SECRET);
        let signer = RequestSigner::new(&creds);

        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            signer.sign(query),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_signed_query_matches_known_vector() {
        let creds = ApiCredentials::new("unused", DOC_SECRET);
        let signer = RequestSigner::new(&creds);

        let params = [
            ("symbol", "LTCBTC".to_string()),
            ("side", "BUY".to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", "1".to_string()),
            ("price", "0.1".to_string()),
            ("recvWindow", "5000".to_string()),
        ];
        let query = signer.signed_query(&params, 1_499_827_319_559);

        assert_eq!(
            query,
            "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1\
             &recvWindow=5000&timestamp=1499827319559\
             &signature=c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_canonical_query_preserves_order() {
        let params = [("zebra", "1".to_string()), ("alpha", "2".to_string())];
        assert_eq!(
            canonical_query(&params, 1000),
            "zebra=1&alpha=2&timestamp=1000"
        );
    }

    #[test]
    fn test_canonical_query_without_params() {
        assert_eq!(canonical_query(&[], 7), "timestamp=7");
    }
}
