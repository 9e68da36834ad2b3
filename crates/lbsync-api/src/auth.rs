// Request signing for both API flavours.
//
// Query API: HMAC-SHA256 over `GET{host}{path}?{sorted k=v pairs}`,
// base64-encoded into the `Signature` parameter.
// SDK API: TC3-HMAC-SHA256 over a canonical request, carried in the
// `Authorization` header.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::DateTime;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::error::Error;

type HmacSha256 = Hmac<Sha256>;

pub(crate) const QUERY_SIGNATURE_METHOD: &str = "HmacSHA256";
pub(crate) const TC3_ALGORITHM: &str = "TC3-HMAC-SHA256";
pub(crate) const TC3_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Secret id / secret key pair issued by the cloud provider.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub secret_id: String,
    pub secret_key: SecretString,
}

impl Credentials {
    pub fn new(secret_id: impl Into<String>, secret_key: SecretString) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key,
        }
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| Error::Signing(format!("bad key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Sign a query-API request.
///
/// `params` must already contain every parameter except `Signature`.
/// Values are signed raw (not percent-encoded); reqwest encodes them
/// when the query string is built.
pub(crate) fn sign_query(
    credentials: &Credentials,
    host: &str,
    path: &str,
    params: &BTreeMap<String, String>,
) -> Result<String, Error> {
    let canonical = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let plain = format!("GET{host}{path}?{canonical}");
    let digest = hmac_sha256(
        credentials.secret_key.expose_secret().as_bytes(),
        plain.as_bytes(),
    )?;
    Ok(STANDARD.encode(digest))
}

/// Build the TC3 `Authorization` header for an SDK-API request.
pub(crate) fn sign_tc3(
    credentials: &Credentials,
    service: &str,
    host: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<String, Error> {
    let date = DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| Error::Signing(format!("timestamp {timestamp} out of range")))?
        .format("%Y-%m-%d")
        .to_string();

    let signed_headers = "content-type;host";
    let canonical_request = format!(
        "POST\n/\n\ncontent-type:{TC3_CONTENT_TYPE}\nhost:{host}\n\n{signed_headers}\n{}",
        sha256_hex(payload)
    );
    let scope = format!("{date}/{service}/tc3_request");
    let string_to_sign = format!(
        "{TC3_ALGORITHM}\n{timestamp}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let secret_date = hmac_sha256(
        format!("TC3{}", credentials.secret_key.expose_secret()).as_bytes(),
        date.as_bytes(),
    )?;
    let secret_service = hmac_sha256(&secret_date, service.as_bytes())?;
    let secret_signing = hmac_sha256(&secret_service, b"tc3_request")?;
    let signature = hex::encode(hmac_sha256(&secret_signing, string_to_sign.as_bytes())?);

    Ok(format!(
        "{TC3_ALGORITHM} Credential={}/{scope}, \
         SignedHeaders={signed_headers}, Signature={signature}",
        credentials.secret_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("AKIDexample", SecretString::from("secret".to_string()))
    }

    #[test]
    fn query_signature_is_deterministic_and_order_independent() {
        let mut a = BTreeMap::new();
        a.insert("Action".to_string(), "DescribeLoadBalancers".to_string());
        a.insert("Nonce".to_string(), "1".to_string());
        let mut b = BTreeMap::new();
        b.insert("Nonce".to_string(), "1".to_string());
        b.insert("Action".to_string(), "DescribeLoadBalancers".to_string());

        let sa = sign_query(&creds(), "lb.example.com", "/v2/index.php", &a).expect("sign");
        let sb = sign_query(&creds(), "lb.example.com", "/v2/index.php", &b).expect("sign");
        assert_eq!(sa, sb);
        assert!(STANDARD.decode(&sa).is_ok_and(|raw| raw.len() == 32));
    }

    #[test]
    fn query_signature_depends_on_host() {
        let params = BTreeMap::from([("Action".to_string(), "X".to_string())]);
        let sa = sign_query(&creds(), "a.example.com", "/", &params).expect("sign");
        let sb = sign_query(&creds(), "b.example.com", "/", &params).expect("sign");
        assert_ne!(sa, sb);
    }

    #[test]
    fn tc3_header_has_expected_shape() {
        let header = sign_tc3(&creds(), "clb", "clb.example.com", 1_700_000_000, b"{}")
            .expect("sign");
        assert!(header.starts_with(
            "TC3-HMAC-SHA256 Credential=AKIDexample/2023-11-14/clb/tc3_request, "
        ));
        assert!(header.contains("SignedHeaders=content-type;host"));
        let signature = header.rsplit("Signature=").next().expect("signature");
        assert_eq!(signature.len(), 64);
    }
}
