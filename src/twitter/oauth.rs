//! OAuth 1.0a request signing (HMAC-SHA1) for already-issued access tokens.
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Everything needed to sign one request.
#[derive(Debug, Clone)]
pub struct OAuthParams<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
    pub token: &'a str,
    pub token_secret: &'a str,
    pub nonce: String,
    pub timestamp: i64,
}

impl<'a> OAuthParams<'a> {
    /// Fresh nonce and the current time.
    pub fn now(
        consumer_key: &'a str,
        consumer_secret: &'a str,
        token: &'a str,
        token_secret: &'a str,
    ) -> Self {
        Self {
            consumer_key,
            consumer_secret,
            token,
            token_secret,
            nonce: uuid::Uuid::new_v4().simple().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    fn protocol_params(&self) -> Vec<(String, String)> {
        vec![
            ("oauth_consumer_key".into(), self.consumer_key.into()),
            ("oauth_nonce".into(), self.nonce.clone()),
            ("oauth_signature_method".into(), "HMAC-SHA1".into()),
            ("oauth_timestamp".into(), self.timestamp.to_string()),
            ("oauth_token".into(), self.token.into()),
            ("oauth_version".into(), "1.0".into()),
        ]
    }
}

/// RFC 3986 percent-encoding as required by the signature base string.
fn encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Compute `oauth_signature` over `params` (request and protocol parameters).
pub fn signature(
    method: &str,
    base_url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: &str,
) -> String {
    let mut encoded: Vec<(String, String)> =
        params.iter().map(|(k, v)| (encode(k), encode(v))).collect();
    encoded.sort();
    let joined = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let base = format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(base_url),
        encode(&joined)
    );
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));

    let mut mac =
        HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(base.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Build the `Authorization` header value for a request whose query
/// parameters are `query`.
pub fn authorization_header(
    method: &str,
    base_url: &str,
    query: &[(String, String)],
    oauth: &OAuthParams<'_>,
) -> String {
    let protocol = oauth.protocol_params();
    let mut all = query.to_vec();
    all.extend(protocol.iter().cloned());
    let sig = signature(
        method,
        base_url,
        &all,
        oauth.consumer_secret,
        oauth.token_secret,
    );

    let mut fields = protocol;
    fields.push(("oauth_signature".into(), sig));
    fields.sort();
    let rendered = fields
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {}", rendered)
}
