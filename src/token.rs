//! Claims extraction from compact access tokens.
//!
//! This is claims extraction only, not a trust decision: the signature
//! segment is never verified. The payload segment is base64url without
//! padding, and the decoded bytes may carry URL-style percent escapes for
//! characters outside the base64 alphabet, so decoding runs
//! base64url -> percent-decode -> UTF-8 -> JSON.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Claims consumed from the token payload. Unknown claims are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClaimSet {
    pub id: Option<i64>,
    pub user_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organization: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    /// Embedded secondary token used to authorize downstream API calls.
    pub access_token: Option<String>,
}

/// Decode the claims segment of a compact token.
///
/// # Errors
///
/// Returns `Error::MalformedToken` if the token is not exactly three
/// dot-separated segments, or the payload segment is not valid base64url,
/// percent-decodable UTF-8, or a JSON object.
pub fn decode(token: &str) -> Result<ClaimSet, Error> {
    let mut parts = token.split('.');
    let _header = parts
        .next()
        .ok_or(Error::MalformedToken("expected three dot-separated segments"))?;
    let claims_b64 = parts
        .next()
        .ok_or(Error::MalformedToken("expected three dot-separated segments"))?;
    let _signature = parts
        .next()
        .ok_or(Error::MalformedToken("expected three dot-separated segments"))?;
    if parts.next().is_some() {
        return Err(Error::MalformedToken("expected three dot-separated segments"));
    }

    // Some issuers pad the payload segment; the alphabet is still base64url.
    let bytes = Base64UrlUnpadded::decode_vec(claims_b64.trim_end_matches('='))
        .map_err(|_| Error::MalformedToken("invalid base64url payload"))?;

    let bytes = urlencoding::decode_binary(&bytes);
    let json = String::from_utf8(bytes.into_owned())
        .map_err(|_| Error::MalformedToken("payload is not valid UTF-8"))?;

    serde_json::from_str(&json).map_err(|_| Error::MalformedToken("payload is not a JSON object"))
}
