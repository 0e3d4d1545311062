//! The `a7_account` cookie: the signed-in DID, readable on every request.

/// Cookie name.
pub const ACCOUNT_COOKIE: &str = "a7_account";

/// One year, in seconds.
pub const ACCOUNT_COOKIE_MAX_AGE: u64 = 31_536_000;

/// `Set-Cookie` value storing `did` for a year. `None` when `did` is empty.
pub fn set_account_cookie(did: &str) -> Option<String> {
    if did.is_empty() {
        return None;
    }
    Some(format!(
        "{ACCOUNT_COOKIE}={}; Path=/; Max-Age={ACCOUNT_COOKIE_MAX_AGE}; SameSite=Lax",
        urlencoding::encode(did)
    ))
}

/// `Set-Cookie` value that expires the account cookie immediately.
pub fn clear_account_cookie() -> String {
    format!("{ACCOUNT_COOKIE}=; Path=/; Max-Age=0; SameSite=Lax")
}

/// Read the account DID from a `Cookie` request header.
/// Empty string when the cookie is absent or not valid percent-encoding.
pub fn get_account_cookie(cookie_header: &str) -> String {
    for cookie in cookie_header.split(';') {
        let Some((name, value)) = cookie.trim().split_once('=') else {
            continue;
        };
        if name == ACCOUNT_COOKIE {
            return urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_default();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_cookie_format() {
        assert_eq!(
            set_account_cookie("did:plc:abc123").unwrap(),
            "a7_account=did%3Aplc%3Aabc123; Path=/; Max-Age=31536000; SameSite=Lax"
        );
    }

    #[test]
    fn set_cookie_skips_empty_did() {
        assert!(set_account_cookie("").is_none());
    }

    #[test]
    fn clear_cookie_format() {
        assert_eq!(clear_account_cookie(), "a7_account=; Path=/; Max-Age=0; SameSite=Lax");
    }

    #[test]
    fn get_cookie_among_others() {
        let header = "theme=dark; a7_account=did%3Aplc%3Aabc123; other=1";
        assert_eq!(get_account_cookie(header), "did:plc:abc123");
    }

    #[test]
    fn get_cookie_keeps_equals_in_value() {
        assert_eq!(get_account_cookie("a7_account=a=b"), "a=b");
    }

    #[test]
    fn get_cookie_missing() {
        assert_eq!(get_account_cookie(""), "");
        assert_eq!(get_account_cookie("theme=dark"), "");
        assert_eq!(get_account_cookie("a7_accountx=did"), "");
    }

    #[test]
    fn set_then_get_roundtrip_through_header() {
        let set = set_account_cookie("did:web:example.com").unwrap();
        let pair = set.split(';').next().unwrap();
        assert_eq!(get_account_cookie(pair), "did:web:example.com");
    }
}
