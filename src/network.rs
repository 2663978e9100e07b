//! Relay URL constants and validation.

use url::Url;

use crate::error::RelayError;

/// Default relay URL.
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:4040";

/// Validate a relay URL.
///
/// The URL must parse, and must be `ws://` or `wss://` with a host made of
/// ASCII letters, digits, `.` and `-`, an optional numeric port, and an
/// optional path starting with `/`. No userinfo, no query without a path.
pub fn validate_relay_url(url: &str) -> Result<(), RelayError> {
    let invalid = || RelayError::InvalidRelayUrl(url.to_string());

    let parsed = Url::parse(url).map_err(|_| invalid())?;

    // Url lowercases the scheme, so check the raw text
    let rest = url
        .strip_prefix("wss://")
        .or_else(|| url.strip_prefix("ws://"))
        .ok_or_else(invalid)?;

    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(invalid());
    }

    let host = parsed
        .host_str()
        .filter(|host| {
            !host.is_empty()
                && host
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
        })
        .ok_or_else(invalid)?;

    // Url normalizes the host and drops empty or default ports; the raw
    // authority must be exactly `host` or `host:digits`.
    let authority = rest.split('/').next().unwrap_or_default();
    let tail = match authority.get(..host.len()) {
        Some(raw_host) if raw_host.eq_ignore_ascii_case(host) => &authority[host.len()..],
        _ => return Err(invalid()),
    };

    match tail.strip_prefix(':') {
        None if tail.is_empty() => Ok(()),
        Some(port) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => Ok(()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_ws_and_wss() {
        tokio_test::assert_ok!(validate_relay_url(DEFAULT_RELAY_URL));
        tokio_test::assert_ok!(validate_relay_url("wss://relay.example.com"));
        tokio_test::assert_ok!(validate_relay_url("wss://relay.example.com:443/nostr"));
        tokio_test::assert_ok!(validate_relay_url("ws://127.0.0.1:4040/"));
        tokio_test::assert_ok!(validate_relay_url("ws://my-relay/path?x=1"));
    }

    #[test]
    fn test_rejects_other_schemes_and_malformed() {
        for url in [
            "http://relay.example.com",
            "relay.example.com",
            "ws://",
            "ws://:4040",
            "ws://relay.example.com:",
            "ws://relay.example.com:80a",
            "ws://relay.example.com:70000",
            "ws://user@relay.example.com",
            "ws://relay example.com",
            "ws://relay.example.com?x=1",
            "ws://[::1]:4040",
            "ws://user:pw@relay.example.com/",
            "WS://relay.example.com",
            "",
        ] {
            let err = validate_relay_url(url).unwrap_err();
            assert_eq!(err.code(), "INVALID_RELAY_URL", "{url} should be rejected");
        }
    }
}
