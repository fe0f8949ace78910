//! Room endpoint URL derivation.
//!
//! The room server lives on the same host as the page that embeds the room.
//! The WebSocket scheme mirrors the page's security: an `https` page talks
//! `wss`, anything else talks `ws`.

use std::fmt;

use crate::error::{Result, RoomError};

/// Path prefix of the room WebSocket endpoint.
pub const ROOM_PATH_PREFIX: &str = "/chat/";

/// Scheme and host of the page hosting the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin {
    secure: bool,
    host: String,
}

impl PageOrigin {
    /// Build an origin from its parts. `host` may include a port.
    pub fn new(host: impl Into<String>, secure: bool) -> Self {
        Self {
            secure,
            host: host.into(),
        }
    }

    /// Parse an origin such as `https://rooms.example.com` or
    /// `http://127.0.0.1:3030`. A single trailing `/` is tolerated.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidOrigin`] for unknown schemes, an empty
    /// host, or an origin that carries a path, query or fragment.
    ///
    /// ```
    /// use listening_room_client::PageOrigin;
    ///
    /// let origin = PageOrigin::parse("https://rooms.example.com").unwrap();
    /// assert!(origin.is_secure());
    /// assert_eq!(origin.room_url("lobby"), "wss://rooms.example.com/chat/lobby");
    /// ```
    pub fn parse(origin: &str) -> Result<Self> {
        let invalid = || RoomError::InvalidOrigin(origin.to_string());

        let (scheme, rest) = origin.split_once("://").ok_or_else(invalid)?;
        let secure = match scheme.to_ascii_lowercase().as_str() {
            "https" => true,
            "http" => false,
            _ => return Err(invalid()),
        };

        let host = rest.strip_suffix('/').unwrap_or(rest);
        let bad_char = |c: char| matches!(c, '/' | '?' | '#') || c.is_whitespace();
        if host.is_empty() || host.contains(bad_char) {
            return Err(invalid());
        }

        Ok(Self::new(host, secure))
    }

    /// `true` when the page was served over `https`.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Host (and port, if any) of the page.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// WebSocket scheme matching the page's security.
    pub fn ws_scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    /// `<ws|wss>://<host>/chat/<room_id>`. The room id is not validated
    /// here; see [`validate_room_id`].
    pub fn room_url(&self, room_id: &str) -> String {
        format!(
            "{}://{}{ROOM_PATH_PREFIX}{room_id}",
            self.ws_scheme(),
            self.host
        )
    }
}

impl fmt::Display for PageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "https" } else { "http" };
        write!(f, "{scheme}://{}", self.host)
    }
}

/// Check that `room_id` can be used verbatim as the last path segment.
///
/// # Errors
///
/// Returns [`RoomError::InvalidRoomId`] for empty ids and ids containing
/// `/`, `?`, `#`, `%`, whitespace or control characters.
pub fn validate_room_id(room_id: &str) -> Result<()> {
    let bad_char =
        |c: char| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace() || c.is_control();
    if room_id.is_empty() || room_id.contains(bad_char) {
        return Err(RoomError::InvalidRoomId(room_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn https_page_uses_wss() {
        let origin = PageOrigin::parse("https://rooms.example.com/").unwrap();
        assert_eq!(origin.room_url("abc"), "wss://rooms.example.com/chat/abc");
    }

    #[test]
    fn http_page_uses_ws_and_keeps_port() {
        let origin = PageOrigin::parse("http://127.0.0.1:3030").unwrap();
        assert!(!origin.is_secure());
        assert_eq!(origin.host(), "127.0.0.1:3030");
        assert_eq!(origin.room_url("r1"), "ws://127.0.0.1:3030/chat/r1");
    }

    #[test]
    fn scheme_is_case_insensitive() {
        assert!(PageOrigin::parse("HTTPS://example.com").unwrap().is_secure());
    }

    #[test]
    fn rejects_bad_origins() {
        for bad in [
            "example.com",
            "ftp://example.com",
            "https://",
            "https://example.com/room",
            "http://exa mple.com",
        ] {
            assert!(
                matches!(PageOrigin::parse(bad), Err(RoomError::InvalidOrigin(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn display_round_trips_through_parse() {
        let origin = PageOrigin::new("example.com:8443", true);
        assert_eq!(PageOrigin::parse(&origin.to_string()).unwrap(), origin);
    }

    #[test]
    fn room_id_rules() {
        assert!(validate_room_id("friday-night_42").is_ok());
        for bad in ["", "a/b", "a?b", "a#b", "a b", "a%2F", "a\nb"] {
            assert!(validate_room_id(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
