//! Shareable join links
//!
//! A join link has the shape `origin+path[?host=<hostIdentifier>]#<sessionId>`.
//! The presence of `host` makes the opener a Client; the fragment selects the
//! active session.

use url::Url;

use crate::errors::ProtocolError;
use crate::types::{PeerId, SessionId};

const HOST_PARAM: &str = "host";

/// Parsed join link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinLink {
    base: Url,
    pub host: Option<PeerId>,
    pub session: Option<SessionId>,
}

impl JoinLink {
    /// Build a link on top of `base`, dropping any query or fragment it carries
    pub fn new(
        base: &str,
        host: Option<PeerId>,
        session: Option<SessionId>,
    ) -> Result<Self, ProtocolError> {
        let mut base = Url::parse(base).map_err(|e| ProtocolError::InvalidLink {
            link: base.to_string(),
            reason: e.to_string(),
        })?;
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self {
            base,
            host,
            session,
        })
    }

    /// Parse a link; blank `host` values and empty fragments are treated as absent
    pub fn parse(link: &str) -> Result<Self, ProtocolError> {
        let url = Url::parse(link.trim()).map_err(|e| ProtocolError::InvalidLink {
            link: link.to_string(),
            reason: e.to_string(),
        })?;

        let host = url
            .query_pairs()
            .find(|(key, _)| key == HOST_PARAM)
            .and_then(|(_, value)| value.trim().parse::<PeerId>().ok());
        let session = url
            .fragment()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(SessionId::from);

        let mut base = url;
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self {
            base,
            host,
            session,
        })
    }

    /// Whether opening this link makes the process a Client
    pub fn is_client(&self) -> bool {
        self.host.is_some()
    }

    pub fn to_url(&self) -> Url {
        let mut url = self.base.clone();
        if let Some(host) = &self.host {
            url.query_pairs_mut().append_pair(HOST_PARAM, host.as_str());
        }
        if let Some(session) = &self.session {
            url.set_fragment(Some(session.as_str()));
        }
        url
    }
}

impl core::fmt::Display for JoinLink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.to_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_link() {
        let link = JoinLink::parse("https://qa.example.org/app?host=H1#session-17").unwrap();
        assert!(link.is_client());
        assert_eq!(link.host, Some(PeerId::new("H1")));
        assert_eq!(link.session, Some(SessionId::from("session-17")));
    }

    #[test]
    fn test_parse_host_link() {
        let link = JoinLink::parse("https://qa.example.org/app").unwrap();
        assert!(!link.is_client());
        assert!(link.session.is_none());

        let blank = JoinLink::parse("https://qa.example.org/app?host=%20#").unwrap();
        assert!(blank.host.is_none());
        assert!(blank.session.is_none());
    }

    #[test]
    fn test_websocket_host_round_trips() {
        let link = JoinLink::new(
            "https://qa.example.org/app?stale=1#old",
            Some(PeerId::new("ws://127.0.0.1:9001")),
            Some("default-session".into()),
        )
        .unwrap();
        let rendered = link.to_string();
        assert!(rendered.starts_with("https://qa.example.org/app?host="));
        assert!(rendered.ends_with("#default-session"));
        assert!(!rendered.contains("stale"));

        let parsed = JoinLink::parse(&rendered).unwrap();
        assert_eq!(parsed, link);
    }

    #[test]
    fn test_invalid_link() {
        assert!(matches!(
            JoinLink::parse("not a url"),
            Err(ProtocolError::InvalidLink { .. })
        ));
    }
}
