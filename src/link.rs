//! Proxy link parsing
//!
//! Decodes `vless://`, `trojan://` and `ss://` URIs into a structured
//! endpoint model. No network or filesystem side effects.

use std::fmt;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use url::Url;

use crate::error::{CheckerError, Result};

/// Protocol family of a parsed endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFamily {
    Vless,
    Trojan,
    Shadowsocks,
}

impl ProtocolFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolFamily::Vless => "vless",
            ProtocolFamily::Trojan => "trojan",
            ProtocolFamily::Shadowsocks => "shadowsocks",
        }
    }

    /// Map a link scheme to its family. `ss` is normalized to shadowsocks.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "vless" => Some(ProtocolFamily::Vless),
            "trojan" => Some(ProtocolFamily::Trojan),
            "ss" => Some(ProtocolFamily::Shadowsocks),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured endpoint decoded from a proxy link.
///
/// Only the fields relevant to the protocol family are populated; the rest
/// stay empty. `allocated_local_port` and `monitor_link` are filled in by the
/// caller during startup materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEndpoint {
    pub protocol: ProtocolFamily,
    /// Original link text, used for collision-free config file naming
    pub link: String,
    /// UID (vless), password (trojan) or secret (shadowsocks)
    pub user_id: String,
    pub server: String,
    pub port: u16,
    pub security: String,
    pub transport_type: String,
    pub header_type: String,
    pub flow: String,
    pub path: String,
    pub host: String,
    pub sni: String,
    pub fingerprint: String,
    pub public_key: String,
    pub short_id: String,
    pub display_name: String,
    pub cipher_method: String,
    pub allocated_local_port: u16,
    pub monitor_link: String,
}

impl ParsedEndpoint {
    fn new(protocol: ProtocolFamily, link: &str, server: String, port: u16) -> Self {
        Self {
            protocol,
            link: link.to_string(),
            user_id: String::new(),
            server,
            port,
            security: String::new(),
            transport_type: String::new(),
            header_type: String::new(),
            flow: String::new(),
            path: String::new(),
            host: String::new(),
            sni: String::new(),
            fingerprint: String::new(),
            public_key: String::new(),
            short_id: String::new(),
            display_name: String::new(),
            cipher_method: String::new(),
            allocated_local_port: 0,
            monitor_link: String::new(),
        }
    }
}

/// Parse a proxy link into a structured endpoint
pub fn parse_link(link: &str) -> Result<ParsedEndpoint> {
    let url = Url::parse(link)?;

    let family = ProtocolFamily::from_scheme(url.scheme())
        .ok_or_else(|| CheckerError::UnsupportedScheme(url.scheme().to_string()))?;

    let server = url
        .host_str()
        .ok_or_else(|| CheckerError::ParseLink("link has no host".to_string()))?
        .to_string();

    // No default-port inference: an omitted port is ambiguous, notably for
    // IPv6 literals, and rejected outright.
    let port = url
        .port()
        .ok_or_else(|| CheckerError::ParseLink("link has no explicit port".to_string()))?;

    let mut endpoint = ParsedEndpoint::new(family, link, server, port);

    if let Some(fragment) = url.fragment() {
        endpoint.display_name = urlencoding::decode(fragment)
            .map_err(|e| CheckerError::ParseLink(format!("invalid fragment encoding: {}", e)))?
            .into_owned();
    }

    let user_info = urlencoding::decode(url.username())
        .map_err(|e| CheckerError::ParseLink(format!("invalid userinfo encoding: {}", e)))?
        .into_owned();

    let query = |key: &str| -> String {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default()
    };

    match family {
        ProtocolFamily::Vless | ProtocolFamily::Trojan => {
            if user_info.is_empty() {
                return Err(CheckerError::ParseLink(
                    "link has no user identifier".to_string(),
                ));
            }
            endpoint.user_id = user_info;
            endpoint.security = query("security");
            endpoint.transport_type = query("type");
            endpoint.header_type = query("headerType");
            endpoint.path = query("path");
            endpoint.host = query("host");
            endpoint.sni = query("sni");
            endpoint.fingerprint = query("fp");

            if family == ProtocolFamily::Vless {
                endpoint.flow = query("flow");
                endpoint.public_key = query("pbk");
                endpoint.short_id = query("sid");
            }
        }
        ProtocolFamily::Shadowsocks => {
            let decoded = decode_ss_user_info(&user_info)?;
            let mut parts = decoded.splitn(3, ':');
            let method = parts.next().unwrap_or_default();
            let secret = parts.next().unwrap_or_default();
            if method.is_empty() || secret.is_empty() || parts.next().is_some() {
                return Err(CheckerError::ParseLink(
                    "shadowsocks userinfo must be base64(method:secret)".to_string(),
                ));
            }
            endpoint.cipher_method = method.to_string();
            endpoint.user_id = secret.to_string();
        }
    }

    Ok(endpoint)
}

/// Decode the base64 userinfo of an `ss://` link.
///
/// Links in the wild carry both padded and unpadded encodings.
fn decode_ss_user_info(user_info: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(user_info)
        .or_else(|_| STANDARD_NO_PAD.decode(user_info))
        .map_err(|e| CheckerError::ParseLink(format!("invalid shadowsocks base64: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|_| CheckerError::ParseLink("shadowsocks userinfo is not UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    #[test]
    fn test_parse_vless_round_trip() {
        let link = "vless://9a6b1b2c@proxy.example.com:443\
                    ?security=reality&type=tcp&headerType=none&flow=xtls-rprx-vision\
                    &path=%2Fws&host=cdn.example.com&sni=example.com&fp=chrome\
                    &pbk=publickey123&sid=01ab#My%20Node";
        let endpoint = parse_link(link).unwrap();

        assert_eq!(endpoint.protocol, ProtocolFamily::Vless);
        assert_eq!(endpoint.user_id, "9a6b1b2c");
        assert_eq!(endpoint.server, "proxy.example.com");
        assert_eq!(endpoint.port, 443);
        assert_eq!(endpoint.security, "reality");
        assert_eq!(endpoint.transport_type, "tcp");
        assert_eq!(endpoint.header_type, "none");
        assert_eq!(endpoint.flow, "xtls-rprx-vision");
        assert_eq!(endpoint.path, "/ws");
        assert_eq!(endpoint.host, "cdn.example.com");
        assert_eq!(endpoint.sni, "example.com");
        assert_eq!(endpoint.fingerprint, "chrome");
        assert_eq!(endpoint.public_key, "publickey123");
        assert_eq!(endpoint.short_id, "01ab");
        assert_eq!(endpoint.display_name, "My Node");
        assert_eq!(endpoint.link, link);
    }

    #[test]
    fn test_parse_trojan_round_trip() {
        let link = "trojan://secretpw@t.example.com:8443\
                    ?security=tls&type=ws&headerType=none&path=%2Ftunnel\
                    &host=t.example.com&sni=t.example.com&fp=firefox#Trojan%20Node";
        let endpoint = parse_link(link).unwrap();

        assert_eq!(endpoint.protocol, ProtocolFamily::Trojan);
        assert_eq!(endpoint.user_id, "secretpw");
        assert_eq!(endpoint.server, "t.example.com");
        assert_eq!(endpoint.port, 8443);
        assert_eq!(endpoint.security, "tls");
        assert_eq!(endpoint.transport_type, "ws");
        assert_eq!(endpoint.path, "/tunnel");
        assert_eq!(endpoint.display_name, "Trojan Node");
        // trojan links have no flow/pbk/sid
        assert!(endpoint.flow.is_empty());
        assert!(endpoint.public_key.is_empty());
        assert!(endpoint.short_id.is_empty());
    }

    #[test]
    fn test_parse_shadowsocks() {
        let user_info = STANDARD.encode("aes-256-gcm:secret");
        let link = format!("ss://{}@ss.example.com:1234#name", user_info);
        let endpoint = parse_link(&link).unwrap();

        assert_eq!(endpoint.protocol, ProtocolFamily::Shadowsocks);
        assert_eq!(endpoint.cipher_method, "aes-256-gcm");
        assert_eq!(endpoint.user_id, "secret");
        assert_eq!(endpoint.server, "ss.example.com");
        assert_eq!(endpoint.port, 1234);
        assert_eq!(endpoint.display_name, "name");
    }

    #[test]
    fn test_parse_shadowsocks_unpadded_base64() {
        let user_info = STANDARD.encode("chacha20-ietf-poly1305:pw1234");
        let user_info = user_info.trim_end_matches('=').to_string();
        let link = format!("ss://{}@ss.example.com:8388#n", user_info);
        let endpoint = parse_link(&link).unwrap();

        assert_eq!(endpoint.cipher_method, "chacha20-ietf-poly1305");
        assert_eq!(endpoint.user_id, "pw1234");
    }

    #[test]
    fn test_parse_shadowsocks_rejects_bad_base64() {
        let err = parse_link("ss://@@@not-base64@ss.example.com:1234#n").unwrap_err();
        assert!(matches!(err, CheckerError::ParseLink(_)));
    }

    #[test]
    fn test_parse_shadowsocks_rejects_missing_separator() {
        let user_info = STANDARD.encode("justonepart");
        let link = format!("ss://{}@ss.example.com:1234#n", user_info);
        let err = parse_link(&link).unwrap_err();
        assert!(matches!(err, CheckerError::ParseLink(_)));
    }

    #[test]
    fn test_parse_shadowsocks_rejects_extra_separator() {
        let user_info = STANDARD.encode("method:secret:extra");
        let link = format!("ss://{}@ss.example.com:1234#n", user_info);
        let err = parse_link(&link).unwrap_err();
        assert!(matches!(err, CheckerError::ParseLink(_)));
    }

    #[test]
    fn test_parse_rejects_missing_port() {
        let err = parse_link("vless://uid@example.com?security=tls#n").unwrap_err();
        assert!(matches!(err, CheckerError::ParseLink(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        let err = parse_link("vmess://uid@example.com:443#n").unwrap_err();
        assert!(matches!(err, CheckerError::UnsupportedScheme(_)));
    }

    #[test]
    fn test_parse_rejects_malformed_uri() {
        let err = parse_link("not a uri at all").unwrap_err();
        assert!(matches!(err, CheckerError::ParseLink(_)));
    }

    #[test]
    fn test_parse_rejects_empty_user() {
        let err = parse_link("vless://example.com:443#n").unwrap_err();
        assert!(matches!(err, CheckerError::ParseLink(_)));
    }

    #[test]
    fn test_family_normalization() {
        assert_eq!(
            ProtocolFamily::from_scheme("ss"),
            Some(ProtocolFamily::Shadowsocks)
        );
        assert_eq!(ProtocolFamily::Shadowsocks.as_str(), "shadowsocks");
        assert_eq!(ProtocolFamily::from_scheme("socks5"), None);
    }
}
