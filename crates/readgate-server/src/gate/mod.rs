//! Access gate: client network allow-list, then the shared API key.

mod allow_list;
mod middleware;

pub use allow_list::{AllowList, IpNetwork};
pub use middleware::gate_middleware;

use axum::http::HeaderMap;
use std::net::IpAddr;
use subtle::ConstantTimeEq;

use crate::config::GatewayConfig;
use crate::error::GateRejection;

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Request authorization against the configured secret and allow-list
#[derive(Clone)]
pub struct AccessGate {
    api_key: Vec<u8>,
    allow_list: AllowList,
}

impl AccessGate {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            api_key: config.api_key().as_bytes().to_vec(),
            allow_list: config.allow_list().clone(),
        }
    }

    /// Authorize a request from its headers and TCP peer address.
    ///
    /// The network check runs first and only when the allow-list is not
    /// empty. It fails closed on a missing or unparseable client address.
    pub fn authorize(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Result<(), GateRejection> {
        if !self.allow_list.is_empty() {
            let ip = client_ip(headers, peer)?;
            if !self.allow_list.contains(ip) {
                return Err(GateRejection::IpNotAllowed(ip));
            }
        }

        let provided = headers
            .get(API_KEY_HEADER)
            .map(|value| value.as_bytes())
            .unwrap_or_default();

        if provided.is_empty() || !bool::from(provided.ct_eq(&self.api_key)) {
            return Err(GateRejection::Unauthorized);
        }

        Ok(())
    }
}

/// Client address: first `X-Forwarded-For` entry when the header is
/// present, otherwise the TCP peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Result<IpAddr, GateRejection> {
    if let Some(forwarded) = headers.get(FORWARDED_FOR_HEADER) {
        let first = forwarded
            .to_str()
            .ok()
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .unwrap_or_default();

        if first.is_empty() {
            return Err(GateRejection::MissingClientIp);
        }

        return first
            .parse::<IpAddr>()
            .map(|ip| ip.to_canonical())
            .map_err(|_| GateRejection::InvalidClientIp(first.to_string()));
    }

    peer.map(|ip| ip.to_canonical())
        .ok_or(GateRejection::MissingClientIp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use readgate_query::Backend;

    fn gate(allow: &str) -> AccessGate {
        let config = GatewayConfig::new(
            Backend::Postgres,
            "test-key",
            AllowList::parse(allow).unwrap(),
        )
        .unwrap();
        AccessGate::new(&config)
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn peer(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn test_api_key_required() {
        let gate = gate("");
        assert_eq!(
            gate.authorize(&HeaderMap::new(), peer("127.0.0.1")),
            Err(GateRejection::Unauthorized)
        );
        assert_eq!(
            gate.authorize(&headers(&[("x-api-key", "wrong")]), peer("127.0.0.1")),
            Err(GateRejection::Unauthorized)
        );
        assert_eq!(
            gate.authorize(&headers(&[("x-api-key", "test-key-longer")]), None),
            Err(GateRejection::Unauthorized)
        );
        assert_eq!(
            gate.authorize(&headers(&[("x-api-key", "test-key")]), None),
            Ok(())
        );
    }

    #[test]
    fn test_header_name_is_case_insensitive() {
        let gate = gate("");
        let mut map = HeaderMap::new();
        map.insert(
            axum::http::HeaderName::from_bytes(b"X-API-KEY").unwrap(),
            HeaderValue::from_static("test-key"),
        );
        assert_eq!(gate.authorize(&map, None), Ok(()));
    }

    #[test]
    fn test_allow_list_checked_before_key() {
        let gate = gate("10.0.0.0/8");
        assert_eq!(
            gate.authorize(&HeaderMap::new(), peer("192.168.1.1")),
            Err(GateRejection::IpNotAllowed("192.168.1.1".parse().unwrap()))
        );
        assert_eq!(
            gate.authorize(&HeaderMap::new(), peer("10.1.2.3")),
            Err(GateRejection::Unauthorized)
        );
        assert_eq!(
            gate.authorize(&headers(&[("x-api-key", "test-key")]), peer("10.1.2.3")),
            Ok(())
        );
    }

    #[test]
    fn test_forwarded_for_takes_precedence() {
        let gate = gate("203.0.113.0/24");
        let h = headers(&[
            ("x-api-key", "test-key"),
            ("x-forwarded-for", "203.0.113.9, 10.0.0.1"),
        ]);
        assert_eq!(gate.authorize(&h, peer("192.168.1.1")), Ok(()));

        let h = headers(&[("x-api-key", "test-key"), ("x-forwarded-for", "10.0.0.1")]);
        assert!(matches!(
            gate.authorize(&h, peer("203.0.113.9")),
            Err(GateRejection::IpNotAllowed(_))
        ));
    }

    #[test]
    fn test_fails_closed_without_client_ip() {
        let gate = gate("10.0.0.0/8");
        let key = ("x-api-key", "test-key");

        assert_eq!(
            gate.authorize(&headers(&[key]), None),
            Err(GateRejection::MissingClientIp)
        );
        assert_eq!(
            gate.authorize(&headers(&[key, ("x-forwarded-for", "not-an-ip")]), peer("10.0.0.1")),
            Err(GateRejection::InvalidClientIp("not-an-ip".to_string()))
        );
        assert_eq!(
            gate.authorize(&headers(&[key, ("x-forwarded-for", " ")]), peer("10.0.0.1")),
            Err(GateRejection::MissingClientIp)
        );
    }

    #[test]
    fn test_empty_allow_list_skips_ip_check() {
        let gate = gate("");
        let h = headers(&[("x-api-key", "test-key"), ("x-forwarded-for", "garbage")]);
        assert_eq!(gate.authorize(&h, None), Ok(()));
    }
}
