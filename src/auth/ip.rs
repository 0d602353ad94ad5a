//! Client IP extraction utilities.

use std::net::{IpAddr, SocketAddr};

use axum::{extract::ConnectInfo, http::request::Parts};

/// Header consulted when running behind a trusted reverse proxy.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Extract the client IP address.
///
/// With `trust_proxy`, the first address of `X-Forwarded-For` wins. Does NOT
/// fall back to the socket address when the header is present but invalid.
/// Otherwise uses the SocketAddr from ConnectInfo.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    trust_proxy: bool,
) -> Result<IpAddr, &'static str> {
    if trust_proxy {
        if let Some(value) = source.headers().get(FORWARDED_FOR_HEADER) {
            let value = value
                .to_str()
                .map_err(|_| "IP header contains invalid characters")?;
            return value
                .split(',')
                .next()
                .map(str::trim)
                .ok_or("IP header is empty")?
                .parse()
                .map_err(|_| "IP header is not an address");
        }
    }

    source
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .ok_or("No client IP available")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    #[test]
    fn test_forwarded_for_first_hop() {
        let request = Request::builder()
            .header(FORWARDED_FOR_HEADER, "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(
            extract_client_ip(&request, true).unwrap(),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_forwarded_for_ignored_without_trust() {
        let request = Request::builder()
            .header(FORWARDED_FOR_HEADER, "203.0.113.7")
            .body(Body::empty())
            .unwrap();

        assert!(extract_client_ip(&request, false).is_err());
    }

    #[test]
    fn test_connect_info() {
        let mut request = Request::builder().body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo("192.0.2.1:4000".parse::<SocketAddr>().unwrap()));

        assert_eq!(
            extract_client_ip(&request, false).unwrap(),
            "192.0.2.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_invalid_forwarded_for() {
        let request = Request::builder()
            .header(FORWARDED_FOR_HEADER, "not-an-ip")
            .body(Body::empty())
            .unwrap();

        assert!(extract_client_ip(&request, true).is_err());
    }
}
