use std::net::IpAddr;

use actix_web::{
    HttpMessage, error,
    http::header::{Header, HeaderName, HeaderValue, InvalidHeaderValue, TryIntoHeaderValue},
};

/// Cloudflare's `cf-connecting-ip` header name.
#[allow(clippy::declare_interior_mutable_const)]
pub const CF_CONNECTING_IP: HeaderName = HeaderName::from_static("cf-connecting-ip");

/// Header containing the client's IP address when a request is proxied through Cloudflare.
///
/// Any client can send this header; its value is only meaningful when the request's peer is a
/// trusted Cloudflare address. See [`TrustedClientIp`](crate::TrustedClientIp).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfConnectingIp(pub IpAddr);

impl CfConnectingIp {
    /// Returns client IP address.
    pub fn ip(&self) -> IpAddr {
        self.0
    }
}

impl_more::forward_display!(CfConnectingIp);

impl TryIntoHeaderValue for CfConnectingIp {
    type Error = InvalidHeaderValue;

    fn try_into_value(self) -> Result<HeaderValue, Self::Error> {
        HeaderValue::try_from(self.0.to_string())
    }
}

impl Header for CfConnectingIp {
    fn name() -> HeaderName {
        CF_CONNECTING_IP
    }

    fn parse<M: HttpMessage>(msg: &M) -> Result<Self, error::ParseError> {
        msg.headers()
            .get(Self::name())
            .and_then(|hdr| hdr.to_str().ok())
            .map(str::trim)
            .and_then(|hdr| hdr.parse().ok())
            .map(Self)
            .ok_or(error::ParseError::Header)
    }
}
