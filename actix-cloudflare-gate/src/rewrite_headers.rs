//! For middleware documentation, see [`RewriteHeaders`].

use std::{fmt, net::SocketAddr};

use actix_service::{Service, Transform, forward_ready};
use actix_utils::future::{Ready, ready};
use actix_web::{
    Error, HttpMessage,
    dev::{ConnectionInfo, ServiceRequest, ServiceResponse},
    http::header::{self, Header as _, HeaderMap, HeaderName, HeaderValue},
};

use crate::{CfConnectingIp, Snapshot, TrustedIps};

/// Default header name for the backed up peer address.
#[allow(clippy::declare_interior_mutable_const)]
pub const ORIGINAL_REMOTE_ADDR: HeaderName = HeaderName::from_static("original-remote-addr");

/// Default header name for the backed up `X-Forwarded-For` value.
#[allow(clippy::declare_interior_mutable_const)]
pub const ORIGINAL_FORWARDED_FOR: HeaderName = HeaderName::from_static("original-forwarded-for");

/// Socket-level peer address of a request whose peer address was rewritten.
///
/// Inserted into request extensions by [`RewriteHeaders`] so that trust decisions made later in the
/// middleware chain (by [`AccessControl`](crate::AccessControl) or
/// [`TrustedClientIp`](crate::TrustedClientIp)) are still based on the actual connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyPeerAddr(pub SocketAddr);

/// Returns the address of the connection a request arrived on, even if its peer address was
/// rewritten.
pub(crate) fn socket_peer_addr(
    msg: &impl HttpMessage,
    peer_addr: Option<SocketAddr>,
) -> Option<SocketAddr> {
    msg.extensions()
        .get::<ProxyPeerAddr>()
        .map(|addr| addr.0)
        .or(peer_addr)
}

/// Configuration for [`RewriteHeaders`].
///
/// # Examples
/// ```
/// use actix_web::http::header::HeaderName;
/// use actix_cloudflare_gate::RewriteConfig;
///
/// let config = RewriteConfig::default()
///     .original_remote_addr(HeaderName::from_static("backup-remote-addr"))
///     .original_forwarded_for(HeaderName::from_static("backup-forwarded-for"));
///
/// let config = RewriteConfig::default().backup(false);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteConfig {
    backup: bool,
    original_remote_addr: HeaderName,
    original_forwarded_for: HeaderName,
}

impl RewriteConfig {
    /// Sets whether the original peer address and `X-Forwarded-For` value are preserved when
    /// rewriting.
    ///
    /// Enabled by default.
    pub fn backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    /// Sets header name that receives the original peer address.
    ///
    /// Defaults to [`ORIGINAL_REMOTE_ADDR`].
    pub fn original_remote_addr(mut self, name: HeaderName) -> Self {
        self.original_remote_addr = name;
        self
    }

    /// Sets header name that receives the original `X-Forwarded-For` value.
    ///
    /// Defaults to [`ORIGINAL_FORWARDED_FOR`].
    pub fn original_forwarded_for(mut self, name: HeaderName) -> Self {
        self.original_forwarded_for = name;
        self
    }
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            backup: true,
            original_remote_addr: ORIGINAL_REMOTE_ADDR,
            original_forwarded_for: ORIGINAL_FORWARDED_FOR,
        }
    }
}

/// Restores the client address of a request proxied through a trusted network.
///
/// Returns true if the request was rewritten. See [`RewriteHeaders`] for the exact changes made.
///
/// Requests are left untouched when the peer address is not trusted or when the
/// `CF-Connecting-IP` header is absent or does not contain a valid IP address.
pub fn rewrite_request(
    req: &mut ServiceRequest,
    trusted_ips: &TrustedIps,
    config: &RewriteConfig,
) -> bool {
    let Some(socket_addr) = socket_peer_addr(&*req, req.peer_addr()) else {
        return false;
    };

    if !trusted_ips.contains(socket_addr.ip()) {
        return false;
    }

    let client_ip = match CfConnectingIp::parse(&*req) {
        Ok(hdr) => hdr.ip(),
        Err(_) => {
            tracing::debug!(%socket_addr, "trusted peer did not send a valid cf-connecting-ip");
            return false;
        }
    };

    let prev_ip = req.peer_addr().unwrap_or(socket_addr).ip().to_canonical();
    let headers = req.headers_mut();

    if config.backup {
        headers.insert(config.original_remote_addr.clone(), ip_header_value(prev_ip));

        match joined_header_value(headers, &header::X_FORWARDED_FOR) {
            Some(fwd_for) => {
                headers.insert(config.original_forwarded_for.clone(), fwd_for);
            }
            None => {
                headers.remove(&config.original_forwarded_for);
            }
        }
    }

    // previous chain is intentionally discarded
    headers.insert(
        header::X_FORWARDED_FOR,
        ip_header_value(format_args!("{client_ip}, {prev_ip}")),
    );

    // the client's port is not known
    req.head_mut().peer_addr = Some(SocketAddr::new(client_ip, 0));

    let mut ext = req.extensions_mut();

    if !ext.contains::<ProxyPeerAddr>() {
        ext.insert(ProxyPeerAddr(socket_addr));
    }

    // connection info may have been computed from the old peer address
    ext.remove::<ConnectionInfo>();
    drop(ext);

    tracing::trace!(%client_ip, %prev_ip, "restored client address");

    true
}

/// Joins all lines of a header into one comma separated value, as if it was sent on one line.
///
/// Returns `None` if the header is absent.
fn joined_header_value(headers: &HeaderMap, name: &HeaderName) -> Option<HeaderValue> {
    if !headers.contains_key(name) {
        return None;
    }

    let joined = headers
        .get_all(name)
        .map(HeaderValue::as_bytes)
        .collect::<Vec<_>>()
        .join(&b", "[..]);

    HeaderValue::from_bytes(&joined).ok()
}

/// Formats a value made only of IP addresses and separators.
fn ip_header_value(val: impl fmt::Display) -> HeaderValue {
    HeaderValue::try_from(val.to_string())
        .expect("IP addresses are always valid header values")
}

/// Middleware that restores the client address of requests proxied through a trusted network.
///
/// Requests whose socket-level peer address is in the trusted set and which carry a valid
/// `CF-Connecting-IP` header are changed as follows:
///
/// 1. If backups are enabled (see [`RewriteConfig`]), the peer IP is copied to the
///    `original-remote-addr` header and the current `X-Forwarded-For` value is copied to the
///    `original-forwarded-for` header (which is removed if `X-Forwarded-For` was absent). An
///    `X-Forwarded-For` header sent on several lines is backed up as one comma separated value.
///    IPv4-mapped IPv6 peer addresses are written in their IPv4 form.
/// 1. The peer address is replaced by the `CF-Connecting-IP` address (with port 0).
/// 1. `X-Forwarded-For` is set to `<client IP>, <previous peer IP>`. Any previous chain is not
///    carried over.
///
/// `CF-Connecting-IP` itself is left in place and the connection's address is recorded as a
/// [`ProxyPeerAddr`] request extension. All other requests pass through untouched.
///
/// After the rewrite, [`HttpRequest::peer_addr`](actix_web::HttpRequest::peer_addr) and
/// [`ConnectionInfo::realip_remote_addr`] both report the client's address.
///
/// This middleware does not reject anything; combine with [`AccessControl`](crate::AccessControl)
/// to also block requests that bypass the trusted network.
///
/// # Examples
/// ```
/// use actix_web::App;
/// use actix_cloudflare_gate::{RewriteConfig, RewriteHeaders, TrustedIps};
///
/// App::new().wrap(RewriteHeaders::new(TrustedIps::cloudflare()))
///     # ;
///
/// App::new().wrap(
///     RewriteHeaders::new(TrustedIps::cloudflare()).config(RewriteConfig::default().backup(false)),
/// )
///     # ;
/// ```
#[derive(Debug, Clone)]
pub struct RewriteHeaders {
    trusted_ips: Snapshot<TrustedIps>,
    config: Snapshot<RewriteConfig>,
}

impl RewriteHeaders {
    /// Constructs new header rewriting middleware with the default configuration.
    pub fn new(trusted_ips: impl Into<Snapshot<TrustedIps>>) -> Self {
        Self {
            trusted_ips: trusted_ips.into(),
            config: Snapshot::default(),
        }
    }

    /// Sets rewrite configuration.
    pub fn config(mut self, config: impl Into<Snapshot<RewriteConfig>>) -> Self {
        self.config = config.into();
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RewriteHeaders
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RewriteHeadersMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RewriteHeadersMiddleware {
            service,
            trusted_ips: self.trusted_ips.clone(),
            config: self.config.clone(),
        }))
    }
}

/// Middleware service implementation for [`RewriteHeaders`].
#[doc(hidden)]
#[allow(missing_debug_implementations)]
pub struct RewriteHeadersMiddleware<S> {
    service: S,
    trusted_ips: Snapshot<TrustedIps>,
    config: Snapshot<RewriteConfig>,
}

impl<S, B> Service<ServiceRequest> for RewriteHeadersMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = S::Future;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        rewrite_request(&mut req, &self.trusted_ips.load(), &self.config.load());
        self.service.call(req)
    }
}
