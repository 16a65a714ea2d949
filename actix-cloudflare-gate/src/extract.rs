use std::net::IpAddr;

use actix_utils::future::{Ready, err, ok};
use actix_web::{FromRequest, HttpRequest, dev, http::header::Header as _};

use crate::{CfConnectingIp, Snapshot, TrustedIps, rewrite_headers::socket_peer_addr};

fn bad_req(err: impl Into<String>) -> actix_web::error::Error {
    actix_web::error::ErrorBadRequest(format!("TrustedClientIp error: {}", err.into()))
}

/// Extractor for a client IP that has passed through Cloudflare and is verified as not spoofed.
///
/// For this extractor to work, there must be a [`Snapshot<TrustedIps>`] or a [`TrustedIps`]
/// instance in your app data.
///
/// Trust is decided from the address of the connection, so this also works behind
/// [`RewriteHeaders`](crate::RewriteHeaders).
#[derive(Debug, Clone)]
pub struct TrustedClientIp(pub IpAddr);

impl_more::forward_display!(TrustedClientIp);

impl FromRequest for TrustedClientIp {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _pl: &mut dev::Payload) -> Self::Future {
        let client_ip = match CfConnectingIp::parse(req) {
            Ok(hdr) => hdr.ip(),
            Err(_) => return err(bad_req("cf-connecting-ip header not present or invalid")),
        };

        let peer_addr = socket_peer_addr(req, req.peer_addr());

        let is_trusted = if let Some(ips) = req.app_data::<Snapshot<TrustedIps>>() {
            ips.load().contains_peer(peer_addr)
        } else if let Some(ips) = req.app_data::<TrustedIps>() {
            ips.contains_peer(peer_addr)
        } else {
            return err(bad_req("trusted IPs not in app data"));
        };

        if is_trusted {
            ok(Self(client_ip))
        } else {
            tracing::debug!(?peer_addr, "cf-connecting-ip read from untrusted peer");
            err(bad_req("cf-connecting-ip read from untrusted peer"))
        }
    }
}
