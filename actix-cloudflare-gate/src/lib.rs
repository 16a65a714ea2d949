//! Access control and client IP restoration for Actix Web apps served through Cloudflare.
//!
//! When an app sits behind Cloudflare, every connection arrives from a Cloudflare edge address and
//! the real client address is only available from the `CF-Connecting-IP` header. That header can be
//! sent by anyone, so it must only be believed when the connection itself comes from Cloudflare.
//!
//! This crate provides:
//! - [`TrustedIps`]: the set of trusted network ranges, with Cloudflare's published ranges built in.
//! - [`AccessControl`]: middleware that rejects requests not coming from a trusted network.
//! - [`RewriteHeaders`]: middleware that restores the client address (peer address and
//!   `X-Forwarded-For`) for requests from a trusted network, optionally keeping the originals.
//! - [`TrustedClientIp`]: extractor for a verified client IP.
//! - [`Snapshot`]: shared configuration that can be swapped atomically while serving.
//!
//! # Examples
//! ```
//! use actix_web::{App, HttpRequest, web};
//! use actix_cloudflare_gate::{AccessControl, RewriteHeaders, Snapshot, TrustedIps};
//!
//! let trusted_ips = Snapshot::new(TrustedIps::cloudflare());
//!
//! App::new()
//!     .wrap(RewriteHeaders::new(trusted_ips.clone()))
//!     .wrap(AccessControl::new(trusted_ips.clone()))
//!     .route(
//!         "/",
//!         web::get().to(|req: HttpRequest| async move {
//!             format!("hello {:?}", req.peer_addr().map(|addr| addr.ip()))
//!         }),
//!     )
//!     # ;
//! ```
//!
//! # Crate Features
//!
//! `fetch-ips` (default): Enables functionality to (asynchronously) fetch CloudFlare's trusted IP list from
//! their API. This feature includes `rustls` but if you prefer OpenSSL you can use it by disabling
//! default crate features and enabling `fetch-ips-openssl` instead.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod access_control;
mod extract;
mod fetch_cf_ips;
mod header;
mod rewrite_headers;
mod snapshot;
mod trusted_ips;

#[cfg(feature = "fetch-ips")]
pub use self::fetch_cf_ips::fetch_trusted_cf_ips;
pub use self::{
    access_control::{AccessControl, AccessControlMiddleware, DenialPolicy},
    extract::TrustedClientIp,
    fetch_cf_ips::{CfIpsResponse, CfIpsResult, FetchError, CF_URL_IPS},
    header::{CfConnectingIp, CF_CONNECTING_IP},
    rewrite_headers::{
        rewrite_request, ProxyPeerAddr, RewriteConfig, RewriteHeaders, RewriteHeadersMiddleware,
        ORIGINAL_FORWARDED_FOR, ORIGINAL_REMOTE_ADDR,
    },
    snapshot::Snapshot,
    trusted_ips::{TrustedIps, CF_IPS_VERSION},
};
