//! For middleware documentation, see [`AccessControl`].

use std::{fmt, sync::Arc};

use actix_service::{Service, Transform, forward_ready};
use actix_utils::future::{Ready, ready};
use actix_web::{
    Error, HttpRequest, HttpResponse,
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header,
};
use futures_core::future::LocalBoxFuture;

use crate::{Snapshot, TrustedIps, rewrite_headers::socket_peer_addr};

type Responder = dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync;

/// How responses to blocked requests are produced.
#[derive(Clone)]
enum BlockedResponse {
    /// Plain text 403 response containing the blocked message.
    Message,

    /// Operator-supplied response producer.
    Custom(Arc<Responder>),
}

/// Response policy for requests that do not originate from a trusted network.
///
/// By default, blocked requests receive:
///
/// ```text
/// HTTP/1.1 403 Forbidden
/// content-type: text/plain
///
/// Forbidden
/// ```
///
/// # Examples
/// ```
/// use actix_web::{HttpResponse, http::header};
/// use actix_cloudflare_gate::DenialPolicy;
///
/// // customize the message of the default response
/// let policy = DenialPolicy::default().blocked_message("Go away");
///
/// // or replace the response entirely
/// let policy = DenialPolicy::default().blocked_response(|_req| {
///     HttpResponse::MovedPermanently()
///         .insert_header((header::LOCATION, "https://example.com"))
///         .finish()
/// });
/// ```
#[derive(Clone)]
pub struct DenialPolicy {
    message: String,
    response: BlockedResponse,
}

impl DenialPolicy {
    /// Sets message used in the body of the default blocked response.
    ///
    /// Has no effect on responses from a custom [`blocked_response`](Self::blocked_response)
    /// producer.
    pub fn blocked_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Sets a producer for blocked responses, replacing the default message response.
    ///
    /// The producer must not panic; panics are not caught by this crate.
    pub fn blocked_response<F>(mut self, responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
    {
        self.response = BlockedResponse::Custom(Arc::new(responder));
        self
    }

    /// Restores the default message response.
    pub fn default_response(mut self) -> Self {
        self.response = BlockedResponse::Message;
        self
    }

    /// Returns the blocked message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Produces the response for a blocked request.
    pub fn respond(&self, req: &HttpRequest) -> HttpResponse {
        match &self.response {
            BlockedResponse::Message => HttpResponse::Forbidden()
                .insert_header((header::CONTENT_TYPE, "text/plain"))
                .body(format!("{}\n", self.message)),

            BlockedResponse::Custom(responder) => responder(req),
        }
    }
}

impl Default for DenialPolicy {
    fn default() -> Self {
        Self {
            message: "Forbidden".to_owned(),
            response: BlockedResponse::Message,
        }
    }
}

impl fmt::Debug for DenialPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let response = match self.response {
            BlockedResponse::Message => "Message",
            BlockedResponse::Custom(_) => "Custom",
        };

        f.debug_struct("DenialPolicy")
            .field("message", &self.message)
            .field("response", &response)
            .finish()
    }
}

/// Middleware that rejects requests whose peer address is not in a trusted network.
///
/// Only the socket-level peer address is considered; no request headers are consulted. Requests
/// from trusted peers are passed to the wrapped service untouched. Other requests, including those
/// with no known peer address, are answered according to the [`DenialPolicy`] without calling the
/// wrapped service.
///
/// If [`RewriteHeaders`](crate::RewriteHeaders) has already run, the connection address it
/// recorded is checked instead of the rewritten peer address, so the two middleware can be
/// registered in either order.
///
/// Both the trusted IPs and the policy are loaded once per request from their [`Snapshot`]s, so
/// they can be replaced while the server is running.
///
/// # Examples
/// ```
/// use actix_web::App;
/// use actix_cloudflare_gate::{AccessControl, DenialPolicy, TrustedIps};
///
/// App::new().wrap(AccessControl::new(TrustedIps::cloudflare()))
///     # ;
///
/// App::new().wrap(
///     AccessControl::new(TrustedIps::cloudflare())
///         .policy(DenialPolicy::default().blocked_message("Go away")),
/// )
///     # ;
/// ```
#[derive(Debug, Clone)]
pub struct AccessControl {
    trusted_ips: Snapshot<TrustedIps>,
    policy: Snapshot<DenialPolicy>,
}

impl AccessControl {
    /// Constructs new access control middleware with the default denial policy.
    pub fn new(trusted_ips: impl Into<Snapshot<TrustedIps>>) -> Self {
        Self {
            trusted_ips: trusted_ips.into(),
            policy: Snapshot::default(),
        }
    }

    /// Sets the policy used to respond to blocked requests.
    ///
    /// Pass a cloned [`Snapshot`] to keep the ability to change the policy at runtime.
    pub fn policy(mut self, policy: impl Into<Snapshot<DenialPolicy>>) -> Self {
        self.policy = policy.into();
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for AccessControl
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AccessControlMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessControlMiddleware {
            service,
            trusted_ips: self.trusted_ips.clone(),
            policy: self.policy.clone(),
        }))
    }
}

/// Middleware service implementation for [`AccessControl`].
#[doc(hidden)]
#[allow(missing_debug_implementations)]
pub struct AccessControlMiddleware<S> {
    service: S,
    trusted_ips: Snapshot<TrustedIps>,
    policy: Snapshot<DenialPolicy>,
}

impl<S, B> Service<ServiceRequest> for AccessControlMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let peer_addr = socket_peer_addr(&req, req.peer_addr());

        if self.trusted_ips.load().contains_peer(peer_addr) {
            let fut = self.service.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
        }

        tracing::debug!(?peer_addr, "blocking request from untrusted network");

        let (req, _pl) = req.into_parts();
        let res = self.policy.load().respond(&req);

        Box::pin(ready(Ok(ServiceResponse::new(req, res).map_into_right_body())))
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{
        App,
        body::MessageBody,
        dev::ServiceFactory,
        http::{StatusCode, header::HeaderValue},
        test::{self, TestRequest},
        web,
    };

    use super::*;

    fn test_app(
        mw: AccessControl,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Response = ServiceResponse<impl MessageBody>,
            Config = (),
            InitError = (),
            Error = Error,
        >,
    > {
        App::new()
            .wrap(mw)
            .route("/", web::get().to(|| async { "success" }))
    }

    fn req_from(peer: &str) -> TestRequest {
        TestRequest::default().peer_addr(peer.parse().unwrap())
    }

    #[actix_web::test]
    async fn blocks_untrusted_network() {
        let app = test::init_service(test_app(AccessControl::new(TrustedIps::cloudflare()))).await;

        let res = test::call_service(&app, req_from("127.0.0.1:27432").to_request()).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(res.headers().len(), 1);
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            HeaderValue::from_static("text/plain"),
        );
        assert_eq!(test::read_body(res).await, "Forbidden\n");
    }

    #[actix_web::test]
    async fn grants_trusted_network() {
        let app = test::init_service(test_app(AccessControl::new(TrustedIps::cloudflare()))).await;

        let res = test::call_service(&app, req_from("103.21.244.1:27432").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(test::read_body(res).await, "success");

        let res = test::call_service(&app, req_from("[2606:4700::6810:84e5]:443").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn blocks_unknown_peer() {
        let app = test::init_service(test_app(AccessControl::new(TrustedIps::cloudflare()))).await;

        let res = test::call_service(&app, TestRequest::default().to_request()).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn ignores_forwarding_headers() {
        let app = test::init_service(test_app(AccessControl::new(TrustedIps::cloudflare()))).await;

        let req = req_from("127.0.0.1:27432")
            .insert_header(("CF-Connecting-IP", "103.21.244.1"))
            .insert_header((header::X_FORWARDED_FOR, "103.21.244.1"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn custom_message() {
        let mw = AccessControl::new(TrustedIps::cloudflare())
            .policy(DenialPolicy::default().blocked_message("Go away"));
        let app = test::init_service(test_app(mw)).await;

        let res = test::call_service(&app, req_from("127.0.0.1:27432").to_request()).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            HeaderValue::from_static("text/plain"),
        );
        assert_eq!(test::read_body(res).await, "Go away\n");
    }

    #[actix_web::test]
    async fn custom_response() {
        let mw = AccessControl::new(TrustedIps::cloudflare()).policy(
            DenialPolicy::default()
                .blocked_message("ignored")
                .blocked_response(|_req| {
                    HttpResponse::MovedPermanently()
                        .insert_header((header::LOCATION, "https://somewhere.else.xyz"))
                        .body("Bye bye\n")
                }),
        );
        let app = test::init_service(test_app(mw)).await;

        let res = test::call_service(&app, req_from("127.0.0.1:27432").to_request()).await;
        assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(res.headers().len(), 1);
        assert_eq!(
            res.headers().get(header::LOCATION).unwrap(),
            HeaderValue::from_static("https://somewhere.else.xyz"),
        );
        assert_eq!(test::read_body(res).await, "Bye bye\n");
    }

    #[actix_web::test]
    async fn message_change_applies_without_rebuild() {
        let policy = Snapshot::new(DenialPolicy::default());
        let mw = AccessControl::new(TrustedIps::cloudflare()).policy(policy.clone());
        let app = test::init_service(test_app(mw)).await;

        let res = test::call_service(&app, req_from("127.0.0.1:27432").to_request()).await;
        assert_eq!(test::read_body(res).await, "Forbidden\n");

        policy.update(|policy| policy.clone().blocked_message("Go away"));

        let res = test::call_service(&app, req_from("127.0.0.1:27432").to_request()).await;
        assert_eq!(test::read_body(res).await, "Go away\n");
    }

    #[actix_web::test]
    async fn trusted_ips_swap_applies_without_rebuild() {
        let trusted_ips = Snapshot::new(TrustedIps::cloudflare());
        let app = test::init_service(test_app(AccessControl::new(trusted_ips.clone()))).await;

        let res = test::call_service(&app, req_from("10.0.1.1:27432").to_request()).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        trusted_ips.update(|ips| ips.clone().with_ip_range("10.0.1.0/24".parse().unwrap()));

        let res = test::call_service(&app, req_from("10.0.1.1:27432").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[test]
    fn default_policy_response() {
        let req = TestRequest::default().to_http_request();
        let res = DenialPolicy::default().respond(&req);

        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(res.headers().len(), 1);

        let body = res.into_body().try_into_bytes().unwrap();
        assert_eq!(body, "Forbidden\n");
    }

    #[test]
    fn restore_default_response() {
        let policy = DenialPolicy::default()
            .blocked_response(|_req| HttpResponse::NotFound().finish())
            .default_response();

        let req = TestRequest::default().to_http_request();
        assert_eq!(policy.respond(&req).status(), StatusCode::FORBIDDEN);
    }
}
