//! Serves an app that only accepts traffic from Cloudflare and sees real client addresses.
//!
//! Local addresses are trusted too so the example can be tried with, e.g.:
//!
//! ```console
//! $ curl -H 'CF-Connecting-IP: 1.2.3.4' http://127.0.0.1:8080/
//! ```

use actix_cloudflare_gate::{AccessControl, DenialPolicy, RewriteHeaders, Snapshot, TrustedIps};
use actix_web::{App, HttpRequest, HttpServer, Responder, get};

#[get("/")]
async fn index(req: HttpRequest) -> impl Responder {
    let conn_info = req.connection_info();

    format!(
        "client: {}\nx-forwarded-for: {:?}\n",
        conn_info.realip_remote_addr().unwrap_or("unknown"),
        req.headers().get("x-forwarded-for"),
    )
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let trusted_ips = Snapshot::new(
        TrustedIps::cloudflare()
            .with_ip_range("127.0.0.0/8".parse().unwrap())
            .with_ip_range("::1/128".parse().unwrap()),
    );

    let policy =
        Snapshot::new(DenialPolicy::default().blocked_message("Direct access is not allowed"));

    tracing::info!("starting HTTP server at http://localhost:8080");

    HttpServer::new(move || {
        App::new()
            .wrap(RewriteHeaders::new(trusted_ips.clone()))
            .wrap(AccessControl::new(trusted_ips.clone()).policy(policy.clone()))
            .service(index)
    })
    .bind(("127.0.0.1", 8080))?
    .workers(2)
    .run()
    .await
}
