use std::net::IpAddr;

use actix_cloudflare_gate::{CF_IPS_VERSION, TrustedIps, fetch_trusted_cf_ips};

#[actix_web::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let ips = fetch_trusted_cf_ips().await.unwrap();
    let embedded = TrustedIps::cloudflare();

    if ips == embedded {
        println!("published ranges match embedded list ({CF_IPS_VERSION})");
    } else {
        println!("published ranges differ from embedded list ({CF_IPS_VERSION})");
        dbg!(ips.ipv4_ranges(), ips.ipv6_ranges());
    }

    for ip in [
        IpAddr::from([103, 21, 243, 0]),
        IpAddr::from([103, 21, 244, 0]),
        IpAddr::from([103, 21, 247, 255]),
        IpAddr::from([103, 21, 248, 0]),
    ] {
        println!("{ip}: {}", ips.contains(ip));
    }
}
