use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use std::net::SocketAddr;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client address used as the rate-limit key. Proxy headers are honoured only
/// when `trust_proxy_headers` is set; the first `x-forwarded-for` hop wins.
pub fn extract_real_ip(
    headers: &HeaderMap,
    connect_info: &ConnectInfo<SocketAddr>,
    trust_proxy_headers: bool,
) -> String {
    if trust_proxy_headers {
        if let Some(cf_ip) = header(headers, "cf-connecting-ip") {
            return cf_ip.to_string();
        }

        if let Some(first) = header(headers, "x-forwarded-for").and_then(|xff| xff.split(',').next()) {
            let ip = first.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }

        if let Some(real_ip) = header(headers, "x-real-ip") {
            return real_ip.to_string();
        }
    }

    connect_info.0.ip().to_string()
}
