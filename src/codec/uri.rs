//! URL-shaped links: vless, trojan, hysteria2, tuic and socks5
//!
//! All of them follow `scheme://credential@server:port?params#name`.

use std::collections::HashMap;

use url::Url;

use super::fields::{non_empty, ProxyFields, ProxyType};
use super::ss::bracket_host;
use super::CodecError;
use crate::utils::base64::base64_decode;
use crate::utils::url::{url_decode, url_encode};

fn proxy_type_of(scheme: &str) -> Option<ProxyType> {
    match scheme {
        "vless" => Some(ProxyType::Vless),
        "trojan" => Some(ProxyType::Trojan),
        "hysteria2" | "hy2" => Some(ProxyType::Hysteria2),
        "tuic" => Some(ProxyType::Tuic),
        "socks" | "socks5" => Some(ProxyType::Socks5),
        _ => None,
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "True" | "TRUE")
}

/// Parse a URL-shaped proxy link
pub fn explode_uri(link: &str, scheme: &str) -> Result<ProxyFields, CodecError> {
    let proxy_type =
        proxy_type_of(scheme).ok_or_else(|| CodecError::UnsupportedScheme(scheme.to_string()))?;
    let url = Url::parse(link).map_err(|e| CodecError::malformed(scheme, e.to_string()))?;

    let server = url
        .host_str()
        .ok_or_else(|| CodecError::malformed(scheme, "missing server"))?
        .trim_matches(|c| c == '[' || c == ']')
        .to_string();
    let port = url
        .port()
        .ok_or_else(|| CodecError::malformed(scheme, "missing port"))?;
    let name = url.fragment().map(url_decode).unwrap_or_default();

    let params: HashMap<String, String> = url
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let param = |key: &str| params.get(key).cloned().and_then(non_empty);

    let user = url_decode(url.username());
    let pass = url.password().map(url_decode);

    let mut fields = ProxyFields::new(proxy_type, &name, &server, port);
    match proxy_type {
        ProxyType::Vless => {
            fields.uuid = non_empty(user);
            fields.flow = param("flow");
        }
        ProxyType::Trojan => {
            fields.password = non_empty(user);
            fields.tls = true;
        }
        ProxyType::Hysteria2 => {
            // auth may be user or user:pass
            fields.password = match pass {
                Some(p) => non_empty(format!("{}:{}", user, p)),
                None => non_empty(user).or_else(|| param("auth")),
            };
            fields.obfs = param("obfs");
            fields.obfs_password = param("obfs-password");
            fields.tls = true;
        }
        ProxyType::Tuic => {
            fields.uuid = non_empty(user);
            fields.password = pass.and_then(non_empty);
            fields.congestion_control = param("congestion_control");
            fields.tls = true;
        }
        ProxyType::Socks5 => {
            // Some clients base64 the whole userinfo
            match pass {
                Some(p) => {
                    fields.username = non_empty(user);
                    fields.password = non_empty(p);
                }
                None if !user.is_empty() => {
                    let decoded = base64_decode(&user);
                    match decoded.split_once(':') {
                        Some((u, p)) => {
                            fields.username = non_empty(u);
                            fields.password = non_empty(p);
                        }
                        None => fields.username = non_empty(user),
                    }
                }
                None => {}
            }
        }
        _ => {}
    }

    if proxy_type == ProxyType::Vless || proxy_type == ProxyType::Trojan {
        fields.network = param("type");
        fields.host = param("host");
        fields.path = param("path").or_else(|| param("serviceName"));
        if let Some(security) = param("security") {
            fields.tls = security == "tls" || security == "reality";
        }
        fields.reality_public_key = param("pbk");
        fields.reality_short_id = param("sid");
        fields.fingerprint = param("fp");
    }

    fields.sni = param("sni").or_else(|| param("peer"));
    if let Some(alpn) = param("alpn") {
        fields.alpn = alpn
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(insecure) = param("insecure").or_else(|| param("allowInsecure")) {
        fields.skip_cert_verify = Some(is_truthy(&insecure));
    }

    Ok(fields)
}

/// Serialize URL-shaped fields back into a link
pub fn uri_to_link(fields: &ProxyFields) -> String {
    let scheme = match fields.proxy_type {
        ProxyType::Socks5 => "socks5",
        other => other.as_str(),
    };

    let credential = match fields.proxy_type {
        ProxyType::Vless => url_encode(fields.uuid.as_deref().unwrap_or("")),
        ProxyType::Tuic => format!(
            "{}:{}",
            url_encode(fields.uuid.as_deref().unwrap_or("")),
            url_encode(fields.password.as_deref().unwrap_or(""))
        ),
        ProxyType::Socks5 => match (&fields.username, &fields.password) {
            (Some(u), Some(p)) => format!("{}:{}", url_encode(u), url_encode(p)),
            (Some(u), None) => url_encode(u),
            _ => String::new(),
        },
        _ => url_encode(fields.password.as_deref().unwrap_or("")),
    };

    let mut params: Vec<(String, String)> = Vec::new();
    let mut push = |key: &str, value: &Option<String>| {
        if let Some(v) = value {
            params.push((key.to_string(), v.clone()));
        }
    };
    push("type", &fields.network);
    push("host", &fields.host);
    push("path", &fields.path);
    push("flow", &fields.flow);
    push("sni", &fields.sni);
    push("fp", &fields.fingerprint);
    push("pbk", &fields.reality_public_key);
    push("sid", &fields.reality_short_id);
    push("obfs", &fields.obfs);
    push("obfs-password", &fields.obfs_password);
    push("congestion_control", &fields.congestion_control);
    if fields.proxy_type == ProxyType::Vless && fields.tls {
        let security = if fields.reality_public_key.is_some() {
            "reality"
        } else {
            "tls"
        };
        params.push(("security".to_string(), security.to_string()));
    }
    if !fields.alpn.is_empty() {
        params.push(("alpn".to_string(), fields.alpn.join(",")));
    }
    if fields.skip_cert_verify == Some(true) {
        params.push(("insecure".to_string(), "1".to_string()));
    }

    let mut link = if credential.is_empty() {
        format!("{}://{}:{}", scheme, bracket_host(&fields.server), fields.port)
    } else {
        format!(
            "{}://{}@{}:{}",
            scheme,
            credential,
            bracket_host(&fields.server),
            fields.port
        )
    };
    if !params.is_empty() {
        let query: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, url_encode(v)))
            .collect();
        link.push('?');
        link.push_str(&query.join("&"));
    }
    replace_fragment(&link, &fields.name)
}

/// Replace (or add) the `#name` part of a link
pub fn replace_fragment(link: &str, name: &str) -> String {
    let base = match link.find('#') {
        Some(pos) => &link[..pos],
        None => link,
    };
    format!("{}#{}", base, url_encode(name))
}
