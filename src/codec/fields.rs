//! Structured proxy fields
//!
//! The decoded form of a single protocol link. Only the fields needed to
//! re-serialize a node into the supported output formats are carried.

/// Represents the type of a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyType {
    Shadowsocks,
    VMess,
    Vless,
    Trojan,
    Hysteria2,
    Tuic,
    Socks5,
}

impl ProxyType {
    /// Lowercase protocol name, as used in Clash `type:` fields
    pub fn as_str(self) -> &'static str {
        match self {
            ProxyType::Shadowsocks => "ss",
            ProxyType::VMess => "vmess",
            ProxyType::Vless => "vless",
            ProxyType::Trojan => "trojan",
            ProxyType::Hysteria2 => "hysteria2",
            ProxyType::Tuic => "tuic",
            ProxyType::Socks5 => "socks5",
        }
    }
}

/// Represents a decoded proxy link.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyFields {
    pub proxy_type: ProxyType,
    pub name: String,
    pub server: String,
    pub port: u16,

    pub username: Option<String>,
    pub password: Option<String>,
    /// Cipher for ss, security for vmess
    pub cipher: Option<String>,
    pub uuid: Option<String>,
    pub alter_id: u16,
    /// Transport: tcp, ws, grpc, h2, http
    pub network: Option<String>,
    pub host: Option<String>,
    pub path: Option<String>,
    pub tls: bool,
    pub sni: Option<String>,
    pub alpn: Vec<String>,
    pub fingerprint: Option<String>,
    pub flow: Option<String>,
    pub reality_public_key: Option<String>,
    pub reality_short_id: Option<String>,
    pub skip_cert_verify: Option<bool>,
    pub udp: Option<bool>,

    pub plugin: Option<String>,
    /// Plugin options in the format of `key1=value1;key2=value2`
    pub plugin_opts: Option<String>,
    pub obfs: Option<String>,
    pub obfs_password: Option<String>,
    pub congestion_control: Option<String>,

    /// Upstream proxy declared by the link itself
    pub dialer_proxy: Option<String>,
}

impl ProxyFields {
    pub fn new(proxy_type: ProxyType, name: &str, server: &str, port: u16) -> Self {
        ProxyFields {
            proxy_type,
            name: name.to_string(),
            server: server.to_string(),
            port,
            username: None,
            password: None,
            cipher: None,
            uuid: None,
            alter_id: 0,
            network: None,
            host: None,
            path: None,
            tls: false,
            sni: None,
            alpn: Vec::new(),
            fingerprint: None,
            flow: None,
            reality_public_key: None,
            reality_short_id: None,
            skip_cert_verify: None,
            udp: None,
            plugin: None,
            plugin_opts: None,
            obfs: None,
            obfs_password: None,
            congestion_control: None,
            dialer_proxy: None,
        }
    }

    /// Transport with `tcp` as the default
    pub fn network_or_tcp(&self) -> &str {
        self.network.as_deref().filter(|n| !n.is_empty()).unwrap_or("tcp")
    }
}

/// Treat empty strings as absent
pub(crate) fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
