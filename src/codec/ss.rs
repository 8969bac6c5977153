use url::Url;

use super::fields::{non_empty, ProxyFields, ProxyType};
use super::CodecError;
use crate::utils::base64::{url_safe_base64_decode, url_safe_base64_encode};
use crate::utils::url::{url_decode, url_encode};

/// Parse a Shadowsocks link (SIP002 or legacy base64 form)
pub fn explode_ss(ss: &str) -> Result<ProxyFields, CodecError> {
    let body = ss
        .strip_prefix("ss://")
        .or_else(|| ss.strip_prefix("SS://"))
        .ok_or_else(|| CodecError::malformed("ss", "missing ss:// prefix"))?;

    // Split off the remark
    let (body, remark) = match body.find('#') {
        Some(pos) => (&body[..pos], url_decode(&body[pos + 1..])),
        None => (body, String::new()),
    };

    // Legacy form: the whole authority is base64 encoded
    let body = if body.contains('@') {
        body.to_string()
    } else {
        let (encoded, rest) = match body.find("/?").or_else(|| body.find('?')) {
            Some(pos) => (&body[..pos], &body[pos..]),
            None => (body, ""),
        };
        let decoded = url_safe_base64_decode(encoded);
        if decoded.is_empty() || !decoded.contains('@') {
            return Err(CodecError::malformed("ss", "undecodable legacy payload"));
        }
        format!("{}{}", decoded, rest)
    };

    let (userinfo, server_part) = match body.rfind('@') {
        Some(pos) => (&body[..pos], &body[pos + 1..]),
        None => return Err(CodecError::malformed("ss", "missing '@'")),
    };

    // SIP002 userinfo is base64, but plain `method:password` is also seen
    let userinfo = if userinfo.contains(':') {
        url_decode(userinfo)
    } else {
        url_safe_base64_decode(userinfo)
    };
    let (method, password) = userinfo
        .split_once(':')
        .ok_or_else(|| CodecError::malformed("ss", "userinfo is not method:password"))?;

    let url = Url::parse(&format!("ss://placeholder@{}", server_part))
        .map_err(|e| CodecError::malformed("ss", e.to_string()))?;
    let server = url
        .host_str()
        .ok_or_else(|| CodecError::malformed("ss", "missing server"))?
        .trim_matches(|c| c == '[' || c == ']')
        .to_string();
    let port = url
        .port()
        .ok_or_else(|| CodecError::malformed("ss", "missing port"))?;

    let mut fields = ProxyFields::new(ProxyType::Shadowsocks, &remark, &server, port);
    fields.cipher = non_empty(method);
    fields.password = Some(password.to_string());

    for (key, value) in url.query_pairs() {
        if key == "plugin" {
            let value = value.to_string();
            match value.split_once(';') {
                Some((name, opts)) => {
                    fields.plugin = non_empty(name);
                    fields.plugin_opts = non_empty(opts);
                }
                None => fields.plugin = non_empty(value),
            }
        }
    }

    Ok(fields)
}

/// Serialize Shadowsocks fields to a SIP002 link
pub fn ss_to_link(fields: &ProxyFields) -> String {
    let userinfo = url_safe_base64_encode(&format!(
        "{}:{}",
        fields.cipher.as_deref().unwrap_or(""),
        fields.password.as_deref().unwrap_or("")
    ));
    let mut link = format!(
        "ss://{}@{}:{}",
        userinfo,
        bracket_host(&fields.server),
        fields.port
    );
    if let Some(plugin) = &fields.plugin {
        let plugin_arg = match &fields.plugin_opts {
            Some(opts) => format!("{};{}", plugin, opts),
            None => plugin.clone(),
        };
        link.push_str(&format!("/?plugin={}", url_encode(&plugin_arg)));
    }
    link.push('#');
    link.push_str(&url_encode(&fields.name));
    link
}

pub(crate) fn bracket_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::base64::base64_encode;

    #[test]
    fn test_explode_ss_sip002_format() {
        let userinfo = url_safe_base64_encode("aes-128-gcm:test");
        let link = format!("ss://{}@192.168.100.1:8888#Example1", userinfo);
        let fields = explode_ss(&link).unwrap();
        assert_eq!(fields.server, "192.168.100.1");
        assert_eq!(fields.port, 8888);
        assert_eq!(fields.cipher.as_deref(), Some("aes-128-gcm"));
        assert_eq!(fields.password.as_deref(), Some("test"));
        assert_eq!(fields.name, "Example1");
    }

    #[test]
    fn test_explode_ss_legacy_format() {
        let encoded = base64_encode("aes-256-cfb:pass@example.com:8388");
        let fields = explode_ss(&format!("ss://{}#Legacy%20Node", encoded)).unwrap();
        assert_eq!(fields.server, "example.com");
        assert_eq!(fields.port, 8388);
        assert_eq!(fields.name, "Legacy Node");
    }

    #[test]
    fn test_explode_ss_with_plugin() {
        let userinfo = url_safe_base64_encode("chacha20-ietf-poly1305:pw");
        let link = format!(
            "ss://{}@example.com:443/?plugin=obfs-local%3Bobfs%3Dhttp%3Bobfs-host%3Da.com#P",
            userinfo
        );
        let fields = explode_ss(&link).unwrap();
        assert_eq!(fields.plugin.as_deref(), Some("obfs-local"));
        assert_eq!(fields.plugin_opts.as_deref(), Some("obfs=http;obfs-host=a.com"));
    }

    #[test]
    fn test_explode_ss_invalid() {
        assert!(explode_ss("ss://not-base64-at-all!").is_err());
    }

    #[test]
    fn test_link_round_trip_preserves_credentials() {
        let userinfo = url_safe_base64_encode("aes-128-gcm:test");
        let original = explode_ss(&format!("ss://{}@h.example:1#n", userinfo)).unwrap();
        let again = explode_ss(&ss_to_link(&original)).unwrap();
        assert_eq!(original, again);
    }
}
