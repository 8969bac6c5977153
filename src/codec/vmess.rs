use serde_json::{json, Map, Value};

use super::fields::{non_empty, ProxyFields, ProxyType};
use super::CodecError;
use crate::utils::base64::{base64_decode, base64_encode};

fn json_str(json: &Value, key: &str) -> String {
    match &json[key] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn decode_payload(vmess: &str) -> Result<Map<String, Value>, CodecError> {
    let encoded = vmess
        .strip_prefix("vmess://")
        .ok_or_else(|| CodecError::malformed("vmess", "missing vmess:// prefix"))?;
    let decoded = base64_decode(encoded.trim());
    if decoded.is_empty() {
        return Err(CodecError::malformed("vmess", "payload is not base64"));
    }
    match serde_json::from_str::<Value>(&decoded) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CodecError::malformed("vmess", "payload is not a JSON object")),
        Err(e) => Err(CodecError::malformed("vmess", e.to_string())),
    }
}

/// Parse a VMess link (v2rayN base64 JSON form)
pub fn explode_vmess(vmess: &str) -> Result<ProxyFields, CodecError> {
    let json = Value::Object(decode_payload(vmess)?);

    let server = json_str(&json, "add");
    let port = json_str(&json, "port").parse::<u16>().unwrap_or(0);
    if server.is_empty() || port == 0 {
        return Err(CodecError::malformed("vmess", "missing server or port"));
    }

    let mut fields = ProxyFields::new(ProxyType::VMess, &json_str(&json, "ps"), &server, port);
    fields.uuid = non_empty(json_str(&json, "id"));
    fields.alter_id = json_str(&json, "aid").parse::<u16>().unwrap_or(0);
    fields.cipher = Some(non_empty(json_str(&json, "scy")).unwrap_or_else(|| "auto".to_string()));
    fields.network = non_empty(json_str(&json, "net"));
    fields.host = non_empty(json_str(&json, "host"));
    fields.path = non_empty(json_str(&json, "path"));
    fields.tls = json_str(&json, "tls") == "tls";
    fields.sni = non_empty(json_str(&json, "sni"));
    fields.fingerprint = non_empty(json_str(&json, "fp"));
    fields.alpn = json_str(&json, "alpn")
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect();

    // v2rayN version 1 packs host and path together
    if json_str(&json, "v") == "1" {
        if let Some(host) = fields.host.clone() {
            if let Some((h, p)) = host.split_once(';') {
                fields.host = non_empty(h);
                fields.path = non_empty(p);
            }
        }
    }

    Ok(fields)
}

/// Serialize VMess fields to a v2rayN link
pub fn vmess_to_link(fields: &ProxyFields) -> Result<String, CodecError> {
    let payload = json!({
        "v": "2",
        "ps": fields.name,
        "add": fields.server,
        "port": fields.port.to_string(),
        "id": fields.uuid.as_deref().unwrap_or(""),
        "aid": fields.alter_id.to_string(),
        "scy": fields.cipher.as_deref().unwrap_or("auto"),
        "net": fields.network_or_tcp(),
        "type": "none",
        "host": fields.host.as_deref().unwrap_or(""),
        "path": fields.path.as_deref().unwrap_or(""),
        "tls": if fields.tls { "tls" } else { "" },
        "sni": fields.sni.as_deref().unwrap_or(""),
        "alpn": fields.alpn.join(","),
        "fp": fields.fingerprint.as_deref().unwrap_or(""),
    });
    let text = serde_json::to_string(&payload)
        .map_err(|e| CodecError::malformed("vmess", e.to_string()))?;
    Ok(format!("vmess://{}", base64_encode(&text)))
}

/// Replace only the `ps` field, leaving every other key as stored
pub fn rewrite_vmess_name(vmess: &str, new_name: &str) -> Result<String, CodecError> {
    let mut map = decode_payload(vmess)?;
    map.insert("ps".to_string(), Value::String(new_name.to_string()));
    let text = serde_json::to_string(&Value::Object(map))
        .map_err(|e| CodecError::malformed("vmess", e.to_string()))?;
    Ok(format!("vmess://{}", base64_encode(&text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_link() -> String {
        let payload = r#"{"v":"2","ps":"JP 01","add":"jp.example.com","port":443,"id":"b831381d-6324-4d53-ad4f-8cda48b30811","aid":"0","net":"ws","host":"cdn.example.com","path":"/ray","tls":"tls","sni":"jp.example.com"}"#;
        format!("vmess://{}", base64_encode(payload))
    }

    #[test]
    fn test_explode_vmess() {
        let fields = explode_vmess(&sample_link()).unwrap();
        assert_eq!(fields.name, "JP 01");
        assert_eq!(fields.server, "jp.example.com");
        assert_eq!(fields.port, 443);
        assert_eq!(fields.network.as_deref(), Some("ws"));
        assert_eq!(fields.path.as_deref(), Some("/ray"));
        assert!(fields.tls);
        assert_eq!(fields.cipher.as_deref(), Some("auto"));
    }

    #[test]
    fn test_explode_vmess_rejects_garbage() {
        assert!(explode_vmess("vmess://%%%").is_err());
        let no_server = format!("vmess://{}", base64_encode(r#"{"ps":"x"}"#));
        assert!(explode_vmess(&no_server).is_err());
    }

    #[test]
    fn test_rewrite_vmess_name_keeps_unknown_keys() {
        let payload = r#"{"ps":"old","add":"a.com","port":"1","id":"u","custom":"keep"}"#;
        let link = format!("vmess://{}", base64_encode(payload));
        let rewritten = rewrite_vmess_name(&link, "new").unwrap();
        let map = decode_payload(&rewritten).unwrap();
        assert_eq!(map["ps"], "new");
        assert_eq!(map["custom"], "keep");
    }
}
