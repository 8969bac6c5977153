//! Protocol link codec
//!
//! Converts between protocol links (`ss://`, `vmess://`, ...) and their
//! structured fields. The assemblers only ever talk to the [`Codec`] trait.

pub mod fields;
pub mod ss;
pub mod uri;
pub mod vmess;

use thiserror::Error;

pub use fields::{ProxyFields, ProxyType};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported link scheme: {0}")]
    UnsupportedScheme(String),

    #[error("malformed {scheme} link: {reason}")]
    Malformed { scheme: String, reason: String },
}

impl CodecError {
    pub(crate) fn malformed(scheme: &str, reason: impl Into<String>) -> Self {
        CodecError::Malformed {
            scheme: scheme.to_string(),
            reason: reason.into(),
        }
    }
}

/// Link codec collaborator
pub trait Codec: Send + Sync {
    /// Decode a link into structured fields
    fn decode(&self, link: &str) -> Result<ProxyFields, CodecError>;

    /// Encode structured fields back into a link
    fn encode(&self, fields: &ProxyFields) -> Result<String, CodecError>;

    /// Rewrite the display name carried inside a link
    fn rewrite(&self, link: &str, new_name: &str) -> Result<String, CodecError> {
        let mut fields = self.decode(link)?;
        fields.name = new_name.to_string();
        self.encode(&fields)
    }
}

/// Default codec covering the schemes the assemblers can re-serialize
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkCodec;

fn scheme_of(link: &str) -> String {
    link.find("://")
        .map(|pos| link[..pos].to_ascii_lowercase())
        .unwrap_or_default()
}

impl Codec for LinkCodec {
    fn decode(&self, link: &str) -> Result<ProxyFields, CodecError> {
        let link = link.trim();
        let scheme = scheme_of(link);
        match scheme.as_str() {
            "ss" => ss::explode_ss(link),
            "vmess" => vmess::explode_vmess(link),
            "vless" | "trojan" | "hysteria2" | "hy2" | "tuic" | "socks" | "socks5" => {
                uri::explode_uri(link, &scheme)
            }
            "" => Err(CodecError::UnsupportedScheme(link.chars().take(16).collect())),
            _ => Err(CodecError::UnsupportedScheme(scheme)),
        }
    }

    fn encode(&self, fields: &ProxyFields) -> Result<String, CodecError> {
        match fields.proxy_type {
            ProxyType::Shadowsocks => Ok(ss::ss_to_link(fields)),
            ProxyType::VMess => vmess::vmess_to_link(fields),
            _ => Ok(uri::uri_to_link(fields)),
        }
    }

    fn rewrite(&self, link: &str, new_name: &str) -> Result<String, CodecError> {
        let link = link.trim();
        match scheme_of(link).as_str() {
            // vmess keeps its name inside the encoded JSON
            "vmess" => vmess::rewrite_vmess_name(link, new_name),
            _ => {
                // Validate the link before touching it
                self.decode(link)?;
                Ok(uri::replace_fragment(link, new_name))
            }
        }
    }
}
