use std::collections::HashSet;

use serde_yaml::{Mapping, Value};

use super::{AssembleContext, DialTargets};
use crate::codec::{ProxyFields, ProxyType};
use crate::error::CompileError;
use crate::generator::group::clash_group_selects_members;
use crate::generator::template::{splice_sections, SectionStyle};
use crate::models::{CustomProxyGroup, Diagnostics};

fn set(map: &mut Mapping, key: &str, value: impl Into<Value>) {
    map.insert(Value::String(key.to_string()), value.into());
}

fn set_opt(map: &mut Mapping, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        set(map, key, v.as_str());
    }
}

fn plugin_opts(raw: &str) -> Vec<(String, Option<String>)> {
    raw.split(';')
        .map(str::trim)
        .filter(|opt| !opt.is_empty())
        .map(|opt| match opt.split_once('=') {
            Some((k, v)) => (k.trim().to_string(), Some(v.trim().to_string())),
            None => (opt.to_string(), None),
        })
        .collect()
}

fn ss_plugin(fields: &ProxyFields, proxy: &mut Mapping) {
    let Some(plugin) = fields.plugin.as_deref() else {
        return;
    };
    let opts = plugin_opts(fields.plugin_opts.as_deref().unwrap_or(""));
    let mut clash_opts = Mapping::new();
    let clash_plugin = match plugin {
        "obfs-local" | "simple-obfs" | "obfs" => {
            for (key, value) in opts {
                match (key.as_str(), value) {
                    ("obfs", Some(v)) => set(&mut clash_opts, "mode", v),
                    ("obfs-host", Some(v)) => set(&mut clash_opts, "host", v),
                    _ => {}
                }
            }
            "obfs"
        }
        "v2ray-plugin" => {
            for (key, value) in opts {
                match (key.as_str(), value) {
                    ("mode", Some(v)) => set(&mut clash_opts, "mode", v),
                    ("host", Some(v)) => set(&mut clash_opts, "host", v),
                    ("path", Some(v)) => set(&mut clash_opts, "path", v),
                    ("tls", _) => set(&mut clash_opts, "tls", true),
                    _ => {}
                }
            }
            "v2ray-plugin"
        }
        other => {
            for (key, value) in opts {
                set(&mut clash_opts, &key, value.map(Value::String).unwrap_or(Value::Bool(true)));
            }
            other
        }
    };
    set(proxy, "plugin", clash_plugin);
    set(proxy, "plugin-opts", clash_opts);
}

fn transport_opts(fields: &ProxyFields, proxy: &mut Mapping) {
    let network = fields.network_or_tcp();
    if network == "tcp" {
        return;
    }
    set(proxy, "network", network);
    let mut opts = Mapping::new();
    let key = match network {
        "ws" | "httpupgrade" => {
            set_opt(&mut opts, "path", &fields.path);
            if let Some(host) = &fields.host {
                let mut headers = Mapping::new();
                set(&mut headers, "Host", host.as_str());
                set(&mut opts, "headers", headers);
            }
            "ws-opts"
        }
        "grpc" => {
            set_opt(&mut opts, "grpc-service-name", &fields.path);
            "grpc-opts"
        }
        "h2" | "http" => {
            set_opt(&mut opts, "path", &fields.path);
            if let Some(host) = &fields.host {
                set(&mut opts, "host", vec![host.clone()]);
            }
            if network == "h2" {
                "h2-opts"
            } else {
                "http-opts"
            }
        }
        _ => return,
    };
    if !opts.is_empty() {
        set(proxy, key, opts);
    }
}

/// Convert decoded fields into a Clash proxy mapping
pub fn fields_to_clash(fields: &ProxyFields) -> Mapping {
    let mut proxy = Mapping::new();
    set(&mut proxy, "name", fields.name.as_str());
    set(&mut proxy, "type", fields.proxy_type.as_str());
    set(&mut proxy, "server", fields.server.as_str());
    set(&mut proxy, "port", fields.port);

    match fields.proxy_type {
        ProxyType::Shadowsocks => {
            set_opt(&mut proxy, "cipher", &fields.cipher);
            set_opt(&mut proxy, "password", &fields.password);
            ss_plugin(fields, &mut proxy);
        }
        ProxyType::VMess => {
            set_opt(&mut proxy, "uuid", &fields.uuid);
            set(&mut proxy, "alterId", fields.alter_id);
            set(
                &mut proxy,
                "cipher",
                fields.cipher.as_deref().unwrap_or("auto"),
            );
            if fields.tls {
                set(&mut proxy, "tls", true);
                set_opt(&mut proxy, "servername", &fields.sni);
            }
            transport_opts(fields, &mut proxy);
        }
        ProxyType::Vless => {
            set_opt(&mut proxy, "uuid", &fields.uuid);
            set_opt(&mut proxy, "flow", &fields.flow);
            if fields.tls {
                set(&mut proxy, "tls", true);
                set_opt(&mut proxy, "servername", &fields.sni);
            }
            if let Some(key) = &fields.reality_public_key {
                let mut reality = Mapping::new();
                set(&mut reality, "public-key", key.as_str());
                set_opt(&mut reality, "short-id", &fields.reality_short_id);
                set(&mut proxy, "reality-opts", reality);
            }
            transport_opts(fields, &mut proxy);
        }
        ProxyType::Trojan => {
            set_opt(&mut proxy, "password", &fields.password);
            set_opt(&mut proxy, "sni", &fields.sni);
            transport_opts(fields, &mut proxy);
        }
        ProxyType::Hysteria2 => {
            set_opt(&mut proxy, "password", &fields.password);
            set_opt(&mut proxy, "sni", &fields.sni);
            set_opt(&mut proxy, "obfs", &fields.obfs);
            set_opt(&mut proxy, "obfs-password", &fields.obfs_password);
        }
        ProxyType::Tuic => {
            set_opt(&mut proxy, "uuid", &fields.uuid);
            set_opt(&mut proxy, "password", &fields.password);
            set_opt(&mut proxy, "sni", &fields.sni);
            set_opt(&mut proxy, "congestion-controller", &fields.congestion_control);
        }
        ProxyType::Socks5 => {
            set_opt(&mut proxy, "username", &fields.username);
            set_opt(&mut proxy, "password", &fields.password);
            if fields.tls {
                set(&mut proxy, "tls", true);
            }
        }
    }

    if !fields.alpn.is_empty() {
        set(&mut proxy, "alpn", fields.alpn.clone());
    }
    set_opt(&mut proxy, "client-fingerprint", &fields.fingerprint);
    if let Some(skip) = fields.skip_cert_verify {
        set(&mut proxy, "skip-cert-verify", skip);
    }
    if let Some(udp) = fields.udp {
        set(&mut proxy, "udp", udp);
    }
    set_opt(&mut proxy, "dialer-proxy", &fields.dialer_proxy);
    proxy
}

fn custom_group_to_clash(group: &CustomProxyGroup, emitted: &HashSet<String>) -> Mapping {
    let mut map = Mapping::new();
    set(&mut map, "name", group.name.as_str());
    set(&mut map, "type", group.type_str());
    let members: Vec<String> = group
        .proxies
        .iter()
        .filter(|p| emitted.contains(*p))
        .cloned()
        .collect();
    set(&mut map, "proxies", members);
    if let Some(opts) = group.effective_url_test() {
        set(&mut map, "url", opts.url);
        set(&mut map, "interval", opts.interval);
        if opts.tolerance > 0 {
            set(&mut map, "tolerance", opts.tolerance);
        }
    }
    map
}

fn section_text(key: &str, value: Value) -> Result<String, CompileError> {
    let mut doc = Mapping::new();
    set(&mut doc, key, value);
    serde_yaml::to_string(&doc).map_err(|e| CompileError::Serialize(e.to_string()))
}

fn proxy_name(proxy: &Value) -> Option<String> {
    proxy.get("name").and_then(Value::as_str).map(String::from)
}

/// Assemble a Clash document
///
/// Template proxies are kept and the rendered ones appended. Template groups
/// receive chain `dialer-proxy` assignments and, unless they select members
/// on their own, every emitted proxy name. Synthesized groups are appended
/// when at least one member is emitted. A dialer naming nothing in the
/// document is dropped.
///
/// # Arguments
/// * `ctx` - Nodes, chain wiring, template and output options
/// * `diag` - Receives a warning for each skipped entry
pub fn proxy_to_clash(ctx: &AssembleContext<'_>, diag: &mut Diagnostics) -> Result<String, CompileError> {
    let parsed = if ctx.base.trim().is_empty() {
        Ok(Value::Null)
    } else {
        serde_yaml::from_str::<Value>(ctx.base)
    };
    let mut base = match parsed {
        Ok(Value::Mapping(map)) => map,
        Ok(Value::Null) => Mapping::new(),
        Ok(_) => {
            return Err(CompileError::TemplateMalformed(
                "Clash template is not a mapping".to_string(),
            ))
        }
        Err(e) => return Err(CompileError::TemplateMalformed(e.to_string())),
    };

    let mut proxies: Vec<Value> = match base.remove("proxies") {
        Some(Value::Sequence(seq)) => seq,
        _ => Vec::new(),
    };
    let mut emitted: HashSet<String> = proxies.iter().filter_map(proxy_name).collect();
    let mut appended: Vec<String> = Vec::new();
    // (index in proxies, proxy name, dialer), applied once every name is known
    let mut dialed: Vec<(usize, String, String)> = Vec::new();
    let output = ctx.output;

    for rendered in ctx.nodes {
        for entry in &rendered.entries {
            if entry.embedded {
                let Some(content) = ctx.embedded.get(&entry.link) else {
                    continue;
                };
                let mut spliced: Vec<Value> = content.clash_proxies.clone();
                for link in &content.links {
                    match ctx.codec.decode(link) {
                        Ok(fields) => spliced.push(Value::Mapping(fields_to_clash(&fields))),
                        Err(e) => diag.warn(format!(
                            "Skipping proxy from sub-subscription {}: {}",
                            entry.link, e
                        )),
                    }
                }
                for proxy in spliced {
                    match proxy_name(&proxy) {
                        Some(name) if emitted.insert(name.clone()) => {
                            appended.push(name);
                            proxies.push(proxy);
                        }
                        Some(name) => diag.warn(format!(
                            "Skipping proxy '{}' from sub-subscription {}: duplicate name",
                            name, entry.link
                        )),
                        None => {}
                    }
                }
                continue;
            }

            let mut fields = match ctx.codec.decode(&entry.link) {
                Ok(fields) => fields,
                Err(e) => {
                    diag.warn(format!(
                        "Skipping node #{} '{}': {}",
                        rendered.node.id, entry.name, e
                    ));
                    continue;
                }
            };
            if !emitted.insert(entry.name.clone()) {
                diag.warn(format!(
                    "Skipping node #{} '{}': name already used by the template",
                    rendered.node.id, entry.name
                ));
                continue;
            }
            fields.name = entry.name.clone();
            if let Some(dialer) =
                ctx.chains
                    .dialer_for(&entry.name, rendered.node.id, rendered.node.own_dialer())
            {
                dialed.push((proxies.len(), entry.name.clone(), dialer.to_string()));
            }
            if output.udp.is_some() {
                fields.udp = output.udp;
            }
            if output.skip_cert_verify.is_some() {
                fields.skip_cert_verify = output.skip_cert_verify;
            }
            let mut proxy = fields_to_clash(&fields);
            if let Some(tfo) = output.tfo {
                set(&mut proxy, "tfo", tfo);
            }
            appended.push(entry.name.clone());
            proxies.push(Value::Mapping(proxy));
        }
    }

    let mut groups: Vec<Value> = match base.remove("proxy-groups") {
        Some(Value::Sequence(seq)) => seq,
        _ => Vec::new(),
    };
    let group_names: HashSet<String> = groups.iter().filter_map(proxy_name).collect();
    let mut custom_groups: Vec<Value> = Vec::new();
    let mut custom_names: Vec<String> = Vec::new();
    for group in &ctx.chains.custom_groups {
        if group_names.contains(&group.name) || emitted.contains(&group.name) {
            diag.warn(format!(
                "Custom group '{}' clashes with an existing name, skipped",
                group.name
            ));
            continue;
        }
        if !group.proxies.iter().any(|p| emitted.contains(p)) {
            diag.warn(format!(
                "Custom group '{}' has no emitted members, skipped",
                group.name
            ));
            continue;
        }
        custom_names.push(group.name.clone());
        custom_groups.push(Value::Mapping(custom_group_to_clash(group, &emitted)));
    }
    let targets = DialTargets::new(emitted.iter().chain(&group_names).chain(&custom_names));

    for group in groups.iter_mut() {
        let Value::Mapping(map) = group else {
            continue;
        };
        let Some(name) = map.get("name").and_then(Value::as_str).map(String::from) else {
            continue;
        };
        if let Some(dialer) = ctx.chains.dialer_by_proxy_name.get(&name) {
            if targets.check(&name, dialer, diag) {
                set(map, "dialer-proxy", dialer.as_str());
            }
        }
        if !clash_group_selects_members(map) {
            if !matches!(map.get("proxies"), Some(Value::Sequence(_))) {
                set(map, "proxies", Vec::<Value>::new());
            }
            if let Some(Value::Sequence(members)) = map.get_mut("proxies") {
                members.extend(appended.iter().map(|n| Value::String(n.clone())));
            }
        }
    }
    groups.extend(custom_groups);

    for (index, name, dialer) in dialed {
        if !targets.check(&name, &dialer, diag) {
            continue;
        }
        if let Some(Value::Mapping(proxy)) = proxies.get_mut(index) {
            set(proxy, "dialer-proxy", dialer);
        }
    }

    let mut sections = vec![
        ("proxies", section_text("proxies", Value::Sequence(proxies))?),
        ("proxy-groups", section_text("proxy-groups", Value::Sequence(groups))?),
    ];
    if !output.custom_rules.is_empty() {
        let mut rules: Vec<Value> = output
            .custom_rules
            .iter()
            .map(|r| Value::String(r.clone()))
            .collect();
        if let Some(Value::Sequence(existing)) = base.remove("rules") {
            rules.extend(existing);
        }
        sections.push(("rules", section_text("rules", Value::Sequence(rules))?));
    }

    Ok(splice_sections(ctx.base, SectionStyle::YamlKey, &sections))
}
