use std::collections::HashSet;

use super::{AssembleContext, DialTargets};
use crate::codec::{ProxyFields, ProxyType};
use crate::error::CompileError;
use crate::generator::group::surge_group_selects_members;
use crate::generator::template::{section_lines, splice_sections, SectionStyle};
use crate::models::{CustomProxyGroup, Diagnostics};

fn push_opt(parts: &mut Vec<String>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        parts.push(format!("{}={}", key, v));
    }
}

fn ws_parts(fields: &ProxyFields, parts: &mut Vec<String>) -> Result<(), String> {
    match fields.network_or_tcp() {
        "tcp" => Ok(()),
        "ws" => {
            parts.push("ws=true".to_string());
            push_opt(parts, "ws-path", &fields.path);
            if let Some(host) = &fields.host {
                parts.push(format!("ws-headers=Host:{}", host));
            }
            Ok(())
        }
        other => Err(format!("{} transport is not supported by Surge", other)),
    }
}

/// Convert decoded fields into a Surge `[Proxy]` line
///
/// # Returns
/// * `Ok(line)` - The proxy line, `Name = type, server, port, ...`
/// * `Err(reason)` - The proxy cannot be expressed in Surge
pub fn fields_to_surge(fields: &ProxyFields) -> Result<String, String> {
    let mut parts: Vec<String> = Vec::new();
    match fields.proxy_type {
        ProxyType::Shadowsocks => {
            parts.push(format!("ss, {}, {}", fields.server, fields.port));
            push_opt(&mut parts, "encrypt-method", &fields.cipher);
            push_opt(&mut parts, "password", &fields.password);
            if let (Some(plugin), Some(opts)) = (&fields.plugin, &fields.plugin_opts) {
                if plugin == "obfs-local" || plugin == "simple-obfs" || plugin == "obfs" {
                    for opt in opts.split(';') {
                        match opt.trim().split_once('=') {
                            Some(("obfs", v)) => parts.push(format!("obfs={}", v)),
                            Some(("obfs-host", v)) => parts.push(format!("obfs-host={}", v)),
                            _ => {}
                        }
                    }
                } else {
                    return Err(format!("plugin {} is not supported by Surge", plugin));
                }
            }
        }
        ProxyType::VMess => {
            parts.push(format!("vmess, {}, {}", fields.server, fields.port));
            push_opt(&mut parts, "username", &fields.uuid);
            if fields.alter_id == 0 {
                parts.push("vmess-aead=true".to_string());
            }
            ws_parts(fields, &mut parts)?;
            if fields.tls {
                parts.push("tls=true".to_string());
                push_opt(&mut parts, "sni", &fields.sni);
            }
        }
        ProxyType::Trojan => {
            parts.push(format!("trojan, {}, {}", fields.server, fields.port));
            push_opt(&mut parts, "password", &fields.password);
            push_opt(&mut parts, "sni", &fields.sni);
            ws_parts(fields, &mut parts)?;
        }
        ProxyType::Hysteria2 => {
            parts.push(format!("hysteria2, {}, {}", fields.server, fields.port));
            push_opt(&mut parts, "password", &fields.password);
            push_opt(&mut parts, "sni", &fields.sni);
        }
        ProxyType::Tuic => {
            parts.push(format!("tuic-v5, {}, {}", fields.server, fields.port));
            push_opt(&mut parts, "password", &fields.password);
            push_opt(&mut parts, "uuid", &fields.uuid);
            push_opt(&mut parts, "sni", &fields.sni);
            if !fields.alpn.is_empty() {
                parts.push(format!("alpn={}", fields.alpn.join(",")));
            }
        }
        ProxyType::Socks5 => {
            let kind = if fields.tls { "socks5-tls" } else { "socks5" };
            parts.push(format!("{}, {}, {}", kind, fields.server, fields.port));
            if let Some(user) = &fields.username {
                parts.push(user.clone());
                parts.push(fields.password.clone().unwrap_or_default());
            }
        }
        ProxyType::Vless => return Err("vless is not supported by Surge".to_string()),
    }

    if let Some(skip) = fields.skip_cert_verify {
        parts.push(format!("skip-cert-verify={}", skip));
    }
    if fields.udp == Some(true) {
        parts.push("udp-relay=true".to_string());
    }
    push_opt(&mut parts, "underlying-proxy", &fields.dialer_proxy);
    Ok(format!("{} = {}", fields.name, parts.join(", ")))
}

fn custom_group_to_surge(group: &CustomProxyGroup, emitted: &HashSet<String>) -> String {
    let mut parts: Vec<String> = vec![group.type_str().to_string()];
    parts.extend(
        group
            .proxies
            .iter()
            .filter(|p| emitted.contains(*p))
            .cloned(),
    );
    if let Some(opts) = group.effective_url_test() {
        parts.push(format!("url={}", opts.url));
        parts.push(format!("interval={}", opts.interval));
        if opts.tolerance > 0 {
            parts.push(format!("tolerance={}", opts.tolerance));
        }
    }
    format!("{} = {}", group.name, parts.join(", "))
}

fn line_name(line: &str) -> Option<&str> {
    let (name, _) = line.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}

fn is_content_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && !trimmed.starts_with('#')
        && !trimmed.starts_with(';')
        && !trimmed.starts_with("//")
}

/// Assemble a Surge configuration
///
/// Template groups cannot carry a dialer and only get members appended. An
/// `underlying-proxy` naming nothing in the document is dropped.
///
/// # Arguments
/// * `ctx` - Nodes, chain wiring, template and output options
/// * `diag` - Receives a warning for each skipped entry
pub fn proxy_to_surge(ctx: &AssembleContext<'_>, diag: &mut Diagnostics) -> Result<String, CompileError> {
    let style = SectionStyle::IniHeader;
    let output = ctx.output;

    let mut proxy_lines: Vec<String> = section_lines(ctx.base, style, "Proxy")
        .unwrap_or_default()
        .into_iter()
        .map(String::from)
        .collect();
    let mut emitted: HashSet<String> = proxy_lines
        .iter()
        .filter(|l| is_content_line(l))
        .filter_map(|l| line_name(l))
        .map(String::from)
        .collect();
    let mut appended: Vec<String> = Vec::new();
    // (index in proxy_lines, proxy name, dialer) of every rendered node line
    let mut node_lines: Vec<(usize, String, Option<String>)> = Vec::new();

    for rendered in ctx.nodes {
        for entry in &rendered.entries {
            if entry.embedded {
                let Some(content) = ctx.embedded.get(&entry.link) else {
                    continue;
                };
                if !content.clash_proxies.is_empty() {
                    diag.warn(format!(
                        "Skipping {} Clash proxy(ies) from sub-subscription {}: not expressible in Surge",
                        content.clash_proxies.len(),
                        entry.link
                    ));
                }
                for link in &content.links {
                    let line = ctx
                        .codec
                        .decode(link)
                        .map_err(|e| e.to_string())
                        .and_then(|fields| {
                            if emitted.contains(&fields.name) {
                                return Err(format!("duplicate name '{}'", fields.name));
                            }
                            fields_to_surge(&fields).map(|line| (fields.name, line))
                        });
                    match line {
                        Ok((name, line)) => {
                            emitted.insert(name.clone());
                            appended.push(name);
                            proxy_lines.push(line);
                        }
                        Err(e) => diag.warn(format!(
                            "Skipping proxy from sub-subscription {}: {}",
                            entry.link, e
                        )),
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
            if emitted.contains(&entry.name) {
                diag.warn(format!(
                    "Skipping node #{} '{}': name already used by the template",
                    rendered.node.id, entry.name
                ));
                continue;
            }
            fields.name = entry.name.clone();
            let dialer = ctx
                .chains
                .dialer_for(&entry.name, rendered.node.id, rendered.node.own_dialer())
                .map(String::from);
            if output.udp.is_some() {
                fields.udp = output.udp;
            }
            if output.skip_cert_verify.is_some() {
                fields.skip_cert_verify = output.skip_cert_verify;
            }
            match fields_to_surge(&fields) {
                Ok(line) => {
                    emitted.insert(entry.name.clone());
                    appended.push(entry.name.clone());
                    node_lines.push((proxy_lines.len(), entry.name.clone(), dialer));
                    proxy_lines.push(line);
                }
                Err(e) => diag.warn(format!(
                    "Skipping node #{} '{}': {}",
                    rendered.node.id, entry.name, e
                )),
            }
        }
    }

    let template_groups = section_lines(ctx.base, style, "Proxy Group").unwrap_or_default();
    let group_names: HashSet<String> = template_groups
        .iter()
        .filter(|l| is_content_line(l))
        .filter_map(|l| line_name(l))
        .map(String::from)
        .collect();
    let mut custom_lines: Vec<String> = Vec::new();
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
        custom_lines.push(custom_group_to_surge(group, &emitted));
    }
    let targets = DialTargets::new(emitted.iter().chain(&group_names).chain(&custom_names));

    for (index, name, dialer) in node_lines {
        let Some(line) = proxy_lines.get_mut(index) else {
            continue;
        };
        if let Some(dialer) = dialer.filter(|d| targets.check(&name, d, diag)) {
            line.push_str(&format!(", underlying-proxy={}", dialer));
        }
        if output.tfo == Some(true) {
            line.push_str(", tfo=true");
        }
    }

    let mut group_lines: Vec<String> = Vec::new();
    for line in template_groups {
        let Some(name) = line_name(line).filter(|_| is_content_line(line)) else {
            group_lines.push(line.to_string());
            continue;
        };
        if ctx.chains.dialer_by_proxy_name.contains_key(name) {
            diag.warn(format!(
                "Surge groups cannot dial through another proxy, chain hop on '{}' dropped",
                name
            ));
        }
        let mut line = line.trim_end().to_string();
        if !surge_group_selects_members(&line) && !appended.is_empty() {
            line.push_str(", ");
            line.push_str(&appended.join(", "));
        }
        group_lines.push(line);
    }
    group_lines.extend(custom_lines);

    let mut sections = vec![
        ("Proxy", format!("[Proxy]\n{}", proxy_lines.join("\n"))),
        ("Proxy Group", format!("[Proxy Group]\n{}", group_lines.join("\n"))),
    ];
    if !output.custom_rules.is_empty() {
        let mut rules = output.custom_rules.clone();
        rules.extend(
            section_lines(ctx.base, style, "Rule")
                .unwrap_or_default()
                .into_iter()
                .map(String::from),
        );
        sections.push(("Rule", format!("[Rule]\n{}", rules.join("\n"))));
    }

    Ok(splice_sections(ctx.base, style, &sections))
}
