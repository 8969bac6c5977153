//! Base template merging
//!
//! Only the proxy, proxy group and rule sections of a base template are
//! replaced. Section boundaries are found by scanning lines, so every other
//! line of the template (comments included) is kept verbatim and in order.

/// How sections are delimited in a template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionStyle {
    /// Top-level `key:` entries of a YAML document (Clash)
    YamlKey,
    /// `[Section]` headers of an INI-like document (Surge)
    IniHeader,
}

impl SectionStyle {
    /// Section name if `line` starts a section
    fn header<'a>(&self, line: &'a str) -> Option<&'a str> {
        match self {
            SectionStyle::YamlKey => {
                if line.starts_with(|c: char| c.is_whitespace() || c == '-' || c == '#') {
                    return None;
                }
                let (key, _) = line.split_once(':')?;
                let key = key.trim().trim_matches(|c| c == '"' || c == '\'');
                if key.is_empty() {
                    None
                } else {
                    Some(key)
                }
            }
            SectionStyle::IniHeader => {
                let trimmed = line.trim();
                trimmed
                    .strip_prefix('[')
                    .and_then(|rest| rest.strip_suffix(']'))
                    .map(str::trim)
            }
        }
    }

    fn is_comment(&self, line: &str) -> bool {
        let trimmed = line.trim_start();
        match self {
            SectionStyle::YamlKey => trimmed.starts_with('#'),
            SectionStyle::IniHeader => {
                trimmed.starts_with('#') || trimmed.starts_with(';') || trimmed.starts_with("//")
            }
        }
    }
}

/// Line range of one section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    /// Exclusive; trailing blank and comment lines are left outside
    end: usize,
}

fn find_section(lines: &[&str], style: SectionStyle, name: &str) -> Option<Span> {
    let start = lines
        .iter()
        .position(|line| style.header(line).is_some_and(|h| h == name))?;
    let mut end = lines[start + 1..]
        .iter()
        .position(|line| style.header(line).is_some())
        .map(|pos| start + 1 + pos)
        .unwrap_or(lines.len());
    // Comments right above the next section belong to it
    while end > start + 1 && (lines[end - 1].trim().is_empty() || style.is_comment(lines[end - 1])) {
        end -= 1;
    }
    Some(Span { start, end })
}

/// Body lines of a section, without its header
pub fn section_lines<'a>(text: &'a str, style: SectionStyle, name: &str) -> Option<Vec<&'a str>> {
    let lines: Vec<&str> = text.lines().collect();
    let span = find_section(&lines, style, name)?;
    Some(lines[span.start + 1..span.end].to_vec())
}

/// Replace whole sections of `base`.
///
/// Each replacement is `(section name, full section text including its
/// header)`. Sections missing from `base` are appended in the given order.
pub fn splice_sections(base: &str, style: SectionStyle, replacements: &[(&str, String)]) -> String {
    let mut lines: Vec<String> = base.lines().map(String::from).collect();
    let mut appended: Vec<&str> = Vec::new();

    for (name, content) in replacements {
        let view: Vec<&str> = lines.iter().map(String::as_str).collect();
        match find_section(&view, style, name) {
            Some(span) => {
                let new_lines: Vec<String> = content.trim_end().lines().map(String::from).collect();
                lines.splice(span.start..span.end, new_lines);
            }
            None => appended.push(content.trim_end()),
        }
    }

    let mut out = lines.join("\n");
    for content in appended {
        if !out.is_empty() && !out.ends_with("\n\n") {
            out.push('\n');
            if style == SectionStyle::IniHeader {
                out.push('\n');
            }
        }
        out.push_str(content);
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASH_BASE: &str = "\
# my template
mixed-port: 7890
proxies:
- name: old
  type: ss
# groups follow
proxy-groups:
  - name: Proxy
    type: select
rules:
- MATCH,Proxy
";

    #[test]
    fn test_yaml_sections_replaced_in_place() {
        let out = splice_sections(
            CLASH_BASE,
            SectionStyle::YamlKey,
            &[("proxies", "proxies:\n- name: new\n  type: trojan\n".to_string())],
        );
        assert_eq!(
            out,
            "# my template\nmixed-port: 7890\nproxies:\n- name: new\n  type: trojan\n# groups follow\nproxy-groups:\n  - name: Proxy\n    type: select\nrules:\n- MATCH,Proxy\n"
        );
    }

    #[test]
    fn test_missing_yaml_section_appended() {
        let out = splice_sections(
            "mode: rule\n",
            SectionStyle::YamlKey,
            &[
                ("proxies", "proxies: []".to_string()),
                ("rules", "rules:\n- MATCH,DIRECT".to_string()),
            ],
        );
        assert_eq!(out, "mode: rule\nproxies: []\nrules:\n- MATCH,DIRECT\n");
    }

    #[test]
    fn test_section_lines() {
        let body = section_lines(CLASH_BASE, SectionStyle::YamlKey, "proxy-groups").unwrap();
        assert_eq!(body, vec!["  - name: Proxy", "    type: select"]);
        assert!(section_lines(CLASH_BASE, SectionStyle::YamlKey, "dns").is_none());
    }

    #[test]
    fn test_ini_sections() {
        let base = "[General]\nloglevel = notify\n\n[Proxy]\nold = ss, a, 1\n\n# rules\n[Rule]\nFINAL,DIRECT\n";
        let out = splice_sections(
            base,
            SectionStyle::IniHeader,
            &[
                ("Proxy", "[Proxy]\nnew = trojan, b, 443".to_string()),
                ("Proxy Group", "[Proxy Group]\nP = select, new".to_string()),
            ],
        );
        assert_eq!(
            out,
            "[General]\nloglevel = notify\n\n[Proxy]\nnew = trojan, b, 443\n\n# rules\n[Rule]\nFINAL,DIRECT\n\n[Proxy Group]\nP = select, new\n"
        );
        assert_eq!(
            section_lines(base, SectionStyle::IniHeader, "Rule").unwrap(),
            vec!["FINAL,DIRECT"]
        );
    }
}
