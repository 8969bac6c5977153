//! String utility functions for text processing

/// Split a comma separated list, trimming entries and dropping blanks
///
/// # Examples
/// ```
/// use subcompiler::utils::string::split_list;
///
/// assert_eq!(split_list(" HK, ,jp,"), vec!["HK", "jp"]);
/// ```
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// Lowercased variant of [`split_list`]
pub fn split_list_lower(s: &str) -> Vec<String> {
    split_list(s).into_iter().map(|s| s.to_lowercase()).collect()
}

/// Collapse whitespace runs into single spaces and trim both ends
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_lower() {
        assert_eq!(split_list_lower("VMess,Trojan"), vec!["vmess", "trojan"]);
        assert!(split_list_lower("  ").is_empty());
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \t b  c "), "a b c");
    }
}
