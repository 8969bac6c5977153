use regex::Regex;

/// Compile a list of case-insensitive patterns.
///
/// # Arguments
/// * `patterns` - The regex patterns to compile
///
/// # Returns
/// * `Ok(Vec<Regex>)` - All patterns compiled
/// * `Err(String)` - The first pattern that failed, with the reason
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, String> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).map_err(|e| format!("'{}': {}", p, e)))
        .collect()
}
