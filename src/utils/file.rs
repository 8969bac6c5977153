use std::fs;
use std::path::Path;

/// Checks if a file exists at the given path
pub fn file_exists(path: &str) -> bool {
    Path::new(path).exists()
}

/// Read a whole file into a string
pub fn file_get(path: &str) -> std::io::Result<String> {
    fs::read_to_string(Path::new(path))
}
