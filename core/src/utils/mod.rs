pub mod parser;

use std::fs::File;
use std::io;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use which::which;

/// Resolves the full path to the scanner binary.
/// Explicit paths are used as given; bare names search ./tools/{name} → ./{name} → System PATH
pub fn get_binary_path(tool_name: &str) -> Option<String> {
    if tool_name.contains('/') || tool_name.contains('\\') {
        let path = Path::new(tool_name);
        return path.exists().then(|| path.to_string_lossy().to_string());
    }

    let binary_name = if cfg!(target_os = "windows") && !tool_name.contains('.') {
        format!("{}.exe", tool_name)
    } else {
        tool_name.to_string()
    };

    let tools_path = PathBuf::from("./tools").join(&binary_name);
    if tools_path.exists() {
        return Some(tools_path.to_string_lossy().to_string());
    }

    let local_path = PathBuf::from("./").join(&binary_name);
    if local_path.is_file() {
        return Some(local_path.to_string_lossy().to_string());
    }

    if let Ok(path) = which(&binary_name) {
        return Some(path.to_string_lossy().to_string());
    }

    None
}

/// Reads a file line-by-line, returning all non-empty trimmed lines.
/// Lines starting with `#` are treated as comments.
pub fn read_lines(path: &str) -> io::Result<Vec<String>> {
    let file = File::open(Path::new(path))?;
    let reader = io::BufReader::new(file);
    let lines = reader
        .lines()
        .filter_map(|line| {
            let line = line.ok()?;
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() || trimmed.starts_with('#') { None } else { Some(trimmed) }
        })
        .collect();
    Ok(lines)
}

/// Returns at most the first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
