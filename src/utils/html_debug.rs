// src/utils/html_debug.rs
use std::fs::File;
use std::io::Write;
use std::path::Path;
use crate::utils::error::AppError;

/// Patterns always highlighted in debug copies.
pub const TABLE_PATTERNS: [(&str, &str); 2] = [
    (r"(?i)<table[^>]*>", "table"),
    (r"(?i)</table\s*>", "table"),
];

/// Saves a HTML document to a file with debug highlights
pub fn save_debug_html(html: &str, path: &Path, highlights: &[(usize, usize, &str)]) -> Result<(), AppError> {
    let mut file = File::create(path)?;

    // Add debug styling in head
    let mut debug_html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n");

    // CSS for highlight colors
    debug_html.push_str(".highlight-table { background-color: #90EE90; }\n");
    debug_html.push_str(".highlight-unparsed { background-color: #FFA500; }\n");
    debug_html.push_str(".highlight-custom { background-color: #FFC0CB; }\n");
    debug_html.push_str("</style>\n</head>\n<body>\n");

    let mut last_pos = 0;
    let mut sorted_highlights = highlights.to_vec();
    sorted_highlights.sort_by_key(|h| h.0); // Sort by position

    for (start, end, highlight_type) in sorted_highlights {
        // Overlapping matches keep the first one
        if start < last_pos {
            continue;
        }
        debug_html.push_str(&html[last_pos..start]);

        let css_class = match highlight_type {
            "table" => "highlight-table",
            "unparsed" => "highlight-unparsed",
            _ => "highlight-custom",
        };

        debug_html.push_str(&format!("<span class=\"{}\" title=\"Position: {}-{}, Type: {}\">",
            css_class, start, end, highlight_type));
        debug_html.push_str(&html[start..end]);
        debug_html.push_str("</span>");

        last_pos = end;
    }

    if last_pos < html.len() {
        debug_html.push_str(&html[last_pos..]);
    }

    debug_html.push_str("\n</body>\n</html>");
    file.write_all(debug_html.as_bytes())?;

    tracing::info!("Saved debug HTML to {}", path.display());
    Ok(())
}

/// Creates a debug version of an HTML document with table tags and the
/// given literal cell values highlighted.
pub fn create_debug_html(html: &str, path: &Path, unparsed_values: &[&str]) -> Result<(), AppError> {
    use regex::Regex;

    let mut patterns: Vec<(String, &str)> = TABLE_PATTERNS
        .iter()
        .map(|(p, kind)| (p.to_string(), *kind))
        .collect();
    patterns.extend(
        unparsed_values
            .iter()
            .map(|v| (format!(r">\s*({})\s*<", regex::escape(v)), "unparsed")),
    );

    let mut highlights = Vec::new();
    for (pattern, highlight_type) in &patterns {
        let re = Regex::new(pattern).map_err(|e| {
            AppError::Config(format!("Invalid regex pattern '{}': {}", pattern, e))
        })?;

        for caps in re.captures_iter(html) {
            // Highlight the value itself when the pattern captures it
            if let Some(m) = caps.get(1).or_else(|| caps.get(0)) {
                highlights.push((m.start(), m.end(), *highlight_type));
            }
        }
    }

    save_debug_html(html, path, &highlights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlights_tables_and_unparsed_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotated.html");
        let html = "<table><tr><td>3.14159</td><td>1.234,5</td></tr></table>";

        create_debug_html(html, &path, &["3.14159"]).unwrap();
        let out = std::fs::read_to_string(&path).unwrap();

        assert!(out.contains("class=\"highlight-table\" title=\"Position: 0-7, Type: table\"><table></span>"));
        assert!(out.contains("<span class=\"highlight-unparsed\" title=\"Position: 15-22, Type: unparsed\">3.14159</span>"));
        assert!(out.contains("<td>1.234,5</td>"));
        assert!(out.contains("</table></span>"));
    }
}
