//! Extension-based language tagging.

use std::path::Path;

/// Tag reported for unknown or missing extensions.
pub const DEFAULT_LANGUAGE: &str = "text";

/// Every tag [`classify`] can return.
pub const LANGUAGES: &[&str] = &[
    "javascript",
    "typescript",
    "python",
    "java",
    "cpp",
    "c",
    "css",
    "scss",
    "sass",
    "html",
    "xml",
    "json",
    "markdown",
    "sql",
    "shell",
    "php",
    "ruby",
    "go",
    "rust",
    "kotlin",
    "swift",
    "yaml",
    "dockerfile",
    "text",
];

/// Map a file name to its language tag.
///
/// Matching is on the final extension, case-insensitively. Dotfiles such as
/// `.gitignore` have no extension and fall back to [`DEFAULT_LANGUAGE`].
pub fn classify(file_name: &str) -> &'static str {
    let Some(extension) = Path::new(file_name).extension().and_then(|e| e.to_str()) else {
        return DEFAULT_LANGUAGE;
    };

    match extension.to_ascii_lowercase().as_str() {
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" => "python",
        "java" => "java",
        "cpp" => "cpp",
        "c" | "h" => "c",
        "css" => "css",
        "scss" => "scss",
        "sass" => "sass",
        "html" => "html",
        "xml" => "xml",
        "json" => "json",
        "md" => "markdown",
        "sql" => "sql",
        "sh" => "shell",
        "php" => "php",
        "rb" => "ruby",
        "go" => "go",
        "rs" => "rust",
        "kt" => "kotlin",
        "swift" => "swift",
        "yaml" | "yml" => "yaml",
        "dockerfile" => "dockerfile",
        _ => DEFAULT_LANGUAGE,
    }
}
