use serde::{Deserialize, Serialize};
use std::path::Path;

/// Language recognized by the catalog, keyed off file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    C,
    Cpp,
    Java,
    CSharp,
    JavaScript,
    TypeScript,
    Sql,
    Go,
    Php,
    Ruby,
    Rust,
    Swift,
    Kotlin,
    Scala,
    Perl,
    Shell,
    PowerShell,
    Yaml,
    Json,
    Xml,
    Html,
    Css,
    Scss,
    Sass,
    Vue,
    Svelte,
    Unknown,
}

/// Every extension the catalog knows how to classify.
pub const KNOWN_EXTENSIONS: &[&str] = &[
    "py", "c", "h", "cpp", "cc", "cxx", "hpp", "java", "cs", "js", "jsx", "ts", "tsx", "sql", "go",
    "php", "rb", "rs", "swift", "kt", "scala", "pl", "sh", "bash", "ps1", "yaml", "yml", "json",
    "xml", "html", "css", "scss", "sass", "vue", "svelte",
];

/// Structured-config extensions, excluded when a scan opts out of config files.
pub const CONFIG_EXTENSIONS: &[&str] = &["yaml", "yml", "json", "xml"];

impl Language {
    /// Detect language from a file extension (without the leading dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "py" => Language::Python,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" => Language::Cpp,
            "java" => Language::Java,
            "cs" => Language::CSharp,
            "js" | "jsx" => Language::JavaScript,
            "ts" | "tsx" => Language::TypeScript,
            "sql" => Language::Sql,
            "go" => Language::Go,
            "php" => Language::Php,
            "rb" => Language::Ruby,
            "rs" => Language::Rust,
            "swift" => Language::Swift,
            "kt" => Language::Kotlin,
            "scala" => Language::Scala,
            "pl" => Language::Perl,
            "sh" | "bash" => Language::Shell,
            "ps1" => Language::PowerShell,
            "yaml" | "yml" => Language::Yaml,
            "json" => Language::Json,
            "xml" => Language::Xml,
            "html" => Language::Html,
            "css" => Language::Css,
            "scss" => Language::Scss,
            "sass" => Language::Sass,
            "vue" => Language::Vue,
            "svelte" => Language::Svelte,
            _ => Language::Unknown,
        }
    }

    /// Detect language from a file path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::CSharp => "csharp",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Sql => "sql",
            Language::Go => "go",
            Language::Php => "php",
            Language::Ruby => "ruby",
            Language::Rust => "rust",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Scala => "scala",
            Language::Perl => "perl",
            Language::Shell => "shell",
            Language::PowerShell => "powershell",
            Language::Yaml => "yaml",
            Language::Json => "json",
            Language::Xml => "xml",
            Language::Html => "html",
            Language::Css => "css",
            Language::Scss => "scss",
            Language::Sass => "sass",
            Language::Vue => "vue",
            Language::Svelte => "svelte",
            Language::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn detects_from_extension_case_insensitively() {
        assert_eq!(Language::from_extension("PY"), Language::Python);
        assert_eq!(Language::from_extension("Rs"), Language::Rust);
        assert_eq!(Language::from_extension("weird"), Language::Unknown);
    }

    #[test]
    fn detects_from_path() {
        assert_eq!(Language::from_path("src/main.rs"), Language::Rust);
        assert_eq!(Language::from_path("app/models.py"), Language::Python);
        assert_eq!(Language::from_path("Makefile"), Language::Unknown);
    }

    #[test]
    fn every_known_extension_maps_to_a_language() {
        for ext in KNOWN_EXTENSIONS {
            assert_ne!(
                Language::from_extension(ext),
                Language::Unknown,
                "extension {ext} is listed as known but detects as unknown"
            );
        }
    }

    #[test]
    fn config_extensions_are_a_subset_of_known() {
        for ext in CONFIG_EXTENSIONS {
            assert!(KNOWN_EXTENSIONS.contains(ext));
        }
    }
}
