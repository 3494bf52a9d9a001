//! Which files get indexed, and how the chunker reads each language.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Language of an indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Bash,
    Toml,
    Json,
    Markdown,
}

/// Static facts about one language.
struct Profile {
    id: &'static str,
    extensions: &'static [&'static str],
    /// Node kinds that start a chunk; empty means line windows.
    entities: &'static [&'static str],
    /// Top-level node kinds copied into every chunk's import header.
    imports: &'static [&'static str],
}

const JS_ENTITIES: &[&str] = &[
    "function_declaration",
    "class_declaration",
    "method_definition",
    "arrow_function",
    "export_statement",
    "lexical_declaration",
];

static RUST: Profile = Profile {
    id: "rust",
    extensions: &["rs"],
    entities: &[
        "function_item",
        "struct_item",
        "enum_item",
        "trait_item",
        "impl_item",
        "type_item",
        "const_item",
        "static_item",
        "macro_definition",
        "mod_item",
    ],
    imports: &["use_declaration"],
};

static PYTHON: Profile = Profile {
    id: "python",
    extensions: &["py", "pyi"],
    entities: &["function_definition", "class_definition", "decorated_definition"],
    imports: &["import_statement", "import_from_statement"],
};

static JAVASCRIPT: Profile = Profile {
    id: "javascript",
    extensions: &["js", "jsx", "mjs", "cjs"],
    entities: JS_ENTITIES,
    imports: &["import_statement"],
};

static TYPESCRIPT: Profile = Profile {
    id: "typescript",
    extensions: &["ts", "tsx", "mts", "cts"],
    entities: JS_ENTITIES,
    imports: &["import_statement"],
};

static GO: Profile = Profile {
    id: "go",
    extensions: &["go"],
    entities: &[
        "function_declaration",
        "method_declaration",
        "type_declaration",
        "const_declaration",
    ],
    imports: &["import_declaration"],
};

const fn plain(id: &'static str, extensions: &'static [&'static str]) -> Profile {
    Profile {
        id,
        extensions,
        entities: &[],
        imports: &[],
    }
}

static BASH: Profile = plain("bash", &["sh", "bash", "zsh"]);
static TOML: Profile = plain("toml", &["toml"]);
static JSON: Profile = plain("json", &["json", "jsonc"]);
static MARKDOWN: Profile = plain("markdown", &["md", "markdown"]);

impl Lang {
    pub const ALL: [Lang; 9] = [
        Lang::Rust,
        Lang::Python,
        Lang::JavaScript,
        Lang::TypeScript,
        Lang::Go,
        Lang::Bash,
        Lang::Toml,
        Lang::Json,
        Lang::Markdown,
    ];

    fn profile(self) -> &'static Profile {
        match self {
            Self::Rust => &RUST,
            Self::Python => &PYTHON,
            Self::JavaScript => &JAVASCRIPT,
            Self::TypeScript => &TYPESCRIPT,
            Self::Go => &GO,
            Self::Bash => &BASH,
            Self::Toml => &TOML,
            Self::Json => &JSON,
            Self::Markdown => &MARKDOWN,
        }
    }

    /// Identifier stored in the metadata artifact and embedding headers.
    #[must_use]
    pub fn id(self) -> &'static str {
        self.profile().id
    }

    /// Tree-sitter grammar, or `None` when the language feature is disabled.
    #[must_use]
    pub fn grammar(self) -> Option<tree_sitter::Language> {
        match self {
            #[cfg(feature = "lang-rust")]
            Self::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            #[cfg(feature = "lang-python")]
            Self::Python => Some(tree_sitter_python::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            #[cfg(feature = "lang-go")]
            Self::Go => Some(tree_sitter_go::LANGUAGE.into()),
            #[cfg(feature = "lang-config")]
            Self::Bash => Some(tree_sitter_bash::LANGUAGE.into()),
            #[cfg(feature = "lang-config")]
            Self::Toml => Some(tree_sitter_toml_ng::LANGUAGE.into()),
            #[cfg(feature = "lang-config")]
            Self::Json => Some(tree_sitter_json::LANGUAGE.into()),
            #[cfg(feature = "lang-config")]
            Self::Markdown => Some(tree_sitter_md::LANGUAGE.into()),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    #[must_use]
    pub fn entity_node_kinds(self) -> &'static [&'static str] {
        self.profile().entities
    }

    #[must_use]
    pub fn import_node_kinds(self) -> &'static [&'static str] {
        self.profile().imports
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Language owning the file's extension, if any.
#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?;
    Lang::ALL
        .into_iter()
        .find(|lang| lang.profile().extensions.contains(&ext))
}

/// Whether a file is picked up by workspace enumeration.
#[must_use]
pub fn is_indexable(path: &Path) -> bool {
    detect_language(path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_common_extensions() {
        assert_eq!(detect_language(Path::new("src/main.rs")), Some(Lang::Rust));
        assert_eq!(detect_language(Path::new("app.pyi")), Some(Lang::Python));
        assert_eq!(detect_language(Path::new("index.tsx")), Some(Lang::TypeScript));
        assert_eq!(detect_language(Path::new("README.md")), Some(Lang::Markdown));
    }

    #[test]
    fn detect_js_variants() {
        for ext in &["js", "jsx", "mjs", "cjs"] {
            let path = format!("file.{ext}");
            assert_eq!(
                detect_language(Path::new(&path)),
                Some(Lang::JavaScript),
                "failed for .{ext}"
            );
        }
    }

    #[test]
    fn unknown_extension_is_not_indexable() {
        assert_eq!(detect_language(Path::new("file.xyz")), None);
        assert!(!is_indexable(Path::new("Makefile")));
        assert!(is_indexable(Path::new("lib.rs")));
    }

    #[test]
    fn config_languages_have_no_entities() {
        assert!(Lang::Toml.entity_node_kinds().is_empty());
        assert!(Lang::Json.entity_node_kinds().is_empty());
        assert!(Lang::Markdown.import_node_kinds().is_empty());
    }

    #[test]
    fn rust_boundaries() {
        assert!(Lang::Rust.entity_node_kinds().contains(&"function_item"));
        assert_eq!(Lang::Rust.import_node_kinds(), &["use_declaration"]);
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn rust_grammar_enabled() {
        assert!(Lang::Rust.grammar().is_some());
    }

    #[test]
    fn extensions_are_unique_across_languages() {
        let mut seen = std::collections::HashSet::new();
        for lang in Lang::ALL {
            for ext in lang.profile().extensions {
                assert!(seen.insert(*ext), "{ext} claimed twice");
            }
        }
    }

    #[test]
    fn display_matches_id() {
        for lang in Lang::ALL {
            assert_eq!(lang.to_string(), lang.id());
        }
    }
}
