//! Embedding text generation.
//!
//! Raw code embeds poorly for conceptual queries; prefixing the file path,
//! scope chain, language and a few imports gives the model something to
//! anchor on.

use std::path::Path;

use crate::chunker::CodeChunk;
use crate::languages::Lang;

/// Maximum number of import lines included in the embedding text.
const MAX_IMPORT_LINES: usize = 5;

/// Text sent to the embeddings provider for one chunk. Not for display.
#[must_use]
pub fn contextualize_for_embedding(chunk: &CodeChunk, path: &Path, lang: Option<Lang>) -> String {
    let mut text = String::with_capacity(chunk.code.len() + 256);

    text.push_str("# ");
    text.push_str(&path.to_string_lossy());
    text.push('\n');

    if !chunk.scope_chain.is_empty() {
        text.push_str("# Scope: ");
        text.push_str(&chunk.scope_chain);
        text.push('\n');
    }

    if let Some(lang) = lang {
        text.push_str("# Language: ");
        text.push_str(lang.id());
        text.push('\n');
    }

    for line in chunk.imports.lines().take(MAX_IMPORT_LINES) {
        text.push_str(line);
        text.push('\n');
    }

    text.push_str(&chunk.code);
    text
}
