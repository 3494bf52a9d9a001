//! Deterministic chunking: tree-sitter AST chunks with greedy sibling merge,
//! falling back to line windows. Every chunk is bounded by `max_size`.

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser};

use crate::error::{IndexError, Result};
use crate::languages::Lang;

/// One chunk of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChunk {
    pub code: String,
    pub node_type: String,
    pub entity_name: Option<String>,
    /// 1-based, inclusive.
    pub line_range: (usize, usize),
    pub scope_chain: String,
    pub imports: String,
    pub content_hash: String,
}

/// Chunk size limits, in non-whitespace characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    #[serde(default = "default_target_size")]
    pub target_size: usize,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Smaller pieces merge with adjacent siblings.
    #[serde(default = "default_min_size")]
    pub min_size: usize,
}

fn default_target_size() -> usize {
    600
}

fn default_max_size() -> usize {
    1200
}

fn default_min_size() -> usize {
    100
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_size: default_target_size(),
            max_size: default_max_size(),
            min_size: default_min_size(),
        }
    }
}

struct ChunkCtx<'a> {
    source: &'a str,
    imports: &'a str,
    config: &'a ChunkerConfig,
}

/// Split a file into chunks.
///
/// Languages without a grammar (or without entity node kinds) are split on
/// line boundaries, with over-long lines cut. The output depends only on the inputs.
///
/// # Errors
///
/// Returns an error if the grammar cannot be loaded or parsing fails.
pub fn chunk_file(source: &str, lang: Option<Lang>, config: &ChunkerConfig) -> Result<Vec<CodeChunk>> {
    let Some((lang, grammar)) = lang.and_then(|l| l.grammar().map(|g| (l, g))) else {
        return Ok(chunk_lines(source, config));
    };
    if lang.entity_node_kinds().is_empty() {
        return Ok(chunk_lines(source, config));
    }

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| IndexError::Parse(format!("set_language failed: {e}")))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| IndexError::Parse(format!("no parse tree for {lang} source")))?;

    let root = tree.root_node();
    let imports = extract_imports(source, &root, lang);
    let ctx = ChunkCtx {
        source,
        imports: &imports,
        config,
    };

    let mut chunks = Vec::new();
    chunk_children(&ctx, &root, "", &mut chunks);
    merge_small_chunks(&mut chunks, config);

    if chunks.is_empty() {
        return Ok(chunk_lines(source, config));
    }

    Ok(split_oversized(chunks, config))
}

/// Line-window chunking for files without a usable grammar.
///
/// A line longer than `max_size` is cut at character boundaries; its pieces
/// keep that line's number.
#[must_use]
pub fn chunk_lines(source: &str, config: &ChunkerConfig) -> Vec<CodeChunk> {
    let mut chunks = Vec::new();
    let mut start_line = 1;
    let mut current = String::new();
    let mut current_nws = 0;

    for (i, line) in source.lines().enumerate() {
        let line_no = i + 1;
        for (piece_idx, piece) in split_long_line(line, config.max_size).into_iter().enumerate() {
            let piece_nws = non_ws_len(piece);
            if current_nws + piece_nws > config.target_size && current_nws > 0 {
                let end = if piece_idx == 0 { line_no - 1 } else { line_no };
                chunks.push(line_chunk(&current, start_line, end));
                current.clear();
                current_nws = 0;
                start_line = line_no;
            }
            if piece_idx == 0 && !current.is_empty() {
                current.push('\n');
            }
            current.push_str(piece);
            current_nws += piece_nws;
        }
    }

    if current_nws > 0 {
        chunks.push(line_chunk(&current, start_line, source.lines().count()));
    }

    if chunks.len() == 1 {
        chunks[0].node_type = "file".to_string();
    }
    chunks
}

/// Cut `line` into pieces of at most `limit` non-whitespace characters.
fn split_long_line(line: &str, limit: usize) -> Vec<&str> {
    let limit = limit.max(1);
    if non_ws_len(line) <= limit {
        return vec![line];
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, c) in line.char_indices() {
        if c.is_whitespace() {
            continue;
        }
        if count == limit {
            pieces.push(&line[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    pieces.push(&line[start..]);
    pieces
}

fn line_chunk(code: &str, start: usize, end: usize) -> CodeChunk {
    CodeChunk {
        content_hash: blake3_hex(code),
        line_range: (start, end.max(start)),
        entity_name: None,
        node_type: "lines".to_string(),
        scope_chain: String::new(),
        imports: String::new(),
        code: code.to_string(),
    }
}

fn chunk_children(ctx: &ChunkCtx<'_>, parent: &Node, parent_scope: &str, output: &mut Vec<CodeChunk>) {
    let mut batch: Vec<Node> = Vec::new();
    let mut batch_size: usize = 0;
    let child_count = u32::try_from(parent.named_child_count()).unwrap_or(u32::MAX);

    for i in 0..child_count {
        let Some(child) = parent.named_child(i) else {
            continue;
        };
        let child_nws = non_ws_len(&ctx.source[child.byte_range()]);

        if child_nws > ctx.config.max_size {
            flush_batch(ctx, &batch, parent_scope, output);
            batch.clear();
            batch_size = 0;

            let scope = extend_scope(parent_scope, &child, ctx.source);
            if child.named_child_count() == 0 {
                // Leaf too large to descend into; split_oversized bounds it.
                flush_batch(ctx, &[child], &scope, output);
            } else {
                chunk_children(ctx, &child, &scope, output);
            }
            continue;
        }

        if batch_size + child_nws > ctx.config.target_size && !batch.is_empty() {
            flush_batch(ctx, &batch, parent_scope, output);
            batch.clear();
            batch_size = 0;
        }

        batch.push(child);
        batch_size += child_nws;
    }

    flush_batch(ctx, &batch, parent_scope, output);
}

fn flush_batch(ctx: &ChunkCtx<'_>, batch: &[Node], scope: &str, output: &mut Vec<CodeChunk>) {
    let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
        return;
    };

    let code = &ctx.source[first.start_byte()..last.end_byte()];
    if non_ws_len(code) == 0 {
        return;
    }

    let entity_name = batch
        .iter()
        .find_map(|n| extract_entity_name(n, ctx.source));
    let node_type = if batch.len() == 1 {
        first.kind().to_string()
    } else {
        format!("{}x{}", first.kind(), batch.len())
    };

    output.push(CodeChunk {
        content_hash: blake3_hex(code),
        line_range: (first.start_position().row + 1, last.end_position().row + 1),
        entity_name,
        node_type,
        scope_chain: scope.to_string(),
        imports: ctx.imports.to_string(),
        code: code.to_string(),
    });
}

fn extract_imports(source: &str, root: &Node, lang: Lang) -> String {
    let import_kinds = lang.import_node_kinds();
    let mut imports = String::new();
    if import_kinds.is_empty() {
        return imports;
    }

    let child_count = u32::try_from(root.named_child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        let Some(child) = root.named_child(i) else {
            continue;
        };
        if import_kinds.contains(&child.kind()) {
            imports.push_str(&source[child.byte_range()]);
            imports.push('\n');
        }
    }
    imports
}

fn extract_entity_name(node: &Node, source: &str) -> Option<String> {
    // impl_item has no "name" field; its "type" field names the entity.
    node.child_by_field_name("name")
        .or_else(|| node.child_by_field_name("type"))
        .map(|n| source[n.byte_range()].to_string())
}

fn extend_scope(parent_scope: &str, node: &Node, source: &str) -> String {
    let name = extract_entity_name(node, source).unwrap_or_else(|| node.kind().to_string());
    if parent_scope.is_empty() {
        name
    } else {
        format!("{parent_scope} > {name}")
    }
}

fn merge_small_chunks(chunks: &mut Vec<CodeChunk>, config: &ChunkerConfig) {
    let mut i = 0;
    while i + 1 < chunks.len() {
        let cur_nws = non_ws_len(&chunks[i].code);
        let next_nws = non_ws_len(&chunks[i + 1].code);

        if cur_nws < config.min_size && cur_nws + next_nws <= config.target_size {
            let next = chunks.remove(i + 1);
            let cur = &mut chunks[i];
            cur.code.push('\n');
            cur.code.push_str(&next.code);
            cur.line_range.1 = next.line_range.1;
            cur.content_hash = blake3_hex(&cur.code);
            if cur.entity_name.is_none() {
                cur.entity_name = next.entity_name;
            }
        } else {
            i += 1;
        }
    }
}

/// Re-split any chunk above `max_size` through [`chunk_lines`].
fn split_oversized(chunks: Vec<CodeChunk>, config: &ChunkerConfig) -> Vec<CodeChunk> {
    let mut out = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if non_ws_len(&chunk.code) <= config.max_size {
            out.push(chunk);
            continue;
        }
        let offset = chunk.line_range.0 - 1;
        for mut piece in chunk_lines(&chunk.code, config) {
            piece.line_range = (piece.line_range.0 + offset, piece.line_range.1 + offset);
            piece.node_type.clone_from(&chunk.node_type);
            piece.entity_name.clone_from(&chunk.entity_name);
            piece.scope_chain.clone_from(&chunk.scope_chain);
            piece.imports.clone_from(&chunk.imports);
            out.push(piece);
        }
    }
    out
}

pub(crate) fn non_ws_len(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

pub(crate) fn blake3_hex(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}
