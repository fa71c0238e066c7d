/// A single page-attributed span of document text, produced by the loader
/// before splitting. `page_number` is `None` for loaders that don't carry
/// page boundaries (e.g. plain text).
#[derive(Debug, Clone)]
pub struct Page {
    pub text: String,
    pub page_number: Option<u32>,
}

/// A chunk produced by `RecursiveCharacterSplitter`, still carrying the page
/// it was cut from so `EmbeddingPipeline` can populate `page_number`.
#[derive(Debug, Clone)]
pub struct TextChunk {
    pub content: String,
    pub page_number: Option<u32>,
}

const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Recursive character splitter: tries each separator in priority
/// order, recursing into any piece still larger than `chunk_size`, then
/// reassembles adjacent pieces into `chunk_size`-ish windows with
/// `chunk_overlap` characters of overlap carried into the next window.
///
/// Mirrors `langchain_text_splitters.RecursiveCharacterTextSplitter` with
/// `separators=["\n\n", "\n", " ", ""]`.
pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveCharacterSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        assert!(chunk_overlap < chunk_size, "chunk_overlap must be < chunk_size");
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Split a sequence of pages into content-bearing chunks, preserving
    /// each chunk's originating page number. Empty input yields no chunks;
    /// callers treat that as `empty_document`.
    pub fn split_pages(&self, pages: &[Page]) -> Vec<TextChunk> {
        let mut out = Vec::new();
        for page in pages {
            let pieces = split_text(&page.text, SEPARATORS, self.chunk_size);
            for window in merge_with_overlap(&pieces, self.chunk_size, self.chunk_overlap) {
                if window.trim().is_empty() {
                    continue;
                }
                out.push(TextChunk {
                    content: window,
                    page_number: page.page_number,
                });
            }
        }
        out
    }
}

/// Recursively split `text` by the first separator that actually divides it,
/// falling through the priority list; pieces still over `chunk_size` after
/// the last separator (`""`, i.e. per-character) are hard-cut.
fn split_text(text: &str, separators: &[&str], chunk_size: usize) -> Vec<String> {
    if text.len() <= chunk_size || separators.is_empty() {
        return split_by_chars(text, chunk_size);
    }

    let sep = separators[0];
    let rest = &separators[1..];
    if sep.is_empty() {
        return split_by_chars(text, chunk_size);
    }

    let pieces: Vec<&str> = text.split(sep).collect();
    if pieces.len() <= 1 {
        return split_text(text, rest, chunk_size);
    }

    let mut out = Vec::new();
    for (i, piece) in pieces.iter().enumerate() {
        if piece.is_empty() {
            continue;
        }
        if piece.len() > chunk_size {
            out.extend(split_text(piece, rest, chunk_size));
        } else {
            out.push(piece.to_string());
        }
        // Reattach the separator as a boundary marker so `merge_with_overlap`
        // can rejoin adjacent pieces with it; skipped after the last piece.
        if i + 1 < pieces.len() {
            if let Some(last) = out.last_mut() {
                last.push_str(sep);
            }
        }
    }
    out
}

fn split_by_chars(text: &str, chunk_size: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.chars()
        .collect::<Vec<char>>()
        .chunks(chunk_size.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

/// Greedily packs `pieces` into windows of up to `chunk_size` characters,
/// carrying the trailing `chunk_overlap` characters of each window into the
/// next so adjacent chunks share context.
fn merge_with_overlap(pieces: &[String], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if pieces.is_empty() {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        if !current.is_empty() && current.len() + piece.len() > chunk_size {
            windows.push(std::mem::take(&mut current));
            let overlap_start = windows
                .last()
                .map(|w| tail_chars(w, chunk_overlap))
                .unwrap_or_default();
            current.push_str(&overlap_start);
        }
        current.push_str(piece);
    }
    if !current.trim().is_empty() {
        windows.push(current);
    }
    windows
}

fn tail_chars(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}
