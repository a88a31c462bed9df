//! Adaptive text chunking
//!
//! Splits extracted text into embedding-sized chunks. The base split
//! prefers paragraph and sentence boundaries over mid-word cuts (via
//! `text-splitter`); consecutive chunks then share a configurable
//! overlap so context survives the boundary. Document-kind-aware
//! strategies handle structured inputs: section-header splitting for
//! resumes and contracts, header-preserving row batches for tabular
//! files, paragraph packing for reviews.

use serde::{Deserialize, Serialize};
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Rows per chunk for tabular content, header excluded
const TABLE_ROWS_PER_CHUNK: usize = 10;

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
    /// Minimum chunk size; smaller fragments are merged forward
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 120,
            min_chunk_size: 80,
        }
    }
}

impl From<&querybridge_common::config::IngestionConfig> for ChunkingConfig {
    fn from(c: &querybridge_common::config::IngestionConfig) -> Self {
        Self {
            chunk_size: c.chunk_size,
            chunk_overlap: c.chunk_overlap,
            min_chunk_size: c.min_chunk_size,
        }
    }
}

/// A chunk of document text with its position in the document's linear
/// order. Indexes are contiguous, zero-based, strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub content: String,
    pub index: usize,
}

/// Inferred document kind driving the chunking strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Resume,
    Contract,
    Review,
    Table,
    Generic,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Resume => "resume",
            DocumentKind::Contract => "contract",
            DocumentKind::Review => "review",
            DocumentKind::Table => "table",
            DocumentKind::Generic => "generic",
        }
    }
}

/// Infer the document kind from content and file name
pub fn infer_document_kind(text: &str, file_name: &str) -> DocumentKind {
    let lower_name = file_name.to_lowercase();
    if lower_name.ends_with(".csv") || lower_name.ends_with(".tsv") {
        return DocumentKind::Table;
    }

    let lower = text.to_lowercase();
    if lower.contains("resume") || lower.contains("objective") || lower.contains("skills") {
        DocumentKind::Resume
    } else if lower.contains("agreement") || lower.contains("clause") || lower.contains("party") {
        DocumentKind::Contract
    } else if lower.contains("performance") && lower.contains("review") {
        DocumentKind::Review
    } else {
        DocumentKind::Generic
    }
}

/// Chunk a document with the strategy its kind calls for
pub fn chunk_document(text: &str, file_name: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let kind = infer_document_kind(text, file_name);
    let chunks = match kind {
        DocumentKind::Resume => chunk_by_sections(
            text,
            &["skills", "experience", "projects", "education"],
            config,
        ),
        DocumentKind::Contract => chunk_by_sections(text, &["section", "clause", "article"], config),
        DocumentKind::Review => chunk_paragraphs(text, config),
        DocumentKind::Table => chunk_table_rows(text, TABLE_ROWS_PER_CHUNK),
        DocumentKind::Generic => chunk_text(text, config),
    };

    debug!(
        file = file_name,
        kind = kind.as_str(),
        input_len = text.len(),
        chunk_count = chunks.len(),
        "Document chunked"
    );
    chunks
}

/// Boundary-preferring split with overlap: `text-splitter` produces the
/// base chunks (it prefers paragraph, then sentence, then word breaks),
/// and each subsequent chunk is prefixed with the word-snapped tail of
/// its predecessor.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let splitter = TextSplitter::new(ChunkConfig::new(config.chunk_size));
    let base: Vec<&str> = splitter.chunks(text).collect();

    let merged = merge_small(
        base.into_iter().map(|c| c.trim().to_string()).collect(),
        config,
    );

    let mut result = Vec::with_capacity(merged.len());
    let mut previous: Option<&str> = None;
    let mut contents = Vec::with_capacity(merged.len());
    for chunk in &merged {
        let content = match previous {
            Some(prev) if config.chunk_overlap > 0 => {
                let tail = overlap_tail(prev, config.chunk_overlap);
                if tail.is_empty() {
                    chunk.clone()
                } else {
                    format!("{} {}", tail, chunk)
                }
            }
            _ => chunk.clone(),
        };
        contents.push(content);
        previous = Some(chunk.as_str());
    }

    for (index, content) in contents.into_iter().enumerate() {
        result.push(TextChunk { content, index });
    }
    result
}

/// Split at lines containing section keywords, then pack to size.
/// Content before the first matching header stays in its own chunk.
fn chunk_by_sections(text: &str, keywords: &[&str], config: &ChunkingConfig) -> Vec<TextChunk> {
    let mut sections: Vec<String> = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();

    for line in text.lines() {
        let lower = line.to_lowercase();
        if keywords.iter().any(|k| lower.contains(k)) && !buffer.is_empty() {
            sections.push(buffer.join("\n").trim().to_string());
            buffer.clear();
        }
        buffer.push(line);
    }
    if !buffer.is_empty() {
        sections.push(buffer.join("\n").trim().to_string());
    }

    pack_pieces(sections, config)
}

/// Split on blank lines and pack paragraphs up to the target size
fn chunk_paragraphs(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let paragraphs: Vec<String> = text
        .split("\n\n")
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    pack_pieces(paragraphs, config)
}

/// Batch tabular rows, repeating the header in every chunk so each chunk
/// is independently interpretable
fn chunk_table_rows(text: &str, rows_per_chunk: usize) -> Vec<TextChunk> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let Some((header, rows)) = lines.split_first() else {
        return Vec::new();
    };

    if rows.is_empty() {
        return vec![TextChunk {
            content: header.to_string(),
            index: 0,
        }];
    }

    rows.chunks(rows_per_chunk.max(1))
        .enumerate()
        .map(|(index, batch)| {
            let mut content = String::from(*header);
            for row in batch {
                content.push('\n');
                content.push_str(row);
            }
            TextChunk { content, index }
        })
        .collect()
}

/// Pack pieces into chunks close to the target size; any piece larger
/// than the target falls through to the boundary-preferring splitter.
fn pack_pieces(pieces: Vec<String>, config: &ChunkingConfig) -> Vec<TextChunk> {
    let mut packed: Vec<String> = Vec::new();
    let mut buffer = String::new();

    for piece in pieces {
        if piece.is_empty() {
            continue;
        }
        if piece.len() > config.chunk_size {
            if !buffer.is_empty() {
                packed.push(std::mem::take(&mut buffer));
            }
            // Oversized section: fall back to the plain splitter, no
            // overlap inside a section
            let inner = ChunkingConfig {
                chunk_overlap: 0,
                ..config.clone()
            };
            packed.extend(chunk_text(&piece, &inner).into_iter().map(|c| c.content));
            continue;
        }
        if !buffer.is_empty() && buffer.len() + piece.len() + 1 > config.chunk_size {
            packed.push(std::mem::take(&mut buffer));
        }
        if buffer.is_empty() {
            buffer = piece;
        } else {
            buffer.push('\n');
            buffer.push_str(&piece);
        }
    }
    if !buffer.is_empty() {
        packed.push(buffer);
    }

    merge_small(packed, config)
        .into_iter()
        .enumerate()
        .map(|(index, content)| TextChunk { content, index })
        .collect()
}

/// Merge fragments smaller than the minimum into their successor so no
/// undersized chunk survives (except a lone final one)
fn merge_small(chunks: Vec<String>, config: &ChunkingConfig) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(chunks.len());
    let mut carry = String::new();

    for chunk in chunks {
        let combined = if carry.is_empty() {
            chunk
        } else {
            format!("{}\n{}", carry, chunk)
        };
        if combined.len() < config.min_chunk_size {
            carry = combined;
        } else {
            merged.push(combined);
            carry.clear();
        }
    }
    if !carry.is_empty() {
        match merged.last_mut() {
            Some(last) if last.len() + carry.len() < config.chunk_size * 2 => {
                last.push('\n');
                last.push_str(&carry);
            }
            _ => merged.push(carry),
        }
    }
    merged
}

/// The last `overlap` characters of a chunk, snapped forward to a word
/// boundary so the overlap never starts mid-word
fn overlap_tail(text: &str, overlap: usize) -> &str {
    if overlap == 0 {
        return "";
    }
    if text.len() <= overlap {
        return text;
    }

    let mut start = text.len() - overlap;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    let tail = &text[start..];
    match tail.find(char::is_whitespace) {
        Some(pos) => tail[pos..].trim_start(),
        None => tail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(size: usize, overlap: usize, min: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            min_chunk_size: min,
        }
    }

    fn assert_contiguous_ordinals(chunks: &[TextChunk]) {
        for (expected, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, expected);
        }
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("", &ChunkingConfig::default()).is_empty());
        assert!(chunk_text("   \n  ", &ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn test_basic_chunking_respects_size() {
        let text = "This is a sentence. ".repeat(100);
        let chunks = chunk_text(&text, &config(200, 0, 50));
        assert!(chunks.len() > 1);
        assert_contiguous_ordinals(&chunks);
        for chunk in &chunks {
            assert!(chunk.content.len() <= 200);
        }
    }

    #[test]
    fn test_overlap_carries_context() {
        let text = "First sentence here. Second sentence follows. Third sentence arrives. Fourth sentence closes. Fifth one too.".repeat(3);
        let chunks = chunk_text(&text, &config(120, 40, 20));
        assert!(chunks.len() > 1);

        // Each chunk after the first starts with text from its predecessor
        for pair in chunks.windows(2) {
            let first_words: Vec<&str> = pair[1].content.split_whitespace().take(2).collect();
            assert!(
                pair[0].content.contains(&first_words.join(" ")),
                "chunk {} does not overlap its predecessor",
                pair[1].index
            );
        }
    }

    #[test]
    fn test_overlap_starts_on_word_boundary() {
        let tail = overlap_tail("alpha beta gamma delta", 10);
        // "mma delta" would start mid-word; the snap moves it to "delta"
        assert_eq!(tail, "delta");
    }

    #[test]
    fn test_sentence_boundaries_preferred() {
        let text = "Short opener. A second sentence that is a bit longer than the first one. Final thought.";
        let chunks = chunk_text(text, &config(60, 0, 10));
        // No chunk starts mid-word
        for chunk in &chunks {
            assert!(!chunk.content.starts_with(char::is_whitespace));
            assert!(!chunk.content.is_empty());
        }
        assert_contiguous_ordinals(&chunks);
    }

    #[test]
    fn test_table_chunking_repeats_header() {
        let mut csv = String::from("id,name,salary");
        for i in 0..25 {
            csv.push_str(&format!("\n{},person{},{}", i, i, 50000 + i));
        }

        let chunks = chunk_document(&csv, "people.csv", &ChunkingConfig::default());
        assert_eq!(chunks.len(), 3); // 25 rows at 10 per chunk
        assert_contiguous_ordinals(&chunks);
        for chunk in &chunks {
            assert!(chunk.content.starts_with("id,name,salary"));
        }
    }

    #[test]
    fn test_resume_sections_split() {
        let resume = "Jane Doe\nObjective: build things\n\nSkills\nPython, AWS, SQL\n\nExperience\nFive years at Example Corp doing data work.\n\nEducation\nBS in Computer Science.";
        let chunks = chunk_document(resume, "jane.txt", &config(120, 0, 10));
        assert!(!chunks.is_empty());
        assert_contiguous_ordinals(&chunks);
        // Section content survives
        let all: String = chunks.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n");
        assert!(all.contains("Python, AWS, SQL"));
        assert!(all.contains("Computer Science"));
    }

    #[test]
    fn test_small_fragments_merged() {
        let text = "Tiny.\n\nAlso tiny.\n\nStill small.";
        let chunks = chunk_paragraphs(text, &config(200, 0, 50));
        // Three tiny paragraphs collapse rather than producing three
        // undersized chunks
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_single_chunk_document() {
        let text = "One modest paragraph that fits within a single chunk.";
        let chunks = chunk_text(text, &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].content, text);
    }

    #[test]
    fn test_kind_inference() {
        assert_eq!(infer_document_kind("skills: python", "cv.txt"), DocumentKind::Resume);
        assert_eq!(
            infer_document_kind("this agreement between party a and party b", "c.txt"),
            DocumentKind::Contract
        );
        assert_eq!(
            infer_document_kind("annual performance review notes", "r.txt"),
            DocumentKind::Review
        );
        assert_eq!(infer_document_kind("a,b,c", "data.csv"), DocumentKind::Table);
        assert_eq!(infer_document_kind("plain prose", "notes.txt"), DocumentKind::Generic);
    }
}
