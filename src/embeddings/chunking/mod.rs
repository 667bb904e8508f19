
use tracing::debug;

/// Maximum chunk size in bytes for document splitting, kept under the
/// embedding backend's request payload limit.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 5000;

/// Split a document into chunks no larger than `max_size` bytes.
///
/// Documents at or under the limit come back as a single chunk. Oversized
/// documents are split at blank-line paragraph boundaries, accumulating
/// paragraphs greedily; a paragraph that alone exceeds the limit is
/// re-split at sentence boundaries. A single sentence longer than
/// `max_size` is returned whole rather than split mid-sentence.
///
/// Concatenating the returned chunks in order reproduces the input up to
/// whitespace normalization at the split boundaries.
#[inline]
pub fn split_text(text: &str, max_size: usize) -> Vec<String> {
    if text.len() <= max_size {
        return vec![text.to_string()];
    }

    debug!(
        "Splitting document of {} bytes into chunks of at most {} bytes",
        text.len(),
        max_size
    );

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        // +2 accounts for the blank-line separator that would join the
        // paragraph onto the current buffer
        if current.len() + paragraph.len() + 2 > max_size {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }

            if paragraph.len() > max_size {
                current = split_oversized_paragraph(paragraph, max_size, &mut chunks);
            } else {
                current = paragraph.to_string();
            }
        } else if current.is_empty() {
            current = paragraph.to_string();
        } else {
            current.push_str("\n\n");
            current.push_str(paragraph);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    debug!("Document split into {} chunks", chunks.len());
    chunks
}

/// Sentence-level split for a paragraph that exceeds `max_size` on its own.
/// Completed chunks are pushed into `chunks`; the trailing buffer is
/// returned so following paragraphs can continue accumulating onto it.
fn split_oversized_paragraph(paragraph: &str, max_size: usize, chunks: &mut Vec<String>) -> String {
    let mut buffer = String::new();

    for sentence in sentences(paragraph) {
        if buffer.len() + sentence.len() + 1 > max_size {
            if !buffer.is_empty() {
                chunks.push(std::mem::take(&mut buffer));
            }
            // An over-long single sentence lands here unsplit; it is
            // flushed whole on the next overflow or at the end.
            buffer = sentence;
        } else if buffer.is_empty() {
            buffer = sentence;
        } else {
            buffer.push(' ');
            buffer.push_str(&sentence);
        }
    }

    buffer
}

/// Heuristic sentence segmentation: a period followed by a space ends a
/// sentence. The period stays with its sentence.
fn sentences(paragraph: &str) -> Vec<String> {
    let parts: Vec<&str> = paragraph.split(". ").collect();
    let last = parts.len() - 1;

    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            if i < last {
                format!("{part}.")
            } else {
                (*part).to_string()
            }
        })
        .collect()
}
