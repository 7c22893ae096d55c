use crate::pipeline::Segment;

/// Token that separates segment texts inside a batch prompt and its answer.
pub const DELIMITER_TOKEN: &str = "[SSS]";

/// What is sent between two segment texts.
pub const DELIMITER: &str = "\n[SSS]\n";

/// Stand-in written over a delimiter token found inside source text.
const ESCAPED_TOKEN: &str = "(SSS)";

/// Contiguous slice of segments translated by one request
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    /// 1-based position among the run's batches
    pub index: usize,
    pub segments: &'a [Segment],
}

impl Batch<'_> {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Split segments into consecutive batches of at most `batch_size`.
pub fn partition(segments: &[Segment], batch_size: usize) -> Vec<Batch<'_>> {
    segments
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(i, chunk)| Batch {
            index: i + 1,
            segments: chunk,
        })
        .collect()
}

/// Join trimmed segment texts with the delimiter. Returns the joined text and
/// how many texts had a delimiter token escaped.
pub fn join_texts(segments: &[Segment]) -> (String, usize) {
    let mut escaped = 0;
    let texts: Vec<String> = segments
        .iter()
        .map(|segment| {
            let text = segment.text.trim();
            if text.contains(DELIMITER_TOKEN) {
                escaped += 1;
                text.replace(DELIMITER_TOKEN, ESCAPED_TOKEN)
            } else {
                text.to_string()
            }
        })
        .collect();

    (texts.join(DELIMITER), escaped)
}

/// Split a model answer back into segment texts.
///
/// Splits on the bare token so answers that dropped the surrounding newlines
/// still parse. When the count is off by a dangling delimiter at either end,
/// the empty edge pieces are dropped before giving up.
pub fn split_response(response: &str, expected: usize) -> Vec<String> {
    let mut pieces: Vec<String> = response
        .split(DELIMITER_TOKEN)
        .map(|piece| piece.trim().to_string())
        .collect();

    if pieces.len() > expected && pieces.last().is_some_and(|p| p.is_empty()) {
        pieces.pop();
    }
    if pieces.len() > expected && pieces.first().is_some_and(|p| p.is_empty()) {
        pieces.remove(0);
    }
    pieces
}
