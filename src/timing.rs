use crate::config::TimingPolicy;
use crate::error::TimingError;
use crate::segment::TextChunk;

/// Same exponent the word-level subtitle timing used: long words take longer,
/// but less than linearly.
const CHAR_WEIGHT_ALPHA: f64 = 0.75;

/// A chunk with its on-screen window `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedSegment<'a> {
    pub chunk: &'a TextChunk,
    pub start: f64,
    pub end: f64,
}

impl TimedSegment<'_> {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Lays the chunks out back to back over `[0, total_duration]`.
///
/// `total_words` is the word count of the text the chunks came from and may
/// not be smaller than the words the chunks hold. The group size is taken
/// from the first chunk. Every segment starts where the previous one ended
/// and the last one ends exactly at `total_duration`, whatever the policy.
pub fn allocate<'a>(
    chunks: &'a [TextChunk],
    total_words: usize,
    total_duration: f64,
    policy: TimingPolicy,
) -> Result<Vec<TimedSegment<'a>>, TimingError> {
    if !total_duration.is_finite() || total_duration <= 0.0 {
        return Err(TimingError::InvalidDuration(total_duration));
    }
    if total_words == 0 {
        return Err(TimingError::Division);
    }
    let chunk_words: usize = chunks.iter().map(|c| c.word_count).sum();
    if total_words < chunk_words {
        return Err(TimingError::WordCountMismatch {
            total_words,
            chunk_words,
        });
    }
    let Some(first) = chunks.first() else {
        return Ok(Vec::new());
    };

    let ends = match policy {
        TimingPolicy::Uniform => {
            let per_word = total_duration / total_words as f64;
            let per_chunk = per_word * first.word_count.max(1) as f64;
            // The last chunk keeps the full nominal length in the reference
            // layout and overruns the audio. Ends are also held to the words
            // actually consumed so far, which keeps every window non-empty.
            let mut consumed = 0;
            chunks
                .iter()
                .enumerate()
                .map(|(i, chunk)| {
                    consumed += chunk.word_count;
                    (per_chunk * (i + 1) as f64).min(per_word * consumed as f64)
                })
                .collect::<Vec<_>>()
        }
        TimingPolicy::Even => {
            let n = chunks.len() as f64;
            (1..=chunks.len())
                .map(|i| total_duration * i as f64 / n)
                .collect()
        }
        TimingPolicy::Characters => {
            let weights: Vec<f64> = chunks.iter().map(char_weight).collect();
            let total_weight: f64 = weights.iter().sum();
            let mut acc = 0.0;
            weights
                .iter()
                .map(|w| {
                    acc += w;
                    total_duration * acc / total_weight
                })
                .collect()
        }
    };

    let last = chunks.len() - 1;
    let mut start = 0.0;
    let mut segments = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let end = if i == last { total_duration } else { ends[i] };
        segments.push(TimedSegment { chunk, start, end });
        start = end;
    }
    Ok(segments)
}

fn char_weight(chunk: &TextChunk) -> f64 {
    chunk
        .words()
        .map(|w| (w.chars().count() as f64).powf(CHAR_WEIGHT_ALPHA))
        .sum()
}
