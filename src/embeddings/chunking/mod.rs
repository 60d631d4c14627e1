#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for content chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub target_size: usize,
    /// Characters shared between adjacent chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            target_size: 2000,
            overlap: 200,
        }
    }
}

/// Normalise line endings and collapse runs of three or more newlines to two
#[inline]
pub fn normalize_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut normalized = String::with_capacity(unified.len());
    let mut newline_run = 0;
    for ch in unified.chars() {
        if ch == '\n' {
            newline_run += 1;
            if newline_run > 2 {
                continue;
            }
        } else {
            newline_run = 0;
        }
        normalized.push(ch);
    }

    normalized.trim().to_string()
}

/// Split text into overlapping, boundary-aware chunks.
///
/// Every window ends at the last paragraph break in its back half, else the last
/// sentence break, else the last whitespace, else a hard cut at `target_size`.
/// The next window starts `overlap` characters before the previous end. A tail
/// shorter than `overlap` is folded into the final chunk instead of becoming its
/// own sliver.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = normalized.chars().collect();
    let target = config.target_size.max(1);

    if chars.len() <= target {
        return vec![normalized];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let window_end = (start + target).min(chars.len());
        let mut end = if window_end < chars.len() {
            find_break(&chars, start + target / 2, window_end).unwrap_or(window_end)
        } else {
            window_end
        };

        if chars.len() - end < config.overlap {
            end = chars.len();
        }

        chunks.push(chars[start..end].iter().collect::<String>());

        if end >= chars.len() {
            break;
        }

        start = end.saturating_sub(config.overlap).max(start + 1);
    }

    debug!(
        "Split {} characters into {} chunks (~{} tokens each)",
        chars.len(),
        chunks.len(),
        chunks
            .iter()
            .map(|c| estimate_token_count(c))
            .sum::<usize>()
            / chunks.len().max(1)
    );

    chunks
}

/// Find the preferred cut position in `chars[from..to]`, returned as an exclusive end
fn find_break(chars: &[char], from: usize, to: usize) -> Option<usize> {
    if from >= to {
        return None;
    }

    let pair_at = |first: char, second: char| {
        (from..to.saturating_sub(1))
            .rev()
            .find(|&i| chars[i] == first && chars[i + 1] == second)
            .map(|i| i + 2)
    };

    pair_at('\n', '\n')
        .or_else(|| pair_at('.', ' '))
        .or_else(|| {
            (from..to)
                .rev()
                .find(|&i| chars[i].is_whitespace())
                .map(|i| i + 1)
        })
}

/// Rough token estimate used for logging
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    text.split_whitespace().count()
}
