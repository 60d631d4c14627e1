use super::find_break as find_break_impl;
use super::*;

fn paragraph_document(paragraphs: usize, paragraph_len: usize) -> String {
    (0..paragraphs)
        .map(|i| {
            let sentence = format!("Paragraph {i} explains the refund policy in detail. ");
            let mut body: String = sentence.chars().cycle().take(paragraph_len - 1).collect();
            body.push('.');
            body
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn rebuild(chunks: &[String], overlap: usize) -> String {
    let mut rebuilt = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            rebuilt.push_str(chunk);
        } else {
            rebuilt.extend(chunk.chars().skip(overlap));
        }
    }
    rebuilt
}

#[test]
fn empty_input_yields_no_chunks() {
    let config = ChunkingConfig::default();
    assert!(split_text("", &config).is_empty());
    assert!(split_text("   \n\n\t  ", &config).is_empty());
}

#[test]
fn short_message_is_single_chunk() {
    let config = ChunkingConfig::default();
    let text = "Order #1001 was never delivered. Please refund me.";

    let chunks = split_text(text, &config);
    assert_eq!(chunks, vec![text.to_string()]);
}

#[test]
fn normalizes_line_endings_and_blank_runs() {
    assert_eq!(normalize_text("a\r\nb\rc"), "a\nb\nc");
    assert_eq!(normalize_text("first\n\n\n\n\nsecond"), "first\n\nsecond");
    assert_eq!(normalize_text("\n\n  padded  \n\n"), "padded");
}

#[test]
fn five_thousand_chars_split_into_three_chunks_at_paragraphs() {
    let config = ChunkingConfig::default();
    let text = paragraph_document(10, 498);
    assert_eq!(text.chars().count(), 4998);

    let chunks = split_text(&text, &config);
    assert_eq!(chunks.len(), 3);

    // Every cut lands right after a paragraph break
    for chunk in &chunks[..2] {
        assert!(chunk.ends_with("\n\n"), "chunk should end at a paragraph");
    }

    for pair in chunks.windows(2) {
        let tail: String = pair[0]
            .chars()
            .skip(pair[0].chars().count() - config.overlap)
            .collect();
        assert!(pair[1].starts_with(&tail), "adjacent chunks should overlap");
    }
}

#[test]
fn prefers_sentence_break_without_paragraphs() {
    let config = ChunkingConfig {
        target_size: 200,
        overlap: 20,
    };
    let text = "Shipping takes three to five days. ".repeat(20);

    let chunks = split_text(&text, &config);
    assert!(chunks.len() > 1);
    for chunk in &chunks[..chunks.len() - 1] {
        assert!(chunk.ends_with(". "), "chunk should end at a sentence: {chunk:?}");
    }
}

#[test]
fn hard_cut_without_any_boundary() {
    let config = ChunkingConfig {
        target_size: 200,
        overlap: 20,
    };
    let text = "x".repeat(1000);

    let chunks = split_text(&text, &config);
    assert_eq!(chunks[0].chars().count(), 200);
    assert_eq!(rebuild(&chunks, config.overlap), text);
}

#[test]
fn chunks_cover_normalized_text() {
    let config = ChunkingConfig {
        target_size: 300,
        overlap: 40,
    };
    let text = paragraph_document(12, 170) + "\r\n\r\n\r\nClosing words without a final period";

    let chunks = split_text(&text, &config);
    assert_eq!(rebuild(&chunks, config.overlap), normalize_text(&text));
}

#[test]
fn chunk_size_stays_within_bounds() {
    let config = ChunkingConfig {
        target_size: 250,
        overlap: 30,
    };
    let text = "Where is my parcel? It was due Tuesday and tracking has not moved. "
        .repeat(60);

    let chunks = split_text(&text, &config);
    for chunk in &chunks {
        let len = chunk.chars().count();
        assert!(len <= config.target_size + config.overlap, "chunk of {len} chars");
        assert!(!chunk.trim().is_empty());
    }
}

#[test]
fn short_tail_is_folded_into_last_chunk() {
    let config = ChunkingConfig {
        target_size: 200,
        overlap: 50,
    };
    // 210 characters: a separate chunk for the last 10 would be a sliver
    let text = "y".repeat(210);

    let chunks = split_text(&text, &config);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].chars().count(), 210);
}

#[test]
fn splitting_is_deterministic() {
    let config = ChunkingConfig::default();
    let text = paragraph_document(25, 321);

    assert_eq!(split_text(&text, &config), split_text(&text, &config));
}

#[test]
fn multibyte_text_is_split_on_char_boundaries() {
    let config = ChunkingConfig {
        target_size: 200,
        overlap: 20,
    };
    let text = "Lieferung verspätet – bitte prüfen 📦 ".repeat(30);

    let chunks = split_text(&text, &config);
    assert!(chunks.len() > 1);
    assert_eq!(rebuild(&chunks, config.overlap), normalize_text(&text));
}

#[test]
fn find_break_priorities() {
    let chars: Vec<char> = "One. Two\n\nThree four".chars().collect();
    assert_eq!(find_break_impl(&chars, 0, chars.len()), Some(10));

    let chars: Vec<char> = "One. Two three".chars().collect();
    assert_eq!(find_break_impl(&chars, 0, chars.len()), Some(5));

    let chars: Vec<char> = "One two".chars().collect();
    assert_eq!(find_break_impl(&chars, 0, chars.len()), Some(4));

    let chars: Vec<char> = "unbroken".chars().collect();
    assert_eq!(find_break_impl(&chars, 0, chars.len()), None);
}

#[test]
fn estimate_token_count_counts_words() {
    assert_eq!(estimate_token_count("hello world"), 2);
    assert_eq!(estimate_token_count(""), 0);
}
