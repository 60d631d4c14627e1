
use fancy_regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

// "#1234", "order 1234", "order #1234", "order no. 1234", "order number: 1234"
static ORDER_REFERENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\border(?:\s+(?:number|num|no\.?))?\s*[:#]?\s*#?\s*|#)(\d{3,10})\b")
        .expect("valid regex")
});

/// Order numbers mentioned in a message, first-seen order, at most `limit`
#[inline]
pub fn extract_order_references(message: &str, limit: usize) -> Vec<String> {
    let mut references: Vec<String> = Vec::new();

    for capture in ORDER_REFERENCE_REGEX.captures_iter(message) {
        if references.len() >= limit {
            break;
        }
        let captures = match capture {
            Ok(captures) => captures,
            Err(e) => {
                warn!("Order reference scan stopped: {}", e);
                break;
            }
        };
        if let Some(number) = captures.get(1) {
            let number = number.as_str();
            if !references.iter().any(|r| r == number) {
                references.push(number.to_string());
            }
        }
    }

    references
}
