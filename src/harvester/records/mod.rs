
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::helpdesk::TicketThread;

/// Separator between per-ticket blocks in the combined learned document
pub const ENTRY_SEPARATOR: &str = "\n\n---\n\n";

const STUB_REPLY: &str = "(resolved; agent reply not captured)";

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "you", "your", "are", "was", "with", "have", "this", "that", "but",
    "not", "can", "how", "what", "when", "where", "why", "will", "would", "could", "please",
    "thanks", "thank", "hello", "from", "just", "about", "there", "they", "them", "our", "has",
    "had", "any", "get", "got", "did", "does", "its", "it's", "i'm", "been",
];

/// What one resolved ticket taught us
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningRecord {
    pub ticket_id: u64,
    pub subject: String,
    pub customer_message: String,
    pub agent_replies: Vec<String>,
    pub tags: Vec<String>,
}

impl LearningRecord {
    /// Build a record from a ticket thread.
    ///
    /// Private notes and customer follow-ups are dropped. A thread without any
    /// public agent reply still yields a stub when the customer text is at
    /// least `stub_min_chars` long.
    #[inline]
    pub fn from_thread(thread: &TicketThread, stub_min_chars: usize) -> Option<Self> {
        let customer_message = thread
            .ticket
            .description_text
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        let agent_replies: Vec<String> = thread
            .conversations
            .iter()
            .filter(|c| c.is_agent_reply())
            .map(|c| c.body_text.trim().to_string())
            .collect();

        if agent_replies.is_empty() && customer_message.chars().count() < stub_min_chars {
            return None;
        }

        Some(Self {
            ticket_id: thread.ticket.id,
            subject: thread.ticket.subject.trim().to_string(),
            customer_message,
            agent_replies,
            tags: thread.ticket.tags.clone(),
        })
    }

    #[inline]
    pub fn is_stub(&self) -> bool {
        self.agent_replies.is_empty()
    }

    /// Plain-text block used both in the learned document and in prompts
    #[inline]
    pub fn to_document_text(&self) -> String {
        let mut lines = vec![format!("Ticket #{}: {}", self.ticket_id, self.subject)];
        if !self.tags.is_empty() {
            lines.push(format!("Tags: {}", self.tags.join(", ")));
        }
        if !self.customer_message.is_empty() {
            lines.push(format!("Customer: {}", self.customer_message));
        }
        if self.is_stub() {
            lines.push(format!("Agent: {STUB_REPLY}"));
        } else {
            lines.extend(self.agent_replies.iter().map(|r| format!("Agent: {r}")));
        }
        lines.join("\n")
    }

    fn keywords(&self) -> HashSet<String> {
        let mut words = keywords(&self.subject);
        words.extend(keywords(&self.customer_message));
        for tag in &self.tags {
            words.extend(keywords(tag));
        }
        words
    }
}

/// Join records into one document without exceeding `max_bytes`.
///
/// Returns the text and how many records made it in.
#[inline]
pub fn combine_records(records: &[LearningRecord], max_bytes: usize) -> (String, usize) {
    let mut document = String::new();
    let mut included = 0;

    for record in records {
        let block = record.to_document_text();
        let extra = if document.is_empty() {
            block.len()
        } else {
            ENTRY_SEPARATOR.len() + block.len()
        };
        if document.len() + extra > max_bytes {
            break;
        }
        if !document.is_empty() {
            document.push_str(ENTRY_SEPARATOR);
        }
        document.push_str(&block);
        included += 1;
    }

    (document, included)
}

/// Lowercased content words of three or more characters
#[inline]
pub fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// A learning record scored against a customer message
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMatch<'a> {
    pub record: &'a LearningRecord,
    /// Share of the message's keywords found in the record
    pub score: f32,
}

/// Rank records by keyword overlap with `message`, best first
#[inline]
pub fn match_records<'a>(
    records: &'a [LearningRecord],
    message: &str,
    limit: usize,
    min_score: f32,
) -> Vec<RecordMatch<'a>> {
    let wanted = keywords(message);
    if wanted.is_empty() || limit == 0 {
        return Vec::new();
    }

    let total = wanted.len() as f32;

    records
        .iter()
        .filter(|r| !r.is_stub())
        .filter_map(|record| {
            let overlap = record.keywords().intersection(&wanted).count();
            let score = overlap as f32 / total;
            (overlap > 0 && score >= min_score).then_some(RecordMatch { record, score })
        })
        .sorted_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.record.ticket_id.cmp(&b.record.ticket_id))
        })
        .take(limit)
        .collect()
}
