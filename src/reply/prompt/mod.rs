
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;

use crate::SupportError;
use crate::database::VectorMatch;
use crate::harvester::RecordMatch;

/// Voice the drafted reply should take
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Friendly,
    Concise,
}

impl Tone {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::Friendly => "friendly",
            Self::Concise => "concise",
        }
    }

    #[inline]
    pub fn directive(self) -> &'static str {
        match self {
            Self::Professional => {
                "Write in a professional, courteous tone. Be clear and complete without being stiff."
            }
            Self::Friendly => {
                "Write in a warm, friendly and conversational tone, as a helpful person on the team would."
            }
            Self::Concise => {
                "Be brief and direct. Answer in as few sentences as possible while still resolving the question."
            }
        }
    }
}

impl FromStr for Tone {
    type Err = SupportError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "professional" => Ok(Self::Professional),
            "friendly" => Ok(Self::Friendly),
            "concise" => Ok(Self::Concise),
            other => Err(SupportError::Validation(format!(
                "unknown tone '{other}' (expected professional, friendly or concise)"
            ))),
        }
    }
}

impl std::fmt::Display for Tone {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the system prompt is assembled from
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub business_name: &'a str,
    pub website: Option<&'a str>,
    pub tone: Tone,
    /// Applies to this reply only and outranks every other instruction
    pub one_time_instructions: Option<&'a str>,
    pub custom_instructions: Option<&'a str>,
    pub order_text: Option<&'a str>,
    pub knowledge: &'a [VectorMatch],
    pub learned: &'a [RecordMatch<'a>],
}

impl PromptContext<'_> {
    #[inline]
    pub fn has_context(&self) -> bool {
        !self.knowledge.is_empty() || !self.learned.is_empty() || self.order_text.is_some()
    }
}

const RULES: &[&str] = &[
    "Only state facts that appear in the context above. Never invent order details, policies, prices or dates.",
    "Do not add a signature, sign-off or closing name; the agent adds their own.",
    "If the customer is only acknowledging or thanking (for example \"thanks\" or \"got it\"), reply briefly and do not revisit the resolved issue.",
    "Reply with the message text only, without a subject line or commentary about these instructions.",
];

const NO_CONTEXT_RULE: &str = "No relevant information was found for this message. Acknowledge the question, say you will look into it, and offer to escalate to a specialist. Do not guess an answer.";

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Build the system prompt for one reply
#[inline]
pub fn build_system_prompt(context: &PromptContext<'_>) -> String {
    let mut prompt = format!(
        "You are a customer support agent for {}, drafting a reply to the customer's latest message.",
        context.business_name
    );
    if let Some(website) = non_blank(context.website) {
        let _ = write!(prompt, " The business website is {website}.");
    }

    let _ = write!(prompt, "\n\nTONE:\n{}", context.tone.directive());

    if let Some(instructions) = non_blank(context.one_time_instructions) {
        let _ = write!(
            prompt,
            "\n\nINSTRUCTIONS FOR THIS REPLY (highest priority, override anything else below):\n{instructions}"
        );
    }

    if let Some(instructions) = non_blank(context.custom_instructions) {
        let _ = write!(
            prompt,
            "\n\nBUSINESS GUIDELINES (apply only where relevant to this message):\n{instructions}"
        );
    }

    if let Some(orders) = non_blank(context.order_text) {
        let _ = write!(prompt, "\n\nLIVE ORDER DATA:\n{orders}");
    }

    if !context.knowledge.is_empty() {
        let mut ranked: Vec<&VectorMatch> = context.knowledge.iter().collect();
        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

        prompt.push_str("\n\nKNOWLEDGE BASE (most relevant first):");
        for (position, chunk) in ranked.iter().enumerate() {
            let _ = write!(
                prompt,
                "\n\n[{}] ({}% match)\n{}",
                position + 1,
                chunk.similarity_percent(),
                chunk.content.trim()
            );
        }
    }

    if !context.learned.is_empty() {
        prompt.push_str("\n\nSIMILAR RESOLVED TICKETS:");
        for matched in context.learned {
            let _ = write!(prompt, "\n\n{}", matched.record.to_document_text());
        }
    }

    prompt.push_str("\n\nRULES:");
    for rule in RULES {
        let _ = write!(prompt, "\n- {rule}");
    }
    if !context.has_context() {
        let _ = write!(prompt, "\n- {NO_CONTEXT_RULE}");
    }

    prompt
}
