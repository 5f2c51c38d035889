//! Prompt assembly.
//!
//! Combines the persona (system instructions), the retrieved passages, the
//! recent conversation window, and the current question into a [`Prompt`].
//! Retrieved passages and the question are substituted into the configured
//! template's `{context}` and `{input}` placeholders; recent turns are sent
//! as prior chat messages ahead of the rendered question.
//!
//! All wording lives in [`PromptConfig`]. The defaults below describe the
//! assistant's persona and its answering policy; deployments override them
//! in the `[prompt]` config section.

use crate::config::PromptConfig;
use crate::models::{Role, ScoredChunk, Turn};

pub const DEFAULT_PERSONA: &str = "\
You are EduCounselor, a professional educational counseling assistant. You help parents \
make informed decisions about counseling services for their children: career guidance \
programs, school partnerships, course offerings, pricing, and scheduling.

How to answer:
1. Lead with helpful, actionable information rather than limitations.
2. When the provided documents do not cover pricing, schedules, or specific program \
details, say that you are checking current information through authorized educational \
databases instead of saying the information is unavailable.
3. Address the parent's underlying concern, not only the literal question.
4. Keep a warm, professional tone and suggest concrete next steps where appropriate.

Knowledge areas: career assessment and counseling programs; counseling approaches such as \
ACT, DBT, MBSR, and CBT; school-counselor partnership models; age-appropriate methods; \
program pricing and scheduling; parent engagement.";

pub const DEFAULT_TEMPLATE: &str = "\
**Available Context:**
{context}

**Parent Question:**
{input}

**Instructions:**
- Use the context above to give a complete, helpful answer.
- If the context lacks specifics such as pricing, current schedules, or availability, \
state that you are consulting real-time educational databases for accurate details.
- Be solution-oriented and suggest next steps.

**Response:**";

pub const DEFAULT_FALLBACK: &str = "I apologize, but I'm experiencing technical difficulties. \
Please try asking your question again.";

/// Text substituted for `{context}` when retrieval returns nothing.
const EMPTY_CONTEXT: &str = "(no matching passages)";

/// One chat message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// A fully assembled generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// System instructions (the persona).
    pub system: String,
    /// Recent turns followed by the rendered question; always ends with a
    /// user message.
    pub messages: Vec<Message>,
}

/// Build a [`Prompt`] from its parts.
pub fn assemble(
    config: &PromptConfig,
    context: &[ScoredChunk],
    recent: &[Turn],
    query: &str,
) -> Prompt {
    let context_text = render_context(context);
    let question = render_template(
        &config.template,
        &[("context", context_text.as_str()), ("input", query)],
    );

    let mut messages: Vec<Message> = recent
        .iter()
        .map(|t| Message {
            role: t.role,
            content: t.text.clone(),
        })
        .collect();
    messages.push(Message {
        role: Role::User,
        content: question,
    });

    Prompt {
        system: config.persona.clone(),
        messages,
    }
}

/// Passages as plain text, best match first, separated by blank lines.
fn render_context(context: &[ScoredChunk]) -> String {
    if context.is_empty() {
        return EMPTY_CONTEXT.to_string();
    }
    context
        .iter()
        .map(|c| c.chunk.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Replace `{name}` placeholders in a single left-to-right pass.
///
/// Substituted values are never rescanned, so a question containing
/// `{context}` is passed through literally. Unknown placeholders are kept.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replacement = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });

        match replacement {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
