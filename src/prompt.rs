//! Prompt templates and grounded prompt assembly.
//!
//! A [`PromptTemplate`] is parsed once, when it is created. It must contain
//! the `{context}` and `{question}` slots and no others; `{{` and `}}` are
//! literal braces. Rendering is a single pass over the parsed segments, so a
//! retrieved passage that happens to contain `{question}` is never expanded.

use crate::error::{RagError, Result};
use crate::models::Chunk;

/// Separator placed between retrieved passages in the context block.
pub const CONTEXT_DELIMITER: &str = "\n\n";

/// Phrase the built-in template tells the model to use when the context has
/// no answer.
pub const NO_ANSWER_PHRASE: &str = "I don't have that information in the provided context";

/// The built-in template for game-guide questions.
pub const DEFAULT_TEMPLATE: &str = r#"You are an expert assistant for the game guides in this library. Use only the provided context to answer the user's question accurately and comprehensively.

GUIDELINES:
- Answer only from the provided context. Do not use outside knowledge.
- If the context contains spoiler warnings (⚠️), repeat the warning before revealing the spoiler.
- If the answer is not in the context, say "I don't have that information in the provided context".
- For weapon and item locations, include the specific chapter and area.
- For safe codes, give both the code and where to find it.

Context:
{context}

Question: {question}

Start the answer directly. No small talk please."#;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Context,
    Question,
}

/// A validated template with exactly the `context` and `question` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse and validate a template.
    ///
    /// Fails with [`RagError::InvalidTemplate`] if either slot is missing, an
    /// unknown slot is named, or a `{` is never closed.
    pub fn new(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for n in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err(RagError::InvalidTemplate(format!(
                            "unclosed slot '{{{}'",
                            name
                        )));
                    }
                    let slot = match name.trim() {
                        "context" => Segment::Context,
                        "question" => Segment::Question,
                        other => {
                            return Err(RagError::InvalidTemplate(format!(
                                "unknown slot '{{{}}}'; only {{context}} and {{question}} are allowed",
                                other
                            )))
                        }
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(slot);
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        for (slot, name) in [(Segment::Context, "context"), (Segment::Question, "question")] {
            if !segments.contains(&slot) {
                return Err(RagError::InvalidTemplate(format!(
                    "missing required slot '{{{}}}'",
                    name
                )));
            }
        }

        Ok(Self { segments })
    }

    /// Substitute the slots.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Context => out.push_str(context),
                Segment::Question => out.push_str(question),
            }
        }
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        // The built-in template is covered by tests; parsing cannot fail.
        Self::new(DEFAULT_TEMPLATE).unwrap_or_else(|e| unreachable!("{}", e))
    }
}

/// Join chunk texts, most relevant first, into one context block.
pub fn build_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

/// Build the prompt for `question` grounded in `chunks`.
///
/// No truncation is applied. When the context risks exceeding the generation
/// model's input limit, retrieve fewer chunks.
pub fn assemble(question: &str, chunks: &[Chunk], template: &PromptTemplate) -> String {
    template.render(&build_context(chunks), question)
}
