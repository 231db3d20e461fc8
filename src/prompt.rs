//! Prompt construction for the two generation calls of a question turn.
//!
//! - [`condense_question`] rewrites a follow-up into a standalone question
//!   using the conversation so far.
//! - [`answer_question`] asks for a grounded answer over retrieved passages,
//!   each labelled with its source so the model can cite it.

use crate::models::{ChatMessage, Chunk, Role};

const CONDENSE_INSTRUCTIONS: &str = "\
Given the following conversation and a follow up question, rephrase the follow up \
question to be a standalone question that captures all relevant context from the \
chat history. If the follow up asks for clarification about a previous response, \
include the relevant details from that exchange. Reply with the standalone question only.";

const ANSWER_INSTRUCTIONS: &str = "\
You are an assistant specializing in insurance policies. Use the provided context \
passages to answer the question. If you don't know the answer, say that you don't \
know; do not make one up.

When answering:
1. If this is a follow-up question, reference relevant information from previous responses.
2. Be specific about which parts of the policy you are referencing.
3. Briefly mention related topics that might help.
4. If you need clarification, ask a specific follow-up question.

Answer clearly. When you cite policy details, say which document and page they come from.";

/// Everything a [`Generator`](crate::generation::Generator) needs for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

impl GenerationRequest {
    /// The system prompt followed by the conversation messages.
    pub fn all_messages(&self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        out.push(ChatMessage {
            role: Role::System,
            content: self.system.clone(),
        });
        out.extend(self.messages.iter().cloned());
        out
    }
}

/// Prompt that turns `question` into a self-contained question.
pub fn condense_question(transcript: &str, question: &str, temperature: f32) -> GenerationRequest {
    GenerationRequest {
        system: CONDENSE_INSTRUCTIONS.to_string(),
        messages: vec![ChatMessage::user(format!(
            "Chat History:\n{}\n\nFollow Up Input: {}\nStandalone Question:",
            transcript, question
        ))],
        temperature,
    }
}

/// Prompt that answers `question` from `context`.
pub fn answer_question(
    context: &[Chunk],
    transcript: &str,
    question: &str,
    temperature: f32,
) -> GenerationRequest {
    let history = if transcript.is_empty() {
        "(none)"
    } else {
        transcript
    };

    GenerationRequest {
        system: ANSWER_INSTRUCTIONS.to_string(),
        messages: vec![ChatMessage::user(format!(
            "Context:\n{}\n\nCurrent Question: {}\n\nChat History:\n{}",
            render_context(context),
            question,
            history
        ))],
        temperature,
    }
}

fn render_context(context: &[Chunk]) -> String {
    if context.is_empty() {
        return "(no relevant passages found)".to_string();
    }
    context
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[{}] {}\n{}", i + 1, chunk.attribution(), chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
