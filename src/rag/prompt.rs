use crate::models::Message;
use crate::session::Turn;
use super::vector_store::Fragment;

const ANSWER_PROMPT: &str = indoc::indoc! {"
    Use the following pieces of context to answer the user's question.
    If you don't know the answer, just say that you don't know, don't try to make up an answer.
    ----------------
"};

const CONDENSE_PROMPT: &str = indoc::indoc! {"
    Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question, in its original language.

    Chat History:
"};

/// Fragment texts separated by blank lines.
pub fn render_context(fragments: &[Fragment]) -> String {
    fragments
        .iter()
        .map(|f| f.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System context, then prior turns in order, then the new question.
pub fn answer_messages(fragments: &[Fragment], history: &[Turn], question: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(Message::system(format!("{}{}", ANSWER_PROMPT, render_context(fragments))));
    for turn in history {
        messages.push(Message::user(&turn.question));
        messages.push(Message::assistant(&turn.answer));
    }
    messages.push(Message::user(question));
    messages
}

fn render_history(history: &[Turn]) -> String {
    history
        .iter()
        .map(|turn| format!("\nHuman: {}\nAssistant: {}", turn.question, turn.answer))
        .collect()
}

pub fn condense_messages(history: &[Turn], question: &str) -> Vec<Message> {
    vec![Message::user(format!(
        "{}{}\nFollow Up Input: {}\nStandalone question:",
        CONDENSE_PROMPT,
        render_history(history),
        question
    ))]
}
