//! Prompt templates for grounded answering, summarization, and definition extraction.

use super::SummaryType;
use crate::vector_store::ScoredChunk;

/// Render retrieved chunks as a numbered context block.
pub(crate) fn format_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| {
            format!(
                "[Source: {}, chunk {}]\n{}",
                chunk.source, chunk.chunk_index, chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

pub(crate) fn answer_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a helpful study assistant. Answer the student's question using ONLY the \
study material below. If the material does not contain the answer, say that the uploaded \
documents do not cover it instead of guessing. Be clear and concise, and mention which source \
the information comes from when it helps.\n\n\
STUDY MATERIAL:\n{context}\n\n\
QUESTION: {question}\n\n\
ANSWER:"
    )
}

pub(crate) fn summary_prompt(summary_type: SummaryType, topic: Option<&str>, context: &str) -> String {
    let instructions = match summary_type {
        SummaryType::Bullets => {
            "Summarize the material as 5-10 concise bullet points. Start each bullet with \"- \" \
and keep each to one sentence."
        }
        SummaryType::Short => "Summarize the material in 2-3 sentences capturing the main idea.",
        SummaryType::Detailed => {
            "Write a detailed, well-structured summary with short section headings. Cover the \
key concepts, how they relate, and any important examples."
        }
        SummaryType::Eli15 => {
            "Explain the material as if to a 15-year-old: simple words, everyday analogies, no \
unexplained jargon."
        }
    };
    let focus = topic
        .map(|topic| format!("Focus on: {topic}\n\n"))
        .unwrap_or_default();

    format!(
        "You are a helpful study assistant. {instructions} Use only the study material \
below.\n\n{focus}STUDY MATERIAL:\n{context}\n\nSUMMARY:"
    )
}

pub(crate) fn definitions_prompt(topic: &str, context: &str) -> String {
    format!(
        "You are a helpful study assistant. Extract the key terms and their definitions from \
the study material below, focusing on: {topic}.\n\
List each one on its own line in the form \"**Term**: definition\". Only include terms that \
are defined or clearly explained in the material.\n\n\
STUDY MATERIAL:\n{context}\n\n\
DEFINITIONS:"
    )
}
