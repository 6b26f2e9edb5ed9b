//! # assistant: text editing services for teaching material
//!
//! Each operation is a prompt template plus one call through the
//! [`ProviderChain`]. Prompt wording is opaque to the rest of the crate;
//! only [`TextAssistant::generate_questions`] expects structured output and
//! runs it through [`repair_and_parse`].

use tracing::info;

use crate::contract::GenerationRequest;
use crate::error::Result;
use crate::provider::ProviderChain;
use crate::repair::{repair_and_parse, ExpectedShape, StructuredResponse};

pub const DEFAULT_CONTEXT: &str = "educational";
pub const DEFAULT_MAX_WORDS: u32 = 200;
pub const DEFAULT_QUESTION_COUNT: u32 = 5;
pub const DEFAULT_DIFFICULTY: &str = "medium";
pub const DEFAULT_TARGET_LANGUAGE: &str = "English";
pub const DEFAULT_TARGET_GRADE: &str = "elementary school";

#[derive(Debug, Clone, Copy)]
pub struct TextAssistant<'a> {
    chain: &'a ProviderChain,
}

impl<'a> TextAssistant<'a> {
    pub fn new(chain: &'a ProviderChain) -> Self {
        Self { chain }
    }

    async fn ask(&self, operation: &str, system: &str, prompt: String) -> Result<String> {
        let request = GenerationRequest::new(prompt).with_system(system);
        let (text, provider) = self.chain.generate(&request).await.into_result()?;
        info!(operation, provider = %provider, "Assistant request completed");
        Ok(text)
    }

    pub async fn improve_text(&self, text: &str, context: &str) -> Result<String> {
        let prompt = format!(
            "Improve the following text for a {context} context:\n\n{text}\n\n\
             Focus on:\n\
             - Clarity and concision\n\
             - Grammar and spelling\n\
             - Flow and coherence\n\
             - Suitability for a school audience\n\n\
             Return only the improved text, without explanations."
        );
        self.ask(
            "improve_text",
            "You are a teaching assistant who specialises in improving educational texts.",
            prompt,
        )
        .await
    }

    pub async fn summarize(&self, text: &str, max_words: u32) -> Result<String> {
        let prompt = format!(
            "Write a summary of the following text in at most {max_words} words:\n\n{text}\n\n\
             The summary must capture the main points, stay faithful to the original \
             and be suitable for classroom use.\n\n\
             Return only the summary."
        );
        self.ask(
            "summarize",
            "You write concise, informative summaries of educational texts.",
            prompt,
        )
        .await
    }

    /// Multiple-choice questions about `text`, as a JSON array.
    pub async fn generate_questions(
        &self,
        text: &str,
        count: u32,
        difficulty: &str,
    ) -> Result<StructuredResponse> {
        let prompt = format!(
            "Based on the following text, write {count} questions of {difficulty} difficulty:\n\n\
             {text}\n\n\
             For each question give the question, four alternatives (A, B, C, D), \
             the correct answer and a short explanation.\n\n\
             Format the answer as a JSON list:\n\
             [\n  {{\n    \"question\": \"...?\",\n    \"alternatives\": {{\"A\": \"...\", \"B\": \"...\", \"C\": \"...\", \"D\": \"...\"}},\n    \
             \"correct_answer\": \"A\",\n    \"explanation\": \"...\"\n  }}\n]\n\n\
             Return only the JSON."
        );
        let raw = self
            .ask(
                "generate_questions",
                "You write relevant, well-structured assessment questions.",
                prompt,
            )
            .await?;
        Ok(repair_and_parse(&raw, ExpectedShape::Array))
    }

    pub async fn translate(&self, text: &str, target_language: &str) -> Result<String> {
        let prompt = format!(
            "Translate the following text into {target_language}:\n\n{text}\n\n\
             Keep the educational tone, the formatting and the appropriate technical terms.\n\n\
             Return only the translation."
        );
        self.ask(
            "translate",
            "You are a translator who specialises in educational texts.",
            prompt,
        )
        .await
    }

    pub async fn correct_grammar(&self, text: &str) -> Result<String> {
        let prompt = format!(
            "Correct the grammar and spelling mistakes in the following text:\n\n{text}\n\n\
             Return only the corrected text, without highlighting or explaining the corrections."
        );
        self.ask(
            "correct_grammar",
            "You are a language expert who proofreads educational texts.",
            prompt,
        )
        .await
    }

    pub async fn simplify_text(&self, text: &str, target_grade: &str) -> Result<String> {
        let prompt = format!(
            "Simplify the following text for {target_grade} students:\n\n{text}\n\n\
             Use age-appropriate vocabulary, keep the key information and the educational value, \
             and make it clear and accessible.\n\n\
             Return only the simplified text."
        );
        self.ask(
            "simplify_text",
            "You adapt texts to different educational levels.",
            prompt,
        )
        .await
    }
}
