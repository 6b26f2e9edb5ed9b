//! Structured teaching content: lesson plans, exercise sets, presentation
//! outlines and study guides. Every generator expects JSON back from the
//! model and returns a [`StructuredResponse`].

use tracing::info;

use crate::contract::GenerationRequest;
use crate::error::Result;
use crate::provider::ProviderChain;
use crate::repair::{repair_and_parse, ExpectedShape, StructuredResponse};

#[derive(Debug, Clone, Copy)]
pub struct ContentGenerator<'a> {
    chain: &'a ProviderChain,
}

impl<'a> ContentGenerator<'a> {
    pub fn new(chain: &'a ProviderChain) -> Self {
        Self { chain }
    }

    async fn generate(
        &self,
        operation: &str,
        system: &str,
        prompt: String,
        shape: ExpectedShape,
    ) -> Result<StructuredResponse> {
        let request = GenerationRequest::new(prompt).with_system(system);
        let (raw, provider) = self.chain.generate(&request).await.into_result()?;
        let response = repair_and_parse(&raw, shape);
        info!(
            operation,
            provider = %provider,
            parsed = response.is_parsed(),
            "Content generated"
        );
        Ok(response)
    }

    pub async fn lesson_plan(
        &self,
        subject: &str,
        grade: &str,
        topic: &str,
        duration: &str,
    ) -> Result<StructuredResponse> {
        let prompt = format!(
            "Write a detailed lesson plan:\n\
             - Subject: {subject}\n\
             - Grade: {grade}\n\
             - Topic: {topic}\n\
             - Duration: {duration}\n\n\
             Include learning objectives (3-5), content, methodology, resources, \
             a step-by-step development, assessment and references.\n\n\
             Format it as JSON:\n\
             {{\n  \"title\": \"...\",\n  \"objectives\": [\"...\"],\n  \"content\": \"...\",\n  \
             \"methodology\": \"...\",\n  \"resources\": [\"...\"],\n  \
             \"development\": [{{\"step\": \"Introduction\", \"duration\": \"10 min\", \"description\": \"...\"}}],\n  \
             \"assessment\": \"...\",\n  \"references\": [\"...\"]\n}}\n\n\
             Return only the JSON."
        );
        self.generate(
            "lesson_plan",
            "You are an expert in lesson planning.",
            prompt,
            ExpectedShape::Object,
        )
        .await
    }

    pub async fn exercises(
        &self,
        subject: &str,
        topic: &str,
        count: u32,
        difficulty: &str,
    ) -> Result<StructuredResponse> {
        let prompt = format!(
            "Write {count} exercises on \"{topic}\" for {subject}.\n\
             Difficulty: {difficulty}\n\n\
             Mix multiple choice, true or false, open questions and problem solving. \
             For each exercise give the statement, its type, the answer and optionally a hint.\n\n\
             Format it as JSON:\n\
             [\n  {{\"number\": 1, \"type\": \"multiple choice\", \"question\": \"...?\", \
             \"alternatives\": {{\"A\": \"...\", \"B\": \"...\", \"C\": \"...\", \"D\": \"...\"}}, \
             \"answer\": \"A\", \"explanation\": \"...\"}}\n]\n\n\
             Return only the JSON."
        );
        self.generate(
            "exercises",
            "You are an expert in writing educational exercises.",
            prompt,
            ExpectedShape::Array,
        )
        .await
    }

    pub async fn presentation_outline(
        &self,
        topic: &str,
        slides: u32,
        audience: &str,
    ) -> Result<StructuredResponse> {
        let prompt = format!(
            "Outline a presentation on \"{topic}\" with {slides} slides.\n\
             Audience: {audience}\n\n\
             Include a title slide, an introduction, several development slides, \
             a conclusion and references. For each slide give its number, title, \
             bullet points and a visual suggestion.\n\n\
             Format it as JSON:\n\
             [\n  {{\"slide_number\": 1, \"title\": \"...\", \"content\": [\"...\"], \
             \"visual_suggestions\": \"...\"}}\n]\n\n\
             Return only the JSON."
        );
        self.generate(
            "presentation_outline",
            "You design engaging educational presentations.",
            prompt,
            ExpectedShape::Array,
        )
        .await
    }

    pub async fn study_guide(
        &self,
        subject: &str,
        topics: &[String],
        grade: &str,
    ) -> Result<StructuredResponse> {
        let topics = topics.join(", ");
        let prompt = format!(
            "Write a study guide for {subject}, grade {grade}.\n\
             Topics: {topics}\n\n\
             Include a summary of each topic, key concepts, study tips, \
             reflection questions and further resources.\n\n\
             Format it as a clearly organised JSON object. Return only the JSON."
        );
        self.generate(
            "study_guide",
            "You create study support material.",
            prompt,
            ExpectedShape::Object,
        )
        .await
    }
}
