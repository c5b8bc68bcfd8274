//! Prompt construction and reply parsing.

use serde::Deserialize;

use crate::translate::{language_name, primary_subtag};
use crate::types::{Evaluation, TaskKind, Usage};
use crate::{HuginnError, Result};

/// System instruction used when the request does not carry one.
pub(crate) fn default_system_instruction(task: TaskKind) -> &'static str {
    match task {
        TaskKind::Categorize => {
            "You classify short texts such as transaction descriptions into spending categories."
        }
        TaskKind::Translate => "You are a precise translator.",
        TaskKind::BuildContext => "You write short, factual background notes.",
        TaskKind::Score => "You are a strict, consistent grader.",
        TaskKind::Evaluate => "You review answers produced by another model.",
        TaskKind::DetectEntity => "You extract named entities from text.",
    }
}

/// The user prompt for `task` on `input`, with an optional background block.
pub(crate) fn build_prompt(
    task: TaskKind,
    input: &str,
    context: Option<&str>,
    target_language: Option<&str>,
) -> String {
    let instruction = match task {
        TaskKind::Categorize => {
            "Assign the input to a single short category name. Reply with the category only."
                .to_owned()
        }
        TaskKind::Translate => {
            let target = target_language.map(primary_subtag).unwrap_or_default();
            format!(
                "Translate the input into {}. Reply with the translation only.",
                language_name(&target)
            )
        }
        TaskKind::BuildContext => {
            "Write one short paragraph of factual background about the input.".to_owned()
        }
        TaskKind::Score => {
            "Score the input from 0 to 10. Reply with the number, then one sentence of reasoning."
                .to_owned()
        }
        TaskKind::Evaluate => {
            "Evaluate the quality of the input text and point out its main weaknesses.".to_owned()
        }
        TaskKind::DetectEntity => {
            "List the named entities (people, organizations, brands, places) in the input, one per line."
                .to_owned()
        }
    };

    let mut prompt = String::with_capacity(instruction.len() + input.len() + 64);
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("Background information:\n");
        prompt.push_str(context.trim());
        prompt.push_str("\n\n");
    }
    prompt.push_str(&instruction);
    prompt.push_str("\n\nInput:\n");
    prompt.push_str(input.trim());
    prompt
}

pub(crate) fn evaluation_prompt(task: TaskKind, input: &str, answer: &str) -> String {
    format!(
        "An assistant was given a '{task}' task.\n\n\
         Input:\n{input}\n\n\
         Answer:\n{answer}\n\n\
         Rate the answer's quality from 0 to 10 and explain briefly. \
         Reply with JSON only: {{\"score\": <number>, \"comment\": \"<text>\"}}",
        input = input.trim(),
        answer = answer.trim(),
    )
}

#[derive(Deserialize)]
struct EvaluationReply {
    score: f32,
    #[serde(default)]
    comment: String,
}

/// Parse the first JSON object in an evaluator reply.
pub(crate) fn parse_evaluation(reply: &str) -> Result<Evaluation> {
    let start = reply
        .find('{')
        .ok_or_else(|| HuginnError::InvalidInput("evaluation reply has no JSON object".into()))?;
    let parsed = serde_json::Deserializer::from_str(&reply[start..])
        .into_iter::<EvaluationReply>()
        .next()
        .ok_or_else(|| HuginnError::InvalidInput("evaluation reply has no JSON object".into()))??;
    Ok(Evaluation {
        score: parsed.score.clamp(0.0, 10.0),
        comment: parsed.comment.trim().to_owned(),
    })
}

/// Rough token count: one token per four characters, at least one.
pub(crate) fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars.div_ceil(4).max(1)
}

/// Provider usage when reported, otherwise a character-based estimate.
pub(crate) fn usage_or_estimate(reported: Option<Usage>, prompt: &str, reply: &str) -> Usage {
    reported.unwrap_or_else(|| Usage {
        prompt_tokens: estimate_tokens(prompt),
        completion_tokens: estimate_tokens(reply),
    })
}
