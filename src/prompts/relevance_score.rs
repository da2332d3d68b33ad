//! Relevance scoring prompts for academic papers.
//!
//! Contains system and user prompt templates for the optional LLM scoring stage.

/// Keywords included in a prompt
pub const MAX_PROMPT_KEYWORDS: usize = 10;

/// Abstract characters included in a prompt
pub const MAX_ABSTRACT_CHARS: usize = 2000;

/// System prompt for academic paper relevance scoring
pub const SYSTEM_PROMPT: &str = "You are an expert in academic literature analysis, skilled at judging how closely a paper relates to a specific research field.";

/// User prompt template for single paper scoring
/// Placeholders: {keywords}, {title}, {abstract}
pub const USER_PROMPT_TEMPLATE: &str = r#"Rate how relevant the following paper is to the research keywords.

Research keywords:
{keywords}

Paper title:
{title}

Paper abstract:
{abstract}

Guidelines:
- Judge whether the paper actually studies the topics the keywords describe.
- Do not give a high score just because a keyword is mentioned.
- Judge whether the core contribution of the paper matches the keyword field.

Output strict JSON only (no markdown code blocks, no extra text):
{
  "score": 0-10,
  "reason": "Brief explanation, at most 100 words"
}"#;

/// Build user prompt with paper data
pub fn build_user_prompt(keywords: &[String], title: &str, abstract_text: &str) -> String {
    let keywords = keywords
        .iter()
        .take(MAX_PROMPT_KEYWORDS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let abstract_text: String = abstract_text.chars().take(MAX_ABSTRACT_CHARS).collect();

    USER_PROMPT_TEMPLATE
        .replace("{keywords}", &keywords)
        .replace("{title}", title)
        .replace("{abstract}", &abstract_text)
}
