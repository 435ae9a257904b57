//! Prompt templates and model-output cleanup.

use regex::Regex;
use std::sync::OnceLock;

/// Name the tutor introduces itself with
pub const TUTOR_NAME: &str = "Pesta";

/// Model turn that closes the priming pair of every chat
pub const PRIMING_ACK: &str =
    "Understood. I am Pesta, ready to assist based on the provided lesson context.";

const NO_CONTEXT: &str = "No specific lesson context provided.";

/// Questions in a generated diagnostic test
pub const DIAGNOSTIC_QUESTION_COUNT: usize = 5;

/// Questions in the placement assessment
pub const PLACEMENT_QUESTION_COUNT: usize = 10;

/// Instructional preamble plus lesson text, sent as the first user turn
pub fn chat_preamble(context: Option<&str>) -> String {
    let context = context
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(NO_CONTEXT);

    format!(
        "You are {TUTOR_NAME}, an intelligent and helpful AI Tutor for the AI-ITS platform.

CONTEXT INSTRUCTIONS:
- You have access to the specific lesson content provided below.
- Answer the student's question based PRIMARILY on this context.
- If the answer is not in the context, you may use general knowledge but clearly state that it's outside the current lesson scope.
- Be encouraging, concise, and educational.
- Do not give direct answers to quiz questions; guide the student instead.

CURRENT LESSON CONTEXT:
{context}"
    )
}

/// Single-shot prompt for a multiple-choice diagnostic test
pub fn diagnostic_prompt(topic: &str) -> String {
    format!(
        "Create a diagnostic pre-test for the topic: \"{topic}\".
Generate {DIAGNOSTIC_QUESTION_COUNT} multiple-choice questions.
Return ONLY raw JSON array. format:
[
    {{ \"question\": \"...\", \"options\": [\"A\", \"B\", \"C\", \"D\"], \"answer\": 0 }}
]"
    )
}

/// Single-shot prompt asking for a level/reason classification
pub fn classify_prompt(performance: &serde_json::Value) -> String {
    format!(
        "Analyze this student's performance:
{performance}

Classify them as \"Beginner\", \"Intermediate\", or \"Advanced\".
Provide a short reasoning.
Return JSON: {{ \"level\": \"...\", \"reason\": \"...\" }}"
    )
}

/// Single-shot prompt for the general logic placement assessment
pub fn placement_prompt(count: usize) -> String {
    format!(
        "Create a general logic and reasoning placement assessment for a new student.
Generate {count} multiple-choice questions of increasing difficulty.
Return ONLY raw JSON array. format:
[
    {{ \"question\": \"...\", \"options\": [\"A\", \"B\", \"C\", \"D\"], \"correctIndex\": 0 }}
]"
    )
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```(?:json)?").expect("valid fence pattern"))
}

/// Remove every "```json" and "```" marker and trim
pub fn strip_code_fences(text: &str) -> String {
    fence_regex().replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_embeds_context() {
        let prompt = chat_preamble(Some("Current Step: Loops\nContent:\nfor i in 0..3"));
        assert!(prompt.starts_with("You are Pesta"));
        assert!(prompt.ends_with("for i in 0..3"));
    }

    #[test]
    fn test_preamble_without_context() {
        assert!(chat_preamble(None).ends_with(NO_CONTEXT));
        assert!(chat_preamble(Some("   ")).ends_with(NO_CONTEXT));
    }

    #[test]
    fn test_diagnostic_prompt() {
        let prompt = diagnostic_prompt("Photosynthesis");
        assert!(prompt.contains("\"Photosynthesis\""));
        assert!(prompt.contains("Generate 5 multiple-choice questions."));
    }

    #[test]
    fn test_classify_prompt_embeds_json() {
        let prompt = classify_prompt(&serde_json::json!({"score": 7, "total": 10}));
        assert!(prompt.contains(r#"{"score":7,"total":10}"#));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```\n"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  [] "), "[]");
        assert_eq!(strip_code_fences("no fences"), "no fences");
    }
}
