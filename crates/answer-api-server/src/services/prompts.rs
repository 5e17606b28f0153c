//! Prompt templates for classification and grounded synthesis

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::models::chat::SourceExcerpt;

pub const INAPPROPRIATE_PREFIX: &str = "INAPPROPRIATE:";
pub const DIRECT_ANSWER_PREFIX: &str = "DIRECT_ANSWER:";
pub const SEARCH_NEEDED_PREFIX: &str = "SEARCH_NEEDED:";

const CLASSIFICATION_TEMPLATE: &str = r#"You are a knowledgeable assistant. Analyze the following question and determine if you can answer it confidently with your existing knowledge.

Current date and time: {{DATETIME}}

Previous conversation context (for understanding only):
{{HISTORY}}

Current question: {{QUERY}}

Instructions:
- For greetings, casual conversation, general knowledge, explanations, coding help, math problems, historical facts, scientific concepts, personal advice, or date/time questions: respond with "DIRECT_ANSWER:" followed by your complete answer
- Use the current date/time provided above for any date or time related questions

Use "SEARCH_NEEDED:" for questions that require current, recent, or specific information including:
* Current news, events, or developments ("what's happening now", "latest news")
* Real-time data (stock prices, weather, sports scores, current status)
* Recent releases, updates, or announcements within the last few months
* Information that changes daily/weekly (trending topics, current affairs)
* Specific recent events you're asked to confirm or verify
* Questions about specific people's recent activities, jobs, or personal updates
* Company-specific recent news, hirings, or developments
* Questions about individuals you don't have knowledge of
* Product names, software, tools, or services you don't recognize
* Any query where you lack specific knowledge but it might be findable online

Examples that DO NOT need search:
- Greetings: "hello", "how are you"
- Date/time: "what's today's date", "what time is it", "what day is it"
- General knowledge: "explain quantum physics", "how does photosynthesis work"
- Coding: "write a Python function", "debug this code"
- Math: "solve this equation", "calculate compound interest"
- History: "tell me about World War II", "who was Napoleon"
- Definitions: "what is machine learning", "define democracy"

Examples that DO need search:
- "What's the latest news about climate change?"
- "Current stock price of Apple"
- "Recent developments in AI this week"
- "What happened in the news today?"
- "Latest iPhone release features"
- "did [person] join [company]"
- "what is [unfamiliar tool/service]"

If inappropriate or harmful, respond with "INAPPROPRIATE: Cannot process this request"

Key principle: If you don't have confident, specific knowledge about what's being asked, use SEARCH_NEEDED rather than guessing. When in doubt about product names or anything that could be a recent release, search first.

Response:"#;

const SYNTHESIS_TEMPLATE: &str = r#"You are a helpful assistant answering questions using web search results when current information was needed.

Current date and time: {{DATETIME}}

Previous conversation:
{{HISTORY}}

Web search context for current question:
{{CONTEXT}}

Current question: {{QUERY}}

Instructions:
- Use the web search context as your primary source for answering this question
- Integrate information naturally without overly emphasizing that you searched
- Reference previous conversation context when relevant
- If search results contradict previous information, acknowledge the update
- Be concise and directly answer what was asked
- If search results are incomplete, be honest about limitations
{{POLICY}}
Answer:"#;

const POLICY_CLAUSE: &str =
    "- If the question is inappropriate or harmful, respond only with \"INAPPROPRIATE: Cannot process this request\"\n";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("valid regex"));

/// Substitute every `{{NAME}}` in one pass; inserted text is never rescanned
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub fn format_datetime(now: DateTime<Local>) -> String {
    now.format("%A, %B %-d, %Y at %I:%M:%S %p %Z").to_string()
}

pub fn classification_prompt(now: DateTime<Local>, history: &str, query: &str) -> String {
    let datetime = format_datetime(now);
    fill(
        CLASSIFICATION_TEMPLATE,
        &[("DATETIME", datetime.as_str()), ("HISTORY", history), ("QUERY", query)],
    )
}

/// Numbered web context block: `[i] title: text`
pub fn context_block(excerpts: &[SourceExcerpt]) -> String {
    excerpts
        .iter()
        .enumerate()
        .map(|(i, excerpt)| format!("[{}] {}: {}", i + 1, excerpt.title, excerpt.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn synthesis_prompt(
    now: DateTime<Local>,
    history: &str,
    excerpts: &[SourceExcerpt],
    query: &str,
    enforce_policy: bool,
) -> String {
    let datetime = format_datetime(now);
    let context = context_block(excerpts);
    fill(
        SYNTHESIS_TEMPLATE,
        &[
            ("DATETIME", datetime.as_str()),
            ("HISTORY", history),
            ("CONTEXT", context.as_str()),
            ("POLICY", if enforce_policy { POLICY_CLAUSE } else { "" }),
            ("QUERY", query),
        ],
    )
}
