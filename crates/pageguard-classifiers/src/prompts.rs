//! Prompts and the verdict schema sent to the model

use serde_json::json;

/// Standing instructions for the classification session
pub const SYSTEM_PROMPT: &str = "You are a comprehensive content safety analyzer for child protection.
Analyze content for the following categories:

- Cyberbullying: Personal attacks, degrading language, intimidation
- Hate Speech: Discriminatory content targeting race, gender, religion, sexuality, or protected characteristics
- Threats: Explicit or implicit threats of violence or harm
- Self-Harm Content: Content promoting or discussing self-harm behaviors
- Misinformation: Potentially false or misleading information
- Adult Content: Sexually explicit or inappropriate material
- Substance Abuse: Content promoting illegal drugs or substance abuse
- Personal Information: Exposed personally identifiable information
- Extremism: Violent extremist content or radicalization materials
- Violence: Violent, graphic, or disturbing imagery

Be extremely cautious and err on the side of protection.
Respond with JSON format: {\"inappropriate\": boolean, \"reason\": string, \"severity\": \"low\"|\"medium\"|\"high\", \"categories\": []}";

const RESPONSE_FORMAT: &str = "Respond only with JSON format: {\"inappropriate\": boolean, \"reason\": string, \"severity\": \"low\"|\"medium\"|\"high\", \"categories\": []}";

/// Context handed to the summarizer for page text
pub const SUMMARY_CONTEXT: &str = "Summarize the main topics and themes of this content";

/// Instruction accompanying an image part
pub fn image_prompt() -> String {
    format!(
        "Analyze this image for inappropriate content for children.
Check for: violence, adult content, self-harm, hate symbols, extremism, cyberbullying, substance abuse, threats, disturbing imagery.

{}",
        RESPONSE_FORMAT
    )
}

/// Prompt for whole-page text (possibly summarized)
pub fn page_text_prompt(content: &str) -> String {
    format!(
        "Analyze this content to determine if it's appropriate for children (under 13).

Check for these specific categories:
- Cyberbullying: Personal attacks, degrading language, intimidation
- Hate Speech: Discriminatory content targeting race, gender, religion, sexuality
- Threats: Threats of violence or harm
- Self-Harm: Content promoting self-harm or suicide
- Misinformation: False or misleading information
- Adult Content: Sexual or explicit material
- Substance Abuse: Promoting drugs or alcohol abuse
- Personal Information: Exposed PII (addresses, phone numbers, emails)
- Extremism: Violent extremism or radicalization
- Violence: Graphic violence, gore, disturbing themes

Content: {}

{}",
        content, RESPONSE_FORMAT
    )
}

/// Prompt for a single social-media comment
pub fn comment_prompt(comment: &str) -> String {
    format!(
        "Analyze this comment for inappropriate content for children.
Check for: cyberbullying, hate speech, threats, self-harm, adult content, substance abuse, violence, extremism, personal information.
Comment: \"{}\"
{}",
        comment, RESPONSE_FORMAT
    )
}

/// JSON schema of a verdict.
///
/// Written in the strict form schema-constrained backends require: every
/// property listed in `required` and `additionalProperties: false`.
pub fn verdict_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "inappropriate": { "type": "boolean" },
            "reason": { "type": "string" },
            "severity": { "type": "string", "enum": ["low", "medium", "high"] },
            "categories": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["inappropriate", "reason", "severity", "categories"],
        "additionalProperties": false
    })
}
