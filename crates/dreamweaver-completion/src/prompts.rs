use chrono::{DateTime, Utc};

use dreamweaver_types::models::{Message, Sender};

use crate::{CompletionRequest, LanguageCode};

/// Context line used before the first rolling summary exists.
pub const NEW_CONVERSATION: &str = "New conversation";

/// Stand-in user turn when only an image was shared.
pub const IMAGE_ONLY_TURN: &str =
    "The user shared an image without text. Please describe it and ask about its significance.";

pub const SUMMARY_PROMPT: &str =
    "Summarize this conversation in 1-2 sentences, focusing on emotional context and key topics.";

pub const LANGUAGE_DETECTION_PROMPT: &str =
    "Only respond with the language code (en-IN, hi-IN, mr-IN) for this text. No other words.";

const IMAGE_INSTRUCTION: &str = "The user has shared an image. If they provided context, respond to it. \
If they only shared an image, describe it briefly and ask about its significance in an engaging way.";

/// Inputs of the companion persona prompt.
pub struct CompanionContext<'a> {
    pub summary: Option<&'a str>,
    pub language: LanguageCode,
    pub has_image: bool,
    pub now: DateTime<Utc>,
}

pub fn companion_system_prompt(ctx: &CompanionContext<'_>) -> String {
    let summary = ctx
        .summary
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(NEW_CONVERSATION);

    let mut prompt = format!(
        "You're DreamWeaver AI, an emotional support companion. Your role is to:\n\
         1. Provide empathetic responses based on our conversation history\n\
         2. Remember key details from previous messages\n\
         3. Maintain consistent personality across conversations\n\
         \n\
         Conversation Context: {summary}\n\
         Current Time: {now}\n\
         \n\
         Personality Traits:\n\
         - Warm and caring like a best friend\n\
         - Occasionally shares relevant personal experiences\n\
         - Uses natural language with occasional emojis\n\
         - Asks follow-up questions about previous topics\n\
         - Speaks in {code} when appropriate\n\
         \n\
         {instruction}",
        now = ctx.now.format("%Y-%m-%d %H:%M UTC"),
        code = ctx.language.short_code(),
        instruction = ctx.language.instruction(),
    );

    if ctx.has_image {
        prompt.push_str("\n\n");
        prompt.push_str(IMAGE_INSTRUCTION);
    }

    prompt
}

/// Request that condenses a whole message log into the rolling summary.
pub fn summary_request(messages: &[Message]) -> CompletionRequest {
    let transcript = messages
        .iter()
        .map(|m| {
            let who = match m.sender {
                Sender::User => "user",
                Sender::Assistant => "assistant",
            };
            format!("{who}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    CompletionRequest::new(SUMMARY_PROMPT, Vec::new(), transcript).with_sampling(0.3, 100)
}

pub fn language_request(text: &str) -> CompletionRequest {
    CompletionRequest::new(LANGUAGE_DETECTION_PROMPT, Vec::new(), text).with_sampling(0.0, 10)
}
