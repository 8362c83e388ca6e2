//! Pure turn policies: titles, summary cadence, history windows, and the
//! choice of the active chat.

use dreamweaver_completion::ChatTurn;
use dreamweaver_types::models::{Message, Sender};

pub use dreamweaver_types::models::{ActiveChat, resolve_active_chat};

/// Messages of prior context sent with each turn.
pub const HISTORY_WINDOW: usize = 6;
/// The rolling summary is refreshed whenever the message count reaches a
/// multiple of this.
pub const SUMMARY_INTERVAL: usize = 3;
pub const TITLE_WORDS: usize = 5;
pub const IMAGE_TITLE: &str = "Shared an image";

pub fn summary_due(message_count: usize) -> bool {
    message_count > 0 && message_count % SUMMARY_INTERVAL == 0
}

/// Title for a chat from its first user turn.
pub fn derive_title(text: &str) -> String {
    let mut words = text.split_whitespace();
    let head: Vec<&str> = words.by_ref().take(TITLE_WORDS).collect();
    if head.is_empty() {
        return IMAGE_TITLE.to_string();
    }

    let title = head.join(" ");
    if words.next().is_some() {
        format!("{title}...")
    } else {
        title
    }
}

/// The last `window` messages as completion history, oldest first.
pub fn history_window(messages: &[Message], window: usize) -> Vec<ChatTurn> {
    let start = messages.len().saturating_sub(window);
    messages[start..]
        .iter()
        .map(|m| {
            let content = if m.content.trim().is_empty() && m.image.is_some() {
                "(shared an image)".to_string()
            } else {
                m.content.clone()
            };
            match m.sender {
                Sender::User => ChatTurn::user(content),
                Sender::Assistant => ChatTurn::assistant(content),
            }
        })
        .collect()
}

/// A user message left without a reply by a failed attempt, matching the
/// turn being retried.
pub fn dangling_user_turn<'a>(messages: &'a [Message], text: &str, image: Option<&str>) -> Option<&'a Message> {
    messages
        .last()
        .filter(|m| m.sender == Sender::User && m.content == text && m.image.as_deref() == image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use dreamweaver_types::models::ChatSummary;
    use uuid::Uuid;

    fn summary(offset_secs: i64) -> ChatSummary {
        let at = Utc::now() + Duration::seconds(offset_secs);
        ChatSummary {
            id: Uuid::new_v4(),
            title: "t".into(),
            created_at: at,
            updated_at: at,
            message_count: 0,
            preview: None,
        }
    }

    #[test]
    fn summary_cadence() {
        let due: Vec<usize> = (0..10).filter(|n| summary_due(*n)).collect();
        assert_eq!(due, vec![3, 6, 9]);
    }

    #[test]
    fn titles_take_five_words() {
        assert_eq!(derive_title("I feel sad today"), "I feel sad today");
        assert_eq!(
            derive_title("I feel really sad and lonely today"),
            "I feel really sad and..."
        );
        assert_eq!(derive_title("   "), IMAGE_TITLE);
    }

    #[test]
    fn history_keeps_last_six_in_order() {
        let messages: Vec<Message> = (0..8)
            .map(|i| {
                let sender = if i % 2 == 0 { Sender::User } else { Sender::Assistant };
                Message::new(sender, format!("m{i}"), None)
            })
            .collect();

        let history = history_window(&messages, HISTORY_WINDOW);
        let contents: Vec<&str> = history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4", "m5", "m6", "m7"]);
        assert!(history_window(&messages[..2], HISTORY_WINDOW).len() == 2);
    }

    #[test]
    fn dangling_turn_must_match_exactly() {
        let messages = vec![
            Message::new(Sender::Assistant, "hello", None),
            Message::new(Sender::User, "I can't sleep", None),
        ];
        assert!(dangling_user_turn(&messages, "I can't sleep", None).is_some());
        assert!(dangling_user_turn(&messages, "I can't sleep", Some("/a.png")).is_none());
        assert!(dangling_user_turn(&messages[..1], "hello", None).is_none());
    }

    #[test]
    fn pointer_wins_when_present() {
        let old = summary(-100);
        let new = summary(0);
        let chats = vec![new.clone(), old.clone()];
        let pointer = old.id.to_string();

        assert_eq!(
            resolve_active_chat(Some(&pointer), &chats),
            ActiveChat::Existing(old.id)
        );
    }

    #[test]
    fn stale_or_malformed_pointer_falls_back_to_newest() {
        let old = summary(-100);
        let new = summary(0);
        let chats = vec![old.clone(), new.clone()];

        let stale = Uuid::new_v4().to_string();
        assert_eq!(resolve_active_chat(Some(&stale), &chats), ActiveChat::Existing(new.id));
        assert_eq!(resolve_active_chat(Some("garbage"), &chats), ActiveChat::Existing(new.id));
        assert_eq!(resolve_active_chat(None, &chats), ActiveChat::Existing(new.id));
    }

    #[test]
    fn empty_list_creates() {
        let pointer = Uuid::new_v4().to_string();
        assert_eq!(resolve_active_chat(Some(&pointer), &[]), ActiveChat::CreateNew);
        assert_eq!(resolve_active_chat(None, &[]), ActiveChat::CreateNew);
    }
}
