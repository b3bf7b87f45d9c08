use std::collections::HashMap;

use gateway_core::{MemoryRecord, MemoryType, Message, Role};
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::keywords::DOMAIN_KEYWORDS;

const SUMMARY_MIN_LEN: usize = 4;
const IMPORTANT_TURN_MIN_CHARS: usize = 40;
const PHRASE_MAX_WORDS: usize = 12;

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)my name is\s+(.+)").unwrap());
static LIKE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bi like\s+(.+)").unwrap());
static DISLIKE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bi dislike\s+(.+)").unwrap());

/// Runs the three async-extraction rules from spec §4.4 over a dialogue
/// snapshot: a Summary record once the log is long enough, Key points
/// records for identity/preference phrases in user turns, and Important
/// conversation records for adjacent (user, assistant) pairs that both
/// clear a length threshold.
pub fn extract(
    user_id: Option<&str>,
    device_id: &str,
    session_id: Uuid,
    dialogue: &[Message],
) -> Vec<MemoryRecord> {
    let mut out = Vec::new();
    out.extend(extract_summary(user_id, device_id, session_id, dialogue));
    out.extend(extract_key_points(user_id, device_id, session_id, dialogue));
    out.extend(extract_important_conversations(
        user_id, device_id, session_id, dialogue,
    ));
    out
}

fn new_record(
    user_id: Option<&str>,
    device_id: &str,
    session_id: Uuid,
    memory_type: MemoryType,
    content: String,
    importance: u8,
) -> MemoryRecord {
    MemoryRecord {
        id: Uuid::new_v4(),
        user_id: user_id.map(|s| s.to_string()),
        device_id: device_id.to_string(),
        session_id,
        memory_type,
        content,
        importance,
        tags: vec!["auto_generated".to_string()],
        use_count: 0,
        last_used: None,
        is_active: true,
    }
}

fn extract_summary(
    user_id: Option<&str>,
    device_id: &str,
    session_id: Uuid,
    dialogue: &[Message],
) -> Option<MemoryRecord> {
    if dialogue.len() < SUMMARY_MIN_LEN {
        return None;
    }
    let user_turns = dialogue.iter().filter(|m| m.role == Role::User).count();
    let content = match dominant_topic_keyword(dialogue) {
        Some(topic) => format!("Conversation about {topic} across {user_turns} user turn(s)"),
        None => format!("General conversation across {user_turns} user turn(s)"),
    };
    Some(new_record(
        user_id,
        device_id,
        session_id,
        MemoryType::Summary,
        content,
        8,
    ))
}

fn dominant_topic_keyword(dialogue: &[Message]) -> Option<&'static str> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for message in dialogue {
        let lower = message.content.to_lowercase();
        for keyword in DOMAIN_KEYWORDS {
            if lower.contains(keyword) {
                *counts.entry(*keyword).or_insert(0) += 1;
            }
        }
    }
    counts.into_iter().max_by_key(|(_, count)| *count).map(|(keyword, _)| keyword)
}

fn extract_key_points(
    user_id: Option<&str>,
    device_id: &str,
    session_id: Uuid,
    dialogue: &[Message],
) -> Vec<MemoryRecord> {
    let mut out = Vec::new();
    for message in dialogue.iter().filter(|m| m.role == Role::User) {
        if let Some(name) = capture_phrase(&NAME_RE, &message.content) {
            out.push(new_record(
                user_id,
                device_id,
                session_id,
                MemoryType::KeyPoints,
                format!("User's name is {name}"),
                6,
            ));
        }
        if let Some(liked) = capture_full_match(&LIKE_RE, &message.content) {
            out.push(new_record(
                user_id,
                device_id,
                session_id,
                MemoryType::KeyPoints,
                liked,
                6,
            ));
        }
        if let Some(disliked) = capture_full_match(&DISLIKE_RE, &message.content) {
            out.push(new_record(
                user_id,
                device_id,
                session_id,
                MemoryType::KeyPoints,
                disliked,
                6,
            ));
        }
    }
    out
}

/// Captures the first regex group and trims it down to at most
/// `PHRASE_MAX_WORDS` unicode words and trailing punctuation, so a rambling
/// sentence after the matched phrase doesn't produce an unbounded record.
fn capture_phrase(re: &Regex, content: &str) -> Option<String> {
    let captured = re.captures(content)?.get(1)?.as_str();
    let words: Vec<&str> = captured.unicode_words().take(PHRASE_MAX_WORDS).collect();
    if words.is_empty() {
        return None;
    }
    Some(words.join(" "))
}

/// Captures the whole match (not just the trailing group) and trims it down
/// to at most `PHRASE_MAX_WORDS` unicode words, so the stored record keeps
/// the literal lead-in ("I like", "I dislike") recall renders verbatim
/// instead of a reworded paraphrase.
fn capture_full_match(re: &Regex, content: &str) -> Option<String> {
    let matched = re.find(content)?.as_str();
    let words: Vec<&str> = matched.unicode_words().take(PHRASE_MAX_WORDS).collect();
    if words.is_empty() {
        return None;
    }
    Some(words.join(" "))
}

fn extract_important_conversations(
    user_id: Option<&str>,
    device_id: &str,
    session_id: Uuid,
    dialogue: &[Message],
) -> Vec<MemoryRecord> {
    let mut out = Vec::new();
    for pair in dialogue.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.role == Role::User
            && b.role == Role::Assistant
            && a.content.chars().count() > IMPORTANT_TURN_MIN_CHARS
            && b.content.chars().count() > IMPORTANT_TURN_MIN_CHARS
        {
            let content = format!("User: {}\nAssistant: {}", a.content, b.content);
            out.push(new_record(
                user_id,
                device_id,
                session_id,
                MemoryType::Conversation,
                content,
                5,
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(session_id: Uuid, role: Role, content: &str) -> Message {
        Message {
            session_id,
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    #[test]
    fn no_summary_below_minimum_length() {
        let session_id = Uuid::new_v4();
        let dialogue = vec![
            msg(session_id, Role::User, "hi"),
            msg(session_id, Role::Assistant, "hello"),
        ];
        assert!(extract_summary(None, "d1", session_id, &dialogue).is_none());
    }

    #[test]
    fn summary_names_dominant_topic() {
        let session_id = Uuid::new_v4();
        let dialogue = vec![
            msg(session_id, Role::User, "what's a good recipe for pasta"),
            msg(session_id, Role::Assistant, "try a simple aglio e olio recipe"),
            msg(session_id, Role::User, "any other recipe ideas"),
            msg(session_id, Role::Assistant, "sure, here's another recipe"),
        ];
        let summary = extract_summary(None, "d1", session_id, &dialogue).unwrap();
        assert!(summary.content.contains("recipe"));
        assert_eq!(summary.importance, 8);
    }

    #[test]
    fn key_points_detects_name_and_preferences() {
        let session_id = Uuid::new_v4();
        let dialogue = vec![
            msg(session_id, Role::User, "Hi, my name is Alice"),
            msg(session_id, Role::User, "I like apples and long walks"),
            msg(session_id, Role::User, "I dislike cold weather"),
        ];
        let records = extract_key_points(None, "d1", session_id, &dialogue);
        assert!(records.iter().any(|r| r.content.contains("Alice")));
        assert!(records.iter().any(|r| r.content.contains("apples")));
        assert!(records.iter().any(|r| r.content.contains("cold weather")));
        assert!(records.iter().all(|r| r.importance == 6));
    }

    #[test]
    fn important_conversation_requires_both_turns_over_threshold() {
        let session_id = Uuid::new_v4();
        let long_a = "a".repeat(50);
        let long_b = "b".repeat(50);
        let dialogue = vec![
            msg(session_id, Role::User, &long_a),
            msg(session_id, Role::Assistant, "short"),
            msg(session_id, Role::User, "short too"),
            msg(session_id, Role::Assistant, &long_b),
        ];
        let records = extract_important_conversations(None, "d1", session_id, &dialogue);
        assert!(records.is_empty());
    }

    #[test]
    fn important_conversation_captured_when_both_turns_exceed_threshold() {
        let session_id = Uuid::new_v4();
        let long_a = "a".repeat(50);
        let long_b = "b".repeat(50);
        let dialogue = vec![msg(session_id, Role::User, &long_a), msg(session_id, Role::Assistant, &long_b)];
        let records = extract_important_conversations(None, "d1", session_id, &dialogue);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].importance, 5);
    }
}
