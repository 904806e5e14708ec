//! Plain-text rendering of a message window for prompts.

use std::collections::HashMap;

use recap_core::{MessageId, MessageRecord, Tone};

const QUOTE_MAX_CHARS: usize = 50;

/// Runs of consecutive all-caps words (at least one letter, no lowercase).
pub fn shouted_sequences(text: &str) -> Vec<String> {
    let mut sequences = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for word in text.split_whitespace() {
        let shouted = word.chars().any(char::is_alphabetic) && !word.chars().any(char::is_lowercase);
        if shouted {
            current.push(word);
        } else if !current.is_empty() {
            sequences.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        sequences.push(current.join(" "));
    }
    sequences
}

fn quote(text: &str) -> String {
    if text.chars().count() > QUOTE_MAX_CHARS {
        let head: String = text.chars().take(QUOTE_MAX_CHARS - 3).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn plain_line(record: &MessageRecord, by_id: &HashMap<MessageId, &MessageRecord>) -> Option<String> {
    let body = record.body().trim();

    if record.has_image {
        return Some(if body.is_empty() {
            format!("{} sent an image.", record.sender)
        } else {
            format!("{} sent an image: {body}", record.sender)
        });
    }
    if body.is_empty() {
        return None;
    }
    if let Some(original) = record.reply_to_id.and_then(|id| by_id.get(&id)) {
        return Some(format!(
            "{} replied to {}'s message '{}': {body}",
            record.sender,
            original.sender,
            quote(original.body().trim()),
        ));
    }
    Some(format!("{}: {body}", record.sender))
}

/// One line per message, in window order.
///
/// The deaf tone keeps only shouted sequences (`sender: SEQUENCE`), and may
/// therefore come back empty.
pub fn format_transcript(records: &[MessageRecord], tone: Tone) -> Vec<String> {
    if tone == Tone::Deaf {
        return records
            .iter()
            .flat_map(|r| {
                shouted_sequences(r.body())
                    .into_iter()
                    .map(move |seq| format!("{}: {seq}", r.sender))
            })
            .collect();
    }

    let by_id: HashMap<MessageId, &MessageRecord> = records.iter().map(|r| (r.id, r)).collect();
    records
        .iter()
        .filter_map(|r| plain_line(r, &by_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_image_lines() {
        let records = vec![
            MessageRecord::text(1, "alice", "morning all"),
            MessageRecord::image(2, "bob", None),
            MessageRecord::image(3, "carol", Some("my new bike".into())),
        ];
        assert_eq!(
            format_transcript(&records, Tone::Stoic),
            vec![
                "alice: morning all",
                "bob sent an image.",
                "carol sent an image: my new bike",
            ]
        );
    }

    #[test]
    fn reply_quotes_are_truncated() {
        let long = "x".repeat(60);
        let records = vec![
            MessageRecord::text(1, "alice", long),
            MessageRecord::text(2, "bob", "agreed").replying_to(1),
        ];
        let lines = format_transcript(&records, Tone::Chaotic);
        let expected = format!("bob replied to alice's message '{}...': agreed", "x".repeat(47));
        assert_eq!(lines[1], expected);
    }

    #[test]
    fn reply_outside_window_renders_plainly() {
        let records = vec![MessageRecord::text(8, "bob", "agreed").replying_to(3)];
        assert_eq!(format_transcript(&records, Tone::Stoic), vec!["bob: agreed"]);
    }

    #[test]
    fn empty_text_only_records_are_skipped() {
        let records = vec![MessageRecord::text(1, "alice", "   ")];
        assert!(format_transcript(&records, Tone::Stoic).is_empty());
    }

    #[test]
    fn shouted_sequences_split_on_quiet_words() {
        assert_eq!(
            shouted_sequences("WHAT A GOAL by him, NO WAY 2-1"),
            vec!["WHAT A GOAL", "NO WAY"]
        );
        assert!(shouted_sequences("all quiet here 123").is_empty());
    }

    #[test]
    fn deaf_transcript_only_hears_shouting() {
        let records = vec![
            MessageRecord::text(1, "alice", "see you at 8"),
            MessageRecord::text(2, "bob", "DON'T BE LATE this time"),
        ];
        assert_eq!(format_transcript(&records, Tone::Deaf), vec!["bob: DON'T BE LATE"]);
        assert!(format_transcript(&records[..1], Tone::Deaf).is_empty());
    }
}
