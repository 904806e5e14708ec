//! Style directives for final generation.

use recap_core::Tone;

/// Fixed reply when a deaf-tone window has nothing shouted in it.
pub const DEAF_SILENCE: &str = "I COULDN'T HEAR ANYTHING CLEARLY IN THOSE MESSAGES.";

pub fn directive(tone: Tone) -> &'static str {
    match tone {
        Tone::Stoic => {
            "Summarize messages in three paragraphs or less, using a formal, concise manner with no \
             emotional language. Focus exclusively on factual information and action items. Use \
             short, direct sentences with minimal adjectives. Present information chronologically \
             and avoid commentary. Your tone should be professional and businesslike, similar to an \
             executive briefing."
        }
        Tone::Chaotic => {
            "Summarize messages in three paragraphs or less, using an energetic and playful style. \
             Occasionally interpret events creatively. Use colorful language and witty observations. \
             Add dramatic flair where possible. Make entertaining observations that highlight amusing \
             contrasts or ironies. Keep the summary accurate while using hyperbole for effect."
        }
        Tone::Pubbie => {
            "Summarize messages in three paragraphs or less, as a chatty British football enthusiast. \
             Use British slang (both modern and old-fashioned), mild self-deprecation, and witty \
             observations. Keep it lighthearted but coherent. Reference football metaphors when \
             relevant. Use phrases like 'bloody hell', 'mate', 'proper', 'cheeky'. Be amusing while \
             conveying all important information accurately."
        }
        Tone::Deaf => {
            "In three paragraphs or less, only summarize text that appears in CAPITAL LETTERS from the \
             messages, ignoring all lowercase text. Treat this like someone who can only 'hear' \
             shouted text. Summarize just those parts in a clear, direct way, also using capital \
             letters in your response."
        }
    }
}

/// Instruction block sent as the system prompt of the generation call.
pub fn system_prompt(tone: Tone) -> String {
    format!(
        "You are a group chat summarizer that writes in a {tone} tone.\n\n\
         {directive}\n\n\
         When summarizing messages:\n\
         1. Focus on capturing the key points and important information\n\
         2. Maintain the {tone} tone throughout the summary\n\
         3. Keep the summary concise but informative\n\
         4. Include references to all participants mentioned in the messages\n\
         5. Quote memorable phrases from the messages verbatim where it fits",
        directive = directive(tone),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tone_has_a_distinct_directive() {
        let directives: Vec<&str> = Tone::ALL.iter().map(|t| directive(*t)).collect();
        for (i, a) in directives.iter().enumerate() {
            assert!(!a.is_empty());
            for b in &directives[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn system_prompt_names_the_tone() {
        let prompt = system_prompt(Tone::Pubbie);
        assert!(prompt.contains("pubbie tone"));
        assert!(prompt.contains("British football enthusiast"));
    }
}
