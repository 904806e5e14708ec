//! Content classification: pure functions from message records to tags.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use recap_core::{ContentTag, MessageId, MessageRecord};

static SPECIAL_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://(?:www\.|mobile\.)?(?:twitter\.com|x\.com|t\.co)/\S+").unwrap()
});

static STATUS_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:twitter|x)\.com/\w+/status/(\d+)").unwrap());

static GENERIC_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://((?:www\.)?[a-z0-9-]+(?:\.[a-z0-9-]+)+)(?:/[^\s)"']*)?"#).unwrap()
});

static SPECIAL_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:www\.|mobile\.)?(?:twitter\.com|x\.com|t\.co)$").unwrap()
});

static SCORE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{1,2})[-:](\d{1,2})\b").unwrap());

static MATCH_MINUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,3}(?:\+\d{1,2})?['’]").unwrap());

/// Team aliases and their canonical names.
const TEAMS: &[(&str, &str)] = &[
    // England
    ("arsenal", "Arsenal"),
    ("gunners", "Arsenal"),
    ("chelsea", "Chelsea"),
    ("liverpool", "Liverpool"),
    ("manchester united", "Manchester United"),
    ("man utd", "Manchester United"),
    ("man united", "Manchester United"),
    ("manchester city", "Manchester City"),
    ("man city", "Manchester City"),
    ("tottenham", "Tottenham Hotspur"),
    ("spurs", "Tottenham Hotspur"),
    ("newcastle", "Newcastle United"),
    ("wolves", "Wolverhampton Wanderers"),
    ("aston villa", "Aston Villa"),
    ("everton", "Everton"),
    ("leeds", "Leeds United"),
    ("brighton", "Brighton & Hove Albion"),
    ("leicester", "Leicester City"),
    ("west ham", "West Ham United"),
    ("brentford", "Brentford"),
    // Spain
    ("barcelona", "Barcelona"),
    ("barca", "Barcelona"),
    ("real madrid", "Real Madrid"),
    ("atletico", "Atlético Madrid"),
    ("atleti", "Atlético Madrid"),
    ("sevilla", "Sevilla"),
    ("valencia", "Valencia"),
    // Italy
    ("juventus", "Juventus"),
    ("juve", "Juventus"),
    ("ac milan", "AC Milan"),
    ("inter milan", "Inter Milan"),
    ("napoli", "Napoli"),
    ("as roma", "AS Roma"),
    // Germany
    ("bayern", "Bayern Munich"),
    ("dortmund", "Borussia Dortmund"),
    ("bvb", "Borussia Dortmund"),
    ("leipzig", "RB Leipzig"),
    ("leverkusen", "Bayer Leverkusen"),
    // France
    ("psg", "Paris Saint-Germain"),
    ("marseille", "Olympique de Marseille"),
    ("lyon", "Olympique Lyonnais"),
];

const COMPETITIONS: &[&str] = &[
    "premier league",
    "la liga",
    "bundesliga",
    "serie a",
    "ligue 1",
    "champions league",
    "europa league",
    "conference league",
    "fa cup",
    "carabao cup",
    "world cup",
];

/// Live-commentary categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Commentary {
    Goal,
    Card,
    Save,
    Miss,
    Status,
}

impl Commentary {
    pub const ALL: [Commentary; 5] = [
        Commentary::Goal,
        Commentary::Card,
        Commentary::Save,
        Commentary::Miss,
        Commentary::Status,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Goal => "goal",
            Self::Card => "card",
            Self::Save => "save",
            Self::Miss => "miss",
            Self::Status => "game status",
        }
    }

    fn phrases(self) -> &'static [&'static str] {
        match self {
            Self::Goal => &[
                "goal", "goals", "scores", "scored", "what a shot", "what a finish", "in the net",
                "back of the net", "golazo", "header", "volley", "hat trick", "hat-trick",
            ],
            Self::Card => &[
                "red card", "yellow card", "sent off", "booking", "booked", "straight red",
                "second yellow",
            ],
            Self::Save => &[
                "great save", "what a save", "keeper", "goalkeeper", "parried", "clean sheet",
            ],
            Self::Miss => &[
                "off target", "over the bar", "hit the post", "hit the bar", "crossbar",
                "woodwork", "open goal miss", "sitter",
            ],
            Self::Status => &[
                "kickoff", "kick off", "kick-off", "halftime", "half time", "half-time",
                "full time", "full-time", "injury time", "stoppage time", "extra time",
                "penalties", "penalty", "starting lineup", "substitution", "var", "free kick",
                "corner kick", "offside", "matchday", "match day", "watching the game",
                "watching the match",
            ],
        }
    }
}

/// Word-bounded, case-insensitive alternation; longest alternatives first so
/// "man utd" wins over any shorter prefix.
fn lexicon_regex<'a>(words: impl Iterator<Item = &'a str>) -> Regex {
    let mut words: Vec<&str> = words.collect();
    words.sort_by_key(|w| std::cmp::Reverse(w.len()));
    let alternation = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).unwrap()
}

static TEAM_LEXICON: LazyLock<Regex> = LazyLock::new(|| lexicon_regex(TEAMS.iter().map(|(alias, _)| *alias)));

static COMPETITION_LEXICON: LazyLock<Regex> =
    LazyLock::new(|| lexicon_regex(COMPETITIONS.iter().copied()));

static COMMENTARY_LEXICON: LazyLock<Vec<(Commentary, Regex)>> = LazyLock::new(|| {
    Commentary::ALL
        .into_iter()
        .map(|c| (c, lexicon_regex(c.phrases().iter().copied())))
        .collect()
});

/// Uppercase share of letters above which a message reads as shouting.
pub const EXCITEMENT_RATIO: f64 = 0.3;

/// Everything the sports detector found in one message.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SportsSignals {
    pub scores: Vec<String>,
    /// Canonical team names, first-mention order, deduplicated.
    pub teams: Vec<&'static str>,
    pub competitions: Vec<String>,
    pub commentary: Vec<Commentary>,
    pub minutes: Vec<String>,
    pub uppercase_ratio: f64,
}

impl SportsSignals {
    pub fn lexicon_hit(&self) -> bool {
        !self.teams.is_empty() || !self.competitions.is_empty() || !self.commentary.is_empty()
    }

    pub fn excited(&self) -> bool {
        self.uppercase_ratio > EXCITEMENT_RATIO
    }

    /// Shouting alone never qualifies; it only strengthens a lexicon hit,
    /// which qualifies on its own.
    pub fn is_sports(&self) -> bool {
        !self.scores.is_empty() || self.lexicon_hit() || !self.minutes.is_empty()
    }
}

fn canonical_team(alias: &str) -> Option<&'static str> {
    let alias = alias.to_lowercase();
    TEAMS
        .iter()
        .find(|(a, _)| *a == alias)
        .map(|(_, canonical)| *canonical)
}

fn uppercase_ratio(text: &str) -> f64 {
    let (upper, letters) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(u, l), c| (u + usize::from(c.is_uppercase()), l + 1));
    if letters == 0 {
        0.0
    } else {
        upper as f64 / letters as f64
    }
}

pub fn sports_signals(text: &str) -> SportsSignals {
    let mut teams: Vec<&'static str> = Vec::new();
    for m in TEAM_LEXICON.find_iter(text) {
        if let Some(team) = canonical_team(m.as_str()) {
            if !teams.contains(&team) {
                teams.push(team);
            }
        }
    }

    let mut competitions: Vec<String> = Vec::new();
    for m in COMPETITION_LEXICON.find_iter(text) {
        let name = m.as_str().to_lowercase();
        if !competitions.contains(&name) {
            competitions.push(name);
        }
    }

    let commentary = COMMENTARY_LEXICON
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(c, _)| *c)
        .collect();

    SportsSignals {
        scores: SCORE.find_iter(text).map(|m| m.as_str().to_string()).collect(),
        teams,
        competitions,
        commentary,
        minutes: MATCH_MINUTE
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect(),
        uppercase_ratio: uppercase_ratio(text),
    }
}

/// Strip sentence punctuation that the URL patterns pick up at the end.
fn trim_url(url: &str) -> &str {
    url.trim_end_matches(['.', ',', '!', '?', ';', ':', ')', ']', '>'])
}

/// Every microblog link in `text`, in order.
pub fn special_links(text: &str) -> Vec<String> {
    SPECIAL_LINK
        .find_iter(text)
        .map(|m| trim_url(m.as_str()).to_string())
        .collect()
}

/// Web links whose host is not one of the microblog hosts.
pub fn generic_links(text: &str) -> Vec<String> {
    GENERIC_LINK
        .captures_iter(text)
        .filter(|caps| !caps.get(1).is_some_and(|h| SPECIAL_HOST.is_match(h.as_str())))
        .filter_map(|caps| caps.get(0))
        .map(|m| trim_url(m.as_str()).to_string())
        .collect()
}

/// The numeric status id of a microblog post link, if it has one.
pub fn status_id(url: &str) -> Option<&str> {
    STATUS_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Ids and payload carried by one tag.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TagHits {
    /// Buffer order, no duplicates.
    pub message_ids: Vec<MessageId>,
    /// Matched URLs for the link tags, in order of appearance.
    pub urls: Vec<String>,
}

/// Tag → hits, only for tags that matched at least one record.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ClassificationResult {
    tags: BTreeMap<ContentTag, TagHits>,
}

impl ClassificationResult {
    pub fn get(&self, tag: ContentTag) -> Option<&TagHits> {
        self.tags.get(&tag)
    }

    pub fn ids(&self, tag: ContentTag) -> &[MessageId] {
        self.tags
            .get(&tag)
            .map(|h| h.message_ids.as_slice())
            .unwrap_or(&[])
    }

    /// Present tags in dispatch order.
    pub fn tags(&self) -> impl Iterator<Item = ContentTag> + '_ {
        self.tags.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    fn add(&mut self, tag: ContentTag, id: MessageId, urls: Vec<String>) {
        let hits = self.tags.entry(tag).or_default();
        if hits.message_ids.last() != Some(&id) {
            hits.message_ids.push(id);
        }
        for url in urls {
            if !hits.urls.contains(&url) {
                hits.urls.push(url);
            }
        }
    }
}

/// Tag every record. Deterministic and free of side effects.
pub fn classify(records: &[MessageRecord]) -> ClassificationResult {
    let mut result = ClassificationResult::default();

    for record in records {
        let text = record.body();

        let special = special_links(text);
        if !special.is_empty() {
            result.add(ContentTag::SpecialLink, record.id, special);
        }

        if !text.is_empty() && sports_signals(text).is_sports() {
            result.add(ContentTag::SportsReference, record.id, Vec::new());
        }

        if record.has_image {
            result.add(ContentTag::Image, record.id, Vec::new());
        }

        let generic = generic_links(text);
        if !generic.is_empty() {
            result.add(ContentTag::GenericLink, record.id, generic);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(id: i64, body: &str) -> MessageRecord {
        MessageRecord::text(id, "alice", body)
    }

    #[test]
    fn shouted_match_report_is_sports() {
        let signals = sports_signals("LIVERPOOL 2-1 CHELSEA, WHAT A GOAL!!");
        assert_eq!(signals.scores, vec!["2-1"]);
        assert_eq!(signals.teams, vec!["Liverpool", "Chelsea"]);
        assert!(signals.commentary.contains(&Commentary::Goal));
        assert!(signals.excited());
        assert!(signals.is_sports());

        let result = classify(&[text(1, "LIVERPOOL 2-1 CHELSEA, WHAT A GOAL!!")]);
        assert_eq!(result.ids(ContentTag::SportsReference), &[MessageId(1)]);
    }

    #[test]
    fn match_minute_alone_is_sports() {
        let signals = sports_signals("90+3' still going");
        assert_eq!(signals.minutes, vec!["90+3'"]);
        assert!(signals.is_sports());
    }

    #[test]
    fn aliases_resolve_to_canonical_names() {
        let signals = sports_signals("man utd vs Man City then spurs at the weekend");
        assert_eq!(
            signals.teams,
            vec!["Manchester United", "Manchester City", "Tottenham Hotspur"]
        );
    }

    #[test]
    fn aliases_need_word_boundaries() {
        assert!(!sports_signals("the revolver was reloaded").is_sports());
        assert!(sports_signals("watching the champions league tonight").is_sports());
    }

    #[test]
    fn plain_chat_is_not_sports() {
        assert!(!sports_signals("anyone want lunch?").is_sports());
        assert!(!sports_signals("OK SURE").is_sports());
    }

    #[test]
    fn special_link_keeps_every_url() {
        let record = text(
            4,
            "look https://twitter.com/a/status/111 and https://x.com/b/status/222.",
        );
        let result = classify(&[record]);
        let hits = result.get(ContentTag::SpecialLink).unwrap();
        assert_eq!(hits.message_ids, vec![MessageId(4)]);
        assert_eq!(
            hits.urls,
            vec!["https://twitter.com/a/status/111", "https://x.com/b/status/222"]
        );
        assert!(result.get(ContentTag::GenericLink).is_none());
    }

    #[test]
    fn generic_link_excludes_special_hosts() {
        let result = classify(&[text(
            2,
            "see https://t.co/xyz and https://example.com/page?q=1, thanks",
        )]);
        assert_eq!(result.ids(ContentTag::SpecialLink), &[MessageId(2)]);
        let generic = result.get(ContentTag::GenericLink).unwrap();
        assert_eq!(generic.urls, vec!["https://example.com/page?q=1"]);
    }

    #[test]
    fn image_records_are_tagged() {
        let records = vec![
            text(1, "hello"),
            MessageRecord::image(2, "bob", None),
            MessageRecord::image(3, "carol", Some("sunset".into())),
        ];
        let result = classify(&records);
        assert_eq!(result.ids(ContentTag::Image), &[MessageId(2), MessageId(3)]);
    }

    #[test]
    fn a_record_can_carry_several_tags() {
        let record = MessageRecord::image(9, "dan", Some("ARSENAL 3-0 https://bbc.co.uk/sport".into()));
        let result = classify(&[record]);
        assert_eq!(
            result.tags().collect::<Vec<_>>(),
            vec![ContentTag::SportsReference, ContentTag::Image, ContentTag::GenericLink]
        );
    }

    #[test]
    fn lists_follow_buffer_order() {
        let records = vec![
            text(1, "https://a.example/x"),
            text(2, "nothing"),
            text(3, "https://b.example/y"),
            text(5, "https://a.example/x again"),
        ];
        let result = classify(&records);
        let hits = result.get(ContentTag::GenericLink).unwrap();
        assert_eq!(hits.message_ids, vec![MessageId(1), MessageId(3), MessageId(5)]);
        assert_eq!(hits.urls, vec!["https://a.example/x", "https://b.example/y"]);
    }

    #[test]
    fn classification_is_deterministic() {
        let records = vec![
            text(1, "CHELSEA 1:0 https://x.com/c/status/9"),
            MessageRecord::image(2, "bob", None),
            text(3, "read https://news.example/article"),
        ];
        assert_eq!(classify(&records), classify(&records));
    }

    #[test]
    fn status_id_extraction() {
        assert_eq!(status_id("https://twitter.com/someone/status/12345"), Some("12345"));
        assert_eq!(status_id("https://x.com/a/status/987?s=20"), Some("987"));
        assert_eq!(status_id("https://t.co/abc"), None);
    }
}
