//! Transcript accumulation and agentic-action tagging.

use std::time::Instant;

use strum::{AsRefStr, Display, EnumIter};

use crate::message::Message;

/// Content substituted for the whole transcript when upstream is unavailable.
pub const FALLBACK_CONTENT: &str = "I'm currently experiencing connectivity issues. This is a demo response to show the interface capabilities. In production, I would provide intelligent responses powered by the MLVO AI engine.";

/// Tags attached to an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
pub enum ActionTag {
    #[strum(serialize = "Data Analysis")]
    DataAnalysis,
    #[strum(serialize = "Strategic Planning")]
    StrategicPlanning,
    #[strum(serialize = "Content Generation")]
    ContentGeneration,
    #[strum(serialize = "Error Recovery")]
    ErrorRecovery,
    #[strum(serialize = "Fallback Mode")]
    FallbackMode,
}

/// Exactly the tags of a fallback response.
pub const FALLBACK_TAGS: [ActionTag; 2] = [ActionTag::ErrorRecovery, ActionTag::FallbackMode];

const KEYWORD_GROUPS: [(ActionTag, &[&str]); 3] = [
    (ActionTag::DataAnalysis, &["analyze", "research"]),
    (ActionTag::StrategicPlanning, &["plan", "strategy"]),
    (ActionTag::ContentGeneration, &["create", "generate"]),
];

/// Case-insensitive keyword tagging of a complete transcript.
///
/// Groups are independent: each contributes at most one tag, in group order.
pub fn classify(content: &str) -> Vec<ActionTag> {
    let lowered = content.to_lowercase();
    KEYWORD_GROUPS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(tag, _)| *tag)
        .collect()
}

/// Final state of one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub response_time_ms: u64,
    /// `None` when no tag applies.
    pub agentic_actions: Option<Vec<String>>,
    pub fallback: bool,
}

impl Completion {
    pub fn into_message(self) -> Message {
        Message::assistant(
            self.content,
            Some(self.response_time_ms),
            self.agentic_actions,
        )
    }
}

/// Running transcript of one exchange, owned by the loop driving it.
#[derive(Debug)]
pub struct ResponseAccumulator {
    content: String,
    started: Instant,
    deltas: usize,
    fallback: bool,
}

impl ResponseAccumulator {
    /// Start timing at request acceptance.
    pub fn start() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started: Instant) -> Self {
        Self {
            content: String::new(),
            started,
            deltas: 0,
            fallback: false,
        }
    }

    /// Append one content delta.
    pub fn push(&mut self, delta: &str) {
        self.content.push_str(delta);
        self.deltas += 1;
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn deltas(&self) -> usize {
        self.deltas
    }

    /// Replace the transcript with [`FALLBACK_CONTENT`]; tags become
    /// [`FALLBACK_TAGS`] regardless of content.
    pub fn fallback(&mut self) -> &str {
        self.content.clear();
        self.content.push_str(FALLBACK_CONTENT);
        self.fallback = true;
        &self.content
    }

    /// Stop the clock and tag the transcript.
    pub fn finish(&self) -> Completion {
        let tags: Vec<ActionTag> = if self.fallback {
            FALLBACK_TAGS.to_vec()
        } else {
            classify(&self.content)
        };
        let agentic_actions: Option<Vec<String>> = (!tags.is_empty())
            .then(|| tags.iter().map(|t| t.to_string()).collect());

        Completion {
            content: self.content.clone(),
            response_time_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            agentic_actions,
            fallback: self.fallback,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;
    use strum::IntoEnumIterator;

    #[test]
    fn all_three_groups_match_independently() {
        assert_eq!(
            classify("Let's analyze and create a plan"),
            vec![
                ActionTag::DataAnalysis,
                ActionTag::StrategicPlanning,
                ActionTag::ContentGeneration,
            ]
        );
    }

    #[test]
    fn classification_is_case_insensitive_and_one_tag_per_group() {
        assert_eq!(
            classify("RESEARCH then Analyze, more research"),
            vec![ActionTag::DataAnalysis]
        );
        assert_eq!(classify("Our STRATEGY"), vec![ActionTag::StrategicPlanning]);
        assert!(classify("hello there").is_empty());
    }

    #[test]
    fn tag_strings_are_exact() {
        let names: Vec<String> = ActionTag::iter().map(|t| t.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "Data Analysis",
                "Strategic Planning",
                "Content Generation",
                "Error Recovery",
                "Fallback Mode",
            ]
        );
    }

    #[test]
    fn deltas_accumulate_in_order() {
        let mut acc = ResponseAccumulator::start();
        acc.push("He");
        acc.push("llo");
        assert_eq!(acc.content(), "Hello");
        assert_eq!(acc.deltas(), 2);

        let done = acc.finish();
        assert_eq!(done.content, "Hello");
        assert!(done.agentic_actions.is_none());
        assert!(!done.fallback);
    }

    #[test]
    fn classification_runs_on_whole_transcript_not_chunks() {
        let mut acc = ResponseAccumulator::start();
        acc.push("pl");
        acc.push("an");
        assert_eq!(
            acc.finish().agentic_actions,
            Some(vec!["Strategic Planning".to_owned()])
        );
    }

    #[test]
    fn fallback_replaces_content_and_forces_tags() {
        let mut acc = ResponseAccumulator::start();
        acc.push("let's create a research plan");
        assert_eq!(acc.fallback(), FALLBACK_CONTENT);

        let done = acc.finish();
        assert_eq!(done.content, FALLBACK_CONTENT);
        assert_eq!(
            done.agentic_actions,
            Some(vec!["Error Recovery".to_owned(), "Fallback Mode".to_owned()])
        );
        assert!(done.fallback);
    }

    #[test]
    fn response_time_measures_from_start() {
        let started = Instant::now() - Duration::from_millis(120);
        let acc = ResponseAccumulator::started_at(started);
        let message = acc.finish().into_message();
        assert!(message.response_time.unwrap() >= 120);
    }
}
