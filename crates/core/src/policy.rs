//! Mode Policy
//!
//! Supplies the fixed instructions for each mode. The quiz keeps no counters:
//! which question comes next and the running score are read back from the
//! transcript on every turn.

use crate::{
    generation::{ChatTurn, Speaker},
    mode::Mode,
};
use regex::Regex;
use std::{collections::BTreeSet, sync::LazyLock};

/// Number of questions in a quiz.
pub const QUIZ_LENGTH: u8 = 5;

/// The fixed, ordered catalogue of quiz scenarios.
pub const QUIZ_CATALOGUE: [&str; QUIZ_LENGTH as usize] = [
    "Suspicious sender domains",
    "Urgent payment requests with suspicious attachments",
    "Password reset and login credential phishing",
    "Fake loan approval emails with malicious links",
    "Regulatory compliance phishing",
];

/// The synthetic user turn that opens a fresh quiz.
pub const QUIZ_KICKOFF: &str = "Start the quiz";

const CHAT_INSTRUCTIONS: &str = include_str!("../prompts/chat.md");
const QUIZ_INSTRUCTIONS: &str = include_str!("../prompts/quiz.md");

static QUESTION_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)question\s+(\d+)\s+of\s+5").expect("valid regex"));
static SCORE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(current|final)\s+score:?\s*\**\s*(\d+)\s*/\s*5").expect("valid regex")
});
static COMPLETION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)quiz\s+complete").expect("valid regex"));

/// Holds the static instruction text for every mode.
#[derive(Debug, Clone)]
pub struct ModePolicy {
    chat: String,
    quiz: String,
}

impl Default for ModePolicy {
    fn default() -> Self {
        Self::new(CHAT_INSTRUCTIONS, QUIZ_INSTRUCTIONS)
    }
}

impl ModePolicy {
    pub fn new(chat: impl Into<String>, quiz: impl Into<String>) -> Self {
        Self {
            chat: chat.into(),
            quiz: quiz.into(),
        }
    }

    /// The fixed instruction text for a mode.
    pub fn instructions(&self, mode: Mode) -> &str {
        match mode {
            Mode::Chat => &self.chat,
            Mode::Quiz => &self.quiz,
        }
    }

    /// Instructions for one turn. Quiz turns carry a progress hint computed
    /// from `context`, which must already end with the new user turn.
    pub fn turn_instructions(&self, mode: Mode, context: &[ChatTurn]) -> String {
        match mode {
            Mode::Chat => self.chat.clone(),
            Mode::Quiz => {
                let progress = QuizProgress::from_context(context);
                format!("{}\n\n# Quiz Progress\n\n{}", self.quiz, progress.hint())
            }
        }
    }
}

/// Quiz progress as observed in the responder's earlier turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuizProgress {
    /// Distinct question numbers seen so far.
    pub questions_asked: u8,
    /// Highest question number seen so far.
    pub highest_question: u8,
    /// Most recent score reported by the responder.
    pub score: Option<u8>,
    /// Whether the responder already delivered the final summary.
    pub finished: bool,
}

impl QuizProgress {
    pub fn from_context(context: &[ChatTurn]) -> Self {
        let mut asked = BTreeSet::new();
        let mut score = None;
        let mut finished = false;

        for turn in context.iter().filter(|t| t.speaker == Speaker::Responder) {
            for caps in QUESTION_HEADER.captures_iter(&turn.content) {
                if let Ok(n) = caps[1].parse::<u8>() {
                    if (1..=QUIZ_LENGTH).contains(&n) {
                        asked.insert(n);
                    }
                }
            }
            let mut final_score = false;
            if let Some(caps) = SCORE_LINE.captures_iter(&turn.content).last() {
                if let Ok(n) = caps[2].parse::<u8>() {
                    score = Some(n.min(QUIZ_LENGTH));
                }
                final_score = caps[1].eq_ignore_ascii_case("final");
            }
            // A turn that still asks a question is never the closing summary.
            let asks_question = QUESTION_HEADER.is_match(&turn.content);
            if !asks_question && (final_score || COMPLETION_MARKER.is_match(&turn.content)) {
                finished = true;
            }
        }

        Self {
            questions_asked: asked.len() as u8,
            highest_question: asked.last().copied().unwrap_or(0),
            score,
            finished,
        }
    }

    /// The next question to ask, if any remain.
    pub fn next_question(&self) -> Option<u8> {
        if self.finished || self.highest_question >= QUIZ_LENGTH {
            None
        } else {
            Some(self.highest_question + 1)
        }
    }

    /// A short, structured note for the backend describing where the quiz stands.
    pub fn hint(&self) -> String {
        let score = self
            .score
            .map(|s| format!(" The most recent score shown was {s}/{QUIZ_LENGTH}."))
            .unwrap_or_default();

        if self.finished {
            return format!(
                "The quiz is complete.{score} Do not ask any further questions; answer briefly and invite the user to start a new quiz session."
            );
        }
        match self.next_question() {
            Some(1) => "No questions have been asked yet. Ask Question 1 now.".to_string(),
            Some(next) => {
                let topic = QUIZ_CATALOGUE[usize::from(next - 1)];
                format!(
                    "Questions asked so far: {asked} of {QUIZ_LENGTH} (highest: Question {highest}).{score} Give feedback on the user's answer to Question {highest}, then ask Question {next} ({topic}).",
                    asked = self.questions_asked,
                    highest = self.highest_question,
                )
            }
            None => format!(
                "All {QUIZ_LENGTH} questions have been asked.{score} Give feedback on the user's answer to Question {QUIZ_LENGTH}, then present the final score and summary. Do not ask another question."
            ),
        }
    }
}
