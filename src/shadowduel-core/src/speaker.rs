//! Debaters and the transcript they produce.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two debaters. There are always exactly two.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    A,
    B,
}

impl Speaker {
    /// The other debater.
    pub fn complement(self) -> Self {
        match self {
            Speaker::A => Speaker::B,
            Speaker::B => Speaker::A,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Speaker::A => "A",
            Speaker::B => "B",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "speaker {}", self.label())
    }
}

/// A single utterance in the debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
        }
    }
}

/// Who speaks after `transcript`: the complement of the last speaker, or
/// `opening` when nobody has spoken yet.
pub fn next_speaker(transcript: &[Turn], opening: Speaker) -> Speaker {
    transcript
        .last()
        .map(|turn| turn.speaker.complement())
        .unwrap_or(opening)
}

/// Whether consecutive turns always change speaker.
pub fn alternates(transcript: &[Turn]) -> bool {
    transcript
        .windows(2)
        .all(|pair| pair[0].speaker != pair[1].speaker)
}
