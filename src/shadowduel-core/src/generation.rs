//! Response generation client contract.
//!
//! Providers implement [`ReplyGenerator`]. The provider-neutral request is a
//! [`ReplyPrompt`]: the replying speaker's persona plus the transcript
//! relabeled from that speaker's point of view.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::GenerationError;
use crate::speaker::{Speaker, Turn};

/// Produces the next reply in the debate.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Generate one reply by `speaker` given everything said so far.
    ///
    /// Implementations must not substitute filler text on failure.
    async fn generate_reply(
        &self,
        transcript: &[Turn],
        speaker: Speaker,
    ) -> Result<Turn, GenerationError>;
}

/// Sampling parameters forwarded to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

/// Rendered persona text for both debaters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Personas {
    pub a: String,
    pub b: String,
}

impl Personas {
    pub fn get(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::A => &self.a,
            Speaker::B => &self.b,
        }
    }
}

/// Whose words a history entry holds, relative to the replying speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRole {
    /// The replying speaker's own earlier output.
    Own,
    /// The counterpart's input.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPrompt {
    pub persona: String,
    pub history: Vec<HistoryEntry>,
}

impl ReplyPrompt {
    /// Relabel `transcript` for `speaker`. The "own" side flips depending on
    /// who replies, so this is rebuilt on every call.
    ///
    /// An empty transcript gets `opening_prompt` as counterpart input.
    pub fn build(
        transcript: &[Turn],
        speaker: Speaker,
        personas: &Personas,
        opening_prompt: &str,
    ) -> Self {
        let mut history: Vec<HistoryEntry> = transcript
            .iter()
            .map(|turn| HistoryEntry {
                role: if turn.speaker == speaker {
                    HistoryRole::Own
                } else {
                    HistoryRole::Other
                },
                text: turn.text.clone(),
            })
            .collect();

        if history.is_empty() {
            history.push(HistoryEntry {
                role: HistoryRole::Other,
                text: opening_prompt.to_string(),
            });
        }

        Self {
            persona: personas.get(speaker).to_string(),
            history,
        }
    }
}

/// Turn raw provider text into a turn, failing if nothing speakable is left.
pub fn finish_reply(raw: &str, speaker: Speaker) -> Result<Turn, GenerationError> {
    let text = sanitize_reply(raw);
    if text.is_empty() {
        return Err(GenerationError::EmptyReply);
    }
    Ok(Turn::new(speaker, text))
}

// Reasoning/internal tags some models emit, stripped along with their content.
static REASONING_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<(thinking|think|reflection|reflect|internal|reasoning|thought|scratchpad|scratch|plan|analysis)\b[^>]*>.*?</(thinking|think|reflection|reflect|internal|reasoning|thought|scratchpad|scratch|plan|analysis)>",
    )
    .expect("reasoning tag pattern is valid")
});

static ORPHAN_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?\w+[^>]*>").expect("orphan tag pattern is valid"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Strip reasoning blocks and stray markup, collapse whitespace.
///
/// Asterisk cues like `*scoffs*` are part of the personas and are kept.
pub fn sanitize_reply(response: &str) -> String {
    let result = REASONING_BLOCKS.replace_all(response, "");
    let result = ORPHAN_TAGS.replace_all(&result, "");
    let result = WHITESPACE.replace_all(&result, " ");
    result.trim().to_string()
}
