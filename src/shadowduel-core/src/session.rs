//! The debate turn-taking state machine.
//!
//! [`Session`] performs no I/O. Each [`Event`] it is handed produces the new
//! state plus a list of [`Effect`]s for the orchestrator to carry out. Every
//! asynchronous effect is tagged with a [`Ticket`]; only the result carrying
//! the current ticket is accepted, so duplicate notifications and late
//! responses from a stopped or restarted session fall through as no-ops.

use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{DebateError, GenerationError};
use crate::speaker::{Speaker, Turn, next_speaker};

/// Pacing and retry knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSettings {
    pub opening_speaker: Speaker,
    /// Retries after the first failed attempt, per turn.
    pub max_retries: u32,
    /// Retry `n` waits `n * backoff_base`.
    pub backoff_base: Duration,
    /// Wait substituted for playback when speech fails.
    pub fallback_delay: Duration,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            opening_speaker: Speaker::A,
            max_retries: 3,
            backoff_base: Duration::from_millis(1000),
            fallback_delay: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    GeneratingReply(Speaker),
    Speaking(Speaker),
    WaitingFallbackDelay(Speaker),
    Stopped,
}

impl Phase {
    pub fn speaker(&self) -> Option<Speaker> {
        match *self {
            Phase::GeneratingReply(s) | Phase::Speaking(s) | Phase::WaitingFallbackDelay(s) => {
                Some(s)
            }
            Phase::Idle | Phase::Stopped => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.speaker().is_some()
    }
}

/// Identifies the single outstanding asynchronous operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    session: u64,
    step: u64,
}

#[derive(Debug, Clone)]
pub enum Event {
    Start,
    Stop,
    ReplyGenerated { ticket: Ticket, turn: Turn },
    GenerationFailed { ticket: Ticket, reason: String },
    /// Synthesis or playback could not start.
    SpeechFailed { ticket: Ticket, reason: String },
    PlaybackEnded { ticket: Ticket },
    TimerElapsed { ticket: Ticket },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Generate {
        ticket: Ticket,
        speaker: Speaker,
        transcript: Vec<Turn>,
    },
    Speak {
        ticket: Ticket,
        turn: Turn,
    },
    StartTimer {
        ticket: Ticket,
        delay: Duration,
    },
    CancelTimer,
    /// Stop and release the current audio handle, if any.
    StopAudio,
    /// Abort any in-flight generation or synthesis request.
    AbortRequests,
    Notify(Notice),
    /// Session state changed; republish the snapshot.
    Publish,
}

/// Something the presentation layer should show the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    GenerationRetry {
        speaker: Speaker,
        attempt: u32,
        max_retries: u32,
        delay: Duration,
        reason: String,
    },
    SpeechFallback {
        speaker: Speaker,
        delay: Duration,
        reason: String,
    },
    RetriesExhausted {
        speaker: Speaker,
        attempts: u32,
        reason: String,
    },
}

impl Notice {
    /// Terminal notices end the debate; the rest are transient warnings.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Notice::RetriesExhausted { .. })
    }

    /// The error a terminal notice ends the debate with.
    pub fn terminal_error(&self) -> Option<DebateError> {
        match self {
            Notice::RetriesExhausted {
                speaker,
                attempts,
                reason,
            } => Some(DebateError::RetriesExhausted {
                speaker: *speaker,
                attempts: *attempts,
                last_error: reason.clone(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::GenerationRetry {
                speaker,
                attempt,
                max_retries,
                delay,
                reason,
            } => write!(
                f,
                "Reply from {} failed ({}). Retrying in {} ms ({}/{})",
                speaker,
                reason,
                delay.as_millis(),
                attempt,
                max_retries
            ),
            Notice::SpeechFallback {
                speaker,
                delay,
                reason,
            } => write!(
                f,
                "Could not voice {} ({}). Continuing in {} ms",
                speaker,
                reason,
                delay.as_millis()
            ),
            Notice::RetriesExhausted {
                speaker,
                attempts,
                reason,
            } => write!(
                f,
                "Too many errors. Stopping debate after {} failed attempts for {} ({})",
                attempts, speaker, reason
            ),
        }
    }
}

/// What subscribers see after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub transcript: Vec<Turn>,
    pub current_speaker: Option<Speaker>,
    pub retry_count: u32,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            transcript: Vec::new(),
            current_speaker: None,
            retry_count: 0,
        }
    }
}

#[derive(Debug)]
pub struct Session {
    settings: TurnSettings,
    phase: Phase,
    transcript: Vec<Turn>,
    retry_count: u32,
    /// Set when a Generate effect is issued, cleared when its result lands.
    generating: bool,
    pending: Option<Ticket>,
    session_id: u64,
    step: u64,
}

impl Session {
    pub fn new(settings: TurnSettings) -> Self {
        Self {
            settings,
            phase: Phase::Idle,
            transcript: Vec::new(),
            retry_count: 0,
            generating: false,
            pending: None,
            session_id: 0,
            step: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    /// Whether `ticket` belongs to the operation currently awaited.
    pub fn owns(&self, ticket: Ticket) -> bool {
        self.pending == Some(ticket)
    }

    /// Whether anything asynchronous is still expected.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            transcript: self.transcript.clone(),
            current_speaker: self.phase.speaker(),
            retry_count: self.retry_count,
        }
    }

    /// Apply one event and return the effects it calls for.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Start => self.start(),
            Event::Stop => self.stop(),
            Event::ReplyGenerated { ticket, turn } if self.owns(ticket) => self.on_reply(turn),
            Event::GenerationFailed { ticket, reason } if self.owns(ticket) => {
                self.on_generation_failed(reason)
            }
            Event::SpeechFailed { ticket, reason } if self.owns(ticket) => {
                self.on_speech_failed(reason)
            }
            Event::PlaybackEnded { ticket } if self.owns(ticket) => self.on_playback_ended(),
            Event::TimerElapsed { ticket } if self.owns(ticket) => self.on_timer(),
            stale => {
                debug!(event = ?stale, phase = ?self.phase, "ignoring stale event");
                Vec::new()
            }
        }
    }

    fn start(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.phase.is_active() {
            info!(phase = ?self.phase, "restarting active debate");
            effects.extend(halt());
        }

        self.session_id += 1;
        self.step = 0;
        self.pending = None;
        self.generating = false;
        self.transcript.clear();
        self.retry_count = 0;

        let speaker = self.settings.opening_speaker;
        self.phase = Phase::GeneratingReply(speaker);
        info!(session = self.session_id, %speaker, "debate started");

        effects.extend(self.request_reply(speaker));
        effects.push(Effect::Publish);
        effects
    }

    fn stop(&mut self) -> Vec<Effect> {
        if self.phase == Phase::Stopped {
            return Vec::new();
        }

        info!(phase = ?self.phase, turns = self.transcript.len(), "debate stopped");
        self.phase = Phase::Stopped;
        self.session_id += 1;
        self.pending = None;
        self.generating = false;
        self.retry_count = 0;

        let mut effects = halt();
        effects.push(Effect::Publish);
        effects
    }

    fn on_reply(&mut self, turn: Turn) -> Vec<Effect> {
        let Phase::GeneratingReply(speaker) = self.phase else {
            return Vec::new();
        };
        self.generating = false;
        self.pending = None;

        if turn.speaker != speaker {
            let err = GenerationError::WrongSpeaker {
                expected: speaker,
                actual: turn.speaker,
            };
            return self.on_generation_failed(err.to_string());
        }

        self.retry_count = 0;
        self.transcript.push(turn.clone());
        self.phase = Phase::Speaking(speaker);
        info!(%speaker, turn = self.transcript.len(), "reply ready, speaking");

        let ticket = self.issue();
        vec![Effect::Speak { ticket, turn }, Effect::Publish]
    }

    fn on_generation_failed(&mut self, reason: String) -> Vec<Effect> {
        let Phase::GeneratingReply(speaker) = self.phase else {
            return Vec::new();
        };
        self.generating = false;
        self.pending = None;
        self.retry_count += 1;

        if self.retry_count > self.settings.max_retries {
            let attempts = self.retry_count;
            error!(%speaker, attempts, %reason, "generation retries exhausted");
            self.phase = Phase::Stopped;
            self.retry_count = 0;

            let mut effects = halt();
            effects.push(Effect::Notify(Notice::RetriesExhausted {
                speaker,
                attempts,
                reason,
            }));
            effects.push(Effect::Publish);
            return effects;
        }

        let attempt = self.retry_count;
        let delay = self
            .settings
            .backoff_base
            .checked_mul(attempt)
            .unwrap_or(Duration::MAX);
        warn!(%speaker, attempt, delay_ms = delay.as_millis() as u64, %reason, "generation failed, retrying");

        let ticket = self.issue();
        vec![
            Effect::Notify(Notice::GenerationRetry {
                speaker,
                attempt,
                max_retries: self.settings.max_retries,
                delay,
                reason,
            }),
            Effect::StartTimer { ticket, delay },
            Effect::Publish,
        ]
    }

    fn on_speech_failed(&mut self, reason: String) -> Vec<Effect> {
        let Phase::Speaking(speaker) = self.phase else {
            return Vec::new();
        };
        let delay = self.settings.fallback_delay;
        warn!(%speaker, delay_ms = delay.as_millis() as u64, %reason, "speech failed, using fallback delay");

        self.phase = Phase::WaitingFallbackDelay(speaker);
        let ticket = self.issue();
        vec![
            Effect::StopAudio,
            Effect::Notify(Notice::SpeechFallback {
                speaker,
                delay,
                reason,
            }),
            Effect::StartTimer { ticket, delay },
            Effect::Publish,
        ]
    }

    fn on_playback_ended(&mut self) -> Vec<Effect> {
        let Phase::Speaking(speaker) = self.phase else {
            return Vec::new();
        };
        debug!(%speaker, "playback finished");
        self.pending = None;

        let mut effects = vec![Effect::StopAudio];
        effects.extend(self.advance());
        effects
    }

    fn on_timer(&mut self) -> Vec<Effect> {
        match self.phase {
            Phase::GeneratingReply(speaker) => self.request_reply(speaker).into_iter().collect(),
            Phase::WaitingFallbackDelay(_) => {
                self.pending = None;
                self.advance()
            }
            _ => Vec::new(),
        }
    }

    /// Hand the floor to the complement of whoever spoke last.
    fn advance(&mut self) -> Vec<Effect> {
        let speaker = next_speaker(&self.transcript, self.settings.opening_speaker);
        self.phase = Phase::GeneratingReply(speaker);

        let mut effects: Vec<Effect> = self.request_reply(speaker).into_iter().collect();
        effects.push(Effect::Publish);
        effects
    }

    /// Issue a generation request unless one is already in flight. The
    /// outstanding ticket is only replaced when a request is issued.
    fn request_reply(&mut self, speaker: Speaker) -> Option<Effect> {
        if self.generating {
            warn!(%speaker, "generation already in flight, ignoring trigger");
            return None;
        }
        self.generating = true;

        let ticket = self.issue();
        Some(Effect::Generate {
            ticket,
            speaker,
            transcript: self.transcript.clone(),
        })
    }

    fn issue(&mut self) -> Ticket {
        self.step += 1;
        let ticket = Ticket {
            session: self.session_id,
            step: self.step,
        };
        self.pending = Some(ticket);
        ticket
    }
}

fn halt() -> Vec<Effect> {
    vec![Effect::CancelTimer, Effect::StopAudio, Effect::AbortRequests]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(TurnSettings::default())
    }

    fn ticket_of(effects: &[Effect]) -> Ticket {
        effects
            .iter()
            .find_map(|effect| match effect {
                Effect::Generate { ticket, .. }
                | Effect::Speak { ticket, .. }
                | Effect::StartTimer { ticket, .. } => Some(*ticket),
                _ => None,
            })
            .expect("effects carry a ticket")
    }

    fn generations(effects: &[Effect]) -> Vec<Speaker> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Generate { speaker, .. } => Some(*speaker),
                _ => None,
            })
            .collect()
    }

    fn timers(effects: &[Effect]) -> Vec<Duration> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::StartTimer { delay, .. } => Some(*delay),
                _ => None,
            })
            .collect()
    }

    fn notices(effects: &[Effect]) -> Vec<Notice> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Notify(notice) => Some(notice.clone()),
                _ => None,
            })
            .collect()
    }

    /// Start, let `text` be generated for the opener and played to the end.
    /// Returns the effects of the playback-ended event.
    fn play_opening(s: &mut Session, text: &str) -> Vec<Effect> {
        let effects = s.handle(Event::Start);
        let ticket = ticket_of(&effects);
        let effects = s.handle(Event::ReplyGenerated {
            ticket,
            turn: Turn::new(Speaker::A, text),
        });
        let ticket = ticket_of(&effects);
        s.handle(Event::PlaybackEnded { ticket })
    }

    /// Fail the generation whose ticket is in `effects`.
    fn fail_generation(s: &mut Session, effects: &[Effect]) -> Vec<Effect> {
        let ticket = ticket_of(effects);
        s.handle(Event::GenerationFailed {
            ticket,
            reason: "HTTP 503".to_string(),
        })
    }

    #[test]
    fn test_start_requests_opening_reply() {
        let mut s = session();
        let effects = s.handle(Event::Start);

        assert_eq!(s.phase(), Phase::GeneratingReply(Speaker::A));
        assert_eq!(generations(&effects), vec![Speaker::A]);
        assert!(effects.contains(&Effect::Publish));
        assert!(s.is_generating());
        assert_eq!(s.retry_count(), 0);
    }

    #[test]
    fn test_end_to_end_first_turn_hands_over() {
        let mut s = session();
        let effects = s.handle(Event::Start);
        let ticket = ticket_of(&effects);

        let effects = s.handle(Event::ReplyGenerated {
            ticket,
            turn: Turn::new(Speaker::A, "X"),
        });
        assert_eq!(s.phase(), Phase::Speaking(Speaker::A));
        assert_eq!(s.transcript(), &[Turn::new(Speaker::A, "X")]);
        assert!(matches!(
            &effects[0],
            Effect::Speak { turn, .. } if turn.text == "X"
        ));

        let effects = s.handle(Event::PlaybackEnded {
            ticket: ticket_of(&effects),
        });
        assert_eq!(s.phase(), Phase::GeneratingReply(Speaker::B));
        assert_eq!(generations(&effects), vec![Speaker::B]);
        match effects.iter().find(|e| matches!(e, Effect::Generate { .. })) {
            Some(Effect::Generate { transcript, .. }) => {
                assert_eq!(transcript, &vec![Turn::new(Speaker::A, "X")])
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_four_failures_stop_with_retries_exhausted() {
        let mut s = session();
        let mut effects = play_opening(&mut s, "opening");
        assert_eq!(s.phase(), Phase::GeneratingReply(Speaker::B));

        let mut all_notices = Vec::new();
        let mut delays = Vec::new();
        for attempt in 1..=3 {
            effects = fail_generation(&mut s, &effects);
            assert_eq!(s.retry_count(), attempt);
            assert_eq!(s.phase(), Phase::GeneratingReply(Speaker::B));
            delays.extend(timers(&effects));
            all_notices.extend(notices(&effects));

            effects = s.handle(Event::TimerElapsed {
                ticket: ticket_of(&effects),
            });
            assert_eq!(generations(&effects), vec![Speaker::B]);
        }

        effects = fail_generation(&mut s, &effects);
        all_notices.extend(notices(&effects));

        assert_eq!(s.phase(), Phase::Stopped);
        assert_eq!(s.transcript().len(), 1);
        assert!(!s.has_pending());
        assert!(timers(&effects).is_empty());
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(3000)
            ]
        );
        assert_eq!(all_notices.iter().filter(|n| n.is_terminal()).count(), 1);
        assert!(matches!(
            all_notices.last(),
            Some(Notice::RetriesExhausted {
                speaker: Speaker::B,
                attempts: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_success_resets_retry_counter() {
        let mut s = session();
        let mut effects = s.handle(Event::Start);
        for _ in 0..3 {
            effects = fail_generation(&mut s, &effects);
            effects = s.handle(Event::TimerElapsed {
                ticket: ticket_of(&effects),
            });
        }
        assert_eq!(s.retry_count(), 3);

        s.handle(Event::ReplyGenerated {
            ticket: ticket_of(&effects),
            turn: Turn::new(Speaker::A, "finally"),
        });
        assert_eq!(s.retry_count(), 0);
        assert_eq!(s.phase(), Phase::Speaking(Speaker::A));
    }

    #[test]
    fn test_speech_failure_waits_fallback_once() {
        let mut s = session();
        let effects = s.handle(Event::Start);
        let effects = s.handle(Event::ReplyGenerated {
            ticket: ticket_of(&effects),
            turn: Turn::new(Speaker::A, "X"),
        });

        let effects = s.handle(Event::SpeechFailed {
            ticket: ticket_of(&effects),
            reason: "no audio".to_string(),
        });
        assert_eq!(s.phase(), Phase::WaitingFallbackDelay(Speaker::A));
        assert_eq!(timers(&effects), vec![Duration::from_millis(2000)]);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Speak { .. })));
        assert!(matches!(
            notices(&effects).as_slice(),
            [Notice::SpeechFallback { speaker: Speaker::A, .. }]
        ));

        let effects = s.handle(Event::TimerElapsed {
            ticket: ticket_of(&effects),
        });
        assert_eq!(s.phase(), Phase::GeneratingReply(Speaker::B));
        assert_eq!(generations(&effects), vec![Speaker::B]);
        assert!(timers(&effects).is_empty());
    }

    #[test]
    fn test_stop_from_every_phase() {
        let build: Vec<fn(&mut Session)> = vec![
            |_| {},
            |s| {
                s.handle(Event::Start);
            },
            |s| {
                let e = s.handle(Event::Start);
                s.handle(Event::ReplyGenerated {
                    ticket: ticket_of(&e),
                    turn: Turn::new(Speaker::A, "X"),
                });
            },
            |s| {
                let e = s.handle(Event::Start);
                let e = s.handle(Event::ReplyGenerated {
                    ticket: ticket_of(&e),
                    turn: Turn::new(Speaker::A, "X"),
                });
                s.handle(Event::SpeechFailed {
                    ticket: ticket_of(&e),
                    reason: "down".to_string(),
                });
            },
            |s| {
                let e = s.handle(Event::Start);
                s.handle(Event::GenerationFailed {
                    ticket: ticket_of(&e),
                    reason: "down".to_string(),
                });
            },
        ];

        for setup in build {
            let mut s = session();
            setup(&mut s);
            let effects = s.handle(Event::Stop);

            assert_eq!(s.phase(), Phase::Stopped);
            assert!(!s.has_pending());
            assert!(!s.is_generating());
            assert_eq!(s.retry_count(), 0);
            assert!(effects.contains(&Effect::CancelTimer));
            assert!(effects.contains(&Effect::StopAudio));
            assert!(effects.contains(&Effect::AbortRequests));
        }
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let mut s = session();
        s.handle(Event::Stop);
        assert!(s.handle(Event::Stop).is_empty());
    }

    #[test]
    fn test_late_reply_after_stop_is_ignored() {
        let mut s = session();
        let effects = s.handle(Event::Start);
        let ticket = ticket_of(&effects);
        s.handle(Event::Stop);

        let effects = s.handle(Event::ReplyGenerated {
            ticket,
            turn: Turn::new(Speaker::A, "too late"),
        });
        assert!(effects.is_empty());
        assert!(s.transcript().is_empty());
        assert_eq!(s.phase(), Phase::Stopped);
    }

    #[test]
    fn test_duplicate_playback_end_is_noop() {
        let mut s = session();
        let effects = s.handle(Event::Start);
        let effects = s.handle(Event::ReplyGenerated {
            ticket: ticket_of(&effects),
            turn: Turn::new(Speaker::A, "X"),
        });
        let speak_ticket = ticket_of(&effects);

        let first = s.handle(Event::PlaybackEnded {
            ticket: speak_ticket,
        });
        assert_eq!(generations(&first), vec![Speaker::B]);

        let second = s.handle(Event::PlaybackEnded {
            ticket: speak_ticket,
        });
        assert!(second.is_empty());
        assert_eq!(s.phase(), Phase::GeneratingReply(Speaker::B));
    }

    #[test]
    fn test_trigger_while_generating_does_not_double_request() {
        let mut s = session();
        let effects = s.handle(Event::Start);
        let ticket = ticket_of(&effects);

        // A timer event reusing the outstanding generation ticket must not
        // issue a second request.
        let effects = s.handle(Event::TimerElapsed { ticket });
        assert!(generations(&effects).is_empty());
        assert!(s.is_generating());
        assert!(s.owns(ticket));

        s.handle(Event::ReplyGenerated {
            ticket,
            turn: Turn::new(Speaker::A, "X"),
        });
        assert_eq!(s.phase(), Phase::Speaking(Speaker::A));
    }

    #[test]
    fn test_restart_discards_old_session() {
        let mut s = session();
        let effects = s.handle(Event::Start);
        let old = ticket_of(&effects);
        let effects = s.handle(Event::ReplyGenerated {
            ticket: old,
            turn: Turn::new(Speaker::A, "X"),
        });
        let old_speak = ticket_of(&effects);

        let effects = s.handle(Event::Start);
        assert!(effects.contains(&Effect::StopAudio));
        assert!(s.transcript().is_empty());
        assert_eq!(s.phase(), Phase::GeneratingReply(Speaker::A));

        assert!(s.handle(Event::PlaybackEnded { ticket: old_speak }).is_empty());
        assert_eq!(s.phase(), Phase::GeneratingReply(Speaker::A));
    }

    #[test]
    fn test_wrong_speaker_reply_counts_as_failure() {
        let mut s = session();
        let effects = s.handle(Event::Start);
        let effects = s.handle(Event::ReplyGenerated {
            ticket: ticket_of(&effects),
            turn: Turn::new(Speaker::B, "not my turn"),
        });

        assert!(s.transcript().is_empty());
        assert_eq!(s.retry_count(), 1);
        assert_eq!(s.phase(), Phase::GeneratingReply(Speaker::A));
        assert_eq!(timers(&effects), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn test_transcript_alternates_over_many_turns() {
        let mut s = Session::new(TurnSettings {
            opening_speaker: Speaker::B,
            ..TurnSettings::default()
        });
        let mut effects = s.handle(Event::Start);

        for i in 0..8 {
            let speaker = match s.phase() {
                Phase::GeneratingReply(speaker) => speaker,
                other => panic!("unexpected phase {:?}", other),
            };
            effects = s.handle(Event::ReplyGenerated {
                ticket: ticket_of(&effects),
                turn: Turn::new(speaker, format!("turn {}", i)),
            });
            effects = if i % 3 == 0 {
                let e = s.handle(Event::SpeechFailed {
                    ticket: ticket_of(&effects),
                    reason: "tts down".to_string(),
                });
                s.handle(Event::TimerElapsed {
                    ticket: ticket_of(&e),
                })
            } else {
                s.handle(Event::PlaybackEnded {
                    ticket: ticket_of(&effects),
                })
            };
        }

        assert_eq!(s.transcript().len(), 8);
        assert_eq!(s.transcript()[0].speaker, Speaker::B);
        assert!(crate::speaker::alternates(s.transcript()));
    }

    #[test]
    fn test_custom_timing_is_honoured() {
        let mut s = Session::new(TurnSettings {
            max_retries: 1,
            backoff_base: Duration::from_millis(250),
            ..TurnSettings::default()
        });
        let effects = s.handle(Event::Start);
        let effects = fail_generation(&mut s, &effects);
        assert_eq!(timers(&effects), vec![Duration::from_millis(250)]);

        let effects = s.handle(Event::TimerElapsed {
            ticket: ticket_of(&effects),
        });
        fail_generation(&mut s, &effects);
        assert_eq!(s.phase(), Phase::Stopped);
    }

    #[test]
    fn test_snapshot_reports_current_speaker() {
        let mut s = session();
        assert_eq!(s.snapshot(), SessionSnapshot::default());
        s.handle(Event::Start);
        let snapshot = s.snapshot();
        assert_eq!(snapshot.phase, Phase::GeneratingReply(Speaker::A));
        assert_eq!(snapshot.current_speaker, Some(Speaker::A));
    }

    #[test]
    fn test_exhaustion_notice_converts_to_error() {
        let mut s = Session::new(TurnSettings {
            max_retries: 0,
            ..TurnSettings::default()
        });
        let effects = s.handle(Event::Start);
        let effects = fail_generation(&mut s, &effects);

        let notice = notices(&effects).pop().unwrap();
        match notice.terminal_error() {
            Some(DebateError::RetriesExhausted {
                speaker,
                attempts,
                last_error,
            }) => {
                assert_eq!(speaker, Speaker::A);
                assert_eq!(attempts, 1);
                assert!(!last_error.is_empty());
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_transient_notice_has_no_error() {
        let mut s = session();
        let effects = s.handle(Event::Start);
        let effects = fail_generation(&mut s, &effects);
        let notice = notices(&effects).pop().unwrap();
        assert!(!notice.is_terminal());
        assert!(notice.terminal_error().is_none());
    }

    #[test]
    fn test_huge_backoff_saturates_instead_of_panicking() {
        let mut s = Session::new(TurnSettings {
            backoff_base: Duration::MAX,
            ..TurnSettings::default()
        });
        let effects = s.handle(Event::Start);
        let effects = fail_generation(&mut s, &effects);
        let effects = s.handle(Event::TimerElapsed {
            ticket: ticket_of(&effects),
        });
        let effects = fail_generation(&mut s, &effects);
        assert_eq!(timers(&effects), vec![Duration::MAX]);
        assert_eq!(s.phase(), Phase::GeneratingReply(Speaker::A));
    }
}
