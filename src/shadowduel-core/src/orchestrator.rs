//! Debate orchestration.
//!
//! [`DebateOrchestrator`] is a single actor task. Commands from the
//! front-end and results from the work it spawns arrive on one queue and are
//! handled one at a time: each message becomes a session [`Event`], and the
//! resulting [`Effect`]s are executed before the next message is read.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{DebateError, GenerationError};
use crate::generation::ReplyGenerator;
use crate::session::{
    Effect, Event, Notice, Phase, Session, SessionSnapshot, Ticket, TurnSettings,
};
use crate::speaker::{Speaker, Turn};
use crate::speech::{AudioHandle, SpeechSynthesizer};

const NOTICE_CAPACITY: usize = 64;

enum Message {
    Start,
    Stop,
    Shutdown,
    Replied {
        ticket: Ticket,
        result: Result<Turn, GenerationError>,
    },
    /// Playback started; the orchestrator takes ownership of the handle.
    Playing {
        ticket: Ticket,
        handle: Box<dyn AudioHandle>,
    },
    SpeechFailed {
        ticket: Ticket,
        reason: String,
    },
    PlaybackEnded {
        ticket: Ticket,
    },
    TimerFired {
        ticket: Ticket,
    },
}

/// Front-end side of a running orchestrator.
///
/// Dropping the handle shuts the orchestrator down, stopping any audio.
pub struct DebateHandle {
    tx: mpsc::UnboundedSender<Message>,
    state: watch::Receiver<SessionSnapshot>,
    notices: broadcast::Sender<Notice>,
    task: Option<JoinHandle<()>>,
}

impl DebateHandle {
    /// Begin a new debate, discarding any current one.
    pub fn start(&self) -> Result<(), DebateError> {
        self.send(Message::Start)
    }

    pub fn stop(&self) -> Result<(), DebateError> {
        self.send(Message::Stop)
    }

    /// Session state, updated after every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    /// Transient warnings and terminal errors.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Stop the debate and wait for the orchestrator to exit.
    pub async fn shutdown(mut self) {
        let _ = self.tx.send(Message::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn send(&self, message: Message) -> Result<(), DebateError> {
        self.tx
            .send(message)
            .map_err(|_| DebateError::OrchestratorClosed)
    }
}

impl Drop for DebateHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Shutdown);
    }
}

/// Executes the session's effects against real clients.
pub struct DebateOrchestrator {
    session: Session,
    generator: Arc<dyn ReplyGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    state: watch::Sender<SessionSnapshot>,
    notices: broadcast::Sender<Notice>,
    /// The one audio handle currently playing, owned exclusively here.
    audio: Option<Box<dyn AudioHandle>>,
    timer: Option<JoinHandle<()>>,
    requests: Vec<JoinHandle<()>>,
}

impl DebateOrchestrator {
    /// Spawn the orchestrator on the current Tokio runtime. The debate stays
    /// `Idle` until [`DebateHandle::start`] is called.
    pub fn spawn(
        generator: Arc<dyn ReplyGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        settings: TurnSettings,
    ) -> DebateHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(SessionSnapshot::default());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let orchestrator = Self {
            session: Session::new(settings),
            generator,
            synthesizer,
            tx: tx.clone(),
            rx,
            state,
            notices: notices.clone(),
            audio: None,
            timer: None,
            requests: Vec::new(),
        };
        let task = tokio::spawn(orchestrator.run());

        DebateHandle {
            tx,
            state: state_rx,
            notices,
            task: Some(task),
        }
    }

    async fn run(mut self) {
        while let Some(message) = self.rx.recv().await {
            let event = match message {
                Message::Start => Event::Start,
                Message::Stop => Event::Stop,
                Message::Shutdown => {
                    let effects = self.session.handle(Event::Stop);
                    self.apply(effects);
                    break;
                }
                Message::Replied { ticket, result } => match result {
                    Ok(turn) => Event::ReplyGenerated { ticket, turn },
                    Err(e) => Event::GenerationFailed {
                        ticket,
                        reason: e.to_string(),
                    },
                },
                Message::Playing { ticket, handle } => {
                    self.adopt(ticket, handle);
                    continue;
                }
                Message::SpeechFailed { ticket, reason } => Event::SpeechFailed { ticket, reason },
                Message::PlaybackEnded { ticket } => Event::PlaybackEnded { ticket },
                Message::TimerFired { ticket } => Event::TimerElapsed { ticket },
            };

            let effects = self.session.handle(event);
            self.apply(effects);
        }

        info!("debate orchestrator exited");
    }

    /// Keep `handle` if it belongs to the utterance being spoken; otherwise
    /// it is stale and is stopped at once.
    fn adopt(&mut self, ticket: Ticket, mut handle: Box<dyn AudioHandle>) {
        let speaking = matches!(self.session.phase(), Phase::Speaking(_));
        if !(speaking && self.session.owns(ticket)) {
            debug!("discarding audio from a superseded turn");
            handle.stop();
            return;
        }

        if let Some(mut previous) = self.audio.replace(handle) {
            previous.stop();
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Generate {
                    ticket,
                    speaker,
                    transcript,
                } => self.spawn_generation(ticket, speaker, transcript),
                Effect::Speak { ticket, turn } => self.spawn_speech(ticket, turn),
                Effect::StartTimer { ticket, delay } => self.start_timer(ticket, delay),
                Effect::CancelTimer => {
                    if let Some(timer) = self.timer.take() {
                        timer.abort();
                    }
                }
                Effect::StopAudio => {
                    if let Some(mut audio) = self.audio.take() {
                        audio.stop();
                    }
                }
                Effect::AbortRequests => {
                    for request in self.requests.drain(..) {
                        request.abort();
                    }
                }
                Effect::Notify(notice) => {
                    // No subscribers is fine.
                    let _ = self.notices.send(notice);
                }
                Effect::Publish => {
                    self.state.send_replace(self.session.snapshot());
                }
            }
        }
    }

    fn spawn_generation(&mut self, ticket: Ticket, speaker: Speaker, transcript: Vec<Turn>) {
        let generator = Arc::clone(&self.generator);
        let tx = self.tx.clone();

        self.track(tokio::spawn(async move {
            let result = generator.generate_reply(&transcript, speaker).await;
            let _ = tx.send(Message::Replied { ticket, result });
        }));
    }

    fn spawn_speech(&mut self, ticket: Ticket, turn: Turn) {
        let synthesizer = Arc::clone(&self.synthesizer);
        let tx = self.tx.clone();

        self.track(tokio::spawn(async move {
            let mut handle = match synthesizer.synthesize(&turn.text, turn.speaker).await {
                Ok(handle) => handle,
                Err(e) => {
                    let _ = tx.send(Message::SpeechFailed {
                        ticket,
                        reason: e.to_string(),
                    });
                    return;
                }
            };

            let completion = match handle.start().await {
                Ok(completion) => completion,
                Err(e) => {
                    handle.stop();
                    let _ = tx.send(Message::SpeechFailed {
                        ticket,
                        reason: e.to_string(),
                    });
                    return;
                }
            };

            if tx.send(Message::Playing { ticket, handle }).is_err() {
                return;
            }
            if completion.ended().await {
                let _ = tx.send(Message::PlaybackEnded { ticket });
            }
        }));
    }

    fn start_timer(&mut self, ticket: Ticket, delay: Duration) {
        if let Some(previous) = self.timer.take() {
            previous.abort();
        }
        let tx = self.tx.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Message::TimerFired { ticket });
        }));
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.requests.retain(|request| !request.is_finished());
        self.requests.push(task);
    }
}
