//! ShadowDuel CLI - voiced AI debates in the terminal
//!
//! Two personas argue in alternating turns; every reply is printed and
//! spoken aloud before the other side answers.

use clap::{Parser, ValueEnum};
use colored::Colorize;
use shadowduel_core::{
    Config, DebateError, DebateOrchestrator, ElevenLabsSynthesizer, GeminiGenerator,
    GenerationProvider, KokoroSynthesizer, Notice, OpenAIGenerator, Phase, ReplyGenerator,
    SessionSnapshot, Speaker, SpeechProvider, SpeechSynthesizer, default_config,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Gemini,
    Openai,
}

#[derive(Clone, Copy, ValueEnum)]
enum VoiceArg {
    Elevenlabs,
    Kokoro,
}

#[derive(Parser)]
#[command(
    name = "shadowduel",
    version,
    about = "Voiced AI debate - two personas argue out loud",
    long_about = "Runs an endless spoken debate between two AI personas. Replies come from \
Gemini or an OpenAI-compatible API and are voiced with ElevenLabs or local Kokoro TTS."
)]
struct Cli {
    /// The topic to debate (overrides the config file)
    #[arg(value_name = "TOPIC")]
    topic: Option<String>,

    /// Path to a TOML config file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Stop after this many turns have been spoken
    #[arg(short, long, value_name = "TURNS")]
    turns: Option<usize>,

    /// Reply generation provider
    #[arg(long, value_enum, value_name = "PROVIDER")]
    provider: Option<ProviderArg>,

    /// Model name for the generation provider
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,

    /// Speech provider
    #[arg(long, value_enum, value_name = "VOICE")]
    voice: Option<VoiceArg>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => default_config(),
    };
    apply_overrides(&mut config, &cli);

    // RUST_LOG wins over the config file; logs go to stderr.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let generator = build_generator(&config)?;
    let synthesizer = build_synthesizer(&config).await?;

    print_header(&config);

    let handle = DebateOrchestrator::spawn(generator, synthesizer, config.turn_settings());
    let mut state = handle.subscribe();
    let mut notices = handle.notices();
    handle.start()?;

    let mut printed = 0;
    let mut terminal: Option<DebateError> = None;

    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state.borrow_and_update().clone();
                printed = print_new_turns(&config, &snapshot, printed);

                if let Some(limit) = cli.turns {
                    if turns_finished(&snapshot) >= limit {
                        info!(turns = limit, "turn limit reached");
                        handle.stop()?;
                        break;
                    }
                }
                if snapshot.phase == Phase::Stopped && terminal.is_some() {
                    break;
                }
            }
            notice = notices.recv() => {
                let Ok(notice) = notice else { continue };
                print_notice(&notice);
                if let Some(error) = notice.terminal_error() {
                    terminal = Some(error);
                    if handle.snapshot().phase == Phase::Stopped {
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("{}", "Interrupted.".yellow());
                handle.stop()?;
                break;
            }
        }
    }

    handle.shutdown().await;

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    if terminal.is_some() {
        println!("{}", "  Debate aborted.".red().bold());
    } else {
        println!("{}", "  Debate concluded.".bright_green().bold());
    }
    println!("{}", "═".repeat(70).bright_blue());
    println!();

    match terminal {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(topic) = &cli.topic {
        config.debate.topic = topic.clone();
    }
    if let Some(provider) = cli.provider {
        config.generation.provider = match provider {
            ProviderArg::Gemini => GenerationProvider::Gemini,
            ProviderArg::Openai => GenerationProvider::OpenAI,
        };
    }
    if let Some(model) = &cli.model {
        config.generation.model = Some(model.clone());
    }
    if let Some(voice) = cli.voice {
        config.speech.provider = match voice {
            VoiceArg::Elevenlabs => SpeechProvider::ElevenLabs,
            VoiceArg::Kokoro => SpeechProvider::Kokoro,
        };
    }
}

fn require_env(name: &str) -> Result<String, DebateError> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| DebateError::ConfigError(format!("{} is not set", name)))
}

fn build_generator(config: &Config) -> Result<Arc<dyn ReplyGenerator>, DebateError> {
    match config.generation.provider {
        GenerationProvider::Gemini => {
            let api_key = require_env("GEMINI_API_KEY")?;
            Ok(Arc::new(GeminiGenerator::new(config, api_key)?))
        }
        GenerationProvider::OpenAI => {
            let api_base = config
                .generation
                .api_base
                .clone()
                .or_else(|| env::var("OPENAI_API_BASE").ok())
                .or_else(|| env::var("OPENAI_BASE_URL").ok())
                .unwrap_or_else(|| config.generation.api_base().to_string());
            // Local OpenAI-compatible servers often need no key.
            let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
                eprintln!(
                    "{}",
                    "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
                );
                String::new()
            });
            Ok(Arc::new(OpenAIGenerator::new(config, api_base, api_key)?))
        }
    }
}

async fn build_synthesizer(config: &Config) -> Result<Arc<dyn SpeechSynthesizer>, DebateError> {
    match config.speech.provider {
        SpeechProvider::ElevenLabs => {
            let api_key = require_env("ELEVENLABS_API_KEY")?;
            Ok(Arc::new(ElevenLabsSynthesizer::new(config, api_key)?))
        }
        SpeechProvider::Kokoro => {
            println!("{}", "Loading local TTS engine...".dimmed());
            Ok(Arc::new(KokoroSynthesizer::new(config).await?))
        }
    }
}

/// Turns whose audio (or fallback delay) is over.
fn turns_finished(snapshot: &SessionSnapshot) -> usize {
    match snapshot.phase {
        Phase::Speaking(_) | Phase::WaitingFallbackDelay(_) => {
            snapshot.transcript.len().saturating_sub(1)
        }
        _ => snapshot.transcript.len(),
    }
}

fn print_header(config: &Config) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", format!("  {}", "ShadowDuel".bold()).bright_blue().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Topic:".bold(), config.debate.topic.bright_white());
    println!();
    println!("{}", "Speakers:".bold());
    for speaker in [Speaker::A, Speaker::B] {
        let voice = config.voice(speaker);
        println!(
            "  {}. {} - voice {}",
            speaker.label(),
            config.speaker_name(speaker).bright_cyan(),
            voice.voice_id.dimmed()
        );
    }
    println!(
        "  {} {}",
        "model:".dimmed(),
        config.generation.model().dimmed()
    );
    println!();
    println!("{}", "─".repeat(70).dimmed());
    println!();
}

/// Print turns past `printed`; returns the new count.
fn print_new_turns(config: &Config, snapshot: &SessionSnapshot, printed: usize) -> usize {
    // A restart clears the transcript.
    let printed = printed.min(snapshot.transcript.len());

    for turn in &snapshot.transcript[printed..] {
        println!(
            "{} {}",
            "▶".bright_cyan(),
            config.speaker_name(turn.speaker).bright_cyan().bold()
        );
        for line in textwrap(&turn.text, 66).lines() {
            println!("  {}", line);
        }
        println!();
    }

    snapshot.transcript.len()
}

fn print_notice(notice: &Notice) {
    if notice.is_terminal() {
        eprintln!("{} {}", "Error:".red().bold(), notice.to_string().red());
    } else {
        eprintln!("{} {}", "Warning:".yellow().bold(), notice.to_string().yellow());
    }
}

/// Greedy word wrap at `width` columns.
fn textwrap(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        if !line.is_empty() && line.chars().count() + word.chars().count() + 1 > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }

    lines.join("\n")
}
