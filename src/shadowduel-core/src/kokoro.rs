//! Local text-to-speech using kokoro-tiny.

use async_trait::async_trait;
use kokoro_tiny::TtsEngine;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{DebateError, SynthesisError};
use crate::playback::RodioAudio;
use crate::speaker::Speaker;
use crate::speech::{AudioHandle, SpeechSynthesizer, VoiceMap};

/// Kokoro output sample rate.
pub const SAMPLE_RATE: u32 = 24_000;

/// Kokoro has a strict input limit; longer text is split.
const MAX_CHUNK_CHARS: usize = 200;

/// 0.3 s between chunks.
const CHUNK_GAP_SAMPLES: usize = 7_200;

/// 0.5 s after the last chunk so the tail is not clipped.
const TRAILING_PAD_SAMPLES: usize = 12_000;

/// Offline synthesizer. The engine downloads its model on first use.
pub struct KokoroSynthesizer {
    engine: Arc<Mutex<TtsEngine>>,
    voices: VoiceMap,
}

impl KokoroSynthesizer {
    /// Initialize the engine and check both configured voices exist.
    pub async fn new(config: &Config) -> Result<Self, DebateError> {
        let engine = TtsEngine::new()
            .await
            .map_err(|e| DebateError::ConfigError(format!("Failed to initialize TTS: {}", e)))?;

        let available = engine.voices();
        let voices = config.voices();
        for voice in [&voices.a, &voices.b] {
            validate_voice(&available, &voice.voice_id)?;
        }
        info!(voices = available.len(), "kokoro engine ready");

        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            voices,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for KokoroSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        speaker: Speaker,
    ) -> Result<Box<dyn AudioHandle>, SynthesisError> {
        let voice = self.voices.for_speaker(speaker).clone();
        let engine = Arc::clone(&self.engine);
        let text = text.to_string();
        debug!(%speaker, voice = %voice.voice_id, chars = text.len(), "synthesizing locally");

        let samples = tokio::task::spawn_blocking(move || {
            let mut engine = engine
                .lock()
                .map_err(|_| SynthesisError::Engine("TTS engine lock poisoned".to_string()))?;
            synthesize_chunks(&mut engine, &text, &voice.voice_id)
                .map(|samples| change_speed(samples, voice.speaking_rate))
        })
        .await
        .map_err(|e| SynthesisError::Engine(format!("Synthesis task failed: {}", e)))??;

        if samples.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }

        let wav = encode_wav(&samples, SAMPLE_RATE)?;
        Ok(Box::new(RodioAudio::new(wav)))
    }
}

fn validate_voice(available: &[String], voice_id: &str) -> Result<(), DebateError> {
    if available.iter().any(|v| v == voice_id) {
        return Ok(());
    }

    let mut english: Vec<&String> = available
        .iter()
        .filter(|v| {
            v.starts_with("af_") || v.starts_with("am_") || v.starts_with("bf_") || v.starts_with("bm_")
        })
        .collect();
    english.sort();

    Err(DebateError::ConfigError(format!(
        "Unknown voice '{}'. Available voices:\n{}",
        voice_id,
        english
            .iter()
            .map(|v| format!("  - {}", v))
            .collect::<Vec<_>>()
            .join("\n")
    )))
}

fn synthesize_chunks(
    engine: &mut TtsEngine,
    text: &str,
    voice_id: &str,
) -> Result<Vec<f32>, SynthesisError> {
    let mut all_samples = Vec::new();

    for chunk in split_into_chunks(text, MAX_CHUNK_CHARS) {
        let samples = engine
            .synthesize(&chunk, Some(voice_id))
            .map_err(|e| SynthesisError::Engine(format!("Synthesis failed: {}", e)))?;
        all_samples.extend(samples);
        all_samples.extend(std::iter::repeat_n(0.0, CHUNK_GAP_SAMPLES));
    }

    if all_samples.is_empty() {
        return Ok(all_samples);
    }
    all_samples.extend(std::iter::repeat_n(0.0, TRAILING_PAD_SAMPLES));
    Ok(all_samples)
}

/// Sentence-sized pieces, packed greedily into chunks of at most
/// `max_chars`. Sentences longer than that are cut at commas first.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let pieces = text
        .split_inclusive(['.', '!', '?', ';'])
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .flat_map(|sentence| {
            if sentence.len() > max_chars {
                sentence
                    .split_inclusive(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .collect()
            } else {
                vec![sentence]
            }
        });

    let mut chunks: Vec<String> = Vec::new();
    for piece in pieces {
        match chunks.last_mut() {
            Some(chunk) if chunk.len() + 1 + piece.len() <= max_chars => {
                chunk.push(' ');
                chunk.push_str(piece);
            }
            _ => chunks.push(piece.to_string()),
        }
    }
    chunks
}

/// Resample by `rate` with linear interpolation; above 1.0 plays faster.
fn change_speed(samples: Vec<f32>, rate: f32) -> Vec<f32> {
    if rate <= 0.0 || (rate - 1.0).abs() < 0.001 {
        return samples;
    }

    let len = (samples.len() as f32 / rate) as usize;
    (0..len)
        .filter_map(|i| {
            let pos = i as f32 * rate;
            let idx = pos as usize;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(a), Some(b)) => Some(a + (b - a) * pos.fract()),
                (Some(a), None) => Some(*a),
                _ => None,
            }
        })
        .collect()
}

/// Mono 16-bit PCM WAV in memory.
fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, SynthesisError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut wav = Vec::new();
    let mut writer = hound::WavWriter::new(Cursor::new(&mut wav), spec)?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;

    Ok(wav)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_into_chunks() {
        let text = "Hello world. This is a test. Another sentence here.";
        let chunks = split_into_chunks(text, 30);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 35);
        }
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn test_split_long_sentence_on_commas() {
        let text = "one two three, four five six, seven eight nine, ten eleven twelve.";
        let chunks = split_into_chunks(text, 20);
        assert!(chunks.len() >= 3);
        assert!(chunks[0].ends_with(','));
    }

    #[test]
    fn test_split_blank_text() {
        assert!(split_into_chunks("   ", 200).is_empty());
    }

    #[test]
    fn test_change_speed() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        assert_eq!(change_speed(samples.clone(), 1.0).len(), 100);
        assert_eq!(change_speed(samples.clone(), 2.0).len(), 50);

        let slow = change_speed(samples, 0.5);
        assert_eq!(slow.len(), 200);
        assert!((slow[1] - 0.5).abs() < 1e-6);
        assert_eq!(slow[199], 99.0);
    }

    #[test]
    fn test_short_sentences_share_a_chunk() {
        let chunks = split_into_chunks("No. Way! Really?", 200);
        assert_eq!(chunks, vec!["No. Way! Really?"]);
    }

    #[test]
    fn test_encode_wav_roundtrips_header() {
        let samples = vec![0.0, 0.5, -0.5, 1.0];
        let wav = encode_wav(&samples, SAMPLE_RATE).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 4);
    }

    #[test]
    fn test_validate_voice_lists_english_voices() {
        let available = vec!["af_sky".to_string(), "bm_george".to_string(), "jf_alpha".to_string()];
        assert!(validate_voice(&available, "af_sky").is_ok());
        let err = validate_voice(&available, "nope").unwrap_err().to_string();
        assert!(err.contains("bm_george"));
        assert!(!err.contains("jf_alpha"));
    }
}
