//! ElevenLabs text-to-speech provider.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::error::{DebateError, SynthesisError};
use crate::playback::RodioAudio;
use crate::speaker::Speaker;
use crate::speech::{AudioHandle, SpeechSynthesizer, VoiceMap, VoiceProfile};

const XI_API_KEY_HEADER: &str = "xi-api-key";

#[derive(Debug, Serialize)]
struct TextToSpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    speed: f32,
}

pub struct ElevenLabsSynthesizer {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model_id: String,
    stability: f32,
    similarity_boost: f32,
    voices: VoiceMap,
}

impl ElevenLabsSynthesizer {
    pub fn new(config: &Config, api_key: impl Into<String>) -> Result<Self, DebateError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.speech.request_timeout_secs))
            .build()
            .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.speech.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model_id: config.speech.model_id.clone(),
            stability: config.speech.stability,
            similarity_boost: config.speech.similarity_boost,
            voices: config.voices(),
        })
    }

    fn endpoint(&self, voice: &VoiceProfile) -> String {
        format!("{}/text-to-speech/{}", self.api_base, voice.voice_id)
    }

    fn request<'a>(&'a self, text: &'a str, voice: &VoiceProfile) -> TextToSpeechRequest<'a> {
        TextToSpeechRequest {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings {
                stability: self.stability,
                similarity_boost: self.similarity_boost,
                speed: voice.speaking_rate,
            },
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        speaker: Speaker,
    ) -> Result<Box<dyn AudioHandle>, SynthesisError> {
        let voice = self.voices.for_speaker(speaker);
        debug!(%speaker, voice = %voice.voice_id, chars = text.len(), "requesting ElevenLabs speech");

        let response = self
            .http
            .post(self.endpoint(voice))
            .header(XI_API_KEY_HEADER, &self.api_key)
            .json(&self.request(text, voice))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }

        Ok(Box::new(RodioAudio::new(audio.to_vec())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_carries_speaking_rate() {
        let mut config = crate::config::default_config();
        config.speakers.b.speaking_rate = 1.15;
        let synth = ElevenLabsSynthesizer::new(&config, "key").unwrap();
        let voice = synth.voices.for_speaker(Speaker::B).clone();

        let json = serde_json::to_value(synth.request("Seriously?!", &voice)).unwrap();
        assert_eq!(json["text"], "Seriously?!");
        assert_eq!(json["model_id"], "eleven_multilingual_v2");
        assert!((json["voice_settings"]["speed"].as_f64().unwrap() - 1.15).abs() < 1e-6);
        assert!((json["voice_settings"]["stability"].as_f64().unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_endpoint_per_speaker() {
        let config = crate::config::default_config();
        let synth = ElevenLabsSynthesizer::new(&config, "key").unwrap();
        assert_eq!(
            synth.endpoint(synth.voices.for_speaker(Speaker::A)),
            "https://api.elevenlabs.io/v1/text-to-speech/EXAVITQu4vr4xnSDxMaL"
        );
    }
}
