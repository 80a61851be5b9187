//! Speech recognition and synthesis controller
//!
//! Wraps two independent platform capabilities behind one state machine:
//! - Recognition: `Idle -> RequestingPermission -> Listening -> Idle`
//! - Synthesis: at most one utterance in flight, never queued
//!
//! Platform engines report back through `handle_recognition_event` and
//! `handle_synthesis_event`. Errors raised inside those callbacks have no caller
//! to return to, so they land in the observable `speech_error` field instead.
//! Only a failed microphone permission request is returned as an `Err`.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::{CogniError, Result};
use crate::voices::{select_voice, Voice, VoiceCatalog};

pub const NOT_SUPPORTED: &str = "not-supported";
pub const NOT_ALLOWED: &str = "not-allowed";
pub const START_FAILED: &str = "start-failed";
pub const ABORTED: &str = "aborted";
pub const SERVICE_NOT_ALLOWED: &str = "service-not-allowed";

// Ends caused by these never trigger an automatic restart
const NO_RESTART_CODES: [&str; 3] = [ABORTED, NOT_ALLOWED, SERVICE_NOT_ALLOWED];

const MSG_NOT_SUPPORTED: &str = "Speech recognition is not supported on this platform.";
const MSG_PERMISSION_DENIED: &str = "Microphone permission was denied.";
const MSG_MICROPHONE_UNAVAILABLE: &str = "Could not access the microphone.";
const MSG_PERMISSION_TIMEOUT: &str = "Timed out waiting for microphone permission.";
const MSG_START_FAILED: &str = "Could not start speech recognition.";
const MSG_ENGINE_ERROR: &str = "An error occurred during speech recognition.";

/// Recognition side of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionState {
    Idle,
    /// Waiting for the user to answer the microphone prompt
    RequestingPermission,
    Listening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Prompt,
}

/// Observable recognition error: a taxonomy code or a verbatim engine code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeechError {
    pub error: String,
    pub message: String,
}

impl SpeechError {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }

    /// Turn the observed error into a `CogniError` for callers that want to escalate it
    pub fn to_cogni_error(&self) -> CogniError {
        match self.error.as_str() {
            NOT_SUPPORTED => CogniError::NotSupported(self.message.clone()),
            NOT_ALLOWED => CogniError::PermissionDenied(self.message.clone()),
            START_FAILED => CogniError::EngineStartFailure(self.message.clone()),
            code => CogniError::EngineRuntime {
                code: code.to_string(),
                message: self.message.clone(),
            },
        }
    }
}

/// One segment of a recognition result list (best alternative only)
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub transcript: String,
    pub is_final: bool,
}

impl RecognitionResult {
    pub fn interim(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            is_final: false,
        }
    }

    pub fn final_segment(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            is_final: true,
        }
    }
}

/// Callbacks from the recognition engine
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Start,
    /// Full result list of the session; segments before `result_index` did not change
    Result {
        result_index: usize,
        results: Vec<RecognitionResult>,
    },
    Error {
        code: String,
        message: Option<String>,
    },
    End,
}

/// Callbacks from the synthesis engine, tagged with the utterance id they belong to
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisEvent {
    Start { id: u64 },
    End { id: u64 },
    Error { id: u64, code: String },
}

/// Platform voice-to-text engine
pub trait RecognitionEngine: Send {
    fn start(&mut self, lang: &str) -> std::result::Result<(), String>;
    fn stop(&mut self);
    fn abort(&mut self);
    /// Drop every callback the controller registered
    fn detach(&mut self);
}

/// Live microphone stream obtained while probing for permission
pub trait AudioGrant: Send {
    fn release(self: Box<Self>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MicrophoneError {
    NotAllowed,
    Unavailable(String),
}

#[async_trait]
pub trait MicrophoneAccess: Send + Sync {
    async fn request(&self) -> std::result::Result<Box<dyn AudioGrant>, MicrophoneError>;

    /// Current permission without prompting; `None` when the platform cannot tell
    async fn query(&self) -> Option<PermissionStatus> {
        None
    }
}

/// One text-to-speech playback request as handed to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: u64,
    pub text: String,
    pub lang: String,
    /// None plays with the platform default
    pub voice: Option<Voice>,
    pub pitch: f32,
    pub rate: f32,
    pub volume: f32,
}

/// Platform text-to-speech engine
pub trait SynthesisEngine: Send {
    fn voices(&self) -> Vec<Voice>;
    fn speak(&mut self, utterance: &Utterance) -> std::result::Result<(), String>;
    fn cancel(&mut self);
    fn detach(&mut self);
}

type OnEnd = Box<dyn FnOnce() + Send>;

pub struct SpeakRequest {
    pub text: String,
    pub lang: Option<String>,
    pub voice: Option<Voice>,
    pub pitch: f32,
    pub rate: f32,
    pub volume: f32,
    pub on_end: Option<OnEnd>,
}

impl SpeakRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            lang: None,
            voice: None,
            pitch: 1.0,
            rate: 1.0,
            volume: 1.0,
            on_end: None,
        }
    }

    pub fn lang(mut self, lang: &str) -> Self {
        self.lang = Some(lang.to_string());
        self
    }

    pub fn voice(mut self, voice: Voice) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn on_end<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_end = Some(Box::new(f));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakOutcome {
    Started(u64),
    /// Another utterance is still playing
    Busy,
    NotSupported,
    Failed(String),
}

struct ActiveUtterance {
    id: u64,
    text: String,
    on_end: Option<OnEnd>,
}

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub recognition_language: String,
    pub synthesis_language: String,
    pub max_auto_restarts: u32,
    pub permission_timeout: Duration,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SpeechConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            recognition_language: config.recognition_language.clone(),
            synthesis_language: config.synthesis_language.clone(),
            max_auto_restarts: config.max_auto_restarts,
            permission_timeout: Duration::from_millis(config.permission_timeout_ms),
        }
    }
}

/// State exposed to the UI layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechSnapshot {
    pub state: RecognitionState,
    pub is_listening: bool,
    pub transcript: String,
    pub interim_transcript: String,
    pub speech_error: Option<SpeechError>,
    pub permission_status: Option<PermissionStatus>,
    pub recognition_language: String,
    pub is_speaking: bool,
    pub current_utterance: Option<String>,
    pub selected_voice: Option<Voice>,
    pub supported_voices: Vec<Voice>,
    pub supports_recognition: bool,
    pub supports_synthesis: bool,
}

pub struct SpeechController {
    config: SpeechConfig,
    recognition: Option<Box<dyn RecognitionEngine>>,
    synthesis: Option<Box<dyn SynthesisEngine>>,
    microphone: Arc<dyn MicrophoneAccess>,

    // Recognition session
    state: RecognitionState,
    transcript: String,
    interim_transcript: String,
    speech_error: Option<SpeechError>,
    permission_status: Option<PermissionStatus>,
    recognition_language: String,
    /// Language of the running (or last) session
    active_language: Option<String>,
    /// Engine sessions started whose `End` has not arrived yet
    open_sessions: u32,
    stop_requested: bool,
    restarts_without_result: u32,

    // Synthesis
    current: Option<ActiveUtterance>,
    selected_voice: Option<Voice>,
    voices: VoiceCatalog,
    next_utterance_id: u64,

    disposed: bool,
}

impl SpeechController {
    /// Engines are `None` where the platform lacks the capability
    pub fn new(
        config: SpeechConfig,
        recognition: Option<Box<dyn RecognitionEngine>>,
        synthesis: Option<Box<dyn SynthesisEngine>>,
        microphone: Arc<dyn MicrophoneAccess>,
    ) -> Self {
        info!(
            "Initializing speech controller: recognition={}, synthesis={}, lang={}",
            recognition.is_some(),
            synthesis.is_some(),
            config.recognition_language
        );

        if recognition.is_none() {
            warn!("Speech recognition unavailable - voice input disabled");
        }
        if synthesis.is_none() {
            warn!("Speech synthesis unavailable - responses will be text only");
        }

        let recognition_language = config.recognition_language.clone();
        Self {
            config,
            recognition,
            synthesis,
            microphone,
            state: RecognitionState::Idle,
            transcript: String::new(),
            interim_transcript: String::new(),
            speech_error: None,
            permission_status: None,
            recognition_language,
            active_language: None,
            open_sessions: 0,
            stop_requested: false,
            restarts_without_result: 0,
            current: None,
            selected_voice: None,
            voices: VoiceCatalog::default(),
            next_utterance_id: 1,
            disposed: false,
        }
    }

    /// Read the current microphone permission and the first voice list
    pub async fn initialize(&mut self) {
        if let Some(status) = self.microphone.query().await {
            debug!("Initial microphone permission: {:?}", status);
            self.permission_status = Some(status);
        }
        self.refresh_voices();
    }

    pub fn supports_recognition(&self) -> bool {
        self.recognition.is_some()
    }

    pub fn supports_synthesis(&self) -> bool {
        self.synthesis.is_some()
    }

    pub fn state(&self) -> RecognitionState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == RecognitionState::Listening
    }

    pub fn is_speaking(&self) -> bool {
        self.current.is_some()
    }

    pub fn speech_error(&self) -> Option<&SpeechError> {
        self.speech_error.as_ref()
    }

    pub fn snapshot(&self) -> SpeechSnapshot {
        SpeechSnapshot {
            state: self.state,
            is_listening: self.is_listening(),
            transcript: self.transcript.clone(),
            interim_transcript: self.interim_transcript.clone(),
            speech_error: self.speech_error.clone(),
            permission_status: self.permission_status,
            recognition_language: self.recognition_language.clone(),
            is_speaking: self.is_speaking(),
            current_utterance: self.current.as_ref().map(|u| u.text.clone()),
            selected_voice: self.selected_voice.clone(),
            supported_voices: self.voices.voices().to_vec(),
            supports_recognition: self.supports_recognition(),
            supports_synthesis: self.supports_synthesis(),
        }
    }

    fn transition(&mut self, next: RecognitionState) {
        if self.state != next {
            info!("Recognition state: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    // ---- Recognition ----

    /// Ask for the microphone and start a recognition session
    ///
    /// Does nothing while a session is starting or running. Only a failed
    /// permission request returns `Err`; every other failure is reported
    /// through `speech_error`.
    pub async fn start_listening(&mut self, lang: Option<&str>) -> Result<()> {
        if self.disposed {
            warn!("start_listening called on a disposed speech controller");
            return Ok(());
        }
        if self.state != RecognitionState::Idle {
            warn!("Speech recognition already active ({:?}) - ignoring start", self.state);
            return Ok(());
        }

        self.stop_requested = false;
        self.restarts_without_result = 0;

        let lang = lang
            .map(str::to_string)
            .unwrap_or_else(|| self.recognition_language.clone());
        self.begin_session(lang).await
    }

    async fn begin_session(&mut self, lang: String) -> Result<()> {
        if self.recognition.is_none() {
            warn!("Speech recognition not supported");
            self.speech_error = Some(SpeechError::new(NOT_SUPPORTED, MSG_NOT_SUPPORTED));
            self.transition(RecognitionState::Idle);
            return Ok(());
        }

        self.transition(RecognitionState::RequestingPermission);

        let microphone = Arc::clone(&self.microphone);
        let denial = match tokio::time::timeout(self.config.permission_timeout, microphone.request()).await {
            Ok(Ok(grant)) => {
                // Permission probe only; the engine opens its own stream
                grant.release();
                None
            }
            Ok(Err(MicrophoneError::NotAllowed)) => Some(MSG_PERMISSION_DENIED.to_string()),
            Ok(Err(MicrophoneError::Unavailable(reason))) => {
                warn!("Microphone unavailable: {}", reason);
                Some(MSG_MICROPHONE_UNAVAILABLE.to_string())
            }
            Err(_) => Some(MSG_PERMISSION_TIMEOUT.to_string()),
        };

        if let Some(message) = denial {
            error!("Microphone access failed: {}", message);
            self.permission_status = Some(PermissionStatus::Denied);
            self.speech_error = Some(SpeechError::new(NOT_ALLOWED, &message));
            self.transition(RecognitionState::Idle);
            return Err(CogniError::PermissionDenied(message));
        }

        self.permission_status = Some(PermissionStatus::Granted);
        self.transcript.clear();
        self.interim_transcript.clear();
        self.speech_error = None;
        self.active_language = Some(lang.clone());

        let started = match self.recognition.as_mut() {
            Some(engine) => engine.start(&lang),
            None => Err(MSG_NOT_SUPPORTED.to_string()),
        };

        match started {
            Ok(()) => {
                info!("Speech recognition started ({})", lang);
                self.open_sessions += 1;
                self.transition(RecognitionState::Listening);
            }
            Err(e) => {
                error!("Speech recognition failed to start: {}", e);
                self.speech_error = Some(SpeechError::new(START_FAILED, MSG_START_FAILED));
                self.transition(RecognitionState::Idle);
            }
        }

        Ok(())
    }

    /// Ask the engine to finish the current session; no automatic restart follows
    pub fn stop_listening(&mut self) {
        if self.state != RecognitionState::Listening {
            debug!("stop_listening ignored in state {:?}", self.state);
            return;
        }

        self.stop_requested = true;
        if let Some(engine) = self.recognition.as_mut() {
            engine.stop();
        }
        info!("Speech recognition stop requested");
    }

    pub async fn handle_recognition_event(&mut self, event: RecognitionEvent) {
        if self.disposed {
            debug!("Ignoring recognition event after dispose: {:?}", event);
            return;
        }

        match event {
            RecognitionEvent::Start => {
                self.transition(RecognitionState::Listening);
            }
            RecognitionEvent::Result { result_index, results } => {
                let mut final_text = String::new();
                let mut interim_text = String::new();
                for result in results.iter().skip(result_index) {
                    if result.is_final {
                        final_text.push_str(&result.transcript);
                    } else {
                        interim_text.push_str(&result.transcript);
                    }
                }
                self.transcript = final_text;
                self.interim_transcript = interim_text;
                self.restarts_without_result = 0;
            }
            RecognitionEvent::Error { code, message } => {
                error!("Speech recognition error: {}", code);
                let message = message.unwrap_or_else(|| MSG_ENGINE_ERROR.to_string());
                self.speech_error = Some(SpeechError::new(&code, &message));
                self.transition(RecognitionState::Idle);
            }
            RecognitionEvent::End => self.handle_end().await,
        }
    }

    async fn handle_end(&mut self) {
        if self.open_sessions == 0 {
            debug!("Recognition end without an open session");
            return;
        }
        self.open_sessions -= 1;
        if self.open_sessions > 0 {
            // An errored session ended after its replacement already started
            debug!("Ignoring end of a superseded recognition session");
            return;
        }
        self.transition(RecognitionState::Idle);

        if self.stop_requested {
            self.stop_requested = false;
            info!("Speech recognition stopped by user");
            return;
        }

        if let Some(err) = &self.speech_error {
            if NO_RESTART_CODES.contains(&err.error.as_str()) {
                info!("Speech recognition ended ({}) - not restarting", err.error);
                return;
            }
        }

        if self.restarts_without_result >= self.config.max_auto_restarts {
            warn!(
                "Speech recognition ended {} times without a result - giving up",
                self.restarts_without_result + 1
            );
            return;
        }

        let Some(lang) = self.active_language.clone() else {
            return;
        };

        self.restarts_without_result += 1;
        info!(
            "Speech recognition ended unexpectedly - restarting ({}/{})",
            self.restarts_without_result, self.config.max_auto_restarts
        );
        if let Err(e) = self.begin_session(lang).await {
            warn!("Automatic restart failed: {}", e);
        }
    }

    /// Language used by the next explicit `start_listening` without an argument
    pub fn set_recognition_language(&mut self, lang: &str) {
        info!("Recognition language set to {}", lang);
        self.recognition_language = lang.to_string();
    }

    /// Platform notification that the microphone permission changed
    pub fn handle_permission_change(&mut self, status: PermissionStatus) {
        info!("Microphone permission changed: {:?}", status);
        self.permission_status = Some(status);
    }

    // ---- Synthesis ----

    /// Play `request` unless an utterance is already in flight
    pub fn speak(&mut self, request: SpeakRequest) -> SpeakOutcome {
        if self.disposed {
            return SpeakOutcome::NotSupported;
        }
        if self.synthesis.is_none() {
            warn!("Speech synthesis not supported");
            return SpeakOutcome::NotSupported;
        }
        if let Some(current) = &self.current {
            warn!("Already speaking utterance {} - ignoring new request", current.id);
            return SpeakOutcome::Busy;
        }

        let lang = request
            .lang
            .unwrap_or_else(|| self.config.synthesis_language.clone());
        let voice = request
            .voice
            .or_else(|| self.selected_voice.clone())
            .or_else(|| select_voice(self.voices.voices(), &lang).cloned());
        if voice.is_none() && !self.voices.is_empty() {
            debug!("No voice matches {} - using platform default", lang);
        }

        let id = self.next_utterance_id;
        self.next_utterance_id += 1;

        let utterance = Utterance {
            id,
            text: request.text,
            lang,
            voice,
            pitch: request.pitch.clamp(0.0, 2.0),
            rate: request.rate.clamp(0.1, 10.0),
            volume: request.volume.clamp(0.0, 1.0),
        };

        let spoken = match self.synthesis.as_mut() {
            Some(engine) => engine.speak(&utterance),
            None => Err("synthesis engine missing".to_string()),
        };

        match spoken {
            Ok(()) => {
                debug!("Speaking utterance {} ({} chars)", id, utterance.text.len());
                self.current = Some(ActiveUtterance {
                    id,
                    text: utterance.text,
                    on_end: request.on_end,
                });
                SpeakOutcome::Started(id)
            }
            Err(e) => {
                error!("Speech synthesis failed: {}", e);
                SpeakOutcome::Failed(e)
            }
        }
    }

    /// Stop the utterance in flight; its `on_end` is dropped
    pub fn cancel_speech(&mut self) {
        let Some(current) = self.current.take() else {
            debug!("cancel_speech with nothing in flight");
            return;
        };

        if let Some(engine) = self.synthesis.as_mut() {
            engine.cancel();
        }
        info!("Cancelled utterance {}", current.id);
    }

    pub fn handle_synthesis_event(&mut self, event: SynthesisEvent) {
        if self.disposed {
            debug!("Ignoring synthesis event after dispose: {:?}", event);
            return;
        }

        let id = match &event {
            SynthesisEvent::Start { id } | SynthesisEvent::End { id } | SynthesisEvent::Error { id, .. } => *id,
        };
        if self.current.as_ref().map(|u| u.id) != Some(id) {
            debug!("Ignoring event for stale utterance {}", id);
            return;
        }

        match event {
            SynthesisEvent::Start { .. } => debug!("Utterance {} started", id),
            SynthesisEvent::End { .. } => {
                let finished = self.current.take();
                debug!("Utterance {} finished", id);
                if let Some(on_end) = finished.and_then(|u| u.on_end) {
                    on_end();
                }
            }
            SynthesisEvent::Error { code, .. } => {
                error!("Speech synthesis error on utterance {}: {}", id, code);
                self.current = None;
            }
        }
    }

    pub fn set_synthesis_voice(&mut self, voice: Option<Voice>) {
        match &voice {
            Some(v) => info!("Synthesis voice set to {} ({})", v.name, v.lang),
            None => info!("Synthesis voice cleared - automatic selection"),
        }
        self.selected_voice = voice;
    }

    /// Re-read the platform voice list (voices-changed notification)
    pub fn refresh_voices(&mut self) {
        let Some(engine) = self.synthesis.as_ref() else {
            return;
        };
        let fresh = engine.voices();
        self.voices.merge(fresh, self.selected_voice.as_ref());
    }

    // ---- Teardown ----

    /// Detach every engine callback, abort an open session and cancel speech
    ///
    /// Safe to call any number of times.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Some(engine) = self.recognition.as_mut() {
            engine.detach();
            if self.open_sessions > 0 {
                engine.abort();
            }
        }
        if let Some(engine) = self.synthesis.as_mut() {
            engine.detach();
            engine.cancel();
        }

        self.open_sessions = 0;
        self.current = None;
        self.transition(RecognitionState::Idle);
        info!("Speech controller disposed");
    }
}

impl Drop for SpeechController {
    fn drop(&mut self) {
        self.dispose();
    }
}
