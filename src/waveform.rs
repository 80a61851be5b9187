//! Waveform animator
//!
//! Multi-layer sine wave showing whether the assistant is idle, listening or
//! speaking. `WaveRenderer` draws single frames onto any `Canvas2d` and
//! enforces the frame cap; `WaveAnimator` owns the redraw loop as a tokio task.

use crate::config::AppConfig;
use log::{debug, error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

pub const DEFAULT_WAVE_COLOR: &str = "rgba(139, 92, 246, 0.7)";
pub const DEFAULT_LISTENING_COLOR: &str = "rgba(59, 130, 246, 0.8)";
pub const DEFAULT_SPEAKING_COLOR: &str = "rgba(236, 72, 153, 0.8)";

const ROLE_DESCRIPTION: &str = "AI status indicator";
const LAYER_ALPHA_STEP: f64 = 0.35;
const LAYER_AMPLITUDE_STEP: f64 = 0.3;
const GLOW_BLUR: f64 = 5.0;

static RGBA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"rgba?\((\d+),\s*(\d+),\s*(\d+)(?:,\s*([\d.]+))?\)").expect("valid rgba pattern")
});

/// 2D drawing surface (an HTML canvas or anything shaped like one)
pub trait Canvas2d: Send {
    /// Backing store size in device pixels
    fn set_backing_size(&mut self, width: u32, height: u32);
    /// Displayed size in logical pixels
    fn set_css_size(&mut self, width: f64, height: f64);
    /// Replace the current transform with a uniform scale
    fn set_scale(&mut self, scale: f64);
    fn clear_rect(&mut self, x: f64, y: f64, width: f64, height: f64);
    fn begin_path(&mut self);
    fn set_line_width(&mut self, width: f64);
    fn set_stroke_style(&mut self, style: &str);
    fn set_global_alpha(&mut self, alpha: f64);
    fn set_shadow(&mut self, blur: f64, color: &str);
    fn move_to(&mut self, x: f64, y: f64);
    fn line_to(&mut self, x: f64, y: f64);
    fn stroke(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveState {
    Idle,
    Listening,
    Speaking,
}

impl WaveState {
    /// Speaking wins over listening when both flags are set
    pub fn from_flags(is_listening: bool, is_speaking: bool) -> Self {
        if is_speaking {
            WaveState::Speaking
        } else if is_listening {
            WaveState::Listening
        } else {
            WaveState::Idle
        }
    }

    /// Prose announced through the live region
    pub fn label(self) -> &'static str {
        match self {
            WaveState::Idle => "The AI is idle",
            WaveState::Listening => "The AI is listening",
            WaveState::Speaking => "The AI is speaking",
        }
    }
}

/// Per-state wave shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveParams {
    pub base_amplitude: f64,
    pub frequency: f64,
    pub line_thickness: f64,
    pub layers: usize,
    pub phase_speed: f64,
}

impl WaveParams {
    /// Parameter table; the speaking frequency wobbles with the phase
    pub fn for_state(state: WaveState, phase: f64, amplitude_multiplier: f64) -> Self {
        let (amplitude, frequency, line_thickness, layers, phase_speed) = match state {
            WaveState::Idle => (20.0, 0.02, 2.0, 3, 0.03),
            WaveState::Listening => (35.0, 0.03, 2.5, 4, 0.05),
            WaveState::Speaking => (45.0, 0.025 + (phase * 5.0).sin() * 0.005, 3.0, 2, 0.07),
        };

        Self {
            base_amplitude: amplitude * amplitude_multiplier,
            frequency,
            line_thickness,
            layers,
            phase_speed,
        }
    }
}

/// Stroke settings for one layer
#[derive(Debug, Clone, PartialEq)]
pub struct LayerStroke {
    pub style: String,
    pub global_alpha: f64,
}

/// Fade `color` for layer `layer`
///
/// `rgb()`/`rgba()` colors get their alpha channel scaled; anything else is
/// used verbatim and faded through the global alpha.
pub fn layer_stroke(color: &str, layer: usize) -> LayerStroke {
    let fade = 1.0 - layer as f64 * LAYER_ALPHA_STEP;

    match RGBA_RE.captures(color) {
        Some(caps) => {
            let base_alpha = caps
                .get(4)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(1.0);
            let alpha = (base_alpha * fade).max(0.0);
            LayerStroke {
                style: format!("rgba({}, {}, {}, {:.2})", &caps[1], &caps[2], &caps[3], alpha),
                global_alpha: 1.0,
            }
        }
        None => LayerStroke {
            style: color.to_string(),
            global_alpha: fade.max(0.0),
        },
    }
}

/// Inputs of the waveform component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveProps {
    pub is_listening: bool,
    pub is_speaking: bool,
    pub amplitude_multiplier: f64,
    /// Logical pixels
    pub width: u32,
    /// Logical pixels
    pub height: u32,
    pub wave_color: String,
    pub listening_color: String,
    pub speaking_color: String,
    pub aria_label: String,
    pub show_state: bool,
}

impl Default for WaveProps {
    fn default() -> Self {
        Self {
            is_listening: false,
            is_speaking: false,
            amplitude_multiplier: 1.0,
            width: 600,
            height: 150,
            wave_color: DEFAULT_WAVE_COLOR.to_string(),
            listening_color: DEFAULT_LISTENING_COLOR.to_string(),
            speaking_color: DEFAULT_SPEAKING_COLOR.to_string(),
            aria_label: String::new(),
            show_state: true,
        }
    }
}

impl WaveProps {
    pub fn state(&self) -> WaveState {
        WaveState::from_flags(self.is_listening, self.is_speaking)
    }

    pub fn color(&self) -> &str {
        match self.state() {
            WaveState::Idle => &self.wave_color,
            WaveState::Listening => &self.listening_color,
            WaveState::Speaking => &self.speaking_color,
        }
    }

    pub fn accessibility(&self) -> CanvasAccessibility {
        CanvasAccessibility {
            aria_hidden: self.aria_label.is_empty(),
            aria_label: self.aria_label.clone(),
            role: "img",
            role_description: ROLE_DESCRIPTION,
            live_region: self.show_state.then(|| self.state().label().to_string()),
        }
    }
}

/// Attributes of the canvas element and its polite live region
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasAccessibility {
    pub aria_hidden: bool,
    pub aria_label: String,
    pub role: &'static str,
    pub role_description: &'static str,
    pub live_region: Option<String>,
}

/// Frame pacing of the waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveConfig {
    /// Upper bound on drawn frames per second
    pub max_fps: u32,
    /// Native cadence the animation task offers frames at
    pub refresh_hz: u32,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for WaveConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_fps: config.max_fps,
            refresh_hz: config.refresh_hz,
        }
    }
}

/// Draws capped frames onto one canvas
pub struct WaveRenderer<C: Canvas2d> {
    canvas: C,
    props: WaveProps,
    device_pixel_ratio: f64,
    frame_interval_ms: f64,
    phase: f64,
    last_frame_ms: Option<f64>,
}

impl<C: Canvas2d> WaveRenderer<C> {
    pub fn new(canvas: C, props: WaveProps, device_pixel_ratio: f64, config: &WaveConfig) -> Self {
        let mut renderer = Self {
            canvas,
            props,
            device_pixel_ratio: normalize_dpr(device_pixel_ratio),
            frame_interval_ms: 1000.0 / f64::from(config.max_fps.max(1)),
            phase: 0.0,
            last_frame_ms: None,
        };
        renderer.configure_surface();
        renderer
    }

    /// Apply new inputs; phase and frame clock carry over
    pub fn reconfigure(&mut self, props: WaveProps, device_pixel_ratio: f64) {
        self.props = props;
        self.device_pixel_ratio = normalize_dpr(device_pixel_ratio);
        self.configure_surface();
    }

    fn configure_surface(&mut self) {
        let dpr = self.device_pixel_ratio;
        let width = f64::from(self.props.width);
        let height = f64::from(self.props.height);

        self.canvas
            .set_backing_size((width * dpr).round() as u32, (height * dpr).round() as u32);
        self.canvas.set_css_size(width, height);
        self.canvas.set_scale(dpr);

        debug!(
            "Wave surface {}x{} @{}x ({:?})",
            self.props.width,
            self.props.height,
            dpr,
            self.props.state()
        );
    }

    pub fn props(&self) -> &WaveProps {
        &self.props
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    /// Offer a frame at `timestamp_ms`; returns false when skipped by the cap
    pub fn frame(&mut self, timestamp_ms: f64) -> bool {
        if let Some(last) = self.last_frame_ms {
            if timestamp_ms - last < self.frame_interval_ms {
                return false;
            }
        }
        self.last_frame_ms = Some(timestamp_ms);
        self.draw();
        true
    }

    fn draw(&mut self) {
        let state = self.props.state();
        let params = WaveParams::for_state(state, self.phase, self.props.amplitude_multiplier);
        let color = self.props.color().to_string();
        let width = f64::from(self.props.width);
        let height = f64::from(self.props.height);
        let mid = height / 2.0;

        self.canvas.clear_rect(0.0, 0.0, width, height);

        for layer in 0..params.layers {
            let i = layer as f64;
            let stroke = layer_stroke(&color, layer);
            let amplitude = params.base_amplitude * (1.0 - i * LAYER_AMPLITUDE_STEP);
            let phase_offset = (i * PI) / (params.layers as f64 * 0.8);
            let noise_scale = if layer == 0 { 2.0 } else { 1.0 };

            self.canvas.begin_path();
            self.canvas.set_line_width(params.line_thickness / (i * 0.5 + 1.0));
            self.canvas.set_stroke_style(&stroke.style);
            self.canvas.set_global_alpha(stroke.global_alpha);
            self.canvas
                .set_shadow(if layer == 0 { GLOW_BLUR } else { 0.0 }, &color);

            for px in 0..self.props.width {
                let x = f64::from(px);
                // Idle waves drift a little
                let noise = match state {
                    WaveState::Idle => (self.phase * 1.5 + x * 0.05).sin() * noise_scale,
                    _ => 0.0,
                };
                let y = mid + amplitude * (x * params.frequency + self.phase + phase_offset).sin() + noise;

                if px == 0 {
                    self.canvas.move_to(x, y);
                } else {
                    self.canvas.line_to(x, y);
                }
            }

            self.canvas.stroke();
            self.canvas.set_shadow(0.0, &color);
            self.canvas.set_global_alpha(1.0);
        }

        self.phase += params.phase_speed;
    }
}

fn normalize_dpr(dpr: f64) -> f64 {
    if dpr.is_finite() && dpr > 0.0 {
        dpr
    } else {
        1.0
    }
}

/// Owns the redraw loop of one renderer
///
/// At most one loop is alive: `start` and `reconfigure` abort the previous
/// task before spawning the next one. Dropping the animator stops it.
pub struct WaveAnimator<C: Canvas2d + 'static> {
    renderer: Arc<Mutex<WaveRenderer<C>>>,
    tick: Duration,
    origin: Instant,
    current_task: Option<AbortHandle>,
}

impl<C: Canvas2d + 'static> WaveAnimator<C> {
    /// Frames are offered at `config.refresh_hz`; the renderer applies the cap
    pub fn new(renderer: WaveRenderer<C>, config: &WaveConfig) -> Self {
        Self {
            renderer: Arc::new(Mutex::new(renderer)),
            tick: Duration::from_secs_f64(1.0 / f64::from(config.refresh_hz.max(1))),
            origin: Instant::now(),
            current_task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.current_task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the redraw loop; must be called inside a tokio runtime
    pub fn start(&mut self) {
        self.stop();

        let renderer = Arc::clone(&self.renderer);
        let tick = self.tick;
        let origin = self.origin;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            loop {
                ticker.tick().await;
                let timestamp_ms = origin.elapsed().as_secs_f64() * 1000.0;
                match renderer.lock() {
                    Ok(mut renderer) => {
                        renderer.frame(timestamp_ms);
                    }
                    Err(e) => {
                        error!("Wave renderer lock poisoned: {}", e);
                        break;
                    }
                }
            }
        });

        self.current_task = Some(task.abort_handle());
        info!("Wave animation started");
    }

    /// Swap in new inputs and restart the loop with them
    pub fn reconfigure(&mut self, props: WaveProps, device_pixel_ratio: f64) {
        self.stop();
        match self.renderer.lock() {
            Ok(mut renderer) => renderer.reconfigure(props, device_pixel_ratio),
            Err(e) => {
                error!("Wave renderer lock poisoned: {}", e);
                return;
            }
        }
        self.start();
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.current_task.take() {
            task.abort();
            debug!("Wave animation task aborted");
        }
    }

    /// Run `f` against the renderer (for inspection)
    pub fn with_renderer<R>(&self, f: impl FnOnce(&WaveRenderer<C>) -> R) -> Option<R> {
        self.renderer.lock().ok().map(|renderer| f(&renderer))
    }
}

impl<C: Canvas2d + 'static> Drop for WaveAnimator<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Backing(u32, u32),
        Css(f64, f64),
        Scale(f64),
        Clear,
        BeginPath,
        LineWidth(f64),
        StrokeStyle(String),
        GlobalAlpha(f64),
        Shadow(f64),
        MoveTo(f64, f64),
        LineTo,
        Stroke,
    }

    /// Records drawing calls; clones share the same log
    #[derive(Clone, Default)]
    struct RecordingCanvas {
        ops: Arc<Mutex<Vec<Op>>>,
    }

    impl RecordingCanvas {
        fn ops(&self) -> Vec<Op> {
            self.ops.lock().unwrap().clone()
        }

        fn count(&self, wanted: &Op) -> usize {
            self.ops.lock().unwrap().iter().filter(|op| *op == wanted).count()
        }

        fn push(&mut self, op: Op) {
            self.ops.lock().unwrap().push(op);
        }
    }

    impl Canvas2d for RecordingCanvas {
        fn set_backing_size(&mut self, width: u32, height: u32) {
            self.push(Op::Backing(width, height));
        }
        fn set_css_size(&mut self, width: f64, height: f64) {
            self.push(Op::Css(width, height));
        }
        fn set_scale(&mut self, scale: f64) {
            self.push(Op::Scale(scale));
        }
        fn clear_rect(&mut self, _x: f64, _y: f64, _width: f64, _height: f64) {
            self.push(Op::Clear);
        }
        fn begin_path(&mut self) {
            self.push(Op::BeginPath);
        }
        fn set_line_width(&mut self, width: f64) {
            self.push(Op::LineWidth(width));
        }
        fn set_stroke_style(&mut self, style: &str) {
            self.push(Op::StrokeStyle(style.to_string()));
        }
        fn set_global_alpha(&mut self, alpha: f64) {
            self.push(Op::GlobalAlpha(alpha));
        }
        fn set_shadow(&mut self, blur: f64, _color: &str) {
            self.push(Op::Shadow(blur));
        }
        fn move_to(&mut self, x: f64, y: f64) {
            self.push(Op::MoveTo(x, y));
        }
        fn line_to(&mut self, _x: f64, _y: f64) {
            self.push(Op::LineTo);
        }
        fn stroke(&mut self) {
            self.push(Op::Stroke);
        }
    }

    fn small_props() -> WaveProps {
        WaveProps {
            width: 40,
            height: 20,
            ..WaveProps::default()
        }
    }

    /// Frames drawn when offered at `refresh_hz` for one second
    fn frames_in_one_second(refresh_hz: u32, max_fps: u32) -> usize {
        frames_with_config(&WaveConfig { max_fps, refresh_hz })
    }

    fn frames_with_config(config: &WaveConfig) -> usize {
        let canvas = RecordingCanvas::default();
        let mut renderer = WaveRenderer::new(canvas.clone(), small_props(), 1.0, config);
        let step = 1000.0 / f64::from(config.refresh_hz);

        (0..=config.refresh_hz)
            .filter(|k| renderer.frame(f64::from(*k) * step))
            .count()
    }

    #[test]
    fn test_state_precedence() {
        assert_eq!(WaveState::from_flags(false, false), WaveState::Idle);
        assert_eq!(WaveState::from_flags(true, false), WaveState::Listening);
        assert_eq!(WaveState::from_flags(true, true), WaveState::Speaking);
        assert_eq!(WaveState::from_flags(false, true), WaveState::Speaking);
    }

    #[test]
    fn test_parameter_table() {
        let idle = WaveParams::for_state(WaveState::Idle, 0.0, 1.0);
        assert_eq!((idle.base_amplitude, idle.layers, idle.phase_speed), (20.0, 3, 0.03));

        let listening = WaveParams::for_state(WaveState::Listening, 0.0, 2.0);
        assert_eq!(listening.base_amplitude, 70.0);
        assert_eq!((listening.frequency, listening.line_thickness, listening.layers), (0.03, 2.5, 4));

        let speaking = WaveParams::for_state(WaveState::Speaking, 0.0, 1.0);
        assert_eq!((speaking.base_amplitude, speaking.layers, speaking.phase_speed), (45.0, 2, 0.07));
        assert!((speaking.frequency - 0.025).abs() < 1e-12);

        let wobble = WaveParams::for_state(WaveState::Speaking, PI / 10.0, 1.0);
        assert!((wobble.frequency - 0.030).abs() < 1e-9);
    }

    #[test]
    fn test_layer_alpha_from_color() {
        assert_eq!(layer_stroke(DEFAULT_WAVE_COLOR, 0).style, "rgba(139, 92, 246, 0.70)");
        assert_eq!(layer_stroke(DEFAULT_WAVE_COLOR, 2).style, "rgba(139, 92, 246, 0.21)");
        // Never negative
        assert_eq!(layer_stroke("rgba(1, 2, 3, 0.5)", 3).style, "rgba(1, 2, 3, 0.00)");
        // rgb() counts as fully opaque
        assert_eq!(layer_stroke("rgb(10, 20, 30)", 1).style, "rgba(10, 20, 30, 0.65)");
    }

    #[test]
    fn test_unparsed_color_uses_global_alpha() {
        let stroke = layer_stroke("#ff00aa", 2);
        assert_eq!(stroke.style, "#ff00aa");
        assert!((stroke.global_alpha - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_frame_cap_holds_at_high_refresh_rates() {
        assert!(frames_in_one_second(144, 60) <= 61);
        assert!(frames_in_one_second(240, 60) <= 61);
        assert!(frames_in_one_second(240, 30) <= 31);
        // Slower display: every offered frame is drawn
        assert_eq!(frames_in_one_second(30, 60), 31);
    }

    #[test]
    fn test_wave_config_follows_app_config() {
        assert_eq!(WaveConfig::default(), WaveConfig { max_fps: 60, refresh_hz: 60 });

        let app = AppConfig {
            max_fps: 30,
            refresh_hz: 240,
            ..AppConfig::default()
        };
        let config = WaveConfig::from(&app);
        assert_eq!(config, WaveConfig { max_fps: 30, refresh_hz: 240 });
        assert!(frames_with_config(&config) <= 31);
    }

    #[test]
    fn test_device_pixel_ratio() {
        let canvas = RecordingCanvas::default();
        let config = WaveConfig::default();
        let renderer = WaveRenderer::new(canvas.clone(), WaveProps::default(), 2.0, &config);

        assert_eq!(
            canvas.ops(),
            vec![Op::Backing(1200, 300), Op::Css(600.0, 150.0), Op::Scale(2.0)]
        );
        assert_eq!(renderer.props().width, 600);

        let canvas = RecordingCanvas::default();
        WaveRenderer::new(canvas.clone(), small_props(), f64::NAN, &config);
        assert_eq!(canvas.ops()[0], Op::Backing(40, 20));
    }

    #[test]
    fn test_frame_draws_layers_and_advances_phase() {
        let canvas = RecordingCanvas::default();
        let props = WaveProps {
            is_listening: true,
            ..small_props()
        };
        let mut renderer = WaveRenderer::new(canvas.clone(), props, 1.0, &WaveConfig::default());

        assert!(renderer.frame(0.0));

        assert_eq!(canvas.count(&Op::Clear), 1);
        assert_eq!(canvas.count(&Op::Stroke), 4);
        assert_eq!(canvas.count(&Op::LineTo), 4 * 39);
        assert_eq!(canvas.count(&Op::Shadow(GLOW_BLUR)), 1);
        assert_eq!(canvas.count(&Op::LineWidth(2.5)), 1);
        assert_eq!(canvas.count(&Op::StrokeStyle("rgba(59, 130, 246, 0.80)".to_string())), 1);
        // First listening layer starts on the midline: no idle noise, sin(0) = 0
        assert!(canvas.ops().contains(&Op::MoveTo(0.0, 10.0)));
        assert!((renderer.phase() - 0.05).abs() < 1e-12);

        // Too soon for the next frame
        assert!(!renderer.frame(5.0));
        assert_eq!(canvas.count(&Op::Clear), 1);
    }

    #[test]
    fn test_accessibility_attributes() {
        let attrs = WaveProps::default().accessibility();
        assert!(attrs.aria_hidden);
        assert_eq!(attrs.role, "img");
        assert_eq!(attrs.role_description, "AI status indicator");
        assert_eq!(attrs.live_region.as_deref(), Some("The AI is idle"));

        let props = WaveProps {
            is_listening: true,
            is_speaking: true,
            aria_label: "Assistant".to_string(),
            show_state: true,
            ..WaveProps::default()
        };
        let attrs = props.accessibility();
        assert!(!attrs.aria_hidden);
        assert_eq!(attrs.live_region.as_deref(), Some("The AI is speaking"));

        let hidden = WaveProps {
            show_state: false,
            ..WaveProps::default()
        };
        assert!(hidden.accessibility().live_region.is_none());
    }

    #[tokio::test]
    async fn test_animator_stops_drawing_after_stop() {
        let canvas = RecordingCanvas::default();
        let animated = WaveConfig { max_fps: 60, refresh_hz: 120 };
        let renderer = WaveRenderer::new(canvas.clone(), small_props(), 1.0, &animated);
        let mut animator = WaveAnimator::new(renderer, &animated);

        animator.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(animator.is_running());

        animator.stop();
        assert!(!animator.is_running());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let drawn = canvas.count(&Op::Clear);
        assert!(drawn >= 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(canvas.count(&Op::Clear), drawn);
    }

    #[tokio::test]
    async fn test_reconfigure_replaces_the_loop() {
        let canvas = RecordingCanvas::default();
        let animated = WaveConfig { max_fps: 60, refresh_hz: 120 };
        let renderer = WaveRenderer::new(canvas.clone(), small_props(), 1.0, &animated);
        let mut animator = WaveAnimator::new(renderer, &animated);

        animator.start();
        animator.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let speaking = WaveProps {
            is_speaking: true,
            ..small_props()
        };
        animator.reconfigure(speaking, 1.0);
        assert!(animator.is_running());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let speaking_style = "rgba(236, 72, 153, 0.80)".to_string();
        assert!(canvas.count(&Op::StrokeStyle(speaking_style)) >= 1);
        assert_eq!(
            animator.with_renderer(|r| r.props().state()),
            Some(WaveState::Speaking)
        );

        drop(animator);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let drawn = canvas.count(&Op::Clear);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(canvas.count(&Op::Clear), drawn);
    }
}
