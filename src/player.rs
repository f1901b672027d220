//! Custom transport controls layered over an embedded third-party player.
//!
//! The embedded widget runs chromeless (see [`embed_url`]); everything the
//! user can do goes through [`PlayerController`]. The widget reports state and
//! quality changes as [`PlayerEvent`]s but never pushes its position, so the
//! controller polls it every [`POLL_INTERVAL`] while playing.

use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::playback::PlaybackReader;

/// Played when nothing has been selected yet.
pub const DEFAULT_VIDEO_ID: &str = "M7lc1UVf-VE";
/// Acceptable qualities, best first.
pub const QUALITY_PREFERENCE: [&str; 3] = ["highres", "hd1080", "hd720"];
pub const PLAYBACK_RATES: [f64; 4] = [0.5, 1.0, 1.5, 2.0];
pub const SKIP_SECONDS: f64 = 10.0;
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

const EMBED_BASE: &str = "https://www.youtube.com/embed/";

/// Embed URL with the native controls, related videos and branding hidden.
pub fn embed_url(video_id: &str) -> String {
    format!("{EMBED_BASE}{video_id}?controls=0&rel=0&modestbranding=1")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Unstarted,
    Playing,
    Paused,
    Buffering,
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Ready,
    StateChange(PlayerStatus),
    QualityChange(String),
}

/// Commands the embedded widget understands.
pub trait EmbeddedPlayer {
    fn load(&mut self, video_id: &str);
    fn play(&mut self);
    fn pause(&mut self);
    fn current_time(&self) -> f64;
    fn duration(&self) -> f64;
    fn seek_to(&mut self, seconds: f64);
    fn set_playback_rate(&mut self, rate: f64);
    fn playback_quality(&self) -> String;
    fn available_quality_levels(&self) -> Vec<String>;
    fn set_playback_quality(&mut self, quality: &str);
    fn set_fullscreen(&mut self, fullscreen: bool);

    /// Events raised since the last call. Hosts that deliver events through
    /// [`PlayerController::handle_event`] directly can keep the default.
    fn drain_events(&mut self) -> Vec<PlayerEvent> {
        Vec::new()
    }
}

/// Quality to switch to, or `None` when `current` is already acceptable or
/// nothing acceptable is offered.
pub fn pick_quality(current: &str, available: &[String]) -> Option<&'static str> {
    if QUALITY_PREFERENCE.contains(&current) {
        return None;
    }
    QUALITY_PREFERENCE
        .into_iter()
        .find(|quality| available.iter().any(|level| level.as_str() == *quality))
}

/// `m:ss`; non-finite input renders as `0:00`.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "0:00".to_string();
    }
    let total = seconds.max(0.0).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

/// Note-taking stub. Saving and reporting only log.
#[derive(Debug, Default)]
pub struct NoteDraft {
    open: bool,
    text: String,
}

impl NoteDraft {
    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn save(&mut self) {
        info!(note = %self.text, "saved note");
        self.close();
    }

    pub fn report(&mut self) {
        info!(note = %self.text, "complaint for note");
        self.close();
    }
}

pub struct PlayerController<P> {
    player: P,
    playback: PlaybackReader,
    loaded: Option<String>,
    ready: bool,
    playing: bool,
    current_time: f64,
    duration: f64,
    rate: f64,
    fullscreen: bool,
    last_poll: Option<Instant>,
    note: NoteDraft,
}

impl<P: EmbeddedPlayer> PlayerController<P> {
    pub fn new(player: P, playback: PlaybackReader) -> Self {
        Self {
            player,
            playback,
            loaded: None,
            ready: false,
            playing: false,
            current_time: 0.0,
            duration: 0.0,
            rate: 1.0,
            fullscreen: false,
            last_poll: None,
            note: NoteDraft::default(),
        }
    }

    /// Loads the first published id (or the default video) if it is not the
    /// one already loaded. Returns the id that is loaded afterwards.
    pub fn sync_source(&mut self) -> &str {
        let wanted = self
            .playback
            .current()
            .unwrap_or_else(|| DEFAULT_VIDEO_ID.to_string());
        if self.loaded.as_deref() != Some(wanted.as_str()) {
            debug!(video = %wanted, "loading video");
            self.player.load(&wanted);
            self.ready = false;
            self.playing = false;
            self.current_time = 0.0;
            self.duration = 0.0;
            self.last_poll = None;
            self.loaded = Some(wanted);
        }
        self.loaded.as_deref().unwrap_or(DEFAULT_VIDEO_ID)
    }

    pub fn handle_event(&mut self, event: PlayerEvent, now: Instant) {
        match event {
            PlayerEvent::Ready => {
                self.ready = true;
                self.duration = finite_or_zero(self.player.duration());
                self.enforce_quality();
            }
            PlayerEvent::StateChange(PlayerStatus::Playing) => {
                self.playing = true;
                self.last_poll = Some(now);
            }
            PlayerEvent::StateChange(PlayerStatus::Paused | PlayerStatus::Ended) => {
                self.playing = false;
                self.last_poll = None;
            }
            PlayerEvent::StateChange(_) => {}
            PlayerEvent::QualityChange(quality) => {
                debug!(%quality, "player changed quality");
                self.enforce_quality();
            }
        }
    }

    /// Delivers pending widget events and refreshes the position when a poll
    /// is due. Returns `true` if the position was polled.
    pub fn tick(&mut self, now: Instant) -> bool {
        for event in self.player.drain_events() {
            self.handle_event(event, now);
        }
        match self.last_poll {
            Some(last) if now.duration_since(last) >= POLL_INTERVAL => {
                self.current_time = finite_or_zero(self.player.current_time());
                self.last_poll = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Raises the quality back to an acceptable level. The widget may drop
    /// it again while buffering, so this runs on every quality change.
    pub fn enforce_quality(&mut self) {
        let current = self.player.playback_quality();
        let levels = self.player.available_quality_levels();
        if let Some(target) = pick_quality(&current, &levels) {
            info!(from = %current, to = target, "raising playback quality");
            self.player.set_playback_quality(target);
        }
    }

    pub fn toggle_play(&mut self) {
        if !self.ready {
            return;
        }
        if self.playing {
            self.player.pause();
        } else {
            self.player.play();
        }
    }

    /// Seeks by `offset` seconds, clamped to `[0, duration]`.
    pub fn seek_relative(&mut self, offset: f64) {
        if !self.ready {
            return;
        }
        let now = finite_or_zero(self.player.current_time());
        let target = (now + offset).clamp(0.0, self.duration);
        self.player.seek_to(target);
        self.current_time = target;
    }

    pub fn skip_forward(&mut self) {
        self.seek_relative(SKIP_SECONDS);
    }

    pub fn skip_back(&mut self) {
        self.seek_relative(-SKIP_SECONDS);
    }

    /// Scrub to `percent` of the duration.
    pub fn seek_percent(&mut self, percent: f64) {
        if !self.ready || !percent.is_finite() {
            return;
        }
        let target = percent.clamp(0.0, 100.0) / 100.0 * self.duration;
        self.player.seek_to(target);
        self.current_time = target;
    }

    pub fn set_rate(&mut self, rate: f64) -> Result<()> {
        if !PLAYBACK_RATES.contains(&rate) {
            bail!("unsupported playback rate {rate}; choose one of {PLAYBACK_RATES:?}");
        }
        if !self.ready {
            return Ok(());
        }
        self.player.set_playback_rate(rate);
        self.rate = rate;
        Ok(())
    }

    pub fn toggle_fullscreen(&mut self) {
        self.fullscreen = !self.fullscreen;
        self.player.set_fullscreen(self.fullscreen);
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Scrub bar position, 0 when the duration is unknown.
    pub fn progress_percent(&self) -> f64 {
        if self.duration > 0.0 {
            self.current_time / self.duration * 100.0
        } else {
            0.0
        }
    }

    pub fn time_label(&self) -> String {
        format!(
            "{} / {}",
            format_time(self.current_time),
            format_time(self.duration)
        )
    }

    pub fn note(&mut self) -> &mut NoteDraft {
        &mut self.note
    }

    pub fn player(&self) -> &P {
        &self.player
    }
}

/// Stand-in widget for terminals: keeps a clock instead of decoding video.
pub struct SimulatedPlayer {
    video_id: Option<String>,
    duration: f64,
    position: f64,
    playing_since: Option<Instant>,
    rate: f64,
    quality: String,
    levels: Vec<String>,
    fullscreen: bool,
    events: Vec<PlayerEvent>,
}

impl SimulatedPlayer {
    /// Every loaded video lasts `duration` seconds and starts in `large`.
    pub fn new(duration: f64) -> Self {
        Self {
            video_id: None,
            duration: finite_or_zero(duration),
            position: 0.0,
            playing_since: None,
            rate: 1.0,
            quality: "large".to_string(),
            levels: ["hd1080", "hd720", "large", "medium"]
                .map(str::to_string)
                .to_vec(),
            fullscreen: false,
            events: Vec::new(),
        }
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn position_at(&self, now: Instant) -> f64 {
        let elapsed = self
            .playing_since
            .map(|since| now.duration_since(since).as_secs_f64() * self.rate)
            .unwrap_or(0.0);
        (self.position + elapsed).min(self.duration)
    }

    // Folds the running clock into `position`.
    fn settle(&mut self) {
        let now = Instant::now();
        self.position = self.position_at(now);
        if self.playing_since.is_some() {
            self.playing_since = Some(now);
        }
    }
}

impl EmbeddedPlayer for SimulatedPlayer {
    fn load(&mut self, video_id: &str) {
        self.video_id = Some(video_id.to_string());
        self.position = 0.0;
        self.playing_since = None;
        self.quality = "large".to_string();
        self.events.push(PlayerEvent::Ready);
    }

    fn play(&mut self) {
        if self.playing_since.is_none() {
            self.playing_since = Some(Instant::now());
            self.events
                .push(PlayerEvent::StateChange(PlayerStatus::Playing));
        }
    }

    fn pause(&mut self) {
        if self.playing_since.is_some() {
            self.settle();
            self.playing_since = None;
            self.events
                .push(PlayerEvent::StateChange(PlayerStatus::Paused));
        }
    }

    fn current_time(&self) -> f64 {
        self.position_at(Instant::now())
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn seek_to(&mut self, seconds: f64) {
        self.settle();
        self.position = seconds.clamp(0.0, self.duration);
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.settle();
        self.rate = rate;
    }

    fn playback_quality(&self) -> String {
        self.quality.clone()
    }

    fn available_quality_levels(&self) -> Vec<String> {
        self.levels.clone()
    }

    fn set_playback_quality(&mut self, quality: &str) {
        if self.quality != quality {
            self.quality = quality.to_string();
            self.events
                .push(PlayerEvent::QualityChange(quality.to_string()));
        }
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        self.fullscreen = fullscreen;
    }

    fn drain_events(&mut self) -> Vec<PlayerEvent> {
        if self.playing_since.is_some() && self.current_time() >= self.duration {
            self.settle();
            self.playing_since = None;
            self.events.push(PlayerEvent::StateChange(PlayerStatus::Ended));
        }
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::playback_state;

    /// Scripted widget that records every command.
    #[derive(Default)]
    struct FakePlayer {
        loaded: Vec<String>,
        time: f64,
        duration: f64,
        quality: String,
        levels: Vec<String>,
        quality_requests: Vec<String>,
        seeks: Vec<f64>,
        rates: Vec<f64>,
        plays: usize,
        pauses: usize,
        fullscreen: Option<bool>,
    }

    impl EmbeddedPlayer for FakePlayer {
        fn load(&mut self, video_id: &str) {
            self.loaded.push(video_id.to_string());
        }
        fn play(&mut self) {
            self.plays += 1;
        }
        fn pause(&mut self) {
            self.pauses += 1;
        }
        fn current_time(&self) -> f64 {
            self.time
        }
        fn duration(&self) -> f64 {
            self.duration
        }
        fn seek_to(&mut self, seconds: f64) {
            self.seeks.push(seconds);
            self.time = seconds;
        }
        fn set_playback_rate(&mut self, rate: f64) {
            self.rates.push(rate);
        }
        fn playback_quality(&self) -> String {
            self.quality.clone()
        }
        fn available_quality_levels(&self) -> Vec<String> {
            self.levels.clone()
        }
        fn set_playback_quality(&mut self, quality: &str) {
            self.quality_requests.push(quality.to_string());
        }
        fn set_fullscreen(&mut self, fullscreen: bool) {
            self.fullscreen = Some(fullscreen);
        }
    }

    fn levels(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn ready_controller(player: FakePlayer) -> PlayerController<FakePlayer> {
        let (_writer, reader) = playback_state();
        let mut controller = PlayerController::new(player, reader);
        controller.sync_source();
        controller.handle_event(PlayerEvent::Ready, Instant::now());
        controller
    }

    #[test]
    fn low_quality_is_raised_to_hd720() {
        let player = FakePlayer {
            quality: "large".into(),
            levels: levels(&["hd720", "large"]),
            ..FakePlayer::default()
        };
        let controller = ready_controller(player);
        assert_eq!(controller.player().quality_requests, vec!["hd720".to_string()]);
    }

    #[test]
    fn pick_quality_prefers_the_best_available() {
        assert_eq!(
            pick_quality("medium", &levels(&["hd720", "hd1080", "large"])),
            Some("hd1080")
        );
        assert_eq!(pick_quality("hd720", &levels(&["hd1080"])), None);
        assert_eq!(pick_quality("small", &levels(&["large", "medium"])), None);
    }

    #[test]
    fn quality_is_rechecked_on_every_change() {
        let player = FakePlayer {
            quality: "hd1080".into(),
            levels: levels(&["hd1080", "large"]),
            ..FakePlayer::default()
        };
        let mut controller = ready_controller(player);
        assert!(controller.player().quality_requests.is_empty());

        controller.player.quality = "large".into();
        controller.handle_event(PlayerEvent::QualityChange("large".into()), Instant::now());
        assert_eq!(controller.player().quality_requests, vec!["hd1080".to_string()]);
    }

    #[test]
    fn loads_default_then_published_video() {
        let (writer, reader) = playback_state();
        let mut controller = PlayerController::new(FakePlayer::default(), reader);
        assert_eq!(controller.sync_source(), DEFAULT_VIDEO_ID);

        writer.set_video_ids(vec!["abc".into(), "def".into()]);
        assert_eq!(controller.sync_source(), "abc");
        controller.sync_source();
        assert_eq!(
            controller.player().loaded,
            vec![DEFAULT_VIDEO_ID.to_string(), "abc".to_string()]
        );
    }

    #[test]
    fn relative_seek_is_clamped() {
        let player = FakePlayer {
            time: 5.0,
            duration: 100.0,
            ..FakePlayer::default()
        };
        let mut controller = ready_controller(player);

        controller.skip_back();
        assert_eq!(controller.current_time(), 0.0);

        controller.player.time = 95.0;
        controller.skip_forward();
        assert_eq!(controller.current_time(), 100.0);

        controller.player.time = 40.0;
        controller.skip_forward();
        assert_eq!(controller.player().seeks, vec![0.0, 100.0, 50.0]);
    }

    #[test]
    fn scrub_seeks_to_a_share_of_the_duration() {
        let player = FakePlayer {
            duration: 200.0,
            ..FakePlayer::default()
        };
        let mut controller = ready_controller(player);
        controller.seek_percent(25.0);
        assert_eq!(controller.current_time(), 50.0);
        assert_eq!(controller.progress_percent(), 25.0);
        assert_eq!(controller.time_label(), "0:50 / 3:20");
    }

    #[test]
    fn controls_are_inert_before_ready() {
        let (_writer, reader) = playback_state();
        let mut controller = PlayerController::new(FakePlayer::default(), reader);
        controller.sync_source();
        controller.toggle_play();
        controller.skip_forward();
        controller.seek_percent(50.0);
        assert_eq!(controller.player().plays, 0);
        assert!(controller.player().seeks.is_empty());
    }

    #[test]
    fn toggle_follows_reported_state() {
        let mut controller = ready_controller(FakePlayer::default());
        controller.toggle_play();
        assert_eq!(controller.player().plays, 1);

        controller.handle_event(
            PlayerEvent::StateChange(PlayerStatus::Playing),
            Instant::now(),
        );
        controller.toggle_play();
        assert_eq!(controller.player().pauses, 1);
    }

    #[test]
    fn position_is_polled_only_while_playing() {
        let player = FakePlayer {
            time: 12.0,
            duration: 60.0,
            ..FakePlayer::default()
        };
        let mut controller = ready_controller(player);
        let start = Instant::now();

        assert!(!controller.tick(start + Duration::from_secs(1)));

        controller.handle_event(PlayerEvent::StateChange(PlayerStatus::Playing), start);
        assert!(!controller.tick(start + Duration::from_millis(200)));
        assert!(controller.tick(start + POLL_INTERVAL));
        assert_eq!(controller.current_time(), 12.0);

        controller.handle_event(
            PlayerEvent::StateChange(PlayerStatus::Ended),
            start + POLL_INTERVAL,
        );
        assert!(!controller.tick(start + Duration::from_secs(5)));
        assert!(!controller.is_playing());
    }

    #[test]
    fn only_listed_rates_are_accepted() {
        let mut controller = ready_controller(FakePlayer::default());
        controller.set_rate(1.5).unwrap();
        assert_eq!(controller.rate(), 1.5);
        assert!(controller.set_rate(3.0).is_err());
        assert_eq!(controller.player().rates, vec![1.5]);
    }

    #[test]
    fn fullscreen_toggles() {
        let mut controller = ready_controller(FakePlayer::default());
        controller.toggle_fullscreen();
        assert!(controller.is_fullscreen());
        assert_eq!(controller.player().fullscreen, Some(true));
        controller.toggle_fullscreen();
        assert_eq!(controller.player().fullscreen, Some(false));
    }

    #[test]
    fn note_stub_closes_after_save_or_report() {
        let mut controller = ready_controller(FakePlayer::default());
        controller.note().open();
        controller.note().set_text("check question 3");
        assert!(controller.note().is_open());
        controller.note().save();
        assert!(!controller.note().is_open());
        assert_eq!(controller.note().text(), "check question 3");

        controller.note().open();
        controller.note().report();
        assert!(!controller.note().is_open());
    }

    #[test]
    fn time_formatting() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(65.9), "1:05");
        assert_eq!(format_time(f64::NAN), "0:00");
        assert_eq!(format_time(f64::INFINITY), "0:00");
    }

    #[test]
    fn embed_url_hides_native_chrome() {
        assert_eq!(
            embed_url("abc"),
            "https://www.youtube.com/embed/abc?controls=0&rel=0&modestbranding=1"
        );
    }

    #[test]
    fn simulated_player_reports_ready_and_gets_upgraded() {
        let (_writer, reader) = playback_state();
        let mut controller = PlayerController::new(SimulatedPlayer::new(90.0), reader);
        controller.sync_source();
        controller.tick(Instant::now());

        assert_eq!(controller.duration(), 90.0);
        assert_eq!(controller.player().playback_quality(), "hd1080");
        assert_eq!(controller.player().video_id(), Some(DEFAULT_VIDEO_ID));

        controller.toggle_play();
        controller.tick(Instant::now());
        assert!(controller.is_playing());
        controller.toggle_play();
        controller.tick(Instant::now());
        assert!(!controller.is_playing());
    }
}
