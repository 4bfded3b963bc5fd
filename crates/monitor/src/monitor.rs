use crate::SurfaceReading;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tunerelay_core::{SourceEvent, TrackInfo};

/// Subtitle shown while an ad is about to play; readings carrying it
/// must not disturb stored state or emit anything.
const AD_BREAK_SENTINEL: &str = "Video will play after ad";

/// Recomputed finish timestamps within this band of the stored value
/// are rounding/poll jitter, not a change.
const FINISH_TOLERANCE_SECS: i64 = 2;

#[derive(Debug, Default, Clone)]
struct InfoState {
    title: String,
    subtitle: String,
    finish_timestamp: i64,
}

/// Field-wise comparison with the jitter band on the timestamp.
fn info_differs(a: &InfoState, b: &InfoState) -> bool {
    a.title != b.title
        || a.subtitle != b.subtitle
        || (a.finish_timestamp - b.finish_timestamp).abs() > FINISH_TOLERANCE_SECS
}

/// Outcome of one poll cycle: the events that settled this cycle plus
/// the deadline (if any) at which the pending playing flag settles.
#[derive(Debug)]
pub struct CycleOutcome {
    pub events: Vec<SourceEvent>,
    pub playing_deadline: Option<Instant>,
}

/// Per-source change detection with a two-stage settle filter.
///
/// Info fields settle cycle-wise: a changed value is held as pending
/// and committed (and emitted) only once the same value is observed on
/// the very next cycle; a value that flickers back, or an ad-break
/// reading, drops the pending change while leaving committed state
/// untouched, so a real change is re-detected afterwards. The playing
/// flag settles on a short single-shot deadline instead, restarted on
/// every differing observation, so rapid toggles collapse to one
/// transition.
pub struct SourceMonitor {
    playing_settle: Duration,
    is_playing: bool,
    committed: InfoState,
    pending: Option<InfoState>,
    pending_playing: Option<bool>,
    playing_deadline: Option<Instant>,
    last_emitted: Option<TrackInfo>,
}

impl SourceMonitor {
    pub fn new(playing_settle: Duration) -> Self {
        Self {
            playing_settle,
            is_playing: false,
            committed: InfoState::default(),
            pending: None,
            pending_playing: None,
            playing_deadline: None,
            last_emitted: None,
        }
    }

    /// Run all change checks against a fresh reading. Call once per
    /// poll period.
    pub fn check_cycle(
        &mut self,
        reading: &SurfaceReading,
        now: Instant,
        now_sys: SystemTime,
    ) -> CycleOutcome {
        let mut events = Vec::new();

        self.observe_playing(reading, now);

        if reading.subtitle.as_deref() == Some(AD_BREAK_SENTINEL) {
            // Ad break: defer any half-settled change. Committed state
            // is untouched, so the change is re-detected afterwards.
            self.pending = None;
        } else {
            let candidate = self.candidate(reading, now_sys);
            if !info_differs(&candidate, &self.committed) {
                self.pending = None;
            } else if self
                .pending
                .as_ref()
                .is_some_and(|pending| !info_differs(&candidate, pending))
            {
                // Same changed value on two consecutive cycles: commit
                // and announce.
                self.committed = candidate;
                self.pending = None;
                if let Some(info) = self.settled_update() {
                    events.push(SourceEvent::update(info));
                }
            } else {
                self.pending = Some(candidate);
            }
        }

        CycleOutcome {
            events,
            playing_deadline: self.playing_deadline,
        }
    }

    /// Commit the pending playing flag once its settle deadline has
    /// passed. Returns the transition event, if one settled.
    pub fn settle_playing(&mut self, now: Instant) -> Option<SourceEvent> {
        let deadline = self.playing_deadline?;
        if now < deadline {
            return None;
        }
        let settled = self.pending_playing.take()?;
        self.playing_deadline = None;
        self.is_playing = settled;
        Some(if settled {
            SourceEvent::Playing
        } else {
            SourceEvent::Stopped
        })
    }

    /// Clear all stored info and re-announce current state immediately,
    /// bypassing the settle filter. Used when this source newly becomes
    /// the active one.
    pub fn force_refresh(
        &mut self,
        reading: &SurfaceReading,
        now_sys: SystemTime,
    ) -> Option<SourceEvent> {
        self.committed = InfoState::default();
        self.pending = None;
        self.last_emitted = None;

        if reading.subtitle.as_deref() == Some(AD_BREAK_SENTINEL) {
            return None;
        }

        self.committed = self.candidate(reading, now_sys);
        self.settled_update().map(SourceEvent::update)
    }

    /// Track the raw playing flag; a differing observation (re)starts
    /// the settle deadline, an agreeing one cancels any pending toggle.
    fn observe_playing(&mut self, reading: &SurfaceReading, now: Instant) {
        let Some(observed) = reading.is_playing else {
            return;
        };
        if observed == self.is_playing {
            self.pending_playing = None;
            self.playing_deadline = None;
        } else {
            self.pending_playing = Some(observed);
            self.playing_deadline = Some(now + self.playing_settle);
        }
    }

    /// The reading as a full info candidate; absent fields fall back to
    /// the committed value so they read as "no change".
    fn candidate(&self, reading: &SurfaceReading, now_sys: SystemTime) -> InfoState {
        InfoState {
            title: reading
                .title
                .clone()
                .unwrap_or_else(|| self.committed.title.clone()),
            subtitle: reading
                .subtitle
                .clone()
                .unwrap_or_else(|| self.committed.subtitle.clone()),
            finish_timestamp: recompute_finish(reading, now_sys)
                .unwrap_or(self.committed.finish_timestamp),
        }
    }

    /// Committed info as an emittable update, or `None` when the info
    /// is incomplete or matches what was last emitted.
    fn settled_update(&mut self) -> Option<TrackInfo> {
        let (artist, album) = split_subtitle(&self.committed.subtitle);
        if self.committed.title.is_empty() || artist.is_empty() {
            return None;
        }
        let info = TrackInfo {
            title: self.committed.title.clone(),
            artist,
            album,
            finish_timestamp: self.committed.finish_timestamp,
        };
        if let Some(prev) = &self.last_emitted {
            let same_fields =
                prev.title == info.title && prev.artist == info.artist && prev.album == info.album;
            let within_band =
                (prev.finish_timestamp - info.finish_timestamp).abs() <= FINISH_TOLERANCE_SECS;
            if same_fields && within_band {
                return None;
            }
        }
        self.last_emitted = Some(info.clone());
        Some(info)
    }
}

/// `now_epoch_seconds + (max - value)`, or `None` when the progress
/// fields are unreadable this cycle.
fn recompute_finish(reading: &SurfaceReading, now_sys: SystemTime) -> Option<i64> {
    let value = reading.progress_value?;
    let max = reading.progress_max?;
    let elapsed = now_sys.duration_since(UNIX_EPOCH).ok()?;
    Some(elapsed.as_secs() as i64 + (max - value).round() as i64)
}

/// Split a combined subtitle on "•": part 0 is the artist, part 1 (if
/// present) the album, both trimmed.
fn split_subtitle(subtitle: &str) -> (String, String) {
    let mut parts = subtitle.split('•');
    let artist = parts.next().unwrap_or_default().trim().to_string();
    let album = parts.next().unwrap_or_default().trim().to_string();
    (artist, album)
}

#[cfg(test)]
mod tests {
    use super::{SourceMonitor, AD_BREAK_SENTINEL};
    use crate::SurfaceReading;
    use std::time::{Duration, Instant, SystemTime};
    use tunerelay_core::SourceEvent;

    const EPOCH_BASE: u64 = 1_700_000_000;

    fn settle() -> Duration {
        Duration::from_millis(500)
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(EPOCH_BASE + secs)
    }

    fn reading(title: &str, subtitle: &str) -> SurfaceReading {
        SurfaceReading {
            is_playing: Some(true),
            title: Some(title.to_string()),
            subtitle: Some(subtitle.to_string()),
            progress_value: Some(30.0),
            progress_max: Some(210.0),
        }
    }

    /// Run enough cycles on a fresh monitor to emit the baseline info.
    fn settled_monitor(r: &SurfaceReading, now: Instant) -> SourceMonitor {
        let mut monitor = SourceMonitor::new(settle());
        let first = monitor.check_cycle(r, now, at(0));
        assert!(first.events.is_empty());
        let second = monitor.check_cycle(r, now + Duration::from_secs(2), at(0));
        assert_eq!(second.events.len(), 1);
        monitor
    }

    #[test]
    fn info_settles_after_two_identical_cycles() {
        let now = Instant::now();
        let r = reading("Song A", "Band • Record");
        let mut monitor = SourceMonitor::new(settle());

        let first = monitor.check_cycle(&r, now, at(0));
        assert!(first.events.is_empty(), "change must not emit immediately");

        let second = monitor.check_cycle(&r, now + Duration::from_secs(2), at(0));
        assert_eq!(
            second.events,
            vec![SourceEvent::Update {
                title: "Song A".to_string(),
                artist: "Band".to_string(),
                album: "Record".to_string(),
                finish_timestamp: EPOCH_BASE as i64 + 180,
            }]
        );

        let third = monitor.check_cycle(&r, now + Duration::from_secs(4), at(0));
        assert!(third.events.is_empty(), "settled info must emit exactly once");
    }

    #[test]
    fn flicker_back_to_previous_value_never_emits() {
        let now = Instant::now();
        let base = reading("Song A", "Band • Record");
        let other = reading("Song B", "Band • Record");
        let mut monitor = settled_monitor(&base, now);

        let mut t = now + Duration::from_secs(4);
        let mut events = Vec::new();
        for r in [&other, &base, &base, &base] {
            events.extend(monitor.check_cycle(r, t, at(0)).events);
            t += Duration::from_secs(2);
        }
        assert!(events.is_empty(), "A->B->A flicker emitted {events:?}");
    }

    #[test]
    fn ad_break_reading_never_disturbs_stored_info() {
        let now = Instant::now();
        let base = reading("Song A", "Band • Record");
        let ad = reading("Song A", AD_BREAK_SENTINEL);
        let mut monitor = settled_monitor(&base, now);

        let mut events = Vec::new();
        let mut t = now + Duration::from_secs(4);
        for r in [&ad, &ad, &base, &base] {
            events.extend(monitor.check_cycle(r, t, at(0)).events);
            t += Duration::from_secs(2);
        }
        assert!(
            events.is_empty(),
            "returning to already-announced info re-emitted {events:?}"
        );
    }

    #[test]
    fn ad_break_defers_but_does_not_lose_a_track_change() {
        let now = Instant::now();
        let base = reading("Song A", "Band • Record");
        let changed = reading("Song B", "Band • Record");
        let ad = reading("Song B", AD_BREAK_SENTINEL);
        let mut monitor = settled_monitor(&base, now);

        // The change is seen once, then an ad break interrupts it.
        let mut t = now + Duration::from_secs(4);
        for r in [&changed, &ad] {
            assert!(monitor.check_cycle(r, t, at(0)).events.is_empty());
            t += Duration::from_secs(2);
        }

        // Once the changed value holds after the ad it settles normally
        // and is announced exactly once.
        let mut announced = Vec::new();
        for _ in 0..5 {
            announced.extend(monitor.check_cycle(&changed, t, at(0)).events);
            t += Duration::from_secs(2);
        }
        match announced.as_slice() {
            [SourceEvent::Update { title, .. }] => assert_eq!(title, "Song B"),
            other => panic!("expected exactly one post-ad update, got {other:?}"),
        }
    }

    #[test]
    fn finish_timestamp_tolerance_absorbs_poll_jitter() {
        let now = Instant::now();
        let base = reading("Song A", "Band • Record");
        let mut monitor = settled_monitor(&base, now);

        // Two seconds of wall-clock drift with unchanged progress stays
        // inside the band.
        let drift = monitor.check_cycle(&base, now + Duration::from_secs(4), at(2));
        assert!(drift.events.is_empty());
        let after = monitor.check_cycle(&base, now + Duration::from_secs(6), at(2));
        assert!(after.events.is_empty(), "within-band drift must not settle");

        // A seek well outside the band is a real change.
        let mut seeked = base.clone();
        seeked.progress_value = Some(120.0);
        let first = monitor.check_cycle(&seeked, now + Duration::from_secs(8), at(2));
        assert!(first.events.is_empty());
        let second = monitor.check_cycle(&seeked, now + Duration::from_secs(10), at(2));
        assert_eq!(second.events.len(), 1);
        match &second.events[0] {
            SourceEvent::Update {
                finish_timestamp, ..
            } => assert_eq!(*finish_timestamp, EPOCH_BASE as i64 + 2 + 90),
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn rapid_playing_toggles_collapse_to_one_event() {
        let t0 = Instant::now();
        let mut monitor = SourceMonitor::new(settle());
        let mut playing = reading("Song A", "Band • Record");
        let mut stopped = playing.clone();
        stopped.is_playing = Some(false);
        playing.subtitle = None; // keep info noise out of this test
        playing.title = None;
        stopped.subtitle = None;
        stopped.title = None;

        // Toggles at t=0, 150, 300 ms.
        monitor.check_cycle(&playing, t0, at(0));
        monitor.check_cycle(&stopped, t0 + Duration::from_millis(150), at(0));
        let out = monitor.check_cycle(&playing, t0 + Duration::from_millis(300), at(0));
        assert_eq!(
            out.playing_deadline,
            Some(t0 + Duration::from_millis(800)),
            "each differing observation restarts the settle deadline"
        );

        assert_eq!(monitor.settle_playing(t0 + Duration::from_millis(750)), None);
        assert_eq!(
            monitor.settle_playing(t0 + Duration::from_millis(800)),
            Some(SourceEvent::Playing)
        );
        assert_eq!(
            monitor.settle_playing(t0 + Duration::from_millis(900)),
            None,
            "the transition must emit exactly once"
        );
    }

    #[test]
    fn toggle_back_to_stored_value_cancels_the_pending_transition() {
        let t0 = Instant::now();
        let mut monitor = SourceMonitor::new(settle());
        let mut playing = SurfaceReading::default();
        playing.is_playing = Some(true);
        let mut stopped = SurfaceReading::default();
        stopped.is_playing = Some(false);

        monitor.check_cycle(&playing, t0, at(0));
        let out = monitor.check_cycle(&stopped, t0 + Duration::from_millis(200), at(0));
        assert_eq!(out.playing_deadline, None);
        assert_eq!(monitor.settle_playing(t0 + Duration::from_secs(5)), None);
    }

    #[test]
    fn incomplete_info_is_never_emitted() {
        let now = Instant::now();
        let mut monitor = SourceMonitor::new(settle());
        let r = reading("", "• Record");

        monitor.check_cycle(&r, now, at(0));
        let out = monitor.check_cycle(&r, now + Duration::from_secs(2), at(0));
        assert!(out.events.is_empty());
    }

    #[test]
    fn absent_fields_are_no_change() {
        let now = Instant::now();
        let base = reading("Song A", "Band • Record");
        let mut monitor = settled_monitor(&base, now);

        let blank = SurfaceReading::default();
        let first = monitor.check_cycle(&blank, now + Duration::from_secs(4), at(0));
        let second = monitor.check_cycle(&base, now + Duration::from_secs(6), at(0));
        assert!(first.events.is_empty());
        assert!(second.events.is_empty(), "unreadable cycle must not fake a change");
    }

    #[test]
    fn force_refresh_bypasses_the_settle_filter() {
        let now = Instant::now();
        let base = reading("Song A", "Band • Record");
        let mut monitor = settled_monitor(&base, now);

        // Same values re-announce immediately when forced.
        let forced = monitor.force_refresh(&base, at(0));
        assert!(matches!(forced, Some(SourceEvent::Update { .. })));

        // But a forced refresh during an ad break stays quiet.
        let ad = reading("Song A", AD_BREAK_SENTINEL);
        assert_eq!(monitor.force_refresh(&ad, at(0)), None);
    }
}
