//! Monitoring service orchestration
//!
//! Owns the session lifecycle: `Idle -> Running -> Idle`. `start()` launches
//! one probe clock per enabled cadence; every tick feeds its outcome through
//! the outage tracker (ping only) into the session recorder. `stop()` cancels
//! the clocks, waits for in-flight probes, truncates any open outage interval
//! and returns the finalized snapshot for the caller to persist.
//!
//! Stale in-flight probes are fenced twice: the generation token handed to
//! each clock is compared against the service's current generation before a
//! result is recorded, and the recorder itself rejects writes after finalize.

use crate::clock::ProbeClock;
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::outage::{OutageEvent, OutageTracker};
use crate::probe::{Pinger, SpeedTester};
use crate::recorder::SessionRecorder;
use crate::sample::{OutageInterval, PingSample, SessionSnapshot, SpeedSample};
use chrono::Utc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Pushed to subscribers as the session progresses. Derived, not
/// authoritative; the recorder is the source of truth.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    SessionStarted { session_id: String },
    PingRecorded(PingSample),
    SpeedRecorded(SpeedSample),
    OutageStarted(OutageInterval),
    OutageEnded(OutageInterval),
    SessionEnded { session_id: String },
}

enum State {
    Idle,
    Running(Running),
}

struct Running {
    recorder: Arc<SessionRecorder>,
    tracker: Arc<Mutex<OutageTracker>>,
    live: Arc<LiveStats>,
    ping_clock: ProbeClock,
    speed_clock: Option<ProbeClock>,
}

#[derive(Default)]
struct LiveStats {
    current_ping: Mutex<Option<PingSample>>,
    last_speed: Mutex<Option<SpeedSample>>,
    interruptions: AtomicU32,
}

pub struct MonitoringService {
    pinger: Arc<dyn Pinger>,
    speed_tester: Arc<dyn SpeedTester>,
    state: Mutex<State>,
    /// Current generation; bumped on every start and stop so results from a
    /// previous session never match.
    generation: Arc<AtomicU64>,
    events: broadcast::Sender<MonitorEvent>,
}

impl MonitoringService {
    pub fn new(pinger: Arc<dyn Pinger>, speed_tester: Arc<dyn SpeedTester>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            pinger,
            speed_tester,
            state: Mutex::new(State::Idle),
            generation: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    fn state_locked(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tracker_locked(tracker: &Mutex<OutageTracker>) -> MutexGuard<'_, OutageTracker> {
        tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to session events. Safe to call at any time; receivers that
    /// lag simply miss events.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Begin a new monitoring session. Returns the session id.
    pub fn start(&self, config: MonitorConfig) -> Result<String, MonitorError> {
        config.validate()?;

        let mut state = self.state_locked();
        if matches!(*state, State::Running(_)) {
            return Err(MonitorError::AlreadyRunning);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Utc::now();
        let recorder = Arc::new(SessionRecorder::new(config.clone(), started_at));
        let session_id = recorder.session_id();
        let tracker = Arc::new(Mutex::new(OutageTracker::new(config.outage_threshold)));
        let live = Arc::new(LiveStats::default());

        let ping_clock = self.spawn_ping_clock(&config, generation, &recorder, &tracker, &live);
        let speed_clock = config
            .speed_enabled
            .then(|| self.spawn_speed_clock(&config, generation, &recorder, &live));

        *state = State::Running(Running {
            recorder,
            tracker,
            live,
            ping_clock,
            speed_clock,
        });
        drop(state);

        info!(
            %session_id,
            target = %config.target_host,
            speed_enabled = config.speed_enabled,
            "monitoring started"
        );
        let _ = self.events.send(MonitorEvent::SessionStarted {
            session_id: session_id.clone(),
        });
        Ok(session_id)
    }

    fn spawn_ping_clock(
        &self,
        config: &MonitorConfig,
        generation: u64,
        recorder: &Arc<SessionRecorder>,
        tracker: &Arc<Mutex<OutageTracker>>,
        live: &Arc<LiveStats>,
    ) -> ProbeClock {
        let pinger = Arc::clone(&self.pinger);
        let recorder = Arc::clone(recorder);
        let tracker = Arc::clone(tracker);
        let live = Arc::clone(live);
        let gate = Arc::clone(&self.generation);
        let events = self.events.clone();
        let host = config.target_host.clone();
        let timeout = config.ping_timeout();

        ProbeClock::spawn(config.ping_interval(), generation, move |token| {
            let pinger = Arc::clone(&pinger);
            let recorder = Arc::clone(&recorder);
            let tracker = Arc::clone(&tracker);
            let live = Arc::clone(&live);
            let gate = Arc::clone(&gate);
            let events = events.clone();
            let host = host.clone();
            async move {
                let sample = pinger.probe(&host, timeout).await;
                if gate.load(Ordering::SeqCst) != token {
                    debug!("discarding ping result from a stopped session");
                    return;
                }

                let outage_event = Self::tracker_locked(&tracker).observe(&sample);

                match recorder.record_ping(sample.clone()) {
                    Ok(()) => {
                        *live.current_ping.lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(sample.clone());
                        let _ = events.send(MonitorEvent::PingRecorded(sample));
                    }
                    Err(MonitorError::SessionClosed) => {
                        warn!("ping sample arrived after finalize, dropped");
                        return;
                    }
                    Err(e) => {
                        warn!("failed to record ping sample: {e}");
                        return;
                    }
                }

                if let Some(event) = outage_event {
                    match &event {
                        OutageEvent::Started(interval) => {
                            live.interruptions.fetch_add(1, Ordering::SeqCst);
                            warn!(
                                failures = interval.failure_count,
                                "connection outage detected"
                            );
                            let _ = events.send(MonitorEvent::OutageStarted(interval.clone()));
                        }
                        OutageEvent::Ended(interval) => {
                            info!(
                                duration_s = interval.duration_s().unwrap_or(0.0),
                                "connection outage ended"
                            );
                            let _ = events.send(MonitorEvent::OutageEnded(interval.clone()));
                        }
                    }
                    if let Err(e) = recorder.record_outage_event(event) {
                        warn!("failed to record outage event: {e}");
                    }
                }
            }
        })
    }

    fn spawn_speed_clock(
        &self,
        config: &MonitorConfig,
        generation: u64,
        recorder: &Arc<SessionRecorder>,
        live: &Arc<LiveStats>,
    ) -> ProbeClock {
        let tester = Arc::clone(&self.speed_tester);
        let recorder = Arc::clone(recorder);
        let live = Arc::clone(live);
        let gate = Arc::clone(&self.generation);
        let events = self.events.clone();
        let endpoint = config.speed_endpoint.clone();
        let direction = config.speed_direction;
        let size_hint = config.speed_size_hint;

        ProbeClock::spawn(config.speed_interval(), generation, move |token| {
            let tester = Arc::clone(&tester);
            let recorder = Arc::clone(&recorder);
            let live = Arc::clone(&live);
            let gate = Arc::clone(&gate);
            let events = events.clone();
            let endpoint = endpoint.clone();
            async move {
                let sample = tester.probe(&endpoint, direction, size_hint).await;
                if gate.load(Ordering::SeqCst) != token {
                    debug!("discarding speed result from a stopped session");
                    return;
                }
                match recorder.record_speed(sample.clone()) {
                    Ok(()) => {
                        *live.last_speed.lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(sample.clone());
                        let _ = events.send(MonitorEvent::SpeedRecorded(sample));
                    }
                    Err(MonitorError::SessionClosed) => {
                        warn!("speed sample arrived after finalize, dropped");
                    }
                    Err(e) => warn!("failed to record speed sample: {e}"),
                }
            }
        })
    }

    /// End the active session and return its terminal snapshot.
    pub async fn stop(&self) -> Result<SessionSnapshot, MonitorError> {
        let running = {
            let mut state = self.state_locked();
            match std::mem::replace(&mut *state, State::Idle) {
                State::Idle => return Err(MonitorError::NotRunning),
                State::Running(running) => running,
            }
        };

        // Invalidate the generation first: any probe in flight at this point
        // is stale and its result will be discarded at the gate.
        self.generation.fetch_add(1, Ordering::SeqCst);

        running.ping_clock.join().await;
        if let Some(clock) = running.speed_clock {
            clock.join().await;
        }

        let ended_at = Utc::now();
        if let Some(event) = Self::tracker_locked(&running.tracker).close_at_session_end(ended_at) {
            if let OutageEvent::Ended(interval) = &event {
                let _ = self.events.send(MonitorEvent::OutageEnded(interval.clone()));
            }
            if let Err(e) = running.recorder.record_outage_event(event) {
                warn!("failed to record final outage event: {e}");
            }
        }

        let snapshot = running.recorder.finalize(ended_at)?;
        info!(
            session_id = %snapshot.session_id,
            pings = snapshot.ping_samples.len(),
            speeds = snapshot.speed_samples.len(),
            outages = snapshot.outage_intervals.len(),
            "monitoring stopped"
        );
        let _ = self.events.send(MonitorEvent::SessionEnded {
            session_id: snapshot.session_id.clone(),
        });
        Ok(snapshot)
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state_locked(), State::Running(_))
    }

    /// Most recent ping outcome of the active session, if any.
    pub fn current_ping(&self) -> Option<PingSample> {
        match &*self.state_locked() {
            State::Running(r) => r
                .live
                .current_ping
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            State::Idle => None,
        }
    }

    /// Most recent speed outcome of the active session, if any.
    pub fn last_speed(&self) -> Option<SpeedSample> {
        match &*self.state_locked() {
            State::Running(r) => r
                .live
                .last_speed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            State::Idle => None,
        }
    }

    /// Outages opened so far in the active session; 0 when idle.
    pub fn interruption_count(&self) -> u32 {
        match &*self.state_locked() {
            State::Running(r) => r.live.interruptions.load(Ordering::SeqCst),
            State::Idle => 0,
        }
    }

    /// Point-in-time copy of the active session, None when idle.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        match &*self.state_locked() {
            State::Running(r) => Some(r.recorder.snapshot()),
            State::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Direction;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Pinger stub with scripted outcomes and a controllable delay.
    struct ScriptedPinger {
        outcomes: Mutex<VecDeque<bool>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedPinger {
        fn new(outcomes: &[bool], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.iter().copied().collect()),
                delay,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Pinger for ScriptedPinger {
        async fn probe(&self, _host: &str, _timeout: Duration) -> PingSample {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let success = self.outcomes.lock().unwrap().pop_front().unwrap_or(true);
            if success {
                PingSample::ok(Utc::now(), 10.0)
            } else {
                PingSample::failed(Utc::now())
            }
        }
    }

    struct StubSpeedTester {
        calls: AtomicUsize,
    }

    impl StubSpeedTester {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SpeedTester for StubSpeedTester {
        async fn probe(
            &self,
            _endpoint: &str,
            direction: Direction,
            size_hint: u64,
        ) -> SpeedSample {
            self.calls.fetch_add(1, Ordering::SeqCst);
            SpeedSample::ok(Utc::now(), direction, size_hint, 1.0)
        }
    }

    fn test_config(speed_enabled: bool) -> MonitorConfig {
        MonitorConfig {
            target_host: "192.0.2.1".to_string(),
            ping_interval_s: 0.6,
            ping_timeout_s: 0.25,
            speed_interval_s: 10.0,
            outage_threshold: 2,
            speed_enabled,
            ..MonitorConfig::default()
        }
    }

    fn service(
        pinger: Arc<ScriptedPinger>,
        tester: Arc<StubSpeedTester>,
    ) -> MonitoringService {
        MonitoringService::new(pinger, tester)
    }

    #[tokio::test]
    async fn start_while_running_is_rejected() {
        let svc = service(
            ScriptedPinger::new(&[], Duration::ZERO),
            StubSpeedTester::new(),
        );
        svc.start(test_config(false)).expect("first start");
        assert!(matches!(
            svc.start(test_config(false)),
            Err(MonitorError::AlreadyRunning)
        ));
        svc.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn stop_twice_yields_not_running() {
        let svc = service(
            ScriptedPinger::new(&[], Duration::ZERO),
            StubSpeedTester::new(),
        );
        assert!(matches!(svc.stop().await, Err(MonitorError::NotRunning)));

        svc.start(test_config(false)).expect("start");
        let snapshot = svc.stop().await.expect("first stop");
        assert!(snapshot.ended_at.is_some());
        assert!(matches!(svc.stop().await, Err(MonitorError::NotRunning)));
        assert!(!svc.is_running());
    }

    #[tokio::test]
    async fn immediate_stop_yields_empty_snapshot() {
        // The fire-on-start probe is still in flight when stop() runs, so its
        // result is discarded at the generation gate.
        let pinger = ScriptedPinger::new(&[], Duration::from_millis(300));
        let svc = service(Arc::clone(&pinger), StubSpeedTester::new());

        svc.start(test_config(false)).expect("start");
        let snapshot = svc.stop().await.expect("stop");

        assert_eq!(snapshot.ping_samples.len(), 0);
        assert_eq!(snapshot.speed_samples.len(), 0);
        assert!(snapshot.ended_at.expect("finalized") >= snapshot.started_at);
    }

    #[tokio::test]
    async fn speed_disabled_never_starts_the_speed_clock() {
        let tester = StubSpeedTester::new();
        let svc = service(
            ScriptedPinger::new(&[], Duration::ZERO),
            Arc::clone(&tester),
        );

        svc.start(test_config(false)).expect("start");
        tokio::time::sleep(Duration::from_millis(700)).await;
        let snapshot = svc.stop().await.expect("stop");

        assert!(snapshot.speed_samples.is_empty());
        assert_eq!(tester.calls(), 0);
        assert!(!snapshot.ping_samples.is_empty());
    }

    #[tokio::test]
    async fn speed_enabled_records_the_initial_sample() {
        let tester = StubSpeedTester::new();
        let svc = service(
            ScriptedPinger::new(&[], Duration::ZERO),
            Arc::clone(&tester),
        );

        svc.start(test_config(true)).expect("start");
        tokio::time::sleep(Duration::from_millis(200)).await;
        let snapshot = svc.stop().await.expect("stop");

        // speed clock fires on start, cadence is 10s so exactly one sample
        assert_eq!(snapshot.speed_samples.len(), 1);
        assert_eq!(tester.calls(), 1);
        assert!(snapshot.speed_samples[0].success);
    }

    #[tokio::test]
    async fn failure_streak_is_truncated_at_stop() {
        // threshold 2, all failures: interval opens on the second tick and
        // stays open until stop truncates it.
        let pinger = ScriptedPinger::new(&[false, false, false, false], Duration::ZERO);
        let svc = service(Arc::clone(&pinger), StubSpeedTester::new());

        svc.start(test_config(false)).expect("start");
        tokio::time::sleep(Duration::from_millis(1400)).await;
        assert_eq!(svc.interruption_count(), 1);
        let snapshot = svc.stop().await.expect("stop");

        assert_eq!(snapshot.outage_intervals.len(), 1);
        let interval = &snapshot.outage_intervals[0];
        assert!(interval.end.is_some(), "open interval must be truncated");
        assert!(interval.failure_count >= 2);
        assert!(interval.end.expect("closed") <= snapshot.ended_at.expect("finalized"));
    }

    #[tokio::test]
    async fn outage_closes_on_recovery() {
        let pinger = ScriptedPinger::new(&[false, false, true, true], Duration::ZERO);
        let svc = service(Arc::clone(&pinger), StubSpeedTester::new());
        let mut events = svc.subscribe();

        svc.start(test_config(false)).expect("start");
        tokio::time::sleep(Duration::from_millis(2000)).await;
        let snapshot = svc.stop().await.expect("stop");

        assert_eq!(snapshot.outage_intervals.len(), 1);
        let interval = &snapshot.outage_intervals[0];
        assert_eq!(interval.failure_count, 2);
        assert!(interval.end.is_some());

        let mut saw_started = false;
        let mut saw_ended = false;
        while let Ok(event) = events.try_recv() {
            match event {
                MonitorEvent::OutageStarted(_) => saw_started = true,
                MonitorEvent::OutageEnded(_) => saw_ended = true,
                _ => {}
            }
        }
        assert!(saw_started && saw_ended);
    }

    #[tokio::test]
    async fn snapshots_keep_both_streams_ordered() {
        let svc = service(
            ScriptedPinger::new(&[], Duration::ZERO),
            StubSpeedTester::new(),
        );
        svc.start(test_config(true)).expect("start");
        tokio::time::sleep(Duration::from_millis(1400)).await;
        let live = svc.snapshot().expect("running");
        let snapshot = svc.stop().await.expect("stop");

        for samples in [&live.ping_samples, &snapshot.ping_samples] {
            for pair in samples.windows(2) {
                assert!(pair[0].timestamp <= pair[1].timestamp);
            }
        }
        assert!(snapshot.ping_samples.len() >= live.ping_samples.len());
    }

    #[tokio::test]
    async fn live_accessors_reflect_the_running_session() {
        let svc = service(
            ScriptedPinger::new(&[], Duration::ZERO),
            StubSpeedTester::new(),
        );
        assert!(svc.current_ping().is_none());
        assert_eq!(svc.interruption_count(), 0);

        svc.start(test_config(true)).expect("start");
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(svc.current_ping().is_some());
        assert!(svc.last_speed().is_some());

        svc.stop().await.expect("stop");
        assert!(svc.current_ping().is_none());
        assert!(svc.last_speed().is_none());
    }

    #[tokio::test]
    async fn restart_begins_a_fresh_session() {
        let pinger = ScriptedPinger::new(&[], Duration::ZERO);
        let svc = service(Arc::clone(&pinger), StubSpeedTester::new());

        svc.start(test_config(false)).expect("start");
        tokio::time::sleep(Duration::from_millis(700)).await;
        let first = svc.stop().await.expect("stop");
        assert!(!first.ping_samples.is_empty());
        let calls_after_first = pinger.calls();

        svc.start(test_config(false)).expect("restart");
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = svc.stop().await.expect("stop");

        assert!(second.started_at >= first.ended_at.expect("finalized"));
        assert!(second.ping_samples.len() <= pinger.calls() - calls_after_first + 1);
    }
}
