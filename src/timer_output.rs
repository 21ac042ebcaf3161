//! Software frame clock.
//!
//! `TimerOutput` is an [`OutputDevice`] without hardware: it ticks on its own
//! [`Executor`] at the channel's frame rate, which makes it usable as the
//! frame clock of a channel that has no hardware output (tests, headless
//! rendering, network-only channels).
//!
//! Each tick:
//!
//! 1. asks the channel for the next frame through the frame-requested
//!    callback, passing the rational audio demand from [`SampleCounter`];
//! 2. takes the frame out of its single-slot buffer, or synthesizes silence
//!    plus the last picture when nothing was pushed;
//! 3. hands the frame to the optional sink.
//!
//! Tick deadlines are computed from the tick index rather than accumulated,
//! so the cadence does not drift.

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, error, info, trace, warn};

use crate::{
    clock::{ClockBinding, FrameRequestedCallback, SampleCounter},
    device::{ChannelInfo, OutputDevice},
    executor::Executor,
    frames::{AudioFrame, VideoFrame},
    sync_frame::SyncFrame,
    time::{rescale, TIME_BASE},
    Error, Result,
};

/// Receives every frame the timer presents.
pub type FrameSink = Arc<dyn Fn(&SyncFrame) + Send + Sync>;

/// Ticks late by more than this many frame intervals re-anchor the schedule.
const MAX_LATE_FRAMES: i64 = 2;

/// Counters of a [`TimerOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputStats {
    /// Ticks served.
    pub frames_presented: u64,
    /// Frames handed to `push`.
    pub frames_pushed: u64,
    /// Pushed frames overwritten before a tick consumed them.
    pub frames_dropped: u64,
    /// Ticks served without a pushed frame.
    pub frames_synthesized: u64,
}

struct Schedule {
    info: ChannelInfo,
    counter: SampleCounter,
    start: Instant,
    black: Arc<VideoFrame>,
}

struct Shared {
    name: String,
    running: AtomicBool,
    generation: AtomicU64,
    schedule: Mutex<Option<Schedule>>,
    slot: Mutex<Option<SyncFrame>>,
    last_video: Mutex<Option<Arc<VideoFrame>>>,
    clock: ClockBinding,
    sink: Option<FrameSink>,
    presented: AtomicU64,
    pushed: AtomicU64,
    dropped: AtomicU64,
    synthesized: AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Software frame clock output device.
///
/// # Example
///
/// ```
/// use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};
/// use grafton_playout::TimerOutput;
///
/// # fn main() -> Result<(), grafton_playout::Error> {
/// let presented = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&presented);
/// let timer = TimerOutput::builder("clock")
///     .sink(move |_frame| {
///         counter.fetch_add(1, Ordering::Relaxed);
///     })
///     .build()?;
/// // Nothing ticks until the timer is assigned to a channel.
/// assert_eq!(timer.stats().frames_presented, 0);
/// assert_eq!(presented.load(Ordering::Relaxed), 0);
/// # Ok(())
/// # }
/// ```
pub struct TimerOutput {
    shared: Arc<Shared>,
    executor: Arc<Executor>,
}

impl fmt::Debug for TimerOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerOutput")
            .field("name", &self.shared.name)
            .field("running", &self.shared.running.load(Ordering::Acquire))
            .field("stats", &self.stats())
            .finish()
    }
}

impl TimerOutput {
    /// Create a builder for configuring a timer output
    pub fn builder<S: Into<String>>(name: S) -> TimerOutputBuilder {
        TimerOutputBuilder::new(name)
    }

    pub fn stats(&self) -> OutputStats {
        OutputStats {
            frames_presented: self.shared.presented.load(Ordering::Acquire),
            frames_pushed: self.shared.pushed.load(Ordering::Acquire),
            frames_dropped: self.shared.dropped.load(Ordering::Acquire),
            frames_synthesized: self.shared.synthesized.load(Ordering::Acquire),
        }
    }

    fn start(&self, channel: ChannelInfo) -> Result<bool> {
        let shared = Arc::clone(&self.shared);
        let started = self.executor.invoke(move || {
            if shared.running.load(Ordering::Acquire) {
                return None;
            }
            let black = Arc::new(VideoFrame::black(&channel.format, channel.pixel_format));
            // Tick 0 is due now, so the anchor is taken last.
            *lock(&shared.schedule) = Some(Schedule {
                counter: SampleCounter::new(channel.sample_rate, channel.format.frame_rate()),
                black,
                info: channel,
                start: Instant::now(),
            });
            *lock(&shared.slot) = None;
            *lock(&shared.last_video) = None;
            shared.running.store(true, Ordering::Release);
            Some(shared.generation.fetch_add(1, Ordering::AcqRel) + 1)
        })?;

        let Some(generation) = started else {
            debug!(output = %self.shared.name, "timer already running, assignment refused");
            return Ok(false);
        };
        schedule_tick(Arc::clone(&self.shared), Arc::downgrade(&self.executor), generation);
        info!(
            output = %self.shared.name,
            channel = %channel.id,
            frame_rate = %channel.format.frame_rate(),
            "timer output started"
        );
        Ok(true)
    }

    fn stop(&self) {
        let shared = Arc::clone(&self.shared);
        let stop = move || {
            shared.generation.fetch_add(1, Ordering::AcqRel);
            if shared.running.swap(false, Ordering::AcqRel) {
                *lock(&shared.schedule) = None;
                *lock(&shared.slot) = None;
                true
            } else {
                false
            }
        };
        match self.executor.invoke(stop) {
            Ok(true) => info!(output = %self.shared.name, "timer output stopped"),
            Ok(false) => {}
            Err(e) => debug!(output = %self.shared.name, error = %e, "timer stop skipped"),
        }
    }
}

impl Drop for TimerOutput {
    fn drop(&mut self) {
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        self.shared.running.store(false, Ordering::Release);
        self.executor.stop();
    }
}

impl OutputDevice for TimerOutput {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn assign_to_channel(&self, channel: &ChannelInfo) -> Result<bool> {
        self.start(*channel)
    }

    fn release_channel(&self) {
        self.stop();
    }

    fn push(&self, frame: &SyncFrame) -> Result<()> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(Error::OutputNotAttached(self.shared.name.clone()));
        }
        self.shared.pushed.fetch_add(1, Ordering::AcqRel);
        if lock(&self.shared.slot).replace(frame.clone()).is_some() {
            self.shared.dropped.fetch_add(1, Ordering::AcqRel);
            debug!(output = %self.shared.name, time = frame.time(), "frame overwritten before presentation");
        }
        Ok(())
    }

    fn set_frame_requested_callback(
        &self,
        channel: &ChannelInfo,
        callback: Option<FrameRequestedCallback>,
    ) -> Result<()> {
        self.shared.clock.set(&self.shared.name, channel.id, callback)
    }

    fn is_playing(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }
}

fn schedule_tick(shared: Arc<Shared>, executor: Weak<Executor>, generation: u64) {
    let Some(handle) = executor.upgrade() else {
        return;
    };
    let name = shared.name.clone();
    if let Err(e) = handle.begin_invoke(move || run_tick(shared, executor, generation)) {
        debug!(output = %name, error = %e, "timer tick not scheduled");
    }
}

fn run_tick(shared: Arc<Shared>, executor: Weak<Executor>, generation: u64) {
    if !shared.is_current(generation) {
        return;
    }
    let Some(deadline) = shared.next_deadline() else {
        return;
    };
    let now = Instant::now();
    if deadline > now {
        thread::sleep(deadline - now);
    }
    if !shared.is_current(generation) {
        return;
    }
    shared.tick();
    schedule_tick(shared, executor, generation);
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::Acquire) && self.generation.load(Ordering::Acquire) == generation
    }

    fn next_deadline(&self) -> Option<Instant> {
        let mut schedule = lock(&self.schedule);
        let schedule = schedule.as_mut()?;
        let frame_rate = schedule.info.format.frame_rate();
        let offset = |frames: i64| {
            Duration::from_nanos(rescale(frames, 1_000_000_000 * frame_rate.den, frame_rate.num).max(0) as u64)
        };

        let frames = schedule.counter.frames();
        let deadline = schedule.start + offset(frames);
        let now = Instant::now();
        if now > deadline + offset(MAX_LATE_FRAMES) {
            warn!(
                output = %self.name,
                late_ms = (now - deadline).as_millis() as u64,
                "timer fell behind, re-anchoring"
            );
            schedule.start = now.checked_sub(offset(frames)).unwrap_or(now);
            return Some(now);
        }
        Some(deadline)
    }

    fn tick(&self) {
        let Some((samples, info, frames, black)) = lock(&self.schedule).as_ref().map(|s| {
            (
                s.counter.samples_required(),
                s.info,
                s.counter.frames(),
                Arc::clone(&s.black),
            )
        }) else {
            return;
        };

        let callback = self.clock.callback();
        if let Some(callback) = callback {
            trace!(output = %self.name, samples, "frame requested");
            if panic::catch_unwind(AssertUnwindSafe(|| callback(samples))).is_err() {
                error!(output = %self.name, "frame requested callback panicked");
            }
        }

        let frame = match lock(&self.slot).take() {
            Some(frame) => frame,
            None => {
                self.synthesized.fetch_add(1, Ordering::AcqRel);
                let video = lock(&self.last_video).clone().unwrap_or(black);
                let audio = AudioFrame::silence(samples, info.audio_channels, info.sample_rate);
                let frame_rate = info.format.frame_rate();
                let time = rescale(frames, TIME_BASE * frame_rate.den, frame_rate.num);
                SyncFrame::new(Arc::new(audio), video, time)
            }
        };
        *lock(&self.last_video) = Some(Arc::clone(frame.video()));

        if let Some(sink) = &self.sink {
            if panic::catch_unwind(AssertUnwindSafe(|| sink(&frame))).is_err() {
                error!(output = %self.name, "frame sink panicked");
            }
        }

        if let Some(schedule) = lock(&self.schedule).as_mut() {
            schedule.counter.advance(samples);
        }
        self.presented.fetch_add(1, Ordering::AcqRel);
    }
}

/// Builder for configuring a [`TimerOutput`] with ergonomic method chaining
pub struct TimerOutputBuilder {
    name: String,
    sink: Option<FrameSink>,
}

impl fmt::Debug for TimerOutputBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerOutputBuilder")
            .field("name", &self.name)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl TimerOutputBuilder {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            sink: None,
        }
    }

    /// Receive every presented frame on the timer's thread
    #[must_use]
    pub fn sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&SyncFrame) + Send + Sync + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Build the `TimerOutput`
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or the executor thread cannot be spawned.
    pub fn build(self) -> Result<TimerOutput> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "Output name cannot be empty or contain only whitespace".into(),
            ));
        }
        let executor = Executor::new(format!("timer-{}", self.name))?;
        Ok(TimerOutput {
            shared: Arc::new(Shared {
                name: self.name,
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                schedule: Mutex::new(None),
                slot: Mutex::new(None),
                last_video: Mutex::new(None),
                clock: ClockBinding::new(),
                sink: self.sink,
                presented: AtomicU64::new(0),
                pushed: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                synthesized: AtomicU64::new(0),
            }),
            executor: Arc::new(executor),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::ChannelId,
        format::{PixelFormat, VideoFormat, VideoFormatType},
    };
    use std::sync::mpsc;

    fn info() -> ChannelInfo {
        ChannelInfo {
            id: ChannelId::next(),
            format: VideoFormat::new(VideoFormatType::V720p5000),
            pixel_format: PixelFormat::Bgra,
            audio_channels: 2,
            sample_rate: 48000,
        }
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(TimerOutput::builder(" ").build().is_err());
    }

    /// Second assignment is refused while running; release allows a new one
    #[test]
    fn test_assignment_lifecycle() {
        let timer = TimerOutput::builder("t").build().unwrap();
        let info = info();
        assert!(timer.assign_to_channel(&info).unwrap());
        assert!(timer.is_playing());
        assert!(!timer.assign_to_channel(&info).unwrap());
        timer.release_channel();
        timer.release_channel();
        assert!(!timer.is_playing());
        assert!(timer.assign_to_channel(&info).unwrap());
    }

    #[test]
    fn test_push_requires_assignment() {
        let timer = TimerOutput::builder("t").build().unwrap();
        let frame = SyncFrame::new(
            Arc::new(AudioFrame::silence(960, 2, 48000)),
            Arc::new(VideoFrame::default()),
            0,
        );
        assert!(matches!(timer.push(&frame), Err(Error::OutputNotAttached(_))));
    }

    /// Ticks request the rational sample demand and present synthesized frames
    #[test]
    fn test_ticks_request_frames() {
        let (tx, rx) = mpsc::channel();
        let timer = TimerOutput::builder("t").build().unwrap();
        let info = info();
        timer
            .set_frame_requested_callback(
                &info,
                Some(Arc::new(move |samples| {
                    let _ = tx.send(samples);
                })),
            )
            .unwrap();
        timer.assign_to_channel(&info).unwrap();

        for _ in 0..3 {
            let samples = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(samples, 960);
        }
        timer.release_channel();
        assert!(timer.stats().frames_presented >= 2);
        assert!(timer.stats().frames_synthesized >= 2);
    }

    /// A timer clocking one channel refuses to be bound by another
    #[test]
    fn test_clock_binding_exclusive() {
        let timer = TimerOutput::builder("t").build().unwrap();
        let (first, second) = (info(), info());
        let callback: FrameRequestedCallback = Arc::new(|_| {});
        timer
            .set_frame_requested_callback(&first, Some(Arc::clone(&callback)))
            .unwrap();
        assert!(matches!(
            timer.set_frame_requested_callback(&second, Some(Arc::clone(&callback))),
            Err(Error::ClockBoundElsewhere(_))
        ));
        timer.set_frame_requested_callback(&first, None).unwrap();
        timer
            .set_frame_requested_callback(&second, Some(callback))
            .unwrap();
    }

    /// The first interval after assignment is a full frame long
    #[test]
    fn test_first_interval_not_shortened() {
        let (tx, rx) = mpsc::channel();
        let timer = TimerOutput::builder("t")
            .sink(move |_frame| {
                let _ = tx.send(Instant::now());
            })
            .build()
            .unwrap();
        timer.assign_to_channel(&info()).unwrap();

        let ticks: Vec<Instant> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        timer.release_channel();
        // 720p50: 20 ms per frame.
        for pair in ticks.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_millis(15), "gap {gap:?}");
        }
    }

    /// A pushed frame is presented on the next tick; overwritten ones count as dropped
    #[test]
    fn test_single_slot_drops() {
        let (tx, rx) = mpsc::channel();
        let timer = TimerOutput::builder("t")
            .sink(move |frame| {
                let _ = tx.send(frame.time());
            })
            .build()
            .unwrap();
        timer.assign_to_channel(&info()).unwrap();

        let frame = |time| {
            SyncFrame::new(
                Arc::new(AudioFrame::silence(960, 2, 48000)),
                Arc::new(VideoFrame::default()),
                time,
            )
        };
        // Tick 0 fires on assignment; pushing right after it leaves a full
        // interval before the next tick.
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 0);
        timer.push(&frame(1_000_000)).unwrap();
        timer.push(&frame(2_000_000)).unwrap();

        // Skip any synthesized ticks (stamped with their own small times).
        let presented = loop {
            let time = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            if time >= 1_000_000 {
                break time;
            }
        };
        timer.release_channel();
        assert_eq!(presented, 2_000_000);
        assert_eq!(timer.stats().frames_dropped, 1);
        assert_eq!(timer.stats().frames_pushed, 2);
    }
}
