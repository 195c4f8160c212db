//! Coalescing spectral scheduler.
//!
//! Ingestion can arrive in rapid bursts, far faster than three FFTs can
//! run. The scheduler absorbs that with a single-slot mailbox and an
//! explicit state machine:
//!
//! ```text
//!                submit             submit
//!   ┌──────┐ ──────────▶ ┌─────────┐ ──────▶ ┌────────────────────┐
//!   │ Idle │             │ Running │         │ RunningWithPending │
//!   └──────┘ ◀────────── └─────────┘ ◀────── └────────────────────┘
//!            round done,            round done,
//!            mailbox empty          mailbox taken
//! ```
//!
//! Every `submit` overwrites the mailbox with the freshest histogram
//! snapshot, so at most one round is in flight and at most one more will
//! run, and that extra round always sees the latest state. Published
//! spectra therefore converge to the final histogram state once
//! ingestion quiesces, and no backlog of stale rounds can build up.
//!
//! A failed round (worker death, response timeout) is abandoned: the
//! error is logged, a counter increments, previously published spectra
//! stay, and ingestion is unaffected.

use crate::engine::fft::{FftPool, FftPoolError, FftRequest};
use crate::engine::histograms::HistogramSet;
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// Upper bound on waiting for a single FFT response.
const ROUND_TIMEOUT: Duration = Duration::from_secs(10);

/// Magnitude spectra of the three histograms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumSet {
    pub consecutive: Vec<f32>,
    pub all_pairs: Vec<f32>,
    pub wrapped: Vec<f32>,
}

impl SpectrumSet {
    /// Zero-filled spectra of the given length.
    pub fn zeroed(len: usize) -> Self {
        Self {
            consecutive: vec![0.0; len],
            all_pairs: vec![0.0; len],
            wrapped: vec![0.0; len],
        }
    }
}

/// One round's input: f32 copies of the three histograms, detached from
/// engine state so the round races nothing.
#[derive(Debug, Clone)]
pub struct RoundInput {
    pub consecutive: Vec<f32>,
    pub all_pairs: Vec<f32>,
    pub wrapped: Vec<f32>,
}

impl RoundInput {
    pub fn from_histograms(set: &HistogramSet) -> Self {
        fn samples(hist: &[u64]) -> Vec<f32> {
            hist.iter().map(|&c| c as f32).collect()
        }
        Self {
            consecutive: samples(set.consecutive()),
            all_pairs: samples(set.all_pairs()),
            wrapped: samples(set.wrapped()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    RunningWithPending,
}

struct EngineInner {
    state: RunState,
    pending: Option<RoundInput>,
}

struct EngineShared {
    inner: Mutex<EngineInner>,
    idle: Condvar,
    spectra: RwLock<SpectrumSet>,
    completed_rounds: AtomicU64,
    failed_rounds: AtomicU64,
    stale_responses: AtomicU64,
}

impl EngineShared {
    fn lock_inner(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the scheduler thread and the FFT pool behind it.
pub struct SpectralEngine {
    shared: Arc<EngineShared>,
    wake_tx: Option<Sender<()>>,
    scheduler: Option<JoinHandle<()>>,
}

impl SpectralEngine {
    /// Start the scheduler with zeroed spectra of `spectrum_len`.
    pub fn new(spectrum_len: usize) -> Self {
        let shared = Arc::new(EngineShared {
            inner: Mutex::new(EngineInner {
                state: RunState::Idle,
                pending: None,
            }),
            idle: Condvar::new(),
            spectra: RwLock::new(SpectrumSet::zeroed(spectrum_len)),
            completed_rounds: AtomicU64::new(0),
            failed_rounds: AtomicU64::new(0),
            stale_responses: AtomicU64::new(0),
        });

        // Bounded to 1 so bursts of submissions collapse into one token.
        let (wake_tx, wake_rx) = bounded::<()>(1);
        let pool = FftPool::new();
        let loop_shared = Arc::clone(&shared);
        let scheduler = thread::spawn(move || scheduler_loop(loop_shared, wake_rx, pool));

        Self {
            shared,
            wake_tx: Some(wake_tx),
            scheduler: Some(scheduler),
        }
    }

    /// Queue a round over the given snapshot, replacing any snapshot that
    /// has not been picked up yet.
    pub fn submit(&self, input: RoundInput) {
        {
            let mut inner = self.shared.lock_inner();
            inner.pending = Some(input);
            inner.state = match inner.state {
                RunState::Idle => RunState::Running,
                _ => RunState::RunningWithPending,
            };
        }
        if let Some(tx) = &self.wake_tx {
            let _ = tx.try_send(());
        }
    }

    /// Drop queued work and publish zeroed spectra of the new length.
    ///
    /// A round already in flight is not retracted; whatever it publishes
    /// is overwritten by the next submission's rounds.
    pub fn reset(&self, spectrum_len: usize) {
        {
            let mut inner = self.shared.lock_inner();
            inner.pending = None;
            if inner.state == RunState::RunningWithPending {
                inner.state = RunState::Running;
            }
        }
        let mut spectra = self
            .shared
            .spectra
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *spectra = SpectrumSet::zeroed(spectrum_len);
    }

    /// Copy of the most recently published spectra.
    pub fn spectra(&self) -> SpectrumSet {
        self.shared
            .spectra
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True from the first queued round until the scheduler runs out of
    /// work.
    pub fn calculating(&self) -> bool {
        self.shared.lock_inner().state != RunState::Idle
    }

    /// Block until the scheduler is idle. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.lock_inner();
        while inner.state != RunState::Idle {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .shared
                .idle
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
        }
        true
    }

    /// Rounds that published spectra.
    pub fn completed_rounds(&self) -> u64 {
        self.shared.completed_rounds.load(Ordering::Relaxed)
    }

    /// Rounds abandoned on worker failure or timeout.
    pub fn failed_rounds(&self) -> u64 {
        self.shared.failed_rounds.load(Ordering::Relaxed)
    }

    /// Responses that arrived for keys no round was waiting on.
    pub fn stale_responses(&self) -> u64 {
        self.shared.stale_responses.load(Ordering::Relaxed)
    }
}

impl Drop for SpectralEngine {
    fn drop(&mut self) {
        // Closing the wake channel lets the scheduler drain queued work
        // and exit; the pool joins its workers when the scheduler drops it.
        self.wake_tx.take();
        if let Some(handle) = self.scheduler.take() {
            let _ = handle.join();
        }
    }
}

fn scheduler_loop(shared: Arc<EngineShared>, wake_rx: Receiver<()>, pool: FftPool) {
    // Correlation keys are handed out by this thread alone, so a plain
    // counter makes collisions structurally impossible.
    let mut next_key: u64 = 0;

    while wake_rx.recv().is_ok() {
        loop {
            let input = {
                let mut inner = shared.lock_inner();
                match inner.pending.take() {
                    Some(input) => {
                        // Taking the snapshot absorbs the pending marker.
                        inner.state = RunState::Running;
                        input
                    }
                    None => {
                        inner.state = RunState::Idle;
                        shared.idle.notify_all();
                        break;
                    }
                }
            };

            match run_round(&pool, input, &mut next_key, &shared.stale_responses) {
                Ok(set) => {
                    let mut spectra = shared
                        .spectra
                        .write()
                        .unwrap_or_else(PoisonError::into_inner);
                    *spectra = set;
                    drop(spectra);
                    shared.completed_rounds.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    shared.failed_rounds.fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "FFT round abandoned; keeping previous spectra");
                }
            }
        }
    }
}

/// Run one full round: three submissions, three responses matched by key,
/// complex output folded to magnitudes.
fn run_round(
    pool: &FftPool,
    input: RoundInput,
    next_key: &mut u64,
    stale: &AtomicU64,
) -> Result<SpectrumSet, FftPoolError> {
    let inputs = [input.consecutive, input.all_pairs, input.wrapped];
    let mut keys = [0u64; 3];
    for (i, samples) in inputs.into_iter().enumerate() {
        let key = *next_key;
        *next_key += 1;
        keys[i] = key;
        pool.submit(FftRequest { key, samples })?;
    }

    let mut set = SpectrumSet::default();
    let mut received = [false; 3];
    while received.iter().any(|done| !done) {
        let response = pool.recv_timeout(ROUND_TIMEOUT)?;
        match keys.iter().position(|&k| k == response.key) {
            Some(i) if !received[i] => {
                let mags = magnitudes(&response.output);
                match i {
                    0 => set.consecutive = mags,
                    1 => set.all_pairs = mags,
                    _ => set.wrapped = mags,
                }
                received[i] = true;
            }
            _ => {
                // Leftover from an abandoned round; keys are never reused,
                // so it cannot be confused with this round's work.
                stale.fetch_add(1, Ordering::Relaxed);
                warn!(key = response.key, "dropping FFT response with unknown key");
            }
        }
    }
    Ok(set)
}

/// Fold interleaved re/im pairs into a magnitude spectrum.
fn magnitudes(interleaved: &[f32]) -> Vec<f32> {
    interleaved
        .chunks_exact(2)
        .map(|pair| pair[0].hypot(pair[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse_input(len: usize) -> RoundInput {
        let mut consecutive = vec![0.0f32; len];
        consecutive[0] = 1.0;
        RoundInput {
            consecutive,
            all_pairs: vec![0.0; len],
            wrapped: vec![0.0; len],
        }
    }

    #[test]
    fn test_zero_input_publishes_zero_spectra() {
        let engine = SpectralEngine::new(5);
        engine.submit(RoundInput {
            consecutive: vec![0.0; 9],
            all_pairs: vec![0.0; 9],
            wrapped: vec![0.0; 9],
        });
        assert!(engine.wait_idle(Duration::from_secs(5)));

        let spectra = engine.spectra();
        assert_eq!(spectra.consecutive, vec![0.0; 5]);
        assert_eq!(spectra.all_pairs, vec![0.0; 5]);
        assert_eq!(spectra.wrapped, vec![0.0; 5]);
        assert_eq!(engine.completed_rounds(), 1);
        assert_eq!(engine.failed_rounds(), 0);
    }

    #[test]
    fn test_impulse_gives_flat_spectrum() {
        let engine = SpectralEngine::new(32);
        engine.submit(impulse_input(64));
        assert!(engine.wait_idle(Duration::from_secs(5)));

        let spectra = engine.spectra();
        assert_eq!(spectra.consecutive.len(), 32);
        for m in &spectra.consecutive {
            assert!((m - 1.0).abs() < 1e-5);
        }
        for m in &spectra.all_pairs {
            assert!(*m < 1e-5);
        }
    }

    #[test]
    fn test_burst_converges_to_latest_submission() {
        let engine = SpectralEngine::new(32);
        // An impulse immediately overwritten by silence: whichever rounds
        // actually run, the final spectra must reflect the silence.
        engine.submit(impulse_input(64));
        engine.submit(RoundInput {
            consecutive: vec![0.0; 64],
            all_pairs: vec![0.0; 64],
            wrapped: vec![0.0; 64],
        });
        assert!(engine.wait_idle(Duration::from_secs(5)));

        let spectra = engine.spectra();
        assert_eq!(spectra.consecutive, vec![0.0; 32]);
        let rounds = engine.completed_rounds();
        assert!((1..=2).contains(&rounds), "unexpected round count {rounds}");
    }

    #[test]
    fn test_reset_publishes_zeroed_spectra() {
        let engine = SpectralEngine::new(32);
        engine.submit(impulse_input(64));
        assert!(engine.wait_idle(Duration::from_secs(5)));
        assert!(engine.spectra().consecutive.iter().any(|&m| m != 0.0));

        engine.reset(8);
        let spectra = engine.spectra();
        assert_eq!(spectra.consecutive, vec![0.0; 8]);
        assert_eq!(spectra.wrapped, vec![0.0; 8]);
    }

    #[test]
    fn test_idle_engine_reports_not_calculating() {
        let engine = SpectralEngine::new(4);
        assert!(!engine.calculating());
        assert!(engine.wait_idle(Duration::from_millis(10)));
    }

    #[test]
    fn test_magnitudes_hypot() {
        let mags = magnitudes(&[3.0, 4.0, 0.0, 0.0, -1.0, 0.0]);
        assert_eq!(mags, vec![5.0, 0.0, 1.0]);
    }
}
