//! FFT worker pool.
//!
//! Histograms are transformed on dedicated worker threads so ingestion
//! never blocks on spectral math. Requests and responses travel over
//! channels; no histogram memory is shared with the workers. Each request
//! carries a correlation key, and responses come back on one shared
//! channel in completion order, so a submitter matches them up by key.
//!
//! The response payload is the non-redundant half of the transform of a
//! real-valued input, as interleaved re/im pairs: `output[2k]` and
//! `output[2k + 1]` are the real and imaginary parts of frequency bin `k`.

use crossbeam_channel::{unbounded, Receiver, Sender};
use rustfft::{num_complex::Complex32, FftPlanner};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One worker per histogram keeps a full round in flight at once.
pub const FFT_WORKERS: usize = 3;

/// A transform request. `key` correlates the eventual response.
#[derive(Debug, Clone)]
pub struct FftRequest {
    pub key: u64,
    pub samples: Vec<f32>,
}

/// A completed transform: interleaved re/im pairs for the first
/// `(n + 1) / 2` frequency bins of an `n`-sample input.
#[derive(Debug, Clone)]
pub struct FftResponse {
    pub key: u64,
    pub output: Vec<f32>,
}

/// Errors surfaced by the pool transport.
#[derive(Debug)]
pub enum FftPoolError {
    /// All workers have stopped; the pool is unusable.
    Disconnected,
    /// No response arrived within the allowed time.
    Timeout,
}

impl std::fmt::Display for FftPoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FftPoolError::Disconnected => write!(f, "FFT workers disconnected"),
            FftPoolError::Timeout => write!(f, "timed out waiting for FFT response"),
        }
    }
}

impl std::error::Error for FftPoolError {}

/// A fixed set of FFT worker threads fed over a shared request channel.
pub struct FftPool {
    request_tx: Option<Sender<FftRequest>>,
    response_rx: Receiver<FftResponse>,
    workers: Vec<JoinHandle<()>>,
}

impl FftPool {
    /// Spawn the default worker set.
    pub fn new() -> Self {
        Self::with_workers(FFT_WORKERS)
    }

    /// Spawn `count` workers.
    pub fn with_workers(count: usize) -> Self {
        let (request_tx, request_rx) = unbounded::<FftRequest>();
        let (response_tx, response_rx) = unbounded::<FftResponse>();

        let workers = (0..count)
            .map(|_| {
                let rx = request_rx.clone();
                let tx = response_tx.clone();
                thread::spawn(move || worker_loop(rx, tx))
            })
            .collect();

        // The workers hold the only response senders, so the response
        // channel disconnects if every worker exits.
        Self {
            request_tx: Some(request_tx),
            response_rx,
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a transform request.
    pub fn submit(&self, request: FftRequest) -> Result<(), FftPoolError> {
        match &self.request_tx {
            Some(tx) => tx.send(request).map_err(|_| FftPoolError::Disconnected),
            None => Err(FftPoolError::Disconnected),
        }
    }

    /// Wait for the next response, whichever request it answers.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<FftResponse, FftPoolError> {
        self.response_rx.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => FftPoolError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => FftPoolError::Disconnected,
        })
    }
}

impl Default for FftPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FftPool {
    fn drop(&mut self) {
        // Closing the request channel lets the workers drain and exit.
        self.request_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(requests: Receiver<FftRequest>, responses: Sender<FftResponse>) {
    let mut planner = FftPlanner::<f32>::new();
    for request in requests.iter() {
        let output = transform(&mut planner, &request.samples);
        if responses
            .send(FftResponse {
                key: request.key,
                output,
            })
            .is_err()
        {
            break;
        }
    }
}

/// Forward FFT of a real signal, truncated to the non-redundant half and
/// interleaved re/im.
fn transform(planner: &mut FftPlanner<f32>, samples: &[f32]) -> Vec<f32> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }

    let fft = planner.plan_fft_forward(n);
    let mut buffer: Vec<Complex32> = samples.iter().map(|&re| Complex32::new(re, 0.0)).collect();
    fft.process(&mut buffer);

    let keep = (n + 1) / 2;
    let mut output = Vec::with_capacity(keep * 2);
    for bin in &buffer[..keep] {
        output.push(bin.re);
        output.push(bin.im);
    }
    output
}
