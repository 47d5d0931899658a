use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use hound::WavReader;
use parking_lot::Mutex;
use tracing::{info, warn};

use super::wake::WakeSignal;

/// Midpoint of the 12-bit unsigned conversion range.
pub const ADC_MIDPOINT: i32 = 2048;

/// Result of one non-blocking read from the acquisition side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// `n` samples were written to the front of the caller's buffer
    Ready(usize),
    /// Nothing is ready yet
    Timeout,
}

/// Stream of signed 16-bit PCM chunks consumed by the pipeline worker.
pub trait ChunkSource: Send {
    /// Copy at most `out.len()` samples of the next chunk into `out`.
    fn read_chunk(&mut self, out: &mut [i16]) -> ReadStatus;

    /// Conversion frames the hardware had to drop because nobody drained them.
    fn overflow_count(&self) -> u64;

    fn sample_rate(&self) -> u32;

    /// Stop producing chunks. Called once when the pipeline exits.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Register-level acquisition driver producing raw 12-bit conversions.
///
/// Implementations call [`WakeSignal::notify`] from their completion callback
/// and nothing else; all conversion work happens on the pipeline worker.
pub trait AcquisitionDriver: Send {
    fn start(&mut self, wake: Arc<WakeSignal>) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Copy at most `out.len()` raw conversions into `out`.
    fn read_raw(&mut self, out: &mut [u16]) -> ReadStatus;

    fn overflow_count(&self) -> u64;

    fn sample_rate(&self) -> u32;

    /// Driver name for logging
    fn name(&self) -> &str;
}

/// Convert one 12-bit unsigned conversion (centred on 2048) to 16-bit PCM.
#[inline]
pub fn convert_adc_word(raw: u16) -> i16 {
    ((i32::from(raw & 0x0FFF) - ADC_MIDPOINT) << 4) as i16
}

/// Inverse of [`convert_adc_word`], dropping the four low bits.
#[inline]
pub fn pcm_to_adc_word(sample: i16) -> u16 {
    ((i32::from(sample) >> 4) + ADC_MIDPOINT).clamp(0, 0x0FFF) as u16
}

/// Adapts a raw acquisition driver into a [`ChunkSource`].
pub struct AdcSource<D: AcquisitionDriver> {
    driver: D,
    raw: Vec<u16>,
}

impl<D: AcquisitionDriver> AdcSource<D> {
    pub fn new(driver: D, max_chunk_samples: usize) -> Self {
        Self {
            driver,
            raw: vec![0u16; max_chunk_samples],
        }
    }

    pub fn start(&mut self, wake: Arc<WakeSignal>) -> Result<()> {
        info!(
            "Starting acquisition: {} @ {} Hz",
            self.driver.name(),
            self.driver.sample_rate()
        );
        self.driver.start(wake)
    }
}

impl<D: AcquisitionDriver> ChunkSource for AdcSource<D> {
    fn read_chunk(&mut self, out: &mut [i16]) -> ReadStatus {
        let limit = out.len().min(self.raw.len());
        match self.driver.read_raw(&mut self.raw[..limit]) {
            ReadStatus::Ready(n) => {
                for (dst, &raw) in out.iter_mut().zip(&self.raw[..n]) {
                    *dst = convert_adc_word(raw);
                }
                ReadStatus::Ready(n)
            }
            ReadStatus::Timeout => ReadStatus::Timeout,
        }
    }

    fn overflow_count(&self) -> u64 {
        self.driver.overflow_count()
    }

    fn sample_rate(&self) -> u32 {
        self.driver.sample_rate()
    }

    fn stop(&mut self) -> Result<()> {
        info!("Stopping acquisition: {}", self.driver.name());
        self.driver.stop()
    }
}

/// Pre-built chunks handed out in order; used for replaying captured audio
/// and for deterministic pipeline tests.
#[derive(Debug, Default)]
pub struct ReplaySource {
    chunks: VecDeque<Vec<i16>>,
    sample_rate: u32,
    overflows: u64,
}

impl ReplaySource {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            chunks: VecDeque::new(),
            sample_rate,
            overflows: 0,
        }
    }

    pub fn push(&mut self, chunk: Vec<i16>) {
        self.chunks.push_back(chunk);
    }

    pub fn extend<I: IntoIterator<Item = Vec<i16>>>(&mut self, chunks: I) {
        self.chunks.extend(chunks);
    }

    pub fn record_overflow(&mut self) {
        self.overflows += 1;
    }
}

impl ChunkSource for ReplaySource {
    fn read_chunk(&mut self, out: &mut [i16]) -> ReadStatus {
        let Some(chunk) = self.chunks.pop_front() else {
            return ReadStatus::Timeout;
        };
        let n = chunk.len().min(out.len());
        out[..n].copy_from_slice(&chunk[..n]);
        ReadStatus::Ready(n)
    }

    fn overflow_count(&self) -> u64 {
        self.overflows
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Frames a driver may queue before the oldest start being dropped.
const FILE_DRIVER_POOL_FRAMES: usize = 10;

/// Host stand-in for the ADC: replays a WAV file at real time as raw 12-bit
/// conversion frames, notifying the wake signal once per frame.
pub struct FileDriver {
    path: PathBuf,
    frame_samples: usize,
    sample_rate: u32,
    looping: bool,
    pool: Arc<Mutex<VecDeque<Vec<u16>>>>,
    overflows: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FileDriver {
    /// Open `path` and prepare to replay it in frames of `frame_samples`.
    /// Multi-channel files are reduced to their first channel.
    pub fn open(path: impl AsRef<Path>, frame_samples: usize, looping: bool) -> Result<Self> {
        let path = path.as_ref();
        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV source {}", path.display()))?;
        let spec = reader.spec();

        info!(
            "File source {}: {} Hz, {} channels, {} frames",
            path.display(),
            spec.sample_rate,
            spec.channels,
            reader.duration()
        );

        Ok(Self {
            path: path.to_path_buf(),
            frame_samples: frame_samples.max(1),
            sample_rate: spec.sample_rate,
            looping,
            pool: Arc::new(Mutex::new(VecDeque::new())),
            overflows: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    fn load_mono(path: &Path) -> Result<Vec<i16>> {
        let reader = WavReader::open(path).context("Failed to open WAV file")?;
        let channels = usize::from(reader.spec().channels.max(1));
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;
        Ok(samples.into_iter().step_by(channels).collect())
    }
}

impl AcquisitionDriver for FileDriver {
    fn start(&mut self, wake: Arc<WakeSignal>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("File source already running");
            return Ok(());
        }

        let samples = Self::load_mono(&self.path)?;
        if samples.is_empty() {
            self.running.store(false, Ordering::SeqCst);
            anyhow::bail!("WAV source {} has no samples", self.path.display());
        }

        let frame_samples = self.frame_samples;
        let frame_period =
            Duration::from_secs_f64(frame_samples as f64 / f64::from(self.sample_rate.max(1)));
        let looping = self.looping;
        let pool = Arc::clone(&self.pool);
        let overflows = Arc::clone(&self.overflows);
        let running = Arc::clone(&self.running);

        self.worker = Some(thread::spawn(move || {
            let mut position = 0usize;
            while running.load(Ordering::Relaxed) {
                if position >= samples.len() {
                    if !looping {
                        break;
                    }
                    position = 0;
                }
                let end = (position + frame_samples).min(samples.len());
                let frame: Vec<u16> = samples[position..end]
                    .iter()
                    .map(|&s| pcm_to_adc_word(s))
                    .collect();
                position = end;

                {
                    let mut pool = pool.lock();
                    if pool.len() >= FILE_DRIVER_POOL_FRAMES {
                        pool.pop_front();
                        overflows.fetch_add(1, Ordering::Relaxed);
                    }
                    pool.push_back(frame);
                }
                wake.notify();

                thread::sleep(frame_period);
            }
            running.store(false, Ordering::Relaxed);
        }));

        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("File source thread panicked");
            }
        }
        self.pool.lock().clear();
        Ok(())
    }

    fn read_raw(&mut self, out: &mut [u16]) -> ReadStatus {
        let mut pool = self.pool.lock();
        let Some(mut frame) = pool.pop_front() else {
            return ReadStatus::Timeout;
        };
        if frame.len() > out.len() {
            let rest = frame.split_off(out.len());
            pool.push_front(rest);
        }
        out[..frame.len()].copy_from_slice(&frame);
        ReadStatus::Ready(frame.len())
    }

    fn overflow_count(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

impl Drop for FileDriver {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop file source on drop: {}", e);
        }
    }
}
