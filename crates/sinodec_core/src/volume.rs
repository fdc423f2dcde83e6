//! Out-of-core batch restoration of a projection stack.
//!
//! Slices are corrected in batches (concurrently when enabled), written into
//! a memory-mapped `(pixel, angle, slice)` store, then resliced per angle
//! into rescaled 16-bit projection images for the output sink.
//!
//! ## Resources
//!
//! The store is created at the start of [`OutOfCoreVolumePipeline::run`] and
//! deleted with its backing file before `run` returns, whatever the outcome.
//! Cancellation is coarse: it is checked between slice batches and between
//! emitted projections.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;
use ndarray::{Array2, Array3};
use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::error::{PipelineStage, SinoError, SinoResult};
use crate::float_trait::SinoFloat;
use crate::orchestration::SliceCorrector;
use crate::progress::{PipelineProgress, ProgressObserver, SilentProgress};
use crate::reslice::{reslice_projection, DynamicRange};
use crate::sinogram::{assemble_sinogram, ImageSource};
use crate::store::OutOfCoreStore;

// =============================================================================
// Constants
// =============================================================================

/// Environment override for the number of slices corrected per batch.
pub const SLICE_BATCH_ENV: &str = "SINODEC_SLICE_BATCH";

/// Resolve slice batch size from the environment, defaulting to the rayon
/// pool width when running in parallel.
fn resolve_slice_batch(parallel: bool) -> usize {
    if !parallel {
        return 1;
    }
    std::env::var(SLICE_BATCH_ENV)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or_else(|| rayon::current_num_threads().max(1))
}

// =============================================================================
// Output Sinks
// =============================================================================

/// Receiver of corrected 16-bit projection images, keyed by angle index.
///
/// Images are `(slice, pixel)`: one row per processed slice.
pub trait ProjectionSink {
    fn emit(&mut self, angle: usize, image: Array2<u16>) -> SinoResult<()>;
}

/// Collects projections in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    projections: BTreeMap<usize, Array2<u16>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.projections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }

    pub fn get(&self, angle: usize) -> Option<&Array2<u16>> {
        self.projections.get(&angle)
    }

    /// Stack all projections as `(angle, slice, pixel)`, ordered by angle.
    pub fn into_stack(self) -> SinoResult<Array3<u16>> {
        let (slices, pixels) = self
            .projections
            .values()
            .next()
            .map(|p| p.dim())
            .unwrap_or((0, 0));
        let mut stack = Array3::zeros((self.projections.len(), slices, pixels));
        for (i, image) in self.projections.values().enumerate() {
            SinoError::check_shape("projection stack", (slices, pixels), image.dim())?;
            stack.index_axis_mut(ndarray::Axis(0), i).assign(image);
        }
        Ok(stack)
    }
}

impl ProjectionSink for MemorySink {
    fn emit(&mut self, angle: usize, image: Array2<u16>) -> SinoResult<()> {
        self.projections.insert(angle, image);
        Ok(())
    }
}

// =============================================================================
// Batch Driver
// =============================================================================

/// Outcome of a completed batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    /// Half-open slice range that was processed.
    pub slice_range: (usize, usize),
    /// Number of projections emitted.
    pub projections: usize,
    /// Value mapping used for the 16-bit output.
    pub range: DynamicRange,
}

/// Slice-by-slice restoration of a whole stack through an out-of-core store.
pub struct OutOfCoreVolumePipeline {
    config: PipelineConfig,
    observer: Arc<dyn ProgressObserver>,
    cancel_flag: Arc<AtomicBool>,
}

impl OutOfCoreVolumePipeline {
    pub fn new(config: PipelineConfig) -> SinoResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            observer: Arc::new(SilentProgress),
            cancel_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Share an externally owned cancel flag.
    pub fn with_cancel_flag(mut self, cancel_flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = cancel_flag;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    fn check_cancelled(&self, completed: usize) -> SinoResult<()> {
        if self.cancel_flag.load(Ordering::SeqCst) {
            info!("batch: cancellation requested after {completed} units");
            self.observer
                .report(PipelineProgress::Cancelled { completed });
            return Err(SinoError::Cancelled { completed });
        }
        Ok(())
    }

    fn process_slice<F, S>(
        &self,
        source: &S,
        corrector: &SliceCorrector<F>,
        slice: usize,
    ) -> SinoResult<Array2<F>>
    where
        F: SinoFloat,
        S: ImageSource<F> + ?Sized,
    {
        let sinogram =
            assemble_sinogram(source, slice).map_err(|e| e.at(slice, PipelineStage::Assemble))?;
        corrector.correct(sinogram, slice)
    }

    /// Run the batch over the configured slice range of `source`, emitting one
    /// projection per angle into `sink`.
    pub fn run<F, S, K>(&self, source: &S, sink: &mut K) -> SinoResult<BatchSummary>
    where
        F: SinoFloat,
        S: ImageSource<F> + ?Sized,
        K: ProjectionSink + ?Sized,
    {
        let (low, high) = self.config.resolve_slice_range(source.slice_count())?;
        let (pixels, angles) = (source.pixel_count(), source.angle_count());
        let count = high - low;
        if pixels == 0 || angles == 0 {
            return Err(SinoError::Collaborator(format!(
                "image source has an empty projection geometry ({pixels} pixels, {angles} angles)"
            )));
        }

        let corrector = SliceCorrector::<F>::from_config(&self.config, (pixels, angles))?;
        let scratch = self.config.resolve_scratch_dir();
        let mut store = OutOfCoreStore::create(&scratch, (pixels, angles, count))?;

        info!(
            "batch: slices [{low}, {high}) of {} ({pixels} pixels x {angles} angles), store {}",
            source.slice_count(),
            store.path().display()
        );
        self.observer.report(PipelineProgress::Started {
            slices: count,
            angles,
        });

        // 1. Correct slices into the store.
        let batch = resolve_slice_batch(self.config.parallel);
        let slices: Vec<usize> = (low..high).collect();
        for chunk in slices.chunks(batch) {
            self.check_cancelled(chunk[0] - low)?;

            let corrected: Vec<SinoResult<Array2<F>>> = if chunk.len() > 1 {
                chunk
                    .par_iter()
                    .map(|&k| self.process_slice(source, &corrector, k))
                    .collect()
            } else {
                chunk
                    .iter()
                    .map(|&k| self.process_slice(source, &corrector, k))
                    .collect()
            };

            for (&k, result) in chunk.iter().zip(corrected) {
                let sinogram = result?;
                store
                    .write_slice(k - low, sinogram.view())
                    .map_err(|e| e.at(k, PipelineStage::Store))?;
                let done = k - low + 1;
                self.observer.report(PipelineProgress::Slice {
                    index: k,
                    fraction: done as f64 / count as f64,
                    status: format!("slice {} ({done}/{count})", k),
                });
            }
        }
        store.flush()?;

        // 2. Global dynamic range.
        let (min, max) = store.value_range()?;
        let range = DynamicRange::new(min as f64, max as f64);
        range.log_summary();

        // 3. Reslice into projections.
        for angle in 0..angles {
            self.check_cancelled(count + angle)?;
            let slab = store
                .angle_slab(angle)
                .map_err(|e| e.at(angle, PipelineStage::Reslice))?;
            let image = reslice_projection(slab.view(), &range);
            sink.emit(angle, image)
                .map_err(|e| e.at(angle, PipelineStage::Emit))?;
            self.observer.report(PipelineProgress::Projection {
                index: angle,
                fraction: (angle + 1) as f64 / angles as f64,
                status: format!("projection {} of {angles}", angle + 1),
            });
        }

        store.close()?;
        self.observer
            .report(PipelineProgress::Finished { projections: angles });
        info!("batch: wrote {angles} projections for {count} slices");

        Ok(BatchSummary {
            slice_range: (low, high),
            projections: angles,
            range,
        })
    }
}
