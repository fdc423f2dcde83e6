//! Out-of-core batch restoration of small projection stacks.

use std::sync::mpsc::channel;

use ndarray::{Array2, Array3};
use sinodec_core::{
    assemble_sinogram, BatchManager, BatchState, DriftCorrectedSource, MemorySink,
    OutOfCoreVolumePipeline, PipelineConfig, PipelineProgress, ProjectionDrift, SliceCorrector,
    StackSource,
};

const ANGLES: usize = 24;
const SLICES: usize = 4;
const PIXELS: usize = 256;

/// Smooth disc sinograms on a bright background, one disc offset per slice.
fn phantom_stack() -> StackSource<f32> {
    let centre = (PIXELS as f64 - 1.0) / 2.0;
    StackSource::new(Array3::from_shape_fn((ANGLES, SLICES, PIXELS), |(a, s, p)| {
        let theta = (a as f64 * 360.0 / ANGLES as f64).to_radians();
        let x0 = 10.0 + 5.0 * s as f64;
        let d = p as f64 - (centre + x0 * theta.cos() - 6.0 * theta.sin());
        let radius = 40.0;
        let chord = if d.abs() < radius {
            2.0 * (radius * radius - d * d).sqrt()
        } else {
            0.0
        };
        (100.0 + 5.0 * chord) as f32
    }))
}

fn config_in(dir: &std::path::Path) -> PipelineConfig {
    PipelineConfig {
        scratch_dir: Some(dir.to_path_buf()),
        ..PipelineConfig::default()
    }
}

// ==================== Batch Output Tests ====================

#[test]
fn test_batch_matches_per_slice_correction() {
    let dir = tempfile::tempdir().unwrap();
    let source = phantom_stack();
    let config = config_in(dir.path());
    let pipeline = OutOfCoreVolumePipeline::new(config.clone()).unwrap();
    let mut sink = MemorySink::new();
    let summary = pipeline.run(&source, &mut sink).unwrap();

    assert_eq!(summary.slice_range, (0, SLICES));
    assert_eq!(summary.projections, ANGLES);
    assert!(!summary.range.is_compressed());

    let corrector = SliceCorrector::<f32>::from_config(&config, (PIXELS, ANGLES)).unwrap();
    let corrected: Vec<Array2<f32>> = (0..SLICES)
        .map(|k| {
            let sino = assemble_sinogram(&source, k).unwrap();
            corrector.correct(sino, k).unwrap()
        })
        .collect();

    let min = corrected
        .iter()
        .flat_map(|c| c.iter().copied())
        .fold(f32::INFINITY, f32::min);
    assert_eq!(summary.range.min, min as f64);

    for angle in 0..ANGLES {
        let projection = sink.get(angle).unwrap();
        assert_eq!(projection.dim(), (SLICES, PIXELS));
        for k in 0..SLICES {
            for p in 0..PIXELS {
                let expected = summary.range.to_u16(corrected[k][[p, angle]] as f64);
                let got = projection[[k, p]];
                assert!(
                    got.abs_diff(expected) <= 1,
                    "angle {angle} slice {k} pixel {p}: {got} vs {expected}"
                );
            }
        }
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_serial_and_parallel_runs_agree() {
    let dir = tempfile::tempdir().unwrap();
    let source = phantom_stack();

    let run = |parallel: bool| {
        let config = PipelineConfig {
            parallel,
            ..config_in(dir.path())
        };
        let mut sink = MemorySink::new();
        OutOfCoreVolumePipeline::new(config)
            .unwrap()
            .run(&source, &mut sink)
            .unwrap();
        sink.into_stack().unwrap()
    };

    let serial = run(false);
    let parallel = run(true);
    assert_eq!(serial.dim(), (ANGLES, SLICES, PIXELS));
    assert_eq!(serial, parallel);
}

#[test]
fn test_slice_range_limits_projection_height() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = channel();
    let config = PipelineConfig {
        slice_range: Some((1, 3)),
        ..config_in(dir.path())
    };
    let pipeline = OutOfCoreVolumePipeline::new(config)
        .unwrap()
        .with_observer(std::sync::Arc::new(tx));
    let mut sink = MemorySink::new();
    pipeline.run(&phantom_stack(), &mut sink).unwrap();

    assert_eq!(sink.get(0).unwrap().dim(), (2, PIXELS));
    drop(pipeline);
    let events: Vec<PipelineProgress> = rx.iter().collect();
    assert_eq!(
        events.first(),
        Some(&PipelineProgress::Started {
            slices: 2,
            angles: ANGLES
        })
    );
    assert_eq!(
        events.last(),
        Some(&PipelineProgress::Finished {
            projections: ANGLES
        })
    );
    let slice_events = events
        .iter()
        .filter(|e| matches!(e, PipelineProgress::Slice { .. }))
        .count();
    assert_eq!(slice_events, 2);
}

// ==================== Drift Tests ====================

#[test]
fn test_drift_corrected_source_restores_aligned_output() {
    let dir = tempfile::tempdir().unwrap();
    let clean = phantom_stack();

    let dx: Vec<i32> = (0..ANGLES as i32).map(|a| (a % 5) - 2).collect();
    let dy: Vec<i32> = (0..ANGLES as i32).map(|a| a % 3).collect();
    let drifted = StackSource::new(Array3::from_shape_fn((ANGLES, SLICES, PIXELS), |(a, s, p)| {
        let src_s = (s as i32 + dy[a]).rem_euclid(SLICES as i32) as usize;
        let src_p = (p as i32 + dx[a]).rem_euclid(PIXELS as i32) as usize;
        clean.stack()[[a, src_s, src_p]]
    }));
    let corrected = DriftCorrectedSource::new(
        &drifted,
        ProjectionDrift::from_columns(&dx, &dy).unwrap(),
    )
    .unwrap();

    let run = |source: &dyn sinodec_core::ImageSource<f32>| {
        let mut sink = MemorySink::new();
        OutOfCoreVolumePipeline::new(config_in(dir.path()))
            .unwrap()
            .run(source, &mut sink)
            .unwrap();
        sink.into_stack().unwrap()
    };

    assert_eq!(run(&corrected), run(&clean));
}

// ==================== Background Manager Tests ====================

#[test]
fn test_manager_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = BatchManager::new();
    manager.start(phantom_stack(), config_in(dir.path()));
    assert_eq!(manager.wait(), &BatchState::Completed);

    let sink = manager.take_result().unwrap();
    assert_eq!(sink.len(), ANGLES);
    assert_eq!(sink.get(ANGLES - 1).unwrap().dim(), (SLICES, PIXELS));
}
