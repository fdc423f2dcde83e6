//! PyO3 Python bindings for sinogram restoration.
//!
//! Thin wrappers over sinodec_core: all algorithm logic lives in the core
//! crate, this crate only converts NumPy arrays and maps errors.

use numpy::{PyArray1, PyArray2, PyArray3, PyReadonlyArray2, PyReadonlyArray3, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use sinodec_core::psf::psf_profile;
use sinodec_core::{
    DirectTransform, MemorySink, OutOfCoreVolumePipeline, PipelineConfig, SinoError,
    SpectralTransform, StackSource,
};

fn to_py_err(err: SinoError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn parse_config(config_json: Option<&str>) -> PyResult<PipelineConfig> {
    match config_json {
        Some(json) => PipelineConfig::from_json_str(json).map_err(to_py_err),
        None => Ok(PipelineConfig::default()),
    }
}

/// Centering shift of a (pixel, angle) sinogram.
#[pyfunction]
#[pyo3(signature = (sinogram, span = 50, full_rotation = true))]
pub fn estimate_shift(
    sinogram: PyReadonlyArray2<f64>,
    span: usize,
    full_rotation: bool,
) -> PyResult<i32> {
    sinodec_core::estimate_shift(sinogram.as_array(), span, full_rotation).map_err(to_py_err)
}

/// Spectral deconvolution with the default roll-off.
#[pyfunction]
#[pyo3(signature = (sinogram, pixel_size = 1.0, noise_level = 0.05))]
pub fn deconvolve<'py>(
    py: Python<'py>,
    sinogram: PyReadonlyArray2<f64>,
    pixel_size: f64,
    noise_level: f64,
) -> PyResult<&'py PyArray2<f64>> {
    let output = sinodec_core::deconvolve(sinogram.as_array(), pixel_size, noise_level)
        .map_err(to_py_err)?;
    Ok(output.to_pyarray(py))
}

/// Wavelet suppression of isolated artifacts.
#[pyfunction]
#[pyo3(signature = (sinogram, sigma = 5))]
pub fn remove_artifacts<'py>(
    py: Python<'py>,
    sinogram: PyReadonlyArray2<f64>,
    sigma: usize,
) -> PyResult<&'py PyArray2<f64>> {
    let output = sinodec_core::remove_artifacts(sinogram.as_array(), sigma).map_err(to_py_err)?;
    Ok(output.to_pyarray(py))
}

/// Pixel-frequency PSF profile in unshifted FFT order.
#[pyfunction]
pub fn estimate_psf(py: Python<'_>, sinogram: PyReadonlyArray2<f64>) -> PyResult<Py<PyArray1<f64>>> {
    let view = sinogram.as_array();
    let transform = DirectTransform::<f64>::new(view.dim()).map_err(to_py_err)?;
    let spectrum = transform.forward(view).map_err(to_py_err)?;
    let profile = psf_profile(spectrum.view());
    Ok(PyArray1::from_owned_array(py, profile).into())
}

/// Correct and centre one sinogram; returns `(shift, sinogram)`.
///
/// `config_json` is a partial JSON `PipelineConfig`; missing keys take defaults.
#[pyfunction]
#[pyo3(signature = (sinogram, config_json = None))]
pub fn correct_sinogram<'py>(
    py: Python<'py>,
    sinogram: PyReadonlyArray2<f64>,
    config_json: Option<&str>,
) -> PyResult<(i32, &'py PyArray2<f64>)> {
    let config = parse_config(config_json)?;
    let (shift, output) =
        sinodec_core::correct_sinogram(sinogram.as_array().to_owned(), &config, 0)
            .map_err(to_py_err)?;
    Ok((shift, output.to_pyarray(py)))
}

/// Restore a `(angle, slice, pixel)` projection stack into 16-bit
/// `(angle, slice, pixel)` projections through the out-of-core pipeline.
#[pyfunction]
#[pyo3(signature = (stack, config_json = None))]
pub fn restore_volume<'py>(
    py: Python<'py>,
    stack: PyReadonlyArray3<f32>,
    config_json: Option<&str>,
) -> PyResult<&'py PyArray3<u16>> {
    let config = parse_config(config_json)?;
    let source = StackSource::new(stack.as_array().to_owned());
    let projections = py
        .allow_threads(move || {
            let pipeline = OutOfCoreVolumePipeline::new(config)?;
            let mut sink = MemorySink::new();
            pipeline.run(&source, &mut sink)?;
            sink.into_stack()
        })
        .map_err(to_py_err)?;
    Ok(projections.to_pyarray(py))
}

/// Sinogram restoration Rust accelerator module
#[pymodule]
fn sinodec_rust(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(estimate_shift, m)?)?;
    m.add_function(wrap_pyfunction!(deconvolve, m)?)?;
    m.add_function(wrap_pyfunction!(remove_artifacts, m)?)?;
    m.add_function(wrap_pyfunction!(estimate_psf, m)?)?;
    m.add_function(wrap_pyfunction!(correct_sinogram, m)?)?;
    m.add_function(wrap_pyfunction!(restore_volume, m)?)?;
    Ok(())
}
