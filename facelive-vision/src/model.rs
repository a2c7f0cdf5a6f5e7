use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, TryRecvError};
use image::{imageops::FilterType, RgbImage};
use ndarray::Array4;
#[cfg(any(feature = "openvino", feature = "cuda"))]
use ort::ep::{self, ExecutionProvider};
use ort::{
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
    value::Value,
};

use crate::pose::TransformMatrix;

/// Per-frame face geometry estimator.
///
/// Timestamps passed to `detect` must be strictly increasing across calls.
pub trait VisionModel {
    /// Return the facial transformation matrix of the first face, if any.
    fn detect(&mut self, frame: &RgbImage, timestamp_ms: u64) -> Result<Option<TransformMatrix>>;
}

impl<M: VisionModel + ?Sized> VisionModel for Box<M> {
    fn detect(&mut self, frame: &RgbImage, timestamp_ms: u64) -> Result<Option<TransformMatrix>> {
        (**self).detect(frame, timestamp_ms)
    }
}

pub fn session_builder() -> Result<SessionBuilder> {
    #[allow(unused_mut)]
    let mut builder =
        Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

/// ONNX face geometry model.
///
/// Input: `[1, 3, S, S]` RGB in `[0, 1]`. Output 0: facial transformation
/// matrices shaped `[N, 4, 4]` or `[N, 16]`, row-major; `N == 0` means no face.
pub struct OnnxFaceModel {
    session: Session,
    input_size: u32,
    last_timestamp: Option<u64>,
}

impl OnnxFaceModel {
    pub fn load(path: &Path, input_size: u32) -> Result<Self> {
        let session = session_builder()?
            .commit_from_file(path)
            .with_context(|| format!("load face model {}", path.display()))?;
        Ok(Self {
            session,
            input_size,
            last_timestamp: None,
        })
    }
}

impl VisionModel for OnnxFaceModel {
    fn detect(&mut self, frame: &RgbImage, timestamp_ms: u64) -> Result<Option<TransformMatrix>> {
        if let Some(last) = self.last_timestamp {
            if timestamp_ms <= last {
                anyhow::bail!(
                    "timestamp {} not after previous {}",
                    timestamp_ms,
                    last
                );
            }
        }
        self.last_timestamp = Some(timestamp_ms);

        let size = self.input_size;
        let resized = image::imageops::resize(frame, size, size, FilterType::Triangle);

        // HWC u8 -> CHW f32
        let plane = (size * size) as usize;
        let mut input_data = vec![0.0f32; 3 * plane];
        for (i, px) in resized.pixels().enumerate() {
            input_data[i] = px[0] as f32 / 255.0;
            input_data[plane + i] = px[1] as f32 / 255.0;
            input_data[2 * plane + i] = px[2] as f32 / 255.0;
        }
        let input_array =
            Array4::from_shape_vec((1, 3, size as usize, size as usize), input_data)?;
        let input_tensor = Value::from_array(input_array)?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

        let faces = if shape.is_empty() { 0 } else { shape[0] as usize };
        if faces == 0 || data.len() < 16 {
            return Ok(None);
        }
        let mut m = [0.0f32; 16];
        m.copy_from_slice(&data[..16]);
        Ok(Some(m))
    }
}

/// Lifecycle of a model that is loaded off the scheduling thread.
pub enum ModelState<M> {
    Loading(Receiver<Result<M>>),
    Ready(M),
    Failed(String),
}

impl<M> ModelState<M> {
    /// Start loading on a background thread.
    pub fn spawn<F>(load: F) -> Self
    where
        F: FnOnce() -> Result<M> + Send + 'static,
        M: Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            // receiver may be gone if the controller was dropped
            let _ = tx.send(load());
        });
        ModelState::Loading(rx)
    }

    /// Advance `Loading` to `Ready`/`Failed` if the loader has finished.
    pub fn poll(&mut self) {
        let ModelState::Loading(rx) = self else {
            return;
        };
        let next = match rx.try_recv() {
            Ok(Ok(model)) => {
                log::info!("vision model ready");
                ModelState::Ready(model)
            }
            Ok(Err(err)) => {
                log::error!("vision model failed to load: {err:#}");
                ModelState::Failed(format!("{err:#}"))
            }
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => {
                ModelState::Failed("model loader exited without a result".to_string())
            }
        };
        *self = next;
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ModelState::Ready(_))
    }
}

/// Loader for [`OnnxFaceModel`] from a file on disk.
pub fn spawn_onnx(path: PathBuf, input_size: u32) -> ModelState<OnnxFaceModel> {
    ModelState::spawn(move || OnnxFaceModel::load(&path, input_size))
}
