use crate::aggregator::CapturedImage;
use crate::liveness::{LivenessStep, Thresholds};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionManifest {
    pub id: String,
    pub created_at: u64,
    pub hold_ms: u64,
    pub turn_yaw_deg: f32,
    pub images: Vec<ImageEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageEntry {
    pub step: LivenessStep,
    pub file: String,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

fn session_path(output_dir: &Path, id: &str) -> PathBuf {
    let mut p = output_dir.to_path_buf();
    p.push(id);
    p
}

/// Write the captures and a `manifest.json` into a new session directory.
pub fn save_session(
    output_dir: &Path,
    images: &[CapturedImage],
    thresholds: &Thresholds,
) -> Result<PathBuf> {
    let id = uuid::Uuid::new_v4().to_string();
    let dir = session_path(output_dir, &id);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut entries = Vec::with_capacity(images.len());
    for (i, image) in images.iter().enumerate() {
        let file = format!("{}-{}.jpg", i + 1, image.step.label());
        let path = dir.join(&file);
        std::fs::write(&path, &image.capture.jpeg)
            .with_context(|| format!("writing {}", path.display()))?;
        entries.push(ImageEntry {
            step: image.step,
            file,
            width: image.capture.width,
            height: image.capture.height,
            bytes: image.capture.jpeg.len(),
        });
    }

    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let manifest = SessionManifest {
        id,
        created_at,
        hold_ms: thresholds.hold_ms,
        turn_yaw_deg: thresholds.turn_yaw,
        images: entries,
    };
    let file = dir.join("manifest.json");
    let data = serde_json::to_vec_pretty(&manifest)?;
    std::fs::write(&file, data).with_context(|| format!("writing {}", file.display()))?;
    Ok(dir)
}

pub fn load_manifest(session_dir: &Path) -> Result<SessionManifest> {
    let file = session_dir.join("manifest.json");
    let data = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
    Ok(serde_json::from_slice(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facelive_vision::EncodedCapture;

    #[test]
    fn writes_images_and_manifest() {
        let out = std::env::temp_dir().join(format!("facelive-store-{}", uuid::Uuid::new_v4()));
        let images: Vec<_> = LivenessStep::CAPTURE_STEPS
            .into_iter()
            .map(|step| CapturedImage {
                step,
                capture: EncodedCapture {
                    width: 640,
                    height: 851,
                    jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
                },
            })
            .collect();

        let dir = save_session(&out, &images, &Thresholds::default()).unwrap();
        let manifest = load_manifest(&dir).unwrap();
        assert_eq!(manifest.images.len(), 3);
        assert_eq!(manifest.images[0].file, "1-right.jpg");
        assert_eq!(manifest.images[2].step, LivenessStep::AwaitStraight);
        assert!(dir.join("2-left.jpg").exists());
        assert_eq!(manifest.hold_ms, 1000);

        std::fs::remove_dir_all(&out).unwrap();
    }
}
