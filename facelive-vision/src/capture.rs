//! Guide-region capture: maps the on-screen face guide back onto source pixels,
//! crops it with some padding, mirrors it and encodes it as JPEG.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, RgbImage};

/// Fixed parameters of the capture geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    /// Guide width in display pixels.
    pub guide_width: f64,
    /// Guide height in display pixels.
    pub guide_height: f64,
    /// Context added around the guide region.
    pub padding: f64,
    /// Crops narrower than this are upscaled to it.
    pub min_output_width: u32,
    /// JPEG quality, 1..=100.
    pub jpeg_quality: u8,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            guide_width: 192.0,
            guide_height: 256.0,
            padding: 1.3,
            min_output_width: 640,
            jpeg_quality: 95,
        }
    }
}

/// Source region and output size of one capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropGeometry {
    /// Cover-fit enlargement of the source in the display rectangle.
    pub scale: f64,
    pub sx: u32,
    pub sy: u32,
    pub crop_width: u32,
    pub crop_height: u32,
    pub upscale: f64,
    pub out_width: u32,
    pub out_height: u32,
}

impl CropGeometry {
    /// Compute the crop of a `frame_width x frame_height` source shown
    /// cover-fit inside a `display_width x display_height` rectangle.
    pub fn compute(
        frame_width: u32,
        frame_height: u32,
        display_width: f64,
        display_height: f64,
        settings: &CaptureSettings,
    ) -> Result<Self> {
        if frame_width == 0 || frame_height == 0 {
            anyhow::bail!("frame has no pixels ({}x{})", frame_width, frame_height);
        }
        if !(display_width > 0.0 && display_height > 0.0) {
            anyhow::bail!(
                "display rectangle must be positive, got {}x{}",
                display_width,
                display_height
            );
        }

        let vw = frame_width as f64;
        let vh = frame_height as f64;
        let scale = (display_width / vw).max(display_height / vh);

        let crop_width = ((settings.guide_width / scale * settings.padding).round() as u32)
            .clamp(1, frame_width);
        let crop_height = ((settings.guide_height / scale * settings.padding).round() as u32)
            .clamp(1, frame_height);

        // (frame - crop) / 2 rounded up never exceeds frame - crop
        let sx = (vw / 2.0 - crop_width as f64 / 2.0).round().max(0.0) as u32;
        let sy = (vh / 2.0 - crop_height as f64 / 2.0).round().max(0.0) as u32;
        let sx = sx.min(frame_width - crop_width);
        let sy = sy.min(frame_height - crop_height);

        let upscale = if crop_width < settings.min_output_width {
            settings.min_output_width as f64 / crop_width as f64
        } else {
            1.0
        };
        let out_width = (crop_width as f64 * upscale).round() as u32;
        let out_height = (crop_height as f64 * upscale).round() as u32;

        Ok(Self {
            scale,
            sx,
            sy,
            crop_width,
            crop_height,
            upscale,
            out_width,
            out_height,
        })
    }

    pub fn is_upscaled(&self) -> bool {
        self.upscale > 1.0
    }
}

/// Encoded capture artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedCapture {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

/// Crop, mirror and resize `frame` according to `geometry`.
pub fn render(frame: &RgbImage, geometry: &CropGeometry) -> RgbImage {
    let region = imageops::crop_imm(
        frame,
        geometry.sx,
        geometry.sy,
        geometry.crop_width,
        geometry.crop_height,
    )
    .to_image();
    let mirrored = imageops::flip_horizontal(&region);

    if mirrored.dimensions() == (geometry.out_width, geometry.out_height) {
        return mirrored;
    }
    imageops::resize(
        &mirrored,
        geometry.out_width,
        geometry.out_height,
        imageops::FilterType::Triangle,
    )
}

pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder.encode_image(img).context("encoding capture")?;
    Ok(buf)
}

/// Full extraction for the current frame.
pub fn extract(
    frame: &RgbImage,
    display_width: f64,
    display_height: f64,
    settings: &CaptureSettings,
) -> Result<EncodedCapture> {
    let geometry = CropGeometry::compute(
        frame.width(),
        frame.height(),
        display_width,
        display_height,
        settings,
    )?;
    log::debug!(
        "capture geometry: src=[{}, {}, {}x{}] out={}x{} scale={:.3} upscale={:.3}",
        geometry.sx,
        geometry.sy,
        geometry.crop_width,
        geometry.crop_height,
        geometry.out_width,
        geometry.out_height,
        geometry.scale,
        geometry.upscale
    );

    let rendered = render(frame, &geometry);
    let jpeg = encode_jpeg(&rendered, settings.jpeg_quality)?;

    Ok(EncodedCapture {
        width: rendered.width(),
        height: rendered.height(),
        jpeg,
    })
}
