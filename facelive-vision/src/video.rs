use anyhow::{Context, Result};
use image::{ImageBuffer, Rgb, RgbImage};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

/// Anything the capture controller can sample frames from.
///
/// `position` is a cursor that changes whenever a new frame becomes
/// available; two reads returning the same position refer to the same frame.
pub trait FrameSource {
    fn position(&self) -> u64;
    fn frame(&self) -> &RgbImage;
    /// Size of the on-screen rectangle the frame is shown cover-fit in.
    fn display_size(&self) -> (f64, f64);
}

/// A [`FrameSource`] fed by a device that must be asked for each new frame.
pub trait LiveSource: FrameSource {
    /// Block until the next frame is available.
    fn refresh(&mut self) -> Result<()>;
}

pub struct Camera {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    fourcc: FourCC,
}

impl Camera {
    pub fn open(device: &str) -> Result<Self> {
        let dev = Device::with_path(device).context("open camera")?;
        let mut fmt = dev.format().context("get format")?;
        // Prefer RGB, fallback to YUYV, else accept existing format
        let desired = Format::new(fmt.width, fmt.height, FourCC::new(b"RGB3"));
        fmt = dev.set_format(&desired).unwrap_or(fmt);
        if fmt.fourcc != FourCC::new(b"RGB3") {
            let yuyv = Format::new(fmt.width, fmt.height, FourCC::new(b"YUYV"));
            fmt = dev.set_format(&yuyv).unwrap_or(fmt);
        }
        let fourcc = fmt.fourcc;
        let width = fmt.width;
        let height = fmt.height;
        let stream = Stream::with_buffers(&dev, Type::VideoCapture, 4).context("stream")?;
        log::info!(
            "camera {} streaming {}x{} {:?}",
            device,
            width,
            height,
            fourcc
        );
        Ok(Self {
            stream,
            width,
            height,
            fourcc,
        })
    }

    /// Dequeue the next frame together with its driver sequence number.
    pub fn frame(&mut self) -> Result<(u64, RgbImage)> {
        let (data, meta) = self.stream.next().context("capture frame")?;
        log::trace!(
            "captured frame: seq={} len={} fourcc={:?}",
            meta.sequence,
            data.len(),
            self.fourcc
        );
        let buf = match self.fourcc {
            f if f == FourCC::new(b"RGB3") => data.to_vec(),
            f if f == FourCC::new(b"YUYV") => yuyv_to_rgb(self.width, self.height, data)?,
            f if f == FourCC::new(b"GREY") => grey_to_rgb(self.width, self.height, data)?,
            other => anyhow::bail!("unsupported pixel format {:?}", other),
        };
        let expected = (self.width * self.height * 3) as usize;
        if buf.len() < expected {
            anyhow::bail!("buffer too small: got {}, expected {}", buf.len(), expected);
        }
        let mut buf = buf;
        buf.truncate(expected);
        let img: RgbImage = ImageBuffer::<Rgb<u8>, _>::from_raw(self.width, self.height, buf)
            .ok_or_else(|| anyhow::anyhow!("failed to build image buffer"))?;
        Ok((meta.sequence as u64, img))
    }
}

/// Camera-backed [`FrameSource`] holding the most recently dequeued frame.
pub struct CameraSource {
    camera: Camera,
    latest: RgbImage,
    position: u64,
    display: (f64, f64),
}

impl CameraSource {
    /// Wrap an open camera; blocks until the first frame arrives.
    pub fn new(mut camera: Camera, display: (f64, f64)) -> Result<Self> {
        let (position, latest) = camera.frame().context("first frame")?;
        Ok(Self {
            camera,
            latest,
            position,
            display,
        })
    }
}

impl LiveSource for CameraSource {
    fn refresh(&mut self) -> Result<()> {
        let (position, frame) = self.camera.frame()?;
        self.position = position;
        self.latest = frame;
        Ok(())
    }
}

impl FrameSource for CameraSource {
    fn position(&self) -> u64 {
        self.position
    }

    fn frame(&self) -> &RgbImage {
        &self.latest
    }

    fn display_size(&self) -> (f64, f64) {
        self.display
    }
}

/// Fixed in-memory frame whose position is advanced by hand.
#[derive(Debug, Clone)]
pub struct StillSource {
    pub frame: RgbImage,
    pub position: u64,
    pub display: (f64, f64),
}

impl StillSource {
    pub fn new(frame: RgbImage, display: (f64, f64)) -> Self {
        Self {
            frame,
            position: 0,
            display,
        }
    }

    /// Mark a new frame as available.
    pub fn advance(&mut self) {
        self.position += 1;
    }
}

impl FrameSource for StillSource {
    fn position(&self) -> u64 {
        self.position
    }

    fn frame(&self) -> &RgbImage {
        &self.frame
    }

    fn display_size(&self) -> (f64, f64) {
        self.display
    }
}

fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        return Err(anyhow::anyhow!("short YUYV buffer"));
    }
    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;
        for &y in &[y0, y1] {
            out.push(clamp(y + 1.402 * v));
            out.push(clamp(y - 0.344136 * u - 0.714136 * v));
            out.push(clamp(y + 1.772 * u));
        }
    }
    Ok(out)
}

fn clamp(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

fn grey_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height) as usize;
    if data.len() < expected {
        return Err(anyhow::anyhow!("short GREY buffer"));
    }
    Ok(data[..expected].iter().flat_map(|&y| [y, y, y]).collect())
}
