//! Media loading: a thin facade over the `image` decoders. Formats are
//! dispatched by content sniffing, never by file name; frames come out as
//! unassociated RGBA8.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageFormat};

use crate::canvas::config::PixelType;
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Frame {
    pixels: Vec<u8>,
    width: usize,
    height: usize,
    /// Display time in milliseconds; 0 for stills.
    delay_ms: u32,
}

impl Frame {
    pub fn data(&self) -> (PixelType, &[u8], usize, usize, usize) {
        (
            PixelType::Rgba8Unassociated,
            &self.pixels,
            self.width,
            self.height,
            self.width * 4,
        )
    }

    pub fn delay_ms(&self) -> u32 {
        self.delay_ms
    }
}

#[derive(Debug)]
pub struct MediaLoader {
    path: PathBuf,
    frames: Vec<Frame>,
}

impl MediaLoader {
    /// Reads and decodes `path`. Animated GIFs keep all frames; other
    /// formats produce a single frame.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let format = image::guess_format(&bytes)
            .map_err(|e| Error::Decode(format!("{}: {}", path.display(), e)))?;

        let frames = match format {
            ImageFormat::Gif => decode_gif(&bytes)
                .map_err(|e| Error::Decode(format!("{}: {}", path.display(), e)))?,
            _ => {
                let img = image::load_from_memory(&bytes)
                    .map_err(|e| Error::Decode(format!("{}: {}", path.display(), e)))?;
                let rgba = img.to_rgba8();
                let (width, height) = rgba.dimensions();
                vec![Frame {
                    pixels: rgba.into_raw(),
                    width: width as usize,
                    height: height as usize,
                    delay_ms: 0,
                }]
            }
        };

        if frames.is_empty() {
            return Err(Error::Decode(format!(
                "{}: no frames decoded",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            frames,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_animation(&self) -> bool {
        self.frames.len() > 1
    }

    pub fn frame(&self, n: usize) -> Option<&Frame> {
        self.frames.get(n)
    }

    pub fn first_frame(&self) -> &Frame {
        &self.frames[0]
    }
}

fn decode_gif(bytes: &[u8]) -> image::ImageResult<Vec<Frame>> {
    let decoder = GifDecoder::new(Cursor::new(bytes))?;
    let mut out = Vec::new();
    for frame in decoder.into_frames() {
        let frame = frame?;
        let (numer, denom) = frame.delay().numer_denom_ms();
        let delay_ms = if denom == 0 { 0 } else { numer / denom };
        let buf = frame.into_buffer();
        let (width, height) = buf.dimensions();
        out.push(Frame {
            pixels: buf.into_raw(),
            width: width as usize,
            height: height as usize,
            delay_ms,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::config::PixelType;

    fn write_png(dir: &std::path::Path, name: &str, w: u32, h: u32) -> PathBuf {
        let path = dir.join(name);
        let img = image::RgbaImage::from_fn(w, h, |x, y| {
            image::Rgba([(x * 7) as u8, (y * 11) as u8, 128, 255])
        });
        img.save_with_format(&path, image::ImageFormat::Png).unwrap();
        path
    }

    #[test]
    fn decodes_png_to_rgba_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "img.png", 5, 3);

        let loader = MediaLoader::open(&path).unwrap();
        assert_eq!(loader.frame_count(), 1);
        assert!(!loader.is_animation());

        let (pt, pixels, w, h, stride) = loader.first_frame().data();
        assert_eq!(pt, PixelType::Rgba8Unassociated);
        assert_eq!((w, h, stride), (5, 3, 20));
        assert_eq!(pixels.len(), 60);
        // Top-left pixel of the generator above.
        assert_eq!(&pixels[..4], &[0, 0, 128, 255]);
    }

    #[test]
    fn sniffs_format_despite_extension() {
        let dir = tempfile::tempdir().unwrap();
        // PNG bytes behind a .jpg name must still decode as PNG.
        let png = write_png(dir.path(), "real.png", 2, 2);
        let lied = dir.path().join("fake.jpg");
        std::fs::copy(&png, &lied).unwrap();

        let loader = MediaLoader::open(&lied).unwrap();
        assert_eq!(loader.frame_count(), 1);
    }

    #[test]
    fn missing_file_reports_io_error() {
        let err = MediaLoader::open(Path::new("/nonexistent/nope.png")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn garbage_reports_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.bin");
        std::fs::write(&path, b"this is not an image").unwrap();

        let err = MediaLoader::open(&path).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
