//! Writes a gathered image buffer to a binary PPM (P6) file, so the
//! coordination layer has somewhere real to put its output.

use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageWriteError {
    #[error("pixel buffer length {actual} does not match {width}x{height}x3 ({expected})")]
    BufferLengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("could not write image to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Clamps a shaded float channel (expected in `[0,1]`, but not guaranteed —
/// shaders are pure but otherwise untrusted) to a PPM byte.
fn to_byte(channel: f32) -> u8 {
    (channel.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Writes `pixels` (row-major RGB floats, `len == width*height*3`, no
/// trailing compute-time float — callers strip that before calling) as a
/// binary PPM (P6) file.
pub fn write_ppm(path: impl AsRef<Path>, width: u32, height: u32, pixels: &[f32]) -> Result<(), ImageWriteError> {
    let path = path.as_ref();
    let expected = width as usize * height as usize * 3;
    if pixels.len() != expected {
        return Err(ImageWriteError::BufferLengthMismatch {
            width,
            height,
            expected,
            actual: pixels.len(),
        });
    }

    let mut bytes = Vec::with_capacity(expected);
    bytes.extend(pixels.iter().map(|&c| to_byte(c)));

    let mut file = std::fs::File::create(path).map_err(|source| ImageWriteError::Io {
        path: path.display().to_string(),
        source,
    })?;
    write!(file, "P6\n{width} {height}\n255\n").map_err(|source| ImageWriteError::Io {
        path: path.display().to_string(),
        source,
    })?;
    file.write_all(&bytes).map_err(|source| ImageWriteError::Io {
        path: path.display().to_string(),
        source,
    })?;

    tracing::info!(target: "imagewriter", path = %path.display(), width, height, "image_written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_expected_header_and_byte_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ppm");
        let pixels = vec![0.0f32; 2 * 2 * 3];
        write_ppm(&path, 2, 2, &pixels).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"P6\n2 2\n255\n"));
        let header_len = b"P6\n2 2\n255\n".len();
        assert_eq!(bytes.len() - header_len, 2 * 2 * 3);
    }

    #[test]
    fn clamps_out_of_range_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ppm");
        let pixels = vec![-1.0, 0.5, 2.0];
        write_ppm(&path, 1, 1, &pixels).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let header_len = b"P6\n1 1\n255\n".len();
        let body = &bytes[header_len..];
        assert_eq!(body, &[0, 128, 255]);
    }

    #[test]
    fn rejects_mismatched_buffer_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ppm");
        let err = write_ppm(&path, 2, 2, &[0.0f32; 5]).unwrap_err();
        assert!(matches!(err, ImageWriteError::BufferLengthMismatch { .. }));
    }
}
