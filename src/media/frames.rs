//! Frame-level helpers for GIF and WebP containers.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Seek};
use std::path::Path;

use image::codecs::gif::GifDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, Frame};

use super::MediaError;

/// Delay used for frames that encode none
pub const DEFAULT_FRAME_DELAY_MS: u32 = 100;

/// Containers that may hold more than one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Gif,
    WebP,
}

impl Container {
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "gif" => Some(Container::Gif),
            "webp" => Some(Container::WebP),
            _ => None,
        }
    }
}

/// Whether a WebP file carries an animation
pub fn is_animated_webp(path: &Path) -> Result<bool, MediaError> {
    let reader = BufReader::new(File::open(path)?);
    let decoder = WebPDecoder::new(reader)?;
    Ok(decoder.has_animation())
}

/// Decode every frame, composited to full-canvas RGBA
pub fn decode_frames<R: BufRead + Seek>(
    reader: R,
    container: Container,
) -> Result<Vec<Frame>, MediaError> {
    let frames = match container {
        Container::Gif => GifDecoder::new(reader)?.into_frames().collect_frames()?,
        Container::WebP => WebPDecoder::new(reader)?.into_frames().collect_frames()?,
    };
    Ok(frames)
}

/// Decode every frame of an in-memory container
pub fn decode_frames_from_bytes(
    bytes: &[u8],
    container: Container,
) -> Result<Vec<Frame>, MediaError> {
    decode_frames(Cursor::new(bytes), container)
}

/// Frame delay in milliseconds, with the default for zero delays
pub fn frame_delay_ms(frame: &Frame) -> u32 {
    let (numer, denom) = frame.delay().numer_denom_ms();
    match numer.checked_div(denom) {
        Some(0) | None => DEFAULT_FRAME_DELAY_MS,
        Some(ms) => ms,
    }
}

/// Loop count stored in the container; 0 means forever.
///
/// GIF keeps it in the NETSCAPE2.0 application extension, WebP in the
/// ANIM chunk. `None` when the container does not say.
pub fn loop_count(bytes: &[u8], container: Container) -> Option<u16> {
    match container {
        Container::Gif => gif_loop_count(bytes),
        Container::WebP => webp_loop_count(bytes),
    }
}

fn gif_loop_count(bytes: &[u8]) -> Option<u16> {
    let mut decoder = gif::DecodeOptions::new()
        .read_info(Cursor::new(bytes))
        .ok()?;
    while decoder.next_frame_info().ok()?.is_some() {}

    // The decoder reports an absent extension as Finite(0)
    match decoder.repeat() {
        gif::Repeat::Infinite => Some(0),
        gif::Repeat::Finite(0) => None,
        gif::Repeat::Finite(n) => Some(n),
    }
}

/// Walk the RIFF chunks up to `ANIM`: background color (u32), loop count (u16)
fn webp_loop_count(bytes: &[u8]) -> Option<u16> {
    if bytes.get(0..4)? != b"RIFF" || bytes.get(8..12)? != b"WEBP" {
        return None;
    }

    let mut at = 12;
    while let Some(header) = bytes.get(at..at + 8) {
        let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let payload = at + 8;
        if &header[..4] == b"ANIM" {
            let raw = bytes.get(payload + 4..payload + 6)?;
            return Some(u16::from_le_bytes([raw[0], raw[1]]));
        }
        // Odd-sized payloads carry one byte of padding
        at = payload.checked_add(size)?.checked_add(size % 2)?;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::{GifEncoder, Repeat};
    use image::{Delay, RgbaImage};

    fn gif_bytes(frames: usize, delay_ms: u32, repeat: Repeat) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut out);
            encoder.set_repeat(repeat).unwrap();
            for i in 0..frames {
                let buffer = RgbaImage::from_pixel(8, 8, image::Rgba([i as u8 * 40, 0, 0, 255]));
                let frame = Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(delay_ms, 1));
                encoder.encode_frame(frame).unwrap();
            }
        }
        out
    }

    #[test]
    fn test_container_of() {
        assert_eq!(Container::of(Path::new("a.GIF")), Some(Container::Gif));
        assert_eq!(Container::of(Path::new("a.webp")), Some(Container::WebP));
        assert_eq!(Container::of(Path::new("a.png")), None);
    }

    #[test]
    fn test_decode_gif_frames() {
        let bytes = gif_bytes(3, 50, Repeat::Infinite);
        let frames = decode_frames_from_bytes(&bytes, Container::Gif).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frame_delay_ms(&frames[0]), 50);
    }

    #[test]
    fn test_gif_loop_count() {
        let forever = gif_bytes(2, 10, Repeat::Infinite);
        assert_eq!(loop_count(&forever, Container::Gif), Some(0));

        let thrice = gif_bytes(2, 10, Repeat::Finite(3));
        assert_eq!(loop_count(&thrice, Container::Gif), Some(3));
    }

    #[test]
    fn test_loop_count_absent() {
        assert_eq!(loop_count(b"GIF89a", Container::Gif), None);
        assert_eq!(loop_count(b"RIFF....WEBPVP8 ", Container::WebP), None);
    }

    #[test]
    fn test_webp_anim_chunk() {
        let mut bytes = b"RIFF\0\0\0\0WEBPVP8X".to_vec();
        bytes.extend_from_slice(&[10, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        bytes.extend_from_slice(b"ANIM");
        bytes.extend_from_slice(&6u32.to_le_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(&5u16.to_le_bytes());
        assert_eq!(loop_count(&bytes, Container::WebP), Some(5));
    }

    #[test]
    fn test_webp_marker_inside_another_chunk_is_ignored() {
        let mut bytes = b"RIFF\0\0\0\0WEBP".to_vec();
        let payload = b"xxANIM\0\0\0\0\0\0\x07\0z";
        bytes.extend_from_slice(b"EXIF");
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes.push(0);
        bytes.extend_from_slice(b"VP8 ");
        bytes.extend_from_slice(&0u32.to_le_bytes());

        assert_eq!(loop_count(&bytes, Container::WebP), None);
    }

    #[test]
    fn test_gif_without_repeat_extension() {
        let mut out = Vec::new();
        {
            let mut encoder = gif::Encoder::new(&mut out, 2, 2, &[0, 0, 0, 255, 255, 255]).unwrap();
            let frame = gif::Frame::from_indexed_pixels(2, 2, vec![0, 1, 1, 0], None);
            encoder.write_frame(&frame).unwrap();
        }
        assert_eq!(loop_count(&out, Container::Gif), None);
    }
}
