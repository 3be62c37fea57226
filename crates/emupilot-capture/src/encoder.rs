// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Clip encoder
//!
//! Turns an ordered frame slice into an animated GIF whose frame count and
//! playback length stay bounded no matter how many frames went in:
//! 1. Uniform subsampling with stride `ceil(n / max_frames)`
//! 2. Downscale to `target_width`, preserving aspect ratio
//! 3. Per-frame delay `max(min_frame_ms, target_total_ms / count)`
//! 4. Every frame is opaque and covers the full canvas, so nothing from a
//!    previous frame survives into the next one

use emupilot_config::ClipConfig;
use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::{self, FilterType};
use image::{Delay, Frame, RgbaImage};
use std::sync::Arc;
use tracing::debug;

use crate::error::EncodeError;
use crate::frame::TimestampedFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipEncoderConfig {
    pub max_frames: usize,
    pub target_width: u32,
    pub min_frame_ms: u32,
    pub target_total_ms: u32,
}

impl Default for ClipEncoderConfig {
    fn default() -> Self {
        Self::from(&ClipConfig::default())
    }
}

impl From<&ClipConfig> for ClipEncoderConfig {
    fn from(config: &ClipConfig) -> Self {
        Self {
            max_frames: config.max_frames.max(1),
            target_width: config.target_width.max(1),
            min_frame_ms: config.min_frame_ms.max(1),
            target_total_ms: config.target_total_ms,
        }
    }
}

/// Encoded animated image plus the numbers the requester needs.
#[derive(Debug, Clone)]
pub struct EncodedClip {
    pub bytes: Vec<u8>,
    pub frame_count: usize,
    pub width: u32,
    pub height: u32,
    /// Display time of each frame (GIF delays have 10 ms resolution)
    pub frame_delay_ms: u32,
    /// Nominal total playback time
    pub playback_ms: u64,
    pub first_sequence: u64,
    pub last_sequence: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ClipEncoder {
    config: ClipEncoderConfig,
}

impl ClipEncoder {
    pub fn new(config: ClipEncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClipEncoderConfig {
        &self.config
    }

    /// Pick at most `max_frames` frames at a uniform stride, keeping the first.
    pub fn subsample<'a>(
        &self,
        frames: &'a [Arc<TimestampedFrame>],
    ) -> Vec<&'a Arc<TimestampedFrame>> {
        let max = self.config.max_frames;
        if frames.len() <= max {
            return frames.iter().collect();
        }
        let stride = frames.len().div_ceil(max);
        frames.iter().step_by(stride).collect()
    }

    /// Output dimensions for a source frame: never upscaled, height rounded, at least 1.
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        if width <= self.config.target_width || width == 0 {
            return (width.max(1), height.max(1));
        }
        let scale = self.config.target_width as f64 / width as f64;
        let scaled_height = ((height as f64) * scale).round() as u32;
        (self.config.target_width, scaled_height.max(1))
    }

    /// Delay per frame in milliseconds, a multiple of 10.
    pub fn frame_delay_ms(&self, frame_count: usize) -> u32 {
        let count = frame_count.max(1) as f64;
        let min_cs = self.config.min_frame_ms.div_ceil(10).max(1);
        let share_cs = (self.config.target_total_ms as f64 / 10.0 / count).round() as u32;
        share_cs.max(min_cs) * 10
    }

    pub fn encode(&self, frames: &[Arc<TimestampedFrame>]) -> Result<EncodedClip, EncodeError> {
        let selected = self.subsample(frames);
        let (first, last) = match (selected.first(), selected.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(EncodeError::NoFrames),
        };

        let (width, height) = self.target_dimensions(first.width(), first.height());
        let frame_delay_ms = self.frame_delay_ms(selected.len());

        let mut bytes = Vec::new();
        {
            let mut encoder = GifEncoder::new_with_speed(&mut bytes, 10);
            encoder.set_repeat(Repeat::Infinite)?;

            for frame in &selected {
                let mut scaled = if frame.image.dimensions() == (width, height) {
                    frame.image.clone()
                } else {
                    imageops::resize(&frame.image, width, height, FilterType::Triangle)
                };
                flatten_alpha(&mut scaled);

                encoder.encode_frame(Frame::from_parts(
                    scaled,
                    0,
                    0,
                    Delay::from_numer_denom_ms(frame_delay_ms, 1),
                ))?;
            }
        }

        debug!(
            "[ENCODER] {} -> {} frames at {}x{}, {} ms/frame, {} bytes",
            frames.len(),
            selected.len(),
            width,
            height,
            frame_delay_ms,
            bytes.len()
        );

        Ok(EncodedClip {
            bytes,
            frame_count: selected.len(),
            width,
            height,
            frame_delay_ms,
            playback_ms: frame_delay_ms as u64 * selected.len() as u64,
            first_sequence: first.sequence,
            last_sequence: last.sequence,
        })
    }
}

fn flatten_alpha(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        pixel.0[3] = 255;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn frames(count: usize, width: u32, height: u32) -> Vec<Arc<TimestampedFrame>> {
        (0..count)
            .map(|i| {
                Arc::new(TimestampedFrame {
                    image: RgbaImage::from_pixel(width, height, Rgba([i as u8, 0, 0, 255])),
                    timestamp_ms: i as u64 * 33,
                    sequence: i as u64,
                })
            })
            .collect()
    }

    #[test]
    fn test_subsample_bounds_frame_count() {
        let encoder = ClipEncoder::default();
        let max = encoder.config().max_frames;
        for n in [1usize, 5, 24, 25, 47, 48, 49, 300, 601] {
            let input = frames(n, 1, 1);
            let picked = encoder.subsample(&input);
            assert!(picked.len() <= max, "n={n} picked {}", picked.len());
            assert_eq!(picked[0].sequence, 0);
            if n <= max {
                assert_eq!(picked.len(), n);
            }
        }
    }

    #[test]
    fn test_subsample_uses_uniform_stride() {
        let encoder = ClipEncoder::new(ClipEncoderConfig {
            max_frames: 4,
            ..ClipEncoderConfig::default()
        });
        let input = frames(10, 1, 1);
        let seqs: Vec<u64> = encoder.subsample(&input).iter().map(|f| f.sequence).collect();
        assert_eq!(seqs, vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_nominal_duration_tracks_target() {
        let encoder = ClipEncoder::default();
        let target = encoder.config().target_total_ms as i64;
        for count in 1..=encoder.config().max_frames {
            let playback = encoder.frame_delay_ms(count) as i64 * count as i64;
            // GIF delays round to 10 ms, so each frame may be off by 5 ms.
            assert!(
                (playback - target).abs() <= 5 * count as i64,
                "count={count} playback={playback}"
            );
        }
    }

    #[test]
    fn test_min_frame_delay_applies() {
        let encoder = ClipEncoder::new(ClipEncoderConfig {
            max_frames: 1000,
            target_width: 240,
            min_frame_ms: 50,
            target_total_ms: 2400,
        });
        assert_eq!(encoder.frame_delay_ms(500), 50);
    }

    #[test]
    fn test_target_dimensions_preserve_aspect() {
        let encoder = ClipEncoder::default();
        assert_eq!(encoder.target_dimensions(480, 432), (240, 216));
        assert_eq!(encoder.target_dimensions(160, 144), (160, 144));
        assert_eq!(encoder.target_dimensions(2400, 1), (240, 1));
    }

    #[test]
    fn test_encode_produces_gif() {
        let encoder = ClipEncoder::default();
        let clip = encoder.encode(&frames(60, 320, 288)).unwrap();

        assert!(clip.bytes.starts_with(b"GIF89a"));
        assert!(clip.frame_count <= 24);
        assert_eq!((clip.width, clip.height), (240, 216));
        assert_eq!(clip.first_sequence, 0);
        assert_eq!(clip.playback_ms, clip.frame_delay_ms as u64 * clip.frame_count as u64);
    }

    #[test]
    fn test_encode_empty_is_error() {
        let encoder = ClipEncoder::default();
        assert!(matches!(encoder.encode(&[]), Err(EncodeError::NoFrames)));
    }
}
