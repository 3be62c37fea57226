use image::RgbaImage;

use crate::clock::NowMs;

/// One captured frame. Owned by the ring buffer and handed out as `Arc` snapshots.
#[derive(Debug, Clone)]
pub struct TimestampedFrame {
    pub image: RgbaImage,
    pub timestamp_ms: NowMs,
    pub sequence: u64,
}

impl TimestampedFrame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
