use super::memory::MemorySurface;
use super::r#trait::{DisplayFrame, DisplaySurface};
use crate::error::Result;
use crate::scope_error;
use crate::types::PixelLayout;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Memory surface that also dumps the latest composite to a PNG file, rate limited.
pub struct SnapshotSurface {
    inner: MemorySurface,
    path: PathBuf,
    interval: Duration,
    last_write: Mutex<Option<Instant>>,
}

impl SnapshotSurface {
    pub fn new(inner: MemorySurface, path: PathBuf, interval: Duration) -> Self {
        Self {
            inner,
            path,
            interval,
            last_write: Mutex::new(None),
        }
    }

    fn due(&self) -> bool {
        let mut last = self.last_write.lock();
        match *last {
            Some(at) if at.elapsed() < self.interval => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }

    fn write_png(&self, frame: &DisplayFrame) -> Result<()> {
        let rgba = frame.image.to_rgba()?;
        rgba.save(&self.path)
            .map_err(|e| scope_error!(render, "failed to write snapshot {:?}: {}", self.path, e))?;
        debug!("Snapshot #{} written to {:?}", frame.sequence, self.path);
        Ok(())
    }
}

impl DisplaySurface for SnapshotSurface {
    fn size(&self) -> (u32, u32) {
        self.inner.size()
    }

    fn layout(&self) -> PixelLayout {
        self.inner.layout()
    }

    fn present(&self, frame: Arc<DisplayFrame>) -> Result<()> {
        let write = self.due();
        self.inner.present(Arc::clone(&frame))?;
        if write {
            self.write_png(&frame)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Frame;

    #[test]
    fn writes_png_at_most_once_per_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("composite.png");
        let surface = SnapshotSurface::new(
            MemorySurface::new(4, 4, PixelLayout::Bgra8),
            path.clone(),
            Duration::from_secs(3600),
        );

        let frame = |sequence| {
            Arc::new(DisplayFrame {
                image: Frame::new(2, 1, PixelLayout::Bgra8, vec![0, 0, 255, 255, 0, 255, 0, 255])
                    .unwrap(),
                offset_x: 1,
                offset_y: 1,
                sequence,
            })
        };

        surface.present(frame(1)).unwrap();
        let written = std::fs::metadata(&path).unwrap().modified().unwrap();
        surface.present(frame(2)).unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), written);
        let png = image::open(&path).unwrap().to_rgba8();
        assert_eq!(png.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(surface.inner.current().unwrap().sequence, 2);
    }
}
