use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::error::{EnvError, Result};

/// Receives frames rendered in `human` mode.
pub trait DisplaySink: Send {
    fn show(&mut self, frame: &RgbImage) -> Result<()>;

    /// Called once when the environment closes.
    fn close(&mut self) {}
}

/// Writes each frame as `frame_00000.png`, `frame_00001.png`, ... into a directory.
pub struct PngSequenceSink {
    dir: PathBuf,
    next_index: usize,
}

impl PngSequenceSink {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| EnvError::Io {
            path: dir.clone(),
            source,
        })?;
        log::info!("writing frames to {}", dir.display());
        Ok(Self { dir, next_index: 0 })
    }

    pub fn frames_written(&self) -> usize {
        self.next_index
    }
}

impl DisplaySink for PngSequenceSink {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        let path = self.dir.join(format!("frame_{:05}.png", self.next_index));
        frame
            .save(&path)
            .map_err(|source| EnvError::Frame { path, source })?;
        self.next_index += 1;
        Ok(())
    }

    fn close(&mut self) {
        log::debug!(
            "frame sink closed after {} frames in {}",
            self.next_index,
            self.dir.display()
        );
    }
}
