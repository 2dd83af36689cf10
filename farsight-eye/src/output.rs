//! Run directories, label files and annotated result saving

use crate::config::OutputConfig;
use crate::error::VisionError;
use crate::models::Detection;
use crate::source::{Frame, FrameMode};
use opencv::{
    core::{Mat, Size, Vector},
    imgcodecs,
    prelude::*,
    videoio::VideoWriter,
};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const STREAM_SAVE_FPS: f64 = 30.0;

/// `path` if it is free (or `exist_ok`), otherwise `path2`, `path3`, ...
/// one past the highest existing suffix
pub fn increment_path(path: &Path, exist_ok: bool) -> PathBuf {
    if !path.exists() || exist_ok {
        return path.to_path_buf();
    }

    let stem = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));

    let highest = fs::read_dir(parent)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| {
                    let name = e.file_name().to_string_lossy().into_owned();
                    let suffix = name.strip_prefix(&stem)?;
                    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
                        return None;
                    }
                    suffix.parse::<u32>().ok()
                })
                .max()
        })
        .ok()
        .flatten();

    let n = highest.map(|h| h + 1).unwrap_or(2);
    path.with_file_name(format!("{}{}", stem, n))
}

/// Directory holding the results of one run
#[derive(Debug, Clone)]
pub struct RunDirectory {
    root: PathBuf,
    labels: Option<PathBuf>,
}

impl RunDirectory {
    pub fn create(config: &OutputConfig) -> Result<Self, VisionError> {
        config.validate().map_err(VisionError::Config)?;

        let root = increment_path(&config.project.join(&config.name), config.exist_ok);
        let labels = config.save_txt.then(|| root.join("labels"));
        fs::create_dir_all(labels.as_ref().unwrap_or(&root))?;

        debug!("Run directory {:?}", root);
        Ok(Self { root, labels })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn labels_dir(&self) -> Option<&Path> {
        self.labels.as_deref()
    }

    /// Where the annotated copy of `source_name` goes
    pub fn save_path(&self, source_name: &str) -> PathBuf {
        let name = Path::new(source_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "stream".to_string());
        self.root.join(name)
    }

    /// Label file for a frame, when labels are being saved
    pub fn label_path(&self, source_name: &str, mode: FrameMode, index: u64) -> Option<PathBuf> {
        let labels = self.labels.as_ref()?;
        let stem = Path::new(source_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "stream".to_string());
        let file = match mode {
            FrameMode::Image => format!("{}.txt", stem),
            FrameMode::Video | FrameMode::Stream => format!("{}_{}.txt", stem, index),
        };
        Some(labels.join(file))
    }

    /// Number of label files written so far
    pub fn label_count(&self) -> usize {
        self.labels
            .as_ref()
            .and_then(|dir| fs::read_dir(dir).ok())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().is_some_and(|x| x == "txt"))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Closing line printed when a run finishes
    pub fn summary(&self) -> String {
        match &self.labels {
            Some(labels) => format!(
                "Results saved to {}\n{} labels saved to {}",
                self.root.display(),
                self.label_count(),
                labels.display()
            ),
            None => format!("Results saved to {}", self.root.display()),
        }
    }
}

/// Shortest decimal with at most six significant digits
fn format_g(value: f32) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).max(0) as usize;
    let s = format!("{:.*}", decimals, value);
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// `class cx cy w h [conf]`, box normalized to the frame
pub fn label_line(detection: &Detection, frame_width: f32, frame_height: f32, save_conf: bool) -> String {
    let [cx, cy, w, h] = detection.bbox.to_xywh_normalized(frame_width, frame_height);
    let mut fields = vec![
        detection.class_id.to_string(),
        format_g(cx),
        format_g(cy),
        format_g(w),
        format_g(h),
    ];
    if save_conf {
        fields.push(format_g(detection.confidence));
    }
    fields.join(" ")
}

/// Append one line per detection to `path`
pub fn write_labels(
    path: &Path,
    detections: &[Detection],
    frame_width: f32,
    frame_height: f32,
    save_conf: bool,
) -> Result<(), VisionError> {
    if detections.is_empty() {
        return Ok(());
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for detection in detections {
        writeln!(file, "{}", label_line(detection, frame_width, frame_height, save_conf))?;
    }
    Ok(())
}

/// Writes annotated images, and annotated videos frame by frame
///
/// Videos from files are written one at a time; each live stream keeps
/// its own writer.
#[derive(Default)]
pub struct ResultSaver {
    writers: HashMap<PathBuf, VideoWriter>,
}

impl ResultSaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save an annotated frame; returns the file it went to
    pub fn save(&mut self, run: &RunDirectory, frame: &Frame, annotated: &Mat) -> Result<PathBuf, VisionError> {
        let save_path = run.save_path(&frame.source_name);

        if frame.mode == FrameMode::Image {
            let ok = imgcodecs::imwrite(&save_path.to_string_lossy(), annotated, &Vector::new())?;
            if !ok {
                return Err(VisionError::Output(format!("Failed to write image {:?}", save_path)));
            }
            return Ok(save_path);
        }

        let target = writer_path(&save_path, frame.mode);
        if !self.writers.contains_key(&target) {
            if frame.mode == FrameMode::Video {
                self.finish()?;
            }
            let writer = open_writer(&target, frame, annotated)?;
            self.writers.insert(target.clone(), writer);
        }

        let writer = self
            .writers
            .get_mut(&target)
            .ok_or_else(|| VisionError::Output(format!("No video writer for {:?}", target)))?;
        writer.write(annotated)?;

        Ok(target)
    }

    /// Release every open video writer
    pub fn finish(&mut self) -> Result<(), VisionError> {
        for (_, mut writer) in self.writers.drain() {
            writer.release()?;
        }
        Ok(())
    }
}

impl Drop for ResultSaver {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

fn open_writer(path: &Path, frame: &Frame, annotated: &Mat) -> Result<VideoWriter, VisionError> {
    let (fps, size) = match (frame.mode, frame.meta) {
        (FrameMode::Video, Some(meta)) if meta.width > 0 && meta.height > 0 => {
            (meta.fps, Size::new(meta.width, meta.height))
        }
        _ => (STREAM_SAVE_FPS, Size::new(annotated.cols(), annotated.rows())),
    };
    let name = path.to_string_lossy();
    let mut writer = VideoWriter::new(&name, VideoWriter::fourcc('m', 'p', '4', 'v')?, fps, size, true)?;
    if !writer.is_opened()? {
        // OpenCV builds without FFmpeg only ship the Motion JPEG encoder
        warn!("mp4v encoder unavailable for {:?}, writing MJPG", path);
        writer = VideoWriter::new(&name, VideoWriter::fourcc('M', 'J', 'P', 'G')?, fps, size, true)?;
    }
    if !writer.is_opened()? {
        return Err(VisionError::Output(format!("Failed to open video writer {:?}", path)));
    }

    info!("Writing {:?} at {}x{} @ {:.1}fps", path, size.width, size.height, fps);
    Ok(writer)
}

fn writer_path(save_path: &Path, mode: FrameMode) -> PathBuf {
    match mode {
        FrameMode::Stream => {
            let mut path = save_path.as_os_str().to_owned();
            path.push(".mp4");
            PathBuf::from(path)
        }
        _ => save_path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;
    use tempfile::TempDir;

    fn detection() -> Detection {
        Detection {
            class_id: 16,
            class_name: "dog".to_string(),
            confidence: 0.87654321,
            bbox: BoundingBox::new(160.0, 120.0, 480.0, 360.0),
        }
    }

    #[test]
    fn test_format_g() {
        assert_eq!(format_g(0.5), "0.5");
        assert_eq!(format_g(0.0), "0");
        assert_eq!(format_g(0.123456789), "0.123457");
        assert_eq!(format_g(1.0), "1");
        assert_eq!(format_g(0.0015), "0.0015");
    }

    #[test]
    fn test_label_line() {
        assert_eq!(label_line(&detection(), 640.0, 480.0, false), "16 0.5 0.5 0.5 0.5");
        assert_eq!(
            label_line(&detection(), 640.0, 480.0, true),
            "16 0.5 0.5 0.5 0.5 0.876543"
        );
    }

    #[test]
    fn test_increment_path() {
        let dir = TempDir::new().unwrap();
        let exp = dir.path().join("exp");
        assert_eq!(increment_path(&exp, false), exp);

        fs::create_dir(&exp).unwrap();
        assert_eq!(increment_path(&exp, false), dir.path().join("exp2"));
        assert_eq!(increment_path(&exp, true), exp);

        fs::create_dir(dir.path().join("exp2")).unwrap();
        fs::create_dir(dir.path().join("exp7")).unwrap();
        fs::create_dir(dir.path().join("expert")).unwrap();
        assert_eq!(increment_path(&exp, false), dir.path().join("exp8"));
    }

    #[test]
    fn test_writer_path() {
        assert_eq!(
            writer_path(Path::new("runs/exp/video"), FrameMode::Stream),
            PathBuf::from("runs/exp/video.mp4")
        );
        assert_eq!(
            writer_path(Path::new("runs/exp/clip.mp4"), FrameMode::Video),
            PathBuf::from("runs/exp/clip.mp4")
        );
    }
}
