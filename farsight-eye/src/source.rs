//! Frame sources: image / video files, webcams and network streams

use crate::error::VisionError;
use opencv::{
    core::Mat,
    imgcodecs,
    prelude::*,
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
        CAP_PROP_FRAME_WIDTH,
    },
};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const IMAGE_EXTENSIONS: &[&str] = &["bmp", "jpg", "jpeg", "png", "tif", "tiff", "dng", "webp", "mpo"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mov", "avi", "mp4", "mpg", "mpeg", "m4v", "wmv", "mkv"];

const STREAM_PREFIXES: &[&str] = &["rtsp://", "rtmp://", "http://", "https://"];
const MAX_READ_FAILURES: u32 = 10;
const DEFAULT_STREAM_FPS: f64 = 30.0;

/// Kind of media file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// A live input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTarget {
    /// Local camera by device index
    Webcam(i32),
    /// Network stream URL
    Url(String),
}

impl StreamTarget {
    fn parse(s: &str) -> Self {
        match s.parse::<i32>() {
            Ok(index) if s.chars().all(|c| c.is_ascii_digit()) => StreamTarget::Webcam(index),
            _ => StreamTarget::Url(s.to_string()),
        }
    }

    pub fn name(&self) -> String {
        match self {
            StreamTarget::Webcam(index) => index.to_string(),
            StreamTarget::Url(url) => url.clone(),
        }
    }
}

/// What a source string refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Streams(Vec<StreamTarget>),
    Files(Vec<MediaFile>),
}

impl SourceSpec {
    pub fn is_live(&self) -> bool {
        matches!(self, SourceSpec::Streams(_))
    }
}

/// True for webcam indices, stream URLs and stream list files
pub fn is_stream_source(source: &str) -> bool {
    let lower = source.to_lowercase();
    (!source.is_empty() && source.chars().all(|c| c.is_ascii_digit()))
        || lower.ends_with(".txt")
        || STREAM_PREFIXES.iter().any(|p| lower.starts_with(p))
}

pub fn media_kind(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Classify a source string
pub fn parse_source(source: &str) -> Result<SourceSpec, VisionError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(VisionError::Source("Source cannot be empty".to_string()));
    }

    if source.to_lowercase().ends_with(".txt") {
        let content = fs::read_to_string(source)?;
        let targets: Vec<StreamTarget> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(StreamTarget::parse)
            .collect();
        if targets.is_empty() {
            return Err(VisionError::Source(format!("No streams listed in {}", source)));
        }
        return Ok(SourceSpec::Streams(targets));
    }

    if is_stream_source(source) {
        return Ok(SourceSpec::Streams(vec![StreamTarget::parse(source)]));
    }

    Ok(SourceSpec::Files(collect_media_files(Path::new(source))?))
}

/// Expand a file or directory into supported media files, sorted by path
pub fn collect_media_files(path: &Path) -> Result<Vec<MediaFile>, VisionError> {
    let candidates: Vec<PathBuf> = if path.is_dir() {
        let mut entries: Vec<PathBuf> = fs::read_dir(path)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        entries.sort();
        entries
    } else if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        return Err(VisionError::Source(format!("{} does not exist", path.display())));
    };

    let files: Vec<MediaFile> = candidates
        .into_iter()
        .filter_map(|p| media_kind(&p).map(|kind| MediaFile { path: p, kind }))
        .collect();

    if files.is_empty() {
        return Err(VisionError::Source(format!(
            "No images or videos found in {}. Supported formats are: images: {:?} videos: {:?}",
            path.display(),
            IMAGE_EXTENSIONS,
            VIDEO_EXTENSIONS
        )));
    }

    Ok(files)
}

/// How a frame was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    Image,
    Video,
    Stream,
}

/// Capture properties of a video or stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMeta {
    pub fps: f64,
    pub width: i32,
    pub height: i32,
    pub total_frames: i64,
}

impl VideoMeta {
    fn from_capture(capture: &VideoCapture) -> Self {
        let fps = capture.get(CAP_PROP_FPS).unwrap_or(0.0);
        Self {
            fps: if fps.is_finite() && fps > 0.0 { fps } else { DEFAULT_STREAM_FPS },
            width: capture.get(CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as i32,
            height: capture.get(CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as i32,
            total_frames: capture.get(CAP_PROP_FRAME_COUNT).unwrap_or(0.0) as i64,
        }
    }
}

/// One decoded frame
pub struct Frame {
    /// File path, webcam index or stream URL
    pub source_name: String,
    pub image: Mat,
    /// Frame number within a video, or iteration count for streams
    pub index: u64,
    pub mode: FrameMode,
    pub meta: Option<VideoMeta>,
}

struct OpenVideo {
    file: PathBuf,
    capture: VideoCapture,
    meta: VideoMeta,
    frame_no: u64,
}

enum SourceState {
    Files {
        files: Vec<MediaFile>,
        next: usize,
        video: Option<OpenVideo>,
    },
    Streams {
        readers: Vec<StreamReader>,
        count: u64,
    },
}

/// Iterator over batches of frames
///
/// File sources yield one frame per batch; stream sources yield the
/// latest frame of every stream.
pub struct MediaSource {
    state: SourceState,
}

impl MediaSource {
    pub fn open(source: &str) -> Result<Self, VisionError> {
        Self::from_spec(parse_source(source)?)
    }

    pub fn from_spec(spec: SourceSpec) -> Result<Self, VisionError> {
        let state = match spec {
            SourceSpec::Files(files) => {
                info!("Opened {} media file(s)", files.len());
                SourceState::Files { files, next: 0, video: None }
            }
            SourceSpec::Streams(targets) => {
                let readers = targets
                    .iter()
                    .map(StreamReader::open)
                    .collect::<Result<Vec<_>, _>>()?;
                SourceState::Streams { readers, count: 0 }
            }
        };
        Ok(Self { state })
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state, SourceState::Streams { .. })
    }

    /// Stop every capture thread
    pub fn stop(&mut self) {
        if let SourceState::Streams { readers, .. } = &mut self.state {
            for reader in readers.iter_mut() {
                reader.stop();
            }
        }
    }

    fn next_file_batch(
        files: &[MediaFile],
        next: &mut usize,
        video: &mut Option<OpenVideo>,
    ) -> Option<Result<Vec<Frame>, VisionError>> {
        loop {
            if let Some(open) = video.as_mut() {
                let mut image = Mat::default();
                match open.capture.read(&mut image) {
                    Ok(true) if !image.empty() => {
                        open.frame_no += 1;
                        return Some(Ok(vec![Frame {
                            source_name: open.file.to_string_lossy().into_owned(),
                            image,
                            index: open.frame_no,
                            mode: FrameMode::Video,
                            meta: Some(open.meta),
                        }]));
                    }
                    Ok(_) => {
                        debug!("Finished video {:?} after {} frames", open.file, open.frame_no);
                        *video = None;
                    }
                    Err(e) => {
                        let file = open.file.clone();
                        *video = None;
                        return Some(Err(VisionError::Source(format!(
                            "Failed to read {:?}: {}",
                            file, e
                        ))));
                    }
                }
            }

            let file = files.get(*next)?.clone();
            *next += 1;

            match file.kind {
                MediaKind::Image => {
                    let path = file.path.to_string_lossy().into_owned();
                    return Some(
                        imgcodecs::imread(&path, imgcodecs::IMREAD_COLOR)
                            .map_err(VisionError::from)
                            .and_then(|image| {
                                if image.empty() {
                                    Err(VisionError::Source(format!("Image not found {}", path)))
                                } else {
                                    Ok(vec![Frame {
                                        source_name: path,
                                        image,
                                        index: 0,
                                        mode: FrameMode::Image,
                                        meta: None,
                                    }])
                                }
                            }),
                    );
                }
                MediaKind::Video => match open_video(&file.path) {
                    Ok(open) => *video = Some(open),
                    Err(e) => return Some(Err(e)),
                },
            }
        }
    }
}

fn open_video(path: &Path) -> Result<OpenVideo, VisionError> {
    let capture = VideoCapture::from_file(&path.to_string_lossy(), CAP_ANY)
        .map_err(|e| VisionError::Source(format!("Failed to open video {:?}: {}", path, e)))?;
    if !capture.is_opened()? {
        return Err(VisionError::Source(format!("Failed to open video {:?}", path)));
    }
    let meta = VideoMeta::from_capture(&capture);
    info!(
        "Video {:?}: {}x{} @ {:.1}fps, {} frames",
        path, meta.width, meta.height, meta.fps, meta.total_frames
    );
    Ok(OpenVideo {
        file: path.to_path_buf(),
        capture,
        meta,
        frame_no: 0,
    })
}

impl Iterator for MediaSource {
    type Item = Result<Vec<Frame>, VisionError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.state {
            SourceState::Files { files, next, video } => Self::next_file_batch(files, next, video),
            SourceState::Streams { readers, count } => {
                if readers.iter().any(|r| !r.is_running()) {
                    info!("A stream ended, stopping");
                    return None;
                }
                *count += 1;
                let mut batch = Vec::with_capacity(readers.len());
                for reader in readers.iter() {
                    match reader.latest() {
                        Ok(image) => batch.push(Frame {
                            source_name: reader.name.clone(),
                            image,
                            index: *count,
                            mode: FrameMode::Stream,
                            meta: Some(reader.meta),
                        }),
                        Err(e) => return Some(Err(e)),
                    }
                }
                Some(Ok(batch))
            }
        }
    }
}

impl Drop for MediaSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Background capture of one live stream, keeping only the newest frame
pub struct StreamReader {
    name: String,
    meta: VideoMeta,
    latest: Arc<Mutex<Mat>>,
    is_running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamReader {
    /// Open the stream and read its first frame before returning
    pub fn open(target: &StreamTarget) -> Result<Self, VisionError> {
        let name = target.name();
        let mut capture = match target {
            StreamTarget::Webcam(index) => VideoCapture::new(*index, CAP_ANY),
            StreamTarget::Url(url) => VideoCapture::from_file(url, CAP_ANY),
        }
        .map_err(|e| VisionError::Source(format!("Failed to open {}: {}", name, e)))?;

        if !capture
            .is_opened()
            .map_err(|e| VisionError::Source(format!("{} not opened: {}", name, e)))?
        {
            return Err(VisionError::Source(format!("Failed to open {}", name)));
        }

        let meta = VideoMeta::from_capture(&capture);

        let mut first = Mat::default();
        if !capture.read(&mut first)? || first.empty() {
            return Err(VisionError::Source(format!("Failed to read first frame from {}", name)));
        }
        info!("Stream {} opened at {}x{} @ {:.1}fps", name, meta.width, meta.height, meta.fps);

        let latest = Arc::new(Mutex::new(first));
        let is_running = Arc::new(AtomicBool::new(true));

        let handle = {
            let latest = latest.clone();
            let is_running = is_running.clone();
            let name = name.clone();
            std::thread::Builder::new()
                .name(format!("capture-{}", name))
                .spawn(move || capture_loop(capture, name, latest, is_running))
                .map_err(VisionError::Io)?
        };

        Ok(Self {
            name,
            meta,
            latest,
            is_running,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Copy of the newest frame
    pub fn latest(&self) -> Result<Mat, VisionError> {
        Ok(self.latest.lock().try_clone()?)
    }

    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Capture thread for {} panicked", self.name);
            }
            info!("Stream {} stopped", self.name);
        }
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    mut capture: VideoCapture,
    name: String,
    latest: Arc<Mutex<Mat>>,
    is_running: Arc<AtomicBool>,
) {
    let mut failures = 0u32;

    while is_running.load(Ordering::Acquire) {
        let mut frame = Mat::default();
        match capture.read(&mut frame) {
            Ok(true) if !frame.empty() => {
                failures = 0;
                *latest.lock() = frame;
            }
            result => {
                failures += 1;
                if let Err(e) = result {
                    error!("Stream {} read error: {}", name, e);
                }
                if failures > MAX_READ_FAILURES {
                    error!("Too many read errors on {} ({}), stopping stream", name, failures);
                    break;
                }
                // Exponential backoff: 100ms, 200ms, 400ms, ... max 3.2s
                let backoff_ms = 100u64 << failures.min(5);
                std::thread::sleep(Duration::from_millis(backoff_ms));
            }
        }
    }

    is_running.store(false, Ordering::Release);
    let _ = capture.release();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_stream_source() {
        assert!(is_stream_source("0"));
        assert!(is_stream_source("12"));
        assert!(is_stream_source("rtsp://camera/live"));
        assert!(is_stream_source("HTTP://192.168.100.224:8080/video"));
        assert!(is_stream_source("streams.txt"));
        assert!(!is_stream_source("ref/50.jpg"));
        assert!(!is_stream_source("videos"));
        assert!(!is_stream_source(""));
    }

    #[test]
    fn test_media_kind() {
        assert_eq!(media_kind(Path::new("a/b.JPG")), Some(MediaKind::Image));
        assert_eq!(media_kind(Path::new("clip.mp4")), Some(MediaKind::Video));
        assert_eq!(media_kind(Path::new("notes.md")), None);
        assert_eq!(media_kind(Path::new("noext")), None);
    }

    #[test]
    fn test_parse_webcam_and_url() {
        assert_eq!(
            parse_source("0").unwrap(),
            SourceSpec::Streams(vec![StreamTarget::Webcam(0)])
        );
        assert_eq!(
            parse_source("http://192.168.100.224:8080/video").unwrap(),
            SourceSpec::Streams(vec![StreamTarget::Url(
                "http://192.168.100.224:8080/video".to_string()
            )])
        );
    }

    #[test]
    fn test_parse_stream_list() {
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("streams.txt");
        fs::write(&list, "0\n\nrtsp://cam/1\n").unwrap();
        let spec = parse_source(&list.to_string_lossy()).unwrap();
        assert_eq!(
            spec,
            SourceSpec::Streams(vec![
                StreamTarget::Webcam(0),
                StreamTarget::Url("rtsp://cam/1".to_string()),
            ])
        );
        assert!(spec.is_live());
    }

    #[test]
    fn test_parse_directory_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for name in ["b.png", "a.jpg", "clip.mp4", "readme.md"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let spec = parse_source(&dir.path().to_string_lossy()).unwrap();
        let SourceSpec::Files(files) = spec else {
            panic!("expected files");
        };
        let names: Vec<String> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "clip.mp4"]);
        assert_eq!(files[2].kind, MediaKind::Video);
    }

    #[test]
    fn test_parse_missing_or_empty() {
        assert!(parse_source("").is_err());
        assert!(parse_source("/definitely/not/here.jpg").is_err());

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.md"), b"x").unwrap();
        assert!(parse_source(&dir.path().to_string_lossy()).is_err());
    }

    #[test]
    fn test_stream_target_name() {
        assert_eq!(StreamTarget::Webcam(2).name(), "2");
        assert_eq!(StreamTarget::Url("rtsp://x/y".into()).name(), "rtsp://x/y");
    }
}
