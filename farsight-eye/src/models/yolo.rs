//! YOLO object detection model

use crate::error::VisionError;
use ndarray::{ArrayD, ArrayViewD};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// COCO class names (80 classes)
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Axis-aligned box in pixel coordinates (corners)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box from center coordinates and size, as YOLO heads emit them
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center_x(&self) -> f32 {
        (self.x1 + self.x2) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.y1 + self.y2) / 2.0
    }

    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x1 + dx, self.y1 + dy, self.x2 + dx, self.y2 + dy)
    }

    /// Clamp to `[0, width] x [0, height]`
    pub fn clip(&self, width: f32, height: f32) -> Self {
        Self {
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
            x2: self.x2.clamp(0.0, width),
            y2: self.y2.clamp(0.0, height),
        }
    }

    /// Intersection over union, 0.0 for degenerate boxes
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter_w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let inter_h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = inter_w * inter_h;
        let union = self.area() + other.area() - inter;

        if union <= 0.0 || !union.is_finite() {
            return 0.0;
        }

        let iou = inter / union;
        if iou.is_finite() {
            iou.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// `[cx, cy, w, h]` normalized by the frame size
    pub fn to_xywh_normalized(&self, frame_width: f32, frame_height: f32) -> [f32; 4] {
        [
            self.center_x() / frame_width,
            self.center_y() / frame_height,
            self.width() / frame_width,
            self.height() / frame_height,
        ]
    }
}

/// Detected object
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Read class names, one per line
pub fn load_class_names(path: &Path) -> Result<Vec<String>, VisionError> {
    let content = fs::read_to_string(path)?;
    let names: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    if names.is_empty() {
        return Err(VisionError::Config(format!(
            "Class names file {:?} is empty",
            path
        )));
    }
    Ok(names)
}

pub fn coco_class_names() -> Vec<String> {
    COCO_CLASSES.iter().map(|s| s.to_string()).collect()
}

/// YOLO model for object detection
pub struct YoloModel {
    session: Session,
    input_size: u32,
}

impl YoloModel {
    /// Load an ONNX model
    pub fn new(model_path: &Path, input_size: u32, device: &str) -> Result<Self, VisionError> {
        if !model_path.exists() {
            return Err(VisionError::Model(format!(
                "Model file not found: {:?}",
                model_path
            )));
        }

        let builder = Session::builder()
            .map_err(|e| VisionError::Ort(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| VisionError::Ort(format!("Failed to set optimization level: {}", e)))?;

        let builder = Self::with_device(builder, device)?;

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| VisionError::Ort(format!("Failed to load YOLO model: {}", e)))?;

        info!("YOLO model loaded from {:?} (input {}x{})", model_path, input_size, input_size);

        Ok(Self { session, input_size })
    }

    #[cfg(feature = "cuda")]
    fn with_device(
        builder: ort::session::builder::SessionBuilder,
        device: &str,
    ) -> Result<ort::session::builder::SessionBuilder, VisionError> {
        use ort::execution_providers::CUDAExecutionProvider;

        if device.eq_ignore_ascii_case("cpu") {
            return Ok(builder);
        }

        let device_id: i32 = device
            .split(',')
            .next()
            .and_then(|d| d.trim().parse().ok())
            .ok_or_else(|| VisionError::Config(format!("Invalid CUDA device '{}'", device)))?;

        info!("Using CUDA device {}", device_id);
        builder
            .with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build()])
            .map_err(|e| VisionError::Ort(format!("Failed to register CUDA provider: {}", e)))
    }

    #[cfg(not(feature = "cuda"))]
    fn with_device(
        builder: ort::session::builder::SessionBuilder,
        device: &str,
    ) -> Result<ort::session::builder::SessionBuilder, VisionError> {
        if !device.eq_ignore_ascii_case("cpu") {
            warn!(
                "Device '{}' requested but farsight-eye was built without the `cuda` feature, using CPU",
                device
            );
        }
        Ok(builder)
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    /// Run the network on a `[1, 3, S, S]` tensor and return its first output
    pub fn run(&mut self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, VisionError> {
        let expected = [1, 3, self.input_size as usize, self.input_size as usize];
        if input.shape() != expected {
            return Err(VisionError::Processing(format!(
                "Input shape {:?} does not match model input {:?}",
                input.shape(),
                expected
            )));
        }

        let tensor = TensorRef::from_array_view(input)
            .map_err(|e| VisionError::Ort(format!("Failed to create input tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| VisionError::Ort(format!("YOLO inference failed: {}", e)))?;

        let output: ArrayViewD<f32> = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| VisionError::Ort(format!("Failed to extract output tensor: {}", e)))?;

        debug!("YOLO output shape: {:?}", output.shape());
        Ok(output.into_owned())
    }
}
