// farsight command line

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use farsight_cli::calibrate::{calibrate_targets, calibration_output, calibration_vision, load_or_calibrate};
use farsight_cli::{FarsightConfig, Runner};
use farsight_eye::{DetectionPipeline, ModelManager, VisionConfig};
use farsight_spk::engines::create_engine;
use farsight_spk::Speaker;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "farsight")]
#[command(about = "Spoken obstacle warnings from a camera, video or images", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON, TOML or YAML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect, range and announce objects from a source
    Run(RunArgs),

    /// Measure the reference photographs and save the focal lengths
    Calibrate {
        /// Where to write the calibration (defaults to ranging.calibration_file,
        /// then calibration.json)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Download the default detector model
    FetchModel,

    /// List the voices the speech engine offers
    Voices,

    /// Speak a sentence and exit
    Say {
        /// Text to speak
        text: String,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// File, directory, webcam index, URL or .txt list of streams
    #[arg(long)]
    source: Option<String>,

    /// ONNX model path
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Inference size (pixels)
    #[arg(long)]
    img_size: Option<u32>,

    /// Object confidence threshold
    #[arg(long)]
    conf_thres: Option<f32>,

    /// IoU threshold for NMS
    #[arg(long)]
    iou_thres: Option<f32>,

    /// cpu, or a CUDA device index such as 0
    #[arg(long)]
    device: Option<String>,

    /// Display results
    #[arg(long)]
    view_img: bool,

    /// Save results to *.txt
    #[arg(long)]
    save_txt: bool,

    /// Save confidences in --save-txt labels
    #[arg(long)]
    save_conf: bool,

    /// Do not save images/videos
    #[arg(long)]
    nosave: bool,

    /// Filter by class: --classes 0 or --classes 0 16
    #[arg(long, num_args = 1..)]
    classes: Option<Vec<usize>>,

    /// Class-agnostic NMS
    #[arg(long)]
    agnostic_nms: bool,

    /// Save results to project/name
    #[arg(long)]
    project: Option<PathBuf>,

    /// Save results to project/name
    #[arg(long)]
    name: Option<String>,

    /// Existing project/name ok, do not increment
    #[arg(long)]
    exist_ok: bool,

    /// Saved calibration to use (created if missing)
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Model used to measure the reference photographs
    #[arg(long)]
    calibration_weights: Option<PathBuf>,

    /// Do not speak warnings
    #[arg(long)]
    no_speech: bool,

    /// Bounding box thickness (pixels)
    #[arg(long)]
    line_thickness: Option<i32>,
}

impl RunArgs {
    fn apply(self, config: &mut FarsightConfig) {
        if let Some(source) = self.source {
            config.source = source;
        }
        if let Some(weights) = self.weights {
            config.vision.weights = weights;
        }
        if let Some(img_size) = self.img_size {
            config.vision.img_size = img_size;
        }
        if let Some(conf) = self.conf_thres {
            config.vision.conf_thres = conf;
        }
        if let Some(iou) = self.iou_thres {
            config.vision.iou_thres = iou;
        }
        if let Some(device) = self.device {
            config.vision.device = device;
        }
        if self.classes.is_some() {
            config.vision.classes = self.classes;
        }
        config.vision.agnostic_nms |= self.agnostic_nms;

        let output = &mut config.output;
        output.view_img |= self.view_img;
        output.save_txt |= self.save_txt;
        output.save_conf |= self.save_conf;
        output.exist_ok |= self.exist_ok;
        if self.nosave {
            output.save_img = false;
        }
        if let Some(project) = self.project {
            output.project = project;
        }
        if let Some(name) = self.name {
            output.name = name;
        }
        if self.line_thickness.is_some() {
            output.line_thickness = self.line_thickness;
        }

        if let Some(file) = self.calibration {
            config.ranging.calibration_file = Some(file);
        }
        if let Some(weights) = self.calibration_weights {
            config.ranging.calibration_weights = Some(weights);
        }
        if self.no_speech {
            config.speech.enabled = false;
        }
    }
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<FarsightConfig> {
    let mut config = match cli.config {
        Some(ref path) => FarsightConfig::from_file(path)?,
        None => FarsightConfig::default(),
    };
    config.apply_env();
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.log_json {
        config.logging.json = true;
    }
    Ok(config)
}

fn open_pipeline(vision: &VisionConfig) -> anyhow::Result<DetectionPipeline> {
    let weights = &vision.weights;
    if !weights.exists() {
        bail!(
            "Model weights not found at {:?}; run `farsight fetch-model` or pass --weights",
            weights
        );
    }
    DetectionPipeline::new(Arc::new(vision.clone()))
        .with_context(|| format!("Failed to load detector {:?}", weights))
}

fn open_speaker(config: &FarsightConfig) -> Option<Speaker> {
    if !config.speech.enabled {
        info!("Speech disabled");
        return None;
    }
    match Speaker::new(&config.speech) {
        Ok(speaker) => {
            info!("Speaking with the {} engine", speaker.engine_name());
            Some(speaker)
        }
        Err(e) => {
            warn!("Continuing without speech: {}", e);
            None
        }
    }
}

fn run(config: FarsightConfig) -> anyhow::Result<()> {
    let mut pipeline = open_pipeline(&config.vision)?;
    let calibration = load_or_calibrate(&mut pipeline, &config.vision, &config.ranging)?;
    let speaker = open_speaker(&config);

    let mut runner = Runner::new(config, pipeline, calibration, speaker);
    let stats = runner.run()?;
    info!(
        "{} frames, {} detections, {} warnings ({} spoken)",
        stats.frames, stats.detections, stats.warnings, stats.announced
    );
    Ok(())
}

fn calibrate(config: FarsightConfig, output: Option<PathBuf>) -> anyhow::Result<()> {
    let vision = calibration_vision(&config.vision, &config.ranging).unwrap_or_else(|| config.vision.clone());
    let mut pipeline = open_pipeline(&vision)?;
    let calibration = calibrate_targets(&mut pipeline, &config.ranging.targets)?;
    let output = calibration_output(output, &config.ranging);
    calibration.save(&output)?;
    for (class_name, focal) in &calibration.focal_lengths {
        println!("{}: {:.2}px", class_name, focal.focal_px);
    }
    Ok(())
}

async fn fetch_model(config: FarsightConfig) -> anyhow::Result<()> {
    let manager = ModelManager::new(Arc::new(config.vision));
    let path = manager.get_yolo_model().await?;
    println!("{}", path.display());
    Ok(())
}

async fn voices(config: FarsightConfig) -> anyhow::Result<()> {
    let engine = create_engine(&config.speech)?;
    if !engine.is_available() {
        bail!("The {} speech engine is not available", engine.name());
    }
    for voice in engine.list_voices().await? {
        println!("{}", voice);
    }
    Ok(())
}

async fn say(config: FarsightConfig, text: &str) -> anyhow::Result<()> {
    let engine = create_engine(&config.speech)?;
    let speaker = Speaker::with_engine(engine, config.speech.voice.clone())?;
    speaker.speak_now(text).await?;
    Ok(())
}

fn prepare(config: &FarsightConfig) -> anyhow::Result<()> {
    config.validate()?;
    init_logging(&config.logging.level, config.logging.json);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Run(args) => {
            args.apply(&mut config);
            prepare(&config)?;
            // highgui needs the thread that opened the window
            tokio::task::block_in_place(|| run(config))?;
        }
        Commands::Calibrate { output } => {
            prepare(&config)?;
            calibrate(config, output)?;
        }
        Commands::FetchModel => {
            prepare(&config)?;
            fetch_model(config).await?;
        }
        Commands::Voices => {
            prepare(&config)?;
            voices(config).await?;
        }
        Commands::Say { text } => {
            prepare(&config)?;
            say(config, &text).await?;
        }
    }

    Ok(())
}
