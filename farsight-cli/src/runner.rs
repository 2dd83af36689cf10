//! The detection loop: detect, range, warn, draw, show and save

use crate::config::FarsightConfig;
use anyhow::Result;
use farsight_core::{compose_warning, position_in_frame, AlertConfig, Calibration, Position, Proximity, Sighting};
use farsight_eye::output::write_labels;
use farsight_eye::overlay::{draw_box, Color, GREEN, RED};
use farsight_eye::{summarize, Detection, DetectionPipeline, Frame, MediaSource, Palette, ResultSaver, RunDirectory};
use farsight_spk::Speaker;
use opencv::core::Mat;
use opencv::{highgui, prelude::*};
use std::time::Instant;
use tracing::{debug, info, warn};

const QUIT_KEY: i32 = 'q' as i32;

/// One detection placed relative to the viewer
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub detection: Detection,
    pub position: Position,
    /// `None` when the class was never calibrated
    pub distance_m: Option<f32>,
    pub proximity: Option<Proximity>,
}

impl Assessment {
    /// Box label, with the distance when there is one
    pub fn label(&self) -> String {
        let d = &self.detection;
        match self.distance_m {
            Some(distance) => format!("{} {:.2} {:.2} meters", d.class_name, d.confidence, distance),
            None => format!("{} {:.2}", d.class_name, d.confidence),
        }
    }

    /// Box color; `None` for ranged objects that are far enough away to ignore
    pub fn color(&self, palette: &Palette) -> Option<Color> {
        match self.proximity {
            Some(Proximity::Danger) => Some(RED),
            Some(Proximity::Warning) => Some(GREEN),
            Some(Proximity::Clear) => None,
            None => Some(palette.color(self.detection.class_id)),
        }
    }
}

/// Work out position, distance and proximity of every detection
pub fn assess(
    detections: &[Detection],
    frame_width: f32,
    calibration: &Calibration,
    margin_px: f32,
    alert: &AlertConfig,
) -> Vec<Assessment> {
    detections
        .iter()
        .map(|d| {
            let distance_m = calibration.distance_m(&d.class_name, d.bbox.width());
            Assessment {
                detection: d.clone(),
                position: position_in_frame(d.bbox.center_x(), frame_width, margin_px),
                distance_m,
                proximity: distance_m.map(|m| alert.classify(m)),
            }
        })
        .collect()
}

/// Sentence to speak for this frame, if anything is dangerously close
pub fn warning_for(assessments: &[Assessment], alert: &AlertConfig) -> Option<String> {
    let sightings: Vec<Sighting> = assessments
        .iter()
        .filter_map(|a| {
            a.distance_m
                .map(|m| Sighting::new(a.detection.class_name.clone(), m, a.position))
        })
        .collect();
    compose_warning(&sightings, alert)
}

/// Draw every assessment that has a color
pub fn annotate(
    image: &mut Mat,
    assessments: &[Assessment],
    palette: &Palette,
    line_thickness: Option<i32>,
) -> Result<()> {
    for assessment in assessments {
        if let Some(color) = assessment.color(palette) {
            let label = assessment.label();
            draw_box(image, &assessment.detection.bbox, color, Some(&label), line_thickness)?;
        }
    }
    Ok(())
}

/// Totals for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames: u64,
    pub detections: u64,
    pub warnings: u64,
    pub announced: u64,
}

pub struct Runner {
    config: FarsightConfig,
    pipeline: DetectionPipeline,
    calibration: Calibration,
    speaker: Option<Speaker>,
    palette: Palette,
}

impl Runner {
    pub fn new(
        config: FarsightConfig,
        pipeline: DetectionPipeline,
        calibration: Calibration,
        speaker: Option<Speaker>,
    ) -> Self {
        let palette = Palette::random(pipeline.class_names().len());
        Self {
            config,
            pipeline,
            calibration,
            speaker,
            palette,
        }
    }

    /// Process the configured source until it ends or `q` is pressed
    pub fn run(&mut self) -> Result<RunStats> {
        let started = Instant::now();
        let mut source = MediaSource::open(&self.config.source)?;
        let live = source.is_live();

        let output = &self.config.output;
        let save_img = output.save_img && !self.config.source.to_lowercase().ends_with(".txt");
        let run_dir = if save_img || output.save_txt {
            Some(RunDirectory::create(output)?)
        } else {
            None
        };
        let mut view = output.view_img || live;
        let mut saver = ResultSaver::new();
        let mut stats = RunStats::default();

        'frames: for batch in source.by_ref() {
            let batch = match batch {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };

            for (i, frame) in batch.iter().enumerate() {
                let (annotated, detections) = self.process_frame(frame, run_dir.as_ref(), &mut stats)?;
                debug!(
                    "{}: {} {}x{} {}",
                    i,
                    frame.source_name,
                    frame.image.cols(),
                    frame.image.rows(),
                    summarize(&detections)
                );

                if view {
                    match show(&frame.source_name, &annotated) {
                        Ok(true) => {
                            info!("Quit requested");
                            break 'frames;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            warn!("Cannot display frames, disabling view: {}", e);
                            view = false;
                        }
                    }
                }

                if save_img {
                    if let Some(run) = run_dir.as_ref() {
                        saver.save(run, frame, &annotated)?;
                    }
                }
            }
        }

        source.stop();
        saver.finish()?;
        if view {
            let _ = highgui::destroy_all_windows();
        }

        if let Some(run) = run_dir.as_ref() {
            info!("{}", run.summary());
        }
        info!("Done. ({:.3}s)", started.elapsed().as_secs_f64());
        Ok(stats)
    }

    fn process_frame(
        &mut self,
        frame: &Frame,
        run_dir: Option<&RunDirectory>,
        stats: &mut RunStats,
    ) -> Result<(Mat, Vec<Detection>)> {
        let detections = self.pipeline.detect(&frame.image)?;
        let (width, height) = (frame.image.cols() as f32, frame.image.rows() as f32);
        stats.frames += 1;
        stats.detections += detections.len() as u64;

        if let Some(path) = run_dir.and_then(|r| r.label_path(&frame.source_name, frame.mode, frame.index)) {
            write_labels(&path, &detections, width, height, self.config.output.save_conf)?;
        }

        let assessments = assess(
            &detections,
            width,
            &self.calibration,
            self.config.ranging.position_margin_px,
            &self.config.alert,
        );

        let mut annotated = frame.image.try_clone()?;
        annotate(&mut annotated, &assessments, &self.palette, self.config.output.line_thickness)?;

        if let Some(warning) = warning_for(&assessments, &self.config.alert) {
            stats.warnings += 1;
            info!("Speech: {}", warning);
            if self.speaker.as_ref().is_some_and(|s| s.announce(&warning)) {
                stats.announced += 1;
            }
        }

        Ok((annotated, detections))
    }
}

/// Show a frame; `Ok(true)` when the quit key was pressed
fn show(window: &str, image: &Mat) -> Result<bool> {
    highgui::imshow(window, image)?;
    let key = highgui::wait_key(1)?;
    Ok(key & 0xFF == QUIT_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use farsight_core::CalibrationTarget;
    use farsight_eye::BoundingBox;
    use std::path::PathBuf;

    fn calibration() -> Calibration {
        let mut calibration = Calibration::new();
        // 200px wide at 100cm, 50cm real width: focal 400px
        calibration
            .calibrate(
                &CalibrationTarget {
                    class_name: "person".to_string(),
                    image: PathBuf::from("ref/50.jpg"),
                    known_distance_cm: 100.0,
                    real_width_cm: 50.0,
                },
                200.0,
            )
            .unwrap();
        calibration
    }

    fn detection(class_id: usize, class_name: &str, center_x: f32, width: f32) -> Detection {
        Detection {
            class_id,
            class_name: class_name.to_string(),
            confidence: 0.87,
            bbox: BoundingBox::from_center(center_x, 150.0, width, 300.0),
        }
    }

    #[test]
    fn test_assess_distance_and_position() {
        // distance = 400 * 50 / width cm
        let detections = vec![
            detection(0, "person", 100.0, 1000.0), // 0.2 m, left
            detection(0, "person", 320.0, 100.0),  // 2.0 m, center
            detection(0, "person", 520.0, 40.0),   // 5.0 m, right
            detection(16, "dog", 320.0, 40.0),     // uncalibrated
        ];
        let assessments = assess(&detections, 640.0, &calibration(), 50.0, &AlertConfig::default());

        assert_eq!(assessments[0].position, Position::Left);
        assert!((assessments[0].distance_m.unwrap() - 0.2).abs() < 1e-4);
        assert_eq!(assessments[0].proximity, Some(Proximity::Danger));

        assert_eq!(assessments[1].position, Position::Center);
        assert_eq!(assessments[1].proximity, Some(Proximity::Warning));

        assert_eq!(assessments[2].position, Position::Right);
        assert_eq!(assessments[2].proximity, Some(Proximity::Clear));

        assert_eq!(assessments[3].distance_m, None);
        assert_eq!(assessments[3].proximity, None);
    }

    #[test]
    fn test_labels_and_colors() {
        let palette = Palette::seeded(80, 1);
        let assessments = assess(
            &[
                detection(0, "person", 100.0, 1000.0),
                detection(0, "person", 320.0, 100.0),
                detection(0, "person", 520.0, 40.0),
                detection(16, "dog", 320.0, 40.0),
            ],
            640.0,
            &calibration(),
            50.0,
            &AlertConfig::default(),
        );

        assert_eq!(assessments[0].label(), "person 0.87 0.20 meters");
        assert_eq!(assessments[0].color(&palette), Some(RED));
        assert_eq!(assessments[1].color(&palette), Some(GREEN));
        assert_eq!(assessments[2].color(&palette), None);
        assert_eq!(assessments[3].label(), "dog 0.87");
        assert_eq!(assessments[3].color(&palette), Some(palette.color(16)));
    }

    #[test]
    fn test_warning_only_for_danger() {
        let alert = AlertConfig::default();
        let far = assess(&[detection(0, "person", 520.0, 40.0)], 640.0, &calibration(), 50.0, &alert);
        assert_eq!(warning_for(&far, &alert), None);

        let near = assess(
            &[detection(0, "person", 520.0, 40.0), detection(0, "person", 100.0, 1000.0)],
            640.0,
            &calibration(),
            50.0,
            &alert,
        );
        assert_eq!(
            warning_for(&near, &alert).as_deref(),
            Some("person too close to you on your left side.")
        );
    }
}
