use crate::detection::{BoundingBox, Detection, EmotionScores};
use anyhow::Context;
use opencv::prelude::*;
use opencv::types::VectorOfRect;
use opencv::{core, dnn, imgproc, objdetect, types};
use std::path::PathBuf;
use tracing::{debug, info};

/// Finds faces in a frame and scores each one per emotion label.
pub trait EmotionDetector<F> {
    /// Detections ordered by priority, most relevant face first.
    fn detect_emotions(&mut self, frame: &F) -> anyhow::Result<Vec<Detection>>;
}

pub const DEFAULT_CASCADE: &str = "haarcascades/haarcascade_frontalface_alt.xml";
pub const DEFAULT_MODEL_INPUT: i32 = 48;

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Haar cascade file. Relative paths are resolved through OpenCV's data search path.
    pub cascade: PathBuf,
    /// ONNX emotion classifier with 7 outputs in `Emotion::ALL` order.
    pub model: PathBuf,
    /// Square grayscale input edge expected by the classifier.
    pub input_size: i32,
    /// Set when the model emits logits rather than probabilities.
    pub apply_softmax: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            cascade: PathBuf::from(DEFAULT_CASCADE),
            model: PathBuf::from("models/emotion.onnx"),
            input_size: DEFAULT_MODEL_INPUT,
            apply_softmax: true,
        }
    }
}

pub struct FaceDetector {
    classifier: objdetect::CascadeClassifier,
}

impl FaceDetector {
    pub fn new(cascade: &std::path::Path) -> anyhow::Result<Self> {
        let cascade = cascade.to_string_lossy();
        let xml = if std::path::Path::new(cascade.as_ref()).exists() {
            cascade.into_owned()
        } else {
            core::find_file_def(&cascade)?
        };
        let classifier = objdetect::CascadeClassifier::new(&xml)?;
        info!(%xml, "Loaded face cascade");
        Ok(Self { classifier })
    }

    pub fn detect(&mut self, image: &Mat) -> anyhow::Result<VectorOfRect> {
        let mut faces = types::VectorOfRect::new();

        self.classifier.detect_multi_scale(
            &image,
            &mut faces,
            1.1,
            2,
            objdetect::CASCADE_SCALE_IMAGE,
            core::Size {
                width: 30,
                height: 30,
            },
            core::Size {
                width: 0,
                height: 0,
            },
        )?;
        Ok(faces)
    }
}

pub struct EmotionClassifier {
    net: dnn::Net,
    input_size: i32,
    apply_softmax: bool,
}

impl EmotionClassifier {
    pub fn new(config: &DetectorConfig) -> anyhow::Result<Self> {
        let model = config.model.to_string_lossy();
        let net = dnn::read_net_from_onnx(&model)
            .with_context(|| format!("Failed to load emotion model {model}"))?;
        info!(%model, "Loaded emotion model");
        Ok(Self {
            net,
            input_size: config.input_size,
            apply_softmax: config.apply_softmax,
        })
    }

    /// Scores a grayscale face crop.
    pub fn classify(&mut self, face: &Mat) -> anyhow::Result<EmotionScores> {
        let blob = dnn::blob_from_image(
            face,
            1.0 / 255.0,
            core::Size::new(self.input_size, self.input_size),
            core::Scalar::default(),
            false,
            false,
            core::CV_32F,
        )?;
        self.net.set_input(&blob, "", 1.0, core::Scalar::default())?;
        let output = self.net.forward_single("")?;
        if output.total() < 7 {
            anyhow::bail!(
                "Emotion model produced {} outputs, expected 7",
                output.total()
            );
        }

        let mut raw = [0f32; 7];
        for (i, slot) in raw.iter_mut().enumerate() {
            *slot = *output.at_2d::<f32>(0, i as i32)?;
        }
        if self.apply_softmax {
            softmax(&mut raw);
        }
        Ok(EmotionScores::new(raw))
    }
}

/// Face localisation followed by per-face emotion classification.
pub struct DnnEmotionDetector {
    face_detector: FaceDetector,
    classifier: EmotionClassifier,
}

impl DnnEmotionDetector {
    pub fn new(config: &DetectorConfig) -> anyhow::Result<Self> {
        Ok(Self {
            face_detector: FaceDetector::new(&config.cascade)?,
            classifier: EmotionClassifier::new(config)?,
        })
    }
}

impl EmotionDetector<Mat> for DnnEmotionDetector {
    fn detect_emotions(&mut self, frame: &Mat) -> anyhow::Result<Vec<Detection>> {
        let frame_grayscale = convert_to_grayscale(frame)?;
        let faces = self.face_detector.detect(&frame_grayscale)?;

        let mut detections = Vec::with_capacity(faces.len());
        for face in &faces {
            let crop = Mat::roi(&frame_grayscale, face)?.try_clone()?;
            let scores = self.classifier.classify(&crop)?;
            detections.push(Detection::new(
                BoundingBox::new(face.x, face.y, face.width, face.height),
                scores,
            ));
        }
        detections.sort_by_key(|d| std::cmp::Reverse(d.bounding_box.area()));
        debug!(faces = detections.len(), "Detected faces");
        Ok(detections)
    }
}

pub fn convert_to_grayscale(image: &Mat) -> anyhow::Result<Mat> {
    let mut gray: Mat = Mat::default();
    imgproc::cvt_color_def(&image, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}

pub fn softmax(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for value in values.iter_mut() {
        *value = (*value - max).exp();
        sum += *value;
    }
    if sum > 0.0 {
        for value in values.iter_mut() {
            *value /= sum;
        }
    }
}
