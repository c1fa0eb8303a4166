//! Per-frame recognition: localize, match, gate on confidence, deduplicate, annotate.

use crate::cooldown::{AttendanceDeduplicator, RecordOutcome};
use crate::detector::FaceLocalizer;
use crate::matcher::IdentityMatcher;
use crate::publisher::PublishedFrame;
use crate::types::Annotation;
use chrono::NaiveDateTime;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use thiserror::Error;

/// Minimum decision score for a positive identification.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 1.0;
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("frame encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Everything one recognition run needs to turn raw frames into published ones.
pub struct FramePipeline {
    localizer: Box<dyn FaceLocalizer>,
    matcher: Box<dyn IdentityMatcher>,
    dedup: AttendanceDeduplicator,
    threshold: f32,
    jpeg_quality: u8,
}

impl FramePipeline {
    pub fn new(
        localizer: Box<dyn FaceLocalizer>,
        matcher: Box<dyn IdentityMatcher>,
        dedup: AttendanceDeduplicator,
        threshold: f32,
    ) -> Self {
        Self {
            localizer,
            matcher,
            dedup,
            threshold,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn deduplicator(&self) -> &AttendanceDeduplicator {
        &self.dedup
    }

    /// Recognize faces in `frame`, drawing a box around each one that
    /// clears the confidence threshold.
    ///
    /// Detections are handled in detector order, so two sightings of the
    /// same person in one frame hit the cooldown check one after another.
    pub fn process(&mut self, frame: &mut RgbImage, now: NaiveDateTime) -> Vec<Annotation> {
        let detections = match self.localizer.locate(frame) {
            Ok(detections) => detections,
            Err(err) => {
                tracing::warn!(error = %err, "face localization failed, frame left unannotated");
                return Vec::new();
            }
        };

        let (width, height) = frame.dimensions();
        let mut annotations = Vec::new();

        for detection in &detections {
            let Some(region) = detection.clamp_to(width, height) else {
                continue;
            };

            let crop = imageops::crop_imm(&*frame, region.x, region.y, region.width, region.height).to_image();
            let result = match self.matcher.identify(&crop) {
                Ok(result) => result,
                Err(err) => {
                    tracing::warn!(error = %err, ?region, "identity matching failed, skipping face");
                    continue;
                }
            };

            // NaN on either side never clears the gate.
            let recognized = result.confidence > self.threshold;
            if !recognized {
                tracing::debug!(
                    identity = %result.identity,
                    confidence = result.confidence,
                    "below confidence threshold"
                );
                continue;
            }

            let outcome = self.dedup.record(&result.identity, now);
            tracing::debug!(identity = %result.identity, confidence = result.confidence, ?outcome, "face recognized");

            annotations.push(Annotation {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                identity: result.identity,
                confidence: result.confidence,
                recorded: matches!(outcome, RecordOutcome::Recorded(_)),
            });
        }

        for annotation in &annotations {
            draw_box(frame, annotation);
        }

        annotations
    }

    /// Process, annotate and encode one frame for publication.
    pub fn render(
        &mut self,
        mut frame: RgbImage,
        sequence: u64,
        now: NaiveDateTime,
    ) -> Result<PublishedFrame, PipelineError> {
        let annotations = self.process(&mut frame, now);
        let jpeg = encode_jpeg(&frame, self.jpeg_quality)?;

        Ok(PublishedFrame {
            sequence,
            captured_at: now,
            width: frame.width(),
            height: frame.height(),
            jpeg,
            annotations,
        })
    }
}

/// 2-pixel rectangle outline.
fn draw_box(frame: &mut RgbImage, a: &Annotation) {
    let outer = Rect::at(a.x as i32, a.y as i32).of_size(a.width, a.height);
    draw_hollow_rect_mut(frame, outer, BOX_COLOR);
    if a.width > 2 && a.height > 2 {
        let inner = Rect::at(a.x as i32 + 1, a.y as i32 + 1).of_size(a.width - 2, a.height - 2);
        draw_hollow_rect_mut(frame, inner, BOX_COLOR);
    }
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(frame)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cooldown::DEFAULT_COOLDOWN;
    use crate::detector::DetectorError;
    use crate::matcher::MatcherError;
    use crate::testing::{at, MemoryStore};
    use crate::types::{Detection, MatchResult};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedLocalizer(Vec<Detection>);

    impl FaceLocalizer for FixedLocalizer {
        fn locate(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    struct FailingLocalizer;

    impl FaceLocalizer for FailingLocalizer {
        fn locate(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
            Err(DetectorError::InferenceFailed("boom".into()))
        }
    }

    /// Replays scripted results, one per `identify` call. `None` = failure.
    struct ScriptedMatcher {
        script: VecDeque<Option<(&'static str, f32)>>,
        calls: Arc<AtomicUsize>,
    }

    impl IdentityMatcher for ScriptedMatcher {
        fn identify(&mut self, _crop: &RgbImage) -> Result<MatchResult, MatcherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.pop_front().flatten() {
                Some((identity, confidence)) => Ok(MatchResult { identity: identity.into(), confidence }),
                None => Err(MatcherError::Embedder(crate::embedder::EmbedderError::InferenceFailed(
                    "scripted".into(),
                ))),
            }
        }
    }

    fn face(x: f32, y: f32) -> Detection {
        Detection { x, y, width: 20.0, height: 20.0, score: 0.9 }
    }

    fn pipeline(
        detections: Vec<Detection>,
        script: Vec<Option<(&'static str, f32)>>,
        store: &Arc<MemoryStore>,
    ) -> (FramePipeline, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let matcher = ScriptedMatcher { script: script.into(), calls: calls.clone() };
        let dedup = AttendanceDeduplicator::new(store.clone(), DEFAULT_COOLDOWN);
        let p = FramePipeline::new(
            Box::new(FixedLocalizer(detections)),
            Box::new(matcher),
            dedup,
            DEFAULT_CONFIDENCE_THRESHOLD,
        );
        (p, calls)
    }

    fn blank() -> RgbImage {
        RgbImage::new(64, 48)
    }

    #[test]
    fn test_low_confidence_is_ignored() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let (mut p, calls) = pipeline(vec![face(10.0, 10.0)], vec![Some(("alice", 0.8))], &store);

        let mut frame = blank();
        let annotations = p.process(&mut frame, at(9, 0, 0));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(annotations.is_empty());
        assert!(store.persisted().is_empty());
        assert!(p.deduplicator().last_accepted("alice").is_none());
        assert!(frame.pixels().all(|px| *px == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_confidence_equal_to_threshold_is_ignored() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let (mut p, _) = pipeline(vec![face(10.0, 10.0)], vec![Some(("alice", 1.0))], &store);
        assert!(p.process(&mut blank(), at(9, 0, 0)).is_empty());
    }

    #[test]
    fn test_nan_confidence_is_ignored() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let (mut p, _) = pipeline(vec![face(10.0, 10.0)], vec![Some(("alice", f32::NAN))], &store);
        assert!(p.process(&mut blank(), at(9, 0, 0)).is_empty());
        assert!(store.persisted().is_empty());
    }

    #[test]
    fn test_nan_threshold_recognizes_nobody() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let dedup = AttendanceDeduplicator::new(store.clone(), DEFAULT_COOLDOWN);
        let matcher = ScriptedMatcher {
            script: vec![Some(("alice", 5.0))].into(),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let mut p = FramePipeline::new(
            Box::new(FixedLocalizer(vec![face(10.0, 10.0)])),
            Box::new(matcher),
            dedup,
            f32::NAN,
        );
        assert!(p.process(&mut blank(), at(9, 0, 0)).is_empty());
        assert!(store.persisted().is_empty());
    }

    #[test]
    fn test_recognized_face_is_recorded_and_boxed() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let (mut p, _) = pipeline(vec![face(10.0, 12.0)], vec![Some(("alice", 1.5))], &store);

        let mut frame = blank();
        let annotations = p.process(&mut frame, at(9, 0, 0));

        assert_eq!(annotations.len(), 1);
        let a = &annotations[0];
        assert_eq!((a.x, a.y, a.width, a.height), (10, 12, 20, 20));
        assert_eq!(a.identity, "alice");
        assert!(a.recorded);
        assert_eq!(store.persisted(), vec![(1, at(9, 0, 0))]);

        assert_eq!(frame.get_pixel(10, 12), &BOX_COLOR);
        assert_eq!(frame.get_pixel(11, 13), &BOX_COLOR);
        assert_eq!(frame.get_pixel(20, 22), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_suppressed_repeat_is_still_annotated() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let (mut p, _) = pipeline(
            vec![face(10.0, 10.0)],
            vec![Some(("alice", 1.5)), Some(("alice", 1.6))],
            &store,
        );

        assert!(p.process(&mut blank(), at(9, 0, 0))[0].recorded);
        let second = p.process(&mut blank(), at(9, 2, 0));
        assert_eq!(second.len(), 1);
        assert!(!second[0].recorded);
        assert_eq!(store.persisted().len(), 1);
    }

    #[test]
    fn test_same_person_twice_in_one_frame_records_once() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let (mut p, calls) = pipeline(
            vec![face(0.0, 0.0), face(30.0, 20.0)],
            vec![Some(("alice", 1.5)), Some(("alice", 1.4))],
            &store,
        );

        let annotations = p.process(&mut blank(), at(9, 0, 0));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(annotations.len(), 2);
        assert!(annotations[0].recorded);
        assert!(!annotations[1].recorded);
        assert_eq!(store.persisted().len(), 1);
    }

    #[test]
    fn test_unenrolled_label_is_annotated_not_recorded() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let (mut p, _) = pipeline(vec![face(10.0, 10.0)], vec![Some(("ghost", 2.0))], &store);

        let annotations = p.process(&mut blank(), at(9, 0, 0));
        assert_eq!(annotations.len(), 1);
        assert!(!annotations[0].recorded);
        assert!(store.persisted().is_empty());
    }

    #[test]
    fn test_matcher_failure_skips_only_that_face() {
        let store = Arc::new(MemoryStore::with_employees(&["bob"]));
        let (mut p, _) = pipeline(
            vec![face(0.0, 0.0), face(30.0, 20.0)],
            vec![None, Some(("bob", 1.2))],
            &store,
        );

        let annotations = p.process(&mut blank(), at(9, 0, 0));
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].identity, "bob");
    }

    #[test]
    fn test_detection_outside_frame_is_skipped() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let (mut p, calls) = pipeline(vec![face(500.0, 500.0)], vec![Some(("alice", 1.5))], &store);

        assert!(p.process(&mut blank(), at(9, 0, 0)).is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_localizer_failure_yields_plain_frame() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let dedup = AttendanceDeduplicator::new(store.clone(), DEFAULT_COOLDOWN);
        let calls = Arc::new(AtomicUsize::new(0));
        let matcher = ScriptedMatcher { script: VecDeque::new(), calls: calls.clone() };
        let mut p = FramePipeline::new(Box::new(FailingLocalizer), Box::new(matcher), dedup, 1.0);

        let published = p.render(blank(), 1, at(9, 0, 0)).unwrap();
        assert!(published.annotations.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_render_encodes_jpeg() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let (mut p, _) = pipeline(vec![face(10.0, 10.0)], vec![Some(("alice", 1.5))], &store);

        let published = p.render(blank(), 42, at(9, 0, 0)).unwrap();
        assert_eq!(published.sequence, 42);
        assert_eq!((published.width, published.height), (64, 48));
        assert_eq!(published.annotations.len(), 1);

        let decoded = image::load_from_memory(&published.jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }
}
