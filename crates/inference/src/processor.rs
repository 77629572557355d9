use crate::config::ProcessorSettings;
use crate::detector::Detector;
use crate::error::PipelineError;
use crate::mapping::{FrameResult, ResultMapper};
use common::span;
use preprocess::{
    ColorConverter, Frame, FrameResampler, PackedPixelBuffer, RgbaSurface, TransformPlanner,
    alloc_surface,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where a processing pass currently is.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle = 0,
    Converting = 1,
    Transforming = 2,
    Detecting = 3,
    Delivering = 4,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineState::Converting,
            2 => PipelineState::Transforming,
            3 => PipelineState::Detecting,
            4 => PipelineState::Delivering,
            _ => PipelineState::Idle,
        }
    }
}

/// Shared, lock-free view of a processor's [`PipelineState`].
#[derive(Debug, Clone, Default)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: PipelineState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Runs one frame at a time through conversion, transform, detection and
/// mapping.
///
/// All scratch memory is owned here and reused across frames. The
/// processor is not reentrant: `&mut self` is the only way in.
pub struct FrameProcessor<D: Detector> {
    detector: D,
    mapper: ResultMapper,
    converter: ColorConverter,
    planner: TransformPlanner,
    resampler: FrameResampler,
    surface: Option<RgbaSurface>,
    packed: PackedPixelBuffer,
    input_size: u32,
    num_detections: usize,
    display_size: Option<(u32, u32)>,
    state: StateCell,
}

impl<D: Detector> FrameProcessor<D> {
    pub fn new(
        detector: D,
        mapper: ResultMapper,
        settings: ProcessorSettings,
    ) -> Result<Self, PipelineError> {
        let size = settings.input_size;

        Ok(Self {
            detector,
            mapper,
            converter: ColorConverter::new(settings.capabilities),
            planner: TransformPlanner::new(),
            resampler: FrameResampler::new(size, size)?,
            surface: None,
            packed: PackedPixelBuffer::new(size, size)?,
            input_size: size,
            num_detections: settings.num_detections,
            display_size: settings.display_size,
            state: StateCell::default(),
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    pub fn state_cell(&self) -> StateCell {
        self.state.clone()
    }

    /// The packed model input of the last frame that reached detection.
    pub fn packed(&self) -> &PackedPixelBuffer {
        &self.packed
    }

    /// Process `frame` and return its result. The frame is released as soon
    /// as its pixels are converted, or on the first error.
    pub fn process(&mut self, frame: Frame) -> Result<FrameResult, PipelineError> {
        let mut delivered = None;
        self.process_with(frame, |result| delivered = Some(result))?;
        delivered.ok_or_else(|| PipelineError::Mapping("frame produced no result".to_string()))
    }

    /// Process `frame` and hand its result to `deliver` while in the
    /// Delivering state. `deliver` is not called when any stage fails.
    pub fn process_with<F>(&mut self, frame: Frame, deliver: F) -> Result<(), PipelineError>
    where
        F: FnOnce(FrameResult),
    {
        let span = tracing::info_span!("process_frame", sequence = frame.sequence());
        let _enter = span.enter();

        let outcome = self.run(frame).map(deliver);
        self.state.set(PipelineState::Idle);
        outcome
    }

    fn run(&mut self, frame: Frame) -> Result<FrameResult, PipelineError> {
        let sequence = frame.sequence();
        let rotation_degrees = frame.rotation_degrees();

        self.state.set(PipelineState::Converting);
        let crop = ColorConverter::check_crop(&frame)?;
        let (width, height) = (crop.width(), crop.height());
        let surface = match &mut self.surface {
            Some(surface) if surface.dimensions() == (width, height) => surface,
            slot => slot.insert(alloc_surface(width, height)?),
        };
        self.converter.convert(&frame, surface)?;
        drop(frame);

        self.state.set(PipelineState::Transforming);
        let transform = self.planner.plan(
            rotation_degrees,
            width,
            height,
            self.input_size,
            self.input_size,
        )?;
        self.resampler.resample(surface, &transform, &mut self.packed)?;

        self.state.set(PipelineState::Detecting);
        let mut raw = {
            let _s = span!("detect");
            self.detector
                .detect(&self.packed, self.num_detections)
                .map_err(PipelineError::Detector)?
        };
        raw.truncate(self.num_detections);

        self.state.set(PipelineState::Delivering);
        let (display_width, display_height) = self
            .display_size
            .unwrap_or((self.input_size, self.input_size));
        let detections = self.mapper.map(
            &raw,
            self.input_size,
            self.input_size,
            display_width,
            display_height,
        )?;

        tracing::trace!(sequence, detections = detections.len(), "Frame processed");

        Ok(FrameResult {
            sequence,
            detections,
            image_width: self.input_size,
            image_height: self.input_size,
            rotation_degrees,
            display_width,
            display_height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::detector::{BoundingBox, LabelMap, RawDetection};
    use preprocess::{FrameCapabilities, Plane};

    /// Returns a fixed list and records what it was asked for.
    struct ScriptedDetector {
        detections: Vec<RawDetection>,
        calls: usize,
        last_max: usize,
        state: Option<StateCell>,
        seen_state: Option<PipelineState>,
    }

    impl Detector for ScriptedDetector {
        fn load(_config: &DetectorConfig) -> anyhow::Result<Self> {
            Ok(Self {
                detections: Vec::new(),
                calls: 0,
                last_max: 0,
                state: None,
                seen_state: None,
            })
        }

        fn detect(
            &mut self,
            _pixels: &PackedPixelBuffer,
            max_detections: usize,
        ) -> anyhow::Result<Vec<RawDetection>> {
            self.calls += 1;
            self.last_max = max_detections;
            self.seen_state = self.state.as_ref().map(StateCell::get);
            Ok(self.detections.clone())
        }
    }

    fn detection(n: u32) -> RawDetection {
        RawDetection {
            class_id: n,
            confidence: 0.9,
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        }
    }

    fn rgba_frame(width: u32, height: u32) -> Frame {
        let data = vec![128u8; (width * height * 4) as usize];
        Frame::new(width, height, vec![Plane::new(data, width as usize * 4, 4)])
    }

    fn settings() -> ProcessorSettings {
        ProcessorSettings {
            capabilities: FrameCapabilities::rgba8888(),
            input_size: 16,
            num_detections: 2,
            display_size: None,
        }
    }

    fn processor(detections: Vec<RawDetection>) -> FrameProcessor<ScriptedDetector> {
        let mut detector = ScriptedDetector::load(&DetectorConfig::default()).unwrap();
        detector.detections = detections;
        FrameProcessor::new(detector, ResultMapper::new(LabelMap::default()), settings()).unwrap()
    }

    #[test]
    fn test_results_capped_at_num_detections() {
        let mut processor = processor(vec![detection(0), detection(1), detection(2)]);

        let result = processor.process(rgba_frame(32, 24)).unwrap();

        assert_eq!(processor.detector.last_max, 2);
        let ids: Vec<u32> = result.detections.iter().map(|d| d.class_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(processor.state(), PipelineState::Idle);
    }

    #[test]
    fn test_detector_runs_in_detecting_state() {
        let mut processor = processor(vec![]);
        processor.detector.state = Some(processor.state_cell());

        processor.process(rgba_frame(16, 16)).unwrap();

        assert_eq!(processor.detector.seen_state, Some(PipelineState::Detecting));
    }

    #[test]
    fn test_format_error_skips_detection_and_returns_to_idle() {
        let mut processor = processor(vec![detection(0)]);
        let bad = Frame::new(16, 16, vec![Plane::new(vec![0; 8], 4, 4)]);

        let mut delivered = false;
        let result = processor.process_with(bad, |_| delivered = true);

        assert!(matches!(
            result,
            Err(PipelineError::Preprocess(preprocess::PreprocessError::Format(_)))
        ));
        assert!(!delivered);
        assert_eq!(processor.detector.calls, 0);
        assert_eq!(processor.state(), PipelineState::Idle);
    }

    #[test]
    fn test_surface_reallocated_only_on_size_change() {
        let mut processor = processor(vec![]);

        processor.process(rgba_frame(32, 24)).unwrap();
        let first = processor.surface.as_ref().unwrap().as_raw().as_ptr();
        processor.process(rgba_frame(32, 24)).unwrap();
        assert_eq!(processor.surface.as_ref().unwrap().as_raw().as_ptr(), first);

        processor.process(rgba_frame(24, 32)).unwrap();
        assert_eq!(processor.surface.as_ref().unwrap().dimensions(), (24, 32));
    }

    #[test]
    fn test_result_carries_geometry() {
        let mut processor = processor(vec![]);
        let frame = rgba_frame(32, 24).with_rotation(270).with_sequence(42);

        let result = processor.process(frame).unwrap();

        assert_eq!(result.sequence, 42);
        assert_eq!(result.rotation_degrees, 270);
        assert_eq!((result.image_width, result.image_height), (16, 16));
        assert_eq!((result.display_width, result.display_height), (16, 16));
    }
}
