use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use inference::{
    BoundingBox, Detector, DetectorConfig, FrameProcessor, LabelMap, ProcessorSettings,
    RawDetection, ResultMapper,
    backend::{SsdOutput, decode_ssd},
};
use preprocess::{ColorRange, Frame, FrameCapabilities, PackedPixelBuffer, Plane};

/// Detector that costs nothing, so the bench measures the pipeline around it.
struct NoopDetector {
    detections: Vec<RawDetection>,
}

impl Detector for NoopDetector {
    fn load(_config: &DetectorConfig) -> anyhow::Result<Self> {
        Ok(Self {
            detections: (0..10)
                .map(|i| RawDetection {
                    class_id: i,
                    confidence: 0.9,
                    bbox: BoundingBox::new(10.0, 10.0, 100.0, 100.0),
                })
                .collect(),
        })
    }

    fn detect(&mut self, _: &PackedPixelBuffer, max: usize) -> anyhow::Result<Vec<RawDetection>> {
        Ok(self.detections.iter().take(max).cloned().collect())
    }
}

fn create_i420_frame(width: u32, height: u32, rotation: i32) -> Frame {
    let (w, h) = (width as usize, height as usize);
    let chroma = (w / 2) * (h / 2);
    Frame::new(
        width,
        height,
        vec![
            Plane::new(vec![120; w * h], w, 1),
            Plane::new(vec![110; chroma], w / 2, 1),
            Plane::new(vec![150; chroma], w / 2, 1),
        ],
    )
    .with_rotation(rotation)
}

fn benchmark_process_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_frame");

    let settings = ProcessorSettings {
        capabilities: FrameCapabilities::yuv420(ColorRange::Limited),
        display_size: Some((1080, 1920)),
        ..ProcessorSettings::default()
    };
    let detector = NoopDetector::load(&DetectorConfig::default()).unwrap();
    let labels = LabelMap::from_lines((0..80).map(|i| format!("class{i}")));
    let mut processor =
        FrameProcessor::new(detector, ResultMapper::new(labels), settings).unwrap();

    let resolutions = [(640, 480), (1280, 720)];

    for (width, height) in resolutions.iter() {
        for rotation in [0, 90] {
            group.bench_function(
                BenchmarkId::new(format!("{width}x{height}"), rotation),
                |b| {
                    b.iter_batched(
                        || create_i420_frame(*width, *height, rotation),
                        |frame| processor.process(black_box(frame)).unwrap(),
                        criterion::BatchSize::LargeInput,
                    )
                },
            );
        }
    }

    group.finish();
}

fn benchmark_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_ssd");

    let boxes: Vec<f32> = (0..100).flat_map(|_| [0.1, 0.1, 0.5, 0.5]).collect();
    let classes: Vec<f32> = (0..100).map(|i| (i % 80) as f32).collect();
    let scores: Vec<f32> = (0..100).map(|i| if i % 3 == 0 { 0.9 } else { 0.1 }).collect();

    for max in [1, 10, 50] {
        group.bench_with_input(BenchmarkId::new("max_detections", max), &max, |b, &max| {
            let output = SsdOutput {
                boxes: &boxes,
                classes: &classes,
                scores: &scores,
                count: Some(100),
            };
            b.iter(|| decode_ssd(black_box(&output), 0.5, max, 300))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_process_frame, benchmark_decode);
criterion_main!(benches);
