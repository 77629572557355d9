use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use preprocess::{
    ColorConverter, ColorRange, DEFAULT_INPUT_SIZE, Frame, FrameCapabilities, FrameResampler,
    PackedPixelBuffer, Plane, alloc_surface, transform_matrix,
};

/// I420 frame with a luma gradient and mildly saturated chroma.
fn create_i420_frame(width: u32, height: u32) -> Frame {
    let (w, h) = (width as usize, height as usize);
    let mut luma = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            luma[y * w + x] = ((x + y) % 220 + 16) as u8;
        }
    }
    let chroma = (w / 2) * (h / 2);
    Frame::new(
        width,
        height,
        vec![
            Plane::new(luma, w, 1),
            Plane::new(vec![110; chroma], w / 2, 1),
            Plane::new(vec![150; chroma], w / 2, 1),
        ],
    )
}

fn benchmark_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert_yuv420");

    let resolutions = [(640, 480), (1280, 720), (1920, 1080)];

    for (width, height) in resolutions.iter() {
        let frame = create_i420_frame(*width, *height);
        let mut surface = alloc_surface(*width, *height).unwrap();

        for parallel in [false, true] {
            let mut converter =
                ColorConverter::new(FrameCapabilities::yuv420(ColorRange::Limited).with_parallel(parallel));
            let label = if parallel { "parallel" } else { "sequential" };

            group.bench_with_input(
                BenchmarkId::new(label, format!("{}x{}", width, height)),
                &frame,
                |b, frame| {
                    b.iter(|| converter.convert(black_box(frame), &mut surface).unwrap());
                },
            );
        }
    }

    group.finish();
}

fn benchmark_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample");

    let size = DEFAULT_INPUT_SIZE;
    let (width, height) = (1280, 720);
    let mut converter = ColorConverter::new(FrameCapabilities::default());
    let mut source = alloc_surface(width, height).unwrap();
    converter
        .convert(&create_i420_frame(width, height), &mut source)
        .unwrap();

    let mut resampler = FrameResampler::new(size, size).unwrap();
    let mut packed = PackedPixelBuffer::new(size, size).unwrap();

    for rotation in [0, 90, 180, 270] {
        let transform = transform_matrix(rotation, width, height, size, size).unwrap();

        group.bench_with_input(
            BenchmarkId::new("to_input_size", format!("{rotation}deg")),
            &transform,
            |b, transform| {
                b.iter(|| {
                    resampler
                        .resample(black_box(&source), transform, &mut packed)
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_convert, benchmark_resample);
criterion_main!(benches);
