use image::{Rgb, RgbImage, Rgba, RgbaImage};
use media_processor::{
    BatchOrchestrator, ProcessingError, WatermarkEngine, WatermarkOptions, WatermarkSpec,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_canvas(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_pixel(400, 300, Rgb([240, 240, 240]))
        .save(path)
        .unwrap();
}

fn write_logo(dir: &Path) -> PathBuf {
    let logo = dir.join("logo.png");
    RgbaImage::from_fn(100, 100, |x, _| Rgba([200, 0, 0, if x < 50 { 255 } else { 0 }]))
        .save(&logo)
        .unwrap();
    logo
}

fn image_engine(logo: PathBuf) -> WatermarkEngine {
    let spec = WatermarkSpec::from_options(WatermarkOptions {
        image: Some(logo),
        opacity: Some(0.8),
        ..Default::default()
    })
    .unwrap();
    WatermarkEngine::new(spec, 5).unwrap()
}

fn count_files(dir: &Path) -> usize {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

#[test]
fn batch_aggregates_failures_without_stopping() {
    let work = TempDir::new().unwrap();
    let input = work.path().join("in");
    for i in 0..5 {
        write_canvas(&input.join(format!("photo_{}.png", i)));
    }
    // Matching extension, undecodable content.
    fs::write(input.join("broken_1.jpg"), b"not a jpeg").unwrap();
    fs::write(input.join("broken_2.jpg"), b"also not a jpeg").unwrap();
    fs::write(input.join("notes.txt"), b"ignored").unwrap();

    let logo = write_logo(work.path());
    let output = work.path().join("out");
    let orchestrator = BatchOrchestrator::new(2, false).unwrap();
    let result = orchestrator
        .run_path(&image_engine(logo), &input, &output, |_| {})
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.processed, 5);
    assert_eq!(result.errors, 2);
    assert_eq!(result.error_messages.len(), 2);
    assert!(result
        .error_messages
        .iter()
        .all(|m| m.starts_with("Error watermarking ") && m.contains("broken_")));

    assert_eq!(count_files(&output), 5);
    let marked = image::open(output.join("photo_0.png")).unwrap().to_rgb8();
    assert_eq!(marked.dimensions(), (400, 300));
    assert!(!output.join("notes.txt").exists());
}

#[test]
fn tiff_overlay_fails_every_file_and_writes_nothing() {
    let work = TempDir::new().unwrap();
    let input = work.path().join("in");
    for i in 0..3 {
        write_canvas(&input.join(format!("photo_{}.png", i)));
    }
    let tiff = work.path().join("logo.tiff");
    RgbImage::new(20, 20).save(&tiff).unwrap();

    let output = work.path().join("out");
    let result = BatchOrchestrator::new(2, false)
        .unwrap()
        .run_path(&image_engine(tiff), &input, &output, |_| {})
        .unwrap();

    assert_eq!(result.processed, 0);
    assert_eq!(result.errors, 3);
    assert!(result
        .error_messages
        .iter()
        .all(|m| m.contains("Unsupported watermark image format")));
    assert_eq!(count_files(&output), 0);
}

#[test]
fn single_file_errors_propagate() {
    let work = TempDir::new().unwrap();
    let canvas = work.path().join("photo.png");
    write_canvas(&canvas);

    let engine = image_engine(work.path().join("missing-logo.png"));
    let err = BatchOrchestrator::new(1, false)
        .unwrap()
        .run_path(&engine, &canvas, &work.path().join("out.png"), |_| {})
        .unwrap_err();

    assert!(matches!(err, ProcessingError::OverlayNotFound(_)));
    assert!(!work.path().join("out.png").exists());
}

#[test]
fn single_file_into_existing_directory() {
    let work = TempDir::new().unwrap();
    let canvas = work.path().join("photo.png");
    write_canvas(&canvas);
    let output = work.path().join("out");
    fs::create_dir_all(&output).unwrap();

    let result = BatchOrchestrator::new(1, false)
        .unwrap()
        .run_path(&image_engine(write_logo(work.path())), &canvas, &output, |_| {})
        .unwrap();

    assert_eq!(result.processed, 1);
    assert!(output.join("photo.png").is_file());
}

#[test]
fn empty_directory_creates_no_output() {
    let work = TempDir::new().unwrap();
    let input = work.path().join("in");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("readme.md"), b"nothing to do").unwrap();

    let output = work.path().join("out");
    let result = BatchOrchestrator::new(1, false)
        .unwrap()
        .run_path(&image_engine(write_logo(work.path())), &input, &output, |_| {})
        .unwrap();

    assert!(result.success);
    assert_eq!((result.processed, result.errors), (0, 0));
    assert!(!output.exists());
}

#[test]
fn recursive_run_mirrors_tree() {
    let work = TempDir::new().unwrap();
    let input = work.path().join("in");
    write_canvas(&input.join("top.png"));
    write_canvas(&input.join("2024/summer/beach.png"));

    let logo = write_logo(work.path());
    let output = work.path().join("out");

    let flat = BatchOrchestrator::new(2, false)
        .unwrap()
        .run_path(&image_engine(logo.clone()), &input, &output, |_| {})
        .unwrap();
    assert_eq!(flat.processed, 1);

    let deep = BatchOrchestrator::new(2, true)
        .unwrap()
        .run_path(&image_engine(logo), &input, &output, |_| {})
        .unwrap();
    assert_eq!(deep.processed, 2);
    assert!(output.join("2024/summer/beach.png").is_file());
}
