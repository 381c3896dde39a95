mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use camsight::utils::stream::{StreamReader, latest};
use camsight::{
    Detection, DetectionLoop, DisplayControls, StepOutcome, ThresholdPolicy, ThresholdState,
    VideoSink,
};
use common::*;

struct Rig {
    looped: DetectionLoop,
    sink: Arc<VideoSink>,
    stream: Arc<FakeStream>,
    controls: ModelControls,
    snapshot: StreamReader<Detection>,
    threshold: Arc<ThresholdState>,
    display: Arc<DisplayControls>,
    surface: Arc<std::sync::Mutex<RecordingSurface>>,
}

fn rig() -> Rig {
    let controls = ModelControls::default();
    controls.set_detections(vec![
        detection("person", 0.92),
        detection("cup", 0.55),
        detection("dog", 0.2),
    ]);
    let sink = Arc::new(VideoSink::new());
    let stream = Arc::new(FakeStream::new(false));
    let (surface, shared) = recording_surface();
    let (writer, snapshot) = latest();
    let threshold = Arc::new(ThresholdState::new(&ThresholdPolicy::default()));
    let display = Arc::new(DisplayControls::new(true, false));
    let looped = DetectionLoop::new(
        Box::new(FakeModel::new(controls.clone())),
        Arc::clone(&sink),
        shared,
        writer,
        Arc::clone(&threshold),
        Arc::clone(&display),
    );
    Rig {
        looped,
        sink,
        stream,
        controls,
        snapshot,
        threshold,
        display,
        surface,
    }
}

#[tokio::test]
async fn skips_until_metadata_is_loaded() {
    let mut rig = rig();
    assert_eq!(rig.looped.step().await, StepOutcome::Skipped);

    rig.sink.bind(rig.stream.clone());
    assert_eq!(rig.looped.step().await, StepOutcome::Skipped);
    assert_eq!(rig.controls.calls(), 0);

    rig.sink.loaded().await.unwrap();
    assert_eq!(rig.looped.step().await, StepOutcome::Rendered(2));
    assert_eq!(rig.controls.calls(), 1);
}

#[tokio::test]
async fn renders_against_the_current_threshold() {
    let mut rig = rig();
    rig.sink.bind(rig.stream.clone());
    rig.sink.loaded().await.unwrap();

    assert_eq!(rig.looped.step().await, StepOutcome::Rendered(2));
    assert_eq!(rig.snapshot.latest().len(), 3);
    assert_eq!(
        rig.surface.lock().unwrap().texts,
        vec!["person (92%)".to_string(), "cup (55%)".to_string()]
    );

    rig.threshold.set(0.9);
    assert_eq!(rig.looped.step().await, StepOutcome::Rendered(1));

    rig.display.set_show_overlays(false);
    assert_eq!(rig.looped.step().await, StepOutcome::Rendered(0));
    assert!(rig.surface.lock().unwrap().boxes.is_empty());
    assert_eq!(rig.snapshot.latest().len(), 3);
}

#[tokio::test]
async fn failed_inference_keeps_previous_snapshot() {
    let mut rig = rig();
    rig.sink.bind(rig.stream.clone());
    rig.sink.loaded().await.unwrap();
    rig.looped.step().await;

    rig.controls.set_detections(Vec::new());
    rig.controls.fail.store(true, Ordering::SeqCst);
    assert_eq!(rig.looped.step().await, StepOutcome::Failed);
    assert_eq!(rig.snapshot.latest().len(), 3);

    rig.controls.fail.store(false, Ordering::SeqCst);
    assert_eq!(rig.looped.step().await, StepOutcome::Rendered(0));
    assert!(rig.snapshot.latest().is_empty());
}

#[tokio::test]
async fn ended_stream_reports_device_loss() {
    let mut rig = rig();
    rig.sink.bind(rig.stream.clone());
    rig.sink.loaded().await.unwrap();

    rig.stream.unplug();
    assert_eq!(rig.looped.step().await, StepOutcome::DeviceLost);
}
