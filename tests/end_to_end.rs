use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::Rgba;

use live_detect::detect::ScriptedBackend;
use live_detect::overlay::measure_text;
use live_detect::{
    ui, BoundingBox, Detection, DetectionLoop, DetectorSlot, Frame, LatestFrame, LoopSettings,
    OverlayRenderer, ResultStore, TickOutcome,
};

const HOUR: Duration = Duration::from_secs(3600);
const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

fn camera_frame(sequence: u64) -> Frame {
    sized_frame(640, 480, sequence)
}

fn sized_frame(width: u32, height: u32, sequence: u64) -> Frame {
    Frame::new(vec![90u8; (width * height * 3) as usize], width, height, sequence).unwrap()
}

#[test]
fn single_tick_publishes_and_renders_person() {
    let source = LatestFrame::new();
    source.update(camera_frame(1));

    let renderer = Arc::new(Mutex::new(OverlayRenderer::default()));
    let store = ResultStore::new();
    let detection = DetectionLoop::new(
        Arc::new(source.clone()),
        DetectorSlot::new(),
        Arc::clone(&renderer),
        store.clone(),
        &LoopSettings { interval: HOUR },
    )
    .unwrap();
    detection.install_detector(Box::new(ScriptedBackend::new().respond(vec![Detection::new(
        "person",
        0.92,
        BoundingBox::new(10.0, 10.0, 100.0, 200.0),
    )])));
    detection.start().unwrap();

    assert_eq!(detection.tick(), TickOutcome::Dispatched(1));
    assert!(detection.wait_settled(Duration::from_secs(5)));
    detection.stop();

    let batch = store.current();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch.sequence(), 1);
    assert_eq!((batch.frame_width(), batch.frame_height()), (640, 480));
    let person = &batch.detections()[0];
    assert_eq!(person.label(), "person");
    assert_eq!(person.percent(), 92);
    assert_eq!(ui::prediction_lines(&batch), vec!["person (92%)"]);

    let renderer = renderer.lock().unwrap();
    assert_eq!(renderer.dimensions(), (640, 480));
    assert_eq!(renderer.renders(), 1);

    let items = renderer.items();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.label, "person (92%)");
    assert_eq!((item.box_rect.x, item.box_rect.y), (10, 10));
    assert_eq!((item.box_rect.width, item.box_rect.height), (100, 200));

    // Box top is closer than one label height to the edge, so the label sits at y = 0.
    assert_eq!((item.label_rect.x, item.label_rect.y), (10, 0));
    assert_eq!(item.label_rect.width, measure_text("person (92%)") + 10);
    assert_eq!(item.label_rect.height, 20);

    let surface = renderer.surface();
    assert_eq!(*surface.get_pixel(10, 209), GREEN);
    assert_eq!(*surface.get_pixel(109, 209), GREEN);
    assert_eq!(*surface.get_pixel(109, 100), GREEN);
    assert_eq!(*surface.get_pixel(60, 110), CLEAR);
    assert_eq!(*surface.get_pixel(300, 300), CLEAR);

    // Label background with black text inside it.
    assert_eq!(*surface.get_pixel(11, 1), GREEN);
    let rect = item.label_rect;
    let has_text = (rect.y..rect.bottom()).any(|y| {
        (rect.x..rect.right()).any(|x| *surface.get_pixel(x as u32, y as u32) == BLACK)
    });
    assert!(has_text, "label text was not drawn");
}

#[test]
fn next_result_replaces_previous_overlay() {
    let source = LatestFrame::new();
    source.update(camera_frame(1));

    let renderer = Arc::new(Mutex::new(OverlayRenderer::default()));
    let detection = DetectionLoop::new(
        Arc::new(source.clone()),
        DetectorSlot::new(),
        Arc::clone(&renderer),
        ResultStore::new(),
        &LoopSettings { interval: HOUR },
    )
    .unwrap();
    detection.install_detector(Box::new(
        ScriptedBackend::new()
            .respond(vec![Detection::new(
                "dog",
                0.5,
                BoundingBox::new(300.0, 200.0, 50.0, 50.0),
            )])
            .respond(Vec::new()),
    ));
    detection.start().unwrap();

    assert_eq!(detection.tick(), TickOutcome::Dispatched(1));
    assert!(detection.wait_settled(Duration::from_secs(5)));
    assert_eq!(
        *renderer.lock().unwrap().surface().get_pixel(300, 249),
        GREEN
    );

    source.update(camera_frame(2));
    assert_eq!(detection.tick(), TickOutcome::Dispatched(2));
    assert!(detection.wait_settled(Duration::from_secs(5)));

    let renderer = renderer.lock().unwrap();
    assert!(renderer.items().is_empty());
    assert!(renderer.surface().pixels().all(|pixel| *pixel == CLEAR));
    assert!(detection.store().current().is_empty());
}

#[test]
fn resolution_change_mid_call_renders_at_live_size() {
    let source = LatestFrame::new();
    source.update(sized_frame(320, 240, 1));

    let renderer = Arc::new(Mutex::new(OverlayRenderer::default()));
    let store = ResultStore::new();
    let detection = DetectionLoop::new(
        Arc::new(source.clone()),
        DetectorSlot::new(),
        Arc::clone(&renderer),
        store.clone(),
        &LoopSettings { interval: HOUR },
    )
    .unwrap();
    detection.install_detector(Box::new(
        ScriptedBackend::new()
            .respond(vec![Detection::new(
                "cat",
                0.7,
                BoundingBox::new(10.0, 40.0, 30.0, 20.0),
            )])
            .with_delay(Duration::from_millis(150)),
    ));
    detection.start().unwrap();

    assert_eq!(detection.tick(), TickOutcome::Dispatched(1));
    assert!(detection.in_flight());
    source.update(sized_frame(640, 480, 2));
    assert!(detection.wait_settled(Duration::from_secs(5)));
    detection.stop();

    // The batch stays tagged with the frame it was computed on.
    let batch = store.current();
    assert_eq!((batch.frame_width(), batch.frame_height()), (320, 240));
    assert_eq!(batch.sequence(), 1);

    let renderer = renderer.lock().unwrap();
    assert_eq!(renderer.dimensions(), (640, 480));
    let item = &renderer.items()[0];
    assert_eq!((item.box_rect.x, item.box_rect.y), (20, 80));
    assert_eq!((item.box_rect.width, item.box_rect.height), (60, 40));
    assert_eq!(*renderer.surface().get_pixel(20, 119), GREEN);
}
