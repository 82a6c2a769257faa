use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use live_detect::config::AppConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "LIVEDETECT_CONFIG",
        "LIVEDETECT_SOURCE",
        "LIVEDETECT_BACKEND",
        "LIVEDETECT_MODEL",
        "LIVEDETECT_INTERVAL_MS",
        "LIVEDETECT_MIN_CONFIDENCE",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, body: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, body.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AppConfig::load().expect("load config");
    assert_eq!(cfg.source.url, "stub://camera");
    assert_eq!((cfg.source.width, cfg.source.height), (640, 480));
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.detection.interval, Duration::from_millis(100));
    assert_eq!(cfg.overlay.text_color, [0, 0, 0, 255]);
    assert_eq!(cfg.overlay.line_width, 2);
}

#[test]
fn loads_json_from_env_path_with_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r##"{
            "source": { "url": "/tmp/still.png", "target_fps": 5, "width": 320, "height": 240 },
            "detector": { "backend": "cpu", "min_confidence": 0.25 },
            "detection": { "interval_ms": 250 },
            "overlay": { "box_color": "#FF0000", "line_width": 3 }
        }"##,
    );

    std::env::set_var("LIVEDETECT_CONFIG", file.path());
    std::env::set_var("LIVEDETECT_INTERVAL_MS", "40");
    std::env::set_var("LIVEDETECT_BACKEND", " STUB ");

    let cfg = AppConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.source.url, "/tmp/still.png");
    assert_eq!(cfg.source.target_fps, 5);
    assert_eq!((cfg.source.width, cfg.source.height), (320, 240));
    assert_eq!(cfg.detector.backend, "stub");
    assert!((cfg.detector.min_confidence - 0.25).abs() < f32::EPSILON);
    assert_eq!(cfg.detection.interval, Duration::from_millis(40));
    assert_eq!(cfg.overlay.box_color, [255, 0, 0, 255]);
    assert_eq!(cfg.overlay.line_width, 3);
}

#[test]
fn loads_toml_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r##"
[source]
url = "stub://porch"

[detector]
backend = "cpu"
model_path = "/models/ssd.onnx"

[overlay]
text_color = "#FFFFFF80"
"##,
    );

    let cfg = AppConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.source.url, "stub://porch");
    assert_eq!(cfg.detector.backend, "cpu");
    assert_eq!(
        cfg.detector.model_path.as_deref(),
        Some(std::path::Path::new("/models/ssd.onnx"))
    );
    assert_eq!(cfg.overlay.text_color, [255, 255, 255, 0x80]);
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LIVEDETECT_INTERVAL_MS", "0");
    let err = AppConfig::load().expect_err("zero interval must fail");
    assert!(err.to_string().contains("interval"));

    std::env::set_var("LIVEDETECT_INTERVAL_MS", "soon");
    assert!(AppConfig::load().is_err());
    clear_env();

    std::env::set_var("LIVEDETECT_MIN_CONFIDENCE", "1.5");
    let err = AppConfig::load().expect_err("out-of-range threshold must fail");
    assert!(err.to_string().contains("min_confidence"));
    clear_env();

    let bad_color = write_config(".json", r##"{ "overlay": { "text_color": "#00000" } }"##);
    assert!(AppConfig::load_from(Some(bad_color.path())).is_err());

    let missing = std::path::Path::new("/nonexistent/livedetect.json");
    assert!(AppConfig::load_from(Some(missing)).is_err());
}
