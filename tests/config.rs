use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use camfeed::config::CaptureConfig;
use camfeed::sink::SinkKind;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CAMFEED_CONFIG",
        "CAMFEED_AUTH_URL",
        "CAMFEED_CLIENT_ID",
        "CAMFEED_REALM",
        "CAMFEED_DIRECTORY_URL",
        "CAMFEED_STREAM_ENDPOINT",
        "CAMFEED_MAX_FPS",
        "CAMFEED_QUALITY_SIZE",
        "CAMFEED_OUTPUT_DIR",
        "CAMFEED_DETECTOR",
        "CAMFEED_MODEL_PATH",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = CaptureConfig::load().expect("load defaults");
    assert_eq!(cfg.auth.realm, "icv");
    assert_eq!(cfg.stream.endpoint, "https://grpc2-carmel.vw2-demospace.de:443");
    assert_eq!(cfg.stream.quality_size, 100);
    assert_eq!(cfg.video.fps, 25);
    assert_eq!(cfg.detector, "stub");
    assert_eq!(cfg.camera_id, None);
    assert_eq!(cfg.record_length, None);
    assert!(!cfg.log_frametimes);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "auth": {"server_url": "https://sso.example.org/auth", "realm": "cities"},
            "directory_url": "https://cams.example.org/api",
            "stream": {"endpoint": "https://grpc.example.org:443", "max_fps": 15},
            "output": {"dir": "/srv/captures", "video": {"width": 1280, "height": 720}},
            "detector": {"backend": "motion", "confidence_threshold": 0.4},
            "session": {
                "camera_id": "12",
                "record_length_secs": 30,
                "log_frametimes": true,
                "sinks": ["video", "display"]
            }
        }"#,
    );

    std::env::set_var("CAMFEED_CONFIG", file.path());
    std::env::set_var("CAMFEED_REALM", "icv-staging");
    std::env::set_var("CAMFEED_MAX_FPS", "5");
    std::env::set_var("CAMFEED_MODEL_PATH", "/models/yolov8n.onnx");

    let cfg = CaptureConfig::load().expect("load config");

    assert_eq!(cfg.auth.server_url, "https://sso.example.org/auth");
    assert_eq!(cfg.auth.client_id, "vw2datacapture");
    assert_eq!(cfg.auth.realm, "icv-staging");
    assert_eq!(cfg.directory_url, "https://cams.example.org/api");
    assert_eq!(cfg.stream.endpoint, "https://grpc.example.org:443");
    assert_eq!(cfg.stream.max_fps, 5);
    assert_eq!(cfg.output_dir, PathBuf::from("/srv/captures"));
    assert_eq!((cfg.video.width, cfg.video.height, cfg.video.fps), (1280, 720, 25));
    assert_eq!(cfg.detector, "motion");
    assert_eq!(cfg.detector_settings.confidence_threshold, 0.4);
    assert_eq!(
        cfg.detector_settings.model_path,
        Some(PathBuf::from("/models/yolov8n.onnx"))
    );
    assert_eq!(cfg.camera_id.as_deref(), Some("12"));
    assert_eq!(cfg.record_length, Some(Duration::from_secs(30)));
    assert!(cfg.log_frametimes);
    assert_eq!(cfg.sinks, vec![SinkKind::Video, SinkKind::Display]);

    clear_env();
}

#[test]
fn rejects_bad_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CAMFEED_MAX_FPS", "fast");
    assert!(CaptureConfig::load().is_err());
    clear_env();

    std::env::set_var("CAMFEED_STREAM_ENDPOINT", "not a url");
    assert!(CaptureConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_unknown_fields_and_non_numeric_camera() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{"rtsp": {"url": "rtsp://camera-1"}}"#);
    std::env::set_var("CAMFEED_CONFIG", file.path());
    assert!(CaptureConfig::load().is_err());

    let file = write_config(r#"{"session": {"camera_id": "gate"}}"#);
    std::env::set_var("CAMFEED_CONFIG", file.path());
    let err = CaptureConfig::load().unwrap_err();
    assert!(err.to_string().contains("not numeric"));

    clear_env();
}
