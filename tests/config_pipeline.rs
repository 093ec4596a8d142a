//! Pipelines built entirely from configuration files and built-in processors

use sliceflow::config::ToolboxConfig;
use sliceflow::pipeline::{PipelineError, Toolbox};
use sliceflow::processors::{builtin_registry, ThroughputReport};
use sliceflow::types::RunStatus;
use std::path::Path;
use std::sync::Arc;

fn write_config(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn run_file(path: &Path) -> Result<RunStatus, PipelineError> {
    let config = ToolboxConfig::load(path).unwrap();
    let mut toolbox = Toolbox::from_config(Arc::new(builtin_registry().unwrap()), &config)?;
    toolbox.run()
}

#[test]
fn test_toml_pipeline_with_queue_and_profiler() {
    let dir = tempfile::tempdir().unwrap();
    let report_path = dir.path().join("throughput.json");
    let text = format!(
        r#"
[run]
grace_period_ms = 500
summary_interval_ms = 0
queue_timeout_ms = 10

[[processors]]
type = "slice-source"
name = "source"

[[processors]]
type = "data-queue"
name = "queue"

[[processors]]
type = "throughput-profiler"
name = "profiler"

[[connections]]
signal = "source:data"
slot = "queue:data"

[[connections]]
signal = "queue:data"
slot = "profiler:data"

[[connections]]
signal = "queue:queue-done"
slot = "profiler:stop"

[config.source]
n_slices = 25

[config.profiler]
output_file = {report:?}
"#,
        report = report_path.display().to_string()
    );
    let path = write_config(dir.path(), "pipeline.toml", &text);

    assert_eq!(run_file(&path).unwrap(), RunStatus::Completed);

    let report: ThroughputReport =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(report.slices, 25);
}

#[test]
fn test_json_pipeline_with_cutter_and_type_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let text = r#"{
        "run": { "grace_period_ms": 500, "summary_interval_ms": 5, "queue_timeout_ms": 10 },
        "processors": [
            { "type": "slice-source" },
            { "type": "apply-cut", "name": "cutter" },
            { "type": "summary-logger" }
        ],
        "connections": [
            { "signal": "slice-source:data", "slot": "cutter:data" },
            { "signal": "toolbox:summary", "slot": "summary-logger:summary" }
        ],
        "config": {
            "slice-source": { "n_slices": 8, "interval_ms": 1 },
            "summary-logger": { "per_group": true }
        }
    }"#;
    let path = write_config(dir.path(), "pipeline.json", text);
    assert_eq!(run_file(&path).unwrap(), RunStatus::Completed);
}

#[test]
fn test_unknown_type_in_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "pipeline.toml",
        "[[processors]]\ntype = \"fft\"\nname = \"spectrum\"\n",
    );
    assert!(matches!(
        run_file(&path),
        Err(PipelineError::UnknownProcessorType { ref name, ref type_key })
            if name == "spectrum" && type_key == "fft"
    ));
}

#[test]
fn test_unknown_toolbox_signal() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "pipeline.toml",
        r#"
[[processors]]
type = "summary-logger"

[[connections]]
signal = "toolbox:progress"
slot = "summary-logger:summary"
"#,
    );
    assert!(matches!(
        run_file(&path),
        Err(PipelineError::UnknownSignalOrSlot { ref processor, kind: "signal", .. }) if processor == "toolbox"
    ));
}

#[test]
fn test_queue_done_cannot_feed_record_slot() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "pipeline.toml",
        r#"
[[processors]]
type = "data-queue"
name = "queue"

[[processors]]
type = "apply-cut"

[[connections]]
signal = "queue:queue-done"
slot = "apply-cut:data"
"#,
    );
    assert!(matches!(run_file(&path), Err(PipelineError::Signal(_))));
}
