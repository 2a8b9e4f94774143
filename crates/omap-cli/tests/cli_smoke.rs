use serde_json::Value;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

const DISPATCH_DOCUMENT: &str = r#"
[[types]]
name = "Foo"
members = [{ name = "Property1", type = "i32" }]

[[types]]
name = "FooX"
extends = ["Foo"]
members = [{ name = "Property2", type = "i32" }]

[[types]]
name = "Bar"
members = [{ name = "Property3", type = "i32" }]

[[types]]
name = "BarX"
extends = ["Bar"]
members = [{ name = "Property4", type = "i32" }]

[[rules]]
source = "Foo"
target = "Bar"
properties = [{ from = "Property1", to = "Property3" }]

[[rules]]
source = "FooX"
target = "BarX"
properties = [{ from = "Property2", to = "Property4" }]
"#;

const REJECTED_DOCUMENT: &str = r#"
[[types]]
name = "Empty"

[[types]]
name = "Wide"
members = [{ name = "A", type = "i32" }]

[[rules]]
source = "Empty"
target = "Wide"
map_all = true
"#;

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "omap-cli-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path.join(name);
        fs::write(&path, contents).expect("fixture file should be written");
        path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn run_omap<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = env!("CARGO_BIN_EXE_omap");
    Command::new(bin)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("omap command should execute")
}

fn assert_success(output: &Output) {
    if !output.status.success() {
        panic!(
            "command failed with status {:?}\nstdout:\n{}\nstderr:\n{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn assert_failure(output: &Output) {
    if output.status.success() {
        panic!(
            "command unexpectedly succeeded\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn parse_json_stdout(output: &Output) -> Value {
    serde_json::from_slice::<Value>(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "expected valid JSON stdout, got error: {e}\nstdout:\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn check_accepts_valid_document_json() {
    let tmp = TempDirGuard::new("check-accepted");
    let document = tmp.write("mapping.toml", DISPATCH_DOCUMENT);

    let output = run_omap(["check", &path_arg(&document), "--json"]);
    assert_success(&output);

    let payload = parse_json_stdout(&output);
    assert_eq!(payload["schema"], 1);
    assert_eq!(payload["checkKind"], "omap.check.v1");
    assert_eq!(payload["result"], "accepted");
    assert_eq!(payload["entryCount"], 2);
    assert_eq!(
        payload["fingerprint"].as_str().map(str::len),
        Some(64),
        "fingerprint should be a sha256 hex digest"
    );
    assert_eq!(payload["issues"], Value::Array(Vec::new()));
}

#[test]
fn check_rejects_document_with_unmatched_member() {
    let tmp = TempDirGuard::new("check-rejected");
    let document = tmp.write("mapping.toml", REJECTED_DOCUMENT);

    let output = run_omap(["check", &path_arg(&document), "--json"]);
    assert_failure(&output);

    let payload = parse_json_stdout(&output);
    assert_eq!(payload["result"], "rejected");
    let issues = payload["issues"].as_array().expect("issues should be an array");
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0]["kind"], "unmatched_member");
    assert_eq!(issues[0]["member"], "A");
}

#[test]
fn check_human_output_lists_issues() {
    let tmp = TempDirGuard::new("check-human");
    let document = tmp.write("mapping.toml", REJECTED_DOCUMENT);

    let output = run_omap(["check", &path_arg(&document)]);
    assert_failure(&output);

    let stdout = stdout_text(&output);
    assert!(stdout.contains("omap check"));
    assert!(stdout.contains("  Result: rejected"));
    assert!(stdout.contains("[unmatched_member]"));
}

#[test]
fn check_reports_missing_document() {
    let tmp = TempDirGuard::new("check-missing");
    let missing = tmp.path().join("absent.toml");

    let output = run_omap(["check", &path_arg(&missing)]);
    assert_failure(&output);
    assert!(stderr_text(&output).contains("failed to load mapping document"));
}

#[test]
fn entries_lists_rows_in_declaration_order() {
    let tmp = TempDirGuard::new("entries");
    let document = tmp.write("mapping.toml", DISPATCH_DOCUMENT);

    let output = run_omap(["entries", &path_arg(&document), "--json"]);
    assert_success(&output);

    let payload = parse_json_stdout(&output);
    let entries = payload["entries"].as_array().expect("entries should be an array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["index"], 0);
    assert_eq!(entries[0]["kind"], "property");
    assert_eq!(entries[0]["source"], "Foo");
    assert_eq!(entries[0]["target"], "Bar");
    assert_eq!(entries[1]["source"], "FooX");
    assert_eq!(entries[1]["target"], "BarX");
}

#[test]
fn map_dispatches_to_most_derived_target() {
    let tmp = TempDirGuard::new("map-implicit");
    let document = tmp.write("mapping.toml", DISPATCH_DOCUMENT);
    let input = tmp.write(
        "input.json",
        r#"{ "$type": "FooX", "Property1": 18, "Property2": 7 }"#,
    );

    let output = run_omap([
        "map",
        &path_arg(&document),
        "--input",
        &path_arg(&input),
        "--target",
        "Bar",
    ]);
    assert_success(&output);

    let result = parse_json_stdout(&output);
    assert_eq!(
        result,
        serde_json::json!({ "$type": "BarX", "Property3": 18, "Property4": 7 })
    );
}

#[test]
fn map_with_declared_source_and_json_payload() {
    let tmp = TempDirGuard::new("map-source");
    let document = tmp.write("mapping.toml", DISPATCH_DOCUMENT);
    let input = tmp.write("input.json", r#"{ "Property1": 5 }"#);

    let output = run_omap([
        "map",
        &path_arg(&document),
        "--input",
        &path_arg(&input),
        "--source",
        "Foo",
        "--target",
        "Bar",
        "--json",
    ]);
    assert_success(&output);

    let payload = parse_json_stdout(&output);
    assert_eq!(payload["schema"], 1);
    assert_eq!(payload["mode"], "implicit");
    assert_eq!(payload["target"], "Bar");
    assert_eq!(payload["result"]["$type"], "Bar");
    assert_eq!(payload["result"]["Property3"], 5);
}

#[test]
fn map_into_existing_target_keeps_its_type() {
    let tmp = TempDirGuard::new("map-into");
    let document = tmp.write("mapping.toml", DISPATCH_DOCUMENT);
    let input = tmp.write(
        "input.json",
        r#"{ "$type": "FooX", "Property1": 3, "Property2": 4 }"#,
    );
    let into = tmp.write("into.json", r#"{ "Property3": 99 }"#);

    let output = run_omap([
        "map",
        &path_arg(&document),
        "--input",
        &path_arg(&input),
        "--target",
        "Bar",
        "--into",
        &path_arg(&into),
        "--json",
    ]);
    assert_success(&output);

    let payload = parse_json_stdout(&output);
    assert_eq!(payload["mode"], "explicit");
    assert_eq!(
        payload["result"],
        serde_json::json!({ "$type": "Bar", "Property3": 3 })
    );
}

#[test]
fn map_without_type_information_fails() {
    let tmp = TempDirGuard::new("map-untyped");
    let document = tmp.write("mapping.toml", DISPATCH_DOCUMENT);
    let input = tmp.write("input.json", r#"{ "Property1": 5 }"#);

    let output = run_omap([
        "map",
        &path_arg(&document),
        "--input",
        &path_arg(&input),
        "--target",
        "Bar",
    ]);
    assert_failure(&output);
    assert!(stderr_text(&output).contains("has no \"$type\""));
}

#[test]
fn map_reports_missing_mapping() {
    let tmp = TempDirGuard::new("map-missing-rule");
    let document = tmp.write("mapping.toml", DISPATCH_DOCUMENT);
    let input = tmp.write("input.json", r#"{ "$type": "Bar", "Property3": 1 }"#);

    let output = run_omap([
        "map",
        &path_arg(&document),
        "--input",
        &path_arg(&input),
        "--target",
        "Foo",
    ]);
    assert_failure(&output);
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr_text(&output).contains("cannot map from Bar to Foo: no target types found"),
        "stderr:\n{}",
        stderr_text(&output)
    );
}
