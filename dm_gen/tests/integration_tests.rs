use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn type_library() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../type-library")
}

fn dm_gen() -> Command {
    Command::new(env!("CARGO_BIN_EXE_dm-gen"))
}

#[test]
fn codegen_writes_the_component() {
    let output_dir = TempDir::new().unwrap();
    let output = dm_gen()
        .arg("codegen")
        .arg("-f")
        .arg(type_library().join("motor.dm.yaml"))
        .arg("-o")
        .arg(output_dir.path())
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[✓] Code generation complete!"));

    let linux = output_dir.path().join("Motor/Linux");
    let module = fs::read_to_string(linux.join("libmotor.c")).unwrap();
    assert!(module.contains("NAPI_MODULE(NODE_GYP_MODULE_NAME, init_motor);"));
    assert!(linux.join("exos_motor.h").exists());
    assert!(linux.join("CMakeLists.txt").exists());
    assert!(output_dir.path().join("Motor/Motor.exospkg").exists());
}

#[test]
fn failed_generation_writes_nothing() {
    let schema_dir = TempDir::new().unwrap();
    fs::write(
        schema_dir.path().join("broken.dm.yaml"),
        r#"
datamodel:
  name: "Broken"
types:
  - name: "Broken"
    kind:
      struct:
        fields:
          - name: "Cycle"
            type: "Loop"
            comment: "PUB"
  - name: "Loop"
    kind:
      struct:
        fields:
          - name: "Back"
            type: "Loop"
"#,
    )
    .unwrap();

    let output_dir = TempDir::new().unwrap();
    let output = dm_gen()
        .arg("codegen")
        .arg("-f")
        .arg(schema_dir.path().join("broken.dm.yaml"))
        .arg("-o")
        .arg(output_dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("circular type reference"));
    assert_eq!(fs::read_dir(output_dir.path()).unwrap().count(), 0);
}

#[test]
fn packaging_flag_overrides_the_file() {
    let output_dir = TempDir::new().unwrap();
    let status = dm_gen()
        .arg("codegen")
        .arg("-f")
        .arg(type_library().join("motor.dm.yaml"))
        .arg("-o")
        .arg(output_dir.path())
        .arg("--packaging")
        .arg("none")
        .status()
        .unwrap();
    assert!(status.success());
    assert!(!output_dir.path().join("Motor/Linux/CMakeLists.txt").exists());
    let script = fs::read_to_string(output_dir.path().join("Motor/Linux/build.sh")).unwrap();
    assert!(!script.contains("cpack"));
}

#[test]
fn napi_flags_reach_the_generated_module() {
    let output_dir = TempDir::new().unwrap();
    let status = dm_gen()
        .arg("codegen")
        .arg("-f")
        .arg(type_library().join("motor.dm.yaml"))
        .arg("-o")
        .arg(output_dir.path())
        .arg("--napi-version")
        .arg("8")
        .arg("--no-known-issues")
        .status()
        .unwrap();
    assert!(status.success());
    let source = fs::read_to_string(output_dir.path().join("Motor/Linux/libmotor.c")).unwrap();
    assert!(source.contains("#define NAPI_VERSION 8\n"));
    assert!(!source.contains("KNOWN ISSUES"));
}

#[test]
fn analyze_prints_marshal_in_ir_as_json() {
    let output = dm_gen()
        .arg("analyze")
        .arg("-f")
        .arg(type_library().join("motor.dm.yaml"))
        .arg("--print-ir")
        .arg("--direction")
        .arg("in")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let json_start = stdout.find("{\n").unwrap();
    let programs: serde_json::Value = serde_json::from_str(&stdout[json_start..]).unwrap();
    assert_eq!(programs["Labels"]["direction"], "in");
    assert!(programs.get("Diagnostics").is_none());
    assert!(stdout.contains("Diagnostics: uint8_t[8] [private]"));
}
