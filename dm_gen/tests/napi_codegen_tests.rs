use dm_gen::codegen::napi::{NapiCodeGenerator, NapiCodeGeneratorOptions};
use dm_gen::codegen::shared::EmitError;
use dm_gen::codegen::{generate_all, CodegenOptions, GenerateError};
use dm_gen::dm_loader::{LoadedSchema, Packaging, SchemaLoader};
use dm_gen::schema::{ResolveError, TypeResolver};
use dm_types::{FieldDecl, TypeDef};
use std::path::{Path, PathBuf};

fn type_library() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../type-library")
}

fn motor_schema() -> LoadedSchema {
    SchemaLoader::load(&type_library().join("motor.dm.yaml"), Vec::new()).unwrap()
}

/* Body of one generated C function, from its signature to the closing brace */
fn function_body<'a>(source: &'a str, signature: &str) -> &'a str {
    let start = source.find(signature).unwrap_or_else(|| panic!("missing {}", signature));
    let end = start + source[start..].find("\n}\n").unwrap();
    &source[start..end]
}

#[test]
fn generates_the_complete_component_tree() {
    let artifacts = generate_all(&motor_schema(), &CodegenOptions::default()).unwrap();
    let expected = [
        "Motor/Motor.exospkg",
        "Motor/Linux/exos_motor.h",
        "Motor/Linux/libmotor.c",
        "Motor/Linux/motor.js",
        "Motor/Linux/package.json",
        "Motor/Linux/package-lock.json",
        "Motor/Linux/binding.gyp",
        "Motor/Linux/CMakeLists.txt",
        "Motor/Linux/build.sh",
        "Motor/Linux/Linux.pkg",
    ];
    for path in expected {
        assert!(artifacts.get(path).is_some(), "missing {}", path);
    }
    assert_eq!(artifacts.len(), expected.len());
}

#[test]
fn packaging_override_drops_cmake() {
    let options = CodegenOptions { packaging: Some(Packaging::None), ..Default::default() };
    let artifacts = generate_all(&motor_schema(), &options).unwrap();
    assert!(artifacts.get("Motor/Linux/CMakeLists.txt").is_none());
    let exospkg = artifacts.get("Motor/Motor.exospkg").unwrap();
    assert!(exospkg.contains("l_Motor.node"));
    assert!(!exospkg.contains(".deb"));
}

#[test]
fn napi_options_reach_the_generated_module() {
    let defaults = generate_all(&motor_schema(), &CodegenOptions::default()).unwrap();
    let source = defaults.get("Motor/Linux/libmotor.c").unwrap();
    assert!(source.starts_with("//KNOWN ISSUES"));
    assert!(source.contains("#define NAPI_VERSION 6\n"));

    let options = CodegenOptions {
        napi: NapiCodeGeneratorOptions { emit_known_issues: false, napi_version: 8 },
        ..Default::default()
    };
    let artifacts = generate_all(&motor_schema(), &options).unwrap();
    let source = artifacts.get("Motor/Linux/libmotor.c").unwrap();
    assert!(!source.contains("KNOWN ISSUES"));
    assert!(source.contains("#define NAPI_VERSION 8\n"));
    assert!(!source.contains("#define NAPI_VERSION 6"));
}

#[test]
fn header_keeps_private_members_for_layout() {
    let artifacts = generate_all(&motor_schema(), &CodegenOptions::default()).unwrap();
    let header = artifacts.get("Motor/Linux/exos_motor.h").unwrap();
    assert!(header.contains("uint8_t Diagnostics[8]; //private"));
    assert!(header.contains("uint32_t Tuning; //private"));
    assert!(header.contains("    Position = 10,\n    Velocity = 11\n} DriveMode;"));
    assert!(header.contains("char Labels[2][17];"));

    let module = artifacts.get("Motor/Linux/libmotor.c").unwrap();
    assert!(!module.contains("Diagnostics"));
    assert!(!module.contains("Tuning"));
    let index = artifacts.get("Motor/Linux/motor.js").unwrap();
    assert!(!index.contains("Diagnostics"));
}

#[test]
fn value_callback_marshals_out_a_record_array() {
    let schema = motor_schema();
    let mut resolver = TypeResolver::new(&schema);
    let datamodel = resolver.resolve_datamodel("Motor").unwrap();
    let source = NapiCodeGenerator::new(&datamodel, NapiCodeGeneratorOptions::default()).emit_code().unwrap();

    let body = function_body(&source, "static void Axes_onchange_js_cb(");
    assert!(body.contains("    napi_value object0, object1;\n"));
    assert!(body.contains("    napi_value property;\n"));
    assert!(body.contains("    napi_value arrayItem;\n"));
    assert!(body.contains("napi_create_array(env, &Axes_handle.value);"));
    assert!(body.contains("for (uint32_t i = 0; i < 3; i++)"));
    assert!(body.contains("napi_create_double(env, (double)exos_data.Axes[i].Position, &property)"));
    assert!(body.contains("for (uint32_t j = 0; j < 2; j++)"));
    assert!(body.contains("napi_set_element(env, Axes_handle.value, i, object0);"));
    assert!(body.contains("\"latency\", latency"));
    assert!(!body.contains("return NULL;"));
}

#[test]
fn publish_method_checks_string_bounds() {
    let schema = motor_schema();
    let mut resolver = TypeResolver::new(&schema);
    let datamodel = resolver.resolve_datamodel("Motor").unwrap();
    let source = NapiCodeGenerator::new(&datamodel, NapiCodeGeneratorOptions::default()).emit_code().unwrap();

    let body = function_body(&source, "static napi_value Labels_publish_method(");
    assert!(body.contains("    size_t _r;\n"));
    assert!(body.contains("napi_get_element(env, Labels_handle.value, i, &arrayItem)"));
    assert!(body.contains("if (_r > 16)"));
    assert!(body.contains("String too long for Labels[i] (max 16 bytes)"));
    assert!(body.contains("sizeof(exos_data.Labels[i])"));
    assert!(body.contains("exos_dataset_publish(&Labels_dataset);"));

    let mode = function_body(&source, "static napi_value Mode_publish_method(");
    assert!(mode.contains("exos_data.Mode = (int32_t)_value;"));
}

#[test]
fn init_seeds_values_with_defaults() {
    let schema = motor_schema();
    let mut resolver = TypeResolver::new(&schema);
    let datamodel = resolver.resolve_datamodel("Motor").unwrap();
    let source = NapiCodeGenerator::new(&datamodel, NapiCodeGeneratorOptions::default()).emit_code().unwrap();

    let init = function_body(&source, "static napi_value init_motor(");
    assert!(init.contains("Start_value = def_bool;"));
    assert!(init.contains("Speed_value = def_number;"));
    assert!(init.contains("napi_create_array(env, &Labels_value);"));
    assert!(init.contains("arrayItem = def_string;"));
    assert!(init.contains("Status_value = object0;"));
    assert!(init.contains("exos_dataset_connect(&Speed_dataset, EXOS_DATASET_SUBSCRIBE + EXOS_DATASET_PUBLISH, datasetEvent)"));
    assert!(init.contains("exos_dataset_connect(&Start_dataset, EXOS_DATASET_PUBLISH, datasetEvent)"));
    assert!(init.contains("exos_datamodel_connect_motor(&motor_datamodel, datamodelEvent)"));
}

#[test]
fn unknown_types_abort_generation() {
    let schema = vec![TypeDef::new_struct(
        "Broken",
        vec![FieldDecl::new("Missing", "Nowhere").with_comment("PUB")],
    )];
    let mut resolver = TypeResolver::new(&schema);
    assert_eq!(
        resolver.resolve_datamodel("Broken").unwrap_err(),
        ResolveError::SchemaNotFound("Nowhere".to_string())
    );

    let options = CodegenOptions { type_name: Some("Nowhere".to_string()), ..Default::default() };
    let err = generate_all(&motor_schema(), &options).unwrap_err();
    assert!(matches!(err, GenerateError::Resolve(ResolveError::SchemaNotFound(_))));
}

#[test]
fn dataset_handles_never_reuse_typedef_names() {
    let artifacts = generate_all(&motor_schema(), &CodegenOptions::default()).unwrap();
    let header = artifacts.get("Motor/Linux/exos_motor.h").unwrap();
    let module = artifacts.get("Motor/Linux/libmotor.c").unwrap();

    let typedefs: Vec<&str> = header
        .lines()
        .filter_map(|line| line.strip_prefix("} ").and_then(|rest| rest.strip_suffix(';')))
        .collect();
    assert!(typedefs.contains(&"Status"));

    let handles: Vec<&str> = module
        .lines()
        .filter_map(|line| line.strip_prefix("obj_handles ").and_then(|rest| rest.strip_suffix(" = {};")))
        .collect();
    assert!(handles.contains(&"Status_handle"));
    for handle in &handles {
        assert!(!typedefs.contains(handle), "{} is also a typedef", handle);
    }

    let status = function_body(module, "static void Status_onchange_js_cb(");
    assert!(status.contains("napi_get_reference_value(env, Status_handle.ref, &Status_handle.object_value)"));
    assert!(!module.contains("Status.value"));
}

#[test]
fn identifier_colliding_with_a_type_is_rejected() {
    let schema = vec![
        TypeDef::new_struct("Plant", vec![FieldDecl::new("Feed", "Feed_dataset").with_comment("PUB")]),
        TypeDef::new_struct("Feed_dataset", vec![FieldDecl::new("Rate", "REAL")]),
    ];
    let mut resolver = TypeResolver::new(&schema);
    let datamodel = resolver.resolve_datamodel("Plant").unwrap();
    let err = NapiCodeGenerator::new(&datamodel, NapiCodeGeneratorOptions::default()).emit_code().unwrap_err();
    assert_eq!(err, EmitError::IdentifierCollision { identifier: "Feed_dataset".to_string() });
}
