use crate::codegen::header::header_file_name;
use crate::codegen::napi::module_file_name;
use crate::codegen::napi_gen::{datamodel_var_name, SourceWriter};
use crate::schema::{Datamodel, Field, FieldType, LeafType};
use dm_loader::{DatamodelMetadata, Packaging};
use serde_json::json;

/// Everything the packaging files need to know about one component.
pub struct PackageSettings<'a> {
    pub datamodel: &'a Datamodel,
    pub metadata: &'a DatamodelMetadata,
    pub packaging: Packaging,
    pub destination: String,
    /* Root datamodel file name, quoted in descriptions */
    pub source_file: String,
}

impl PackageSettings<'_> {
    fn lower(&self) -> String {
        self.datamodel.name.to_lowercase()
    }

    fn node_module(&self) -> String {
        format!("l_{}.node", self.datamodel.name)
    }

    fn deb_file(&self) -> String {
        format!("exos-comp-{}-{}.deb", self.lower(), self.metadata.version)
    }

    fn script_file(&self) -> String {
        format!("{}.js", self.lower())
    }
}

/// Glue files of a component, keyed by path relative to the component directory.
#[derive(Debug, Clone, Default)]
pub struct PackageFiles {
    pub files: Vec<(String, String)>,
}

impl PackageFiles {
    pub fn generate(settings: &PackageSettings<'_>) -> Result<Self, serde_json::Error> {
        let mut files = vec![
            (format!("{}.exospkg", settings.datamodel.name), emit_exospkg(settings)),
            ("Linux/Linux.pkg".to_string(), emit_linux_pkg(settings)),
            ("Linux/package.json".to_string(), emit_package_json(settings)?),
            ("Linux/package-lock.json".to_string(), emit_package_lock(settings)?),
            ("Linux/binding.gyp".to_string(), emit_binding_gyp(settings)),
            ("Linux/build.sh".to_string(), emit_build_script(settings)),
            (format!("Linux/{}", settings.script_file()), emit_index_js(settings.datamodel)),
        ];
        if settings.packaging == Packaging::Deb {
            files.push(("Linux/CMakeLists.txt".to_string(), emit_cmake_lists(settings)));
        }
        Ok(Self { files })
    }
}

pub fn emit_package_json(settings: &PackageSettings<'_>) -> Result<String, serde_json::Error> {
    let package = json!({
        "name": datamodel_var_name(&settings.datamodel.name),
        "version": settings.metadata.version,
        "description": format!(
            "implementation of exOS data exchange defined by datatype {} from file {}",
            settings.datamodel.name, settings.source_file
        ),
        "main": settings.script_file(),
        "scripts": { "start": format!("node {}", settings.script_file()) },
        "author": "your name",
        "license": "MIT",
    });
    Ok(serde_json::to_string_pretty(&package)? + "\n")
}

pub fn emit_package_lock(settings: &PackageSettings<'_>) -> Result<String, serde_json::Error> {
    let lock = json!({
        "name": datamodel_var_name(&settings.datamodel.name),
        "version": settings.metadata.version,
        "lockfileVersion": 1,
    });
    Ok(serde_json::to_string_pretty(&lock)? + "\n")
}

pub fn emit_binding_gyp(settings: &PackageSettings<'_>) -> String {
    let mut writer = SourceWriter::new();
    writer.line(0, "{");
    writer.line(0, "  \"targets\": [");
    writer.line(0, "    {");
    writer.line(0, format!("      \"target_name\": \"l_{}\",", settings.datamodel.name));
    writer.line(0, "      \"sources\": [");
    writer.line(0, format!("        \"{}\"", module_file_name(&settings.datamodel.name)));
    writer.line(0, "      ],");
    writer.line(0, "      \"include_dirs\": [");
    writer.line(0, "        '/usr/include'");
    writer.line(0, "      ],");
    writer.line(0, "      'link_settings': {");
    writer.line(0, "        'libraries': [");
    writer.line(0, "          '-lexos-api',");
    writer.line(0, "          '-lzmq'");
    writer.line(0, "        ]");
    writer.line(0, "      }");
    writer.line(0, "    }");
    writer.line(0, "  ]");
    writer.line(0, "}");
    writer.finish()
}

pub fn emit_cmake_lists(settings: &PackageSettings<'_>) -> String {
    let lower = settings.lower();
    let upper = settings.datamodel.name.to_uppercase();
    let mut version = settings.metadata.version.split('.').map(str::to_string);
    let major = version.next().unwrap_or_else(|| "1".to_string());
    let minor = version.next().unwrap_or_else(|| "0".to_string());
    let patch = version.next().unwrap_or_else(|| "0".to_string());

    let mut writer = SourceWriter::new();
    writer.line(0, format!("project({})", lower));
    writer.line(0, "cmake_minimum_required(VERSION 3.0)");
    writer.blank();
    writer.line(0, format!("set({}_MODULE_FILES", upper));
    writer.line(1, settings.node_module());
    writer.line(1, settings.script_file());
    writer.line(1, "package.json");
    writer.line(1, "package-lock.json)");
    writer.blank();
    writer.line(0, format!("install(FILES ${{{}_MODULE_FILES}} DESTINATION {})", upper, settings.destination));
    writer.line(0, format!("install(DIRECTORY node_modules DESTINATION {}/)", settings.destination));
    writer.blank();
    writer.line(0, "set(CPACK_GENERATOR \"DEB\")");
    writer.line(0, format!("set(CPACK_PACKAGE_NAME exos-comp-{})", lower));
    writer.line(0, format!("set(CPACK_PACKAGE_DESCRIPTION_SUMMARY \"{} summary\")", lower));
    let description = settings.metadata.description.as_deref().unwrap_or("Some description");
    writer.line(0, format!("set(CPACK_PACKAGE_DESCRIPTION \"{}\")", description));
    writer.line(0, "set(CPACK_PACKAGE_VENDOR \"Your Organization\")");
    writer.blank();
    writer.line(0, format!("set(CPACK_PACKAGE_VERSION_MAJOR {})", major));
    writer.line(0, format!("set(CPACK_PACKAGE_VERSION_MINOR {})", minor));
    writer.line(0, format!("set(CPACK_PACKAGE_VERSION_PATCH {})", patch));
    writer.line(
        0,
        format!(
            "set(CPACK_PACKAGE_FILE_NAME exos-comp-{}-${{CPACK_PACKAGE_VERSION_MAJOR}}.${{CPACK_PACKAGE_VERSION_MINOR}}.${{CPACK_PACKAGE_VERSION_PATCH}})",
            lower
        ),
    );
    writer.line(0, "set(CPACK_DEBIAN_PACKAGE_MAINTAINER \"your name\")");
    writer.blank();
    writer.line(0, "set(CPACK_DEBIAN_PACKAGE_SHLIBDEPS ON)");
    writer.blank();
    writer.line(0, "include(CPack)");
    writer.finish()
}

/* With `none` packaging the script stops after the node module is built */
pub fn emit_build_script(settings: &PackageSettings<'_>) -> String {
    let mut writer = SourceWriter::new();
    writer.line(0, "#!/bin/sh");
    writer.blank();
    writer.line(0, "rm -f l_*.node");
    writer.line(0, "rm -f *.deb");
    writer.blank();
    writer.line(0, "finalize() {");
    writer.line(1, "rm -rf build/*");
    writer.line(1, "rm -rf node_modules/*");
    writer.line(1, "rm -f Makefile");
    writer.line(1, "sync");
    writer.line(1, "exit $1");
    writer.line(0, "}");
    writer.blank();
    writer.line(0, "npm install");
    writer.line(0, "if [ \"$?\" -ne 0 ] ; then");
    writer.line(1, "finalize 1");
    writer.line(0, "fi");
    writer.blank();
    writer.line(0, "cp -f build/Release/l_*.node .");
    writer.blank();

    if settings.packaging == Packaging::Deb {
        writer.line(0, "mkdir -p node_modules #make sure the folder exists even if no submodules are needed");
        writer.blank();
        writer.line(0, "rm -rf build/*");
        writer.line(0, "cd build");
        writer.blank();
        for (step, command) in [(2, "cmake -Wno-dev .."), (3, "cpack")] {
            writer.line(0, command);
            writer.line(0, "if [ \"$?\" -ne 0 ] ; then");
            writer.line(1, "cd ..");
            writer.line(1, format!("finalize {}", step));
            writer.line(0, "fi");
            writer.blank();
        }
        writer.line(0, "cp -f exos-comp-*.deb ..");
        writer.blank();
        writer.line(0, "cd ..");
        writer.blank();
    }
    writer.line(0, "finalize 0");
    writer.finish()
}

pub fn emit_linux_pkg(settings: &PackageSettings<'_>) -> String {
    let mut objects = vec![
        "build.sh".to_string(),
        settings.script_file(),
        settings.node_module(),
        "package.json".to_string(),
        "package-lock.json".to_string(),
        "binding.gyp".to_string(),
        header_file_name(&settings.datamodel.name),
        module_file_name(&settings.datamodel.name),
    ];
    if settings.packaging == Packaging::Deb {
        objects.insert(1, "CMakeLists.txt".to_string());
        objects.push(settings.deb_file());
    }

    let mut writer = SourceWriter::new();
    writer.line(0, "<?xml version=\"1.0\" encoding=\"utf-8\"?>");
    writer.line(0, "<?AutomationStudio FileVersion=\"4.9\"?>");
    writer.line(
        0,
        "<Package SubType=\"exosLinuxPackage\" PackageType=\"exosLinuxPackage\" xmlns=\"http://br-automation.co.at/AS/Package\">",
    );
    writer.line(0, "  <Objects>");
    for object in objects {
        writer.line(0, format!("    <Object Type=\"File\">{}</Object>", object));
    }
    writer.line(0, "  </Objects>");
    writer.line(0, "</Package>");
    writer.finish()
}

pub fn emit_exospkg(settings: &PackageSettings<'_>) -> String {
    let name = &settings.datamodel.name;
    let lower = settings.lower();
    let destination = &settings.destination;

    let mut writer = SourceWriter::new();
    writer.line(0, "<?xml version=\"1.0\" encoding=\"utf-8\"?>");
    writer.line(
        0,
        format!(
            "<ComponentPackage Version=\"{}\" ErrorHandling=\"Ignore\" StartupTimeout=\"0\">",
            settings.metadata.version
        ),
    );
    writer.line(
        1,
        format!(
            "<Service Name=\"{} Runtime Service\" Executable=\"/usr/bin/npm\" Arguments=\"start --prefix {}/\"/>",
            name, destination
        ),
    );
    writer.line(1, format!("<DatamodelInstance Name=\"{}\"/>", name));
    match settings.packaging {
        Packaging::Deb => {
            writer.line(
                1,
                format!(
                    "<File Name=\"exos-comp-{}\" FileName=\"Linux\\{}\" Type=\"Project\"/>",
                    lower,
                    settings.deb_file()
                ),
            );
        }
        Packaging::None => {
            writer.line(
                1,
                format!(
                    "<File Name=\"node-module\" FileName=\"Linux\\{}\" Type=\"Project\"/>",
                    settings.node_module()
                ),
            );
            writer.line(
                1,
                format!(
                    "<Installation Type=\"Prerun\" Command=\"mkdir -p {0}/ &amp;&amp; cp -f {1} {0}/\"/>",
                    destination,
                    settings.node_module()
                ),
            );
        }
    }
    writer.line(
        1,
        format!("<File Name=\"main-script\" FileName=\"Linux\\{}\" Type=\"Project\"/>", settings.script_file()),
    );
    writer.line(
        1,
        format!(
            "<Installation Type=\"Prerun\" Command=\"yes | cp -f {} {}/\"/>",
            settings.script_file(),
            destination
        ),
    );
    writer.line(1, "<Build>");
    writer.line(
        2,
        "<BuildCommand Command=\"C:\\Windows\\Sysnative\\wsl.exe\" WorkingDirectory=\"Linux\" Arguments=\"--distribution Debian --exec ./build.sh\">",
    );
    let mut dependencies = vec![
        header_file_name(name),
        module_file_name(name),
        "binding.gyp".to_string(),
        "package.json".to_string(),
        "package-lock.json".to_string(),
    ];
    if settings.packaging == Packaging::Deb {
        dependencies.insert(0, "CMakeLists.txt".to_string());
    }
    for dependency in dependencies {
        writer.line(3, format!("<Dependency FileName=\"Linux\\{}\"/>", dependency));
    }
    writer.line(2, "</BuildCommand>");
    writer.line(1, "</Build>");
    writer.line(0, "</ComponentPackage>");
    writer.finish()
}

/* `(int16_t[4])`, `(char[80])`, `(Status)` */
fn legend_type(dataset: &Field) -> String {
    let mut legend = format!("({}", dataset.c_type_name());
    if dataset.is_array() {
        legend.push_str(&format!("[{}]", dataset.array_size));
    }
    if let FieldType::Leaf(LeafType::String { length }) = &dataset.ty {
        legend.push_str(&format!("[{}]", length));
    }
    legend.push(')');
    legend
}

fn emit_legend(writer: &mut SourceWriter, datamodel: &Datamodel) {
    let var = datamodel_var_name(&datamodel.name);
    writer.line(0, "/* datamodel features:");
    writer.blank();
    writer.line(0, "main methods:");
    writer.line(1, format!("{}.nettime() : (int32_t) get current nettime", var));
    writer.blank();
    writer.line(0, "state change events:");
    writer.line(1, format!("{}.onConnectionChange(() => {{", var));
    writer.line(
        2,
        format!("{}.connectionState : (string) \"Connected\", \"Operational\", \"Disconnected\" or \"Aborted\"", var),
    );
    writer.line(1, "})");
    writer.blank();
    writer.line(0, "boolean values:");
    writer.line(1, format!("{}.isConnected", var));
    writer.line(1, format!("{}.isOperational", var));
    writer.blank();
    writer.line(0, "logging methods:");
    for level in ["error", "warning", "success", "info", "debug", "verbose"] {
        writer.line(1, format!("{}.log.{}(string)", var, level));
    }

    for dataset in datamodel.datasets() {
        if !(dataset.flags.published || dataset.flags.subscribed) {
            continue;
        }
        let handle = format!("{}.dataModel.{}", var, dataset.name);
        let plural = if matches!(dataset.ty, FieldType::Leaf(_)) && !dataset.is_array() { "" } else { "s" };
        writer.blank();
        writer.line(0, format!("dataset {}:", dataset.name));
        writer.line(1, format!("{}.value : {} actual dataset value{}", handle, legend_type(dataset), plural));
        if dataset.flags.subscribed {
            writer.line(1, format!("{}.publish()", handle));
        }
        if dataset.flags.published {
            writer.line(1, format!("{}.onChange(() => {{", handle));
            writer.line(2, format!("{}.value ...", handle));
            writer.line(2, format!("{}.nettime : (int32_t) nettime @ time of publish", handle));
            writer.line(2, format!("{}.latency : (int32_t) time in us between publish and arrival", handle));
            writer.line(1, "})");
        }
        writer.line(1, format!("{}.onConnectionChange(() => {{", handle));
        writer.line(
            2,
            format!(
                "{}.connectionState : (string) \"Connected\", \"Operational\", \"Disconnected\" or \"Aborted\"",
                handle
            ),
        );
        writer.line(1, "});");
    }
    writer.line(0, "*/");
    writer.blank();
}

/// Application skeleton with a legend of everything the module exposes.
pub fn emit_index_js(datamodel: &Datamodel) -> String {
    let var = datamodel_var_name(&datamodel.name);
    let exchanged: Vec<&Field> = datamodel
        .datasets()
        .filter(|dataset| dataset.flags.published || dataset.flags.subscribed)
        .collect();

    let mut writer = SourceWriter::new();
    writer.line(
        0,
        format!("let {} = require(\"./l_{}.node\").{};", var, datamodel.name, datamodel.name),
    );
    writer.blank();
    emit_legend(&mut writer, datamodel);

    writer.line(0, "//connection state changes");
    writer.line(0, format!("{}.onConnectionChange(() => {{", var));
    writer.line(1, format!("switch ({}.connectionState) {{", var));
    for state in ["Connected", "Operational", "Disconnected", "Aborted"] {
        writer.line(1, format!("case \"{}\":", state));
        writer.line(2, "break;");
    }
    writer.line(1, "}");
    writer.line(0, "});");
    for dataset in &exchanged {
        writer.line(0, format!("{}.dataModel.{}.onConnectionChange(() => {{", var, dataset.name));
        writer.line(1, format!("// switch ({}.dataModel.{}.connectionState) ...", var, dataset.name));
        writer.line(0, "});");
    }
    writer.blank();

    writer.line(0, "//value change events");
    for dataset in exchanged.iter().filter(|dataset| dataset.flags.published) {
        writer.line(0, format!("{}.dataModel.{}.onChange(() => {{", var, dataset.name));
        writer.line(1, format!("//{}.dataModel.{}.value..", var, dataset.name));
        writer.line(0, "});");
    }
    writer.blank();

    writer.line(0, "//Cyclic call triggered from the Component Server");
    writer.line(0, format!("{}.onProcessed(() => {{", var));
    writer.line(1, "//Publish values");
    writer.line(1, format!("//if ({}.isConnected) {{", var));
    for dataset in exchanged.iter().filter(|dataset| dataset.flags.subscribed) {
        writer.line(2, format!("//{}.dataModel.{}.value = ..", var, dataset.name));
        writer.line(2, format!("//{}.dataModel.{}.publish();", var, dataset.name));
    }
    writer.line(1, "//}");
    writer.line(0, "});");
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeResolver;
    use dm_types::{FieldDecl, TypeDef};

    fn motor() -> Datamodel {
        let schema = vec![TypeDef::new_struct(
            "Motor",
            vec![
                FieldDecl::new("Speed", "INT").with_comment("PUB"),
                FieldDecl::new("Label", "STRING").with_string_length(20).with_comment("SUB"),
                FieldDecl::new("Secret", "DINT").with_comment("PUB private"),
            ],
        )];
        TypeResolver::new(&schema).resolve_datamodel("Motor").unwrap()
    }

    fn settings<'a>(datamodel: &'a Datamodel, metadata: &'a DatamodelMetadata, packaging: Packaging) -> PackageSettings<'a> {
        PackageSettings {
            datamodel,
            metadata,
            packaging,
            destination: "/home/user/motor".to_string(),
            source_file: "motor.dm.yaml".to_string(),
        }
    }

    fn metadata() -> DatamodelMetadata {
        DatamodelMetadata { name: "Motor".to_string(), version: "1.2.3".to_string(), description: None }
    }

    #[test]
    fn package_json_describes_the_source_file() {
        let datamodel = motor();
        let metadata = metadata();
        let text = emit_package_json(&settings(&datamodel, &metadata, Packaging::Deb)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["name"], "motor");
        assert_eq!(value["version"], "1.2.3");
        assert_eq!(value["scripts"]["start"], "node motor.js");
        assert_eq!(
            value["description"],
            "implementation of exOS data exchange defined by datatype Motor from file motor.dm.yaml"
        );
    }

    #[test]
    fn none_packaging_skips_cmake() {
        let datamodel = motor();
        let metadata = metadata();
        let files = PackageFiles::generate(&settings(&datamodel, &metadata, Packaging::None)).unwrap();
        assert!(files.files.iter().all(|(path, _)| path != "Linux/CMakeLists.txt"));
        let (_, script) = files.files.iter().find(|(path, _)| path == "Linux/build.sh").unwrap();
        assert!(!script.contains("cpack"));

        let files = PackageFiles::generate(&settings(&datamodel, &metadata, Packaging::Deb)).unwrap();
        let (_, cmake) = files.files.iter().find(|(path, _)| path == "Linux/CMakeLists.txt").unwrap();
        assert!(cmake.contains("set(CPACK_PACKAGE_VERSION_MINOR 2)"));
        assert!(cmake.contains("DESTINATION /home/user/motor)"));
    }

    #[test]
    fn legend_skips_private_datasets() {
        let index = emit_index_js(&motor());
        assert!(index.contains("motor.dataModel.Speed.value : (int16_t) actual dataset value"));
        assert!(index.contains("motor.dataModel.Label.value : (char[20]) actual dataset value"));
        assert!(index.contains("motor.dataModel.Label.publish()"));
        assert!(!index.contains("Secret"));
    }
}
