use crate::codegen::header::header_file_name;
use crate::codegen::napi_gen::{
    emit_callback_inits, emit_cleanup_and_cyclic, emit_connection_callbacks, emit_exos_callbacks,
    emit_init_function, emit_log_functions, emit_onchange_helper, emit_publish_methods,
    emit_value_callbacks, ModuleContext, SourceWriter,
};
use crate::codegen::shared::EmitError;
use crate::schema::Datamodel;

pub fn module_file_name(datamodel: &str) -> String {
    format!("lib{}.c", datamodel.to_lowercase())
}

pub struct NapiCodeGenerator<'d> {
    options: NapiCodeGeneratorOptions,
    ctx: ModuleContext<'d>,
}

#[derive(Debug, Clone)]
pub struct NapiCodeGeneratorOptions {
    pub emit_known_issues: bool,
    /* N-API version pinned by the generated module */
    pub napi_version: u32,
}

impl Default for NapiCodeGeneratorOptions {
    fn default() -> Self {
        Self { emit_known_issues: true, napi_version: 6 }
    }
}

impl<'d> NapiCodeGenerator<'d> {
    pub fn new(datamodel: &'d Datamodel, options: NapiCodeGeneratorOptions) -> Self {
        Self { options, ctx: ModuleContext::new(datamodel) }
    }

    /// Complete `lib<name>.c` source, or the first emission failure.
    pub fn emit_code(&self) -> Result<String, EmitError> {
        self.ctx.check_identifiers()?;
        let mut output = self.emit_preamble();
        output.push_str(&emit_exos_callbacks(&self.ctx));
        output.push_str(&emit_onchange_helper());
        output.push_str(&emit_connection_callbacks(&self.ctx));
        output.push_str(&emit_value_callbacks(&self.ctx)?);
        output.push_str(&emit_callback_inits(&self.ctx));
        output.push_str(&emit_publish_methods(&self.ctx)?);
        output.push_str(&emit_log_functions(&self.ctx));
        output.push_str(&emit_cleanup_and_cyclic(&self.ctx));
        output.push_str(&emit_init_function(&self.ctx)?);
        output.push_str("// hook for Node-API\n");
        output.push_str(&format!("NAPI_MODULE(NODE_GYP_MODULE_NAME, init_{});\n", self.ctx.var_name));
        Ok(output)
    }

    fn emit_preamble(&self) -> String {
        let var = &self.ctx.var_name;
        let mut writer = SourceWriter::new();

        if self.options.emit_known_issues {
            writer.line(0, "//KNOWN ISSUES");
            writer.line(0, "/*");
            writer.line(0, "NO range checks are made on numbers. JavaScript only has \"number\", written into SINT, INT etc.");
            writer.line(0, "with a plain cast. Make sure the value written from NodeJS fits the target type.");
            writer.blank();
            writer.line(0, "Strings are utf8 encoded in NodeJS, so multibyte characters reduce the usable length.");
            writer.line(0, "Strings longer than the declared length are rejected with a RangeError (ERANGE).");
            writer.blank();
            writer.line(0, "Enums are exchanged as int32_t numbers.");
            writer.line(0, "*/");
            writer.blank();
        }

        writer.line(0, format!("#define NAPI_VERSION {}", self.options.napi_version));
        writer.line(0, "#include <node_api.h>");
        writer.line(0, "#include <stdint.h>");
        writer.line(0, "#include <exos_api.h>");
        writer.line(0, "#include <exos_log.h>");
        writer.line(0, format!("#include \"{}\"", header_file_name(self.ctx.struct_name())));
        writer.line(0, "#include <uv.h>");
        writer.line(0, "#include <unistd.h>");
        writer.line(0, "#include <string.h>");
        writer.blank();
        writer.line(0, "#define SUCCESS(_format_, ...) exos_log_success(&logger, EXOS_LOG_TYPE_USER, _format_, ##__VA_ARGS__);");
        writer.line(0, "#define INFO(_format_, ...) exos_log_info(&logger, EXOS_LOG_TYPE_USER, _format_, ##__VA_ARGS__);");
        writer.line(
            0,
            "#define VERBOSE(_format_, ...) exos_log_debug(&logger, EXOS_LOG_TYPE_USER + EXOS_LOG_TYPE_VERBOSE, _format_, ##__VA_ARGS__);",
        );
        writer.line(0, "#define ERROR(_format_, ...) exos_log_error(&logger, _format_, ##__VA_ARGS__);");
        writer.blank();
        writer.line(0, "#define BUR_NAPI_DEFAULT_BOOL_INIT false");
        writer.line(0, "#define BUR_NAPI_DEFAULT_NUM_INIT 0");
        writer.line(0, "#define BUR_NAPI_DEFAULT_STRING_INIT \"\"");
        writer.blank();
        writer.line(0, "static exos_log_handle_t logger;");
        writer.blank();
        writer.line(0, "typedef struct");
        writer.line(0, "{");
        writer.line(1, "napi_ref ref;");
        writer.line(1, "uint32_t ref_count;");
        writer.line(1, "napi_threadsafe_function onchange_cb;");
        writer.line(1, "napi_threadsafe_function connectiononchange_cb;");
        writer.line(1, "napi_threadsafe_function onprocessed_cb; //used only for datamodel");
        writer.line(1, "napi_value object_value; //volatile placeholder.");
        writer.line(1, "napi_value value;        //volatile placeholder.");
        writer.line(0, "} obj_handles;");
        writer.blank();
        writer.line(0, format!("obj_handles {} = {{}};", var));
        for dataset in &self.ctx.datasets {
            writer.line(0, format!("obj_handles {} = {{}};", ModuleContext::handle_name(dataset)));
        }
        writer.blank();
        writer.line(0, "uv_idle_t cyclic_h;");
        writer.blank();
        writer.line(0, format!("{} exos_data = {{}};", self.ctx.struct_name()));
        writer.line(0, format!("exos_datamodel_handle_t {}_datamodel;", var));
        for dataset in &self.ctx.datasets {
            writer.line(0, format!("exos_dataset_handle_t {}_dataset;", dataset.name));
        }
        writer.blank();

        writer.line(0, "// error handling (Node.js)");
        writer.line(
            0,
            "static void throw_fatal_exception_callbacks(napi_env env, const char *defaultCode, const char *defaultMessage)",
        );
        writer.line(0, "{");
        writer.line(1, "napi_value err;");
        writer.line(1, "bool is_exception = false;");
        writer.blank();
        writer.line(1, "napi_is_exception_pending(env, &is_exception);");
        writer.blank();
        writer.line(1, "if (is_exception)");
        writer.line(1, "{");
        writer.line(2, "napi_get_and_clear_last_exception(env, &err);");
        writer.line(2, "napi_fatal_exception(env, err);");
        writer.line(1, "}");
        writer.line(1, "else");
        writer.line(1, "{");
        writer.line(2, "napi_value code, msg;");
        writer.line(2, "napi_create_string_utf8(env, defaultCode, NAPI_AUTO_LENGTH, &code);");
        writer.line(2, "napi_create_string_utf8(env, defaultMessage, NAPI_AUTO_LENGTH, &msg);");
        writer.line(2, "napi_create_error(env, code, msg, &err);");
        writer.line(2, "napi_fatal_exception(env, err);");
        writer.line(1, "}");
        writer.line(0, "}");
        writer.blank();
        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeResolver;
    use dm_types::{FieldDecl, TypeDef};

    fn motor_module() -> String {
        let schema = vec![TypeDef::new_struct(
            "Motor",
            vec![
                FieldDecl::new("Speed", "INT").with_comment("PUB"),
                FieldDecl::new("Target", "REAL").with_comment("SUB"),
                FieldDecl::new("Internal", "DINT"),
            ],
        )];
        let mut resolver = TypeResolver::new(&schema);
        let datamodel = resolver.resolve_datamodel("Motor").unwrap();
        NapiCodeGenerator::new(&datamodel, NapiCodeGeneratorOptions::default()).emit_code().unwrap()
    }

    #[test]
    fn only_exchanged_datasets_get_handles() {
        let source = motor_module();
        assert!(source.contains("obj_handles Speed_handle = {};"));
        assert!(source.contains("obj_handles Target_handle = {};"));
        assert!(!source.contains("obj_handles Internal"));
        assert!(source.contains("#include \"exos_motor.h\""));
    }

    #[test]
    fn sections_follow_the_module_layout() {
        let source = motor_module();
        let order = [
            "static void datasetEvent(",
            "static napi_value init_napi_onchange(",
            "static void motor_connonchange_js_cb(",
            "static void Speed_onchange_js_cb(",
            "static napi_value Speed_onchange_init(",
            "static napi_value Target_publish_method(",
            "static napi_value log_error(",
            "static void cleanup_motor(",
            "static napi_value init_motor(",
            "NAPI_MODULE(NODE_GYP_MODULE_NAME, init_motor);",
        ];
        let positions: Vec<usize> = order.iter().map(|marker| source.find(marker).unwrap()).collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn onchange_does_not_republish() {
        let source = motor_module();
        let start = source.find("static void Speed_onchange_js_cb(").unwrap();
        let end = start + source[start..].find("\n}\n").unwrap();
        assert!(!source[start..end].contains("exos_dataset_publish"));
        assert!(source.contains("exos_dataset_publish(&Target_dataset);"));
    }
}
