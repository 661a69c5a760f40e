use super::{ModuleContext, SourceWriter};
use crate::codegen::shared::{flatten_dataset, render, Direction, EmitError};

/* `if(...)` for the first dataset, `else if(...)` for the rest */
fn dataset_branch(writer: &mut SourceWriter, first: bool, name: &str) {
    let prefix = if first { "" } else { "else " };
    writer.line(2, format!("{}if (0 == strcmp(dataset->name, \"{}\"))", prefix, name));
}

fn call_threadsafe(writer: &mut SourceWriter, indent_lv: usize, function: &str, data: &str) {
    writer.line(indent_lv, format!("if ({} != NULL)", function));
    writer.line(indent_lv, "{");
    writer.line(indent_lv + 1, format!("napi_acquire_threadsafe_function({});", function));
    writer.line(
        indent_lv + 1,
        format!("napi_call_threadsafe_function({}, {}, napi_tsfn_blocking);", function, data),
    );
    writer.line(
        indent_lv + 1,
        format!("napi_release_threadsafe_function({}, napi_tsfn_release);", function),
    );
    writer.line(indent_lv, "}");
}

/// Dataset and datamodel event handlers registered with the exOS API.
pub fn emit_exos_callbacks(ctx: &ModuleContext<'_>) -> String {
    let mut writer = SourceWriter::new();
    writer.line(0, "// exOS callbacks");
    writer.line(
        0,
        "static void datasetEvent(exos_dataset_handle_t *dataset, EXOS_DATASET_EVENT_TYPE event_type, void *info)",
    );
    writer.line(0, "{");
    writer.line(1, "switch (event_type)");
    writer.line(1, "{");

    writer.line(1, "case EXOS_DATASET_EVENT_UPDATED:");
    writer.line(
        2,
        "VERBOSE(\"dataset %s updated! latency (us):%i\", dataset->name, (exos_datamodel_get_nettime(dataset->datamodel) - dataset->nettime));",
    );
    for (index, dataset) in ctx.published().enumerate() {
        dataset_branch(&mut writer, index == 0, &dataset.name);
        writer.line(2, "{");
        call_threadsafe(
            &mut writer,
            3,
            &format!("{}.onchange_cb", ModuleContext::handle_name(dataset)),
            "&dataset->nettime",
        );
        writer.line(2, "}");
    }
    writer.line(2, "break;");
    writer.blank();

    writer.line(1, "case EXOS_DATASET_EVENT_PUBLISHED:");
    writer.line(2, "VERBOSE(\"dataset %s published!\", dataset->name);");
    writer.line(2, "// fall through");
    writer.blank();
    writer.line(1, "case EXOS_DATASET_EVENT_DELIVERED:");
    writer.line(
        2,
        "if (event_type == EXOS_DATASET_EVENT_DELIVERED) { VERBOSE(\"dataset %s delivered!\", dataset->name); }",
    );
    for (index, dataset) in ctx.subscribed().enumerate() {
        dataset_branch(&mut writer, index == 0, &dataset.name);
        writer.line(2, "{");
        let c_type = dataset.c_type_name();
        writer.line(3, format!("//{} *{} = ({} *)dataset->data;", c_type, dataset.name.to_lowercase(), c_type));
        writer.line(2, "}");
    }
    writer.line(2, "break;");
    writer.blank();

    writer.line(1, "case EXOS_DATASET_EVENT_CONNECTION_CHANGED:");
    writer.line(
        2,
        "VERBOSE(\"dataset %s connection changed to: %s\", dataset->name, exos_get_state_string(dataset->connection_state));",
    );
    for (index, dataset) in ctx.datasets.iter().enumerate() {
        dataset_branch(&mut writer, index == 0, &dataset.name);
        writer.line(2, "{");
        call_threadsafe(
            &mut writer,
            3,
            &format!("{}.connectiononchange_cb", ModuleContext::handle_name(dataset)),
            "exos_get_state_string(dataset->connection_state)",
        );
        writer.line(2, "}");
    }
    writer.line(2, "break;");
    writer.line(1, "default:");
    writer.line(2, "break;");
    writer.line(1, "}");
    writer.line(0, "}");
    writer.blank();

    writer.line(
        0,
        "static void datamodelEvent(exos_datamodel_handle_t *datamodel, const EXOS_DATAMODEL_EVENT_TYPE event_type, void *info)",
    );
    writer.line(0, "{");
    writer.line(1, "switch (event_type)");
    writer.line(1, "{");
    writer.line(1, "case EXOS_DATAMODEL_EVENT_CONNECTION_CHANGED:");
    writer.line(
        2,
        format!(
            "INFO(\"application {} changed state to %s\", exos_get_state_string(datamodel->connection_state));",
            ctx.struct_name()
        ),
    );
    call_threadsafe(
        &mut writer,
        2,
        &format!("{}.connectiononchange_cb", ctx.var_name),
        "exos_get_state_string(datamodel->connection_state)",
    );
    writer.blank();
    writer.line(2, "switch (datamodel->connection_state)");
    writer.line(2, "{");
    writer.line(2, "case EXOS_STATE_DISCONNECTED:");
    writer.line(2, "case EXOS_STATE_CONNECTED:");
    writer.line(3, "break;");
    writer.line(2, "case EXOS_STATE_OPERATIONAL:");
    writer.line(3, format!("SUCCESS(\"{} operational!\");", ctx.struct_name()));
    writer.line(3, "break;");
    writer.line(2, "case EXOS_STATE_ABORTED:");
    writer.line(
        3,
        format!(
            "ERROR(\"{} application error %d (%s) occured\", datamodel->error, exos_get_error_string(datamodel->error));",
            ctx.struct_name()
        ),
    );
    writer.line(3, "break;");
    writer.line(2, "}");
    writer.line(2, "break;");
    writer.line(1, "case EXOS_DATAMODEL_EVENT_SYNC_STATE_CHANGED:");
    writer.line(2, "break;");
    writer.line(1, "default:");
    writer.line(2, "break;");
    writer.line(1, "}");
    writer.line(0, "}");
    writer.blank();
    writer.finish()
}

/// Shared helper turning a JavaScript callback into a threadsafe function.
pub fn emit_onchange_helper() -> String {
    let mut writer = SourceWriter::new();
    writer.line(0, "// napi callback setup main function");
    writer.line(
        0,
        "static napi_value init_napi_onchange(napi_env env, napi_callback_info info, const char *identifier, napi_threadsafe_function_call_js call_js_cb, napi_threadsafe_function *result)",
    );
    writer.line(0, "{");
    writer.line(1, "size_t argc = 1;");
    writer.line(1, "napi_value argv[1];");
    writer.line(1, "napi_value work_name;");
    writer.line(1, "napi_valuetype cb_typ;");
    writer.blank();

    for (call, step) in [
        ("napi_get_cb_info(env, info, &argc, argv, NULL, NULL)", "napi_get_cb_info"),
        ("napi_create_string_utf8(env, identifier, NAPI_AUTO_LENGTH, &work_name)", "napi_create_string_utf8"),
        ("napi_typeof(env, argv[0], &cb_typ)", "napi_typeof"),
    ] {
        writer.guarded(
            1,
            &format!("napi_ok != {}", call),
            &[
                "char msg[100] = {};",
                &format!("strcpy(msg, \"init_napi_onchange() {} failed - \");", step),
                "strncat(msg, identifier, sizeof(msg) - strlen(msg) - 1);",
                "napi_throw_error(env, \"EINVAL\", msg);",
                "return NULL;",
            ],
        );
        if step == "napi_get_cb_info" {
            writer.blank();
            writer.guarded(1, "argc < 1", &["napi_throw_error(env, \"EINVAL\", \"Too few arguments\");", "return NULL;"]);
        }
        writer.blank();
    }

    writer.line(1, "if (cb_typ == napi_function)");
    writer.line(1, "{");
    writer.guarded(
        2,
        "napi_ok != napi_create_threadsafe_function(env, argv[0], NULL, work_name, 0, 1, NULL, NULL, NULL, call_js_cb, result)",
        &[
            "const napi_extended_error_info *error_info;",
            "napi_get_last_error_info(env, &error_info);",
            "napi_throw_error(env, NULL, error_info->error_message);",
            "return NULL;",
        ],
    );
    writer.line(1, "}");
    writer.line(1, "return NULL;");
    writer.line(0, "}");
    writer.blank();
    writer.finish()
}

fn set_connection_flag(writer: &mut SourceWriter, var_name: &str, property: &str, value: &str) {
    writer.line(
        2,
        format!(
            "if (napi_ok != napi_set_named_property(env, {}.object_value, \"{}\", {}))",
            var_name, property, value
        ),
    );
    writer.line(3, format!("napi_throw_error(env, \"EINVAL\", \"Can't set {} property - {}\");", property, var_name));
}

/// JavaScript-side handlers for connection state changes and the cyclic `onProcessed` event.
pub fn emit_connection_callbacks(ctx: &ModuleContext<'_>) -> String {
    let var = &ctx.var_name;
    let mut writer = SourceWriter::new();
    writer.line(0, "// js object callbacks");
    writer.line(
        0,
        format!("static void {}_connonchange_js_cb(napi_env env, napi_value js_cb, void *context, void *data)", var),
    );
    writer.line(0, "{");
    writer.line(1, "const char *string = data;");
    writer.line(1, "napi_value napi_true, napi_false, undefined;");
    writer.blank();
    writer.line(1, "napi_get_undefined(env, &undefined);");
    writer.line(1, "napi_get_boolean(env, true, &napi_true);");
    writer.line(1, "napi_get_boolean(env, false, &napi_false);");
    writer.blank();
    writer.line(
        1,
        format!("if (napi_ok != napi_create_string_utf8(env, string, strlen(string), &{}.value))", var),
    );
    writer.line(2, format!("napi_throw_error(env, \"EINVAL\", \"Can't create utf8 string from char* - {}.value\");", var));
    writer.blank();
    writer.line(1, format!("if (napi_ok != napi_get_reference_value(env, {0}.ref, &{0}.object_value))", var));
    writer.line(2, format!("napi_throw_error(env, \"EINVAL\", \"Can't get reference - {}\");", var));
    writer.blank();

    writer.line(1, format!("switch ({}_datamodel.connection_state)", var));
    writer.line(1, "{");
    for (state, connected, operational) in [
        ("EXOS_STATE_DISCONNECTED", "napi_false", "napi_false"),
        ("EXOS_STATE_CONNECTED", "napi_true", "napi_false"),
        ("EXOS_STATE_OPERATIONAL", "napi_true", "napi_true"),
        ("EXOS_STATE_ABORTED", "napi_false", "napi_false"),
    ] {
        writer.line(1, format!("case {}:", state));
        set_connection_flag(&mut writer, var, "isConnected", connected);
        set_connection_flag(&mut writer, var, "isOperational", operational);
        writer.line(2, "break;");
    }
    writer.line(1, "}");
    writer.blank();
    writer.line(
        1,
        format!(
            "if (napi_ok != napi_set_named_property(env, {0}.object_value, \"connectionState\", {0}.value))",
            var
        ),
    );
    writer.line(2, format!("napi_throw_error(env, \"EINVAL\", \"Can't set connectionState property - {}\");", var));
    writer.blank();
    writer.line(1, "if (napi_ok != napi_call_function(env, undefined, js_cb, 0, NULL, NULL))");
    writer.line(
        2,
        format!(
            "throw_fatal_exception_callbacks(env, \"EINVAL\", \"Can't call onConnectionChange callback - {}\");",
            var
        ),
    );
    writer.line(0, "}");
    writer.blank();

    writer.line(
        0,
        format!("static void {}_onprocessed_js_cb(napi_env env, napi_value js_cb, void *context, void *data)", var),
    );
    writer.line(0, "{");
    writer.line(1, "napi_value undefined;");
    writer.blank();
    writer.line(1, "napi_get_undefined(env, &undefined);");
    writer.blank();
    writer.line(1, "if (napi_ok != napi_call_function(env, undefined, js_cb, 0, NULL, NULL))");
    writer.line(
        2,
        format!(
            "throw_fatal_exception_callbacks(env, \"EINVAL\", \"Error calling onProcessed - {}\");",
            ctx.struct_name()
        ),
    );
    writer.line(0, "}");
    writer.blank();

    for dataset in &ctx.datasets {
        let name = &dataset.name;
        let handle = ModuleContext::handle_name(dataset);
        writer.line(
            0,
            format!("static void {}_connonchange_js_cb(napi_env env, napi_value js_cb, void *context, void *data)", name),
        );
        writer.line(0, "{");
        writer.line(1, "const char *string = data;");
        writer.line(1, "napi_value undefined;");
        writer.blank();
        writer.line(1, "napi_get_undefined(env, &undefined);");
        writer.blank();
        writer.line(
            1,
            format!("if (napi_ok != napi_create_string_utf8(env, string, strlen(string), &{}.value))", handle),
        );
        writer.line(
            2,
            format!("napi_throw_error(env, \"EINVAL\", \"Can't create utf8 string from char* - {}.value\");", handle),
        );
        writer.blank();
        writer.line(1, format!("if (napi_ok != napi_get_reference_value(env, {0}.ref, &{0}.object_value))", handle));
        writer.line(2, format!("napi_throw_error(env, \"EINVAL\", \"Can't get reference - {}\");", name));
        writer.blank();
        writer.line(
            1,
            format!(
                "if (napi_ok != napi_set_named_property(env, {0}.object_value, \"connectionState\", {0}.value))",
                handle
            ),
        );
        writer.line(
            2,
            format!("napi_throw_error(env, \"EINVAL\", \"Can't set connectionState property - {}\");", name),
        );
        writer.blank();
        writer.line(1, "if (napi_ok != napi_call_function(env, undefined, js_cb, 0, NULL, NULL))");
        writer.line(
            2,
            format!(
                "throw_fatal_exception_callbacks(env, \"EINVAL\", \"Can't call onConnectionChange callback - {}\");",
                name
            ),
        );
        writer.line(0, "}");
        writer.blank();
    }
    writer.finish()
}

/// Value-change callbacks: marshal-out of every published dataset.
pub fn emit_value_callbacks(ctx: &ModuleContext<'_>) -> Result<String, EmitError> {
    let mut writer = SourceWriter::new();
    for (index, dataset) in ctx.published().enumerate() {
        if index == 0 {
            writer.line(0, "// js value callbacks");
        }
        let name = &dataset.name;
        let handle = ModuleContext::handle_name(dataset);
        let emission = flatten_dataset(
            dataset,
            &ModuleContext::native_place(dataset),
            &ModuleContext::value_handle(dataset),
            Direction::Out,
        )?;
        let rendered = render(&emission, 1);

        writer.line(
            0,
            format!(
                "static void {}_onchange_js_cb(napi_env env, napi_value js_cb, void *context, void *netTime_exos)",
                name
            ),
        );
        writer.line(0, "{");
        writer.raw(&rendered.declarations);
        writer.line(1, "napi_value undefined, netTime, latency;");
        writer.line(1, "napi_get_undefined(env, &undefined);");
        writer.blank();
        writer.guarded(
            1,
            &format!("napi_ok != napi_get_reference_value(env, {0}.ref, &{0}.object_value)", handle),
            &["napi_throw_error(env, \"EINVAL\", \"Can't get reference\");"],
        );
        writer.blank();
        writer.raw(&rendered.body);
        writer.blank();
        writer.line(
            1,
            format!(
                "int32_t _latency = exos_datamodel_get_nettime(&{}_datamodel) - *(int32_t *)netTime_exos;",
                ctx.var_name
            ),
        );
        writer.line(1, "napi_create_int32(env, *(int32_t *)netTime_exos, &netTime);");
        writer.line(1, "napi_create_int32(env, _latency, &latency);");
        writer.line(1, format!("napi_set_named_property(env, {}.object_value, \"nettime\", netTime);", handle));
        writer.line(1, format!("napi_set_named_property(env, {}.object_value, \"latency\", latency);", handle));
        writer.guarded(
            1,
            &format!("napi_ok != napi_set_named_property(env, {0}.object_value, \"value\", {0}.value)", handle),
            &["napi_throw_error(env, \"EINVAL\", \"Can't set value property\");"],
        );
        writer.blank();
        writer.line(1, "if (napi_ok != napi_call_function(env, undefined, js_cb, 0, NULL, NULL))");
        writer.line(2, "throw_fatal_exception_callbacks(env, \"EINVAL\", \"Can't call onChange callback\");");
        writer.line(0, "}");
        writer.blank();
    }
    Ok(writer.finish())
}

/// Registration entry points that wrap JavaScript callbacks.
pub fn emit_callback_inits(ctx: &ModuleContext<'_>) -> String {
    let mut writer = SourceWriter::new();
    let mut init = |function: &str, label: &str, handler: &str, target: &str| {
        writer.line(0, format!("static napi_value {}(napi_env env, napi_callback_info info)", function));
        writer.line(0, "{");
        writer.line(
            1,
            format!("return init_napi_onchange(env, info, \"{}\", {}, &{});", label, handler, target),
        );
        writer.line(0, "}");
        writer.blank();
    };

    let var = &ctx.var_name;
    let name = ctx.struct_name();
    init(
        &format!("{}_connonchange_init", var),
        &format!("{} connection change", name),
        &format!("{}_connonchange_js_cb", var),
        &format!("{}.connectiononchange_cb", var),
    );
    init(
        &format!("{}_onprocessed_init", var),
        &format!("{} onProcessed", name),
        &format!("{}_onprocessed_js_cb", var),
        &format!("{}.onprocessed_cb", var),
    );
    for dataset in &ctx.datasets {
        init(
            &format!("{}_connonchange_init", dataset.name),
            &format!("{} connection change", dataset.name),
            &format!("{}_connonchange_js_cb", dataset.name),
            &format!("{}.connectiononchange_cb", ModuleContext::handle_name(dataset)),
        );
    }
    for dataset in ctx.published() {
        init(
            &format!("{}_onchange_init", dataset.name),
            &format!("{} dataset change", dataset.name),
            &format!("{}_onchange_js_cb", dataset.name),
            &format!("{}.onchange_cb", ModuleContext::handle_name(dataset)),
        );
    }
    writer.finish()
}

/// Publish methods: marshal-in of every subscribed dataset, then publish.
pub fn emit_publish_methods(ctx: &ModuleContext<'_>) -> Result<String, EmitError> {
    let mut writer = SourceWriter::new();
    for (index, dataset) in ctx.subscribed().enumerate() {
        if index == 0 {
            writer.line(0, "// publish methods");
        }
        let name = &dataset.name;
        let handle = ModuleContext::handle_name(dataset);
        let emission = flatten_dataset(
            dataset,
            &ModuleContext::native_place(dataset),
            &ModuleContext::value_handle(dataset),
            Direction::In,
        )?;
        let rendered = render(&emission, 1);

        writer.line(0, format!("static napi_value {}_publish_method(napi_env env, napi_callback_info info)", name));
        writer.line(0, "{");
        writer.raw(&rendered.declarations);
        writer.blank();
        writer.guarded(
            1,
            &format!("napi_ok != napi_get_reference_value(env, {0}.ref, &{0}.object_value)", handle),
            &["napi_throw_error(env, \"EINVAL\", \"Can't get reference\");", "return NULL;"],
        );
        writer.blank();
        writer.guarded(
            1,
            &format!("napi_ok != napi_get_named_property(env, {0}.object_value, \"value\", &{0}.value)", handle),
            &["napi_throw_error(env, \"EINVAL\", \"Can't get property\");", "return NULL;"],
        );
        writer.blank();
        writer.raw(&rendered.body);
        writer.blank();
        writer.line(1, format!("exos_dataset_publish(&{}_dataset);", name));
        writer.line(1, "return NULL;");
        writer.line(0, "}");
        writer.blank();
    }
    Ok(writer.finish())
}
