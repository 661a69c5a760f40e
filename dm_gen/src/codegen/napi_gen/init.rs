use super::{ModuleContext, SourceWriter};
use crate::codegen::shared::{flatten_defaults, render_declarations, Handle, IrRenderer, OnFailure};
use crate::codegen::shared::{EmitError, TempClass};
use std::collections::BTreeSet;

const LOG_LEVELS: [(&str, &str); 6] = [
    ("error", "exos_log_error(&logger, log_entry);"),
    ("warning", "exos_log_warning(&logger, EXOS_LOG_TYPE_USER, log_entry);"),
    ("success", "exos_log_success(&logger, EXOS_LOG_TYPE_USER, log_entry);"),
    ("info", "exos_log_info(&logger, EXOS_LOG_TYPE_USER, log_entry);"),
    ("debug", "exos_log_debug(&logger, EXOS_LOG_TYPE_USER, log_entry);"),
    ("verbose", "exos_log_warning(&logger, EXOS_LOG_TYPE_USER + EXOS_LOG_TYPE_VERBOSE, log_entry);"),
];

/* `logError`, `logVerbose`, ... */
fn log_handle(level: &str) -> String {
    let mut chars = level.chars();
    match chars.next() {
        Some(first) => format!("log{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => "log".to_string(),
    }
}

/// `<var>.log.<level>(string)` methods forwarding to the exOS logger.
pub fn emit_log_functions(ctx: &ModuleContext<'_>) -> String {
    let mut writer = SourceWriter::new();
    writer.line(0, "//logging functions");
    for (level, call) in LOG_LEVELS {
        writer.line(0, format!("static napi_value log_{}(napi_env env, napi_callback_info info)", level));
        writer.line(0, "{");
        writer.line(1, "napi_value argv[1];");
        writer.line(1, "size_t argc = 1;");
        writer.line(1, "char log_entry[81] = {};");
        writer.line(1, "size_t res;");
        writer.blank();
        writer.line(1, "napi_get_cb_info(env, info, &argc, argv, NULL, NULL);");
        writer.blank();
        writer.guarded(
            1,
            "argc < 1",
            &[
                &format!("napi_throw_error(env, \"EINVAL\", \"Too few arguments for {}.log.{}()\");", ctx.var_name, level),
                "return NULL;",
            ],
        );
        writer.blank();
        writer.guarded(
            1,
            "napi_ok != napi_get_value_string_utf8(env, argv[0], log_entry, sizeof(log_entry), &res)",
            &[
                &format!(
                    "napi_throw_error(env, \"EINVAL\", \"Expected string as argument for {}.log.{}()\");",
                    ctx.var_name, level
                ),
                "return NULL;",
            ],
        );
        writer.blank();
        writer.line(1, call);
        writer.line(1, "return NULL;");
        writer.line(0, "}");
        writer.blank();
    }
    writer.finish()
}

/// Environment cleanup hook, the libuv idle handler and `nettime()`.
pub fn emit_cleanup_and_cyclic(ctx: &ModuleContext<'_>) -> String {
    let var = &ctx.var_name;
    let mut writer = SourceWriter::new();
    writer.line(0, "// cleanup/cyclic");
    writer.line(0, format!("static void cleanup_{}(void *env)", var));
    writer.line(0, "{");
    writer.line(1, "uv_idle_stop(&cyclic_h);");
    writer.blank();
    writer.guarded(
        1,
        &format!("EXOS_ERROR_OK != exos_datamodel_delete(&{}_datamodel)", var),
        &["napi_throw_error(env, \"EINVAL\", \"Can't delete datamodel\");"],
    );
    writer.blank();
    writer.guarded(
        1,
        "EXOS_ERROR_OK != exos_log_delete(&logger)",
        &["napi_throw_error(env, \"EINVAL\", \"Can't delete logger\");"],
    );
    writer.line(0, "}");
    writer.blank();

    writer.line(0, "static void cyclic(uv_idle_t *handle)");
    writer.line(0, "{");
    writer.line(1, "int dummy = 0;");
    writer.line(1, format!("exos_datamodel_process(&{}_datamodel);", var));
    writer.line(1, format!("if ({}.onprocessed_cb != NULL)", var));
    writer.line(1, "{");
    writer.line(2, format!("napi_acquire_threadsafe_function({}.onprocessed_cb);", var));
    writer.line(2, format!("napi_call_threadsafe_function({}.onprocessed_cb, &dummy, napi_tsfn_blocking);", var));
    writer.line(2, format!("napi_release_threadsafe_function({}.onprocessed_cb, napi_tsfn_release);", var));
    writer.line(1, "}");
    writer.line(1, "exos_log_process(&logger);");
    writer.line(0, "}");
    writer.blank();

    writer.line(0, "//read nettime for DataModel");
    writer.line(0, "static napi_value get_net_time(napi_env env, napi_callback_info info)");
    writer.line(0, "{");
    writer.line(1, "napi_value netTime;");
    writer.blank();
    writer.line(
        1,
        format!("if (napi_ok == napi_create_int32(env, exos_datamodel_get_nettime(&{}_datamodel), &netTime))", var),
    );
    writer.line(1, "{");
    writer.line(2, "return netTime;");
    writer.line(1, "}");
    writer.line(1, "return NULL;");
    writer.line(0, "}");
    writer.blank();
    writer.finish()
}

/* `napi_value a, b, c;` or nothing */
fn declare(writer: &mut SourceWriter, names: &[String]) {
    if !names.is_empty() {
        writer.line(1, format!("napi_value {};", names.join(", ")));
    }
}

fn create_or_return(writer: &mut SourceWriter, target: &str) {
    writer.line(1, format!("if (napi_ok != napi_create_object(env, &{}))", target));
    writer.line(2, "return NULL;");
    writer.blank();
}

/// Module entry point called on `require`.
///
/// Builds the application object, seeds every dataset `value` with the default
/// skeleton, then initializes and connects the exOS datamodel and datasets.
pub fn emit_init_function(ctx: &ModuleContext<'_>) -> Result<String, EmitError> {
    let var = &ctx.var_name;
    let name = ctx.struct_name();

    let mut temps: BTreeSet<TempClass> = BTreeSet::new();
    let mut structures = SourceWriter::new();
    for dataset in &ctx.datasets {
        let ds = &dataset.name;
        let handle = ModuleContext::handle_name(dataset);
        let emission = flatten_defaults(dataset, &Handle::External(format!("{}_value", ds)))?;
        temps.extend(emission.temps());
        structures.raw(&IrRenderer::new(OnFailure::ThrowAndReturnNull).render(&emission.body, 1));

        if dataset.flags.published {
            structures.line(
                1,
                format!("napi_create_function(env, NULL, 0, {0}_onchange_init, NULL, &{0}_onchange);", ds),
            );
            structures.line(
                1,
                format!("napi_set_named_property(env, {}.value, \"onChange\", {}_onchange);", handle, ds),
            );
            structures.line(1, format!("napi_set_named_property(env, {}.value, \"nettime\", undefined);", handle));
            structures.line(1, format!("napi_set_named_property(env, {}.value, \"latency\", undefined);", handle));
        }
        if dataset.flags.subscribed {
            structures.line(
                1,
                format!("napi_create_function(env, NULL, 0, {0}_publish_method, NULL, &{0}_publish);", ds),
            );
            structures.line(
                1,
                format!("napi_set_named_property(env, {}.value, \"publish\", {}_publish);", handle, ds),
            );
        }
        structures.line(1, format!("napi_set_named_property(env, {}.value, \"value\", {}_value);", handle, ds));
        structures.line(
            1,
            format!("napi_create_function(env, NULL, 0, {0}_connonchange_init, NULL, &{0}_conn_change);", ds),
        );
        structures.line(
            1,
            format!("napi_set_named_property(env, {}.value, \"onConnectionChange\", {}_conn_change);", handle, ds),
        );
        structures.line(
            1,
            format!("napi_set_named_property(env, {}.value, \"connectionState\", def_string);", handle),
        );
        structures.blank();
    }

    let mut writer = SourceWriter::new();
    writer.line(0, "// init of module, called at \"require\"");
    writer.line(0, format!("static napi_value init_{}(napi_env env, napi_value exports)", var));
    writer.line(0, "{");

    let mut handles = vec![format!("{}_conn_change", var), format!("{}_onprocessed", var)];
    handles.extend(ctx.datasets.iter().map(|dataset| format!("{}_conn_change", dataset.name)));
    declare(&mut writer, &handles);
    declare(&mut writer, &ctx.published().map(|dataset| format!("{}_onchange", dataset.name)).collect::<Vec<_>>());
    declare(&mut writer, &ctx.subscribed().map(|dataset| format!("{}_publish", dataset.name)).collect::<Vec<_>>());
    declare(&mut writer, &ctx.datasets.iter().map(|dataset| format!("{}_value", dataset.name)).collect::<Vec<_>>());
    writer.blank();
    writer.line(1, "napi_value dataModel, getNetTime, undefined, def_bool, def_number, def_string;");
    let log_handles: Vec<String> = LOG_LEVELS.iter().map(|(level, _)| log_handle(level)).collect();
    writer.line(1, format!("napi_value log, {};", log_handles.join(", ")));
    writer.raw(&render_declarations(&temps, 1));
    writer.blank();

    writer.line(1, "napi_get_boolean(env, BUR_NAPI_DEFAULT_BOOL_INIT, &def_bool);");
    writer.line(1, "napi_create_int32(env, BUR_NAPI_DEFAULT_NUM_INIT, &def_number);");
    writer.line(
        1,
        "napi_create_string_utf8(env, BUR_NAPI_DEFAULT_STRING_INIT, strlen(BUR_NAPI_DEFAULT_STRING_INIT), &def_string);",
    );
    writer.line(1, "napi_get_undefined(env, &undefined);");
    writer.blank();

    writer.line(1, "// create base objects");
    create_or_return(&mut writer, "dataModel");
    create_or_return(&mut writer, "log");
    create_or_return(&mut writer, &format!("{}.value", var));
    for dataset in &ctx.datasets {
        create_or_return(&mut writer, &format!("{}.value", ModuleContext::handle_name(dataset)));
    }

    writer.line(1, "// build object structures");
    writer.raw(&structures.finish());

    writer.line(1, "//connect logging functions");
    for ((level, _), handle) in LOG_LEVELS.iter().zip(&log_handles) {
        writer.line(1, format!("napi_create_function(env, NULL, 0, log_{}, NULL, &{});", level, handle));
        writer.line(1, format!("napi_set_named_property(env, log, \"{}\", {});", level, handle));
    }
    writer.blank();

    writer.line(1, "// bind dataset objects to datamodel object");
    for dataset in &ctx.datasets {
        writer.line(
            1,
            format!(
                "napi_set_named_property(env, dataModel, \"{}\", {}.value);",
                dataset.name,
                ModuleContext::handle_name(dataset)
            ),
        );
    }
    for text in [
        format!("napi_set_named_property(env, {}.value, \"dataModel\", dataModel);", var),
        format!("napi_create_function(env, NULL, 0, {0}_connonchange_init, NULL, &{0}_conn_change);", var),
        format!("napi_set_named_property(env, {0}.value, \"onConnectionChange\", {0}_conn_change);", var),
        format!("napi_set_named_property(env, {}.value, \"connectionState\", def_string);", var),
        format!("napi_set_named_property(env, {}.value, \"isConnected\", def_bool);", var),
        format!("napi_set_named_property(env, {}.value, \"isOperational\", def_bool);", var),
        format!("napi_create_function(env, NULL, 0, {0}_onprocessed_init, NULL, &{0}_onprocessed);", var),
        format!("napi_set_named_property(env, {0}.value, \"onProcessed\", {0}_onprocessed);", var),
        "napi_create_function(env, NULL, 0, get_net_time, NULL, &getNetTime);".to_string(),
        format!("napi_set_named_property(env, {}.value, \"nettime\", getNetTime);", var),
        format!("napi_set_named_property(env, {}.value, \"log\", log);", var),
    ] {
        writer.line(1, text);
    }
    writer.blank();

    writer.line(1, "// export application object");
    writer.line(1, format!("napi_set_named_property(env, exports, \"{}\", {}.value);", name, var));
    writer.blank();

    writer.line(1, "// save references to object as globals for this C-file");
    let mut referenced = vec![var.clone()];
    referenced.extend(ctx.datasets.iter().map(|dataset| ModuleContext::handle_name(dataset)));
    for handle in referenced {
        writer.guarded(
            1,
            &format!("napi_ok != napi_create_reference(env, {0}.value, {0}.ref_count, &{0}.ref)", handle),
            &[&format!("napi_throw_error(env, \"EINVAL\", \"Can't create {} reference\");", handle), "return NULL;"],
        );
    }
    writer.blank();

    writer.line(1, "// register clean up hook");
    writer.guarded(
        1,
        &format!("napi_ok != napi_add_env_cleanup_hook(env, cleanup_{}, env)", var),
        &["napi_throw_error(env, \"EINVAL\", \"Can't register cleanup hook\");", "return NULL;"],
    );
    writer.blank();

    writer.line(1, "// exOS inits");
    writer.guarded(
        1,
        &format!("EXOS_ERROR_OK != exos_datamodel_init(&{0}_datamodel, \"{1}\", \"{1}_NodeJS\")", var, name),
        &[&format!("napi_throw_error(env, \"EINVAL\", \"Can't initialize {}\");", name)],
    );
    writer.line(1, format!("{}_datamodel.user_context = NULL;", var));
    writer.line(1, format!("{}_datamodel.user_tag = 0;", var));
    writer.blank();
    for dataset in &ctx.datasets {
        let ds = &dataset.name;
        writer.guarded(
            1,
            &format!(
                "EXOS_ERROR_OK != exos_dataset_init(&{0}_dataset, &{1}_datamodel, \"{0}\", &exos_data.{0}, sizeof(exos_data.{0}))",
                ds, var
            ),
            &[&format!("napi_throw_error(env, \"EINVAL\", \"Can't initialize {}\");", ds)],
        );
        writer.line(1, format!("{}_dataset.user_context = NULL;", ds));
        writer.line(1, format!("{}_dataset.user_tag = 0;", ds));
        writer.blank();
    }

    writer.guarded(
        1,
        &format!("EXOS_ERROR_OK != exos_log_init(&logger, \"{}_0\")", name),
        &[&format!("napi_throw_error(env, \"EINVAL\", \"Can't register logger for {}\");", name)],
    );
    writer.blank();
    writer.line(1, format!("INFO(\"{} starting!\")", name));
    writer.blank();

    writer.line(1, "// exOS register datamodel");
    writer.guarded(
        1,
        &format!(
            "EXOS_ERROR_OK != exos_datamodel_connect_{}(&{}_datamodel, datamodelEvent)",
            name.to_lowercase(),
            var
        ),
        &[&format!("napi_throw_error(env, \"EINVAL\", \"Can't connect {}\");", name)],
    );
    writer.blank();

    writer.line(1, "// exOS register datasets");
    for dataset in &ctx.datasets {
        /* a dataset the controller publishes is one this side subscribes to */
        let mode = match (dataset.flags.published, dataset.flags.subscribed) {
            (true, true) => "EXOS_DATASET_SUBSCRIBE + EXOS_DATASET_PUBLISH",
            (true, false) => "EXOS_DATASET_SUBSCRIBE",
            _ => "EXOS_DATASET_PUBLISH",
        };
        writer.guarded(
            1,
            &format!("EXOS_ERROR_OK != exos_dataset_connect(&{}_dataset, {}, datasetEvent)", dataset.name, mode),
            &[&format!("napi_throw_error(env, \"EINVAL\", \"Can't connect {}\");", dataset.name)],
        );
        writer.blank();
    }

    writer.line(1, "// start up module");
    writer.line(1, "uv_idle_init(uv_default_loop(), &cyclic_h);");
    writer.line(1, "uv_idle_start(&cyclic_h, cyclic);");
    writer.blank();
    writer.line(1, format!("SUCCESS(\"{} started!\")", name));
    writer.line(1, "return exports;");
    writer.line(0, "}");
    writer.blank();
    Ok(writer.finish())
}
