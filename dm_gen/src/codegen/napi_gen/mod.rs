pub mod callbacks;
pub mod init;

pub use callbacks::{
    emit_callback_inits, emit_connection_callbacks, emit_exos_callbacks, emit_onchange_helper,
    emit_publish_methods, emit_value_callbacks,
};
pub use init::{emit_cleanup_and_cyclic, emit_init_function, emit_log_functions};

use crate::codegen::shared::{EmitError, Handle, Place};
use crate::schema::{Datamodel, Field, FieldType, Record};
use std::collections::BTreeSet;

/* C identifier of the datamodel handle; an all-lowercase name gets a suffix so it cannot shadow the type */
pub fn datamodel_var_name(name: &str) -> String {
    let lower = name.to_lowercase();
    if lower == name {
        format!("{}_datamodel", lower)
    } else {
        lower
    }
}

/// Names and datasets shared by every section of a generated N-API module.
pub struct ModuleContext<'d> {
    pub datamodel: &'d Datamodel,
    pub var_name: String,
    /// Non-private datasets that are published, subscribed or both.
    pub datasets: Vec<&'d Field>,
}

impl<'d> ModuleContext<'d> {
    pub fn new(datamodel: &'d Datamodel) -> Self {
        let datasets = datamodel
            .datasets()
            .filter(|dataset| dataset.flags.published || dataset.flags.subscribed)
            .collect();
        Self { datamodel, var_name: datamodel_var_name(&datamodel.name), datasets }
    }

    pub fn struct_name(&self) -> &str {
        &self.datamodel.name
    }

    pub fn published(&self) -> impl Iterator<Item = &&'d Field> {
        self.datasets.iter().filter(|dataset| dataset.flags.published)
    }

    pub fn subscribed(&self) -> impl Iterator<Item = &&'d Field> {
        self.datasets.iter().filter(|dataset| dataset.flags.subscribed)
    }

    /// Native storage of a dataset inside the module's `exos_data` instance.
    pub fn native_place(dataset: &Field) -> Place {
        Place::new("exos_data").field(&dataset.name)
    }

    /// File-scope `obj_handles` of a dataset; suffixed so a dataset named like its type still compiles.
    pub fn handle_name(dataset: &Field) -> String {
        format!("{}_handle", dataset.name)
    }

    /// The `value` slot of a dataset's handle object.
    pub fn value_handle(dataset: &Field) -> Handle {
        Handle::External(format!("{}.value", Self::handle_name(dataset)))
    }

    /* Identifiers the module declares at file scope */
    pub fn file_scope_identifiers(&self) -> Vec<String> {
        let mut identifiers = vec![
            self.var_name.clone(),
            format!("{}_datamodel", self.var_name),
            "exos_data".to_string(),
            "logger".to_string(),
            "cyclic_h".to_string(),
        ];
        for dataset in &self.datasets {
            identifiers.push(Self::handle_name(dataset));
            identifiers.push(format!("{}_dataset", dataset.name));
        }
        identifiers
    }

    /* Every name the header typedefs: the root, reachable records and enums */
    pub fn typedef_names(&self) -> BTreeSet<String> {
        fn visit(record: &Record, names: &mut BTreeSet<String>) {
            if !names.insert(record.name.clone()) {
                return;
            }
            for field in &record.fields {
                if let Some(enum_name) = &field.enum_name {
                    names.insert(enum_name.clone());
                }
                if let FieldType::Record(inner) = &field.ty {
                    visit(inner, names);
                }
            }
        }
        let mut names = BTreeSet::new();
        visit(&self.datamodel.root, &mut names);
        names
    }

    /// Fail when a generated file-scope identifier reuses a typedef name.
    pub fn check_identifiers(&self) -> Result<(), EmitError> {
        let typedefs = self.typedef_names();
        match self.file_scope_identifiers().into_iter().find(|identifier| typedefs.contains(identifier)) {
            Some(identifier) => Err(EmitError::IdentifierCollision { identifier }),
            None => Ok(()),
        }
    }
}

/* Line-oriented C source builder */
#[derive(Default)]
pub struct SourceWriter {
    output: String,
}

impl SourceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, indent_lv: usize, text: impl AsRef<str>) {
        self.output.push_str(&"    ".repeat(indent_lv));
        self.output.push_str(text.as_ref());
        self.output.push('\n');
    }

    pub fn blank(&mut self) {
        self.output.push('\n');
    }

    /* Append pre-rendered text as is */
    pub fn raw(&mut self, text: &str) {
        self.output.push_str(text);
    }

    /* `if (cond)` followed by an indented block */
    pub fn guarded(&mut self, indent_lv: usize, condition: &str, body: &[&str]) {
        self.line(indent_lv, format!("if ({})", condition));
        self.line(indent_lv, "{");
        for text in body {
            self.line(indent_lv + 1, text);
        }
        self.line(indent_lv, "}");
    }

    pub fn finish(self) -> String {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase_datamodel_names_get_a_suffix() {
        assert_eq!(datamodel_var_name("Motor"), "motor");
        assert_eq!(datamodel_var_name("motor"), "motor_datamodel");
    }

    #[test]
    fn guarded_block_is_indented() {
        let mut writer = SourceWriter::new();
        writer.guarded(1, "argc < 1", &["return NULL;"]);
        assert_eq!(writer.finish(), "    if (argc < 1)\n    {\n        return NULL;\n    }\n");
    }
}
