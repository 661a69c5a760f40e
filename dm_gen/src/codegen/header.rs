use crate::schema::{Datamodel, Field, FieldType, LeafType, TypeResolver};
use dm_types::SchemaSource;

/* Header guard derived from the datamodel name */
fn guard_name(datamodel: &str) -> String {
    format!("_EXOS_COMP_{}_H_", datamodel.to_uppercase())
}

pub fn header_file_name(datamodel: &str) -> String {
    format!("exos_{}.h", datamodel.to_lowercase())
}

/* `int16_t Speed[4]`, `char Label[2][81]` */
fn field_declaration(field: &Field) -> String {
    let mut declaration = format!("{} {}", field.c_type_name(), field.name);
    if field.is_array() {
        declaration.push_str(&format!("[{}]", field.array_size));
    }
    if let FieldType::Leaf(LeafType::String { length }) = &field.ty {
        declaration.push_str(&format!("[{}]", length + 1));
    }
    declaration
}

/// Emit the C header shared by both sides of the exchange.
///
/// Enums stay C enums here; only marshalling code sees them as `int32_t`.
/// Private fields are declared so the struct layout matches the controller.
pub fn emit_header<S: SchemaSource + ?Sized>(
    datamodel: &Datamodel,
    resolver: &TypeResolver<'_, S>,
    source_file: &str,
) -> String {
    let guard = guard_name(&datamodel.name);
    let mut output = String::new();

    output.push_str(&format!("/* Generated by dm-gen from {}. Do not edit. */\n\n", source_file));
    output.push_str(&format!("#ifndef {}\n#define {}\n\n", guard, guard));
    output.push_str("#include <stdint.h>\n");
    output.push_str("#include <stdbool.h>\n\n");

    for (name, enum_type) in &resolver.enums {
        output.push_str(&format!("typedef enum {}\n{{\n", name));
        let variants = enum_type.numbered_variants();
        for (index, (variant, value)) in variants.iter().enumerate() {
            let separator = if index + 1 < variants.len() { "," } else { "" };
            output.push_str(&format!("    {} = {}{}\n", variant, value, separator));
        }
        output.push_str(&format!("}} {};\n\n", name));
    }

    for record in resolver.records_in_order() {
        output.push_str(&format!("typedef struct {}\n{{\n", record.name));
        for field in &record.fields {
            output.push_str(&format!("    {};", field_declaration(field)));
            if let Some(comment) = field.comment.as_deref().filter(|comment| !comment.is_empty()) {
                output.push_str(&format!(" //{}", comment));
            }
            output.push('\n');
        }
        output.push_str(&format!("}} {};\n\n", record.name));
    }

    /* datamodel registration bound to this type's name */
    let lower = datamodel.name.to_lowercase();
    output.push_str("#ifndef EXOS_INCLUDE_ONLY_DATATYPE\n");
    output.push_str(&format!(
        "#define exos_datamodel_connect_{}(datamodel, event_callback) exos_datamodel_connect(datamodel, \"{}\", event_callback)\n",
        lower, datamodel.name
    ));
    output.push_str("#endif\n\n");

    output.push_str(&format!("#endif // {}\n", guard));
    output
}
