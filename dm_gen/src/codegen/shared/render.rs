use super::ir::{Direction, Emission, Handle, Place, Stmt, TempClass};
use crate::schema::LeafType;
use std::collections::BTreeSet;

/* What generated code does after reporting a failed conversion */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    /* Value callbacks return void; the pending exception is enough */
    Throw,
    /* Methods hand control back to JavaScript immediately */
    ThrowAndReturnNull,
}

impl From<Direction> for OnFailure {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Out => OnFailure::Throw,
            Direction::In => OnFailure::ThrowAndReturnNull,
        }
    }
}

/// Rendered C text of one emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmission {
    pub declarations: String,
    pub body: String,
}

/* Render an emission with its own declaration block */
pub fn render(emission: &Emission, indent_lv: usize) -> RenderedEmission {
    RenderedEmission {
        declarations: render_declarations(&emission.temps(), indent_lv),
        body: IrRenderer::new(emission.direction.into()).render(&emission.body, indent_lv),
    }
}

/* Declarations for a set of temporaries; container slots share one line */
pub fn render_declarations(temps: &BTreeSet<TempClass>, indent_lv: usize) -> String {
    let indent = IrRenderer::indent(indent_lv);
    let mut output = String::new();

    let slots: Vec<String> = temps
        .iter()
        .filter(|temp| matches!(temp, TempClass::Slot(_)))
        .map(TempClass::identifier)
        .collect();
    if !slots.is_empty() {
        output.push_str(&format!("{}napi_value {};\n", indent, slots.join(", ")));
    }

    for temp in temps.iter().filter(|temp| !matches!(temp, TempClass::Slot(_))) {
        output.push_str(&format!("{}{} {};\n", indent, temp.c_type(), temp.identifier()));
    }
    output
}

pub struct IrRenderer {
    output: String,
    on_failure: OnFailure,
}

impl IrRenderer {
    pub fn new(on_failure: OnFailure) -> Self {
        Self { output: String::new(), on_failure }
    }

    pub fn indent(indent_lv: usize) -> String {
        "    ".repeat(indent_lv)
    }

    pub fn render(mut self, stmts: &[Stmt], indent_lv: usize) -> String {
        for stmt in stmts {
            self.emit_stmt(stmt, indent_lv);
        }
        self.output
    }

    fn line(&mut self, indent_lv: usize, text: &str) {
        self.output.push_str(&Self::indent(indent_lv));
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn emit_stmt(&mut self, stmt: &Stmt, indent_lv: usize) {
        match stmt {
            Stmt::CreateObject { target } => {
                self.line(indent_lv, &format!("napi_create_object(env, &{});", target))
            }
            Stmt::CreateArray { target } => {
                self.line(indent_lv, &format!("napi_create_array(env, &{});", target))
            }
            Stmt::SetNamed { object, name, value } => self.line(
                indent_lv,
                &format!("napi_set_named_property(env, {}, \"{}\", {});", object, name, value),
            ),
            Stmt::SetElement { array, index, value } => self.line(
                indent_lv,
                &format!("napi_set_element(env, {}, {}, {});", array, index, value),
            ),
            Stmt::GetNamed { object, name, target } => self.line(
                indent_lv,
                &format!("napi_get_named_property(env, {}, \"{}\", &{});", object, name, target),
            ),
            Stmt::GetElement { array, index, target } => self.line(
                indent_lv,
                &format!("napi_get_element(env, {}, {}, &{});", array, index, target),
            ),
            Stmt::Assign { target, value } => {
                self.line(indent_lv, &format!("{} = {};", target, value))
            }
            Stmt::LeafOut { leaf, source, target } => self.emit_leaf_out(leaf, source, target, indent_lv),
            Stmt::LeafIn { leaf, source, target } => self.emit_leaf_in(leaf, source, target, indent_lv),
            Stmt::Default { value, target } => {
                self.line(indent_lv, &format!("{} = {};", target, value.c_name()))
            }
            Stmt::ForEach { iterator, count, body } => {
                self.line(
                    indent_lv,
                    &format!("for (uint32_t {0} = 0; {0} < {1}; {0}++)", iterator, count),
                );
                self.line(indent_lv, "{");
                for inner in body {
                    self.emit_stmt(inner, indent_lv + 1);
                }
                self.line(indent_lv, "}");
            }
        }
    }

    /* `if (napi_ok != call) { throw; [return NULL;] }` */
    fn emit_checked(&mut self, indent_lv: usize, call: &str, code: &str, message: &str) {
        self.line(indent_lv, &format!("if (napi_ok != {})", call));
        self.line(indent_lv, "{");
        self.line(indent_lv + 1, &format!("napi_throw_error(env, \"{}\", \"{}\");", code, message));
        if self.on_failure == OnFailure::ThrowAndReturnNull {
            self.line(indent_lv + 1, "return NULL;");
        }
        self.line(indent_lv, "}");
    }

    fn emit_leaf_out(&mut self, leaf: &LeafType, source: &Place, target: &Handle, indent_lv: usize) {
        let (call, kind) = match leaf {
            LeafType::Bool => (format!("napi_get_boolean(env, {}, &{})", source, target), "boolean"),
            LeafType::Integer(int_type) if int_type.is_signed() => (
                format!("napi_create_int32(env, (int32_t){}, &{})", source, target),
                "32bit integer",
            ),
            LeafType::Integer(_) => (
                format!("napi_create_uint32(env, (uint32_t){}, &{})", source, target),
                "32bit unsigned integer",
            ),
            LeafType::Float(_) => (
                format!("napi_create_double(env, (double){}, &{})", source, target),
                "double",
            ),
            LeafType::String { length } => (
                format!(
                    "napi_create_string_utf8(env, {0}, strnlen({0}, {1}), &{2})",
                    source, length, target
                ),
                "utf8 string",
            ),
        };
        self.emit_checked(
            indent_lv,
            &call,
            "EINVAL",
            &format!("Can't convert {} to {}", source.field_path(), kind),
        );
    }

    fn emit_leaf_in(&mut self, leaf: &LeafType, source: &Handle, target: &Place, indent_lv: usize) {
        let path = target.field_path();
        match leaf {
            LeafType::Bool => self.emit_checked(
                indent_lv,
                &format!("napi_get_value_bool(env, {}, &{})", source, target),
                "EINVAL",
                &format!("Expected bool for {}", path),
            ),
            LeafType::Integer(int_type) => {
                self.emit_checked(
                    indent_lv,
                    &format!("napi_get_value_int32(env, {}, &_value)", source),
                    "EINVAL",
                    &format!("Expected number convertible to 32bit integer for {}", path),
                );
                self.line(indent_lv, &format!("{} = ({})_value;", target, int_type.c_type()));
            }
            LeafType::Float(float_type) => {
                self.emit_checked(
                    indent_lv,
                    &format!("napi_get_value_double(env, {}, &__value)", source),
                    "EINVAL",
                    &format!("Expected number convertible to double for {}", path),
                );
                self.line(indent_lv, &format!("{} = ({})__value;", target, float_type.c_type()));
            }
            LeafType::String { length } => {
                self.emit_checked(
                    indent_lv,
                    &format!("napi_get_value_string_utf8(env, {}, NULL, 0, &_r)", source),
                    "EINVAL",
                    &format!("Expected string for {}", path),
                );
                self.line(indent_lv, &format!("if (_r > {})", length));
                self.line(indent_lv, "{");
                self.line(
                    indent_lv + 1,
                    &format!(
                        "napi_throw_range_error(env, \"ERANGE\", \"String too long for {} (max {} bytes)\");",
                        path, length
                    ),
                );
                if self.on_failure == OnFailure::ThrowAndReturnNull {
                    self.line(indent_lv + 1, "return NULL;");
                }
                self.line(indent_lv, "}");
                self.emit_checked(
                    indent_lv,
                    &format!(
                        "napi_get_value_string_utf8(env, {0}, {1}, sizeof({1}), &_r)",
                        source, target
                    ),
                    "EINVAL",
                    &format!("Expected string for {}", path),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IntegerType;

    #[test]
    fn declarations_group_slots_on_one_line() {
        let temps: BTreeSet<TempClass> = [
            TempClass::IntScratch,
            TempClass::Slot(1),
            TempClass::Property,
            TempClass::Slot(0),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            render_declarations(&temps, 1),
            "    napi_value object0, object1;\n    napi_value property;\n    int32_t _value;\n"
        );
    }

    #[test]
    fn integer_leaf_in_casts_from_carrier() {
        let body = IrRenderer::new(OnFailure::ThrowAndReturnNull).render(
            &[Stmt::LeafIn {
                leaf: LeafType::Integer(IntegerType::Usint),
                source: Handle::Slot(1),
                target: Place::new("exos_data").field("Level"),
            }],
            0,
        );
        assert!(body.contains("napi_get_value_int32(env, object1, &_value)"));
        assert!(body.contains("exos_data.Level = (uint8_t)_value;"));
        assert!(body.contains("return NULL;"));
    }

    #[test]
    fn string_leaf_in_checks_bound_before_copy() {
        let body = IrRenderer::new(OnFailure::ThrowAndReturnNull).render(
            &[Stmt::LeafIn {
                leaf: LeafType::String { length: 80 },
                source: Handle::ArrayItem,
                target: Place::new("exos_data").field("Label"),
            }],
            1,
        );
        let measure = body.find("NULL, 0, &_r").unwrap();
        let bound = body.find("if (_r > 80)").unwrap();
        let copy = body.find("sizeof(exos_data.Label)").unwrap();
        assert!(measure < bound && bound < copy);
        assert!(body.contains("napi_throw_range_error(env, \"ERANGE\""));
    }

    #[test]
    fn marshal_out_failures_do_not_return() {
        let body = IrRenderer::new(OnFailure::Throw).render(
            &[Stmt::LeafOut {
                leaf: LeafType::Bool,
                source: Place::new("exos_data").field("Running"),
                target: Handle::Property,
            }],
            0,
        );
        assert!(body.contains("napi_get_boolean(env, exos_data.Running, &property)"));
        assert!(!body.contains("return NULL;"));
    }
}
