use crate::errors::{ReflectError, ReflectResult};
use crate::value::NativeValue;
use dm_gen::codegen::shared::{DefaultValue, Direction, Emission, Handle, Place, Segment, Stmt};
use dm_gen::schema::{Field, FloatType, IntegerType, LeafType};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use tracing::trace;

/// The external handle an emission binds its wire value to, if any.
pub fn wire_root(emission: &Emission) -> Option<Handle> {
    fn find(stmts: &[Stmt]) -> Option<Handle> {
        stmts.iter().find_map(|stmt| {
            let handles: Vec<&Handle> = match stmt {
                Stmt::Assign { target, value } => vec![target, value],
                Stmt::CreateObject { target } | Stmt::CreateArray { target } => vec![target],
                Stmt::GetNamed { object, .. } => vec![object],
                Stmt::GetElement { array, .. } => vec![array],
                Stmt::SetElement { array, .. } => vec![array],
                Stmt::LeafOut { target, .. } | Stmt::Default { target, .. } => vec![target],
                Stmt::LeafIn { source, .. } => vec![source],
                Stmt::SetNamed { object, .. } => vec![object],
                Stmt::ForEach { body, .. } => return find(body),
            };
            handles.into_iter().find(|handle| matches!(handle, Handle::External(_))).cloned()
        })
    }
    find(&emission.body)
}

/// Run a marshal-out program: read `native` (the value of the place root) and
/// return the JavaScript value left in the wire root.
pub fn marshal_out(emission: &Emission, native: &NativeValue) -> ReflectResult<Value> {
    let root = wire_root(emission).ok_or_else(|| ReflectError::UnboundHandle("<wire root>".to_string()))?;
    let mut machine = Machine::new(native.clone());
    machine.run(&emission.body)?;
    machine.read(&root)
}

/// Run a marshal-in program: start from a zeroed value shaped like `root`,
/// bind `wire` to the wire root and return the native value written.
///
/// Private members are never touched and keep their zero value.
pub fn marshal_in(emission: &Emission, root: &Field, wire: &Value) -> ReflectResult<NativeValue> {
    debug_assert_eq!(emission.direction, Direction::In);
    let mut machine = Machine::new(NativeValue::zeroed(root));
    if let Some(handle) = wire_root(emission) {
        machine.handles.insert(handle, wire.clone());
    }
    machine.run(&emission.body)?;
    Ok(machine.native)
}

struct Machine {
    native: NativeValue,
    /* napi_value semantics: every store copies a complete value */
    handles: HashMap<Handle, Value>,
    iterators: HashMap<char, u32>,
}

impl Machine {
    fn new(native: NativeValue) -> Self {
        Self { native, handles: HashMap::new(), iterators: HashMap::new() }
    }

    fn read(&self, handle: &Handle) -> ReflectResult<Value> {
        self.handles
            .get(handle)
            .cloned()
            .ok_or_else(|| ReflectError::UnboundHandle(handle.to_string()))
    }

    fn slot_mut(&mut self, handle: &Handle) -> ReflectResult<&mut Value> {
        self.handles
            .get_mut(handle)
            .ok_or_else(|| ReflectError::UnboundHandle(handle.to_string()))
    }

    fn iterator(&self, iterator: char) -> ReflectResult<usize> {
        self.iterators
            .get(&iterator)
            .map(|index| *index as usize)
            .ok_or(ReflectError::UnboundIterator(iterator))
    }

    fn run(&mut self, stmts: &[Stmt]) -> ReflectResult<()> {
        for stmt in stmts {
            self.step(stmt)?;
        }
        Ok(())
    }

    fn step(&mut self, stmt: &Stmt) -> ReflectResult<()> {
        match stmt {
            Stmt::CreateObject { target } => {
                self.handles.insert(target.clone(), Value::Object(Map::new()));
            }
            Stmt::CreateArray { target } => {
                self.handles.insert(target.clone(), Value::Array(Vec::new()));
            }
            Stmt::SetNamed { object, name, value } => {
                let value = self.read(value)?;
                match self.slot_mut(object)? {
                    Value::Object(map) => {
                        map.insert(name.clone(), value);
                    }
                    _ => return Err(ReflectError::TypeMismatch { expected: "an object", path: object.to_string() }),
                }
            }
            Stmt::SetElement { array, index, value } => {
                let index = self.iterator(*index)?;
                let value = self.read(value)?;
                match self.slot_mut(array)? {
                    Value::Array(items) => {
                        if index >= items.len() {
                            items.resize(index + 1, Value::Null);
                        }
                        items[index] = value;
                    }
                    _ => return Err(ReflectError::TypeMismatch { expected: "an array", path: array.to_string() }),
                }
            }
            Stmt::GetNamed { object, name, target } => {
                let value = match self.slot_mut(object)? {
                    Value::Object(map) => map
                        .get(name)
                        .cloned()
                        .ok_or_else(|| ReflectError::MissingProperty { name: name.clone() })?,
                    _ => return Err(ReflectError::TypeMismatch { expected: "an object", path: object.to_string() }),
                };
                self.handles.insert(target.clone(), value);
            }
            Stmt::GetElement { array, index, target } => {
                let index = self.iterator(*index)?;
                let value = match self.slot_mut(array)? {
                    Value::Array(items) => items
                        .get(index)
                        .cloned()
                        .ok_or(ReflectError::IndexOutOfRange { index, len: items.len() })?,
                    _ => return Err(ReflectError::TypeMismatch { expected: "an array", path: array.to_string() }),
                };
                self.handles.insert(target.clone(), value);
            }
            Stmt::Assign { target, value } => {
                let value = self.read(value)?;
                self.handles.insert(target.clone(), value);
            }
            Stmt::LeafOut { leaf, source, target } => {
                let native = self.native_at(source)?;
                let value = leaf_out(leaf, native, source)?;
                self.handles.insert(target.clone(), value);
            }
            Stmt::LeafIn { leaf, source, target } => {
                let value = self.read(source)?;
                let converted = leaf_in(leaf, &value, target)?;
                *self.native_at(target)? = converted;
            }
            Stmt::Default { value, target } => {
                let value = match value {
                    DefaultValue::Bool => Value::Bool(false),
                    DefaultValue::Number => Value::from(0),
                    DefaultValue::String => Value::String(String::new()),
                };
                self.handles.insert(target.clone(), value);
            }
            Stmt::ForEach { iterator, count, body } => {
                trace!(%iterator, count, "entering loop");
                for index in 0..*count {
                    self.iterators.insert(*iterator, index);
                    self.run(body)?;
                }
                self.iterators.remove(iterator);
            }
        }
        Ok(())
    }

    /* The root identifier of a place always names the bound native value */
    fn native_at(&mut self, place: &Place) -> ReflectResult<&mut NativeValue> {
        let mut indices = Vec::with_capacity(place.segments.len());
        for segment in &place.segments {
            indices.push(match segment {
                Segment::Field(_) => None,
                Segment::Index(iterator) => Some(self.iterator(*iterator)?),
            });
        }

        let mut current = &mut self.native;
        for (segment, index) in place.segments.iter().zip(indices) {
            current = match (segment, current) {
                (Segment::Field(name), NativeValue::Record(members)) => {
                    members.get_mut(name).ok_or_else(|| ReflectError::NativeShape {
                        path: place.to_string(),
                        expected: "a record with this member",
                    })?
                }
                (Segment::Index(_), NativeValue::Array(items)) => {
                    let len = items.len();
                    let index = index.unwrap_or_default();
                    items.get_mut(index).ok_or(ReflectError::IndexOutOfRange { index, len })?
                }
                (Segment::Field(_), _) => {
                    return Err(ReflectError::NativeShape { path: place.to_string(), expected: "a record" })
                }
                (Segment::Index(_), _) => {
                    return Err(ReflectError::NativeShape { path: place.to_string(), expected: "an array" })
                }
            };
        }
        Ok(current)
    }
}

fn leaf_out(leaf: &LeafType, native: &NativeValue, source: &Place) -> ReflectResult<Value> {
    let shape = |expected| ReflectError::NativeShape { path: source.to_string(), expected };
    let value = match (leaf, native) {
        (LeafType::Bool, NativeValue::Bool(value)) => Value::Bool(*value),
        (LeafType::Integer(int_type), NativeValue::Int(value)) if int_type.is_signed() => Value::from(*value as i32),
        (LeafType::Integer(_), NativeValue::Int(value)) => Value::from(*value as u32),
        (LeafType::Float(float_type), NativeValue::Float(value)) => {
            let value = match float_type {
                FloatType::Real => *value as f32 as f64,
                FloatType::Lreal => *value,
            };
            Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
        }
        (LeafType::String { length }, NativeValue::Str(value)) => Value::String(truncate(value, *length as usize)),
        (LeafType::Bool, _) => return Err(shape("a bool")),
        (LeafType::Integer(_), _) => return Err(shape("an integer")),
        (LeafType::Float(_), _) => return Err(shape("a float")),
        (LeafType::String { .. }, _) => return Err(shape("a string")),
    };
    Ok(value)
}

fn leaf_in(leaf: &LeafType, value: &Value, target: &Place) -> ReflectResult<NativeValue> {
    let path = target.field_path();
    match leaf {
        LeafType::Bool => value
            .as_bool()
            .map(NativeValue::Bool)
            .ok_or(ReflectError::TypeMismatch { expected: "bool", path }),
        LeafType::Integer(int_type) => value
            .as_f64()
            .map(|number| NativeValue::Int(narrow(to_int32(number), *int_type)))
            .ok_or(ReflectError::TypeMismatch { expected: "number convertible to 32bit integer", path }),
        LeafType::Float(float_type) => {
            let number = value
                .as_f64()
                .ok_or(ReflectError::TypeMismatch { expected: "number convertible to double", path })?;
            Ok(NativeValue::Float(match float_type {
                FloatType::Real => number as f32 as f64,
                FloatType::Lreal => number,
            }))
        }
        LeafType::String { length } => {
            let text = value.as_str().ok_or(ReflectError::TypeMismatch { expected: "string", path: path.clone() })?;
            if text.len() > *length as usize {
                return Err(ReflectError::StringTooLong { field_path: path, limit: *length, actual: text.len() });
            }
            Ok(NativeValue::Str(text.to_string()))
        }
    }
}

/* napi_get_value_int32: non-finite is 0, otherwise truncate and wrap modulo 2^32 */
fn to_int32(number: f64) -> i32 {
    if !number.is_finite() {
        return 0;
    }
    let wrapped = number.trunc().rem_euclid(4_294_967_296.0);
    wrapped as u32 as i32
}

/* The C cast from int32_t into the member's own width */
fn narrow(value: i32, int_type: IntegerType) -> i64 {
    match (int_type.bits(), int_type.is_signed()) {
        (8, true) => value as i8 as i64,
        (8, false) => value as u8 as i64,
        (16, true) => value as i16 as i64,
        (16, false) => value as u16 as i64,
        (_, true) => value as i64,
        (_, false) => value as u32 as i64,
    }
}

/* strnlen semantics on a UTF-8 buffer, never splitting a character */
fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dm_gen::codegen::shared::flatten_dataset;
    use dm_gen::schema::{FieldFlags, FieldType, Record};
    use serde_json::json;
    use std::sync::Arc;

    fn leaf(name: &str, leaf: LeafType, array_size: u32) -> Field {
        Field {
            name: name.to_string(),
            ty: FieldType::Leaf(leaf),
            array_size,
            flags: FieldFlags { published: true, subscribed: true, private: false },
            comment: None,
            enum_name: None,
        }
    }

    fn datamodel(fields: Vec<Field>) -> Field {
        let record = Arc::new(Record { name: "Plant".into(), comment: None, fields });
        Field {
            name: "Plant".into(),
            ty: FieldType::Record(record),
            array_size: 0,
            flags: FieldFlags::default(),
            comment: None,
            enum_name: None,
        }
    }

    #[test]
    fn int32_conversion_wraps_and_truncates() {
        assert_eq!(to_int32(1.9), 1);
        assert_eq!(to_int32(-1.9), -1);
        assert_eq!(to_int32(2_147_483_648.0), i32::MIN);
        assert_eq!(to_int32(4_294_967_297.0), 1);
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_int32(f64::INFINITY), 0);
        assert_eq!(narrow(300, IntegerType::Usint), 44);
        assert_eq!(narrow(-1, IntegerType::Udint), u32::MAX as i64);
        assert_eq!(narrow(40_000, IntegerType::Int), -25_536);
    }

    #[test]
    fn scalar_dataset_roundtrips() {
        let speed = leaf("Speed", LeafType::Integer(IntegerType::Int), 0);
        let root = datamodel(vec![speed.clone()]);
        let native_root = Place::new("exos_data").field("Speed");
        let wire = Handle::External("Speed.value".into());

        let emission = flatten_dataset(&speed, &native_root, &wire, Direction::In).unwrap();
        assert_eq!(wire_root(&emission), Some(wire.clone()));
        let native = marshal_in(&emission, &root, &json!(-12)).unwrap();

        let emission = flatten_dataset(&speed, &native_root, &wire, Direction::Out).unwrap();
        assert_eq!(marshal_out(&emission, &native).unwrap(), json!(-12));
    }

    #[test]
    fn missing_property_is_reported() {
        let inner = datamodel(vec![leaf("Enabled", LeafType::Bool, 0)]);
        let mut status = inner.clone();
        status.name = "Status".into();
        let root = datamodel(vec![status.clone()]);

        let emission = flatten_dataset(
            &status,
            &Place::new("exos_data").field("Status"),
            &Handle::External("Status.value".into()),
            Direction::In,
        )
        .unwrap();
        let err = marshal_in(&emission, &root, &json!({ "enabled": true })).unwrap_err();
        assert_eq!(err, ReflectError::MissingProperty { name: "Enabled".into() });
    }

    #[test]
    fn wrong_wire_type_names_the_field() {
        let gains = leaf("Gains", LeafType::Float(FloatType::Real), 2);
        let root = datamodel(vec![gains.clone()]);
        let emission = flatten_dataset(
            &gains,
            &Place::new("exos_data").field("Gains"),
            &Handle::External("Gains.value".into()),
            Direction::In,
        )
        .unwrap();

        let err = marshal_in(&emission, &root, &json!([1.5, "fast"])).unwrap_err();
        assert_eq!(
            err,
            ReflectError::TypeMismatch { expected: "number convertible to double", path: "Gains[i]".into() }
        );
        let err = marshal_in(&emission, &root, &json!([1.5])).unwrap_err();
        assert_eq!(err, ReflectError::IndexOutOfRange { index: 1, len: 1 });
    }

    #[test]
    fn marshal_out_truncates_on_character_boundaries() {
        assert_eq!(truncate("abc", 8), "abc");
        assert_eq!(truncate("aé", 2), "a");
    }
}
