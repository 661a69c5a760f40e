use crate::schema::LeafType;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Direction of a marshalling program.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Native C struct to N-API value.
    Out,
    /// N-API value to native C struct.
    In,
}

/// A `napi_value` the generated code reads or writes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Handle {
    /// Per-level container temporary `object<n>`.
    Slot(u32),
    /// Scratch value for one named member, `property`.
    Property,
    /// Scratch value for one array element, `arrayItem`.
    ArrayItem,
    /// An expression owned by the surrounding function, never declared by the emission.
    External(String),
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Slot(index) => write!(f, "object{}", index),
            Handle::Property => f.write_str("property"),
            Handle::ArrayItem => f.write_str("arrayItem"),
            Handle::External(expr) => f.write_str(expr),
        }
    }
}

/// One step of a native access path.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Segment {
    Field(String),
    Index(char),
}

/// A native lvalue such as `exos_data.Motor.Status[i].Fault`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub struct Place {
    pub root: String,
    pub segments: Vec<Segment>,
}

impl Place {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into(), segments: Vec::new() }
    }

    pub fn field(&self, name: &str) -> Self {
        let mut place = self.clone();
        place.segments.push(Segment::Field(name.to_string()));
        place
    }

    pub fn index(&self, iterator: char) -> Self {
        let mut place = self.clone();
        place.segments.push(Segment::Index(iterator));
        place
    }

    /// Path below the root, used in runtime error messages.
    pub fn field_path(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Field(name) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(name);
                }
                Segment::Index(iterator) => {
                    out.push('[');
                    out.push(*iterator);
                    out.push(']');
                }
            }
        }
        out
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for segment in &self.segments {
            match segment {
                Segment::Field(name) => write!(f, ".{}", name)?,
                Segment::Index(iterator) => write!(f, "[{}]", iterator)?,
            }
        }
        Ok(())
    }
}

/// Shared default values created once by the module init function.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultValue {
    Bool,
    Number,
    String,
}

impl DefaultValue {
    pub fn for_leaf(leaf: &LeafType) -> Self {
        match leaf {
            LeafType::Bool => DefaultValue::Bool,
            LeafType::String { .. } => DefaultValue::String,
            LeafType::Integer(_) | LeafType::Float(_) => DefaultValue::Number,
        }
    }

    pub fn c_name(&self) -> &'static str {
        match self {
            DefaultValue::Bool => "def_bool",
            DefaultValue::Number => "def_number",
            DefaultValue::String => "def_string",
        }
    }
}

/// Statement of a marshalling program.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum Stmt {
    CreateObject { target: Handle },
    CreateArray { target: Handle },
    SetNamed { object: Handle, name: String, value: Handle },
    SetElement { array: Handle, index: char, value: Handle },
    GetNamed { object: Handle, name: String, target: Handle },
    GetElement { array: Handle, index: char, target: Handle },
    Assign { target: Handle, value: Handle },
    /// Convert one native scalar into a fresh `napi_value`.
    LeafOut { leaf: LeafType, source: Place, target: Handle },
    /// Convert one `napi_value` into a native scalar.
    LeafIn { leaf: LeafType, source: Handle, target: Place },
    Default { value: DefaultValue, target: Handle },
    ForEach { iterator: char, count: u32, body: Vec<Stmt> },
}

/// Temporary classes a marshalling body may need declared.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TempClass {
    Slot(u32),
    Property,
    ArrayItem,
    LengthScratch,
    IntScratch,
    FloatScratch,
}

impl TempClass {
    pub fn c_type(&self) -> &'static str {
        match self {
            TempClass::Slot(_) | TempClass::Property | TempClass::ArrayItem => "napi_value",
            TempClass::LengthScratch => "size_t",
            TempClass::IntScratch => "int32_t",
            TempClass::FloatScratch => "double",
        }
    }

    pub fn identifier(&self) -> String {
        match self {
            TempClass::Slot(index) => format!("object{}", index),
            TempClass::Property => "property".to_string(),
            TempClass::ArrayItem => "arrayItem".to_string(),
            TempClass::LengthScratch => "_r".to_string(),
            TempClass::IntScratch => "_value".to_string(),
            TempClass::FloatScratch => "__value".to_string(),
        }
    }
}

/// Result of one flattening pass.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Emission {
    pub direction: Direction,
    pub body: Vec<Stmt>,
    /// Largest slot index allocated during the pass.
    pub max_slot: Option<u32>,
}

impl Emission {
    /// Every temporary the body references, derived from the statement tree.
    pub fn temps(&self) -> BTreeSet<TempClass> {
        let mut temps = BTreeSet::new();
        collect_temps(&self.body, &mut temps);
        temps
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Deepest loop nesting in the body.
    pub fn loop_depth(&self) -> usize {
        fn depth(stmts: &[Stmt]) -> usize {
            stmts
                .iter()
                .map(|stmt| match stmt {
                    Stmt::ForEach { body, .. } => 1 + depth(body),
                    _ => 0,
                })
                .max()
                .unwrap_or(0)
        }
        depth(&self.body)
    }
}

fn handle_temp(handle: &Handle) -> Option<TempClass> {
    match handle {
        Handle::Slot(index) => Some(TempClass::Slot(*index)),
        Handle::Property => Some(TempClass::Property),
        Handle::ArrayItem => Some(TempClass::ArrayItem),
        Handle::External(_) => None,
    }
}

fn collect_temps(stmts: &[Stmt], temps: &mut BTreeSet<TempClass>) {
    fn add(handle: &Handle, temps: &mut BTreeSet<TempClass>) {
        if let Some(temp) = handle_temp(handle) {
            temps.insert(temp);
        }
    }

    for stmt in stmts {
        match stmt {
            Stmt::CreateObject { target } | Stmt::CreateArray { target } => add(target, temps),
            Stmt::SetNamed { object, value, .. } => {
                add(object, temps);
                add(value, temps);
            }
            Stmt::SetElement { array, value, .. } => {
                add(array, temps);
                add(value, temps);
            }
            Stmt::GetNamed { object, target, .. } => {
                add(object, temps);
                add(target, temps);
            }
            Stmt::GetElement { array, target, .. } => {
                add(array, temps);
                add(target, temps);
            }
            Stmt::Assign { target, value } => {
                add(target, temps);
                add(value, temps);
            }
            Stmt::LeafOut { target, .. } => add(target, temps),
            Stmt::LeafIn { leaf, source, .. } => {
                add(source, temps);
                match leaf {
                    LeafType::Bool => {}
                    LeafType::Integer(_) => {
                        temps.insert(TempClass::IntScratch);
                    }
                    LeafType::Float(_) => {
                        temps.insert(TempClass::FloatScratch);
                    }
                    LeafType::String { .. } => {
                        temps.insert(TempClass::LengthScratch);
                    }
                }
            }
            Stmt::Default { target, .. } => add(target, temps),
            Stmt::ForEach { body, .. } => collect_temps(body, temps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IntegerType;

    #[test]
    fn place_renders_fields_and_indices() {
        let place = Place::new("exos_data").field("Motor").index('i').field("Fault");
        assert_eq!(place.to_string(), "exos_data.Motor[i].Fault");
        assert_eq!(place.field_path(), "Motor[i].Fault");
    }

    #[test]
    fn temps_ignore_external_handles() {
        let emission = Emission {
            direction: Direction::In,
            body: vec![
                Stmt::Assign { target: Handle::Slot(0), value: Handle::External("src".into()) },
                Stmt::GetNamed {
                    object: Handle::Slot(0),
                    name: "Speed".into(),
                    target: Handle::Slot(1),
                },
                Stmt::LeafIn {
                    leaf: LeafType::Integer(IntegerType::Int),
                    source: Handle::Slot(1),
                    target: Place::new("dst").field("Speed"),
                },
            ],
            max_slot: Some(1),
        };
        let temps: Vec<TempClass> = emission.temps().into_iter().collect();
        assert_eq!(temps, vec![TempClass::Slot(0), TempClass::Slot(1), TempClass::IntScratch]);
    }

    #[test]
    fn ir_roundtrips_through_json() {
        let emission = Emission {
            direction: Direction::Out,
            body: vec![Stmt::ForEach {
                iterator: 'i',
                count: 4,
                body: vec![Stmt::Default { value: DefaultValue::Number, target: Handle::ArrayItem }],
            }],
            max_slot: None,
        };
        let json = serde_json::to_string(&emission).unwrap();
        let back: Emission = serde_json::from_str(&json).unwrap();
        assert_eq!(back, emission);
        assert_eq!(back.loop_depth(), 1);
    }
}
