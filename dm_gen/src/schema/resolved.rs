use dm_types::{EnumType, FieldDecl, ScalarType, SchemaSource, TypeKind};
use indexmap::IndexMap;
use serde_derive::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/* Integer widths; every one of them travels through a 32-bit carrier */
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum IntegerType {
  Sint,
  Int,
  Dint,
  Usint,
  Uint,
  Udint,
  Byte,
}

impl IntegerType {
  pub fn is_signed(&self) -> bool {
    matches!(self, IntegerType::Sint | IntegerType::Int | IntegerType::Dint)
  }

  pub fn bits(&self) -> u32 {
    match self {
      IntegerType::Sint | IntegerType::Usint | IntegerType::Byte => 8,
      IntegerType::Int | IntegerType::Uint => 16,
      IntegerType::Dint | IntegerType::Udint => 32,
    }
  }

  pub fn scalar(&self) -> ScalarType {
    match self {
      IntegerType::Sint => ScalarType::Sint,
      IntegerType::Int => ScalarType::Int,
      IntegerType::Dint => ScalarType::Dint,
      IntegerType::Usint => ScalarType::Usint,
      IntegerType::Uint => ScalarType::Uint,
      IntegerType::Udint => ScalarType::Udint,
      IntegerType::Byte => ScalarType::Byte,
    }
  }

  pub fn c_type(&self) -> &'static str {
    self.scalar().c_type()
  }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FloatType {
  Real,
  Lreal,
}

impl FloatType {
  pub fn c_type(&self) -> &'static str {
    match self {
      FloatType::Real => "float",
      FloatType::Lreal => "double",
    }
  }
}

/* A resolved scalar. The string length only exists on the string variant. */
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum LeafType {
  Bool,
  Integer(IntegerType),
  Float(FloatType),
  String { length: u32 },
}

impl LeafType {
  pub fn c_type(&self) -> &'static str {
    match self {
      LeafType::Bool => "bool",
      LeafType::Integer(int_type) => int_type.c_type(),
      LeafType::Float(float_type) => float_type.c_type(),
      LeafType::String { .. } => "char",
    }
  }

  fn from_scalar(scalar: ScalarType, string_length: Option<u32>) -> Option<Self> {
    let leaf = match scalar {
      ScalarType::Bool => LeafType::Bool,
      ScalarType::Sint => LeafType::Integer(IntegerType::Sint),
      ScalarType::Int => LeafType::Integer(IntegerType::Int),
      ScalarType::Dint => LeafType::Integer(IntegerType::Dint),
      ScalarType::Usint => LeafType::Integer(IntegerType::Usint),
      ScalarType::Uint => LeafType::Integer(IntegerType::Uint),
      ScalarType::Udint => LeafType::Integer(IntegerType::Udint),
      ScalarType::Byte => LeafType::Integer(IntegerType::Byte),
      ScalarType::Real => LeafType::Float(FloatType::Real),
      ScalarType::Lreal => LeafType::Float(FloatType::Lreal),
      ScalarType::String => match string_length {
        Some(length) if length > 0 => LeafType::String { length },
        _ => return None,
      },
    };
    Some(leaf)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldFlags {
  pub published: bool,
  pub subscribed: bool,
  pub private: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
  Leaf(LeafType),
  Record(Arc<Record>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
  pub name: String,
  pub ty: FieldType,
  pub array_size: u32,
  pub flags: FieldFlags,
  pub comment: Option<String>,
  /* Set when the declared type was an enum; the field itself is a DINT leaf */
  pub enum_name: Option<String>,
}

impl Field {
  pub fn is_array(&self) -> bool {
    self.array_size > 0
  }

  pub fn is_private(&self) -> bool {
    self.flags.private
  }

  /* Name of the C type a declaration of this field uses */
  pub fn c_type_name(&self) -> &str {
    match (&self.enum_name, &self.ty) {
      (Some(enum_name), _) => enum_name,
      (None, FieldType::Leaf(leaf)) => leaf.c_type(),
      (None, FieldType::Record(record)) => &record.name,
    }
  }

  /* Same field viewed as a single array element */
  pub fn element(&self) -> Field {
    Field { array_size: 0, ..self.clone() }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
  pub name: String,
  pub comment: Option<String>,
  pub fields: Vec<Field>,
}

impl Record {
  /* Fields taking part in the exchange, in declared order */
  pub fn exchanged_fields(&self) -> impl Iterator<Item = &Field> {
    self.fields.iter().filter(|field| !field.is_private())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
  Scalar(ScalarType),
  Enum { underlying: IntegerType },
  Record(Arc<Record>),
}

/* Root record of a datamodel; its exchanged fields are the datasets */
#[derive(Debug, Clone, PartialEq)]
pub struct Datamodel {
  pub name: String,
  pub root: Arc<Record>,
}

impl Datamodel {
  pub fn datasets(&self) -> impl Iterator<Item = &Field> {
    self.root.exchanged_fields()
  }
}

#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
  #[error("type '{0}' not found in schema")]
  SchemaNotFound(String),

  #[error("circular type reference: {}", .0.join(" -> "))]
  CircularReference(Vec<String>),

  #[error("field '{record}.{field}' is a STRING and needs a non-zero string-length")]
  MissingStringLength { record: String, field: String },

  #[error("field '{record}.{field}' has a string-length but is not a STRING")]
  UnexpectedStringLength { record: String, field: String },

  #[error("record '{record}' declares field '{field}' more than once")]
  DuplicateField { record: String, field: String },

  #[error("'{0}' is not a record and cannot be a datamodel root")]
  NotARecord(String),
}

pub struct TypeResolver<'a, S: SchemaSource + ?Sized> {
  source: &'a S,
  records: HashMap<String, Arc<Record>>,
  /* Records in dependency order, dependencies first */
  pub resolution_order: Vec<String>,
  /* Enums met while resolving, in first-use order */
  pub enums: IndexMap<String, EnumType>,
  visiting: Vec<String>,
}

impl<'a, S: SchemaSource + ?Sized> TypeResolver<'a, S> {
  pub fn new(source: &'a S) -> Self {
    Self {
      source,
      records: HashMap::new(),
      resolution_order: Vec::new(),
      enums: IndexMap::new(),
      visiting: Vec::new(),
    }
  }

  pub fn resolve(&mut self, type_name: &str) -> Result<Resolution, ResolveError> {
    if let Some(scalar) = ScalarType::from_name(type_name) {
      return Ok(Resolution::Scalar(scalar));
    }

    if let Some(record) = self.records.get(type_name) {
      return Ok(Resolution::Record(Arc::clone(record)));
    }

    if self.visiting.iter().any(|name| name == type_name) {
      let mut chain = self.visiting.clone();
      chain.push(type_name.to_string());
      return Err(ResolveError::CircularReference(chain));
    }

    let source = self.source;
    let typedef = source
      .lookup(type_name)
      .ok_or_else(|| ResolveError::SchemaNotFound(type_name.to_string()))?;

    match &typedef.kind {
      TypeKind::Enum(enum_type) => {
        if !self.enums.contains_key(&typedef.name) {
          debug!(enum_name = %typedef.name, variants = enum_type.variants.len(), "resolved enum as DINT");
          self.enums.insert(typedef.name.clone(), enum_type.clone());
        }
        Ok(Resolution::Enum { underlying: IntegerType::Dint })
      }
      TypeKind::Struct(struct_type) => {
        self.visiting.push(typedef.name.clone());
        let fields = self.resolve_fields(&typedef.name, &struct_type.fields);
        self.visiting.pop();

        let record = Arc::new(Record {
          name: typedef.name.clone(),
          comment: struct_type.comment.clone(),
          fields: fields?,
        });
        debug!(record = %record.name, fields = record.fields.len(), "resolved record");
        self.records.insert(record.name.clone(), Arc::clone(&record));
        self.resolution_order.push(record.name.clone());
        Ok(Resolution::Record(record))
      }
    }
  }

  fn resolve_fields(&mut self, record: &str, decls: &[FieldDecl]) -> Result<Vec<Field>, ResolveError> {
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(decls.len());
    for decl in decls {
      if !seen.insert(decl.name.as_str()) {
        return Err(ResolveError::DuplicateField {
          record: record.to_string(),
          field: decl.name.clone(),
        });
      }
      fields.push(self.resolve_field_in(record, decl)?);
    }
    Ok(fields)
  }

  /* Resolve a declaration; enums become DINT leaves here and nowhere else */
  pub fn resolve_field(&mut self, decl: &FieldDecl) -> Result<Field, ResolveError> {
    self.resolve_field_in("", decl)
  }

  fn resolve_field_in(&mut self, record: &str, decl: &FieldDecl) -> Result<Field, ResolveError> {
    let resolution = self.resolve(&decl.type_name)?;

    let is_string = matches!(resolution, Resolution::Scalar(ScalarType::String));
    if !is_string && decl.string_length.is_some() {
      return Err(ResolveError::UnexpectedStringLength {
        record: record.to_string(),
        field: decl.name.clone(),
      });
    }

    let mut enum_name = None;
    let ty = match resolution {
      Resolution::Scalar(scalar) => {
        let leaf = LeafType::from_scalar(scalar, decl.string_length).ok_or_else(|| {
          ResolveError::MissingStringLength {
            record: record.to_string(),
            field: decl.name.clone(),
          }
        })?;
        FieldType::Leaf(leaf)
      }
      Resolution::Enum { underlying } => {
        enum_name = Some(decl.type_name.clone());
        FieldType::Leaf(LeafType::Integer(underlying))
      }
      Resolution::Record(record) => FieldType::Record(record),
    };

    Ok(Field {
      name: decl.name.clone(),
      ty,
      array_size: decl.array_size,
      flags: FieldFlags {
        published: decl.is_published(),
        subscribed: decl.is_subscribed(),
        private: decl.is_private(),
      },
      comment: decl.comment.clone(),
      enum_name,
    })
  }

  pub fn resolve_datamodel(&mut self, name: &str) -> Result<Datamodel, ResolveError> {
    match self.resolve(name)? {
      Resolution::Record(root) => Ok(Datamodel { name: name.to_string(), root }),
      _ => Err(ResolveError::NotARecord(name.to_string())),
    }
  }

  /* Resolved records in dependency order */
  pub fn records_in_order(&self) -> impl Iterator<Item = &Arc<Record>> {
    self.resolution_order.iter().filter_map(|name| self.records.get(name))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use dm_types::TypeDef;

  fn motor_schema() -> Vec<TypeDef> {
    vec![
      TypeDef::new_struct(
        "Motor",
        vec![
          FieldDecl::new("Speed", "INT").with_comment("PUB"),
          FieldDecl::new("Mode", "DriveMode").with_comment("PUB SUB"),
          FieldDecl::new("Status", "Status").with_comment("PUB"),
        ],
      ),
      TypeDef::new_enum("DriveMode", &["Idle", "Run"]),
      TypeDef::new_struct(
        "Status",
        vec![FieldDecl::new("Running", "BOOL"), FieldDecl::new("Fault", "DINT")],
      ),
    ]
  }

  #[test]
  fn enums_normalize_to_dint_once() {
    let schema = motor_schema();
    let mut resolver = TypeResolver::new(&schema);
    let datamodel = resolver.resolve_datamodel("Motor").unwrap();

    let mode = &datamodel.root.fields[1];
    assert_eq!(mode.ty, FieldType::Leaf(LeafType::Integer(IntegerType::Dint)));
    assert_eq!(mode.enum_name.as_deref(), Some("DriveMode"));
    assert_eq!(mode.c_type_name(), "DriveMode");
    assert!(resolver.enums.contains_key("DriveMode"));
  }

  #[test]
  fn records_resolve_dependencies_first() {
    let schema = motor_schema();
    let mut resolver = TypeResolver::new(&schema);
    resolver.resolve_datamodel("Motor").unwrap();
    assert_eq!(resolver.resolution_order, vec!["Status", "Motor"]);
  }

  #[test]
  fn records_are_memoized() {
    let schema = motor_schema();
    let mut resolver = TypeResolver::new(&schema);
    let first = resolver.resolve("Status").unwrap();
    let second = resolver.resolve("Status").unwrap();
    match (first, second) {
      (Resolution::Record(a), Resolution::Record(b)) => assert!(Arc::ptr_eq(&a, &b)),
      other => panic!("expected records, got {:?}", other),
    }
  }

  #[test]
  fn unknown_type_is_schema_not_found() {
    let schema = vec![TypeDef::new_struct("Motor", vec![FieldDecl::new("Drive", "Drive")])];
    let mut resolver = TypeResolver::new(&schema);
    assert_eq!(
      resolver.resolve("Motor"),
      Err(ResolveError::SchemaNotFound("Drive".to_string()))
    );
  }

  #[test]
  fn cycles_are_rejected_with_chain() {
    let schema = vec![
      TypeDef::new_struct("A", vec![FieldDecl::new("b", "B")]),
      TypeDef::new_struct("B", vec![FieldDecl::new("a", "A").with_array_size(2)]),
    ];
    let mut resolver = TypeResolver::new(&schema);
    assert_eq!(
      resolver.resolve("A"),
      Err(ResolveError::CircularReference(vec!["A".into(), "B".into(), "A".into()]))
    );
  }

  #[test]
  fn string_length_is_validated() {
    let schema = vec![TypeDef::new_struct("Label", vec![FieldDecl::new("Text", "STRING")])];
    let mut resolver = TypeResolver::new(&schema);
    assert!(matches!(resolver.resolve("Label"), Err(ResolveError::MissingStringLength { .. })));

    let schema = vec![TypeDef::new_struct(
      "Label",
      vec![FieldDecl::new("Count", "INT").with_string_length(4)],
    )];
    let mut resolver = TypeResolver::new(&schema);
    assert!(matches!(resolver.resolve("Label"), Err(ResolveError::UnexpectedStringLength { .. })));
  }

  #[test]
  fn duplicate_fields_are_rejected() {
    let schema = vec![TypeDef::new_struct(
      "Motor",
      vec![FieldDecl::new("Speed", "INT"), FieldDecl::new("Speed", "DINT")],
    )];
    let mut resolver = TypeResolver::new(&schema);
    assert!(matches!(resolver.resolve("Motor"), Err(ResolveError::DuplicateField { .. })));
  }

  #[test]
  fn scalar_root_is_not_a_datamodel() {
    let schema: Vec<TypeDef> = Vec::new();
    let mut resolver = TypeResolver::new(&schema);
    assert_eq!(
      resolver.resolve_datamodel("DINT"),
      Err(ResolveError::NotARecord("DINT".to_string()))
    );
  }
}
