/* In-memory stand-in for the native C side of a datamodel */

use dm_gen::schema::{Field, FieldType, LeafType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/* Native value of a struct member, array element or leaf */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum NativeValue {
    Bool(bool),
    /* Every integer width, already narrowed to its C type's range */
    Int(i64),
    /* REAL values are kept exactly representable as f32 */
    Float(f64),
    Str(String),
    Array(Vec<NativeValue>),
    /* Members in declaration order, private members included */
    Record(IndexMap<String, NativeValue>),
}

impl NativeValue {
    /// Zero-initialized value for a field, like a static C struct.
    pub fn zeroed(field: &Field) -> Self {
        if field.is_array() {
            let element = field.element();
            return NativeValue::Array((0..field.array_size).map(|_| NativeValue::zeroed(&element)).collect());
        }
        match &field.ty {
            FieldType::Leaf(LeafType::Bool) => NativeValue::Bool(false),
            FieldType::Leaf(LeafType::Integer(_)) => NativeValue::Int(0),
            FieldType::Leaf(LeafType::Float(_)) => NativeValue::Float(0.0),
            FieldType::Leaf(LeafType::String { .. }) => NativeValue::Str(String::new()),
            FieldType::Record(record) => NativeValue::Record(
                record
                    .fields
                    .iter()
                    .map(|member| (member.name.clone(), NativeValue::zeroed(member)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dm_gen::schema::{FieldFlags, IntegerType, Record};
    use std::sync::Arc;

    #[test]
    fn zeroed_arrays_of_records_are_fully_populated() {
        let count = Field {
            name: "Count".into(),
            ty: FieldType::Leaf(LeafType::Integer(IntegerType::Uint)),
            array_size: 2,
            flags: FieldFlags::default(),
            comment: None,
            enum_name: None,
        };
        let record = Arc::new(Record { name: "Bin".into(), comment: None, fields: vec![count] });
        let bins = Field {
            name: "Bins".into(),
            ty: FieldType::Record(record),
            array_size: 3,
            flags: FieldFlags::default(),
            comment: None,
            enum_name: None,
        };

        let NativeValue::Array(elements) = NativeValue::zeroed(&bins) else {
            panic!("expected array");
        };
        assert_eq!(elements.len(), 3);
        let NativeValue::Record(members) = &elements[2] else {
            panic!("expected record");
        };
        assert_eq!(members["Count"], NativeValue::Array(vec![NativeValue::Int(0), NativeValue::Int(0)]));
    }
}
