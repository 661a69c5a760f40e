use super::ir::{DefaultValue, Direction, Emission, Handle, Place, Stmt};
use super::naming::NamingContext;
use crate::schema::{Field, FieldType, LeafType, Record};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("arrays nest deeper than the {limit} available loop iterators")]
    LoopNestingTooDeep { limit: usize },

    #[error("generated identifier '{identifier}' has the name of a type declared in the header")]
    IdentifierCollision { identifier: String },
}

/* Where marshal-out leaves take their values from */
#[derive(Debug, Clone)]
enum Origin {
    Native(Place),
    Defaults,
}

impl Origin {
    fn field(&self, name: &str) -> Origin {
        match self {
            Origin::Native(place) => Origin::Native(place.field(name)),
            Origin::Defaults => Origin::Defaults,
        }
    }

    fn index(&self, iterator: char) -> Origin {
        match self {
            Origin::Native(place) => Origin::Native(place.index(iterator)),
            Origin::Defaults => Origin::Defaults,
        }
    }

    fn leaf(&self, leaf: &LeafType, target: Handle) -> Stmt {
        match self {
            Origin::Native(place) => Stmt::LeafOut { leaf: *leaf, source: place.clone(), target },
            Origin::Defaults => Stmt::Default { value: DefaultValue::for_leaf(leaf), target },
        }
    }
}

/// Recursive structure flattener producing marshalling IR.
///
/// Every pass borrows one `NamingContext`; callers running several passes that
/// share a declaration block keep one context per pass.
pub struct FlatteningEmitter<'c> {
    naming: &'c mut NamingContext,
}

impl<'c> FlatteningEmitter<'c> {
    pub fn new(naming: &'c mut NamingContext) -> Self {
        Self { naming }
    }

    /// Flatten the members of `record` between `native_root` and `wire_root`.
    ///
    /// The record is built in (or read from) a container slot which is then
    /// bound to `wire_root`.
    pub fn emit(
        &mut self,
        record: &Record,
        native_root: &Place,
        wire_root: &Handle,
        direction: Direction,
    ) -> Result<Emission, EmitError> {
        let mut body = Vec::new();
        match direction {
            Direction::Out => {
                out_root_record(self.naming, record, &Origin::Native(native_root.clone()), wire_root, &mut body)?
            }
            Direction::In => in_root_record(self.naming, record, wire_root, native_root, &mut body)?,
        }
        Ok(self.finish(direction, body))
    }

    /// Flatten one dataset, which may be a scalar, a scalar array, a record or a record array.
    pub fn emit_dataset(
        &mut self,
        dataset: &Field,
        native_root: &Place,
        wire_root: &Handle,
        direction: Direction,
    ) -> Result<Emission, EmitError> {
        let mut body = Vec::new();
        match (&dataset.ty, dataset.is_array(), direction) {
            (FieldType::Record(record), false, Direction::Out) => {
                out_root_record(self.naming, record, &Origin::Native(native_root.clone()), wire_root, &mut body)?
            }
            (FieldType::Record(record), false, Direction::In) => {
                in_root_record(self.naming, record, wire_root, native_root, &mut body)?
            }
            (_, _, Direction::Out) => {
                out_field(self.naming, dataset, &Origin::Native(native_root.clone()), wire_root, &mut body)?
            }
            (_, _, Direction::In) => in_field(self.naming, dataset, wire_root, native_root, &mut body)?,
        }

        let emission = self.finish(direction, body);
        debug!(
            dataset = %dataset.name,
            ?direction,
            statements = emission.body.len(),
            max_slot = ?emission.max_slot,
            "flattened dataset"
        );
        Ok(emission)
    }

    /// Build the initial wire value of a dataset out of the shared defaults.
    pub fn emit_defaults(&mut self, dataset: &Field, wire_root: &Handle) -> Result<Emission, EmitError> {
        let mut body = Vec::new();
        match (&dataset.ty, dataset.is_array()) {
            (FieldType::Record(record), false) => {
                out_root_record(self.naming, record, &Origin::Defaults, wire_root, &mut body)?
            }
            _ => out_field(self.naming, dataset, &Origin::Defaults, wire_root, &mut body)?,
        }
        Ok(self.finish(Direction::Out, body))
    }

    fn finish(&self, direction: Direction, body: Vec<Stmt>) -> Emission {
        Emission { direction, body, max_slot: self.naming.high_water() }
    }
}

fn out_root_record(
    naming: &mut NamingContext,
    record: &Record,
    origin: &Origin,
    dest: &Handle,
    out: &mut Vec<Stmt>,
) -> Result<(), EmitError> {
    naming.with_slot(|naming, slot| -> Result<(), EmitError> {
        out.push(Stmt::CreateObject { target: Handle::Slot(slot) });
        out_members(naming, record, origin, &Handle::Slot(slot), out)?;
        out.push(Stmt::Assign { target: dest.clone(), value: Handle::Slot(slot) });
        Ok(())
    })
}

fn out_field(
    naming: &mut NamingContext,
    field: &Field,
    origin: &Origin,
    dest: &Handle,
    out: &mut Vec<Stmt>,
) -> Result<(), EmitError> {
    match (&field.ty, field.is_array()) {
        (FieldType::Leaf(leaf), false) => out.push(origin.leaf(leaf, dest.clone())),
        (FieldType::Leaf(leaf), true) => {
            out.push(Stmt::CreateArray { target: dest.clone() });
            naming.with_iterator(|_, iterator| {
                out.push(Stmt::ForEach {
                    iterator,
                    count: field.array_size,
                    body: vec![
                        origin.index(iterator).leaf(leaf, Handle::ArrayItem),
                        Stmt::SetElement { array: dest.clone(), index: iterator, value: Handle::ArrayItem },
                    ],
                });
                Ok(())
            })?;
        }
        (FieldType::Record(record), false) => {
            out.push(Stmt::CreateObject { target: dest.clone() });
            out_members(naming, record, origin, dest, out)?;
        }
        (FieldType::Record(record), true) => {
            out.push(Stmt::CreateArray { target: dest.clone() });
            naming.with_slot(|naming, slot| {
                naming.with_iterator(|naming, iterator| {
                    let element = Handle::Slot(slot);
                    let mut body = vec![Stmt::CreateObject { target: element.clone() }];
                    out_members(naming, record, &origin.index(iterator), &element, &mut body)?;
                    body.push(Stmt::SetElement { array: dest.clone(), index: iterator, value: element });
                    out.push(Stmt::ForEach { iterator, count: field.array_size, body });
                    Ok(())
                })
            })?;
        }
    }
    Ok(())
}

fn out_members(
    naming: &mut NamingContext,
    record: &Record,
    origin: &Origin,
    parent: &Handle,
    out: &mut Vec<Stmt>,
) -> Result<(), EmitError> {
    for member in record.exchanged_fields() {
        let member_origin = origin.field(&member.name);
        match (&member.ty, member.is_array()) {
            (FieldType::Leaf(leaf), false) => {
                out.push(member_origin.leaf(leaf, Handle::Property));
                out.push(Stmt::SetNamed {
                    object: parent.clone(),
                    name: member.name.clone(),
                    value: Handle::Property,
                });
            }
            _ => naming.with_slot(|naming, slot| -> Result<(), EmitError> {
                out_field(naming, member, &member_origin, &Handle::Slot(slot), out)?;
                out.push(Stmt::SetNamed {
                    object: parent.clone(),
                    name: member.name.clone(),
                    value: Handle::Slot(slot),
                });
                Ok(())
            })?,
        }
    }
    Ok(())
}

fn in_root_record(
    naming: &mut NamingContext,
    record: &Record,
    src: &Handle,
    dest: &Place,
    out: &mut Vec<Stmt>,
) -> Result<(), EmitError> {
    naming.with_slot(|naming, slot| {
        out.push(Stmt::Assign { target: Handle::Slot(slot), value: src.clone() });
        in_members(naming, record, &Handle::Slot(slot), dest, out)
    })
}

fn in_field(
    naming: &mut NamingContext,
    field: &Field,
    src: &Handle,
    dest: &Place,
    out: &mut Vec<Stmt>,
) -> Result<(), EmitError> {
    match (&field.ty, field.is_array()) {
        (FieldType::Leaf(leaf), false) => out.push(Stmt::LeafIn {
            leaf: *leaf,
            source: src.clone(),
            target: dest.clone(),
        }),
        (FieldType::Leaf(leaf), true) => naming.with_iterator(|_, iterator| {
            out.push(Stmt::ForEach {
                iterator,
                count: field.array_size,
                body: vec![
                    Stmt::GetElement { array: src.clone(), index: iterator, target: Handle::ArrayItem },
                    Stmt::LeafIn { leaf: *leaf, source: Handle::ArrayItem, target: dest.index(iterator) },
                ],
            });
            Ok(())
        })?,
        (FieldType::Record(record), false) => in_members(naming, record, src, dest, out)?,
        (FieldType::Record(record), true) => naming.with_slot(|naming, slot| {
            naming.with_iterator(|naming, iterator| {
                let element = Handle::Slot(slot);
                let mut body = vec![Stmt::GetElement {
                    array: src.clone(),
                    index: iterator,
                    target: element.clone(),
                }];
                in_members(naming, record, &element, &dest.index(iterator), &mut body)?;
                out.push(Stmt::ForEach { iterator, count: field.array_size, body });
                Ok(())
            })
        })?,
    }
    Ok(())
}

fn in_members(
    naming: &mut NamingContext,
    record: &Record,
    src: &Handle,
    dest: &Place,
    out: &mut Vec<Stmt>,
) -> Result<(), EmitError> {
    for member in record.exchanged_fields() {
        naming.with_slot(|naming, slot| {
            out.push(Stmt::GetNamed {
                object: src.clone(),
                name: member.name.clone(),
                target: Handle::Slot(slot),
            });
            in_field(naming, member, &Handle::Slot(slot), &dest.field(&member.name), out)
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::shared::ir::TempClass;
    use crate::schema::{FieldFlags, IntegerType};
    use std::sync::Arc;

    fn leaf(name: &str, leaf: LeafType) -> Field {
        Field {
            name: name.to_string(),
            ty: FieldType::Leaf(leaf),
            array_size: 0,
            flags: FieldFlags { published: true, subscribed: true, private: false },
            comment: None,
            enum_name: None,
        }
    }

    fn record(name: &str, fields: Vec<Field>) -> Arc<Record> {
        Arc::new(Record { name: name.to_string(), comment: None, fields })
    }

    #[test]
    fn scalar_dataset_is_a_single_leaf() {
        let mut naming = NamingContext::new();
        let dataset = leaf("Speed", LeafType::Integer(IntegerType::Int));
        let emission = FlatteningEmitter::new(&mut naming)
            .emit_dataset(&dataset, &Place::new("exos_data").field("Speed"), &Handle::External("Speed.value".into()), Direction::Out)
            .unwrap();
        assert_eq!(emission.body.len(), 1);
        assert_eq!(emission.max_slot, None);
        assert!(emission.temps().is_empty());
    }

    #[test]
    fn record_array_in_reuses_the_element_slot() {
        let item = record("Item", vec![leaf("Value", LeafType::Float(crate::schema::FloatType::Real))]);
        let mut dataset = leaf("Items", LeafType::Bool);
        dataset.ty = FieldType::Record(item);
        dataset.array_size = 3;

        let mut naming = NamingContext::new();
        let emission = FlatteningEmitter::new(&mut naming)
            .emit_dataset(&dataset, &Place::new("exos_data").field("Items"), &Handle::External("Items.value".into()), Direction::In)
            .unwrap();

        let Stmt::ForEach { iterator, count, body } = &emission.body[0] else {
            panic!("expected loop, got {:?}", emission.body[0]);
        };
        assert_eq!((*iterator, *count), ('i', 3));
        assert_eq!(
            body[0],
            Stmt::GetElement { array: Handle::External("Items.value".into()), index: 'i', target: Handle::Slot(0) }
        );
        assert_eq!(
            body[1],
            Stmt::GetNamed { object: Handle::Slot(0), name: "Value".into(), target: Handle::Slot(1) }
        );
        let temps: Vec<TempClass> = emission.temps().into_iter().collect();
        assert_eq!(temps, vec![TempClass::Slot(0), TempClass::Slot(1), TempClass::FloatScratch]);
        assert_eq!(naming.current_slot(), None);
    }

    #[test]
    fn defaults_mirror_marshal_out_shape() {
        let mut values = leaf("Values", LeafType::Integer(IntegerType::Dint));
        values.array_size = 2;
        let root = record("Config", vec![leaf("Enabled", LeafType::Bool), values]);
        let mut dataset = leaf("Config", LeafType::Bool);
        dataset.ty = FieldType::Record(root);

        let mut naming = NamingContext::new();
        let emission = FlatteningEmitter::new(&mut naming)
            .emit_defaults(&dataset, &Handle::External("Config_value".into()))
            .unwrap();

        assert_eq!(emission.body[0], Stmt::CreateObject { target: Handle::Slot(0) });
        assert_eq!(emission.body[1], Stmt::Default { value: DefaultValue::Bool, target: Handle::Property });
        assert_eq!(
            emission.body.last(),
            Some(&Stmt::Assign { target: Handle::External("Config_value".into()), value: Handle::Slot(0) })
        );
        assert_eq!(emission.max_slot, Some(1));
    }
}
