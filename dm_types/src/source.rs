use crate::types::TypeDef;
use std::collections::HashMap;

/// Synchronous lookup capability the generator requires from a schema parser.
pub trait SchemaSource {
    fn lookup(&self, type_name: &str) -> Option<&TypeDef>;
}

impl SchemaSource for [TypeDef] {
    fn lookup(&self, type_name: &str) -> Option<&TypeDef> {
        self.iter().find(|typedef| typedef.name == type_name)
    }
}

impl SchemaSource for Vec<TypeDef> {
    fn lookup(&self, type_name: &str) -> Option<&TypeDef> {
        self.as_slice().lookup(type_name)
    }
}

impl SchemaSource for HashMap<String, TypeDef> {
    fn lookup(&self, type_name: &str) -> Option<&TypeDef> {
        self.get(type_name)
    }
}
