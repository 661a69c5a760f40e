use serde_derive::{Deserialize, Serialize};

/* Comment markers used by datamodel comments to flag exchange direction */
pub const PUBLISH_MARKER: &str = "PUB";
pub const SUBSCRIBE_MARKER: &str = "SUB";
pub const PRIVATE_MARKER: &str = "private";

/// IEC 61131 elementary types understood by the generator.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScalarType {
    Bool,
    Sint,
    Int,
    Dint,
    Usint,
    Uint,
    Udint,
    Byte,
    Real,
    Lreal,
    String,
}

impl ScalarType {
    pub const ALL: [ScalarType; 11] = [
        ScalarType::Bool,
        ScalarType::Sint,
        ScalarType::Int,
        ScalarType::Dint,
        ScalarType::Usint,
        ScalarType::Uint,
        ScalarType::Udint,
        ScalarType::Byte,
        ScalarType::Real,
        ScalarType::Lreal,
        ScalarType::String,
    ];

    /// Pure name lookup. Array-ness is carried by the field, never by the type name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|scalar| scalar.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Bool => "BOOL",
            ScalarType::Sint => "SINT",
            ScalarType::Int => "INT",
            ScalarType::Dint => "DINT",
            ScalarType::Usint => "USINT",
            ScalarType::Uint => "UINT",
            ScalarType::Udint => "UDINT",
            ScalarType::Byte => "BYTE",
            ScalarType::Real => "REAL",
            ScalarType::Lreal => "LREAL",
            ScalarType::String => "STRING",
        }
    }

    /// C spelling of the type. Strings are `char` buffers sized by the field.
    pub fn c_type(&self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Sint => "int8_t",
            ScalarType::Int => "int16_t",
            ScalarType::Dint => "int32_t",
            ScalarType::Usint | ScalarType::Byte => "uint8_t",
            ScalarType::Uint => "uint16_t",
            ScalarType::Udint => "uint32_t",
            ScalarType::Real => "float",
            ScalarType::Lreal => "double",
            ScalarType::String => "char",
        }
    }
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FieldDecl {
    pub name: String,
    /// Either a scalar name (`DINT`, `STRING`, ...) or the name of another type.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub array_size: u32,
    #[serde(default)]
    pub string_length: Option<u32>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub publish: bool,
    #[serde(default)]
    pub subscribe: bool,
    #[serde(default)]
    pub private: bool,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            array_size: 0,
            string_length: None,
            comment: None,
            publish: false,
            subscribe: false,
            private: false,
        }
    }

    pub fn with_array_size(mut self, size: u32) -> Self {
        self.array_size = size;
        self
    }

    pub fn with_string_length(mut self, length: u32) -> Self {
        self.string_length = Some(length);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    fn comment_contains(&self, marker: &str) -> bool {
        self.comment
            .as_deref()
            .map(|comment| comment.contains(marker))
            .unwrap_or(false)
    }

    pub fn is_published(&self) -> bool {
        self.publish || self.comment_contains(PUBLISH_MARKER)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribe || self.comment_contains(SUBSCRIBE_MARKER)
    }

    pub fn is_private(&self) -> bool {
        self.private || self.comment_contains(PRIVATE_MARKER)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct StructType {
    #[serde(default)]
    pub comment: Option<String>,
    pub fields: Vec<FieldDecl>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct EnumVariant {
    pub name: String,
    #[serde(default)]
    pub value: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct EnumType {
    #[serde(default)]
    pub comment: Option<String>,
    pub variants: Vec<EnumVariant>,
}

impl EnumType {
    /* Variants with their effective values; unnumbered variants continue from the previous one */
    pub fn numbered_variants(&self) -> Vec<(&str, i32)> {
        let mut next = 0i32;
        self.variants
            .iter()
            .map(|variant| {
                let value = variant.value.unwrap_or(next);
                next = value.wrapping_add(1);
                (variant.name.as_str(), value)
            })
            .collect()
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub enum TypeKind {
    Struct(StructType),
    Enum(EnumType),
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct TypeDef {
    pub name: String,
    #[serde(with = "serde_yml::with::singleton_map_recursive")]
    pub kind: TypeKind,
}

impl TypeDef {
    pub fn new_struct(name: impl Into<String>, fields: Vec<FieldDecl>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Struct(StructType { comment: None, fields }),
        }
    }

    pub fn new_enum(name: impl Into<String>, variants: &[&str]) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Enum(EnumType {
                comment: None,
                variants: variants
                    .iter()
                    .map(|name| EnumVariant { name: name.to_string(), value: None })
                    .collect(),
            }),
        }
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind, TypeKind::Enum(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_lookup_is_case_insensitive() {
        assert_eq!(ScalarType::from_name("dint"), Some(ScalarType::Dint));
        assert_eq!(ScalarType::from_name("LREAL"), Some(ScalarType::Lreal));
        assert_eq!(ScalarType::from_name("Motor"), None);
    }

    #[test]
    fn direction_flags_follow_comment_markers() {
        let field = FieldDecl::new("Speed", "INT").with_comment("PUB SUB");
        assert!(field.is_published());
        assert!(field.is_subscribed());
        assert!(!field.is_private());

        let hidden = FieldDecl::new("Scratch", "INT").with_comment("private buffer");
        assert!(hidden.is_private());
    }

    #[test]
    fn enum_numbering_continues_after_explicit_values() {
        let enum_type = EnumType {
            comment: None,
            variants: vec![
                EnumVariant { name: "Idle".into(), value: None },
                EnumVariant { name: "Fault".into(), value: Some(10) },
                EnumVariant { name: "Reset".into(), value: None },
            ],
        };
        assert_eq!(
            enum_type.numbered_variants(),
            vec![("Idle", 0), ("Fault", 10), ("Reset", 11)]
        );
    }

    #[test]
    fn typedef_parses_from_yaml() {
        let yaml = r#"
name: "Status"
kind:
  struct:
    fields:
      - name: "Running"
        type: "BOOL"
        comment: "PUB"
      - name: "Label"
        type: "STRING"
        string-length: 80
"#;
        let typedef: TypeDef = serde_yml::from_str(yaml).expect("parse typedef");
        let TypeKind::Struct(struct_type) = &typedef.kind else {
            panic!("expected struct");
        };
        assert_eq!(struct_type.fields.len(), 2);
        assert_eq!(struct_type.fields[1].string_length, Some(80));
        assert!(struct_type.fields[0].is_published());
    }
}
