use dm_types::TypeDef;
use serde_derive::{Deserialize, Serialize};

/* Import source specification. Only local paths are supported. */
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ImportSource {
    /* Relative or absolute path to the datamodel file */
    pub path: String,
}

/* How the Linux side of the component is shipped */
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Packaging {
    /* Build a debian package installed into the destination directory */
    Deb,
    /* Transfer the built module as a plain file */
    #[default]
    None,
}

impl std::str::FromStr for Packaging {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "deb" => Ok(Packaging::Deb),
            "none" => Ok(Packaging::None),
            other => Err(format!("unknown packaging '{}', expected 'deb' or 'none'", other)),
        }
    }
}

/* Component packaging options */
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct PackagingOptions {
    #[serde(default)]
    pub packaging: Packaging,

    /* Install location on the Linux target, defaults to /home/user/<name> */
    #[serde(default)]
    pub destination_directory: Option<String>,
}

impl PackagingOptions {
    pub fn destination_for(&self, datamodel_name: &str) -> String {
        self.destination_directory
            .clone()
            .unwrap_or_else(|| format!("/home/user/{}", datamodel_name.to_lowercase()))
    }
}

/* Metadata for a datamodel file */
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct DatamodelMetadata {
    /* Name of the root type describing the datamodel */
    pub name: String,

    /* Component version, used for package file names */
    #[serde(default = "DatamodelMetadata::default_version")]
    pub version: String,

    #[serde(default)]
    pub description: Option<String>,
}

impl DatamodelMetadata {
    fn default_version() -> String {
        "1.0.0".to_string()
    }
}

/* Complete datamodel file with metadata and type definitions */
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct DatamodelFile {
    /* Library files carry only types and may omit the metadata block */
    #[serde(default)]
    pub datamodel: Option<DatamodelMetadata>,

    #[serde(default)]
    pub options: PackagingOptions,

    #[serde(default)]
    pub imports: Vec<ImportSource>,

    #[serde(default)]
    pub types: Vec<TypeDef>,
}

impl DatamodelFile {
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }

    pub fn get_types(&self) -> &[TypeDef] {
        &self.types
    }

    pub fn imports(&self) -> &[ImportSource] {
        &self.imports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_metadata_options_and_types() {
        let yaml = r#"
datamodel:
  name: "Motor"
  description: "Drive data"
options:
  packaging: deb
imports:
  - path: "common.dm.yaml"
types:
  - name: "Motor"
    kind:
      struct:
        fields:
          - name: "Speed"
            type: "INT"
            comment: "PUB"
"#;
        let file = DatamodelFile::from_yaml(yaml).expect("parse datamodel file");
        let metadata = file.datamodel.as_ref().expect("metadata");
        assert_eq!(metadata.name, "Motor");
        assert_eq!(metadata.version, "1.0.0");
        assert_eq!(file.options.packaging, Packaging::Deb);
        assert_eq!(file.options.destination_for("Motor"), "/home/user/motor");
        assert_eq!(file.imports().len(), 1);
        assert_eq!(file.get_types().len(), 1);
    }

    #[test]
    fn packaging_parses_from_cli_strings() {
        assert_eq!("deb".parse::<Packaging>(), Ok(Packaging::Deb));
        assert!("rpm".parse::<Packaging>().is_err());
    }
}
