pub mod header;
pub mod napi;
pub mod napi_gen;
pub mod package;
pub mod shared;

use crate::schema::{ResolveError, TypeResolver};
use napi::NapiCodeGeneratorOptions;
use dm_loader::{LoadedSchema, Packaging};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Emit(#[from] shared::EmitError),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize package metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-run overrides on top of what the datamodel file declares.
#[derive(Debug, Clone, Default)]
pub struct CodegenOptions {
    /* Root type, defaults to the datamodel name */
    pub type_name: Option<String>,
    pub packaging: Option<Packaging>,
    pub destination_directory: Option<String>,
    pub napi: NapiCodeGeneratorOptions,
}

/// Generated files keyed by their path below the output directory.
#[derive(Debug, Clone, Default)]
pub struct GeneratedArtifacts {
    pub files: BTreeMap<PathBuf, String>,
}

impl GeneratedArtifacts {
    pub fn insert(&mut self, path: impl Into<PathBuf>, contents: String) {
        self.files.insert(path.into(), contents);
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&str> {
        self.files.get(path.as_ref()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }

    /// Write every artifact below `output_dir`, creating directories as needed.
    pub fn write_to(&self, output_dir: &Path) -> Result<(), GenerateError> {
        for (relative, contents) in &self.files {
            let path = output_dir.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|source| GenerateError::Io { path: parent.to_path_buf(), source })?;
            }
            fs::write(&path, contents).map_err(|source| GenerateError::Io { path: path.clone(), source })?;
            info!(path = %path.display(), bytes = contents.len(), "wrote artifact");
        }
        Ok(())
    }
}

/// Generate every artifact of one component in memory.
///
/// Nothing is written here; a failure anywhere leaves no partial output.
pub fn generate_all(schema: &LoadedSchema, options: &CodegenOptions) -> Result<GeneratedArtifacts, GenerateError> {
    let type_name = options.type_name.clone().unwrap_or_else(|| schema.datamodel.name.clone());
    let mut resolver = TypeResolver::new(schema);
    let datamodel = resolver.resolve_datamodel(&type_name)?;
    debug!(datamodel = %datamodel.name, records = resolver.resolution_order.len(), "resolved datamodel");

    let component = PathBuf::from(&datamodel.name);
    let linux = component.join("Linux");
    let source_file = schema.source_file_name();

    let mut artifacts = GeneratedArtifacts::default();
    artifacts.insert(
        linux.join(header::header_file_name(&datamodel.name)),
        header::emit_header(&datamodel, &resolver, &source_file),
    );

    let generator = napi::NapiCodeGenerator::new(&datamodel, options.napi.clone());
    artifacts.insert(linux.join(napi::module_file_name(&datamodel.name)), generator.emit_code()?);

    let settings = package::PackageSettings {
        datamodel: &datamodel,
        metadata: &schema.datamodel,
        packaging: options.packaging.unwrap_or(schema.options.packaging),
        destination: options
            .destination_directory
            .clone()
            .unwrap_or_else(|| schema.options.destination_for(&datamodel.name)),
        source_file,
    };
    for (relative, contents) in package::PackageFiles::generate(&settings)?.files {
        artifacts.insert(component.join(relative), contents);
    }

    Ok(artifacts)
}
