use dm_types::{SchemaSource, TypeDef};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::file::{DatamodelFile, DatamodelMetadata, PackagingOptions};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },

    #[error("import '{import}' not found relative to '{}' or in include directories", from.display())]
    ImportNotFound { import: String, from: PathBuf },

    #[error("type '{name}' is declared in both '{}' and '{}'", first.display(), second.display())]
    DuplicateType {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("'{}' has no datamodel block naming the root type", path.display())]
    MissingDatamodel { path: PathBuf },
}

/* Import resolver for loading and merging datamodel files */
pub struct SchemaLoader {
    /* Canonical paths already loaded; makes import cycles harmless */
    loaded_files: HashSet<PathBuf>,

    /* Include directories for searching imports */
    include_dirs: Vec<PathBuf>,

    /* Metadata of the first (root) file loaded */
    root: Option<(PathBuf, DatamodelFile)>,

    /* All collected type definitions, with the file declaring them */
    types: IndexMap<String, (TypeDef, PathBuf)>,
}

impl SchemaLoader {
    pub fn new(include_dirs: Vec<PathBuf>) -> Self {
        Self {
            loaded_files: HashSet::new(),
            include_dirs,
            root: None,
            types: IndexMap::new(),
        }
    }

    /* Load a root datamodel file and everything it imports */
    pub fn load(file_path: &Path, include_dirs: Vec<PathBuf>) -> Result<LoadedSchema, LoadError> {
        let mut loader = Self::new(include_dirs);
        loader.load_file_with_imports(file_path)?;
        loader.finish()
    }

    fn resolve_import_path(&self, import_path: &str, base_file: &Path) -> Result<PathBuf, LoadError> {
        /* First try relative to the base file's directory */
        let candidates = base_file
            .parent()
            .map(|parent| parent.join(import_path))
            .into_iter()
            .chain(self.include_dirs.iter().map(|dir| dir.join(import_path)));

        for candidate in candidates {
            if candidate.exists() {
                return canonicalize(&candidate);
            }
        }

        Err(LoadError::ImportNotFound {
            import: import_path.to_string(),
            from: base_file.to_path_buf(),
        })
    }

    pub fn load_file_with_imports(&mut self, file_path: &Path) -> Result<(), LoadError> {
        let canonical_path = canonicalize(file_path)?;

        if self.loaded_files.contains(&canonical_path) {
            debug!(file = %file_path.display(), "skipping already loaded datamodel file");
            return Ok(());
        }

        /* Mark as loaded before processing imports so cycles terminate */
        self.loaded_files.insert(canonical_path.clone());

        let contents = std::fs::read_to_string(file_path).map_err(|source| LoadError::Io {
            path: file_path.to_path_buf(),
            source,
        })?;
        let file = DatamodelFile::from_yaml(&contents).map_err(|source| LoadError::Parse {
            path: file_path.to_path_buf(),
            source,
        })?;

        debug!(
            file = %file_path.display(),
            types = file.get_types().len(),
            imports = file.imports().len(),
            "loaded datamodel file"
        );

        let is_root = self.root.is_none();
        if is_root {
            self.root = Some((canonical_path.clone(), file.clone()));
        }

        for import in file.imports() {
            let import_path = self.resolve_import_path(&import.path, file_path)?;
            self.load_file_with_imports(&import_path)?;
        }

        for typedef in file.get_types() {
            if let Some((_, first)) = self.types.get(&typedef.name) {
                return Err(LoadError::DuplicateType {
                    name: typedef.name.clone(),
                    first: first.clone(),
                    second: canonical_path.clone(),
                });
            }
            self.types
                .insert(typedef.name.clone(), (typedef.clone(), canonical_path.clone()));
        }

        Ok(())
    }

    pub fn loaded_file_count(&self) -> usize {
        self.loaded_files.len()
    }

    pub fn finish(self) -> Result<LoadedSchema, LoadError> {
        let Some((root_path, root_file)) = self.root else {
            return Err(LoadError::MissingDatamodel { path: PathBuf::new() });
        };
        let datamodel = root_file
            .datamodel
            .clone()
            .ok_or_else(|| LoadError::MissingDatamodel { path: root_path.clone() })?;

        let mut files: Vec<PathBuf> = self.loaded_files.into_iter().collect();
        files.sort();

        Ok(LoadedSchema {
            datamodel,
            options: root_file.options,
            root_path,
            types: self
                .types
                .into_iter()
                .map(|(name, (typedef, _))| (name, typedef))
                .collect(),
            files,
        })
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf, LoadError> {
    path.canonicalize().map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/* Every type reachable from a root datamodel file, in declaration order */
#[derive(Debug, Clone)]
pub struct LoadedSchema {
    pub datamodel: DatamodelMetadata,
    pub options: PackagingOptions,
    pub root_path: PathBuf,
    pub types: IndexMap<String, TypeDef>,
    pub files: Vec<PathBuf>,
}

impl LoadedSchema {
    /* File name of the root datamodel file, used in generated descriptions */
    pub fn source_file_name(&self) -> String {
        self.root_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl SchemaSource for LoadedSchema {
    fn lookup(&self, type_name: &str) -> Option<&TypeDef> {
        self.types.get(type_name)
    }
}
