/* Common utilities shared between analyze and codegen commands */

use dm_gen::dm_loader::{LoadedSchema, SchemaLoader};
use dm_gen::schema::{Datamodel, TypeResolver};
use std::path::{Path, PathBuf};

/* Load a datamodel file and everything it imports */
pub fn load_schema(file: &Path, include_dirs: &[PathBuf], verbose: bool) -> anyhow::Result<LoadedSchema> {
  println!("[~] Loading {} and resolving imports...", file.display());
  if verbose && !include_dirs.is_empty() {
    println!("    Include directories:");
    for dir in include_dirs {
      println!("      - {}", dir.display());
    }
  }

  let schema = SchemaLoader::load(file, include_dirs.to_vec())?;

  println!(
    "[~] Loaded {} type definitions from {} file(s)",
    schema.types.len(),
    schema.files.len()
  );
  if verbose {
    for name in schema.types.keys() {
      println!("  - {}", name);
    }
    println!();
  }
  Ok(schema)
}

/* Resolve the datamodel root type, defaulting to the name in the file */
pub fn resolve_datamodel<'s>(
  schema: &'s LoadedSchema,
  type_name: Option<&str>,
) -> anyhow::Result<(Datamodel, TypeResolver<'s, LoadedSchema>)> {
  let name = type_name.unwrap_or(&schema.datamodel.name);
  let mut resolver = TypeResolver::new(schema);
  let datamodel = resolver.resolve_datamodel(name)?;
  Ok((datamodel, resolver))
}
