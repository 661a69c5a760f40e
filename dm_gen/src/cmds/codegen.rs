/* Codegen command - generate every component artifact */

use super::common::load_schema;
use dm_gen::codegen::napi::NapiCodeGeneratorOptions;
use dm_gen::codegen::{generate_all, CodegenOptions};
use dm_gen::dm_loader::Packaging;
use std::path::PathBuf;

/* Execute the codegen command */
pub fn run(
  file: PathBuf,
  type_name: Option<String>,
  include_dirs: Vec<PathBuf>,
  output_dir: PathBuf,
  packaging: Option<Packaging>,
  napi: NapiCodeGeneratorOptions,
  verbose: bool,
) -> anyhow::Result<()> {
  let schema = load_schema(&file, &include_dirs, verbose)?;

  let options = CodegenOptions {
    type_name,
    packaging,
    destination_directory: None,
    napi,
  };

  /* Everything is generated in memory before the first file is written */
  println!("[~] Generating component {}...", options.type_name.as_deref().unwrap_or(&schema.datamodel.name));
  let artifacts = generate_all(&schema, &options)?;

  artifacts.write_to(&output_dir)?;
  for path in artifacts.paths() {
    println!("[✓] Generated {}", output_dir.join(path).display());
  }
  println!("[✓] Code generation complete! ({} files)", artifacts.len());
  Ok(())
}
