/* Analyze command - resolved datamodel report and marshalling IR export */

use super::common::{load_schema, resolve_datamodel};
use anyhow::{bail, Context};
use clap::ValueEnum;
use dm_gen::codegen::napi_gen::ModuleContext;
use dm_gen::codegen::shared::{flatten_dataset, Direction, Emission};
use dm_gen::schema::{Field, FieldType};
use indexmap::IndexMap;
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum IrOutputFormat {
    Json,
    Yaml,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum IrDirection {
    /* Native struct to N-API value */
    Out,
    /* N-API value to native struct */
    In,
}

impl From<IrDirection> for Direction {
    fn from(direction: IrDirection) -> Self {
        match direction {
            IrDirection::Out => Direction::Out,
            IrDirection::In => Direction::In,
        }
    }
}

/* Execute the analyze command */
pub fn run(
    file: PathBuf,
    type_name: Option<String>,
    include_dirs: Vec<PathBuf>,
    print_ir: bool,
    ir_format: IrOutputFormat,
    direction: IrDirection,
) -> anyhow::Result<()> {
    println!("Datamodel Generator - Analysis Tool");
    println!("===================================\n");

    let schema = load_schema(&file, &include_dirs, true)?;
    let (datamodel, resolver) = resolve_datamodel(&schema, type_name.as_deref())?;

    println!("[~] Resolution order:");
    for name in &resolver.resolution_order {
        println!("    - {}", name);
    }
    if !resolver.enums.is_empty() {
        println!("[~] Enums (exchanged as int32_t):");
        for name in resolver.enums.keys() {
            println!("    - {}", name);
        }
    }
    println!();

    println!("[~] Datasets of {}:", datamodel.name);
    for dataset in datamodel.root.fields.iter() {
        println!("    {}", describe_dataset(dataset));
    }
    println!();

    let exchanged: Vec<&Field> = datamodel
        .datasets()
        .filter(|dataset| dataset.flags.published || dataset.flags.subscribed)
        .collect();
    if exchanged.is_empty() {
        bail!("datamodel {} has no published or subscribed datasets", datamodel.name);
    }

    if print_ir {
        let direction = Direction::from(direction);
        let mut programs: IndexMap<String, Emission> = IndexMap::new();
        for dataset in exchanged {
            let emission = flatten_dataset(
                dataset,
                &ModuleContext::native_place(dataset),
                &ModuleContext::value_handle(dataset),
                direction,
            )
            .with_context(|| format!("flattening dataset {}", dataset.name))?;
            programs.insert(dataset.name.clone(), emission);
        }

        let text = match ir_format {
            IrOutputFormat::Json => serde_json::to_string_pretty(&programs)?,
            IrOutputFormat::Yaml => serde_yml::to_string(&programs)?,
        };
        println!("{}", text);
    }

    Ok(())
}

/* `Speed: int16_t[4] (PUB SUB)` */
fn describe_dataset(dataset: &Field) -> String {
    let mut text = format!("{}: {}", dataset.name, dataset.c_type_name());
    if dataset.is_array() {
        text.push_str(&format!("[{}]", dataset.array_size));
    }
    if let FieldType::Record(record) = &dataset.ty {
        text.push_str(&format!(" ({} fields)", record.fields.len()));
    }

    let mut markers = Vec::new();
    if dataset.flags.published {
        markers.push("PUB");
    }
    if dataset.flags.subscribed {
        markers.push("SUB");
    }
    if dataset.flags.private {
        markers.push("private");
    }
    if !markers.is_empty() {
        text.push_str(&format!(" [{}]", markers.join(" ")));
    }
    text
}
