use clap::{Parser, Subcommand};
use cmds::analyze::{IrDirection, IrOutputFormat};
use dm_gen::codegen::napi::NapiCodeGeneratorOptions;
use dm_gen::dm_loader::Packaging;
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

mod cmds;

#[derive(Parser)]
#[command(name = "dm-gen")]
#[command(about = "N-API component generator for exOS datamodels", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /* Generate header, N-API module and package files for a datamodel */
    Codegen {
        /* Root datamodel file */
        #[arg(short = 'f', long = "file", value_name = "FILE")]
        file: PathBuf,

        /* Root type, defaults to the datamodel name declared in the file */
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        type_name: Option<String>,

        /* Include directories for imported datamodel files */
        #[arg(short = 'i', long = "include-dir", value_name = "DIR")]
        include_dirs: Vec<PathBuf>,

        /* Output directory for the generated component */
        #[arg(short = 'o', long = "output", value_name = "DIR", default_value = "generated")]
        output_dir: PathBuf,

        /* Override the packaging declared in the datamodel file (deb or none) */
        #[arg(long = "packaging", value_name = "MODE")]
        packaging: Option<Packaging>,

        /* N-API version pinned by the generated module */
        #[arg(long = "napi-version", value_name = "VERSION", default_value_t = 6)]
        napi_version: u32,

        /* Leave out the known-issues comment at the top of the module */
        #[arg(long = "no-known-issues")]
        no_known_issues: bool,

        /* Enable verbose output */
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },

    /* Show the resolved datamodel and optionally its marshalling IR */
    Analyze {
        /* Root datamodel file */
        #[arg(short = 'f', long = "file", value_name = "FILE")]
        file: PathBuf,

        /* Root type, defaults to the datamodel name declared in the file */
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        type_name: Option<String>,

        /* Include directories for imported datamodel files */
        #[arg(short = 'i', long = "include-dir", value_name = "DIR")]
        include_dirs: Vec<PathBuf>,

        /* Print the marshalling IR of every exchanged dataset */
        #[arg(long = "print-ir")]
        print_ir: bool,

        /* Format to use when printing the IR */
        #[arg(long = "ir-format", value_enum, default_value = "json")]
        ir_format: IrOutputFormat,

        /* Marshalling direction of the printed IR */
        #[arg(long = "direction", value_enum, default_value = "out")]
        direction: IrDirection,

        /* Enable verbose output */
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },
}

/* RUST_LOG wins; otherwise warn, or debug with --verbose */
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Codegen {
            file,
            type_name,
            include_dirs,
            output_dir,
            packaging,
            napi_version,
            no_known_issues,
            verbose,
        } => {
            init_tracing(verbose);
            let napi = NapiCodeGeneratorOptions { emit_known_issues: !no_known_issues, napi_version };
            cmds::codegen::run(file, type_name, include_dirs, output_dir, packaging, napi, verbose)?;
        }

        Commands::Analyze {
            file,
            type_name,
            include_dirs,
            print_ir,
            ir_format,
            direction,
            verbose,
        } => {
            init_tracing(verbose);
            cmds::analyze::run(file, type_name, include_dirs, print_ir, ir_format, direction)?;
        }
    }

    Ok(())
}
