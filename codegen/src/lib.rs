//! # State Sync Code Generator
//!
//! Turns a protocol schema document into TypeScript client code:
//!
//! - `schema.json`: the document itself, pretty printed
//! - `schema.ts`: interfaces for every definition, per-land action and event
//!   maps, `SCHEMA_HASH`, `PROTOCOL_VERSION` and the path-hash tables
//! - `<landId>.ts`: a typed store per land, plus a Vue composable or React
//!   hook when a framework is selected
//!
//! The schema hash written into `schema.ts` is the one the server checks at
//! connect, so generated clients must be rebuilt whenever the server's state
//! types change.

pub mod error;
pub mod input;
pub mod typescript;
pub mod wrapper;

pub use error::CodegenError;

use clap::{Args, ValueEnum};
use log::info;
use shared::schema::ProtocolSchema;
use std::path::{Path, PathBuf};

/// UI framework to wrap each land's store for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Framework {
    Vue,
    React,
}

/// Arguments of the `codegen` command
#[derive(Debug, Clone, Args)]
pub struct CodegenArgs {
    /// Schema document: a file path or an http(s) URL
    #[clap(short, long)]
    pub input: String,
    /// Directory the generated files are written to
    #[clap(short, long)]
    pub output: PathBuf,
    /// Also emit a composable (vue) or hook (react) per land
    #[clap(short, long, value_enum)]
    pub framework: Option<Framework>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Path relative to the output directory
    pub name: String,
    pub contents: String,
}

/// Renders every output file in memory.
pub fn render(
    schema: &ProtocolSchema,
    framework: Option<Framework>,
) -> Result<Vec<GeneratedFile>, CodegenError> {
    let mut json = schema.to_json_pretty()?;
    json.push('\n');

    let mut files = vec![
        GeneratedFile {
            name: "schema.json".to_string(),
            contents: json,
        },
        GeneratedFile {
            name: "schema.ts".to_string(),
            contents: typescript::render_schema_module(schema),
        },
    ];

    for (land_id, land) in &schema.lands {
        files.push(GeneratedFile {
            name: wrapper::wrapper_file_name(land_id)?,
            contents: wrapper::render_land_module(schema, land_id, land, framework),
        });
    }
    Ok(files)
}

/// Writes rendered files under `output`, creating it if needed.
pub fn write_files(output: &Path, files: &[GeneratedFile]) -> Result<Vec<PathBuf>, CodegenError> {
    std::fs::create_dir_all(output).map_err(|source| CodegenError::Write {
        path: output.to_path_buf(),
        source,
    })?;

    files
        .iter()
        .map(|file| {
            let path = output.join(&file.name);
            std::fs::write(&path, &file.contents).map_err(|source| CodegenError::Write {
                path: path.clone(),
                source,
            })?;
            info!("Wrote {} ({} bytes)", path.display(), file.contents.len());
            Ok(path)
        })
        .collect()
}

/// Runs the whole `codegen` command.
pub async fn generate(args: &CodegenArgs) -> Result<Vec<PathBuf>, CodegenError> {
    let schema = input::load_schema(&args.input).await?;
    let files = render(&schema, args.framework)?;
    write_files(&args.output, &files)
}
