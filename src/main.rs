pub mod types;
pub mod config;
pub mod data;
pub mod flatten;
pub mod projection;
pub mod reconcile;
pub mod processing;
pub mod pipeline;
pub mod render;

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the border datasets and write the density map inputs
    Build {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Flatten the shapes of one border file into xs/ys arrays
    Flatten {
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        #[arg(short, long, value_name = "COLUMN")]
        name_column: String,
        #[arg(short, long, value_name = "COLUMN")]
        code_column: Option<String>,
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}

#[derive(Serialize)]
struct FlattenedFile {
    name: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<Vec<Option<String>>>,
    xs: Vec<flatten::FlatCoords>,
    ys: Vec<flatten::FlatCoords>,
}

impl FlattenedFile {
    /// Codes are only carried when a code column was asked for.
    fn new(dataset: types::BorderDataset, with_code: bool) -> Self {
        let (xs, ys) = flatten::flatten_column(dataset.rows.iter().map(|r| r.geometry.as_ref()));
        let code = with_code.then(|| dataset.rows.iter().map(|r| r.code.clone()).collect());
        let name = dataset.rows.into_iter().map(|r| r.name).collect();
        Self { name, code, xs, ys }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Build { config } => {
            info!("Building density map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            // 1. Load Data
            let datasets = data::load_datasets(&app_config)?;
            let population = data::load_population(&app_config.population.path, &app_config.population.year)?;
            let capitals = data::load_capitals(&app_config.capitals)?;
            let base = datasets.get(&app_config.reconcile.base)
                .ok_or_else(|| anyhow::anyhow!("Base dataset '{}' is not loaded", app_config.reconcile.base))?;
            let columns = render::ShapefileColumns::for_dataset(base, &app_config.population.year);

            // 2. Reconcile, join, compute density
            let dataset = pipeline::build_canonical_dataset(pipeline::PipelineInputs {
                datasets,
                base: app_config.reconcile.base.clone(),
                patches: app_config.patches.clone(),
                population,
                capitals,
            })?;

            // 3. Write outputs
            render::write_shapefile(&app_config.output.shapefile, &dataset.records, &columns)?;
            render::write_json(&app_config.output.plot_source, &render::PlotSource::new(&dataset))?;

            info!("Build complete!");
        }
        Commands::Flatten { input, name_column, code_column, output } => {
            let dataset = data::load_border_dataset(
                "input",
                &config::DatasetConfig {
                    path: input.clone(),
                    name_column: name_column.clone(),
                    code_column: code_column.clone().unwrap_or_default(),
                    crs: None,
                },
            )?;

            let flattened = FlattenedFile::new(dataset, code_column.is_some());
            render::write_json(output, &flattened)?;
        }
    }

    Ok(())
}
