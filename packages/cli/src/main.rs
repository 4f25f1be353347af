#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the zoning compatibility pipeline.
//!
//! `validate` runs a full validation against the live geocoder, GIS and
//! classifier services and prints the report as JSON. The remaining
//! subcommands expose the embedded rule tables and need no network.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pyxten_ai::classifier::{LlmUseClassifier, UseClassifier};
use pyxten_ai::keyword::KeywordUseClassifier;
use pyxten_ai::providers::LlmProvider as _;
use pyxten_geocoder::google::GoogleGeocoder;
use pyxten_gis::mipr::MiprClient;
use pyxten_pipeline::{PipelineConfig, ResolutionPipeline, ValidationRequest};
use pyxten_zoning::RegulationCatalog;
use pyxten_zoning::equivalency::RegulationVintage;
use pyxten_zoning_models::ZoningCategory;

/// Pre-validate land uses against Puerto Rico zoning.
#[derive(Parser)]
#[command(name = "pyxten")]
#[command(about = "Pre-validate land uses against Puerto Rico zoning")]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Validate a proposed use at an address.
    Validate {
        /// Street address.
        #[arg(long)]
        address: String,

        /// Municipality (e.g., "San Juan").
        #[arg(long)]
        municipality: String,

        /// Free-text description of the proposed use.
        #[arg(long = "use")]
        use_description: String,

        /// Pipeline configuration TOML file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Classify with catalog keywords instead of an LLM.
        #[arg(long)]
        offline: bool,
    },

    /// Translate a municipal zoning code.
    Equivalency {
        /// Zoning code (e.g., "R-2").
        code: String,

        /// Regulation edition to translate to ("current" or "legacy").
        #[arg(long, default_value = "current")]
        vintage: RegulationVintage,
    },

    /// List current zoning districts.
    Districts {
        /// Only districts of this category (e.g., "residential").
        #[arg(long)]
        category: Option<ZoningCategory>,
    },

    /// List or search land-use types.
    Uses {
        /// Keyword search term.
        #[arg(long)]
        search: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let catalog = RegulationCatalog::load_embedded().inspect_err(|e| {
        log::error!("Regulation catalog is corrupt: {e}");
    })?;

    match cli.command {
        Commands::Validate {
            address,
            municipality,
            use_description,
            config,
            offline,
        } => {
            cmd_validate(
                Arc::new(catalog),
                &address,
                &municipality,
                &use_description,
                config,
                offline,
            )
            .await
        }
        Commands::Equivalency { code, vintage } => cmd_equivalency(&catalog, &code, vintage),
        Commands::Districts { category } => cmd_districts(&catalog, category),
        Commands::Uses { search } => cmd_uses(&catalog, search.as_deref()),
    }
}

/// Runs one validation and prints the report.
async fn cmd_validate(
    catalog: Arc<RegulationCatalog>,
    address: &str,
    municipality: &str,
    use_description: &str,
    config_path: Option<PathBuf>,
    offline: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = ValidationRequest::new(address, municipality, use_description)?;
    let config = match config_path {
        Some(path) => PipelineConfig::load(&path)?,
        None => PipelineConfig::default(),
    };

    let client = reqwest::Client::new();
    let geocoder = GoogleGeocoder::from_env(client.clone())?;
    let gis = MiprClient::new(client.clone())?;

    let classifier: Arc<dyn UseClassifier> = if offline || !pyxten_ai::providers::credentials_available()
    {
        if !offline {
            log::warn!("No AI credentials found, falling back to keyword classification");
        }
        Arc::new(KeywordUseClassifier::new(catalog.taxonomy()))
    } else {
        let provider = pyxten_ai::providers::create_provider_from_env(client)?;
        log::info!("Classifying with {}", provider.name());
        Arc::new(LlmUseClassifier::new(provider, catalog.taxonomy()))
    };

    let pipeline =
        ResolutionPipeline::new(catalog, Arc::new(geocoder), Arc::new(gis), classifier, config);
    let report = pipeline.run(&request).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Prints the resolution of one zoning code.
fn cmd_equivalency(
    catalog: &RegulationCatalog,
    code: &str,
    vintage: RegulationVintage,
) -> Result<(), Box<dyn std::error::Error>> {
    let resolver = catalog.equivalency();
    let output = serde_json::json!({
        "resolution": resolver.resolve(code, vintage),
        "municipalSpecific": resolver.is_municipal_specific(code),
        "allEquivalents": resolver.all_equivalents(code),
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Prints current districts.
fn cmd_districts(
    catalog: &RegulationCatalog,
    category: Option<ZoningCategory>,
) -> Result<(), Box<dyn std::error::Error>> {
    let districts = match category {
        Some(category) => catalog.districts().in_category(category),
        None => catalog.districts().iter().collect(),
    };

    println!("{}", serde_json::to_string_pretty(&districts)?);
    Ok(())
}

/// Prints the use catalog, or keyword matches for `search`.
fn cmd_uses(
    catalog: &RegulationCatalog,
    search: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = match search {
        Some(term) => serde_json::to_string_pretty(&catalog.taxonomy().quick_match(term))?,
        None => serde_json::to_string_pretty(&catalog.taxonomy().iter().collect::<Vec<_>>())?,
    };

    println!("{output}");
    Ok(())
}
