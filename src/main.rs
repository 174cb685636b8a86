use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use sqm_lowering::config::{self, LoweringConfig};
use sqm_lowering::domain_catalog::config::DomainModelConfig;
use sqm_lowering::sqm::{BindingsDocument, QueryOptions, QueryParameterBindings, SqmStatement};

/// sqm-lower - Lowers an SQM statement into a SQL AST
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Domain model definition (YAML)
    #[arg(long)]
    model: PathBuf,

    /// SQM statement to lower (JSON)
    #[arg(long)]
    statement: PathBuf,

    /// Parameter bindings (JSON)
    #[arg(long)]
    bindings: Option<PathBuf>,

    /// Query options such as lock modes (JSON)
    #[arg(long)]
    options: Option<PathBuf>,

    /// Lowering configuration (YAML); used instead of the environment, flags
    /// below still apply on top
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pad expanded IN lists to the next power of two
    #[arg(long)]
    in_clause_parameter_padding: bool,

    /// Warn when an IN list grows beyond this many expressions
    #[arg(long)]
    in_expression_count_limit: Option<u32>,

    /// Keep repeated selection expressions as separate selections
    #[arg(long)]
    no_selection_deduplication: bool,

    /// Join association targets even when the foreign key would do
    #[arg(long)]
    no_fk_optimization: bool,
}

impl From<&Cli> for config::CliConfig {
    fn from(cli: &Cli) -> Self {
        config::CliConfig {
            in_clause_parameter_padding: cli.in_clause_parameter_padding,
            in_expression_count_limit: cli.in_expression_count_limit,
            no_selection_deduplication: cli.no_selection_deduplication,
            no_fk_optimization: cli.no_fk_optimization,
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let base = match &cli.config {
        Some(path) => LoweringConfig::from_yaml_file(path)?,
        None => LoweringConfig::from_env()?,
    };
    let lowering_config = base.with_cli_overrides((&cli).into())?;
    log::debug!("Lowering configuration: {:?}", lowering_config);

    let model = DomainModelConfig::from_yaml_file(&cli.model)?.to_domain_model()?;
    let statement: SqmStatement = read_json(&cli.statement)?;
    let bindings: QueryParameterBindings = match &cli.bindings {
        Some(path) => read_json::<BindingsDocument>(path)?.into(),
        None => QueryParameterBindings::new(),
    };
    let options: QueryOptions = match &cli.options {
        Some(path) => read_json(path)?,
        None => QueryOptions::default(),
    };

    let (translation, xref) = sqm_lowering::compile(&statement, &model, &bindings, &options, &lowering_config)?;
    log::info!(
        "Lowered {} statement: {} parameter occurrence(s), {} JDBC parameter(s)",
        statement.kind_name(),
        xref.occurrence_count(),
        translation.jdbc_parameter_count()
    );

    println!("{}", serde_json::to_string_pretty(&translation)?);
    Ok(())
}

fn main() {
    dotenvy::dotenv().ok();
    // Initialize logger - defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
