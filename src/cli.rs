//! The command line interface for sitecluster.
use crate::finance::{Compounding, inflation_price_adjustment, investment_cost_calculator};
use crate::input::read_price_index;
use crate::log;
use crate::model::Model;
use crate::output::metadata::write_metadata;
use crate::output::{create_output_directory, get_output_dir, write_clusters};
use crate::settings::Settings;
use ::log::{info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for sitecluster.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// Options for the cluster command
#[derive(Args)]
pub struct ClusterOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Cluster candidate sites as described by a settings file.
    Cluster {
        /// Folder containing `<technology>_sites.csv` and `<technology>_profiles.csv` files.
        data_dir: PathBuf,
        /// Path to the cluster settings file.
        settings_path: PathBuf,
        /// Other options
        #[command(flatten)]
        opts: ClusterOpts,
    },
    /// Annualise capital costs.
    Annuity {
        /// Capital cost
        capex: f64,
        /// Weighted average cost of capital (as a fraction)
        wacc: f64,
        /// Capital recovery period in years
        years: f64,
        /// How interest is compounded (discrete or continuous)
        #[arg(long, default_value_t = Compounding::Discrete)]
        compounding: Compounding,
    },
    /// Convert a price from one year's money to another's.
    Inflate {
        /// The price to convert
        price: f64,
        /// The year the price is given in
        base_year: u32,
        /// The year to convert the price to
        target_year: u32,
        /// CSV file with `year` and `value` columns giving a price index
        #[arg(long)]
        price_index: PathBuf,
    },
    /// Manage program settings.
    Settings {
        /// The available subcommands for managing settings.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Cluster {
                data_dir,
                settings_path,
                opts,
            } => handle_cluster_command(&data_dir, &settings_path, &opts, None),
            Self::Annuity {
                capex,
                wacc,
                years,
                compounding,
            } => {
                let cost = handle_annuity_command(capex, wacc, years, compounding)?;
                println!("{cost}");
                Ok(())
            }
            Self::Inflate {
                price,
                base_year,
                target_year,
                price_index,
            } => {
                let price = handle_inflate_command(price, base_year, target_year, &price_index)?;
                println!("{price}");
                Ok(())
            }
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and run the requested command
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ sitecluster --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    let Some(command) = cli.command else {
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Handle the `cluster` command.
///
/// # Arguments
///
/// * `data_dir` - Folder containing site data
/// * `settings_path` - Path to the cluster settings file
/// * `opts` - Output options
/// * `settings` - Program settings. If `None`, they are read from the user's settings file.
pub fn handle_cluster_command(
    data_dir: &Path,
    settings_path: &Path,
    opts: &ClusterOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = if let Some(settings) = settings {
        settings
    } else {
        Settings::load().context("Failed to load settings.")?
    };

    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(settings_path)?;
        &pathbuf
    };

    let overwrite = create_output_directory(output_path, opts.overwrite || settings.overwrite)
        .with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;

    // The logger can only be set once per process, which matters when this is called repeatedly
    // (e.g. from tests)
    if !log::is_logger_initialised() {
        log::init(Some(settings.log_level.as_str()), Some(output_path))
            .context("Failed to initialise logging.")?;
    }

    let model = Model::from_path(settings_path, data_dir).context("Failed to load settings.")?;
    info!("Loaded cluster settings from {}", settings_path.display());
    info!("Output folder: {}", output_path.display());

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder will be overwritten");
    }

    write_metadata(output_path, settings_path, data_dir)?;
    let results = model.cluster_all()?;
    write_clusters(output_path, &results).context("Failed to write output files.")?;
    let n_clusters: usize = results.iter().map(|clusters| clusters.rows.len()).sum();
    info!("Clustering complete! Created {n_clusters} clusters");

    Ok(())
}

/// Handle the `annuity` command, returning the annualised cost
pub fn handle_annuity_command(
    capex: f64,
    wacc: f64,
    years: f64,
    compounding: Compounding,
) -> Result<f64> {
    investment_cost_calculator(capex, wacc, years, compounding)?
        .scalar()
        .context("Expected a single annualised cost")
}

/// Handle the `inflate` command, returning the converted price
pub fn handle_inflate_command(
    price: f64,
    base_year: u32,
    target_year: u32,
    price_index_path: &Path,
) -> Result<f64> {
    let index = read_price_index(price_index_path)?;
    inflation_price_adjustment(price, base_year, target_year, &index)?
        .scalar()
        .context("Expected a single price")
}
