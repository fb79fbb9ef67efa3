use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use pondok_table::controller::Controller;
use pondok_table::model::{Model, Status};
use pondok_table::source::load_data_file;
use pondok_table::ui::TableUI;
use pondok_table::{TableError, ViewerConfig};

/// Page through a CSV, Parquet, Arrow or XLSX file, filter it and export
/// the result to xlsx.
#[derive(Parser, Debug)]
#[command(name = "pondok-table", version)]
struct Cli {
    /// Data file to show
    path: String,

    /// Rows per page
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    page_size: u64,

    /// Directory exported workbooks are written to
    #[arg(long, default_value = ".")]
    export_dir: String,

    /// Workbook name without extension, defaults to the data file stem
    #[arg(long)]
    export_name: Option<String>,

    #[arg(long, default_value = pondok_table::export::DEFAULT_SHEET_NAME)]
    sheet_name: String,

    /// Columns with at most this many distinct values get a select filter
    #[arg(long, default_value_t = 12)]
    select_threshold: usize,

    /// Fetch pages one by one instead of slicing the loaded file
    #[arg(long)]
    server_paging: bool,

    /// Write logs to this file, filtered by PONDOK_LOG
    #[arg(long)]
    log_file: Option<String>,

    /// Milliseconds to wait for terminal events
    #[arg(long, default_value_t = 100)]
    event_poll_time: u64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = run(cli);
    ratatui::restore();
    match result {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn expand(path: &str) -> Result<PathBuf, TableError> {
    shellexpand::full(path)
        .map(|p| PathBuf::from(p.as_ref()))
        .map_err(|e| TableError::LoadingFailed(e.to_string()))
}

fn init_logging(log_file: Option<&str>) -> Result<(), TableError> {
    let filter = EnvFilter::try_from_env("PONDOK_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    // the terminal belongs to the ui, logs only go to a file
    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(expand(path)?)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn config_from(cli: &Cli) -> Result<ViewerConfig, TableError> {
    let mut config = ViewerConfig::default()
        .with_page_size(cli.page_size as usize)
        .with_export_dir(expand(&cli.export_dir)?)
        .with_sheet_name(cli.sheet_name.clone())
        .with_select_threshold(cli.select_threshold)
        .with_server_paging(cli.server_paging)
        .with_event_poll_time(cli.event_poll_time);
    if let Some(name) = &cli.export_name {
        config = config.with_export_name(name.clone());
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<(), TableError> {
    init_logging(cli.log_file.as_deref())?;
    let config = config_from(&cli)?;
    info!("Starting pondok-table with {config:?}");

    let dataset = load_data_file(expand(&cli.path)?)?;

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    let mut model = Model::init(&config, dataset, size.width as usize, size.height as usize)?;
    let mut ui = TableUI::new();
    let controller = Controller::new(&config);

    while model.status != Status::Quitting {
        terminal.draw(|f| ui.draw(&model, f))?;
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }
    info!("Bye");
    Ok(())
}
