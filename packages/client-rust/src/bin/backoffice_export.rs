//! Exports one backoffice list to JSON.
//!
//! ```text
//! backoffice-export --endpoint deposits/list --entity deposits \
//!     --columns id,amount,status --status APPROVED --from 2024-01-01 -o deposits.json
//! ```
//!
//! With `--layout-dir`, the saved column layout for `--entity` decides column
//! order, visibility, sort, and filters.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use backoffice_client::{
    export, ClientConfig, FileLayoutStorage, LayoutController, LayoutError, RestBackend,
};
use backoffice_core::{
    ColumnSpec, DateParamStyle, DateRange, GridDefinition, ListRequest, SortItem, SortMode,
};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "backoffice-export", version)]
#[command(about = "Export every row of a backoffice list as JSON")]
struct Args {
    /// Base URL of the backoffice API.
    #[arg(long, env = "BACKOFFICE_BASE_URL", default_value = "http://localhost:8080/api")]
    base_url: String,

    /// Request timeout in seconds.
    #[arg(long, env = "BACKOFFICE_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// List endpoint, relative to the base URL.
    #[arg(long)]
    endpoint: String,

    /// Entity name; also the saved-layout key.
    #[arg(long)]
    entity: String,

    /// Columns in display order.
    #[arg(long, value_delimiter = ',', required = true)]
    columns: Vec<String>,

    /// Prepend a 1-based row-number column with this name.
    #[arg(long)]
    row_index: Option<String>,

    #[arg(long)]
    search: Option<String>,

    #[arg(long)]
    status: Option<String>,

    /// Start of the date range (YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,

    /// End of the date range (YYYY-MM-DD).
    #[arg(long)]
    to: Option<NaiveDate>,

    #[arg(long, value_enum, default_value_t = DateStyle::FromTo)]
    date_style: DateStyle,

    /// Extra endpoint parameter as key=value. Repeatable.
    #[arg(long = "param", value_parser = parse_key_val)]
    params: Vec<(String, String)>,

    /// Sort as field:asc or field:desc. Repeatable; ignored when a saved layout is used.
    #[arg(long = "sort", value_parser = parse_sort)]
    sort: Vec<SortItem>,

    /// Sort rows locally instead of on the server.
    #[arg(long)]
    client_sort: bool,

    /// Directory holding saved column layouts.
    #[arg(long, env = "BACKOFFICE_LAYOUT_DIR")]
    layout_dir: Option<PathBuf>,

    /// Output file. Writes to stdout when omitted.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    FromTo,
    StartEnd,
}

impl From<DateStyle> for DateParamStyle {
    fn from(style: DateStyle) -> Self {
        match style {
            DateStyle::FromTo => Self::FromTo,
            DateStyle::StartEnd => Self::StartEnd,
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    Ok((key.to_string(), value.to_string()))
}

fn parse_sort(s: &str) -> Result<SortItem, String> {
    match s.split_once(':') {
        None => Ok(SortItem::asc(s)),
        Some((field, "asc")) => Ok(SortItem::asc(field)),
        Some((field, "desc")) => Ok(SortItem::desc(field)),
        Some((_, other)) => Err(format!("unknown sort direction `{other}`")),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

impl Args {
    fn config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_secs(self.timeout_secs),
            ..ClientConfig::default()
        }
    }

    fn grid(&self) -> GridDefinition {
        let columns = self.columns.iter().map(ColumnSpec::new).collect();
        let mut grid = GridDefinition::new(columns)
            .with_default_sort(self.sort.clone())
            .with_sort_mode(if self.client_sort {
                SortMode::Client
            } else {
                SortMode::Server
            });
        if let Some(field) = &self.row_index {
            grid = grid.with_row_index(field.clone());
        }
        grid
    }

    fn selection(&self) -> ListRequest {
        let mut request = ListRequest::offset(1, ClientConfig::default().pagination.default_page_size);
        if let Some(search) = &self.search {
            request = request.with_search_key(search.clone());
        }
        if let Some(status) = &self.status {
            request = request.with_status(status.clone());
        }
        if self.from.is_some() || self.to.is_some() {
            request = request.with_date_range(DateRange::new(self.from, self.to, self.date_style.into()));
        }
        for (key, value) in &self.params {
            request = request.with_param(key.clone(), value.clone());
        }
        request
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let backend = RestBackend::new(&args.config()).context("building HTTP client")?;
    let grid = args.grid();

    let layout = match &args.layout_dir {
        Some(dir) => {
            let storage = Arc::new(FileLayoutStorage::new(dir.clone()));
            let controller = LayoutController::new(grid.clone(), args.entity.clone(), storage);
            match controller.restore().await {
                Ok(state) => state,
                Err(e @ LayoutError::Corrupt { .. }) => {
                    warn!(error = %e, "ignoring saved layout");
                    controller.state()
                }
                Err(e) => return Err(e).context("loading saved layout"),
            }
        }
        None => Arc::new(grid.default_layout()),
    };

    let selection = args
        .selection()
        .with_sort(grid.server_sort(&layout.sort_model))
        .with_filter_model(layout.filter_model.clone());

    let document = export(&backend, &args.entity, &args.endpoint, &selection, &grid, &layout)
        .await
        .with_context(|| format!("exporting {}", args.endpoint))?;

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            document.write_json(&mut writer)?;
            writer.flush()?;
            info!(path = %path.display(), rows = document.len(), "wrote export");
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            document.write_json(&mut writer)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_direction_defaults_to_ascending() {
        assert_eq!(parse_sort("amount").unwrap(), SortItem::asc("amount"));
        assert_eq!(parse_sort("amount:asc").unwrap(), SortItem::asc("amount"));
        assert_eq!(parse_sort("createdAt:desc").unwrap(), SortItem::desc("createdAt"));
    }

    #[test]
    fn unknown_sort_direction_is_rejected() {
        let err = parse_sort("amount:down").unwrap_err();
        assert!(err.contains("down"), "{err}");
        assert!(parse_sort("amount:DESC").is_err());
    }

    #[test]
    fn params_split_on_the_first_equals_sign() {
        assert_eq!(
            parse_key_val("storeId=42").unwrap(),
            ("storeId".to_string(), "42".to_string())
        );
        assert_eq!(
            parse_key_val("memo=a=b").unwrap(),
            ("memo".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_key_val("empty=").unwrap(), ("empty".to_string(), String::new()));
        assert!(parse_key_val("storeId").is_err());
    }

    #[test]
    fn flags_build_the_selection() {
        let args = Args::try_parse_from([
            "backoffice-export",
            "--endpoint",
            "deposits/list",
            "--entity",
            "deposits",
            "--columns",
            "id,amount",
            "--status",
            "APPROVED",
            "--param",
            "storeId=7",
            "--sort",
            "amount:desc",
        ])
        .unwrap();

        let selection = args.selection();
        assert_eq!(selection.status.as_deref(), Some("APPROVED"));
        assert_eq!(args.sort, [SortItem::desc("amount")]);
        assert_eq!(args.grid().visible_fields(&args.grid().default_layout()), ["id", "amount"]);
    }
}
