use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, Date, OffsetDateTime};

use crate::config::AppConfig;
use crate::navigation::{InboundNavigation, Readiness, Resolution, SmartLinkOutcome, TableVariantDirective};
use crate::query::{Projection, ReadDescriptor};
use crate::session::{BrowserSession, Message, SearchOutcome};
use crate::snapshot::{keys, parse_date_range, parse_iso_date, DateRange, ExpandLevel, FieldValue, FilterSnapshot, OpenItemFilter};
use crate::status::ItemStatus;
use crate::store::{MemoryTokenStore, SqliteTokenStore, TokenRecord, TokenStore};
use crate::surface::{FilterSurface, InMemorySurface};

#[derive(Args, Debug, Clone, Default)]
pub struct SnapshotArgs {
    /// Item status (open, cleared, all)
    #[arg(long, value_parser = parse_status)]
    pub status: Option<ItemStatus>,
    /// Key date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub key_date: Option<Date>,
    /// Remove the key date the status switch put in place
    #[arg(long, conflicts_with = "key_date")]
    pub no_key_date: bool,
    /// Posting date range (FROM..TO, FROM.., ..TO or a single day)
    #[arg(long, value_parser = parse_range)]
    pub posting_date: Option<DateRange>,
    /// Clearing date range (FROM..TO, FROM.., ..TO or a single day)
    #[arg(long, value_parser = parse_range)]
    pub clearing_date: Option<DateRange>,
    #[arg(long)]
    pub display_currency: Option<String>,
    #[arg(long)]
    pub rate_type: Option<String>,
    #[arg(long, value_parser = parse_date)]
    pub rate_date: Option<Date>,
    /// Hierarchy level as L<n>
    #[arg(long, value_parser = parse_level)]
    pub expand_level: Option<ExpandLevel>,
    /// Restrict open items to open-item managed accounts
    #[arg(long)]
    pub oim_only: bool,
    /// Selection field as NAME=VALUE (repeatable)
    #[arg(long = "field", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,
    /// Requested result columns, comma separated
    #[arg(long, default_value = "")]
    pub select: String,
    /// Leading ledger reported by the backend
    #[arg(long, default_value = "0L")]
    pub leading_ledger: String,
    /// Default date ranges run from the fiscal year start instead of January
    #[arg(long)]
    pub fiscal_year_variant: bool,
    /// Print the full read as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    #[command(subcommand)]
    pub command: StateCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum StateCommand {
    /// Validate the filter state, store it and print the token
    Save(SnapshotArgs),
    /// Restore a stored state and run its search
    Load(LoadArgs),
    /// List recently stored tokens
    List(ListArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    pub token: String,
    #[arg(long, default_value = "0L")]
    pub leading_ledger: String,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Navigation payload as JSON. If omitted, reads from stdin.
    pub payload: Option<PathBuf>,
    #[arg(long, default_value = "0L")]
    pub leading_ledger: String,
    /// Pretend the filter bar runs a non-standard variant
    #[arg(long)]
    pub custom_variant: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SmartLinkArgs {
    /// Link field, e.g. /ClearingAccountingDocument
    pub link_field: String,
    /// Row as a JSON object. If omitted, reads from stdin.
    #[arg(long)]
    pub row: Option<String>,
    /// Semantic object of a table cell link; the row is read as its attributes
    #[arg(long)]
    pub semantic_object: Option<String>,
    #[command(flatten)]
    pub selection: SnapshotArgs,
}

type CliSession<T> = BrowserSession<InMemorySurface, T>;

pub fn run_compile(config: &AppConfig, args: &SnapshotArgs, today: Date) -> Result<String> {
    let store = MemoryTokenStore::new(config.store.token_prefix.clone());
    let mut session = session_from_args(config, store, args, today)?;
    let read = search(&mut session)?;
    format_read(&read, args.json)
}

pub fn handle_state_command(config: &AppConfig, args: StateArgs, today: Date) -> Result<String> {
    let store = SqliteTokenStore::open(&config.store)?;
    match args.command {
        StateCommand::Save(args) => save_state(config, store, &args, today),
        StateCommand::Load(args) => load_state(config, store, &args, today),
        StateCommand::List(args) => list_states(&store, &args),
    }
}

pub fn resolve_payload(config: &AppConfig, args: &ResolveArgs, today: Date) -> Result<String> {
    let raw = match &args.payload {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading navigation payload {}", path.display()))?,
        None => match read_stdin()? {
            Some(raw) => raw,
            None => bail!("no navigation payload given; pass a file or pipe JSON on stdin"),
        },
    };
    let store = SqliteTokenStore::open(&config.store)?;
    run_resolve(config, store, &raw, args, today)
}

pub fn run_smartlink(config: &AppConfig, args: &SmartLinkArgs, today: Date) -> Result<String> {
    let raw = match &args.row {
        Some(raw) => raw.clone(),
        None => match read_stdin()? {
            Some(raw) => raw,
            None => bail!("no row given; pass --row or pipe JSON on stdin"),
        },
    };
    let row: IndexMap<String, Value> =
        serde_json::from_str(&raw).context("row must be a JSON object")?;

    let store = MemoryTokenStore::new(config.store.token_prefix.clone());
    let mut session = session_from_args(config, store, &args.selection, today)?;
    let outcome = match &args.semantic_object {
        Some(object) => session.table_link(object, &args.link_field, &row),
        None => session.smart_link(&row, &args.link_field),
    };

    let mut out = serde_json::to_string_pretty(&outcome).context("serializing link outcome")?;
    out.push('\n');
    if let SmartLinkOutcome::Suppressed { .. } = outcome {
        for message in session.messages().messages() {
            let _ = writeln!(&mut out, "{}: {}", message.key, message.text);
        }
    }
    Ok(out)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadReport<'a> {
    token: &'a str,
    snapshot: &'a FilterSnapshot,
    table_variant: Option<&'a TableVariantDirective>,
    read: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stored_as: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveReport<'a> {
    resolution: Option<&'a Resolution>,
    read: Option<String>,
    messages: &'a [Message],
}

fn save_state(
    config: &AppConfig,
    store: SqliteTokenStore,
    args: &SnapshotArgs,
    today: Date,
) -> Result<String> {
    let mut session = session_from_args(config, store, args, today)?;
    let read = search(&mut session)?;
    let token = match session.last_token() {
        Some(token) => token.to_string(),
        None => session.store_app_state()?,
    };
    let mut out = String::new();
    let _ = writeln!(&mut out, "{token}");
    let _ = writeln!(&mut out, "    {}", read.path());
    Ok(out)
}

fn load_state(
    config: &AppConfig,
    store: SqliteTokenStore,
    args: &LoadArgs,
    today: Date,
) -> Result<String> {
    let mut session = BrowserSession::new(config, InMemorySurface::new(), store, today);
    open_gate(&mut session, &args.leading_ledger);
    session.restore_app_state(&args.token);
    if let Some(message) = session.messages().last() {
        match &message.detail {
            Some(detail) => bail!("{}: {} ({detail})", message.key, message.text),
            None => bail!("{}: {}", message.key, message.text),
        }
    }

    let report = LoadReport {
        token: &args.token,
        snapshot: session.snapshot(),
        table_variant: session.table_variant(),
        read: session.bound().map(ReadDescriptor::path),
        stored_as: session.last_token(),
    };
    let mut out = serde_json::to_string_pretty(&report).context("serializing restored state")?;
    out.push('\n');
    Ok(out)
}

fn list_states(store: &SqliteTokenStore, args: &ListArgs) -> Result<String> {
    let records = store.recent(args.limit).context("listing stored app states")?;
    Ok(format_records(&records))
}

fn run_resolve<T: TokenStore>(
    config: &AppConfig,
    store: T,
    raw: &str,
    args: &ResolveArgs,
    today: Date,
) -> Result<String> {
    let inbound = InboundNavigation::from_json(raw).context("parsing navigation payload")?;
    let mut surface = InMemorySurface::new();
    surface.set_standard_variant(!args.custom_variant);
    let mut session = BrowserSession::new(config, surface, store, today);
    session.set_inbound(inbound);
    open_gate(&mut session, &args.leading_ledger);

    let report = ResolveReport {
        resolution: session.resolution(),
        read: session.bound().map(ReadDescriptor::path),
        messages: session.messages().messages(),
    };
    let mut out = serde_json::to_string_pretty(&report).context("serializing resolution")?;
    out.push('\n');
    Ok(out)
}

fn session_from_args<T: TokenStore>(
    config: &AppConfig,
    store: T,
    args: &SnapshotArgs,
    today: Date,
) -> Result<CliSession<T>> {
    let mut surface = InMemorySurface::new();
    surface.set_fiscal_year_variant(args.fiscal_year_variant);
    let mut session = BrowserSession::new(config, surface, store, today);
    open_gate(&mut session, &args.leading_ledger);
    apply_snapshot_args(&mut session, args)?;
    Ok(session)
}

/// The command line has no asynchronous startup; the loaders report in
/// through the barrier and the leading ledger closes the gate.
fn open_gate<T: TokenStore>(session: &mut CliSession<T>, leading_ledger: &str) {
    let sender = session.readiness_sender();
    for flag in [
        Readiness::METADATA,
        Readiness::CONTROLLER,
        Readiness::FILTER_SURFACE,
    ] {
        sender.signal(flag);
    }
    session.poll_readiness();
    session.leading_ledger_fetched(leading_ledger);
}

fn apply_snapshot_args<T: TokenStore>(session: &mut CliSession<T>, args: &SnapshotArgs) -> Result<()> {
    if let Some(status) = args.status {
        session.change_status(status);
    }

    let mut exposed = Vec::new();
    let snapshot = session.snapshot_mut();
    if args.no_key_date {
        snapshot.key_date = None;
    }
    if let Some(date) = args.key_date {
        snapshot.key_date = Some(date);
        exposed.push(keys::KEY_DATE);
    }
    if let Some(range) = args.posting_date {
        snapshot.posting_date = Some(range);
    }
    if let Some(range) = args.clearing_date {
        snapshot.clearing_date = Some(range);
    }
    if let Some(currency) = &args.display_currency {
        let currency = currency.trim().to_uppercase();
        snapshot.display_currency = (!currency.is_empty()).then_some(currency);
        exposed.push(keys::DISPLAY_CURRENCY);
    }
    if let Some(rate_type) = &args.rate_type {
        snapshot.exchange_rate_type = Some(rate_type.clone());
        exposed.push(keys::EXCHANGE_RATE_TYPE);
    }
    if let Some(date) = args.rate_date {
        snapshot.exchange_rate_date = Some(date);
        exposed.push(keys::EXCHANGE_RATE_DATE);
    }
    if let Some(level) = args.expand_level {
        snapshot.expand_level = level;
        snapshot.expand_level_visible = true;
        exposed.push(keys::LEVEL_SELECTION);
    }
    if args.oim_only {
        snapshot.open_item_filter = OpenItemFilter::Exclude;
        exposed.push(keys::OPEN_ITEM_MANAGED);
    }
    for (name, value) in &args.fields {
        if !snapshot.apply_field(name, FieldValue::equal_to(value.clone())) {
            bail!("'{name}' cannot be used as a selection field");
        }
    }

    for name in exposed {
        session.surface_mut().add_to_advanced_area(name);
    }
    session.set_projection(Projection::from_select(&args.select));
    Ok(())
}

fn search<T: TokenStore>(session: &mut CliSession<T>) -> Result<ReadDescriptor> {
    match session.search() {
        SearchOutcome::Bound(read) => Ok(read),
        SearchOutcome::Rejected(key) => bail!("{key}: {}", key.default_text()),
        SearchOutcome::Deferred => bail!("filter bar is still updating"),
    }
}

fn format_read(read: &ReadDescriptor, json: bool) -> Result<String> {
    if json {
        let mut out = serde_json::to_string_pretty(read).context("serializing read")?;
        out.push('\n');
        return Ok(out);
    }
    let mut out = String::new();
    let _ = writeln!(&mut out, "{}", read.path());
    if !read.projection.is_empty() {
        let _ = writeln!(&mut out, "    select  {}", read.projection.to_select());
    }
    for filter in &read.filters {
        let _ = writeln!(
            &mut out,
            "    filter  {} {} '{}'",
            filter.field,
            filter.operator.as_ref().to_lowercase(),
            filter.value
        );
    }
    let order = read
        .sort
        .iter()
        .map(|key| key.field)
        .collect::<Vec<_>>()
        .join(",");
    let _ = writeln!(&mut out, "    order   {order} (descending)");
    if read.expand_level.0 > 0 {
        let _ = writeln!(&mut out, "    level   {}", read.expand_level);
    }
    Ok(out)
}

fn format_records(records: &[TokenRecord]) -> String {
    if records.is_empty() {
        return "No stored app states.\n".to_string();
    }
    let mut out = String::new();
    for record in records {
        let _ = writeln!(
            &mut out,
            "{}  {}",
            record.token,
            format_timestamp(record.created_at)
        );
    }
    out
}

fn format_timestamp(epoch: i64) -> String {
    OffsetDateTime::from_unix_timestamp(epoch)
        .map(|dt| dt.format(&Rfc3339).unwrap_or_else(|_| epoch.to_string()))
        .unwrap_or_else(|_| epoch.to_string())
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

fn parse_status(raw: &str) -> Result<ItemStatus, String> {
    raw.parse()
        .map_err(|_| format!("unknown item status '{raw}' (open, cleared, all)"))
}

fn parse_date(raw: &str) -> Result<Date, String> {
    parse_iso_date(raw).ok_or_else(|| format!("'{raw}' is not a YYYY-MM-DD date"))
}

fn parse_range(raw: &str) -> Result<DateRange, String> {
    parse_date_range(raw).ok_or_else(|| format!("'{raw}' is not a date range"))
}

fn parse_level(raw: &str) -> Result<ExpandLevel, String> {
    raw.parse().map_err(|_| format!("'{raw}' is not a level like L2"))
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("'{raw}' must look like NAME=VALUE")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreOptions;
    use crate::snapshot::keys;
    use serde_json::json;
    use tempfile::TempDir;
    use time::macros::date;

    type TestResult<T = ()> = Result<T>;

    const TODAY: Date = date!(2026 - 10 - 18);

    fn args() -> SnapshotArgs {
        SnapshotArgs {
            leading_ledger: "0L".into(),
            ..SnapshotArgs::default()
        }
    }

    fn setup_store() -> TestResult<(TempDir, AppConfig, SqliteTokenStore)> {
        let temp = TempDir::new().context("creating temp dir")?;
        let mut config = AppConfig::default();
        config.store = StoreOptions {
            database_path: temp.path().join("data/tokens.db"),
            ..StoreOptions::default()
        };
        let store = SqliteTokenStore::open(&config.store)?;
        Ok((temp, config, store))
    }

    #[test]
    fn cli_compile_prints_open_items_read() -> TestResult {
        let mut args = args();
        args.key_date = Some(date!(2024 - 01 - 01));
        args.oim_only = true;
        args.select = "GLAccount,AmountInCompanyCodeCurrency".into();
        let output = run_compile(&AppConfig::default(), &args, TODAY)?;

        let path = output.lines().next().unwrap_or_default();
        assert!(path.starts_with("/C_JournalEntryItemBrowser(P_DisplayCurrency='EUR'"));
        assert!(path.contains("P_KeyDate=datetime'2024-01-01T00%3A00%3A00'"));
        assert!(path.ends_with("P_ClearingStatusSelection='2')/Results"));
        assert!(output.contains("filter  IsOpenItemManaged eq 'X'"));
        Ok(())
    }

    #[test]
    fn cli_fiscal_year_variant_leaves_clearing_start_open() -> TestResult {
        let mut args = args();
        args.status = Some(ItemStatus::Cleared);
        let calendar = session_from_args(&AppConfig::default(), MemoryTokenStore::new("AS"), &args, TODAY)?;
        assert_eq!(calendar.snapshot().clearing_date, Some(DateRange::year_to_date(TODAY)));

        args.fiscal_year_variant = true;
        let fiscal = session_from_args(&AppConfig::default(), MemoryTokenStore::new("AS"), &args, TODAY)?;
        assert_eq!(fiscal.snapshot().clearing_date, Some(DateRange::until(TODAY)));
        assert!(fiscal.is_ready());
        Ok(())
    }

    #[test]
    fn cli_compile_reports_missing_display_currency() {
        let mut args = args();
        args.select = "GLAccount,AmountInDisplayCurrency".into();
        let err = run_compile(&AppConfig::default(), &args, TODAY).unwrap_err();
        assert!(err.to_string().starts_with("ERD1_PARAMS_DC"));
    }

    #[test]
    fn cli_compile_rejects_open_items_without_key_date() {
        let mut args = args();
        args.no_key_date = true;
        let err = run_compile(&AppConfig::default(), &args, TODAY).unwrap_err();
        assert!(err.to_string().starts_with("ERD1_KEYDATE"));
    }

    #[test]
    fn cli_state_save_then_load_restores_cleared_items() -> TestResult {
        let (_temp, config, store) = setup_store()?;
        let mut save = args();
        save.status = Some(ItemStatus::Cleared);
        save.clearing_date = parse_date_range("2025-01-01..2025-06-30");
        save.key_date = Some(date!(2025 - 03 - 31));
        save.fields = vec![("CompanyCode".into(), "1010".into())];
        let saved = save_state(&config, store.clone(), &save, TODAY)?;
        let token = saved.lines().next().unwrap_or_default().to_string();
        assert!(token.starts_with("AS"));

        let loaded = load_state(
            &config,
            store.clone(),
            &LoadArgs {
                token: token.clone(),
                leading_ledger: "0L".into(),
            },
            TODAY,
        )?;
        let report: Value = serde_json::from_str(&loaded)?;
        assert_eq!(report["snapshot"]["status"], json!("Cleared"));
        assert_eq!(report["snapshot"]["fields"]["CompanyCode"][0]["Low"], json!("1010"));
        assert!(report["read"]
            .as_str()
            .unwrap_or_default()
            .ends_with("P_ClearingStatusSelection='4')/Results"));

        let listed = list_states(&store, &ListArgs { limit: 10 })?;
        assert!(listed.contains(&token));
        Ok(())
    }

    #[test]
    fn cli_state_load_fails_for_unknown_token() -> TestResult {
        let (_temp, config, store) = setup_store()?;
        let err = load_state(
            &config,
            store,
            &LoadArgs {
                token: "AS-NOPE".into(),
                leading_ledger: "0L".into(),
            },
            TODAY,
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("INBOUND_NAV_ERROR"));
        Ok(())
    }

    #[test]
    fn cli_resolve_url_parameters() -> TestResult {
        let payload = json!({
            "navType": "URLParams",
            "urlParams": { "GLAccount": ["400000"], "CompanyCode": ["1010"] }
        });
        let args = ResolveArgs {
            payload: None,
            leading_ledger: "0L".into(),
            custom_variant: false,
        };
        let output = run_resolve(
            &AppConfig::default(),
            MemoryTokenStore::new("AS"),
            &payload.to_string(),
            &args,
            TODAY,
        )?;
        let report: Value = serde_json::from_str(&output)?;
        let fields = &report["resolution"]["snapshot"]["fields"];
        assert_eq!(fields["GLAccount"][0]["Low"], json!("400000"));
        assert_eq!(fields[keys::LEDGER], json!("0L"));
        assert_eq!(report["resolution"]["snapshot"]["status"], json!("All"));
        assert!(report["read"].as_str().is_some());
        Ok(())
    }

    #[test]
    fn cli_smartlink_suppresses_uncleared_items() -> TestResult {
        let args = SmartLinkArgs {
            link_field: "/ClearingDocFiscalYear".into(),
            row: Some(json!({ "ClearingDocFiscalYear": "0000" }).to_string()),
            semantic_object: None,
            selection: args(),
        };
        let output = run_smartlink(&AppConfig::default(), &args, TODAY)?;
        assert!(output.contains("\"outcome\": \"suppressed\""));
        assert!(output.contains("SLIB_CONT"));
        Ok(())
    }

    #[test]
    fn field_arguments_need_a_name() {
        assert_eq!(
            parse_field("GLAccount=400000"),
            Ok(("GLAccount".to_string(), "400000".to_string()))
        );
        assert!(parse_field("=1").is_err());
        assert!(parse_field("GLAccount").is_err());
    }
}
