use std::io::{IsTerminal, Write};
use std::rc::Rc;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::client::{ExpensifyClient, NewTransaction};
use crate::controller::TransactionsController;
use crate::format::format_amount_cents;
use crate::normalize::{DEFAULT_CURRENCY, Transaction};
use crate::render::{ChunkPolicy, DEFAULT_TARGET_FRAMES, Renderer, StatusSurface, ThreadYield};
use crate::summary::Summary;
use crate::types::{EntryKind, SortSpec};

use super::render::{KeyValueRow, TableRows, print_table, render_output};
use super::{Cli, OutputFormat, TransactionsAddArgs, TransactionsCmd, TransactionsListArgs};

type Controller = TransactionsController<TableRows, StderrStatus>;

/// Progress line on stderr, rewritten in place. Silent unless stderr is a terminal.
pub(super) struct StderrStatus {
    enabled: bool,
}

impl StderrStatus {
    fn new() -> Self {
        Self {
            enabled: std::io::stderr().is_terminal(),
        }
    }
}

impl StatusSurface for StderrStatus {
    fn set_text(&mut self, text: &str) {
        if !self.enabled {
            return;
        }
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r\x1b[K{text}");
        let _ = err.flush();
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListJsonOutput<'a> {
    summary: Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort: Option<&'a SortSpec>,
    query: &'a str,
    transactions: Vec<&'a Transaction>,
}

pub(super) fn run_transactions(
    cli: &Cli,
    client: &ExpensifyClient,
    cmd: TransactionsCmd,
) -> anyhow::Result<()> {
    match cmd {
        TransactionsCmd::List(args) => list(cli, client, args),
        TransactionsCmd::Add(args) => add(cli, client, args),
    }
}

fn controller(target_frames: usize) -> Controller {
    let mut renderer = Renderer::new(ChunkPolicy::default().with_target_frames(target_frames));
    renderer.set_targets(TableRows::default(), Some(StderrStatus::new()));
    TransactionsController::new(renderer)
}

fn list(cli: &Cli, client: &ExpensifyClient, args: TransactionsListArgs) -> anyhow::Result<()> {
    let records = client
        .get_transactions()
        .map_err(|e| anyhow::anyhow!(e.user_message("Failed to fetch transactions.")))?;

    let mut c = controller(args.target_frames);
    c.load(records)?;
    if let Some(q) = &args.search {
        c.on_search_changed(q)?;
    }
    for key in &args.sort {
        let sort_type = args.sort_type.unwrap_or_else(|| key.default_type());
        c.on_sort_requested(*key, sort_type)?;
    }
    c.run_render(&mut ThreadYield)?;

    if let Some(index) = args.show {
        let tx = c.on_row_activated(index).with_context(|| {
            format!("no row at index {index} (view has {} rows)", c.view().len())
        })?;
        return show_detail(cli, &tx);
    }
    print_view(cli, &c)
}

fn print_view(cli: &Cli, c: &Controller) -> anyhow::Result<()> {
    let summary = c.summary();
    match cli.output {
        OutputFormat::Json => {
            let out = ListJsonOutput {
                summary,
                sort: c.sort_spec(),
                query: c.query(),
                transactions: c.view().iter().map(Rc::as_ref).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            let rows = c
                .renderer()
                .rows()
                .map(|t| t.rows.iter().map(|p| p.row.as_ref().clone()).collect::<Vec<_>>())
                .unwrap_or_default();
            if rows.is_empty() {
                println!("No transactions found.");
            } else {
                print_table(cli, &rows);
            }
            println!("{}", summary.chips().join(" • "));
        }
    }
    Ok(())
}

fn show_detail(cli: &Cli, tx: &Transaction) -> anyhow::Result<()> {
    if cli.output == OutputFormat::Json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "transaction": tx,
                "raw": tx.raw(),
            }))?
        );
        return Ok(());
    }
    let rows = vec![
        KeyValueRow::new("id", tx.id().to_string()),
        KeyValueRow::new("date", tx.date_formatted()),
        KeyValueRow::new("merchant", tx.merchant()),
        KeyValueRow::new("amount", tx.amount_formatted()),
        KeyValueRow::new("currency", tx.currency()),
        KeyValueRow::new("comment", tx.comment()),
        KeyValueRow::new("raw", serde_json::to_string(tx.raw())?),
    ];
    render_output(cli, &rows)
}

fn add(cli: &Cli, client: &ExpensifyClient, args: TransactionsAddArgs) -> anyhow::Result<()> {
    let txn = build_new_transaction(
        &args.date,
        &args.merchant,
        &args.amount,
        args.note.as_deref().unwrap_or(""),
        args.kind,
        Local::now().date_naive(),
    )?;
    let display_amount = format_amount_cents(txn.amount, &txn.currency);

    if cli.dry_run {
        println!(
            "dry-run: would create {} {display_amount} at {} on {}",
            args.kind, txn.merchant, txn.created
        );
        return Ok(());
    }
    super::confirm_write(
        cli,
        &format!(
            "About to create a {} of {display_amount} at {} on {}.",
            args.kind, txn.merchant, txn.created
        ),
    )?;

    let record = client
        .create_transaction(&txn)
        .map_err(|e| anyhow::anyhow!(e.user_message("Failed to create transaction.")))?;

    let mut c = controller(DEFAULT_TARGET_FRAMES);
    let created = c.insert_created(record)?;
    c.run_render(&mut ThreadYield)?;
    tracing::info!(id = %created.id(), amount = txn.amount, "transaction created");

    print_view(cli, &c)?;
    if cli.output == OutputFormat::Table {
        println!("Transaction created.");
    }
    Ok(())
}

/// Validates a manually entered transaction. `amount` is in dollars and must be
/// non-negative; `kind` decides the sign.
pub(super) fn build_new_transaction(
    date: &str,
    merchant: &str,
    amount: &str,
    note: &str,
    kind: EntryKind,
    today: NaiveDate,
) -> anyhow::Result<NewTransaction> {
    let merchant = merchant.trim();
    let amount = amount.trim().parse::<f64>().ok().filter(|a| a.is_finite() && *a >= 0.0);
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok();
    let (Some(date), Some(amount)) = (date, amount) else {
        anyhow::bail!("Please provide date, merchant, and a valid amount.");
    };
    if merchant.is_empty() {
        anyhow::bail!("Please provide date, merchant, and a valid amount.");
    }
    if date > today {
        anyhow::bail!("Future dates are not allowed.");
    }

    let cents = (amount * 100.0).round() as i64;
    Ok(NewTransaction {
        created: date.format("%Y-%m-%d").to_string(),
        merchant: merchant.to_string(),
        amount: kind.signed_cents(cents),
        currency: DEFAULT_CURRENCY.to_string(),
        comment: note.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn debit_is_negative_credit_is_positive() {
        let debit =
            build_new_transaction("2024-03-01", " Cafe ", "4.5", "", EntryKind::Debit, today())
                .unwrap();
        assert_eq!(debit.amount, -450);
        assert_eq!(debit.merchant, "Cafe");
        assert_eq!(debit.currency, "USD");
        assert_eq!(debit.created, "2024-03-01");

        let credit =
            build_new_transaction("2024-03-15", "Refund", "19.999", "n", EntryKind::Credit, today())
                .unwrap();
        assert_eq!(credit.amount, 2000);
        assert_eq!(credit.comment, "n");
    }

    #[test]
    fn rejects_missing_or_invalid_fields() {
        for (date, merchant, amount) in [
            ("", "Cafe", "1"),
            ("2024-03-01", "  ", "1"),
            ("2024-03-01", "Cafe", "-1"),
            ("2024-03-01", "Cafe", "abc"),
            ("03/01/2024", "Cafe", "1"),
        ] {
            let err = build_new_transaction(date, merchant, amount, "", EntryKind::Debit, today())
                .unwrap_err();
            assert_eq!(
                err.to_string(),
                "Please provide date, merchant, and a valid amount."
            );
        }
    }

    #[test]
    fn rejects_future_dates() {
        let err =
            build_new_transaction("2024-03-16", "Cafe", "1", "", EntryKind::Debit, today())
                .unwrap_err();
        assert_eq!(err.to_string(), "Future dates are not allowed.");
    }

    #[test]
    fn zero_amount_is_allowed() {
        let t = build_new_transaction("2024-03-15", "Cafe", "0", "", EntryKind::Debit, today())
            .unwrap();
        assert_eq!(t.amount, 0);
    }
}
