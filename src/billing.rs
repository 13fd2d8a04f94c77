use std::collections::HashSet;

use chrono::NaiveDate;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Invoice, InvoiceItem, NewInvoice, NewInvoiceItem, TimeEntry};
use crate::schema::{invoice_items, invoices, time_entries};

pub const STATUS_DRAFT: &str = "draft";
pub const STATUS_SENT: &str = "sent";
pub const STATUS_PAID: &str = "paid";

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("There are no unbilled billable time entries for this case.")]
    NothingToBill,
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftLine {
    pub time_entry_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

pub fn is_valid_status(status: &str) -> bool {
    matches!(status, STATUS_DRAFT | STATUS_SENT | STATUS_PAID)
}

/// One line per billable entry that is not already on an invoice.
pub fn draft_lines(entries: &[TimeEntry], billed: &HashSet<Uuid>) -> Vec<DraftLine> {
    entries
        .iter()
        .filter(|entry| entry.is_billable && !billed.contains(&entry.id))
        .map(|entry| DraftLine {
            time_entry_id: entry.id,
            description: format!(
                "{} ({})",
                entry.description,
                entry.entry_date.format("%Y-%m-%d")
            ),
            quantity: entry.hours,
            rate: entry.hourly_rate,
            amount: (entry.hours * entry.hourly_rate).round_dp(2),
        })
        .collect()
}

pub fn total(lines: &[DraftLine]) -> Decimal {
    lines
        .iter()
        .fold(Decimal::ZERO, |acc, line| acc + line.amount)
        .round_dp(2)
}

/// Creates a draft invoice from every unbilled billable time entry of the case.
pub fn create_invoice(
    conn: &mut PgConnection,
    case_id: Uuid,
    created_by: Uuid,
    issued_date: NaiveDate,
    due_date: Option<NaiveDate>,
) -> Result<(Invoice, Vec<InvoiceItem>), BillingError> {
    conn.transaction(|conn| {
        let entries: Vec<TimeEntry> = time_entries::table
            .filter(time_entries::case_id.eq(case_id))
            .order(time_entries::entry_date.asc())
            .for_update()
            .load(conn)?;
        let entry_ids: Vec<Option<Uuid>> = entries.iter().map(|entry| Some(entry.id)).collect();
        let billed: HashSet<Uuid> = invoice_items::table
            .filter(invoice_items::time_entry_id.eq_any(entry_ids))
            .select(invoice_items::time_entry_id)
            .load::<Option<Uuid>>(conn)?
            .into_iter()
            .flatten()
            .collect();

        let lines = draft_lines(&entries, &billed);
        if lines.is_empty() {
            return Err(BillingError::NothingToBill);
        }

        let new_invoice = NewInvoice {
            id: Uuid::new_v4(),
            case_id,
            issued_date,
            due_date,
            status: STATUS_DRAFT.to_string(),
            total: total(&lines),
            created_by: Some(created_by),
        };
        diesel::insert_into(invoices::table)
            .values(&new_invoice)
            .execute(conn)?;

        let items: Vec<NewInvoiceItem> = lines
            .into_iter()
            .map(|line| NewInvoiceItem {
                id: Uuid::new_v4(),
                invoice_id: new_invoice.id,
                time_entry_id: Some(line.time_entry_id),
                description: line.description,
                quantity: line.quantity,
                rate: line.rate,
                amount: line.amount,
            })
            .collect();
        diesel::insert_into(invoice_items::table)
            .values(&items)
            .execute(conn)?;

        let invoice: Invoice = invoices::table.find(new_invoice.id).first(conn)?;
        let items: Vec<InvoiceItem> = invoice_items::table
            .filter(invoice_items::invoice_id.eq(invoice.id))
            .load(conn)?;
        Ok((invoice, items))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::str::FromStr;

    fn entry(hours: &str, rate: &str, billable: bool) -> TimeEntry {
        TimeEntry {
            id: Uuid::new_v4(),
            case_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            entry_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            hours: Decimal::from_str(hours).unwrap(),
            hourly_rate: Decimal::from_str(rate).unwrap(),
            description: "Drafting motion".into(),
            is_billable: billable,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn amounts_are_rounded_to_cents() {
        let entries = vec![entry("1.25", "333.33", true)];
        let lines = draft_lines(&entries, &HashSet::new());
        assert_eq!(lines[0].amount, Decimal::from_str("416.66").unwrap());
        assert_eq!(lines[0].description, "Drafting motion (2024-05-02)");
    }

    #[test]
    fn skips_non_billable_and_already_billed_entries() {
        let billed_entry = entry("2", "100", true);
        let entries = vec![
            entry("1", "100", false),
            billed_entry.clone(),
            entry("0.5", "200", true),
        ];
        let billed: HashSet<Uuid> = [billed_entry.id].into_iter().collect();
        let lines = draft_lines(&entries, &billed);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].time_entry_id, entries[2].id);
        assert_eq!(total(&lines), Decimal::from_str("100.00").unwrap());
    }

    #[test]
    fn total_sums_all_lines() {
        let entries = vec![entry("1.5", "200", true), entry("0.1", "95.5", true)];
        let lines = draft_lines(&entries, &HashSet::new());
        assert_eq!(total(&lines), Decimal::from_str("309.55").unwrap());
    }

    #[test]
    fn known_statuses() {
        assert!(is_valid_status("draft"));
        assert!(is_valid_status("paid"));
        assert!(!is_valid_status("void"));
    }
}
