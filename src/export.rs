//! CSV rendering for admin exports.
//!
//! Rows are rendered header-first with `,` separators and `\n` line endings.
//! A field is quoted when it contains a comma, a double quote or a line
//! break; embedded quotes are doubled. An empty row set renders as an empty
//! string, not a header line.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::entities::{ingredient, order, product, subscriber};

/// A value that can be rendered as one CSV row.
pub trait CsvRecord {
    /// Column names in output order.
    fn headers() -> &'static [&'static str];

    /// Field values in the same order as [`CsvRecord::headers`].
    fn fields(&self) -> Vec<String>;
}

pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_line<I, S>(out: &mut String, fields: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut first = true;
    for field in fields {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&escape_field(field.as_ref()));
    }
    out.push('\n');
}

pub fn rows_to_csv<R: CsvRecord>(rows: &[R]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    write_line(&mut out, R::headers().iter().copied());
    for row in rows {
        write_line(&mut out, row.fields());
    }
    out
}

/// `orders-2026-01-09.csv`
pub fn export_filename(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}.csv", prefix, at.format("%Y-%m-%d"))
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

/// Minor units rendered as a decimal amount, e.g. `1999` -> `19.99`.
fn money(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

impl CsvRecord for order::Model {
    fn headers() -> &'static [&'static str] {
        &[
            "id",
            "created_at",
            "customer_email",
            "customer_name",
            "status",
            "payment_status",
            "total",
            "refunded",
            "currency",
            "session_id",
        ]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            timestamp(&self.created_at),
            opt(&self.customer_email),
            opt(&self.customer_name),
            self.status.to_string(),
            self.payment_status.to_string(),
            money(self.total_amount),
            money(self.refunded_amount),
            self.currency.to_uppercase(),
            opt(&self.stripe_session_id),
        ]
    }
}

impl CsvRecord for product::Model {
    fn headers() -> &'static [&'static str] {
        &[
            "id",
            "name",
            "slug",
            "description",
            "price",
            "price_id",
            "active",
            "created_at",
        ]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            self.slug.clone(),
            opt(&self.description),
            money(self.price_cents),
            opt(&self.stripe_price_id),
            self.is_active.to_string(),
            timestamp(&self.created_at),
        ]
    }
}

impl CsvRecord for ingredient::Model {
    fn headers() -> &'static [&'static str] {
        &["id", "name", "description", "benefits", "created_at"]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            opt(&self.description),
            opt(&self.benefits),
            timestamp(&self.created_at),
        ]
    }
}

impl CsvRecord for subscriber::Model {
    fn headers() -> &'static [&'static str] {
        &["id", "email", "source", "subscribed", "created_at"]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.email.clone(),
            opt(&self.source),
            self.subscribed.to_string(),
            timestamp(&self.created_at),
        ]
    }
}
