use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Render rows as a table
pub fn format_table<T: Tabled>(rows: &[T]) -> String {
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}

/// A titled table followed by a row count
pub fn format_table_with_count<T: Tabled>(title: &str, rows: &[T], item_name: &str) -> String {
    format!(
        "{}\n{}\nTotal: {} {}",
        title,
        format_table(rows),
        rows.len(),
        item_name
    )
}
