//! Table formatting using comfy-table.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use warden_abac::{Policy, PolicyBody};

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header_cells(columns: &[&str]) -> Vec<Cell> {
    columns
        .iter()
        .map(|col| {
            if super::no_color() {
                Cell::new(col)
            } else {
                Cell::new(col)
                    .add_attribute(Attribute::Bold)
                    .fg(Color::Cyan)
            }
        })
        .collect()
}

/// One row per policy: id, name, kind, effects and whether it is enabled.
pub fn policy_table(policies: &[Policy]) -> Table {
    let mut table = base_table();
    table.set_header(header_cells(&["ID", "Name", "Kind", "Effect", "Enabled"]));

    for policy in policies {
        let (kind, effect) = match &policy.body {
            PolicyBody::Rules(rules) => (
                format!("rules ({})", rules.rules.len()),
                rules.effect.to_string(),
            ),
            PolicyBody::Statements(statements) => {
                let mut effects: Vec<String> = statements
                    .statements
                    .iter()
                    .map(|statement| statement.effect.to_string())
                    .collect();
                effects.dedup();
                (
                    format!("statements ({})", statements.statements.len()),
                    effects.join(", "),
                )
            }
        };
        table.add_row(vec![
            policy.id.clone(),
            policy.name.clone(),
            kind,
            effect,
            policy.enabled.to_string(),
        ]);
    }

    table
}

/// Creates a key-value info table (two columns: key and value).
pub fn info_table(entries: &[(&str, String)]) -> Table {
    let mut table = base_table();

    for (key, value) in entries {
        let key_cell = if super::no_color() {
            Cell::new(key)
        } else {
            Cell::new(key).fg(Color::DarkGrey)
        };
        table.add_row(vec![key_cell, Cell::new(value)]);
    }

    table
}
