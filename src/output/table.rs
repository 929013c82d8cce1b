use comfy_table::{Table, presets::NOTHING};

use super::Listing;

pub struct TableFormatter;

impl TableFormatter {
    pub fn format(listing: &Listing, no_headers: bool) -> String {
        if listing.rows.is_empty() {
            return "(0 pods)".to_string();
        }

        let mut table = Table::new();
        // Borderless, kubectl get style
        table.load_preset(NOTHING);

        if !no_headers {
            table.set_header(listing.columns.iter().map(|c| c.to_uppercase()));
        }

        for row in &listing.rows {
            table.add_row(row);
        }

        let output = table.to_string();
        let noun = if listing.rows.len() == 1 { "pod" } else { "pods" };
        format!("{}\n({} {})", output, listing.rows.len(), noun)
    }
}
