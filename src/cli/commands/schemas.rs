//! List available extraction schemas.

use console::style;

use kycscan::extract::{SchemaCatalog, DOCUMENT_TYPE};

/// Print every schema with its fields.
pub async fn cmd_schemas(catalog: &SchemaCatalog) -> anyhow::Result<()> {
    for schema in catalog.iter() {
        let note = if schema.name == DOCUMENT_TYPE {
            " (used by --schema auto)"
        } else {
            ""
        };
        println!("{}{}", style(&schema.name).bold(), style(note).dim());

        let width = schema.field_names().map(str::len).max().unwrap_or(0);
        for field in &schema.fields {
            println!("  {:<width$}  {}", field.name, field.description);
        }
        println!();
    }
    Ok(())
}
