use anyhow::{Context, Result};
use serde::Serialize;
use tabled::Tabled;

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text and tables (default).
    #[default]
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Parse from CLI string argument. Unknown values fall back to table.
    pub fn from_str_arg(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "yaml" | "yml" => Self::Yaml,
            _ => Self::Table,
        }
    }

    pub fn is_machine(&self) -> bool {
        !matches!(self, Self::Table)
    }
}

/// Serialize for a machine-readable format. `None` for table output.
pub fn to_machine<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<Option<String>> {
    match format {
        OutputFormat::Table => Ok(None),
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map(Some)
            .with_context(|| "Failed to render JSON"),
        OutputFormat::Yaml => serde_yaml::to_string(value)
            .map(Some)
            .with_context(|| "Failed to render YAML"),
    }
}

/// Render a list of rows as a rounded table, JSON or YAML.
pub fn render_list<T: Serialize + Tabled>(items: &[T], format: OutputFormat) -> Result<String> {
    if let Some(text) = to_machine(items, format)? {
        return Ok(text);
    }
    if items.is_empty() {
        return Ok("(none)".to_string());
    }
    Ok(tabled::Table::new(items)
        .with(tabled::settings::Style::rounded())
        .to_string())
}
