//! Terminal rendering of query results

use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use simpledb_core::{QueryResult, Row};

/// Render a result as a table, followed by a row count
///
/// The header comes from the result's columns, so an empty result still
/// shows what it would have returned.
pub fn render_table(result: &QueryResult) -> String {
    let count = result.rows.len();
    let noun = if count == 1 { "row" } else { "rows" };
    if result.columns.is_empty() {
        return format!("({} {})", count, noun);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(result.columns.iter().map(|column| column.name.clone()));

    for row in &result.rows {
        table.add_row(row.values.iter().map(|value| value.to_string()));
    }

    format!("{}\n({} {})", table, count, noun)
}

/// Render rows as a JSON array of objects keyed by column name
pub fn render_json(rows: &[Row]) -> anyhow::Result<String> {
    let objects: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| serde_json::Value::Object(row.to_json_object()))
        .collect();
    Ok(serde_json::to_string_pretty(&objects)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simpledb_core::{ColumnMeta, Value};

    fn rows() -> Vec<Row> {
        let columns = vec!["id".to_string(), "title".to_string()];
        vec![
            Row::new(columns.clone(), vec![Value::Int64(1), Value::String("title 1".into())]),
            Row::new(columns, vec![Value::Int64(2), Value::Null]),
        ]
    }

    #[test]
    fn test_table_lists_columns_and_values() {
        let rendered = render_table(&QueryResult::from_rows(rows()));
        assert!(rendered.contains("title"));
        assert!(rendered.contains("title 1"));
        assert!(rendered.contains("NULL"));
        assert!(rendered.ends_with("(2 rows)"));
    }

    #[test]
    fn test_empty_result_keeps_header() {
        let result = QueryResult {
            columns: ["id", "title"]
                .iter()
                .enumerate()
                .map(|(ordinal, name)| ColumnMeta {
                    name: name.to_string(),
                    ordinal,
                    ..Default::default()
                })
                .collect(),
            ..QueryResult::empty()
        };

        let rendered = render_table(&result);
        assert!(rendered.contains("id"));
        assert!(rendered.contains("title"));
        assert!(rendered.ends_with("(0 rows)"));
    }

    #[test]
    fn test_result_without_columns() {
        assert_eq!(render_table(&QueryResult::empty()), "(0 rows)");
    }

    #[test]
    fn test_json_output() {
        let rendered = render_json(&rows()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed[0]["title"], "title 1");
        assert!(parsed[1]["title"].is_null());
    }
}
