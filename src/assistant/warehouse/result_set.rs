//! Tabular query results and their text rendering for the model.

use serde::{Deserialize, Serialize};

/// Longest cell value shown to the model, in characters.
const MAX_CELL_CHARS: usize = 120;

/// Result of one warehouse query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Column names, in select order.
    pub columns: Vec<String>,
    /// Row values rendered as text; `None` is SQL NULL.
    pub rows: Vec<Vec<Option<String>>>,
    /// Rows matched by the query before the row cap.
    pub total_rows: u64,
}

impl ResultSet {
    /// Whether the query matched no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether rows were dropped by the row cap.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.total_rows > self.rows.len() as u64
    }

    /// Compact pipe-separated rendering used as a tool observation.
    #[must_use]
    pub fn render(&self) -> String {
        if self.rows.is_empty() {
            return "Aucune ligne retournée.".to_string();
        }

        let mut out = String::new();
        out.push_str(&self.columns.join(" | "));
        out.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| match cell {
                    Some(value) => clip(value),
                    None => "NULL".to_string(),
                })
                .collect();
            out.push_str(&cells.join(" | "));
            out.push('\n');
        }
        if self.is_truncated() {
            out.push_str(&format!(
                "({} lignes affichées sur {})\n",
                self.rows.len(),
                self.total_rows
            ));
        }
        out
    }
}

fn clip(value: &str) -> String {
    if value.chars().count() <= MAX_CELL_CHARS {
        value.to_string()
    } else {
        let mut clipped: String = value.chars().take(MAX_CELL_CHARS).collect();
        clipped.push('…');
        clipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_renders_explicit_notice() {
        let rs = ResultSet {
            columns: vec!["nbr_hospi".to_string()],
            rows: Vec::new(),
            total_rows: 0,
        };
        assert!(rs.is_empty());
        assert_eq!(rs.render(), "Aucune ligne retournée.");
    }

    #[test]
    fn render_marks_nulls_and_truncation() {
        let rs = ResultSet {
            columns: vec!["nom_region".to_string(), "nbr_hospi".to_string()],
            rows: vec![
                vec![Some("Bretagne".to_string()), Some("1200".to_string())],
                vec![Some("Corse".to_string()), None],
            ],
            total_rows: 18,
        };
        assert_eq!(
            rs.render(),
            "nom_region | nbr_hospi\nBretagne | 1200\nCorse | NULL\n(2 lignes affichées sur 18)\n"
        );
    }
}
