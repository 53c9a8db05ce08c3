//! Full-text index over demand titles/descriptions with a substring fallback.
//!
//! `demands_fts` is derived data: it is wiped and repopulated from `demands`
//! whenever the table is replaced, and never consulted as a source of truth.

use std::collections::BTreeSet;

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::StoreResult;

/// Why a search did not come from the full-text index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// The index is missing or the MATCH query raised an error.
    Unavailable(String),
    /// The index answered but found nothing (it cannot match mid-word substrings).
    NoHits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum SearchPath {
    /// Blank query; no lookup was made.
    Skipped,
    /// The index answered; `substring_only` counts ids only the substring
    /// scan found (mid-word matches the index cannot see).
    FullText { substring_only: usize },
    Fallback { reason: FallbackReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHits {
    pub ids: BTreeSet<String>,
    pub path: SearchPath,
}

impl SearchHits {
    fn skipped() -> Self {
        Self {
            ids: BTreeSet::new(),
            path: SearchPath::Skipped,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }
}

/// Wipe the index and repopulate it from `demands`. Returns indexed rows.
pub fn rebuild_index(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM demands_fts", [])?;
    conn.execute(
        "INSERT INTO demands_fts(id,title,description) SELECT id,title,COALESCE(description,'') FROM demands",
        [],
    )
}

/// Turn free text into an FTS5 expression: every whitespace-separated token
/// becomes a quoted prefix term, so punctuation in user input cannot be read
/// as query syntax. Tokens are implicitly AND-ed.
pub fn fts_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|tok| format!("\"{}\"*", tok.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn like_pattern(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 2);
    out.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

fn full_text_ids(conn: &Connection, expr: &str) -> rusqlite::Result<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT id FROM demands_fts WHERE demands_fts MATCH ?")?;
    let rows = stmt.query_map(params![expr], |row| row.get::<_, String>(0))?;
    rows.collect()
}

/// Case-insensitive substring match over title, description and client.
pub fn substring_ids(conn: &Connection, query: &str) -> rusqlite::Result<BTreeSet<String>> {
    let pattern = like_pattern(query.trim());
    let mut stmt = conn.prepare(
        "SELECT id FROM demands
         WHERE LOWER(title) LIKE LOWER(?1) ESCAPE '\\'
            OR LOWER(COALESCE(description,'')) LIKE LOWER(?1) ESCAPE '\\'
            OR LOWER(client) LIKE LOWER(?1) ESCAPE '\\'",
    )?;
    let rows = stmt.query_map(params![pattern], |row| row.get::<_, String>(0))?;
    rows.collect()
}

/// Search demand ids. Blank queries return an empty set; callers decide
/// whether "no query" means "no filter".
///
/// Index hits are always merged with the substring scan, so any substring of
/// a title, description or client finds its demand. Index problems never
/// surface as errors: they are logged and answered by the scan alone. Only a
/// failing scan is reported.
pub fn search(conn: &Connection, query: &str) -> StoreResult<SearchHits> {
    let q = query.trim();
    let Some(expr) = fts_expression(q) else {
        return Ok(SearchHits::skipped());
    };
    let indexed = full_text_ids(conn, &expr);
    let scanned = substring_ids(conn, q)?;
    match indexed {
        Ok(mut ids) if !ids.is_empty() => {
            let before = ids.len();
            ids.extend(scanned);
            let substring_only = ids.len() - before;
            tracing::debug!(query = q, hits = ids.len(), substring_only, "full-text search");
            Ok(SearchHits {
                ids,
                path: SearchPath::FullText { substring_only },
            })
        }
        outcome => {
            let reason = match outcome {
                Ok(_) => FallbackReason::NoHits,
                Err(err) => {
                    tracing::debug!(%err, "full-text search unavailable, using substring scan");
                    FallbackReason::Unavailable(err.to_string())
                }
            };
            tracing::debug!(query = q, hits = scanned.len(), ?reason, "substring search");
            Ok(SearchHits {
                ids: scanned,
                path: SearchPath::Fallback { reason },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ensure_schema;

    fn conn_with_rows() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_schema(&mut conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO demands(id,title,description,client,priority,created_at,status,week_key,carried_over,sort_order)
            VALUES
              ('d1','Fix login','Users cannot sign in','Acme','high','2024-01-02T00:00:00.000Z','open','w',0,1),
              ('d2','Quarterly report','sync error','Globex','low','2024-01-02T00:00:00.000Z','open','w',0,2),
              ('d3','Refund 100% of fees','awaiting finance','Initech','medium','2024-01-02T00:00:00.000Z','done','w',0,3);
            "#,
        )
        .unwrap();
        rebuild_index(&conn).unwrap();
        conn
    }

    #[test]
    fn blank_query_is_skipped() {
        let conn = conn_with_rows();
        for q in ["", "   ", "\t\n"] {
            let hits = search(&conn, q).unwrap();
            assert!(hits.is_empty());
            assert_eq!(hits.path, SearchPath::Skipped);
        }
    }

    #[test]
    fn token_match_uses_the_index() {
        let conn = conn_with_rows();
        let hits = search(&conn, "login").unwrap();
        assert_eq!(hits.path, SearchPath::FullText { substring_only: 0 });
        assert_eq!(hits.ids, BTreeSet::from(["d1".to_string()]));

        // Prefix terms match the start of words.
        let hits = search(&conn, "Quart").unwrap();
        assert_eq!(hits.path, SearchPath::FullText { substring_only: 0 });
        assert!(hits.contains("d2"));
    }

    #[test]
    fn index_hits_are_merged_with_mid_word_matches() {
        let conn = conn_with_rows();
        conn.execute_batch(
            r#"
            INSERT INTO demands(id,title,description,client,priority,created_at,status,week_key,carried_over,sort_order)
            VALUES ('d4','Update catalog',NULL,'Umbrella','low','2024-01-02T00:00:00.000Z','open','w',0,4);
            "#,
        )
        .unwrap();
        rebuild_index(&conn).unwrap();

        // "log" is a prefix of "login" (index) and sits inside "catalog" (scan only).
        let hits = search(&conn, "log").unwrap();
        assert_eq!(
            hits.ids,
            BTreeSet::from(["d1".to_string(), "d4".to_string()])
        );
        assert_eq!(hits.path, SearchPath::FullText { substring_only: 1 });
    }

    #[test]
    fn mid_word_and_client_queries_fall_back_to_substring() {
        let conn = conn_with_rows();
        let hits = search(&conn, "ogin").unwrap();
        assert_eq!(
            hits.path,
            SearchPath::Fallback {
                reason: FallbackReason::NoHits
            }
        );
        assert!(hits.contains("d1"));

        let hits = search(&conn, "GLOBEX").unwrap();
        assert_eq!(hits.ids, BTreeSet::from(["d2".to_string()]));
    }

    #[test]
    fn like_wildcards_are_literal() {
        let conn = conn_with_rows();
        assert_eq!(
            search(&conn, "0%").unwrap().ids,
            BTreeSet::from(["d3".to_string()])
        );
        assert_eq!(
            search(&conn, "r_r").unwrap().ids,
            BTreeSet::<String>::new()
        );
    }

    #[test]
    fn quotes_in_queries_do_not_break_matching() {
        let conn = conn_with_rows();
        let hits = search(&conn, "\"login").unwrap();
        assert!(hits.is_empty() || hits.contains("d1"));
        assert_eq!(fts_expression("a \"b\""), Some("\"a\"* \"\"\"b\"\"\"*".to_string()));
    }

    #[test]
    fn missing_index_degrades_to_substring() {
        let conn = conn_with_rows();
        conn.execute_batch("DROP TABLE demands_fts;").unwrap();
        let hits = search(&conn, "login").unwrap();
        assert!(matches!(
            hits.path,
            SearchPath::Fallback {
                reason: FallbackReason::Unavailable(_)
            }
        ));
        assert_eq!(hits.ids, BTreeSet::from(["d1".to_string()]));
        assert!(search(&conn, "zzz-no-match").unwrap().is_empty());
    }
}
