//! Extraction of structured facts from the scanner's free-text report.
//!
//! Every marker string the pipeline depends on lives in [`ReportMarkers`], so
//! a different scanner version only needs a new marker set.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Marker phrases and section rules for one scanner output dialect.
///
/// The listing closes on two independent rules, both only after a name has
/// been collected: a line containing `separator`, or a blank line. The
/// blank-line rule is not configurable. sqlmap follows its listing with a
/// blank line and then `[*] ending @ ...`, which shares the bullet and would
/// otherwise be read as a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportMarkers {
    /// Phrase that opens the database listing. Matched case-insensitively on
    /// both sides.
    pub section_start: &'static str,
    /// Bullet that prefixes each listed database.
    pub bullet: &'static str,
    /// Separator that closes the listing once something was collected. A blank
    /// line closes it as well; see the type docs.
    pub separator: &'static str,
    /// Case-sensitive substrings indicating the dump retrieved rows.
    pub success_markers: &'static [&'static str],
    /// Infrastructure schemas that are never audit targets.
    pub system_schemas: &'static [&'static str],
}

impl ReportMarkers {
    pub const SQLMAP: ReportMarkers = ReportMarkers {
        section_start: "available databases",
        bullet: "[*]",
        separator: "---",
        success_markers: &["fetched", "entries"],
        system_schemas: &["information_schema", "mysql", "sys", "performance_schema"],
    };

    /// Returns the deduplicated database names listed in `text`, in report order.
    ///
    /// An empty result is the normal "not vulnerable / nothing accessible"
    /// signal. The listing ends at a separator, or at a blank line, once at
    /// least one name was collected, so trailing output is never read as a
    /// database.
    pub fn extract_databases(&self, text: &str) -> Vec<String> {
        let mut databases = Vec::new();
        let mut seen = HashSet::new();
        let mut in_section = false;
        let section_start = self.section_start.to_lowercase();

        for line in text.lines() {
            let line = line.trim();

            if line.to_lowercase().contains(&section_start) {
                in_section = true;
                continue;
            }
            if !in_section {
                continue;
            }

            if let Some((_, rest)) = line.split_once(self.bullet) {
                let name = rest.trim();
                if !name.is_empty() && !self.is_system_schema(name) && seen.insert(name.to_string()) {
                    databases.push(name.to_string());
                }
            }

            let at_separator = line.contains(self.separator);
            let at_blank_line = line.is_empty();
            if (at_separator || at_blank_line) && !databases.is_empty() {
                break;
            }
        }

        databases
    }

    /// Cheap heuristic that the dump stage actually retrieved rows.
    pub fn detect_dump_success(&self, text: &str) -> bool {
        self.success_markers.iter().any(|marker| text.contains(marker))
    }

    pub fn is_system_schema(&self, name: &str) -> bool {
        self.system_schemas.iter().any(|schema| schema.eq_ignore_ascii_case(name))
    }
}

impl Default for ReportMarkers {
    fn default() -> Self {
        Self::SQLMAP
    }
}

/// `extract_databases` with the default scanner dialect.
pub fn extract_databases(text: &str) -> Vec<String> {
    ReportMarkers::SQLMAP.extract_databases(text)
}

/// `detect_dump_success` with the default scanner dialect.
pub fn detect_dump_success(text: &str) -> bool {
    ReportMarkers::SQLMAP.detect_dump_success(text)
}

/// One dumped table as announced in a dump report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDump {
    pub database: String,
    pub table: String,
    pub entries: usize,
}

fn database_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Database:\s*(\S+)").expect("valid regex"))
}

fn table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Table:\s*(\S+)").expect("valid regex"))
}

fn entries_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(\d+) entr(?:y|ies)\]").expect("valid regex"))
}

/// Collects the `Database:` / `Table:` / `[N entries]` blocks of a dump report.
///
/// Tables announced without an entry count are ignored; a table dumped twice
/// keeps its first count.
pub fn summarize_dump(text: &str) -> Vec<TableDump> {
    let mut tables: Vec<TableDump> = Vec::new();
    let mut database: Option<String> = None;
    let mut table: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();

        if let Some(caps) = database_re().captures(line) {
            database = Some(caps[1].to_string());
            table = None;
        } else if let Some(caps) = table_re().captures(line) {
            table = Some(caps[1].to_string());
        } else if let Some(caps) = entries_re().captures(line) {
            let (Some(db), Some(tbl)) = (database.as_ref(), table.take()) else {
                continue;
            };
            let entries = caps[1].parse().unwrap_or(0);
            if !tables.iter().any(|t| &t.database == db && t.table == tbl) {
                tables.push(TableDump { database: db.clone(), table: tbl, entries });
            }
        }
    }

    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISCOVERY: &str = "[05:00:00] [INFO] fetching database names\n\
                             available databases [3]:\n\
                             [*] shop\n\
                             [*] information_schema\n\
                             [*] users\n\
                             ---";

    #[test]
    fn test_extracts_listed_databases() {
        assert_eq!(extract_databases(DISCOVERY), vec!["shop", "users"]);
    }

    #[test]
    fn test_missing_marker_yields_empty() {
        let text = "[*] starting @ 05:00:00\n[*] shop\n[WARNING] all tested parameters do not appear to be injectable";
        assert!(extract_databases(text).is_empty());
        assert!(extract_databases("").is_empty());
    }

    #[test]
    fn test_marker_is_case_insensitive() {
        let text = "AVAILABLE DATABASES [1]:\n[*] crm\n---";
        assert_eq!(extract_databases(text), vec!["crm"]);
    }

    #[test]
    fn test_duplicates_and_system_schemas_are_dropped() {
        let text = "available databases [6]:\n\
                    [*] shop\n\
                    [*] INFORMATION_SCHEMA\n\
                    [*] shop\n\
                    [*] Performance_Schema\n\
                    [*] mysql\n\
                    [*] sys\n\
                    [*] users\n\
                    [*] users\n\
                    ---";
        assert_eq!(extract_databases(text), vec!["shop", "users"]);
    }

    #[test]
    fn test_trailing_output_is_not_parsed() {
        let text = "available databases [2]:\n\
                    [*] acuart\n\
                    [*] information_schema\n\
                    \n\
                    [05:00:01] [INFO] fetched data logged to text files\n\
                    \n\
                    [*] ending @ 05:00:01 /2024-01-01/";
        assert_eq!(extract_databases(text), vec!["acuart"]);
    }

    #[test]
    fn test_blank_line_closes_listing_before_separator() {
        let text = "available databases [2]:\n[*] shop\n\n[*] users\n---";
        assert_eq!(extract_databases(text), vec!["shop"]);
    }

    #[test]
    fn test_blank_line_before_any_database_does_not_close() {
        let text = "available databases [1]:\n\n[*] blog\n---";
        assert_eq!(extract_databases(text), vec!["blog"]);
    }

    #[test]
    fn test_separator_before_any_database_does_not_close() {
        let text = "available databases [1]:\n---\n[*] blog\n---\n[*] late";
        assert_eq!(extract_databases(text), vec!["blog"]);
    }

    #[test]
    fn test_dump_success_markers() {
        assert!(detect_dump_success("[INFO] 5 entries fetched"));
        assert!(detect_dump_success("fetched"));
        assert!(detect_dump_success("[3 entries]"));
        assert!(!detect_dump_success(""));
        assert!(!detect_dump_success("[CRITICAL] unable to retrieve the table names"));
        assert!(!detect_dump_success("FETCHED ENTRIES"));
    }

    #[test]
    fn test_custom_markers() {
        let markers = ReportMarkers {
            section_start: "schemas found",
            bullet: "-",
            separator: "===",
            success_markers: &["rows"],
            system_schemas: &["pg_catalog"],
        };
        let text = "schemas found:\n- public\n- pg_catalog\n===";
        assert_eq!(markers.extract_databases(text), vec!["public"]);
        assert!(markers.detect_dump_success("12 rows"));
        assert!(!markers.detect_dump_success("5 entries fetched"));
    }

    #[test]
    fn test_custom_section_start_with_uppercase() {
        let markers = ReportMarkers {
            section_start: "Schemas Found",
            ..ReportMarkers::SQLMAP
        };
        assert_eq!(markers.extract_databases("schemas found:\n[*] public\n---"), vec!["public"]);
        assert_eq!(markers.extract_databases("SCHEMAS FOUND:\n[*] crm\n---"), vec!["crm"]);
    }

    #[test]
    fn test_summarize_dump_tables() {
        let text = "Database: shop\n\
                    Table: customers\n\
                    [5 entries]\n\
                    +----+-------+\n\
                    | id | name  |\n\
                    +----+-------+\n\
                    Database: shop\n\
                    Table: orders\n\
                    [1 entry]\n\
                    Table: ghosts\n\
                    [*] ending @ 05:00:02";
        let tables = summarize_dump(text);
        assert_eq!(
            tables,
            vec![
                TableDump { database: "shop".into(), table: "customers".into(), entries: 5 },
                TableDump { database: "shop".into(), table: "orders".into(), entries: 1 },
            ]
        );
    }

    #[test]
    fn test_summarize_dump_without_tables() {
        assert!(summarize_dump("[WARNING] no tables found").is_empty());
    }
}
