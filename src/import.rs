use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Difficulty, ImportFailure, ImportReport};

/// Import question rows from a CSV file.
///
/// The header row must contain a `prompt` column; `reference_answer`,
/// `category` and `difficulty` are optional (unrecognized difficulty
/// falls back to medium). Rows whose prompt already exists are skipped,
/// any other bad row is reported with its line number; a bad row never
/// aborts the rest of the file.
pub fn import_from_csv<P: AsRef<Path>>(db: &Database, path: P) -> Result<ImportReport> {
    let file = File::open(&path)?;
    log::info!("importing questions from {}", path.as_ref().display());
    import_from_reader(db, file)
}

pub fn import_from_reader<R: Read>(db: &Database, reader: R) -> Result<ImportReport> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let prompt_col = headers
        .iter()
        .position(|h| h == "prompt")
        .ok_or_else(|| Error::validation("csv is missing the required 'prompt' column"))?;
    let answer_col = headers.iter().position(|h| h == "reference_answer");
    let category_col = headers.iter().position(|h| h == "category");
    let difficulty_col = headers.iter().position(|h| h == "difficulty");

    let mut report = ImportReport::default();

    // Header occupies line 1, data starts at 2
    for (offset, result) in csv_reader.records().enumerate() {
        let line = offset + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                report.failed.push(ImportFailure {
                    line,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let prompt = field(&record, Some(prompt_col));
        let difficulty = Difficulty::from_str_or_default(field(&record, difficulty_col));

        match db.add_item(
            prompt,
            Some(field(&record, answer_col)),
            Some(field(&record, category_col)),
            difficulty,
        ) {
            Ok(_) => report.created += 1,
            Err(Error::Duplicate(_)) => report.skipped += 1,
            Err(e) => report.failed.push(ImportFailure {
                line,
                reason: e.to_string(),
            }),
        }
    }

    log::info!(
        "import finished: {} created, {} skipped, {} failed",
        report.created,
        report.skipped,
        report.failed.len()
    );
    Ok(report)
}

fn field<'r>(record: &'r csv::StringRecord, col: Option<usize>) -> &'r str {
    col.and_then(|i| record.get(i)).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.init().unwrap();
        db
    }

    fn import(db: &Database, csv: &str) -> ImportReport {
        import_from_reader(db, csv.as_bytes()).unwrap()
    }

    #[test]
    fn imports_full_rows() {
        let db = setup_db();
        let report = import(
            &db,
            "prompt,reference_answer,category,difficulty\n\
             What is a mutex?,A lock,concurrency,hard\n\
             What is a vector?,A growable array,collections,easy\n",
        );

        assert_eq!(report.created, 2);
        assert_eq!(report.skipped, 0);
        assert!(report.failed.is_empty());

        let items = db.list_items().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].prompt, "What is a mutex?");
        assert_eq!(items[0].category.as_deref(), Some("concurrency"));
        assert_eq!(items[0].difficulty, Difficulty::Hard);
    }

    #[test]
    fn prompt_only_header_is_enough() {
        let db = setup_db();
        let report = import(&db, "prompt\nWhat is a closure?\n");
        assert_eq!(report.created, 1);

        let item = &db.list_items().unwrap()[0];
        assert!(item.reference_answer.is_none());
        assert!(item.category.is_none());
        assert_eq!(item.difficulty, Difficulty::Medium);
    }

    #[test]
    fn missing_prompt_column_is_rejected() {
        let db = setup_db();
        let result = import_from_reader(&db, "question,answer\nfoo,bar\n".as_bytes());
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn duplicate_rows_are_skipped_not_failed() {
        let db = setup_db();
        db.add_item("foo", None, None, Difficulty::Medium).unwrap();
        let report = import(&db, "prompt\nFoo \nbar\n");

        assert_eq!(report.created, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.failed.is_empty());
        assert_eq!(db.list_items().unwrap().len(), 2);
    }

    #[test]
    fn invalid_difficulty_defaults_to_medium() {
        let db = setup_db();
        import(&db, "prompt,difficulty\nq1,impossible\nq2,\n");
        for item in db.list_items().unwrap() {
            assert_eq!(item.difficulty, Difficulty::Medium);
        }
    }

    #[test]
    fn bad_row_is_reported_with_line_number_and_rest_continue() {
        let db = setup_db();
        let report = import(
            &db,
            "prompt,category\n\
             good question,general\n\
             ,general\n\
             another good one,general\n",
        );

        assert_eq!(report.created, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].line, 3);
        assert!(report.failed[0].reason.contains("prompt"));
    }

    #[test]
    fn empty_file_with_header_imports_nothing() {
        let db = setup_db();
        let report = import(&db, "prompt,reference_answer\n");
        assert_eq!(report.created, 0);
        assert_eq!(report.skipped, 0);
        assert!(report.failed.is_empty());
    }
}
