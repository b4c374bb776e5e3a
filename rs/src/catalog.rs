//! MovieLens `u.item` catalog reader

use crate::error::RecsysError;
use crate::models::{ItemId, RawItem};
use crate::Result;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

/// Fields before the genre flags: id, title, release date, video release date, IMDb URL
const LEADING_FIELDS: usize = 5;

fn year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\((\d{4})\)").expect("Failed to compile year regex"))
}

/// First four-digit year in parentheses, e.g. `Toy Story (1995)` -> 1995
pub fn extract_year(title: &str) -> Option<i32> {
    year_pattern()
        .captures(title)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Read a MovieLens `u.item` file
///
/// The file is Latin-1 encoded; every byte maps to the code point of the
/// same value.
pub async fn load_movielens_items<P: AsRef<Path>>(path: P, genre_columns: &[String]) -> Result<Vec<RawItem>> {
    let path = path.as_ref();
    tracing::info!("Loading catalog from {}", path.display());

    let bytes = tokio::fs::read(path).await?;
    let text: String = bytes.iter().map(|&b| char::from(b)).collect();
    let items = parse_items(&text, genre_columns)?;

    let without_year = items.iter().filter(|item| item.release_year.is_none()).count();
    tracing::info!(
        "Loaded {} items ({} without a release year in the title)",
        items.len(),
        without_year
    );
    Ok(items)
}

/// Parse pipe-separated catalog lines; blank lines are skipped
pub fn parse_items(text: &str, genre_columns: &[String]) -> Result<Vec<RawItem>> {
    let expected = LEADING_FIELDS + genre_columns.len();
    let mut items = Vec::new();
    let mut seen: HashSet<ItemId> = HashSet::new();

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() != expected {
            return Err(RecsysError::invalid_input(format!(
                "line {line_no}: expected {expected} fields, found {}",
                fields.len()
            )));
        }

        let item_id: ItemId = match fields[0].trim().parse() {
            Ok(id) if id > 0 => id,
            _ => {
                return Err(RecsysError::invalid_input(format!(
                    "line {line_no}: invalid item id {:?}",
                    fields[0]
                )))
            }
        };
        if !seen.insert(item_id) {
            return Err(RecsysError::invalid_input(format!(
                "line {line_no}: duplicate item id {item_id}"
            )));
        }

        let genres = fields[LEADING_FIELDS..]
            .iter()
            .zip(genre_columns)
            .map(|(flag, genre)| match flag.trim() {
                "0" => Ok(false),
                "1" => Ok(true),
                other => Err(RecsysError::invalid_input(format!(
                    "line {line_no}: genre flag {genre} must be 0 or 1, got {other:?}"
                ))),
            })
            .collect::<Result<Vec<bool>>>()?;

        let title = fields[1].trim();
        let imdb_url = Some(fields[4].trim())
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        let mut item = RawItem::new(item_id, title, extract_year(title), genres);
        item.imdb_url = imdb_url;
        items.push(item);
    }

    Ok(items)
}
