//! Interaction dataset for training.
//!
//! The input is a delimited file of `user,item,rating,timestamp` rows.
//! External ids stay strings; training works on dense indices assigned in
//! first-seen order, which keeps index assignment deterministic for a
//! given input file.

use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interaction {
    pub user: usize,
    pub item: usize,
    pub rating: f32,
    pub timestamp: i64,
}

#[derive(Debug)]
pub struct Interactions {
    /// External user id per internal index.
    pub users: Vec<String>,
    /// External item id per internal index.
    pub items: Vec<String>,
    pub user_index: HashMap<String, usize>,
    pub item_index: HashMap<String, usize>,
    pub records: Vec<Interaction>,
}

impl Interactions {
    pub fn from_csv(path: &Path, delimiter: u8, has_header: bool) -> Result<Self, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(has_header)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| DatasetError::Open {
                path: path.display().to_string(),
                source: e,
            })?;

        let mut dataset = Self {
            users: Vec::new(),
            items: Vec::new(),
            user_index: HashMap::new(),
            item_index: HashMap::new(),
            records: Vec::new(),
        };

        for (row, record) in reader.records().enumerate() {
            let line = row + 1 + has_header as usize;
            let record = record.map_err(|e| DatasetError::Read { line, source: e })?;
            if record.len() < 4 {
                return Err(DatasetError::FieldCount {
                    line,
                    found: record.len(),
                });
            }

            let rating: f32 = parse_field(&record[2], "rating", line)?;
            let timestamp: i64 = parse_field(&record[3], "timestamp", line)?;

            let user = intern(&mut dataset.users, &mut dataset.user_index, &record[0]);
            let item = intern(&mut dataset.items, &mut dataset.item_index, &record[1]);
            dataset.records.push(Interaction {
                user,
                item,
                rating,
                timestamp,
            });
        }

        if dataset.records.is_empty() {
            return Err(DatasetError::Empty {
                path: path.display().to_string(),
            });
        }

        Ok(dataset)
    }

    pub fn n_users(&self) -> usize {
        self.users.len()
    }

    pub fn n_items(&self) -> usize {
        self.items.len()
    }

    /// Per-user chronological split: for every user the earliest `ratio`
    /// fraction of their interactions goes to train, the remainder to
    /// test. A user always keeps at least one train interaction, so users
    /// with a single interaction never appear in the test set.
    pub fn chrono_split(&self, ratio: f64) -> (Vec<Interaction>, Vec<Interaction>) {
        let mut by_user: HashMap<usize, Vec<Interaction>> = HashMap::new();
        for rec in &self.records {
            by_user.entry(rec.user).or_default().push(*rec);
        }

        let mut train = Vec::new();
        let mut test = Vec::new();
        // Iterate users by index so the output ordering is deterministic.
        for user in 0..self.users.len() {
            let Some(mut recs) = by_user.remove(&user) else {
                continue;
            };
            recs.sort_by_key(|r| r.timestamp);
            let n = recs.len();
            let n_train = (((n as f64) * ratio).round() as usize).clamp(1, n);
            for (i, rec) in recs.into_iter().enumerate() {
                if i < n_train {
                    train.push(rec);
                } else {
                    test.push(rec);
                }
            }
        }
        (train, test)
    }

    /// Item sets per user, used for negative sampling and for excluding
    /// already-seen items during evaluation.
    pub fn positives_by_user(records: &[Interaction]) -> HashMap<usize, HashSet<usize>> {
        let mut positives: HashMap<usize, HashSet<usize>> = HashMap::new();
        for rec in records {
            positives.entry(rec.user).or_default().insert(rec.item);
        }
        positives
    }
}

fn intern(names: &mut Vec<String>, index: &mut HashMap<String, usize>, id: &str) -> usize {
    if let Some(&i) = index.get(id) {
        return i;
    }
    let i = names.len();
    names.push(id.to_string());
    index.insert(id.to_string(), i);
    i
}

fn parse_field<T: std::str::FromStr>(
    value: &str,
    field: &'static str,
    line: usize,
) -> Result<T, DatasetError> {
    value.parse().map_err(|_| DatasetError::BadField {
        line,
        field,
        value: value.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Failed to open data file {path}: {source}")]
    Open { path: String, source: csv::Error },
    #[error("Failed to read record at line {line}: {source}")]
    Read { line: usize, source: csv::Error },
    #[error("Expected 4 fields but found {found} at line {line}")]
    FieldCount { line: usize, found: usize },
    #[error("Invalid {field} value {value:?} at line {line}")]
    BadField {
        line: usize,
        field: &'static str,
        value: String,
    },
    #[error("Data file {path} contains no interactions")]
    Empty { path: String },
}
