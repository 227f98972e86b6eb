use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::parser::extract::candidate::CandidateRecord;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub gender: String,
    pub category: &'static str,
    pub quota_subject: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bucket {
    pub total: u64,
    pub with_experience: u64,
    pub without_experience: u64,
}

impl Bucket {
    fn add(&mut self, other: &Bucket) {
        self.total += other.total;
        self.with_experience += other.with_experience;
        self.without_experience += other.without_experience;
    }
}

/// Candidate counts per (gender, category, subject). Buckets only grow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyticsTable {
    buckets: BTreeMap<BucketKey, Bucket>,
}

pub fn normalize_category(category: &str) -> &'static str {
    if category == "GEN" {
        "GENERAL"
    } else {
        "OTHERS"
    }
}

impl AnalyticsTable {
    pub fn observe(&mut self, record: &CandidateRecord) {
        let key = BucketKey {
            gender: record.gender.clone(),
            category: normalize_category(&record.category),
            quota_subject: record.quota_subject.clone(),
        };
        let bucket = self.buckets.entry(key).or_default();
        bucket.total += 1;
        if record.experience_score > 0 {
            bucket.with_experience += 1;
        } else {
            bucket.without_experience += 1;
        }
    }

    /// Combine two partial tables. Commutative and associative.
    pub fn merge(mut self, other: AnalyticsTable) -> AnalyticsTable {
        for (key, bucket) in other.buckets {
            self.buckets.entry(key).or_default().add(&bucket);
        }
        self
    }

    #[cfg(test)]
    pub fn get(&self, key: &BucketKey) -> Option<&Bucket> {
        self.buckets.get(key)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn rows(&self) -> Vec<AnalyticsRow> {
        self.buckets
            .iter()
            .map(|(key, b)| AnalyticsRow {
                gender: key.gender.clone(),
                category: key.category.to_string(),
                quota_subject: key.quota_subject.clone(),
                total_count: b.total,
                with_experience: b.with_experience,
                without_experience: b.without_experience,
            })
            .collect()
    }
}

/// Bucket all records. Shards are counted independently and merged.
pub fn aggregate(records: &[CandidateRecord]) -> AnalyticsTable {
    records
        .par_iter()
        .fold(AnalyticsTable::default, |mut table, r| {
            table.observe(r);
            table
        })
        .reduce(AnalyticsTable::default, AnalyticsTable::merge)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsRow {
    pub gender: String,
    pub category: String,
    pub quota_subject: Option<String>,
    pub total_count: u64,
    pub with_experience: u64,
    pub without_experience: u64,
}

impl AnalyticsRow {
    pub const COLUMNS: [&'static str; 6] = [
        "Gender",
        "Category",
        "Quota Subject",
        "Total Count",
        "With Experience",
        "Without Experience",
    ];

    /// Flat form in `COLUMNS` order; a missing subject is an empty cell.
    pub fn cells(&self) -> [String; 6] {
        [
            self.gender.clone(),
            self.category.clone(),
            self.quota_subject.clone().unwrap_or_default(),
            self.total_count.to_string(),
            self.with_experience.to_string(),
            self.without_experience.to_string(),
        ]
    }
}

pub fn render_table(rows: &[AnalyticsRow]) -> String {
    let mut out = format!(
        "{:<8} | {:<8} | {:<24} | {:>11} | {:>15} | {:>18}\n",
        AnalyticsRow::COLUMNS[0],
        AnalyticsRow::COLUMNS[1],
        AnalyticsRow::COLUMNS[2],
        AnalyticsRow::COLUMNS[3],
        AnalyticsRow::COLUMNS[4],
        AnalyticsRow::COLUMNS[5],
    );
    out.push_str(&"-".repeat(97));
    out.push('\n');
    for row in rows {
        let [gender, category, subject, total, with, without] = row.cells();
        let subject = if subject.is_empty() { "-".to_string() } else { subject };
        out.push_str(&format!(
            "{:<8} | {:<8} | {:<24} | {:>11} | {:>15} | {:>18}\n",
            gender, category, subject, total, with, without
        ));
    }
    out
}
