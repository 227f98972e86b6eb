use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use super::quota::Quota;
use crate::parser::blocks::CandidateBlock;

// dob, gender and category are glued together by OCR more often than not,
// hence the optional whitespace. The bare `\d*` after the roll number is
// a serial column that is not kept. `\d` is any Unicode decimal digit, so
// Bengali OCR output matches too.
static CANDIDATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?P<dob>\d{2}-\d{2}-\d{4})",
        r"(?P<gender>MALE|FEMALE)",
        r"\s*(?P<category>GEN|SC|ST|OBC-A|OBC-B)",
        r"\s*(?P<total_score>\d+)",
        r"\s*(?P<rank>[A-Z0-9\-]+)",
        r"\s*(?P<roll_no>\d+)",
        r"\s*\d*\s*",
        r"(?P<score>\d+)",
        r"\s*(?P<subject_score>\d+)",
        r"\s*(?P<experience_score>\d+)",
    ))
    .unwrap()
});

static DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d$").unwrap());

/// Fields read out of one candidate block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFields {
    pub name: String,
    pub dob: String,
    pub gender: String,
    pub category: String,
    pub total_score: u64,
    pub rank: String,
    pub roll_no: String,
    pub score: u64,
    pub subject_score: u64,
    pub experience_score: u64,
    /// A score had more digits than fit in `u64` and was clamped to `u64::MAX`.
    pub saturated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub name: String,
    pub dob: String,
    pub gender: String,
    pub category: String,
    pub total_score: u64,
    pub rank: String,
    pub roll_no: String,
    pub score: u64,
    pub subject_score: u64,
    pub experience_score: u64,
    pub xpath: String,
    pub valid: bool,
    pub quota_subject: Option<String>,
    pub quota_medium: Option<String>,
    pub quota_category: Option<String>,
    pub quota_gender: Option<String>,
}

impl CandidateRecord {
    pub fn new(fields: CandidateFields, xpath: String, quota: Quota) -> Self {
        let valid = !fields.saturated && components_match_total(&fields);
        CandidateRecord {
            name: fields.name,
            dob: fields.dob,
            gender: fields.gender,
            category: fields.category,
            total_score: fields.total_score,
            rank: fields.rank,
            roll_no: fields.roll_no,
            score: fields.score,
            subject_score: fields.subject_score,
            experience_score: fields.experience_score,
            xpath,
            valid,
            quota_subject: quota.subject,
            quota_medium: quota.medium,
            quota_category: quota.category,
            quota_gender: quota.gender,
        }
    }

    /// `dob` as a date. Non-ASCII digits are folded to ASCII first.
    pub fn birth_date(&self) -> Option<NaiveDate> {
        let dob: String = self
            .dob
            .chars()
            .map(|c| match digit_value(c) {
                Some(d) => char::from(b'0' + d as u8),
                None => c,
            })
            .collect();
        NaiveDate::parse_from_str(&dob, "%d-%m-%Y").ok()
    }
}

fn components_match_total(f: &CandidateFields) -> bool {
    let sum = u128::from(f.score) + u128::from(f.subject_score) + u128::from(f.experience_score);
    sum == u128::from(f.total_score)
}

/// Parse one block. `None` when the block has no recognisable candidate line,
/// which is normal for page headers and OCR debris. A matched line always
/// yields fields.
pub fn parse_block(block: &CandidateBlock) -> Option<CandidateFields> {
    let name = block.name()?.to_string();
    let text = block.body().join(" ").replace("  ", " ");

    let Some(caps) = CANDIDATE_RE.captures(&text) else {
        trace!(%name, "no candidate pattern in block");
        return None;
    };

    let mut saturated = false;
    let mut num = |group: &str| {
        let (value, clamped) = number(&caps, group);
        saturated |= clamped;
        value
    };
    let total_score = num("total_score");
    let score = num("score");
    let subject_score = num("subject_score");
    let experience_score = num("experience_score");

    Some(CandidateFields {
        name,
        dob: caps["dob"].to_string(),
        gender: caps["gender"].to_string(),
        category: caps["category"].to_string(),
        total_score,
        rank: caps["rank"].to_string(),
        roll_no: caps["roll_no"].to_string(),
        score,
        subject_score,
        experience_score,
        saturated,
    })
}

/// Value of a captured digit run; `(u64::MAX, true)` when it does not fit.
fn number(caps: &Captures, group: &str) -> (u64, bool) {
    let raw = &caps[group];
    let value = raw.chars().try_fold(0u64, |acc, c| {
        let d = digit_value(c)?;
        acc.checked_mul(10)?.checked_add(u64::from(d))
    });
    match value {
        Some(v) => (v, false),
        None => {
            warn!(group, raw, "score does not fit in u64, record flagged invalid");
            (u64::MAX, true)
        }
    }
}

/// Decimal value of any Unicode decimal digit. Those come in contiguous runs
/// of ten starting at zero, so the value is the offset from the run start.
fn digit_value(c: char) -> Option<u32> {
    if let Some(d) = c.to_digit(10) {
        return Some(d);
    }
    if !is_decimal(c) {
        return None;
    }
    let mut offset = 0;
    let mut cp = u32::from(c);
    while let Some(prev) = cp.checked_sub(1).and_then(char::from_u32) {
        if !is_decimal(prev) {
            break;
        }
        offset += 1;
        cp -= 1;
    }
    Some(offset % 10)
}

fn is_decimal(c: char) -> bool {
    let mut buf = [0u8; 4];
    DIGIT_RE.is_match(c.encode_utf8(&mut buf))
}
