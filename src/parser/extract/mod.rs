pub mod candidate;
pub mod quota;

use tracing::debug;

use super::blocks::{segment, HeadingRule};
use super::outline::Section;
use candidate::{parse_block, CandidateRecord};
use quota::QuotaLayout;

/// All candidates found in one section, in text order.
pub fn extract_section(
    section: &Section,
    rule: &dyn HeadingRule,
    layout: &QuotaLayout,
) -> Vec<CandidateRecord> {
    if section.content.is_empty() {
        return Vec::new();
    }

    let blocks = segment(&section.content, rule);
    let xpath = section.xpath();
    let quota = layout.classify(&section.path_segments);

    let records: Vec<CandidateRecord> = blocks
        .iter()
        .filter_map(parse_block)
        .map(|fields| CandidateRecord::new(fields, xpath.clone(), quota.clone()))
        .collect();

    debug!(
        path = %xpath,
        blocks = blocks.len(),
        records = records.len(),
        "section extracted"
    );
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::blocks::AllCapsName;

    fn section(path: &[&str], content: &str) -> Section {
        Section {
            order: 0,
            title: path.last().copied().unwrap_or("Root").to_string(),
            page: Some(1),
            path_segments: path.iter().map(|p| p.to_string()).collect(),
            range: None,
            content: content.to_string(),
        }
    }

    const TWO_CANDIDATES: &str = "\
JOHN DOE
01-01-1990MALE GEN 90 R1 1001 5 60 20 10
JANE ROE
02-02-1991FEMALE SC 70 R2 1002 6 50 20 0";

    #[test]
    fn reference_section() {
        let s = section(&["Male"], "JOHN DOE\n01-01-1990MALE GEN 90 R1 1001 5 60 20 10");
        let records = extract_section(&s, &AllCapsName, &QuotaLayout::default());
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.total_score, 90);
        assert_eq!((r.score, r.subject_score, r.experience_score), (60, 20, 10));
        assert!(r.valid);
        assert_eq!(r.xpath, "Male");
        assert_eq!(r.quota_subject.as_deref(), Some("Male"));
        assert_eq!(r.quota_medium, None);
    }

    #[test]
    fn path_fields_attached_to_every_record() {
        let s = section(&["Physics", "Bengali", "UR", "Female"], TWO_CANDIDATES);
        let records = extract_section(&s, &AllCapsName, &QuotaLayout::default());
        assert_eq!(records.len(), 2);
        for r in &records {
            assert_eq!(r.xpath, "Physics/Bengali/UR/Female");
            assert_eq!(r.quota_subject.as_deref(), Some("Physics"));
            assert_eq!(r.quota_gender.as_deref(), Some("Female"));
        }
        assert_eq!(records[1].name, "JANE ROE");
        assert_eq!(records[1].experience_score, 0);
    }

    #[test]
    fn unparseable_block_is_skipped() {
        let content = format!("MERIT LIST\nPublished by the board\n{TWO_CANDIDATES}");
        let records = extract_section(&section(&["Physics"], &content), &AllCapsName, &QuotaLayout::default());
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["JOHN DOE", "JANE ROE"]);
    }

    #[test]
    fn extraction_is_idempotent() {
        let s = section(&["Physics", "Bengali"], TWO_CANDIDATES);
        let first = extract_section(&s, &AllCapsName, &QuotaLayout::default());
        let second = extract_section(&s, &AllCapsName, &QuotaLayout::default());
        assert_eq!(first, second);
    }

    #[test]
    fn empty_section_has_no_records() {
        let records = extract_section(&section(&["Physics"], ""), &AllCapsName, &QuotaLayout::default());
        assert!(records.is_empty());
    }
}
