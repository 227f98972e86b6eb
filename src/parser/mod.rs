pub mod blocks;
pub mod extract;
pub mod outline;

use rayon::prelude::*;

use blocks::HeadingRule;
use extract::candidate::CandidateRecord;
use extract::quota::QuotaLayout;
use outline::Section;

/// Segment, parse and classify every section. Sections are independent, so
/// they run in parallel; output keeps section order, which is page order for
/// sections from `flatten` or `sections_from_tree`.
pub fn process_sections(
    sections: &[Section],
    rule: &dyn HeadingRule,
    layout: &QuotaLayout,
) -> Vec<CandidateRecord> {
    sections
        .par_iter()
        .flat_map_iter(|s| extract::extract_section(s, rule, layout))
        .collect()
}
