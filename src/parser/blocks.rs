/// Decides whether a line opens a new candidate block.
pub trait HeadingRule: Sync {
    fn is_heading(&self, line: &str) -> bool;
}

impl<F> HeadingRule for F
where
    F: Fn(&str) -> bool + Sync,
{
    fn is_heading(&self, line: &str) -> bool {
        self(line)
    }
}

/// Candidate names are printed in capitals: a line made only of `A-Z` and
/// spaces. Any all-caps body line is a false positive and merges into a new
/// block; callers see that only as a parse miss downstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllCapsName;

impl HeadingRule for AllCapsName {
    fn is_heading(&self, line: &str) -> bool {
        let line = line.trim();
        !line.is_empty() && line.chars().all(|c| c.is_ascii_uppercase() || c == ' ')
    }
}

/// Lines belonging to one candidate. The first line is the heading that
/// opened it, unless the text did not start with a heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateBlock {
    pub lines: Vec<String>,
}

impl CandidateBlock {
    pub fn name(&self) -> Option<&str> {
        self.lines.first().map(String::as_str)
    }

    pub fn body(&self) -> &[String] {
        self.lines.get(1..).unwrap_or_default()
    }
}

/// Split section text into candidate blocks at heading lines.
pub fn segment(text: &str, rule: &dyn HeadingRule) -> Vec<CandidateBlock> {
    let mut blocks = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if rule.is_heading(trimmed) && !current.is_empty() {
            blocks.push(CandidateBlock {
                lines: std::mem::take(&mut current),
            });
        }
        if !trimmed.is_empty() {
            current.push(trimmed.to_string());
        }
    }

    if !current.is_empty() {
        blocks.push(CandidateBlock { lines: current });
    }

    blocks
}
