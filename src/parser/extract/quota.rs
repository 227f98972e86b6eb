use serde::{Deserialize, Serialize};

/// Quota attributes read from a section's outline path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quota {
    pub subject: Option<String>,
    pub medium: Option<String>,
    pub category: Option<String>,
    pub gender: Option<String>,
}

/// Which path segment holds which quota attribute.
///
/// Merit lists are bookmarked `subject / medium / category / gender` below the
/// document root, which is the default. Documents nested differently set the
/// positions (or `None` to never read a field) in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaLayout {
    pub subject: Option<usize>,
    pub medium: Option<usize>,
    pub category: Option<usize>,
    pub gender: Option<usize>,
}

impl Default for QuotaLayout {
    fn default() -> Self {
        QuotaLayout {
            subject: Some(0),
            medium: Some(1),
            category: Some(2),
            gender: Some(3),
        }
    }
}

impl QuotaLayout {
    pub fn classify(&self, segments: &[String]) -> Quota {
        let at = |pos: Option<usize>| pos.and_then(|i| segments.get(i)).cloned();
        Quota {
            subject: at(self.subject),
            medium: at(self.medium),
            category: at(self.category),
            gender: at(self.gender),
        }
    }
}
