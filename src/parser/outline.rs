use std::ops::Range;
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ExtractError, ExtractResult};
use crate::source::PageTextSource;

static NON_ALNUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

/// One bookmark of the document outline. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub title: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    /// Page 0 never comes out of a resolved destination; treat it like a missing page.
    pub fn resolved_page(&self) -> Option<u32> {
        self.page.filter(|&p| p > 0)
    }
}

/// How a bookmark that shares its page with the next bookmark gets its range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedPagePolicy {
    /// Range ends where the successor starts, so it is empty.
    #[default]
    Empty,
    /// Every bookmark in a run of equal pages ends at the next distinct page.
    Extend,
}

/// A flattened outline node with its page range and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Preorder position in the outline.
    pub order: usize,
    pub title: String,
    pub page: Option<u32>,
    pub path_segments: Vec<String>,
    /// 0-based `[start, end)`. `None` for unresolved bookmarks and for
    /// sections rebuilt from a section tree.
    pub range: Option<Range<usize>>,
    pub content: String,
}

impl Section {
    pub fn xpath(&self) -> String {
        self.path_segments.join("/")
    }
}

/// Outline node with its extracted text attached. This is the hand-off
/// format between flattening and parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionNode {
    pub title: String,
    pub page: Option<u32>,
    #[serde(default)]
    pub children: Vec<SectionNode>,
    #[serde(default)]
    pub content: String,
}

pub fn sanitize_title(title: &str) -> String {
    NON_ALNUM_RE
        .replace_all(title, "-")
        .trim_matches('-')
        .to_string()
}

struct FlatNode<'a> {
    order: usize,
    node: &'a OutlineNode,
    path: Vec<String>,
}

/// Flatten `forest` into page-ordered sections with text pulled from `source`.
pub fn flatten(
    forest: &[OutlineNode],
    total_pages: usize,
    source: &dyn PageTextSource,
    policy: SharedPagePolicy,
) -> ExtractResult<Vec<Section>> {
    let mut flat = Vec::new();
    collect(forest, &[], true, &mut flat);

    // Stable: equal pages keep outline order, unresolved nodes go last.
    flat.sort_by_key(|f| f.node.resolved_page().unwrap_or(u32::MAX));

    for f in &flat {
        if let Some(page) = f.node.resolved_page() {
            if page as usize > total_pages {
                return Err(ExtractError::PageOutOfRange {
                    title: f.node.title.clone(),
                    page,
                    total_pages,
                });
            }
        }
    }

    let pages: Vec<Option<u32>> = flat.iter().map(|f| f.node.resolved_page()).collect();
    let ranges = page_ranges(&pages, total_pages, policy);

    let sections = flat
        .into_par_iter()
        .zip(ranges.into_par_iter())
        .map(|(f, range)| {
            let content = match &range {
                Some(r) => read_range(source, r.clone())?,
                None => String::new(),
            };
            trace!(order = f.order, title = %f.node.title, ?range, "section range");
            Ok(Section {
                order: f.order,
                title: f.node.title.clone(),
                page: f.node.resolved_page(),
                path_segments: f.path,
                range,
                content,
            })
        })
        .collect::<ExtractResult<Vec<_>>>()?;

    debug!(sections = sections.len(), total_pages, "outline flattened");
    Ok(sections)
}

fn collect<'a>(nodes: &'a [OutlineNode], parent: &[String], root: bool, out: &mut Vec<FlatNode<'a>>) {
    for node in nodes {
        let path = if root {
            Vec::new()
        } else {
            let mut p = parent.to_vec();
            p.push(sanitize_title(&node.title));
            p
        };
        out.push(FlatNode {
            order: out.len(),
            node,
            path: path.clone(),
        });
        collect(&node.children, &path, false, out);
    }
}

/// Compute `[start, end)` for each entry of an already page-sorted list.
pub fn page_ranges(
    pages: &[Option<u32>],
    total_pages: usize,
    policy: SharedPagePolicy,
) -> Vec<Option<Range<usize>>> {
    pages
        .iter()
        .enumerate()
        .map(|(i, page)| {
            let page = (*page)?;
            let start = page as usize - 1;
            let next = match policy {
                SharedPagePolicy::Empty => pages.get(i + 1).copied(),
                SharedPagePolicy::Extend => pages[i + 1..].iter().copied().find(|p| *p != Some(page)),
            };
            let end = match next {
                Some(Some(next_page)) => next_page as usize - 1,
                _ => total_pages,
            };
            Some(start..end)
        })
        .collect()
}

fn read_range(source: &dyn PageTextSource, range: Range<usize>) -> ExtractResult<String> {
    let texts = range
        .map(|p| source.page_text(p))
        .collect::<ExtractResult<Vec<_>>>()?;
    Ok(texts.join("\n").trim().to_string())
}

/// Attach each section's content back onto the outline it came from.
pub fn section_tree(forest: &[OutlineNode], sections: &[Section]) -> Vec<SectionNode> {
    let mut contents = vec![String::new(); sections.len()];
    for s in sections {
        if let Some(slot) = contents.get_mut(s.order) {
            *slot = s.content.clone();
        }
    }
    let mut contents = contents.into_iter();
    build_tree(forest, &mut contents)
}

fn build_tree(nodes: &[OutlineNode], contents: &mut std::vec::IntoIter<String>) -> Vec<SectionNode> {
    nodes
        .iter()
        .map(|node| {
            let content = contents.next().unwrap_or_default();
            SectionNode {
                title: node.title.clone(),
                page: node.page,
                children: build_tree(&node.children, contents),
                content,
            }
        })
        .collect()
}

/// Walk a section tree back into sections, in the same page order `flatten`
/// produces. `order` keeps the outline position.
pub fn sections_from_tree(tree: &[SectionNode]) -> Vec<Section> {
    let mut out = Vec::new();
    walk_tree(tree, &[], true, &mut out);
    out.sort_by_key(|s| s.page.unwrap_or(u32::MAX));
    out
}

fn walk_tree(nodes: &[SectionNode], parent: &[String], root: bool, out: &mut Vec<Section>) {
    for node in nodes {
        let path = if root {
            Vec::new()
        } else {
            let mut p = parent.to_vec();
            p.push(sanitize_title(&node.title));
            p
        };
        out.push(Section {
            order: out.len(),
            title: node.title.clone(),
            page: node.page.filter(|&p| p > 0),
            path_segments: path.clone(),
            range: None,
            content: node.content.clone(),
        });
        walk_tree(&node.children, &path, false, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(title: &str, page: Option<u32>, children: Vec<OutlineNode>) -> OutlineNode {
        OutlineNode {
            title: title.to_string(),
            page,
            children,
        }
    }

    fn physics_forest() -> Vec<OutlineNode> {
        vec![node("Physics", Some(1), vec![node("Male", Some(1), vec![])])]
    }

    fn physics_pages() -> Vec<String> {
        vec![
            "JOHN DOE\n01-01-1990MALE GEN 90 R1 1001 5 60 20 10".to_string(),
            String::new(),
            String::new(),
        ]
    }

    #[test]
    fn sanitize() {
        assert_eq!(sanitize_title("Physics (Bengali Medium)"), "Physics-Bengali-Medium");
        assert_eq!(sanitize_title("  --UR / Female--"), "UR-Female");
        assert_eq!(sanitize_title("***"), "");
    }

    #[test]
    fn shared_page_gets_empty_range_by_default() {
        let pages = physics_pages();
        let sections = flatten(&physics_forest(), 3, &pages, SharedPagePolicy::Empty).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "Physics");
        assert_eq!(sections[0].range, Some(0..0));
        assert_eq!(sections[0].content, "");
        assert_eq!(sections[1].title, "Male");
        assert_eq!(sections[1].range, Some(0..3));
        assert_eq!(sections[1].content, pages[0]);
    }

    #[test]
    fn shared_page_extends_to_next_distinct_page() {
        let pages = physics_pages();
        let sections = flatten(&physics_forest(), 3, &pages, SharedPagePolicy::Extend).unwrap();
        assert_eq!(sections[0].range, Some(0..3));
        assert_eq!(sections[1].range, Some(0..3));
        assert_eq!(sections[0].content, sections[1].content);
    }

    #[test]
    fn root_title_excluded_from_path() {
        let pages = physics_pages();
        let sections = flatten(&physics_forest(), 3, &pages, SharedPagePolicy::Empty).unwrap();
        assert!(sections[0].path_segments.is_empty());
        assert_eq!(sections[1].path_segments, vec!["Male"]);
        assert_eq!(sections[1].xpath(), "Male");
    }

    #[test]
    fn nested_paths_follow_the_tree() {
        let forest = vec![node(
            "Result",
            Some(1),
            vec![node(
                "Physics",
                Some(1),
                vec![node("Bengali Medium", Some(2), vec![node("UR", Some(2), vec![])])],
            )],
        )];
        let pages = vec!["a", "b", "c"];
        let sections = flatten(&forest, 3, &pages, SharedPagePolicy::Empty).unwrap();
        let ur = sections.iter().find(|s| s.title == "UR").unwrap();
        assert_eq!(ur.xpath(), "Physics/Bengali-Medium/UR");
        assert_eq!(ur.content, "b\nc");
    }

    #[test]
    fn ranges_cover_document_in_page_order() {
        let forest = vec![
            node("C", Some(5), vec![]),
            node("A", Some(1), vec![node("B", Some(3), vec![])]),
        ];
        let pages: Vec<String> = (0..7).map(|i| format!("p{i}")).collect();
        let sections = flatten(&forest, 7, &pages, SharedPagePolicy::Empty).unwrap();
        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, ["A", "B", "C"]);

        let ranges: Vec<Range<usize>> = sections.iter().filter_map(|s| s.range.clone()).collect();
        assert_eq!(ranges, [0..2, 2..4, 4..7]);
        assert_eq!(sections[0].content, "p0\np1");
        assert_eq!(sections[2].content, "p4\np5\np6");
    }

    #[test]
    fn coverage_has_no_gaps_or_overlaps() {
        let cases: Vec<Vec<Option<u32>>> = vec![
            vec![Some(1), Some(2), Some(2), Some(4), Some(9)],
            vec![Some(1), Some(1), Some(1)],
            vec![Some(1), Some(3), None, None],
            vec![Some(2), Some(6), Some(10)],
        ];
        for pages in cases {
            let ranges = page_ranges(&pages, 10, SharedPagePolicy::Empty);
            let resolved: Vec<Range<usize>> = ranges.into_iter().flatten().collect();
            for pair in resolved.windows(2) {
                assert_eq!(pair[0].end, pair[1].start, "gap or overlap in {pages:?}");
            }
            assert_eq!(resolved.last().unwrap().end, 10);
        }
    }

    #[test]
    fn extend_policy_ranges() {
        let pages = [Some(1), Some(2), Some(2), Some(4)];
        let ranges = page_ranges(&pages, 6, SharedPagePolicy::Extend);
        assert_eq!(ranges, vec![Some(0..1), Some(1..3), Some(1..3), Some(3..6)]);
    }

    #[test]
    fn unresolved_pages_sort_last_with_empty_content() {
        let forest = vec![
            node("Lost", None, vec![]),
            node("Zero", Some(0), vec![]),
            node("Found", Some(2), vec![]),
        ];
        let pages = vec!["cover", "body"];
        let sections = flatten(&forest, 2, &pages, SharedPagePolicy::Empty).unwrap();
        assert_eq!(sections[0].title, "Found");
        assert_eq!(sections[0].range, Some(1..2));
        assert_eq!(sections[0].content, "body");
        for s in &sections[1..] {
            assert_eq!(s.range, None);
            assert!(s.content.is_empty());
        }
    }

    #[test]
    fn successor_without_page_extends_to_eof() {
        let ranges = page_ranges(&[Some(2), None], 5, SharedPagePolicy::Empty);
        assert_eq!(ranges, vec![Some(1..5), None]);
    }

    #[test]
    fn page_past_end_is_rejected() {
        let forest = vec![node("Ghost", Some(4), vec![])];
        let pages = vec!["a", "b", "c"];
        let err = flatten(&forest, 3, &pages, SharedPagePolicy::Empty).unwrap_err();
        assert!(matches!(err, ExtractError::PageOutOfRange { page: 4, .. }));
    }

    #[test]
    fn missing_page_text_is_fatal() {
        let forest = vec![node("Short", Some(1), vec![])];
        let pages = vec!["only"];
        let err = flatten(&forest, 3, &pages, SharedPagePolicy::Empty).unwrap_err();
        assert!(matches!(err, ExtractError::PageUnavailable { index: 1, .. }));
    }

    #[test]
    fn section_tree_round_trips_paths_and_content() {
        let forest = physics_forest();
        let pages = physics_pages();
        let sections = flatten(&forest, 3, &pages, SharedPagePolicy::Empty).unwrap();
        let tree = section_tree(&forest, &sections);
        assert_eq!(tree[0].content, "");
        assert_eq!(tree[0].children[0].content, pages[0]);

        let json = serde_json::to_string(&tree).unwrap();
        assert!(json.starts_with(r#"[{"title":"Physics","page":1,"children":"#));
        let back: Vec<SectionNode> = serde_json::from_str(&json).unwrap();
        let rebuilt = sections_from_tree(&back);
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt[1].xpath(), "Male");
        assert_eq!(rebuilt[1].content, sections[1].content);
    }

    #[test]
    fn tree_sections_come_back_in_page_order() {
        let forest = vec![
            node("Late", Some(3), vec![node("Lost", None, vec![])]),
            node("Early", Some(1), vec![]),
        ];
        let pages = vec!["a", "b", "c"];
        let sections = flatten(&forest, 3, &pages, SharedPagePolicy::Empty).unwrap();
        let rebuilt = sections_from_tree(&section_tree(&forest, &sections));

        let titles = |s: &[Section]| s.iter().map(|s| s.title.clone()).collect::<Vec<_>>();
        assert_eq!(titles(&rebuilt), ["Early", "Late", "Lost"]);
        assert_eq!(titles(&rebuilt), titles(&sections));
        assert_eq!(rebuilt[0].order, 2);
        assert_eq!(rebuilt[1].content, "c");
    }

    #[test]
    fn outline_json_tolerates_missing_fields() {
        let forest: Vec<OutlineNode> =
            serde_json::from_str(r#"[{"title":"Root","children":[{"title":"Leaf","page":3}]}]"#).unwrap();
        assert_eq!(forest[0].page, None);
        assert_eq!(forest[0].children[0].page, Some(3));
        assert!(forest[0].children[0].children.is_empty());
    }
}
