//! Route construction, indexing, and navigation.
//!
//! A [`Route`] is the flattened, ordered traversal plan of a test: one
//! [`RouteItem`] per item occurrence, in document order, with each
//! section's selection and ordering policy applied during flattening.
//!
//! The route owns its items arena-style -- a plain vector -- and the
//! four lookup indices (category, section, test part, item reference)
//! hold integer positions into it. Indices are maintained eagerly on
//! every append so they can never drift from the sequence.

use proctor_core::test::{
    AssessmentItemRef, AssessmentSection, AssessmentTest, SectionPart, TestPart,
};
use proctor_core::types::{NavigationMode, SubmissionMode};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::RuntimeError;

/// One item occurrence in the route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteItem {
    pub item_ref: AssessmentItemRef,
    /// Enclosing section identifiers, innermost first.
    pub sections: Vec<String>,
    pub test_part: String,
    pub navigation_mode: NavigationMode,
    pub submission_mode: SubmissionMode,
    /// 0-based occurrence index of this item reference in the route.
    pub occurrence: usize,
}

impl RouteItem {
    /// Innermost enclosing section.
    pub fn section(&self) -> Option<&str> {
        self.sections.first().map(String::as_str)
    }
}

/// The flattened, indexed traversal plan with a single cursor.
#[derive(Debug, Clone, Default)]
pub struct Route {
    items: Vec<RouteItem>,
    position: usize,
    by_category: BTreeMap<String, Vec<usize>>,
    by_section: BTreeMap<String, Vec<usize>>,
    by_test_part: BTreeMap<String, Vec<usize>>,
    by_item: BTreeMap<String, Vec<usize>>,
    categories: BTreeSet<String>,
}

impl Route {
    pub fn new() -> Route {
        Route::default()
    }

    /// Flatten a test into a route, with entropy-seeded selection and
    /// ordering.
    pub fn from_test(test: &AssessmentTest) -> Route {
        Route::flatten(test, &mut StdRng::from_entropy())
    }

    /// Flatten a test with pinned randomness, for reproducible routes.
    pub fn from_test_seeded(test: &AssessmentTest, seed: u64) -> Route {
        Route::flatten(test, &mut StdRng::seed_from_u64(seed))
    }

    fn flatten(test: &AssessmentTest, rng: &mut StdRng) -> Route {
        let mut route = Route::new();
        for part in &test.test_parts {
            for section in &part.sections {
                flatten_section(section, &mut Vec::new(), part, &mut route, rng);
            }
        }
        route
    }

    /// Append an occurrence, assigning its occurrence index and
    /// updating every lookup index.
    pub fn add_route_item(
        &mut self,
        item_ref: AssessmentItemRef,
        sections: Vec<String>,
        test_part: &TestPart,
    ) {
        let position = self.items.len();
        let occurrences = self.by_item.entry(item_ref.identifier.clone()).or_default();
        let occurrence = occurrences.len();
        occurrences.push(position);

        for category in &item_ref.categories {
            self.by_category
                .entry(category.clone())
                .or_default()
                .push(position);
            self.categories.insert(category.clone());
        }
        for section in &sections {
            self.by_section
                .entry(section.clone())
                .or_default()
                .push(position);
        }
        self.by_test_part
            .entry(test_part.identifier.clone())
            .or_default()
            .push(position);

        self.items.push(RouteItem {
            item_ref,
            sections,
            test_part: test_part.identifier.clone(),
            navigation_mode: test_part.navigation_mode,
            submission_mode: test_part.submission_mode,
            occurrence,
        });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Whether the cursor still points at a route item.
    pub fn valid(&self) -> bool {
        self.position < self.items.len()
    }

    pub fn current(&self) -> Option<&RouteItem> {
        self.items.get(self.position)
    }

    pub fn route_item_at(&self, position: usize) -> Option<&RouteItem> {
        self.items.get(position)
    }

    pub fn items(&self) -> &[RouteItem] {
        &self.items
    }

    /// Advance one position. Past the last item the cursor becomes
    /// invalid; it does not wrap.
    pub fn next(&mut self) {
        if self.position < self.items.len() {
            self.position += 1;
        }
    }

    /// Step back one position; the first item stays put.
    pub fn previous(&mut self) {
        if self.position > 0 {
            self.position -= 1;
        }
    }

    pub fn is_first(&self) -> bool {
        self.position == 0
    }

    pub fn is_last(&self) -> bool {
        self.position + 1 == self.items.len()
    }

    /// Whether the current item is the first of its test part, derived
    /// from comparing the previous item's test part.
    pub fn is_first_of_test_part(&self) -> bool {
        match self.current() {
            None => false,
            Some(current) => match self.position.checked_sub(1) {
                None => true,
                Some(previous) => self.items[previous].test_part != current.test_part,
            },
        }
    }

    /// Whether the current item is the last of its test part, derived
    /// from comparing the next item's test part.
    pub fn is_last_of_test_part(&self) -> bool {
        match self.current() {
            None => false,
            Some(current) => match self.items.get(self.position + 1) {
                None => true,
                Some(next) => next.test_part != current.test_part,
            },
        }
    }

    pub fn is_navigation_linear(&self) -> bool {
        self.current()
            .map(|item| item.navigation_mode == NavigationMode::Linear)
            .unwrap_or(false)
    }

    pub fn is_submission_individual(&self) -> bool {
        self.current()
            .map(|item| item.submission_mode == SubmissionMode::Individual)
            .unwrap_or(false)
    }

    /// The identifier of each occurrence in traversal order, optionally
    /// suffixed with its 1-based occurrence number (`identifier.N`).
    pub fn identifier_sequence(&self, with_occurrence: bool) -> Vec<String> {
        self.items
            .iter()
            .map(|item| {
                if with_occurrence {
                    format!("{}.{}", item.item_ref.identifier, item.occurrence + 1)
                } else {
                    item.item_ref.identifier.clone()
                }
            })
            .collect()
    }

    /// All item categories involved in the route.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(String::as_str)
    }

    /// The number of occurrences of an item reference; 0 when the item
    /// is not in the route.
    pub fn occurrence_count(&self, item_identifier: &str) -> usize {
        self.by_item
            .get(item_identifier)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Distinct item references under a category, in route order.
    pub fn item_refs_by_category(&self, category: &str) -> Vec<&AssessmentItemRef> {
        self.distinct_refs(self.by_category.get(category))
    }

    /// Distinct item references under a section, in route order.
    pub fn item_refs_by_section(&self, section: &str) -> Vec<&AssessmentItemRef> {
        self.distinct_refs(self.by_section.get(section))
    }

    /// Distinct item references of a section (or the whole route),
    /// filtered by category inclusion or exclusion. Include and exclude
    /// are mutually exclusive per call; include takes precedence when
    /// both are given.
    pub fn item_refs_subset(
        &self,
        section: Option<&str>,
        include_categories: &[String],
        exclude_categories: &[String],
    ) -> Vec<&AssessmentItemRef> {
        let scoped: Vec<&AssessmentItemRef> = match section {
            Some(section) => self.item_refs_by_section(section),
            None => self.distinct_refs_all(),
        };
        if !include_categories.is_empty() {
            scoped
                .into_iter()
                .filter(|r| r.categories.iter().any(|c| include_categories.contains(c)))
                .collect()
        } else if !exclude_categories.is_empty() {
            scoped
                .into_iter()
                .filter(|r| !r.categories.iter().any(|c| exclude_categories.contains(c)))
                .collect()
        } else {
            scoped
        }
    }

    fn distinct_refs(&self, positions: Option<&Vec<usize>>) -> Vec<&AssessmentItemRef> {
        let mut seen = BTreeSet::new();
        let mut refs = Vec::new();
        for &position in positions.into_iter().flatten() {
            let item_ref = &self.items[position].item_ref;
            if seen.insert(item_ref.identifier.as_str()) {
                refs.push(item_ref);
            }
        }
        refs
    }

    fn distinct_refs_all(&self) -> Vec<&AssessmentItemRef> {
        let mut seen = BTreeSet::new();
        let mut refs = Vec::new();
        for item in &self.items {
            if seen.insert(item.item_ref.identifier.as_str()) {
                refs.push(&item.item_ref);
            }
        }
        refs
    }

    /// Jump to a named item occurrence, section, or test part.
    ///
    /// Resolution order: item reference (optionally `identifier.N` for
    /// occurrence N), then section, then test part. An item or section
    /// living in a different test part than the current position is an
    /// invalid target: the cursor advances one step instead, per the
    /// controlling standard's documented fallback. An identifier that
    /// resolves to nothing fails with BranchTargetError.
    pub fn branch(&mut self, identifier: &str) -> Result<(), RuntimeError> {
        let (id, occurrence) = parse_branch_target(identifier)?;
        let current_part = self
            .current()
            .map(|item| item.test_part.clone())
            .ok_or_else(|| RuntimeError::BranchTarget {
                identifier: identifier.to_string(),
            })?;

        if let Some(positions) = self.by_item.get(id) {
            let &target = positions.get(occurrence).ok_or_else(|| {
                RuntimeError::BranchTarget {
                    identifier: identifier.to_string(),
                }
            })?;
            if self.items[target].test_part != current_part {
                self.next();
                return Ok(());
            }
            self.position = target;
            return Ok(());
        }

        if let Some(positions) = self.by_section.get(id) {
            let target = positions[0];
            if self.items[target].test_part != current_part {
                self.next();
                return Ok(());
            }
            self.position = target;
            return Ok(());
        }

        if let Some(positions) = self.by_test_part.get(id) {
            self.position = positions[0];
            return Ok(());
        }

        Err(RuntimeError::BranchTarget {
            identifier: identifier.to_string(),
        })
    }
}

/// Split a branch target into identifier and 0-based occurrence index:
/// `Q01` addresses occurrence 0, `Q01.2` addresses occurrence 1.
fn parse_branch_target(identifier: &str) -> Result<(&str, usize), RuntimeError> {
    let invalid = || RuntimeError::BranchTarget {
        identifier: identifier.to_string(),
    };
    match identifier.split_once('.') {
        None => {
            if identifier.is_empty() {
                Err(invalid())
            } else {
                Ok((identifier, 0))
            }
        }
        Some((id, occurrence)) => {
            if id.is_empty() {
                return Err(invalid());
            }
            let n: usize = occurrence.parse().map_err(|_| invalid())?;
            if n == 0 {
                return Err(invalid());
            }
            Ok((id, n - 1))
        }
    }
}

/// Flatten one section into the route, applying its selection and
/// ordering policy, then recursing into child sections.
fn flatten_section(
    section: &AssessmentSection,
    enclosing: &mut Vec<String>,
    test_part: &TestPart,
    route: &mut Route,
    rng: &mut StdRng,
) {
    let children = arrange_children(section, rng);
    enclosing.insert(0, section.identifier.clone());
    for child in children {
        match child {
            SectionPart::ItemRef(item_ref) => {
                route.add_route_item(item_ref, enclosing.clone(), test_part);
            }
            SectionPart::Section(child_section) => {
                flatten_section(&child_section, enclosing, test_part, route, rng);
            }
        }
    }
    enclosing.remove(0);
}

/// Apply a section's selection (with or without replacement) and
/// ordering (shuffle, honoring fixed children) to its child list.
fn arrange_children(section: &AssessmentSection, rng: &mut StdRng) -> Vec<SectionPart> {
    if section.parts.is_empty() {
        return Vec::new();
    }
    let mut children: Vec<SectionPart> = match section.selection {
        Some(selection) if selection.with_replacement => (0..selection.select)
            .map(|_| section.parts[rng.gen_range(0..section.parts.len())].clone())
            .collect(),
        Some(selection) => {
            let mut indices: Vec<usize> = (0..section.parts.len()).collect();
            indices.shuffle(rng);
            let mut picked: Vec<usize> =
                indices.into_iter().take(selection.select.min(section.parts.len())).collect();
            // Document order is preserved for the survivors.
            picked.sort_unstable();
            picked.into_iter().map(|i| section.parts[i].clone()).collect()
        }
        None => section.parts.clone(),
    };

    if section.ordering.map(|o| o.shuffle).unwrap_or(false) {
        shuffle_keeping_fixed(&mut children, rng);
    }
    children
}

/// Shuffle the movable children among themselves; children marked
/// fixed keep their positions.
fn shuffle_keeping_fixed(children: &mut [SectionPart], rng: &mut StdRng) {
    let is_fixed = |part: &SectionPart| match part {
        SectionPart::ItemRef(item_ref) => item_ref.fixed,
        SectionPart::Section(_) => false,
    };
    let movable_slots: Vec<usize> = (0..children.len())
        .filter(|&i| !is_fixed(&children[i]))
        .collect();
    let mut movable: Vec<SectionPart> = movable_slots
        .iter()
        .map(|&i| children[i].clone())
        .collect();
    movable.shuffle(rng);
    for (slot, part) in movable_slots.into_iter().zip(movable) {
        children[slot] = part;
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_core::test::{Ordering, Selection};

    fn item_ref(id: &str, categories: &[&str]) -> AssessmentItemRef {
        AssessmentItemRef::new(id, format!("{}.xml", id.to_lowercase()))
            .with_categories(categories.iter().map(|c| c.to_string()).collect())
    }

    /// Two test parts; P1 has a nested section and a repeated item.
    fn fixture_test() -> AssessmentTest {
        let inner = AssessmentSection::new("S1a", "Inner").with_parts(vec![
            SectionPart::ItemRef(item_ref("Q03", &["math"])),
        ]);
        let s1 = AssessmentSection::new("S1", "First").with_parts(vec![
            SectionPart::ItemRef(item_ref("Q01", &["math"])),
            SectionPart::ItemRef(item_ref("Q02", &["reading"])),
            SectionPart::Section(inner),
            SectionPart::ItemRef(item_ref("Q01", &["math"])),
        ]);
        let s2 = AssessmentSection::new("S2", "Second").with_parts(vec![
            SectionPart::ItemRef(item_ref("Q04", &["reading"])),
            SectionPart::ItemRef(item_ref("Q05", &[])),
        ]);
        AssessmentTest::new("T1", "Fixture").with_parts(vec![
            TestPart::new("P1", NavigationMode::Linear, SubmissionMode::Individual)
                .with_sections(vec![s1]),
            TestPart::new("P2", NavigationMode::NonLinear, SubmissionMode::Simultaneous)
                .with_sections(vec![s2]),
        ])
    }

    #[test]
    fn occurrence_indices_are_contiguous_in_insertion_order() {
        let route = Route::from_test_seeded(&fixture_test(), 3);
        let occurrences: Vec<usize> = route
            .items()
            .iter()
            .filter(|item| item.item_ref.identifier == "Q01")
            .map(|item| item.occurrence)
            .collect();
        assert_eq!(occurrences, vec![0, 1]);
        assert_eq!(route.occurrence_count("Q01"), 2);
        assert_eq!(route.occurrence_count("Q05"), 1);
        assert_eq!(route.occurrence_count("GHOST"), 0);
    }

    #[test]
    fn identifier_sequence_renders_occurrence_suffixes() {
        let route = Route::from_test_seeded(&fixture_test(), 3);
        assert_eq!(
            route.identifier_sequence(true),
            vec!["Q01.1", "Q02.1", "Q03.1", "Q01.2", "Q04.1", "Q05.1"]
        );
        assert_eq!(
            route.identifier_sequence(false),
            vec!["Q01", "Q02", "Q03", "Q01", "Q04", "Q05"]
        );
    }

    #[test]
    fn section_chain_tracks_nesting_innermost_first() {
        let route = Route::from_test_seeded(&fixture_test(), 3);
        let q03 = &route.items()[2];
        assert_eq!(q03.item_ref.identifier, "Q03");
        assert_eq!(q03.sections, vec!["S1a".to_string(), "S1".to_string()]);
        assert_eq!(q03.test_part, "P1");
    }

    #[test]
    fn indices_answer_section_and_category_queries() {
        let route = Route::from_test_seeded(&fixture_test(), 3);
        fn ids(refs: Vec<&AssessmentItemRef>) -> Vec<&str> {
            refs.iter().map(|r| r.identifier.as_str()).collect::<Vec<_>>()
        }
        assert_eq!(ids(route.item_refs_by_section("S1")), vec!["Q01", "Q02", "Q03"]);
        assert_eq!(ids(route.item_refs_by_section("S1a")), vec!["Q03"]);
        assert_eq!(ids(route.item_refs_by_category("math")), vec!["Q01", "Q03"]);
        assert_eq!(
            route.categories().collect::<Vec<_>>(),
            vec!["math", "reading"]
        );
    }

    #[test]
    fn subset_include_and_exclude() {
        let route = Route::from_test_seeded(&fixture_test(), 3);
        fn ids(refs: Vec<&AssessmentItemRef>) -> Vec<&str> {
            refs.iter().map(|r| r.identifier.as_str()).collect::<Vec<_>>()
        }
        assert_eq!(
            ids(route.item_refs_subset(Some("S1"), &["math".to_string()], &[])),
            vec!["Q01", "Q03"]
        );
        assert_eq!(
            ids(route.item_refs_subset(None, &[], &["math".to_string()])),
            vec!["Q02", "Q04", "Q05"]
        );
        assert_eq!(
            ids(route.item_refs_subset(None, &[], &[])),
            vec!["Q01", "Q02", "Q03", "Q04", "Q05"]
        );
    }

    #[test]
    fn cursor_movement_and_boundaries() {
        let mut route = Route::from_test_seeded(&fixture_test(), 3);
        assert!(route.is_first());
        assert!(route.is_first_of_test_part());
        assert!(!route.is_last_of_test_part());
        assert!(route.is_navigation_linear());
        assert!(route.is_submission_individual());

        // Move to Q01.2, the last item of P1.
        for _ in 0..3 {
            route.next();
        }
        assert!(route.is_last_of_test_part());
        assert!(!route.is_last());

        route.next();
        assert_eq!(route.current().unwrap().item_ref.identifier, "Q04");
        assert!(route.is_first_of_test_part());
        assert!(!route.is_navigation_linear());
        assert!(!route.is_submission_individual());

        route.previous();
        assert_eq!(route.current().unwrap().item_ref.identifier, "Q01");

        // previous() saturates at the first item.
        for _ in 0..10 {
            route.previous();
        }
        assert!(route.is_first());

        // next() past the end invalidates the cursor.
        for _ in 0..10 {
            route.next();
        }
        assert!(!route.valid());
        assert!(route.current().is_none());
    }

    #[test]
    fn branch_to_item_section_and_test_part() {
        let mut route = Route::from_test_seeded(&fixture_test(), 3);
        route.branch("Q01.2").unwrap();
        assert_eq!(route.position(), 3);

        route.branch("S1a").unwrap();
        assert_eq!(route.current().unwrap().item_ref.identifier, "Q03");

        // Test parts are reachable from anywhere.
        route.branch("P2").unwrap();
        assert_eq!(route.current().unwrap().item_ref.identifier, "Q04");
    }

    #[test]
    fn branch_across_test_parts_advances_one_step_instead() {
        let mut route = Route::from_test_seeded(&fixture_test(), 3);
        // Q04 lives in P2; from P1 the target is invalid and the cursor
        // just moves forward one position.
        route.branch("Q04").unwrap();
        assert_eq!(route.position(), 1);
        assert_eq!(route.current().unwrap().item_ref.identifier, "Q02");

        route.branch("S2").unwrap();
        assert_eq!(route.position(), 2);
    }

    #[test]
    fn branch_to_nothing_is_an_error() {
        let mut route = Route::from_test_seeded(&fixture_test(), 3);
        let err = route.branch("GHOST").unwrap_err();
        assert_eq!(err, RuntimeError::BranchTarget { identifier: "GHOST".to_string() });
        // Out-of-range occurrence.
        let err = route.branch("Q01.9").unwrap_err();
        assert!(matches!(err, RuntimeError::BranchTarget { .. }));
        // Malformed occurrence suffix.
        assert!(route.branch("Q01.0").is_err());
        assert!(route.branch("Q01.x").is_err());
    }

    #[test]
    fn selection_with_replacement_repeats_occurrences() {
        let section = AssessmentSection::new("S1", "Pool").with_parts(vec![
            SectionPart::ItemRef(item_ref("Q01", &[])),
            SectionPart::ItemRef(item_ref("Q02", &[])),
        ]);
        let mut section = section;
        section.selection = Some(Selection { select: 5, with_replacement: true });
        let test = AssessmentTest::new("T", "Selection").with_parts(vec![TestPart::new(
            "P1",
            NavigationMode::Linear,
            SubmissionMode::Individual,
        )
        .with_sections(vec![section])]);

        let route = Route::from_test_seeded(&test, 17);
        assert_eq!(route.len(), 5);
        // Occurrence indices stay contiguous per item reference.
        for id in ["Q01", "Q02"] {
            let occurrences: Vec<usize> = route
                .items()
                .iter()
                .filter(|item| item.item_ref.identifier == id)
                .map(|item| item.occurrence)
                .collect();
            let expected: Vec<usize> = (0..occurrences.len()).collect();
            assert_eq!(occurrences, expected);
        }
    }

    #[test]
    fn shuffle_keeps_fixed_items_in_place() {
        let mut fixed_ref = item_ref("ANCHOR", &[]);
        fixed_ref.fixed = true;
        let mut section = AssessmentSection::new("S1", "Shuffled").with_parts(vec![
            SectionPart::ItemRef(fixed_ref),
            SectionPart::ItemRef(item_ref("Q01", &[])),
            SectionPart::ItemRef(item_ref("Q02", &[])),
            SectionPart::ItemRef(item_ref("Q03", &[])),
        ]);
        section.ordering = Some(Ordering { shuffle: true });
        let test = AssessmentTest::new("T", "Shuffle").with_parts(vec![TestPart::new(
            "P1",
            NavigationMode::Linear,
            SubmissionMode::Individual,
        )
        .with_sections(vec![section])]);

        for seed in 0..20 {
            let route = Route::from_test_seeded(&test, seed);
            assert_eq!(route.items()[0].item_ref.identifier, "ANCHOR");
            assert_eq!(route.len(), 4);
        }
    }

    #[test]
    fn seeded_flattening_is_reproducible() {
        let mut section = AssessmentSection::new("S1", "Shuffled").with_parts(vec![
            SectionPart::ItemRef(item_ref("Q01", &[])),
            SectionPart::ItemRef(item_ref("Q02", &[])),
            SectionPart::ItemRef(item_ref("Q03", &[])),
        ]);
        section.ordering = Some(Ordering { shuffle: true });
        let test = AssessmentTest::new("T", "Shuffle").with_parts(vec![TestPart::new(
            "P1",
            NavigationMode::Linear,
            SubmissionMode::Individual,
        )
        .with_sections(vec![section])]);

        let a = Route::from_test_seeded(&test, 5);
        let b = Route::from_test_seeded(&test, 5);
        assert_eq!(a.identifier_sequence(true), b.identifier_sequence(true));
    }
}
