//! Identifier resolution over brain structures.
//!
//! Hosts resolve a user-typed identifier to a brain by title: exact matches
//! first, then fuzzy scoring. Multiple equally good candidates are reported
//! as [`Resolution::Multiple`], never silently disambiguated.

use brain_event::BrainStructure;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

/// Outcome of resolving an identifier against a set of brains.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing matched.
    None,
    /// Exactly one match: the brain's title.
    Unique(String),
    /// Several candidates matched equally well, best first by declaration
    /// order; the caller must disambiguate.
    Multiple(Vec<String>),
}

/// Resolves `id` against the given structures by title.
///
/// Case-sensitive exact match wins outright; then case-insensitive exact;
/// then the best fuzzy score (SkimMatcherV2). Ties at any stage are reported
/// as `Multiple`.
pub fn resolve<'a, I>(structures: I, id: &str) -> Resolution
where
    I: IntoIterator<Item = &'a BrainStructure>,
{
    let titles: Vec<&str> = structures.into_iter().map(|s| s.title.as_str()).collect();

    let exact: Vec<&str> = titles.iter().copied().filter(|t| *t == id).collect();
    if let Some(resolution) = from_candidates(&exact) {
        return resolution;
    }

    let id_lower = id.to_lowercase();
    let exact_ci: Vec<&str> = titles
        .iter()
        .copied()
        .filter(|t| t.to_lowercase() == id_lower)
        .collect();
    if let Some(resolution) = from_candidates(&exact_ci) {
        return resolution;
    }

    let matcher = SkimMatcherV2::default();
    let mut best_score = i64::MIN;
    let mut best: Vec<&str> = Vec::new();
    for title in &titles {
        if let Some(score) = matcher.fuzzy_match(title, id) {
            if score > best_score {
                best_score = score;
                best = vec![title];
            } else if score == best_score {
                best.push(title);
            }
        }
    }
    from_candidates(&best).unwrap_or(Resolution::None)
}

fn from_candidates(candidates: &[&str]) -> Option<Resolution> {
    match candidates {
        [] => None,
        [one] => Some(Resolution::Unique((*one).to_string())),
        many => Some(Resolution::Multiple(
            many.iter().map(|t| (*t).to_string()).collect(),
        )),
    }
}
