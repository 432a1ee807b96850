#![forbid(unsafe_code)]

//! Property tests for locator name suggestion.
//!
//! - arbitrary input never panics
//! - the suggestion is the last path segment
//! - the source group is a prefix ending in `/` and followed by the suggestion,
//!   or the whole locator when the path has no `/`

use proptest::prelude::*;
use strata_core::{NameSuggester, PathNameSuggester};

fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9_]{1,8}"
}

fn scheme() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["precomputed", "n5", "zarr", "gs", "https"]).prop_map(String::from)
}

proptest! {
    #[test]
    fn arbitrary_input_never_panics(input in ".{0,40}") {
        let s = PathNameSuggester;
        let _ = s.suggest_name(&input);
        if let Ok(offset) = s.find_source_group(&input) {
            prop_assert!(input.is_char_boundary(offset));
        }
    }

    #[test]
    fn suggestion_is_last_segment(
        schemes in prop::collection::vec(scheme(), 1..3),
        segments in prop::collection::vec(segment(), 1..5),
        trailing_slash in any::<bool>(),
    ) {
        let mut locator: String = schemes.iter().map(|s| format!("{s}://")).collect();
        locator.push_str(&segments.join("/"));
        if trailing_slash {
            locator.push('/');
        }

        let s = PathNameSuggester;
        let last = segments.last().cloned().unwrap_or_default();
        prop_assert_eq!(s.suggest_name(&locator).unwrap(), last.clone());

        let group = s.find_source_group(&locator).unwrap();
        if segments.len() == 1 && !trailing_slash {
            prop_assert_eq!(group, locator.len());
        } else if !trailing_slash {
            let (prefix, rest) = locator.split_at(group);
            prop_assert!(prefix.ends_with('/'));
            prop_assert_eq!(rest, last.as_str());
        }
    }
}
