use proptest::prelude::*;

use voxsplit::segmenter::Segmenter;
use voxsplit::tags::strip_comments;
use voxsplit::validator::validate;

proptest! {
    #[test]
    fn strip_comments_is_idempotent(
        chunks in prop::collection::vec("[a-zA-Z0-9 .,]{0,12}", 1..6),
        comments in prop::collection::vec("[a-zA-Z0-9 ]{1,10}", 0..4),
    ) {
        // Interleave plain text with comment tags.
        let mut input = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            input.push_str(chunk);
            if let Some(body) = comments.get(i) {
                if i % 2 == 0 {
                    input.push_str(&format!("<comment={}>", body));
                } else {
                    input.push_str(&format!("<comment=\"{}\">", body));
                }
            }
        }

        let once = strip_comments(&input);
        prop_assert_eq!(strip_comments(&once), once.clone());
        prop_assert!(!once.to_lowercase().contains("<comment="));
    }

    #[test]
    fn no_split_means_one_group(text in "[a-zA-Z0-9 .,!?]{1,60}") {
        let out = Segmenter::default().segment(&text);
        prop_assert!(out.segments.iter().all(|s| s.split_index == 1));
    }

    #[test]
    fn group_count_matches_nonblank_parts(
        parts in prop::collection::vec("[a-zA-Z ]{0,12}", 1..8),
    ) {
        let text = parts.join("<split>");
        let out = Segmenter::default().segment(&text);

        let nonblank = parts.iter().filter(|p| !p.trim().is_empty()).count();
        let mut groups: Vec<u32> = out.segments.iter().map(|s| s.split_index).collect();
        groups.dedup();

        if nonblank == 0 {
            // Whole-document-empty fallback: exactly one default segment.
            prop_assert_eq!(out.segments.len(), 1);
            prop_assert_eq!(out.segments[0].split_index, 1);
        } else {
            prop_assert_eq!(groups.len(), nonblank);
        }
    }

    #[test]
    fn segmentation_never_panics(text in ".{0,200}") {
        let _ = Segmenter::default().segment(&text);
    }

    #[test]
    fn validation_never_panics(text in ".{0,200}") {
        let _ = validate(&text);
    }

    #[test]
    fn matched_pairs_validate_and_one_missing_closer_is_caught(
        names in prop::collection::vec(
            prop::sample::select(vec!["speak", "emphasis", "prosody", "p", "s", "voice"]),
            1..6,
        ),
        drop_seed in any::<prop::sample::Index>(),
    ) {
        let full: String = names
            .iter()
            .map(|n| format!("<{}>hi</{}>", n, n))
            .collect();
        let result = validate(&full);
        prop_assert!(result.is_valid);
        prop_assert!(result.errors.is_empty());

        // Remove one closing tag: exactly one error, naming that opener.
        let drop_at = drop_seed.index(names.len());
        let broken: String = names
            .iter()
            .enumerate()
            .map(|(i, n)| {
                if i == drop_at {
                    format!("<{}>hi", n)
                } else {
                    format!("<{}>hi</{}>", n, n)
                }
            })
            .collect();

        let result = validate(&broken);
        prop_assert_eq!(result.errors.len(), 1);
        prop_assert!(result.errors[0].message.contains("Unclosed"));
        prop_assert!(result.errors[0].message.contains(names[drop_at]));
    }
}
