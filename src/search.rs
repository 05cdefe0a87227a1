//! Stateless substring search over a [`CatalogIndex`].
//!
//! Every call is independent: the engine keeps no cache and no notion of the
//! previous query, so overlapping or rapidly changing queries simply produce
//! independent results. Debouncing and discarding stale results belong to the
//! caller.

use crate::catalog::CatalogIndex;
use crate::models::Song;

/// A piece of text produced by [`highlight`], flagged when it matched the
/// query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightSpan {
    pub text: String,
    pub is_match: bool,
}

/// Return the songs matching `query` in catalog order.
///
/// A blank query returns the whole catalog. Otherwise a song matches when the
/// query, exactly as typed, occurs ignoring case in its title, composer, key,
/// or any of its tags. Surrounding spaces are part of the query.
pub fn search(index: &CatalogIndex, query: &str) -> Vec<Song> {
    if query.trim().is_empty() {
        return index.all_songs().to_vec();
    }

    index
        .all_songs()
        .iter()
        .filter(|song| matches_song(song, query))
        .cloned()
        .collect()
}

fn matches_song(song: &Song, query: &str) -> bool {
    contains_ignore_case(song.title(), query)
        || contains_ignore_case(song.composer(), query)
        || song
            .key()
            .is_some_and(|key| contains_ignore_case(key, query))
        || song
            .tags()
            .iter()
            .any(|tag| contains_ignore_case(tag, query))
}

/// Split `text` into spans around every case-insensitive occurrence of
/// `query`. Concatenating the span texts gives back `text` unchanged.
pub fn highlight(text: &str, query: &str) -> Vec<HighlightSpan> {
    if text.is_empty() {
        return Vec::new();
    }
    if query.trim().is_empty() {
        return vec![HighlightSpan {
            text: text.to_string(),
            is_match: false,
        }];
    }

    let mut spans = Vec::new();
    let mut cursor = 0;
    while let Some((start, end)) = find_ignore_case(text, query, cursor) {
        if start > cursor {
            spans.push(HighlightSpan {
                text: text[cursor..start].to_string(),
                is_match: false,
            });
        }
        spans.push(HighlightSpan {
            text: text[start..end].to_string(),
            is_match: true,
        });
        cursor = end;
    }
    if cursor < text.len() {
        spans.push(HighlightSpan {
            text: text[cursor..].to_string(),
            is_match: false,
        });
    }
    spans
}

pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    find_ignore_case(haystack, needle, 0).is_some()
}

/// Byte range of the first case-insensitive occurrence of `needle` in
/// `haystack` at or after byte offset `from`. Comparison is per character so
/// the returned range always lies on char boundaries of `haystack`.
fn find_ignore_case(haystack: &str, needle: &str, from: usize) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    let tail = haystack.get(from..)?;

    for (offset, _) in tail.char_indices() {
        let start = from + offset;
        let mut candidate = haystack[start..].char_indices();
        let mut end = start;
        let mut matched = true;
        for expected in needle.chars() {
            match candidate.next() {
                Some((idx, actual)) if chars_eq_ignore_case(actual, expected) => {
                    end = start + idx + actual.len_utf8();
                }
                _ => {
                    matched = false;
                    break;
                }
            }
        }
        if matched {
            return Some((start, end));
        }
    }
    None
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::load::sample_index;

    fn ids(songs: &[Song]) -> Vec<&str> {
        songs.iter().map(Song::id).collect()
    }

    #[test]
    fn blank_query_returns_catalog_order() {
        let index = sample_index();
        assert_eq!(search(&index, ""), index.all_songs());
        assert_eq!(search(&index, "   \t"), index.all_songs());
    }

    #[test]
    fn matches_composer_only_song() {
        let index = sample_index();
        assert_eq!(ids(&search(&index, "kosma")), vec!["autumn-leaves"]);
        assert!(search(&index, "xyz").is_empty());
    }

    #[test]
    fn search_is_case_insensitive() {
        let index = sample_index();
        let upper = search(&index, "BLUE");
        assert_eq!(upper, search(&index, "blue"));
        assert_eq!(ids(&upper), vec!["blue-bossa", "blue-monk"]);
    }

    #[test]
    fn matches_keys_and_tags() {
        let index = sample_index();
        assert_eq!(ids(&search(&index, "ebm")), vec!["take-five"]);
        let latin = search(&index, "LATIN");
        assert_eq!(
            ids(&latin),
            vec!["blue-bossa", "girl-from-ipanema", "night-in-tunisia"]
        );
    }

    #[test]
    fn results_are_a_subset_in_catalog_order() {
        let index = sample_index();
        let all = ids(index.all_songs());
        for query in ["mo", "a", "parker", "bop", "zz"] {
            let results = search(&index, query);
            let positions: Vec<usize> = results
                .iter()
                .map(|song| all.iter().position(|id| *id == song.id()).unwrap())
                .collect();
            assert!(positions.windows(2).all(|pair| pair[0] < pair[1]), "{query}");
        }
    }

    #[test]
    fn surrounding_spaces_are_part_of_the_query() {
        let index = sample_index();
        assert!(search(&index, "monk ").is_empty());
        assert_eq!(ids(&search(&index, " monk")), vec!["blue-monk", "round-midnight"]);

        let spans = highlight("Blue Monk blues", "blue ");
        assert_eq!(spans.iter().filter(|span| span.is_match).count(), 1);
        assert_eq!(spans[0].text, "Blue ");
    }

    #[test]
    fn highlight_splits_on_every_occurrence() {
        let spans = highlight("Blue Monk blues", "BLUE");
        assert_eq!(
            spans,
            vec![
                HighlightSpan {
                    text: "Blue".into(),
                    is_match: true,
                },
                HighlightSpan {
                    text: " Monk ".into(),
                    is_match: false,
                },
                HighlightSpan {
                    text: "blue".into(),
                    is_match: true,
                },
                HighlightSpan {
                    text: "s".into(),
                    is_match: false,
                },
            ]
        );
    }

    #[test]
    fn highlight_without_query_is_one_plain_span() {
        assert_eq!(
            highlight("Misty", " "),
            vec![HighlightSpan {
                text: "Misty".into(),
                is_match: false,
            }]
        );
        assert!(highlight("", "misty").is_empty());
    }

    #[test]
    fn highlight_preserves_text_with_multibyte_chars() {
        let text = "Café Émile café";
        let spans = highlight(text, "CAFÉ");
        let joined: String = spans.iter().map(|span| span.text.as_str()).collect();
        assert_eq!(joined, text);
        assert_eq!(spans.iter().filter(|span| span.is_match).count(), 2);
    }

    #[test]
    fn highlight_treats_regex_metacharacters_literally() {
        let spans = highlight("Have You Met Miss Jones?", "jones?");
        assert_eq!(spans.last().map(|s| s.is_match), Some(true));
    }
}
