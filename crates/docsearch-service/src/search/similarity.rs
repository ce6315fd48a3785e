//! Ratcliff/Obershelp string similarity.
//!
//! The ratio of two strings is `2 * M / T`, where `T` is the total number of characters in both
//! strings and `M` is the number of characters in matching blocks. Matching blocks are found by
//! taking the longest common substring, then recursing into the pieces left and right of it.
//!
//! This follows the well-known `SequenceMatcher` algorithm without a junk function, including
//! its "popular element" heuristic for sequences of 200 characters or more, so that scores and
//! therefore tie-breaks are identical to it.

use std::collections::HashMap;

/// Sequences at least this long have their most frequent characters ignored when looking for
/// matching blocks.
const AUTOJUNK_MIN_LEN: usize = 200;

/// Returns the similarity of `a` and `b` as a number in `[0, 1]`.
///
/// Two empty strings are considered identical.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let matches = Matcher::new(&a, &b).matching_characters();
    2.0 * matches as f64 / total as f64
}

struct Matcher<'s> {
    a: &'s [char],
    b: &'s [char],
    /// For every character of `b`, the ascending indices at which it occurs.
    b2j: HashMap<char, Vec<usize>>,
}

impl<'s> Matcher<'s> {
    fn new(a: &'s [char], b: &'s [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, c) in b.iter().enumerate() {
            b2j.entry(*c).or_default().push(j);
        }

        if b.len() >= AUTOJUNK_MIN_LEN {
            let max_occurrences = b.len() / 100 + 1;
            b2j.retain(|_, indices| indices.len() <= max_occurrences);
        }

        Self { a, b, b2j }
    }

    /// Finds the longest matching block in `a[alo..ahi]` and `b[blo..bhi]`.
    ///
    /// Returns `(i, j, k)` such that `a[i..i + k] == b[j..j + k]`. Of all maximal blocks, the one
    /// starting earliest in `a` is returned, and of those the one starting earliest in `b`.
    fn find_longest_match(
        &self,
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
    ) -> (usize, usize, usize) {
        let (a, b) = (self.a, self.b);
        let (mut besti, mut bestj, mut bestsize) = (alo, blo, 0);

        // `j2len[j]` is the length of the longest block ending with `a[i - 1]` and `b[j]`.
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
            let mut new_j2len = HashMap::new();
            for &j in self.b2j.get(c).map(Vec::as_slice).unwrap_or_default() {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = j.checked_sub(1).and_then(|p| j2len.get(&p)).unwrap_or(&0) + 1;
                new_j2len.insert(j, k);
                if k > bestsize {
                    (besti, bestj, bestsize) = (i + 1 - k, j + 1 - k, k);
                }
            }
            j2len = new_j2len;
        }

        // Characters dropped as popular can still extend a block at its edges.
        while besti > alo && bestj > blo && a[besti - 1] == b[bestj - 1] {
            besti -= 1;
            bestj -= 1;
            bestsize += 1;
        }
        while besti + bestsize < ahi
            && bestj + bestsize < bhi
            && a[besti + bestsize] == b[bestj + bestsize]
        {
            bestsize += 1;
        }

        (besti, bestj, bestsize)
    }

    /// The total number of characters in all matching blocks.
    fn matching_characters(&self) -> usize {
        let mut queue = vec![(0, self.a.len(), 0, self.b.len())];
        let mut matches = 0;

        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, k) = self.find_longest_match(alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }

            matches += k;
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                queue.push((i + k, ahi, j + k, bhi));
            }
        }

        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_ratio(a: &str, b: &str, expected: f64) {
        let actual = ratio(a, b);
        assert!(
            (actual - expected).abs() < 1e-9,
            "ratio({a:?}, {b:?}) = {actual}, expected {expected}"
        );
    }

    #[test]
    fn test_identical_and_empty() {
        assert_ratio("fs.open", "fs.open", 1.0);
        assert_ratio("", "", 1.0);
        assert_ratio("abc", "", 0.0);
        assert_ratio("abc", "xyz", 0.0);
    }

    #[test]
    fn test_known_ratios() {
        assert_ratio("abcd", "bcde", 0.75);
        // "fs.op" plus one of the swapped characters.
        assert_ratio("fs.open", "fs.opne", 12.0 / 14.0);
        assert_ratio("abcde", "abcdx", 0.8);
        assert_ratio("turtle.forward", "turtle.foward", 26.0 / 27.0);
        // "ab" and "cd" are equally long; "ab" is found first and "cd" is matched to its right.
        assert_ratio("abcd", "abxcd", 8.0 / 9.0);
    }

    #[test]
    fn test_order_of_blocks_matters() {
        // Only one of "ab" and "ba" can be part of the matching blocks.
        assert_ratio("abba", "ba", 4.0 / 6.0);
        assert_ratio("qabxcd", "abycdf", 8.0 / 12.0);
    }

    #[test]
    fn test_non_ascii() {
        assert_ratio("grün", "grun", 6.0 / 8.0);
    }

    #[test]
    fn test_popular_characters_are_ignored_in_long_strings() {
        let key = format!("b{}", "a".repeat(10));
        // `a` is popular in the long query, so only the `b` can start a block.
        assert_ratio(&key, &format!("{}b", "a".repeat(199)), 2.0 / 211.0);
        // Below the length threshold, the run of `a`s is matched.
        assert_ratio(&key, &format!("{}b", "a".repeat(19)), 20.0 / 31.0);
    }
}
