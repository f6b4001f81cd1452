//! Character-level similarity ratio between two texts.
//!
//! Ratcliff/Obershelp "gestalt" matching: find the longest common block,
//! recurse on the unmatched pieces to its left and right, and score
//! `2 * matched / (len(a) + len(b))`.
//!
//! The recursion picks the earliest of several equally long blocks, which makes
//! the raw score depend on argument order. [`similarity`] always scores the pair
//! in lexicographic order, so `similarity(a, b) == similarity(b, a)` exactly.

use std::collections::HashMap;

/// Similarity ratio in `[0, 1]`.
///
/// Identical non-empty strings score `1.0`; strings with no character in
/// common score `0.0`. Blank input on either side scores `0.0`.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (a, b) = if a <= b { (a, b) } else { (b, a) };

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let matched = Matcher::new(&a, &b).matched_len();

    2.0 * matched as f64 / (a.len() + b.len()) as f64
}

/// Longest-matching-block search over two char sequences.
struct Matcher<'a> {
    a: &'a [char],
    b: &'a [char],
    /// char → ascending positions in `b`.
    b2j: HashMap<char, Vec<usize>>,
    /// Run lengths for the previous and current row of `a`, indexed by `j + 1`.
    /// Both are all zeros between calls to `longest_match`.
    prev: Vec<usize>,
    curr: Vec<usize>,
    prev_set: Vec<usize>,
    curr_set: Vec<usize>,
}

impl<'a> Matcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, &c) in b.iter().enumerate() {
            b2j.entry(c).or_default().push(j);
        }
        Self {
            a,
            b,
            b2j,
            prev: vec![0; b.len() + 1],
            curr: vec![0; b.len() + 1],
            prev_set: Vec::new(),
            curr_set: Vec::new(),
        }
    }

    /// Total length of all matching blocks.
    fn matched_len(&mut self) -> usize {
        let mut total = 0;
        let mut queue = vec![(0, self.a.len(), 0, self.b.len())];

        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, k) = self.longest_match(alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }
            total += k;
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                queue.push((i + k, ahi, j + k, bhi));
            }
        }

        total
    }

    /// Longest block `a[i..i+k] == b[j..j+k]` inside the given window.
    /// Ties go to the smallest `i`, then the smallest `j`.
    fn longest_match(
        &mut self,
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
    ) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0);

        // prev[j + 1] = length of the match ending at a[i-1], b[j].
        for i in alo..ahi {
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                let start = positions.partition_point(|&j| j < blo);
                for &j in positions[start..].iter().take_while(|&&j| j < bhi) {
                    let k = self.prev[j] + 1;
                    self.curr[j + 1] = k;
                    self.curr_set.push(j + 1);
                    if k > best_k {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_k = k;
                    }
                }
            }
            for &j in &self.prev_set {
                self.prev[j] = 0;
            }
            self.prev_set.clear();
            std::mem::swap(&mut self.prev, &mut self.curr);
            std::mem::swap(&mut self.prev_set, &mut self.curr_set);
        }
        for &j in &self.prev_set {
            self.prev[j] = 0;
        }
        self.prev_set.clear();

        // Grow the block over equal neighbours the index walk cannot see.
        while best_i > alo && best_j > blo && self.a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_k += 1;
        }
        while best_i + best_k < ahi
            && best_j + best_k < bhi
            && self.a[best_i + best_k] == self.b[best_j + best_k]
        {
            best_k += 1;
        }

        (best_i, best_j, best_k)
    }
}
