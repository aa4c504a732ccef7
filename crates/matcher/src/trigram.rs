//! Trigram similarity over normalized address keys.
//!
//! Trigrams follow the usual word-padded scheme: every alphanumeric word is
//! lower-cased, padded with two blanks in front and one behind, and cut into
//! overlapping three-character windows. Similarity is the Jaccard index of
//! the two trigram sets.

use std::collections::HashMap;

type Trigram = [char; 3];

/// Sorted, de-duplicated trigram set of one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigrams(Vec<Trigram>);

impl Trigrams {
    pub fn new(text: &str) -> Self {
        let mut grams = Vec::new();
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let padded: Vec<char> = "  "
                .chars()
                .chain(word.chars().flat_map(char::to_lowercase))
                .chain(" ".chars())
                .collect();
            grams.extend(padded.windows(3).map(|w| [w[0], w[1], w[2]]));
        }
        grams.sort_unstable();
        grams.dedup();
        Self(grams)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn shared(&self, other: &Trigrams) -> usize {
        let (mut i, mut j, mut shared) = (0, 0, 0);
        while i < self.0.len() && j < other.0.len() {
            match self.0[i].cmp(&other.0[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    shared += 1;
                    i += 1;
                    j += 1;
                }
            }
        }
        shared
    }

    /// Jaccard index of the two sets; 0.0 when either is empty.
    pub fn similarity(&self, other: &Trigrams) -> f64 {
        jaccard(self.shared(other), self.len(), other.len())
    }
}

fn jaccard(shared: usize, left: usize, right: usize) -> f64 {
    let union = left + right - shared;
    if union == 0 || shared == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

/// Similarity between two texts.
pub fn similarity(a: &str, b: &str) -> f64 {
    Trigrams::new(a).similarity(&Trigrams::new(b))
}

/// Inverted trigram index over candidate texts.
///
/// Only candidates sharing at least one trigram with the query are scored,
/// so a query costs time proportional to the postings it touches.
#[derive(Debug, Default)]
pub struct TrigramIndex {
    sizes: Vec<usize>,
    postings: HashMap<Trigram, Vec<u32>>,
}

impl TrigramIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate; returns its ordinal.
    pub fn insert(&mut self, text: &str) -> usize {
        let ordinal = self.sizes.len();
        let grams = Trigrams::new(text);
        self.sizes.push(grams.len());
        for gram in grams.0 {
            self.postings.entry(gram).or_default().push(ordinal as u32);
        }
        ordinal
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Most similar candidate at or above `threshold`. Ties go to the lowest
    /// ordinal.
    pub fn best_match(&self, query: &str, threshold: f64) -> Option<(usize, f64)> {
        let grams = Trigrams::new(query);
        let mut shared: HashMap<u32, usize> = HashMap::new();
        for gram in &grams.0 {
            if let Some(ordinals) = self.postings.get(gram) {
                for &ordinal in ordinals {
                    *shared.entry(ordinal).or_default() += 1;
                }
            }
        }

        let mut best: Option<(usize, f64)> = None;
        for (ordinal, count) in shared {
            let ordinal = ordinal as usize;
            let score = jaccard(count, grams.len(), self.sizes[ordinal]);
            if score < threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_ordinal, best_score)) => {
                    score > best_score || (score == best_score && ordinal < best_ordinal)
                }
            };
            if better {
                best = Some((ordinal, score));
            }
        }
        best
    }
}
