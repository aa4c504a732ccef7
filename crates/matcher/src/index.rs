use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use canonical::{AddressKey, AddressNormalizer, Cep};
use store::GazetteerEntry;

use crate::trigram::TrigramIndex;

/// Precedence between gazetteer rows that tie under one tier: rows with a
/// raw postal code first, lowest raw value first, then lowest id.
fn precedence(a: &GazetteerEntry, b: &GazetteerEntry) -> Ordering {
    match (&a.cep_raw, &b.cep_raw) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then(a.id.cmp(&b.id))
}

/// Keep the preferred of the current slot and `candidate`.
fn keep_preferred(entries: &[GazetteerEntry], slot: &mut usize, candidate: usize) {
    if precedence(&entries[candidate], &entries[*slot]) == Ordering::Less {
        *slot = candidate;
    }
}

/// Lookup structures over the gazetteer, one per tier.
///
/// Every structure resolves ties with the same rule, so each lookup has
/// exactly one answer and rebuilding from the same rows gives the same
/// answers.
#[derive(Debug, Default)]
pub struct GazetteerIndex {
    entries: Vec<GazetteerEntry>,
    by_cep_and_key: HashMap<(Cep, AddressKey), usize>,
    by_key: HashMap<AddressKey, usize>,
    /// Distinct keys in key order, aligned with the trigram ordinals.
    fuzzy_slots: Vec<usize>,
    trigrams: TrigramIndex,
}

impl GazetteerIndex {
    /// Build from rows and their precomputed address keys. Rows without a
    /// key are kept but can never match.
    pub fn build(entries: Vec<GazetteerEntry>, keys: &BTreeMap<u64, Option<AddressKey>>) -> Self {
        let mut by_cep_and_key: HashMap<(Cep, AddressKey), usize> = HashMap::new();
        let mut by_key_sorted: BTreeMap<AddressKey, usize> = BTreeMap::new();

        for (slot, entry) in entries.iter().enumerate() {
            let Some(Some(key)) = keys.get(&entry.id) else {
                continue;
            };
            if let Some(cep) = &entry.cep {
                by_cep_and_key
                    .entry((cep.clone(), key.clone()))
                    .and_modify(|current| keep_preferred(&entries, current, slot))
                    .or_insert(slot);
            }
            by_key_sorted
                .entry(key.clone())
                .and_modify(|current| keep_preferred(&entries, current, slot))
                .or_insert(slot);
        }

        let mut trigrams = TrigramIndex::new();
        let mut fuzzy_slots = Vec::with_capacity(by_key_sorted.len());
        for (key, slot) in &by_key_sorted {
            trigrams.insert(key.as_str());
            fuzzy_slots.push(*slot);
        }

        Self {
            entries,
            by_cep_and_key,
            by_key: by_key_sorted.into_iter().collect(),
            fuzzy_slots,
            trigrams,
        }
    }

    /// Build, normalizing every row's address with `normalizer`.
    pub fn from_entries(entries: Vec<GazetteerEntry>, normalizer: &AddressNormalizer) -> Self {
        let keys = entries
            .iter()
            .map(|e| (e.id, normalizer.normalize(&e.address)))
            .collect();
        Self::build(entries, &keys)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn exact(&self, cep: &Cep, key: &AddressKey) -> Option<&GazetteerEntry> {
        self.by_cep_and_key
            .get(&(cep.clone(), key.clone()))
            .map(|&slot| &self.entries[slot])
    }

    pub fn by_address(&self, key: &AddressKey) -> Option<&GazetteerEntry> {
        self.by_key.get(key).map(|&slot| &self.entries[slot])
    }

    /// Row whose address key is most similar to `key`, with its score.
    pub fn most_similar(&self, key: &AddressKey, threshold: f64) -> Option<(&GazetteerEntry, f64)> {
        self.trigrams
            .best_match(key.as_str(), threshold)
            .map(|(ordinal, score)| (&self.entries[self.fuzzy_slots[ordinal]], score))
    }
}
