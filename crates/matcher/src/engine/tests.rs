use super::*;
use canonical::{AddressNormalizer, Cep};
use store::{FamilyAddressRecord, GazetteerEntry, NewGazetteerEntry};

use crate::types::Confidence;

fn family(code: &str, street: &str, cep: Option<&str>) -> CleanFamily {
    let record = FamilyAddressRecord {
        ibge_code: Some("123".into()),
        family_code: Some(code.into()),
        street_name: Some(street.into()),
        cep: cep.map(str::to_string),
        ..Default::default()
    };
    CleanFamily::from_record(&record, &AddressNormalizer::default()).unwrap()
}

fn geo(id: u64, address: &str, cep: Option<&str>, zone: i64) -> GazetteerEntry {
    GazetteerEntry::from_new(
        id,
        NewGazetteerEntry {
            address: address.into(),
            cep: cep.map(str::to_string),
            general_zone: Some(zone),
            specialized_zone: Some(zone * 10),
            latitude: Some(-23.55),
            longitude: Some(-46.63),
            ..Default::default()
        },
    )
}

fn index(entries: Vec<GazetteerEntry>) -> GazetteerIndex {
    GazetteerIndex::from_entries(entries, &AddressNormalizer::default())
}

fn builder() -> CascadeBuilder {
    CascadeBuilder::new(&MatchConfig::default()).unwrap()
}

fn row<'a>(view: &'a [FamilyTerritory], code: &str) -> &'a FamilyTerritory {
    view.iter()
        .find(|r| r.family.family_code == code)
        .unwrap_or_else(|| panic!("family {code} missing from view"))
}

#[test]
fn exact_match_on_cep_and_abbreviated_street() {
    let families = vec![family("0007", "R. DAS FLORES", Some("01001000"))];
    let out = builder().run(&families, &index(vec![geo(1, "RUA DAS FLORES", Some("01001000"), 3)]));

    let view = row(&out.combined, "7");
    assert_eq!(view.tier, Some(MatchTier::Exact));
    assert_eq!(view.confidence, Some(Confidence::High));
    assert_eq!(
        view.territory_cep().map(Cep::as_str),
        Some("01001000")
    );
    assert_eq!(view.territory.as_ref().unwrap().general_zone, Some(3));
    assert_eq!(out.tiers[&MatchTier::Exact].len(), 1);
    assert!(out.tiers[&MatchTier::AddressOnly].is_empty());
}

#[test]
fn address_only_match_borrows_gazetteer_cep() {
    let families = vec![family("0007", "R. DAS FLORES", Some("01001000"))];
    let out = builder().run(&families, &index(vec![geo(1, "RUA DAS FLORES", Some("01001111"), 3)]));

    assert!(out.tiers[&MatchTier::Exact].is_empty());
    let view = row(&out.combined, "7");
    assert_eq!(view.tier, Some(MatchTier::AddressOnly));
    assert_eq!(view.territory_cep().map(Cep::as_str), Some("01001111"));
    // The family's own code is reported untouched.
    assert_eq!(view.family_cep.as_ref().map(Cep::as_str), Some("01001000"));
}

#[test]
fn family_without_cep_can_still_match_by_address() {
    let families = vec![family("1", "AV. PAULISTA", None)];
    let gazetteer = index(vec![geo(1, "AVENIDA PAULISTA", Some("01310100"), 1)]);
    let out = builder().run(&families, &gazetteer);
    assert_eq!(row(&out.combined, "1").tier, Some(MatchTier::AddressOnly));
}

#[test]
fn exact_beats_address_only_when_both_exist() {
    let families = vec![family("1", "RUA A", Some("01001000"))];
    let gazetteer = index(vec![
        geo(1, "RUA A", Some("01000000"), 1),
        geo(2, "RUA A", Some("01001000"), 2),
    ]);
    let out = builder().run(&families, &gazetteer);

    let view = row(&out.combined, "1");
    assert_eq!(view.tier, Some(MatchTier::Exact));
    assert_eq!(view.territory.as_ref().unwrap().gazetteer_id, 2);
    // Tier 2 only considers families tier 1 left unmatched.
    assert!(out.tiers[&MatchTier::AddressOnly].is_empty());
}

#[test]
fn fuzzy_tolerates_spelling_variants() {
    let families = vec![family("1", "RUA DAS FLORS", Some("09999999"))];
    let out = builder().run(
        &families,
        &index(vec![geo(1, "RUA DAS FLORES", Some("01001000"), 4)]),
    );
    let view = row(&out.combined, "1");
    assert_eq!(view.tier, Some(MatchTier::Fuzzy));
    assert_eq!(view.confidence, Some(Confidence::Low));
    let hit = &out.tiers[&MatchTier::Fuzzy][0];
    assert!(hit.score >= MatchConfig::DEFAULT_FUZZY_THRESHOLD && hit.score < 1.0);
}

#[test]
fn fuzzy_tier_can_be_disabled() {
    let builder = CascadeBuilder::new(&MatchConfig {
        fuzzy_enabled: false,
        ..MatchConfig::default()
    })
    .unwrap();
    assert_eq!(builder.tiers(), vec![MatchTier::Exact, MatchTier::AddressOnly]);
    assert!(!builder.is_enabled(MatchTier::Fuzzy));

    let families = vec![family("1", "RUA DAS FLORS", None)];
    let gazetteer = index(vec![geo(1, "RUA DAS FLORES", None, 4)]);
    let out = builder.run(&families, &gazetteer);
    assert!(!out.tiers.contains_key(&MatchTier::Fuzzy));
    assert!(!row(&out.combined, "1").is_matched());

    assert_eq!(
        builder.build_tier(MatchTier::Fuzzy, &families, &gazetteer, &HashSet::new()),
        Err(MatchError::TierDisabled(MatchTier::Fuzzy))
    );
}

#[test]
fn combined_view_lists_every_family_once() {
    let families = vec![
        family("1", "RUA A", Some("01001000")),
        family("2", "RUA B", None),
        family("3", "TRAVESSA SEM NOME", None),
        family("01", "RUA A", Some("01001000")),
        family("4", "", None),
    ];
    let out = builder().run(
        &families,
        &index(vec![
            geo(1, "RUA A", Some("01001000"), 1),
            geo(2, "RUA B", Some("02002000"), 2),
        ]),
    );

    let codes: Vec<&str> = out
        .combined
        .iter()
        .map(|r| r.family.family_code.as_str())
        .collect();
    assert_eq!(codes, vec!["1", "2", "3", "4"], "duplicate key 01 collapses onto 1");
    assert!(!row(&out.combined, "3").is_matched());
    assert!(!row(&out.combined, "4").is_matched());
}

#[test]
fn tiers_are_unique_per_family() {
    let families = vec![
        family("1", "RUA A", Some("01001000")),
        family("1", "RUA B", Some("02002000")),
    ];
    let gazetteer = index(vec![
        geo(1, "RUA A", Some("01001000"), 1),
        geo(2, "RUA A", Some("01001-000"), 1),
        geo(3, "RUA B", Some("02002000"), 2),
    ]);
    for (tier, rows) in builder().run(&families, &gazetteer).tiers {
        let mut keys: Vec<_> = rows.iter().map(|r| r.family.clone()).collect();
        let before = keys.len();
        keys.dedup();
        assert_eq!(keys.len(), before, "duplicate family in tier {tier}");
    }
}

#[test]
fn empty_gazetteer_gives_empty_tiers_not_errors() {
    let families = vec![family("1", "RUA A", Some("01001000"))];
    let builder = builder();
    let empty = index(Vec::new());
    for tier in builder.tiers() {
        assert!(builder
            .build_tier(tier, &families, &empty, &HashSet::new())
            .unwrap()
            .is_empty());
    }
    let out = builder.run(&families, &empty);
    assert_eq!(out.combined.len(), 1);
    assert!(!out.combined[0].is_matched());
}

#[test]
fn build_tier_honours_exclusions() {
    let families = vec![
        family("1", "RUA A", Some("01001000")),
        family("2", "RUA A", Some("01001000")),
    ];
    let gazetteer = index(vec![geo(1, "RUA A", Some("01001000"), 1)]);
    let exclude: HashSet<FamilyKey> = [families[0].key.clone()].into();
    let rows = builder()
        .build_tier(MatchTier::Exact, &families, &gazetteer, &exclude)
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].family.family_code, "2");
}

#[test]
fn rebuilding_is_deterministic() {
    let families: Vec<CleanFamily> = (0..50)
        .map(|i| {
            family(
                &i.to_string(),
                if i % 3 == 0 { "RUA A" } else { "RUA DAS FLORS" },
                Some("01001000"),
            )
        })
        .collect();
    let entries = || {
        vec![
            geo(5, "RUA A", Some("01001-000"), 1),
            geo(2, "RUA A", Some("01001000"), 2),
            geo(9, "RUA DAS FLORES", Some("01001000"), 3),
            geo(1, "RUA DAS FLOR", None, 4),
        ]
    };
    let first = builder().run(&families, &index(entries()));
    let second = builder().run(&families, &index(entries()));
    assert_eq!(first, second);
    assert_eq!(
        row(&first.combined, "0").territory.as_ref().unwrap().gazetteer_id,
        5
    );
}

#[test]
fn combine_prefers_earlier_tier_rows() {
    let families = vec![family("1", "RUA A", Some("01001000"))];
    let gazetteer = index(vec![
        geo(1, "RUA A", Some("01001000"), 1),
        geo(2, "RUA A B", Some("03003000"), 2),
    ]);
    let builder = builder();
    let none = HashSet::new();
    let mut tiers = BTreeMap::new();
    // Fuzzy rows built without exclusions still lose to the exact row.
    tiers.insert(
        MatchTier::Fuzzy,
        builder
            .build_tier(MatchTier::Fuzzy, &families, &gazetteer, &none)
            .unwrap(),
    );
    tiers.insert(
        MatchTier::Exact,
        builder
            .build_tier(MatchTier::Exact, &families, &gazetteer, &none)
            .unwrap(),
    );
    let view = CascadeBuilder::combine(&families, &tiers);
    assert_eq!(view[0].tier, Some(MatchTier::Exact));
}
