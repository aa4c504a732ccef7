mod common;

use common::{built, combined_row, combined_view, dated_family, family, geo, key};
use territory::{
    Cep, FamilyAddressRecord, MatchTier, RefreshOptions, Report, Territory, TierMatch,
};

fn flores_family() -> FamilyAddressRecord {
    FamilyAddressRecord {
        ibge_code: Some("123".into()),
        family_code: Some("0007".into()),
        street_type: Some("R.".into()),
        street_name: Some("DAS FLORES".into()),
        cep: Some("01001000".into()),
        ..Default::default()
    }
}

#[test]
fn exact_match_on_postal_code_and_address() {
    let territory = built(&[flores_family()], vec![geo("RUA DAS FLORES", "01001000", 3)]);

    let row = combined_row(&territory, "7");
    assert_eq!(row.tier, Some(MatchTier::Exact));
    assert_eq!(row.territory_cep(), Cep::parse("01001000").as_ref());
    let attrs = row.territory.unwrap();
    assert_eq!(attrs.general_zone, Some(3));
    assert_eq!(attrs.specialized_zone, Some(30));
    assert_eq!(attrs.latitude, Some(-23.55));
}

#[test]
fn address_only_match_borrows_gazetteer_postal_code() {
    let registry = [flores_family()];
    let territory = built(&registry, vec![geo("RUA DAS FLORES", "01001111", 3)]);

    let exact: Vec<TierMatch> = territory
        .store()
        .artifacts()
        .rows("geo_exact")
        .unwrap()
        .unwrap();
    assert!(exact.is_empty(), "postal codes differ, no exact match");

    let row = combined_row(&territory, "7");
    assert_eq!(row.tier, Some(MatchTier::AddressOnly));
    assert_eq!(row.territory_cep(), Cep::parse("01001111").as_ref());
    assert_eq!(row.family_cep, Cep::parse("01001000"));

    // The registry snapshot is never written back.
    assert_eq!(territory.store().families().all().unwrap(), registry.to_vec());
}

#[test]
fn exact_tier_wins_over_address_only() {
    let territory = built(
        &[family("1", "RUA DAS FLORES", "05005000")],
        vec![
            geo("RUA DAS FLORES", "01001111", 1),
            geo("RUA DAS FLORES", "05005000", 5),
        ],
    );

    let row = combined_row(&territory, "1");
    assert_eq!(row.tier, Some(MatchTier::Exact));
    assert_eq!(row.territory.unwrap().general_zone, Some(5));

    let by_address: Vec<TierMatch> = territory
        .store()
        .artifacts()
        .rows("geo_by_address")
        .unwrap()
        .unwrap();
    assert!(by_address.is_empty(), "address tier only sees unmatched families");
}

#[test]
fn fuzzy_tier_tolerates_spelling_variants() {
    let territory = built(
        &[family("1", "RUA DAS FLORS", "99999999")],
        vec![geo("RUA DAS FLORES", "01001000", 1)],
    );
    let row = combined_row(&territory, "1");
    assert_eq!(row.tier, Some(MatchTier::Fuzzy));
    assert_eq!(row.territory_cep(), Cep::parse("01001000").as_ref());
}

#[test]
fn combined_view_lists_every_family_once() {
    let territory = built(
        &[
            family("1", "RUA DAS FLORES", "01001000"),
            family("01", "RUA REPETIDA", "01001000"),
            family("2", "AV. PAULISTA", "01310100"),
            family("3", "TRAVESSA PERDIDA", "77777777"),
            family("4", "", ""),
        ],
        vec![
            geo("RUA DAS FLORES", "01001000", 1),
            geo("AVENIDA PAULISTA", "01310-100", 2),
        ],
    );

    let view = combined_view(&territory);
    assert_eq!(view.len(), 4, "family 01 and 1 share a key");
    let mut keys: Vec<_> = view.iter().map(|r| r.family.clone()).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 4);
    assert_eq!(view.iter().filter(|r| r.is_matched()).count(), 2);
    assert!(!combined_row(&territory, "3").is_matched());
    assert!(!combined_row(&territory, "4").is_matched());
}

#[test]
fn tier_artifacts_hold_one_row_per_family() {
    let territory = built(
        &[
            family("1", "RUA DAS FLORES", "01001000"),
            family("2", "RUA DAS FLORES", "99999999"),
        ],
        vec![
            geo("RUA DAS FLORES", "01001000", 1),
            geo("R DAS FLORES", "01001000", 2),
            geo("RUA DAS FLORES", "02002000", 3),
        ],
    );
    for artifact in ["geo_exact", "geo_by_address", "geo_fuzzy"] {
        let rows: Vec<TierMatch> = territory
            .store()
            .artifacts()
            .rows(artifact)
            .unwrap()
            .unwrap();
        let mut families: Vec<_> = rows.iter().map(|r| r.family.clone()).collect();
        families.sort();
        families.dedup();
        assert_eq!(families.len(), rows.len(), "{artifact} repeats a family");
    }
    assert_eq!(combined_row(&territory, "1").tier, Some(MatchTier::Exact));
    assert_eq!(combined_row(&territory, "2").tier, Some(MatchTier::AddressOnly));
}

#[test]
fn statistics_over_the_combined_view() {
    let territory = built(
        &[
            dated_family("1", "RUA DAS FLORES", Some("01001000"), "15/03/2025"),
            dated_family("2", "RUA OUTRA", Some("01001-000"), "2025-01-10"),
            dated_family("3", "RUA DAS FLORES", Some("01001000"), "01/01/2020"),
            dated_family("4", "RUA SEM CEP", None, "02022025"),
            dated_family("5", "AVENIDA PAULISTA", Some("99999999"), "2025-05-05"),
        ],
        vec![
            geo("RUA DAS FLORES", "01001000", 1),
            geo("AVENIDA PAULISTA", "01310100", 2),
        ],
    );
    let reporter = territory.reporter();

    let stats = reporter.match_stats().unwrap().ready().unwrap();
    assert_eq!(stats.total_families, 5);
    assert_eq!(stats.tier(MatchTier::Exact), Some(2));
    assert_eq!(stats.tier(MatchTier::AddressOnly), Some(1));
    assert_eq!(stats.with_territory, 3);
    assert_eq!(stats.unmatched, 2);

    let as_of = chrono::NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
    let window = reporter.windowed(730, as_of).unwrap().ready().unwrap();
    assert_eq!(window.in_window, 4);
    assert_eq!(window.with_cep, 3);
    assert_eq!(window.cep_in_gazetteer, 2);
    assert_eq!(window.address_match, 1);
    assert_eq!(window.address_divergent, 1);

    let unmatched = reporter.unmatched_families(None).unwrap().ready().unwrap();
    let codes: Vec<_> = unmatched.iter().map(|u| u.family.clone()).collect();
    assert_eq!(codes, vec![key("2"), key("4")], "absent postal code sorts last");
}

#[test]
fn window_bounds_follow_the_as_of_date() {
    let territory = built(
        &[
            dated_family("1", "RUA DAS FLORES", Some("01001000"), "2025-05-31"),
            dated_family("2", "RUA DAS FLORES", Some("01001000"), "2025-05-30"),
            dated_family("3", "RUA DAS FLORES", Some("01001000"), "2025-07-15"),
            dated_family("4", "RUA DAS FLORES", Some("01001000"), "not a date"),
            dated_family("5", "R. DAS FLORES", Some("01001000"), "30/06/2025"),
        ],
        vec![geo("RUA DAS FLORES", "01001000", 1)],
    );
    let as_of = chrono::NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
    let window = territory
        .reporter()
        .windowed(30, as_of)
        .unwrap()
        .ready()
        .unwrap();
    assert_eq!(
        window.since,
        chrono::NaiveDate::from_ymd_opt(2025, 5, 31).unwrap()
    );
    assert_eq!(window.total_families, 5);
    // 30 days old, later than `as_of`, and on `as_of` itself.
    assert_eq!(window.in_window, 3);
    assert_eq!(window.address_match, 3);
    assert_eq!(window.address_divergent, 0);
}

#[test]
fn stats_can_ride_along_with_a_refresh() {
    let territory = built(
        &[family("1", "RUA DAS FLORES", "01001000")],
        vec![geo("RUA DAS FLORES", "01001000", 1)],
    );
    let report = territory
        .manager()
        .refresh(
            "all",
            &RefreshOptions {
                include_stats: true,
                window_days: Some(30),
                as_of: chrono::NaiveDate::from_ymd_opt(2025, 1, 1),
            },
        )
        .unwrap();
    let stats = report.stats.unwrap();
    assert_eq!(stats.matches.ready().unwrap().with_territory, 1);
    assert!(matches!(stats.window, Some(Report::Ready(w)) if w.days == 30));
}

#[test]
fn stats_before_any_build_report_not_built() {
    let territory = Territory::in_memory().unwrap();
    territory
        .load_families(&[family("1", "RUA DAS FLORES", "01001000")])
        .unwrap();
    let report = territory.reporter().match_stats().unwrap();
    assert_eq!(
        report,
        Report::NotBuilt {
            missing: vec!["families_territory".into()]
        }
    );
}
