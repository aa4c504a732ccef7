#![allow(dead_code)]

use territory::{
    FamilyAddressRecord, FamilyKey, FamilyTerritory, NewGazetteerEntry, PostalAddress, Territory,
};

pub fn family(code: &str, street: &str, cep: &str) -> FamilyAddressRecord {
    FamilyAddressRecord {
        ibge_code: Some("123".into()),
        family_code: Some(code.into()),
        street_name: Some(street.into()),
        cep: Some(cep.into()),
        ..Default::default()
    }
}

pub fn dated_family(
    code: &str,
    street: &str,
    cep: Option<&str>,
    updated_at: &str,
) -> FamilyAddressRecord {
    FamilyAddressRecord {
        cep: cep.map(str::to_string),
        updated_at: Some(updated_at.into()),
        ..family(code, street, "")
    }
}

pub fn geo(address: &str, cep: &str, zone: i64) -> NewGazetteerEntry {
    NewGazetteerEntry {
        address: address.into(),
        cep: Some(cep.into()),
        general_zone: Some(zone),
        specialized_zone: Some(zone * 10),
        latitude: Some(-23.55),
        longitude: Some(-46.63),
        ..Default::default()
    }
}

pub fn postal(street: &str) -> PostalAddress {
    PostalAddress {
        street: Some(street.into()),
        neighborhood: Some("Centro".into()),
        locality: Some("São Paulo".into()),
        region: Some("SP".into()),
    }
}

pub fn key(code: &str) -> FamilyKey {
    FamilyKey::new(Some("123"), Some(code)).unwrap()
}

pub fn combined_view(territory: &Territory) -> Vec<FamilyTerritory> {
    territory
        .store()
        .artifacts()
        .rows("families_territory")
        .unwrap()
        .expect("combined view should exist")
}

pub fn combined_row(territory: &Territory, code: &str) -> FamilyTerritory {
    let key = key(code);
    combined_view(territory)
        .into_iter()
        .find(|row| row.family == key)
        .expect("family should be in the combined view")
}

/// Load both datasets and build every artifact.
pub fn built(families: &[FamilyAddressRecord], gazetteer: Vec<NewGazetteerEntry>) -> Territory {
    let territory = Territory::in_memory().unwrap();
    territory.load_families(families).unwrap();
    territory.load_gazetteer(gazetteer).unwrap();
    territory.manager().create_all().unwrap();
    territory
}
