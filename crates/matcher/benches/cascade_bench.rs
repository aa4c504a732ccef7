use canonical::AddressNormalizer;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use matcher::{CascadeBuilder, GazetteerIndex, MatchConfig};
use store::{CleanFamily, FamilyAddressRecord, GazetteerEntry, NewGazetteerEntry};

const STREETS: [&str; 6] = [
    "RUA DAS FLORES",
    "AVENIDA BRASIL",
    "TRAVESSA SAO JOAO",
    "RUA DOUTOR ARNALDO",
    "PRACA DA SE",
    "ALAMEDA SANTOS",
];

fn gazetteer(size: usize) -> Vec<GazetteerEntry> {
    (0..size)
        .map(|i| {
            GazetteerEntry::from_new(
                i as u64 + 1,
                NewGazetteerEntry {
                    address: format!("{} {}", STREETS[i % STREETS.len()], i / STREETS.len()),
                    cep: Some(format!("{:08}", 1_000_000 + i)),
                    general_zone: Some((i % 12) as i64),
                    ..Default::default()
                },
            )
        })
        .collect()
}

fn families(size: usize, normalizer: &AddressNormalizer) -> Vec<CleanFamily> {
    (0..size)
        .filter_map(|i| {
            let record = FamilyAddressRecord {
                ibge_code: Some("3550308".into()),
                family_code: Some(format!("{i}")),
                street_name: Some(format!("{} {}", STREETS[i % STREETS.len()], i % 500)),
                cep: Some(format!("{:08}", 1_000_000 + (i * 7) % 3_000)),
                ..Default::default()
            };
            CleanFamily::from_record(&record, normalizer)
        })
        .collect()
}

fn bench_cascade(c: &mut Criterion) {
    let normalizer = AddressNormalizer::default();
    let index = GazetteerIndex::from_entries(gazetteer(3_000), &normalizer);
    let builder = CascadeBuilder::new(&MatchConfig::default()).expect("valid config");

    let mut group = c.benchmark_group("cascade_run");
    for size in [1_000usize, 10_000] {
        let families = families(size, &normalizer);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &families, |b, families| {
            b.iter(|| black_box(builder.run(black_box(families), &index)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cascade);
criterion_main!(benches);
