//! Benchmarks for the pure compilation paths: mappings, documents, filters
//! and bulk bodies.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use labelsearch_core::bulk::{bulk_body, BulkAction};
use labelsearch_core::document::record_document;
use labelsearch_core::query::{Filter, FilterScope, QueryCompiler, TextQuery};
use labelsearch_core::schema::compile_mappings;
use labelsearch_core::{
    Dataset, Dialect, Field, MetadataProperty, Question, QuestionType, Record, Response,
    ResponseLayout, ResponseStatus, User,
};
use rand::Rng;

const STATUSES: [ResponseStatus; 3] = ResponseStatus::STORED;

fn generate_dataset(questions: usize) -> Dataset {
    let mut dataset = Dataset::new().with_field(Field::text("text"));
    for i in 0..questions {
        dataset = dataset.with_question(Question::new(
            format!("q{}", i),
            QuestionType::LabelSelection {
                labels: vec!["a".into(), "b".into(), "c".into()],
            },
        ));
    }
    let id = dataset.id;
    dataset.with_metadata_property(MetadataProperty::integer(id, "textId"))
}

fn generate_record(dataset: &Dataset, annotators: usize) -> Record {
    let mut rng = rand::thread_rng();
    let mut record = Record::new(dataset.id)
        .with_field("text", "the quick brown fox")
        .with_metadata("textId", rng.gen_range(0..1_000i64));
    for i in 0..annotators {
        let mut response = Response::new(
            record.id,
            User::new(format!("annotator-{}", i)),
            STATUSES[rng.gen_range(0..3)],
        );
        for question in &dataset.questions {
            let label = ["a", "b", "c"][rng.gen_range(0..3)];
            response = response.with_value(question.name.clone(), label);
        }
        record = record.with_response(response);
    }
    record
}

fn bench_compile_mappings(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_mappings");

    for questions in [1, 10, 100].iter() {
        let dataset = generate_dataset(*questions);
        group.bench_with_input(BenchmarkId::from_parameter(questions), questions, |bench, _| {
            bench.iter(|| compile_mappings(black_box(&dataset), Dialect::Elasticsearch))
        });
    }

    group.finish();
}

fn bench_record_document(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_document");
    let dataset = generate_dataset(5);

    for annotators in [1, 100, 2000].iter() {
        let record = generate_record(&dataset, *annotators);
        group.throughput(Throughput::Elements(*annotators as u64));
        for layout in [ResponseLayout::Nested, ResponseLayout::PerUser] {
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", layout), annotators),
                annotators,
                |bench, _| bench.iter(|| record_document(black_box(&dataset), black_box(&record), layout)),
            );
        }
    }

    group.finish();
}

fn bench_compile_query(c: &mut Criterion) {
    let dataset = generate_dataset(5);
    let compiler = QueryCompiler::new(&dataset, ResponseLayout::Nested);
    let text = TextQuery::new("(cash | card) + -atm \"lost card\"");
    let filter = Filter::on(FilterScope::metadata("textId"))
        .between(3, 400)
        .and(Filter::on(FilterScope::response_status()).any_of(vec!["pending", "submitted"]))
        .and(Filter::on(FilterScope::response_question("q0").for_user(User::new("a"))).eq("b"));

    c.bench_function("compile_query", |bench| {
        bench.iter(|| compiler.compile_query(Some(black_box(&text)), Some(black_box(&filter))))
    });
}

fn bench_bulk_body(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_body");
    let dataset = generate_dataset(5);

    for num_records in [100, 500].iter() {
        let actions: Vec<BulkAction> = (0..*num_records)
            .map(|_| {
                let record = generate_record(&dataset, 3);
                BulkAction::Index {
                    id: record.id,
                    document: record_document(&dataset, &record, ResponseLayout::PerUser),
                }
            })
            .collect();

        group.throughput(Throughput::Elements(*num_records as u64));
        group.bench_with_input(BenchmarkId::from_parameter(num_records), num_records, |bench, _| {
            bench.iter(|| bulk_body(black_box(&actions)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_compile_mappings,
    bench_record_document,
    bench_compile_query,
    bench_bulk_body
);
criterion_main!(benches);
