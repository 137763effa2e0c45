use labelsearch_core::document::record_document;
use labelsearch_core::query::{Filter, FilterScope, QueryCompiler, TextQuery};
use labelsearch_core::schema::ALL_RESPONSES_STATUSES;
use labelsearch_core::{
    Dataset, Field, MetadataProperty, Question, QuestionType, Record, Response, ResponseLayout,
    ResponseStatus, User,
};
use proptest::prelude::*;
use serde_json::{json, Value};

const STATUSES: [ResponseStatus; 3] = ResponseStatus::STORED;
const FILTER_STATUSES: [&str; 4] = ["pending", "draft", "submitted", "discarded"];

fn dataset() -> Dataset {
    let dataset = Dataset::new()
        .with_field(Field::text("text"))
        .with_question(Question::new(
            "label",
            QuestionType::LabelSelection {
                labels: vec!["a".into(), "b".into()],
            },
        ));
    let id = dataset.id;
    dataset
        .with_metadata_property(MetadataProperty::integer(id, "textId"))
        .with_metadata_property(MetadataProperty::terms(id, "split"))
}

fn users() -> Vec<User> {
    ["alice", "bob", "carol"].into_iter().map(User::new).collect()
}

fn record(dataset: &Dataset, users: &[User], statuses: &[Option<usize>], text_id: i64, split: &str) -> Record {
    statuses
        .iter()
        .zip(users)
        .filter_map(|(status, user)| status.map(|s| (s, user)))
        .fold(
            Record::new(dataset.id)
                .with_field("text", "some text")
                .with_metadata("textId", text_id)
                .with_metadata("split", split),
            |record, (status, user)| {
                let id = record.id;
                record.with_response(
                    Response::new(id, user.clone(), STATUSES[status]).with_value("label", "a"),
                )
            },
        )
}

/// Document as the backend indexes it, including `copy_to` targets.
fn indexed(dataset: &Dataset, record: &Record, layout: ResponseLayout) -> Value {
    let mut doc = record_document(dataset, record, layout);
    if layout == ResponseLayout::PerUser {
        let statuses: Vec<Value> = doc
            .get("responses")
            .and_then(Value::as_object)
            .map(|responses| responses.values().map(|r| r["status"].clone()).collect())
            .unwrap_or_default();
        doc[ALL_RESPONSES_STATUSES] = Value::Array(statuses);
    }
    doc
}

fn values_at<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for part in path.split('.') {
        current = current
            .into_iter()
            .filter_map(|v| v.get(part))
            .flat_map(|v| match v {
                Value::Array(items) => items.iter().collect::<Vec<_>>(),
                other => vec![other],
            })
            .collect();
    }
    current
}

/// Lowercased alphanumeric tokens, like the standard analyzer.
fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Values addressed by a `multi_match` field pattern (`fields.*` or a path).
fn text_values<'a>(doc: &'a Value, pattern: &str) -> Vec<&'a Value> {
    match pattern.strip_suffix(".*") {
        Some(prefix) => values_at(doc, prefix)
            .into_iter()
            .filter_map(Value::as_object)
            .flat_map(|object| object.values())
            .collect(),
        None => values_at(doc, pattern),
    }
}

/// Evaluates the subset of the query DSL the compiler emits for filters and
/// text queries.
fn matches(query: &Value, doc: &Value) -> bool {
    let (kind, body) = query
        .as_object()
        .and_then(|obj| obj.iter().next())
        .expect("query clause");
    match kind.as_str() {
        "match_all" => true,
        "terms" | "term" => {
            let (path, expected) = body.as_object().unwrap().iter().next().unwrap();
            let expected: Vec<&Value> = match expected {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            values_at(doc, path).iter().any(|v| expected.contains(v))
        }
        "multi_match" => {
            let query = tokens(body["query"].as_str().unwrap());
            let phrase = body.get("type").and_then(Value::as_str) == Some("phrase");
            body["fields"]
                .as_array()
                .unwrap()
                .iter()
                .flat_map(|field| text_values(doc, field.as_str().unwrap()))
                .filter_map(Value::as_str)
                .any(|text| {
                    let words = tokens(text);
                    if phrase {
                        words.windows(query.len()).any(|w| w == query.as_slice())
                    } else {
                        query.iter().all(|t| words.contains(t))
                    }
                })
        }
        "range" => {
            let (path, bounds) = body.as_object().unwrap().iter().next().unwrap();
            values_at(doc, path).iter().any(|v| {
                let v = v.as_f64().unwrap();
                bounds.get("gte").map_or(true, |b| v >= b.as_f64().unwrap())
                    && bounds.get("lte").map_or(true, |b| v <= b.as_f64().unwrap())
            })
        }
        "nested" => {
            let path = body["path"].as_str().unwrap();
            values_at(doc, path)
                .into_iter()
                .any(|item| matches(&body["query"], &json!({path: item})))
        }
        "bool" => {
            let clauses = |name: &str| body.get(name).and_then(Value::as_array).cloned().unwrap_or_default();
            let must = clauses("must").iter().chain(clauses("filter").iter()).all(|q| matches(q, doc));
            let must_not = clauses("must_not").iter().any(|q| matches(q, doc));
            let should = clauses("should");
            let should_ok = should.is_empty() || should.iter().any(|q| matches(q, doc));
            must && !must_not && should_ok
        }
        other => panic!("unsupported clause {}", other),
    }
}

fn status_filter(status: &str, user: Option<&User>) -> Filter {
    let scope = match user {
        Some(user) => FilterScope::response_status().for_user(user.clone()),
        None => FilterScope::response_status(),
    };
    Filter::on(scope).eq(status)
}

fn layouts() -> [ResponseLayout; 2] {
    [ResponseLayout::Nested, ResponseLayout::PerUser]
}

const BANKING: [(&str, &str); 9] = [
    ("I withdrew cash at the ATM", "neutral"),
    ("The cash machine ate my card", "negative"),
    ("Card payment failed twice", "negative"),
    ("Topping up with cash is not possible", "neutral"),
    ("My transfer has not arrived", "negative"),
    ("The exchange rate was terrible", "negative"),
    ("How do I change my PIN", "neutral"),
    ("Great app, thanks", "positive"),
    ("Where is my new card", "neutral"),
];

fn banking_dataset() -> Dataset {
    let dataset = Dataset::new()
        .with_field(Field::text("text"))
        .with_field(Field::text("sentiment"));
    let id = dataset.id;
    dataset
        .with_metadata_property(MetadataProperty::integer(id, "textId"))
        .with_metadata_property(MetadataProperty::terms(id, "split"))
}

fn banking_documents(dataset: &Dataset, layout: ResponseLayout) -> Vec<Value> {
    BANKING
        .iter()
        .enumerate()
        .map(|(i, (text, sentiment))| {
            let record = Record::new(dataset.id)
                .with_field("text", *text)
                .with_field("sentiment", *sentiment)
                .with_metadata("textId", i as i64)
                .with_metadata("split", if i % 3 == 0 { "test" } else { "train" });
            indexed(dataset, &record, layout)
        })
        .collect()
}

/// Positions of the banking records matched by a compiled query.
fn banking_hits(text: Option<TextQuery>, filter: Option<Filter>, layout: ResponseLayout) -> Vec<usize> {
    let dataset = banking_dataset();
    let query = QueryCompiler::new(&dataset, layout)
        .compile_query(text.as_ref(), filter.as_ref())
        .unwrap();
    banking_documents(&dataset, layout)
        .iter()
        .enumerate()
        .filter(|(_, doc)| matches(&query, doc))
        .map(|(i, _)| i)
        .collect()
}

fn text_hits(q: &str, layout: ResponseLayout) -> Vec<usize> {
    banking_hits(Some(TextQuery::new(q)), None, layout)
}

#[test]
fn test_banking_text_queries() {
    for layout in layouts() {
        assert_eq!(text_hits("cash | negative", layout), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(text_hits("cash + negative", layout), vec![1]);
        assert_eq!(text_hits("cash negative", layout), vec![1]);
        assert_eq!(text_hits("-(cash | negative)", layout), vec![6, 7, 8]);
        assert_eq!(text_hits("card -cash", layout), vec![2, 8]);
        assert_eq!(text_hits("\"cash machine\"", layout), vec![1]);
        assert!(text_hits("\"machine cash\"", layout).is_empty());
    }
}

#[test]
fn test_banking_range_filter() {
    let range = Filter::on(FilterScope::metadata("textId")).between(3, 4);
    for layout in layouts() {
        assert_eq!(banking_hits(None, Some(range.clone()), layout), vec![3, 4]);
    }
}

#[test]
fn test_banking_text_with_filter() {
    let train = Filter::on(FilterScope::metadata("split")).eq("train");
    for layout in layouts() {
        assert_eq!(
            banking_hits(Some(TextQuery::new("cash | negative")), Some(train.clone()), layout),
            vec![1, 2, 4, 5]
        );
    }
}

#[test]
fn test_banking_field_scoped_text() {
    let layout = ResponseLayout::Nested;
    assert!(banking_hits(Some(TextQuery::new("negative").in_field("text")), None, layout).is_empty());
    assert_eq!(
        banking_hits(Some(TextQuery::new("negative").in_field("sentiment")), None, layout),
        vec![1, 2, 4, 5]
    );
}

const VOCABULARY: [&str; 8] = ["cash", "card", "negative", "neutral", "my", "the", "pin", "refund"];

proptest! {
    #[test]
    fn test_text_negation_is_complement(a in 0usize..8, b in 0usize..8, or in any::<bool>()) {
        let op = if or { "|" } else { "+" };
        let q = format!("{} {} {}", VOCABULARY[a], op, VOCABULARY[b]);
        for layout in layouts() {
            let positive = text_hits(&q, layout);
            let negative = text_hits(&format!("-({})", q), layout);
            let complement: Vec<usize> = (0..BANKING.len()).filter(|i| !positive.contains(i)).collect();
            prop_assert_eq!(negative, complement);
        }
    }
}

proptest! {
    #[test]
    fn test_status_filter_completeness(
        statuses in proptest::collection::vec(proptest::option::of(0usize..3), 3)
    ) {
        let dataset = dataset();
        let users = users();
        let record = record(&dataset, &users, &statuses, 1, "train");

        for layout in layouts() {
            let compiler = QueryCompiler::new(&dataset, layout);
            let doc = indexed(&dataset, &record, layout);

            // Any user: pending iff nobody responded, otherwise each present status.
            for status in FILTER_STATUSES {
                let query = compiler.compile_filter(&status_filter(status, None)).unwrap();
                let expected = if status == "pending" {
                    statuses.iter().all(Option::is_none)
                } else {
                    statuses.iter().flatten().any(|s| STATUSES[*s].as_str() == status)
                };
                prop_assert_eq!(matches(&query, &doc), expected, "{:?} {}", layout, status);
            }

            // One user: exactly one status matches.
            for (user, own) in users.iter().zip(&statuses) {
                let hits: Vec<&str> = FILTER_STATUSES
                    .into_iter()
                    .filter(|status| {
                        let query = compiler.compile_filter(&status_filter(status, Some(user))).unwrap();
                        matches(&query, &doc)
                    })
                    .collect();
                let expected = own.map(|s| STATUSES[s].as_str()).unwrap_or("pending");
                prop_assert_eq!(hits, vec![expected], "{:?} {}", layout, user.username);
            }
        }
    }

    #[test]
    fn test_filter_idempotence(
        text_id in 0i64..10,
        split in prop_oneof![Just("train"), Just("test")],
        low in 0i64..10,
        span in 0i64..5,
        statuses in proptest::collection::vec(proptest::option::of(0usize..3), 3),
        status in 0usize..4,
    ) {
        let dataset = dataset();
        let users = users();
        let record = record(&dataset, &users, &statuses, text_id, split);

        let filters = vec![
            Filter::on(FilterScope::metadata("textId")).between(low, low + span),
            Filter::on(FilterScope::metadata("split")).eq("train"),
            status_filter(FILTER_STATUSES[status], None),
            status_filter(FILTER_STATUSES[status], Some(&users[0])),
        ];

        for layout in layouts() {
            let compiler = QueryCompiler::new(&dataset, layout);
            let doc = indexed(&dataset, &record, layout);
            for filter in &filters {
                let once = compiler.compile_filter(filter).unwrap();
                let twice = compiler
                    .compile_filter(&Filter::all(vec![filter.clone(), filter.clone()]))
                    .unwrap();
                prop_assert_eq!(matches(&once, &doc), matches(&twice, &doc));
            }
        }
    }

    #[test]
    fn test_range_is_inclusive(text_id in -50i64..50, low in -50i64..50, span in 0i64..20) {
        let dataset = dataset();
        let record = record(&dataset, &users(), &[], text_id, "train");
        let filter = Filter::on(FilterScope::metadata("textId")).between(low, low + span);
        let compiler = QueryCompiler::new(&dataset, ResponseLayout::Nested);
        let query = compiler.compile_filter(&filter).unwrap();
        let doc = indexed(&dataset, &record, ResponseLayout::Nested);
        prop_assert_eq!(matches(&query, &doc), low <= text_id && text_id <= low + span);
    }
}
