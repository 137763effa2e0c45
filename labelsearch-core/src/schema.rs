//! Schema compiler: dataset definition to index mapping and settings.
//!
//! Compilation is a pure function of the dataset, the dialect and the engine
//! configuration. JSON objects keep insertion order, so compiling the same
//! dataset twice yields byte-identical output.

use serde_json::{json, Map, Value};

use crate::config::EngineConfig;
use crate::dialect::{Dialect, ResponseLayout};
use crate::model::{Dataset, Field, FieldType, MetadataProperty, MetadataType, QuestionType};

/// Denormalized keyword field holding every user's response status.
pub const ALL_RESPONSES_STATUSES: &str = "all_responses_statuses";

/// Setting key of the backend's mapping field cap.
pub const TOTAL_FIELDS_LIMIT_SETTING: &str = "mapping.total_fields.limit";

/// Compiled index creation body.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSchema {
    pub settings: Value,
    pub mappings: Value,
}

impl IndexSchema {
    /// Body for the index creation request.
    pub fn to_body(&self) -> Value {
        json!({
            "settings": self.settings,
            "mappings": self.mappings,
        })
    }
}

/// Compiles settings and mappings for a dataset's index.
pub fn compile_index(dataset: &Dataset, dialect: Dialect, config: &EngineConfig) -> IndexSchema {
    IndexSchema {
        settings: index_settings(dialect, config),
        mappings: compile_mappings(dataset, dialect),
    }
}

/// Index settings: shards, replicas, result window and field limit.
pub fn index_settings(dialect: Dialect, config: &EngineConfig) -> Value {
    let mut settings = Map::new();
    settings.insert("number_of_shards".into(), json!(config.number_of_shards));
    settings.insert("number_of_replicas".into(), json!(config.number_of_replicas));
    settings.insert("max_result_window".into(), json!(config.max_result_window));
    settings.insert(
        TOTAL_FIELDS_LIMIT_SETTING.into(),
        json!(config.total_fields_limit),
    );
    settings.extend(dialect.extra_index_settings());
    Value::Object(settings)
}

/// Compiles the full mapping document.
pub fn compile_mappings(dataset: &Dataset, dialect: Dialect) -> Value {
    let layout = dialect.response_layout();

    let mut properties = Map::new();
    properties.insert("id".into(), json!({"type": "keyword"}));
    properties.insert("status".into(), json!({"type": "keyword"}));
    properties.insert("inserted_at".into(), json!({"type": "date_nanos"}));
    properties.insert("updated_at".into(), json!({"type": "date_nanos"}));
    properties.insert("fields".into(), fields_mapping(&dataset.fields));
    properties.insert(
        "metadata".into(),
        metadata_mapping(&dataset.metadata_properties),
    );
    properties.insert("responses".into(), responses_mapping(dataset, layout));
    if layout == ResponseLayout::PerUser {
        properties.insert(ALL_RESPONSES_STATUSES.into(), json!({"type": "keyword"}));
    }
    properties.insert("suggestions".into(), suggestions_mapping(dataset));
    properties.insert("vectors".into(), vectors_mapping(dataset, dialect));

    let mut mappings = Map::new();
    mappings.insert("dynamic".into(), json!("strict"));

    let excludes: Vec<String> = dataset
        .fields
        .iter()
        .filter(|f| !f.field_type.is_searchable())
        .map(|f| format!("fields.{}", f.name))
        .collect();
    if !excludes.is_empty() {
        mappings.insert("_source".into(), json!({"excludes": excludes}));
    }

    if layout == ResponseLayout::PerUser {
        mappings.insert(
            "dynamic_templates".into(),
            Value::Array(per_user_dynamic_templates(dataset)),
        );
    }

    mappings.insert("properties".into(), Value::Object(properties));
    Value::Object(mappings)
}

fn field_mapping(field: &Field) -> Value {
    match field.field_type {
        FieldType::Text => json!({"type": "text"}),
        FieldType::Chat => json!({
            "properties": {
                "role": {"type": "keyword"},
                "content": {"type": "text"},
            }
        }),
        FieldType::Image | FieldType::Custom => json!({"type": "object", "enabled": false}),
    }
}

fn fields_mapping(fields: &[Field]) -> Value {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|f| (f.name.clone(), field_mapping(f)))
        .collect();
    json!({"properties": properties})
}

/// Physical type of a question's answer, shared by responses and suggestions.
pub fn question_value_mapping(question_type: &QuestionType) -> Value {
    match question_type {
        QuestionType::Text => json!({"type": "text", "index": false}),
        QuestionType::Rating { .. } => json!({"type": "integer"}),
        QuestionType::LabelSelection { .. } | QuestionType::MultiLabelSelection { .. } => {
            json!({"type": "keyword"})
        }
        QuestionType::Ranking { .. } => json!({
            "properties": {
                "value": {"type": "keyword"},
                "rank": {"type": "integer"},
            }
        }),
    }
}

/// Mapping of a single metadata property.
pub fn metadata_property_mapping(property: &MetadataProperty) -> Value {
    match property.metadata_type {
        MetadataType::Terms { .. } => json!({"type": "keyword"}),
        MetadataType::Integer { .. } => json!({"type": "long"}),
        MetadataType::Float { .. } => json!({"type": "float"}),
    }
}

/// The `metadata` object: typed configured properties, everything else kept
/// in the source but never indexed.
pub fn metadata_mapping(properties: &[MetadataProperty]) -> Value {
    let mapped: Map<String, Value> = properties
        .iter()
        .map(|p| (p.name.clone(), metadata_property_mapping(p)))
        .collect();
    json!({"dynamic": "false", "properties": mapped})
}

/// The `vectors` object: one k-NN field per vector settings id.
pub fn vectors_mapping(dataset: &Dataset, dialect: Dialect) -> Value {
    let mapped: Map<String, Value> = dataset
        .vectors_settings
        .iter()
        .map(|v| (v.field_name(), dialect.vector_mapping(v.dimensions)))
        .collect();
    json!({"properties": mapped})
}

fn responses_mapping(dataset: &Dataset, layout: ResponseLayout) -> Value {
    match layout {
        ResponseLayout::Nested => {
            let mut properties = Map::new();
            properties.insert("id".into(), json!({"type": "keyword"}));
            properties.insert("status".into(), json!({"type": "keyword"}));
            properties.insert("user_id".into(), json!({"type": "keyword"}));
            for question in &dataset.questions {
                properties.insert(
                    question.name.clone(),
                    question_value_mapping(&question.question_type),
                );
            }
            json!({"type": "nested", "properties": properties})
        }
        ResponseLayout::PerUser => json!({"type": "object", "dynamic": true}),
    }
}

fn per_user_dynamic_templates(dataset: &Dataset) -> Vec<Value> {
    let mut templates = vec![json!({
        "status_responses": {
            "path_match": "responses.*.status",
            "mapping": {
                "type": "keyword",
                "copy_to": ALL_RESPONSES_STATUSES,
            }
        }
    })];

    for question in &dataset.questions {
        let path = format!("responses.*.values.{}", question.name);
        match &question.question_type {
            QuestionType::Ranking { .. } => {
                templates.push(json!({
                    format!("{}_value_responses", question.name): {
                        "path_match": format!("{path}.value"),
                        "mapping": {"type": "keyword"},
                    }
                }));
                templates.push(json!({
                    format!("{}_rank_responses", question.name): {
                        "path_match": format!("{path}.rank"),
                        "mapping": {"type": "integer"},
                    }
                }));
            }
            other => templates.push(json!({
                format!("{}_responses", question.name): {
                    "path_match": path,
                    "mapping": question_value_mapping(other),
                }
            })),
        }
    }
    templates
}

fn suggestions_mapping(dataset: &Dataset) -> Value {
    let properties: Map<String, Value> = dataset
        .questions
        .iter()
        .map(|q| {
            (
                q.name.clone(),
                json!({
                    "properties": {
                        "type": {"type": "keyword"},
                        "agent": {"type": "keyword"},
                        "score": {"type": "float"},
                        "value": question_value_mapping(&q.question_type),
                    }
                }),
            )
        })
        .collect();
    json!({"properties": properties})
}

/// Counts declared fields the way the backend does for its field limit:
/// every entry under a `properties` object, objects included.
pub fn count_mapping_fields(mapping: &Value) -> u64 {
    mapping
        .get("properties")
        .and_then(Value::as_object)
        .map(|properties| {
            properties
                .values()
                .map(|child| 1 + count_mapping_fields(child))
                .sum()
        })
        .unwrap_or(0)
}

/// Fields added to the mapping by one new responding user under
/// [`ResponseLayout::PerUser`]: the user object, `status`, `values` and one
/// entry per question (three for rankings).
pub fn per_user_field_count(dataset: &Dataset) -> u64 {
    let questions: u64 = dataset
        .questions
        .iter()
        .map(|q| match q.question_type {
            QuestionType::Ranking { .. } => 3,
            _ => 1,
        })
        .sum();
    3 + questions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Question, VectorSettings};
    use uuid::Uuid;

    fn test_dataset() -> Dataset {
        let id = Uuid::new_v4();
        Dataset::with_id(id)
            .with_field(Field::text("text"))
            .with_field(Field::new("conversation", FieldType::Chat))
            .with_field(Field::new("picture", FieldType::Image))
            .with_question(Question::new(
                "label",
                QuestionType::LabelSelection {
                    labels: vec!["positive".into(), "negative".into()],
                },
            ))
            .with_question(Question::new("comment", QuestionType::Text))
            .with_question(Question::new(
                "rating",
                QuestionType::Rating {
                    values: vec![1, 2, 3],
                },
            ))
            .with_metadata_property(MetadataProperty::terms(id, "split"))
            .with_metadata_property(MetadataProperty::integer(id, "textId"))
            .with_metadata_property(MetadataProperty::float(id, "score"))
            .with_vector_settings(VectorSettings::new(id, "embedding", 4))
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let dataset = test_dataset();
        let config = EngineConfig::default();
        for dialect in [Dialect::Elasticsearch, Dialect::OpenSearch] {
            let a = serde_json::to_string(&compile_index(&dataset, dialect, &config).to_body())
                .unwrap();
            let b = serde_json::to_string(&compile_index(&dataset, dialect, &config).to_body())
                .unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_fixed_top_level_fields() {
        let mappings = compile_mappings(&test_dataset(), Dialect::Elasticsearch);
        let props = &mappings["properties"];
        assert_eq!(mappings["dynamic"], "strict");
        assert_eq!(props["id"]["type"], "keyword");
        assert_eq!(props["status"]["type"], "keyword");
        assert_eq!(props["inserted_at"]["type"], "date_nanos");
        assert_eq!(props["updated_at"]["type"], "date_nanos");
    }

    #[test]
    fn test_field_mappings() {
        let mappings = compile_mappings(&test_dataset(), Dialect::Elasticsearch);
        let fields = &mappings["properties"]["fields"]["properties"];
        assert_eq!(fields["text"]["type"], "text");
        assert_eq!(fields["conversation"]["properties"]["content"]["type"], "text");
        assert_eq!(fields["picture"]["enabled"], false);
        assert_eq!(mappings["_source"]["excludes"], json!(["fields.picture"]));
    }

    #[test]
    fn test_metadata_mapping() {
        let mappings = compile_mappings(&test_dataset(), Dialect::OpenSearch);
        let metadata = &mappings["properties"]["metadata"];
        assert_eq!(metadata["dynamic"], "false");
        assert_eq!(metadata["properties"]["split"]["type"], "keyword");
        assert_eq!(metadata["properties"]["textId"]["type"], "long");
        assert_eq!(metadata["properties"]["score"]["type"], "float");
    }

    #[test]
    fn test_nested_responses_mapping() {
        let mappings = compile_mappings(&test_dataset(), Dialect::OpenSearch);
        let responses = &mappings["properties"]["responses"];
        assert_eq!(responses["type"], "nested");
        assert_eq!(responses["properties"]["user_id"]["type"], "keyword");
        assert_eq!(responses["properties"]["label"]["type"], "keyword");
        assert_eq!(responses["properties"]["rating"]["type"], "integer");
        assert_eq!(responses["properties"]["comment"]["index"], false);
        assert!(mappings.get("dynamic_templates").is_none());
        assert!(mappings["properties"].get(ALL_RESPONSES_STATUSES).is_none());
    }

    #[test]
    fn test_per_user_responses_mapping() {
        let mappings = compile_mappings(&test_dataset(), Dialect::Elasticsearch);
        assert_eq!(mappings["properties"]["responses"]["dynamic"], true);
        assert_eq!(
            mappings["properties"][ALL_RESPONSES_STATUSES]["type"],
            "keyword"
        );

        let templates = mappings["dynamic_templates"].as_array().unwrap();
        let status = &templates[0]["status_responses"];
        assert_eq!(status["path_match"], "responses.*.status");
        assert_eq!(status["mapping"]["copy_to"], ALL_RESPONSES_STATUSES);

        let label = templates
            .iter()
            .find_map(|t| t.get("label_responses"))
            .unwrap();
        assert_eq!(label["path_match"], "responses.*.values.label");
        assert_eq!(label["mapping"]["type"], "keyword");
    }

    #[test]
    fn test_suggestions_mapping_mirrors_questions() {
        let mappings = compile_mappings(&test_dataset(), Dialect::Elasticsearch);
        let suggestions = &mappings["properties"]["suggestions"]["properties"];
        assert_eq!(suggestions["label"]["properties"]["value"]["type"], "keyword");
        assert_eq!(suggestions["rating"]["properties"]["value"]["type"], "integer");
        assert_eq!(suggestions["label"]["properties"]["score"]["type"], "float");
    }

    #[test]
    fn test_vectors_keyed_by_settings_id() {
        let dataset = test_dataset();
        let settings = &dataset.vectors_settings[0];
        let mappings = compile_mappings(&dataset, Dialect::Elasticsearch);
        let vector = &mappings["properties"]["vectors"]["properties"][settings.id.to_string()];
        assert_eq!(vector["dims"], 4);
        assert!(mappings["properties"]["vectors"]["properties"]
            .get("embedding")
            .is_none());
    }

    #[test]
    fn test_settings() {
        let config = EngineConfig::default()
            .with_max_result_window(50_000)
            .with_total_fields_limit(3_000);
        let es = index_settings(Dialect::Elasticsearch, &config);
        assert_eq!(es["max_result_window"], 50_000);
        assert_eq!(es[TOTAL_FIELDS_LIMIT_SETTING], 3_000);
        assert!(es.get("index.knn").is_none());

        let os = index_settings(Dialect::OpenSearch, &config);
        assert_eq!(os["index.knn"], true);
    }

    #[test]
    fn test_count_mapping_fields() {
        let mapping = json!({
            "properties": {
                "a": {"type": "keyword"},
                "b": {"properties": {"c": {"type": "text"}, "d": {"type": "long"}}},
            }
        });
        assert_eq!(count_mapping_fields(&mapping), 4);
        assert_eq!(per_user_field_count(&test_dataset()), 6);
    }
}
