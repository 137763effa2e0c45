//! Dataset definitions: fields, questions, metadata properties and vector settings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of content a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Free text, full-text analyzed.
    Text,
    /// List of `{role, content}` turns; content is full-text analyzed.
    Chat,
    /// Image URL or data URI. Stored, never indexed.
    Image,
    /// Arbitrary structured JSON. Stored, never indexed.
    Custom,
}

impl FieldType {
    /// Returns true if field content goes through the full-text analyzer.
    #[inline]
    pub fn is_searchable(&self) -> bool {
        matches!(self, FieldType::Text | FieldType::Chat)
    }
}

/// A record field declared on a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }
}

/// Question type and its answer options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    Rating { values: Vec<i64> },
    LabelSelection { labels: Vec<String> },
    MultiLabelSelection { labels: Vec<String> },
    Ranking { values: Vec<String> },
}

impl QuestionType {
    /// Checks that `value` is a valid answer for this question.
    ///
    /// Used for both responses and suggestions.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            QuestionType::Text => value.is_string(),
            QuestionType::Rating { values } => value
                .as_i64()
                .map(|v| values.contains(&v))
                .unwrap_or(false),
            QuestionType::LabelSelection { labels } => value
                .as_str()
                .map(|v| labels.iter().any(|l| l == v))
                .unwrap_or(false),
            QuestionType::MultiLabelSelection { labels } => value
                .as_array()
                .map(|items| {
                    items.iter().all(|item| {
                        item.as_str()
                            .map(|v| labels.iter().any(|l| l == v))
                            .unwrap_or(false)
                    })
                })
                .unwrap_or(false),
            QuestionType::Ranking { values } => value
                .as_array()
                .map(|items| {
                    items.iter().all(|item| {
                        let known = item
                            .get("value")
                            .and_then(Value::as_str)
                            .map(|v| values.iter().any(|known| known == v))
                            .unwrap_or(false);
                        let rank_ok = match item.get("rank") {
                            None | Some(Value::Null) => true,
                            Some(rank) => rank.as_u64().is_some(),
                        };
                        known && rank_ok
                    })
                })
                .unwrap_or(false),
        }
    }
}

/// A question annotators answer for every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub name: String,
    #[serde(flatten)]
    pub question_type: QuestionType,
}

impl Question {
    pub fn new(name: impl Into<String>, question_type: QuestionType) -> Self {
        Self {
            name: name.into(),
            question_type,
        }
    }
}

/// Metadata property type with its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetadataType {
    Terms {
        #[serde(default)]
        values: Option<Vec<String>>,
    },
    Integer {
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
    },
    Float {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
}

impl MetadataType {
    /// Returns true for integer and float properties.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, MetadataType::Integer { .. } | MetadataType::Float { .. })
    }
}

/// A filterable metadata property configured on a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataProperty {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub metadata_type: MetadataType,
}

impl MetadataProperty {
    pub fn new(dataset_id: Uuid, name: impl Into<String>, metadata_type: MetadataType) -> Self {
        Self {
            id: Uuid::new_v4(),
            dataset_id,
            name: name.into(),
            metadata_type,
        }
    }

    pub fn terms(dataset_id: Uuid, name: impl Into<String>) -> Self {
        Self::new(dataset_id, name, MetadataType::Terms { values: None })
    }

    pub fn integer(dataset_id: Uuid, name: impl Into<String>) -> Self {
        Self::new(dataset_id, name, MetadataType::Integer { min: None, max: None })
    }

    pub fn float(dataset_id: Uuid, name: impl Into<String>) -> Self {
        Self::new(dataset_id, name, MetadataType::Float { min: None, max: None })
    }
}

/// Vector settings: one k-NN field per settings entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSettings {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub name: String,
    pub dimensions: usize,
}

impl VectorSettings {
    pub fn new(dataset_id: Uuid, name: impl Into<String>, dimensions: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            dataset_id,
            name: name.into(),
            dimensions,
        }
    }

    /// Physical field name, keyed by id so renames never need a reindex.
    #[inline]
    pub fn field_name(&self) -> String {
        self.id.to_string()
    }
}

/// A dataset definition. Owns exactly one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub metadata_properties: Vec<MetadataProperty>,
    #[serde(default)]
    pub vectors_settings: Vec<VectorSettings>,
}

impl Dataset {
    /// Creates an empty dataset definition with a fresh id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            fields: Vec::new(),
            questions: Vec::new(),
            metadata_properties: Vec::new(),
            vectors_settings: Vec::new(),
        }
    }

    /// Adds a field. Chainable.
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a question. Chainable.
    pub fn with_question(mut self, question: Question) -> Self {
        self.questions.push(question);
        self
    }

    /// Adds a metadata property, rebinding it to this dataset. Chainable.
    pub fn with_metadata_property(mut self, mut property: MetadataProperty) -> Self {
        property.dataset_id = self.id;
        self.metadata_properties.push(property);
        self
    }

    /// Adds vector settings, rebinding them to this dataset. Chainable.
    pub fn with_vector_settings(mut self, mut settings: VectorSettings) -> Self {
        settings.dataset_id = self.id;
        self.vectors_settings.push(settings);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn question(&self, name: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.name == name)
    }

    pub fn metadata_property(&self, name: &str) -> Option<&MetadataProperty> {
        self.metadata_properties.iter().find(|p| p.name == name)
    }

    pub fn vector_settings(&self, id: &Uuid) -> Option<&VectorSettings> {
        self.vectors_settings.iter().find(|v| &v.id == id)
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_question_accepts_rating() {
        let q = QuestionType::Rating {
            values: vec![1, 2, 3],
        };
        assert!(q.accepts(&json!(2)));
        assert!(!q.accepts(&json!(5)));
        assert!(!q.accepts(&json!("2")));
    }

    #[test]
    fn test_question_accepts_labels() {
        let single = QuestionType::LabelSelection {
            labels: vec!["positive".into(), "negative".into()],
        };
        assert!(single.accepts(&json!("positive")));
        assert!(!single.accepts(&json!("neutral")));

        let multi = QuestionType::MultiLabelSelection {
            labels: vec!["a".into(), "b".into()],
        };
        assert!(multi.accepts(&json!(["a", "b"])));
        assert!(multi.accepts(&json!([])));
        assert!(!multi.accepts(&json!(["a", "c"])));
        assert!(!multi.accepts(&json!("a")));
    }

    #[test]
    fn test_question_accepts_ranking() {
        let q = QuestionType::Ranking {
            values: vec!["x".into(), "y".into()],
        };
        assert!(q.accepts(&json!([{"value": "x", "rank": 1}, {"value": "y"}])));
        assert!(!q.accepts(&json!([{"value": "z", "rank": 1}])));
        assert!(!q.accepts(&json!([{"value": "x", "rank": "first"}])));
    }

    #[test]
    fn test_dataset_builder_rebinds_children() {
        let dataset = Dataset::new()
            .with_field(Field::text("text"))
            .with_metadata_property(MetadataProperty::integer(Uuid::nil(), "textId"))
            .with_vector_settings(VectorSettings::new(Uuid::nil(), "emb", 3));

        assert_eq!(dataset.metadata_properties[0].dataset_id, dataset.id);
        assert_eq!(dataset.vectors_settings[0].dataset_id, dataset.id);
        assert!(dataset.field("text").is_some());
        assert!(dataset.metadata_property("textId").is_some());
        assert!(dataset.question("missing").is_none());
    }

    #[test]
    fn test_question_serde_shape() {
        let q = Question::new(
            "sentiment",
            QuestionType::LabelSelection {
                labels: vec!["pos".into()],
            },
        );
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(
            json,
            json!({"name": "sentiment", "type": "label_selection", "labels": ["pos"]})
        );
        let back: Question = serde_json::from_value(json).unwrap();
        assert_eq!(back, q);
    }
}
