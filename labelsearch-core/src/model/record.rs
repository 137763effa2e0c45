//! Records and the annotations attached to them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Record completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Pending,
    Completed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Completed => "completed",
        }
    }
}

/// Stored status of a user's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Draft,
    Submitted,
    Discarded,
}

impl ResponseStatus {
    /// All statuses that are physically stored.
    pub const STORED: [ResponseStatus; 3] = [
        ResponseStatus::Draft,
        ResponseStatus::Submitted,
        ResponseStatus::Discarded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Draft => "draft",
            ResponseStatus::Submitted => "submitted",
            ResponseStatus::Discarded => "discarded",
        }
    }
}

/// Identity used to scope responses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
        }
    }
}

/// One user's answers for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    pub record_id: Uuid,
    pub user: User,
    /// Answer per question name.
    #[serde(default)]
    pub values: HashMap<String, Value>,
    pub status: ResponseStatus,
}

impl Response {
    pub fn new(record_id: Uuid, user: User, status: ResponseStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            record_id,
            user,
            values: HashMap::new(),
            status,
        }
    }

    /// Sets the answer to a question. Chainable.
    pub fn with_value<V: Into<Value>>(mut self, question: impl Into<String>, value: V) -> Self {
        self.values.insert(question.into(), value.into());
        self
    }
}

/// Who produced a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    Model,
    Human,
}

impl SuggestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionType::Model => "model",
            SuggestionType::Human => "human",
        }
    }
}

/// A pre-filled answer for one question of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: Uuid,
    pub record_id: Uuid,
    pub question_name: String,
    pub value: Value,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default, rename = "type")]
    pub suggestion_type: Option<SuggestionType>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl Suggestion {
    pub fn new<V: Into<Value>>(record_id: Uuid, question_name: impl Into<String>, value: V) -> Self {
        Self {
            id: Uuid::new_v4(),
            record_id,
            question_name: question_name.into(),
            value: value.into(),
            agent: None,
            suggestion_type: None,
            score: None,
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_type(mut self, suggestion_type: SuggestionType) -> Self {
        self.suggestion_type = Some(suggestion_type);
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// The atomic indexable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub dataset_id: Uuid,
    /// Field content per field name.
    #[serde(default)]
    pub fields: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub status: RecordStatus,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub responses: Vec<Response>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    /// Vector per vector settings id.
    #[serde(default)]
    pub vectors: HashMap<Uuid, Vec<f32>>,
}

impl Record {
    /// Creates an empty pending record stamped with the current time.
    pub fn new(dataset_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            dataset_id,
            fields: HashMap::new(),
            metadata: HashMap::new(),
            status: RecordStatus::Pending,
            inserted_at: now,
            updated_at: now,
            responses: Vec::new(),
            suggestions: Vec::new(),
            vectors: HashMap::new(),
        }
    }

    /// Sets a field value. Chainable.
    pub fn with_field<V: Into<Value>>(mut self, name: impl Into<String>, value: V) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Sets a metadata value. Chainable.
    pub fn with_metadata<V: Into<Value>>(mut self, name: impl Into<String>, value: V) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    /// Adds a response, rebinding it to this record. Chainable.
    pub fn with_response(mut self, mut response: Response) -> Self {
        response.record_id = self.id;
        self.responses.push(response);
        self
    }

    /// Adds a suggestion, rebinding it to this record. Chainable.
    pub fn with_suggestion(mut self, mut suggestion: Suggestion) -> Self {
        suggestion.record_id = self.id;
        self.suggestions.push(suggestion);
        self
    }

    /// Sets the vector for a vector settings id. Chainable.
    pub fn with_vector(mut self, settings_id: Uuid, vector: Vec<f32>) -> Self {
        self.vectors.insert(settings_id, vector);
        self
    }

    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = status;
        self
    }
}
