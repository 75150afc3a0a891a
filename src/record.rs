//! Entity types persisted through [`Repository`](crate::repository::Repository).
//!
//! Every entity carries an opaque writer-assigned `id`, a `pet_id` scope and
//! one primary timestamp field that drives display order. Field aliases
//! accept rows written with the hosted-table column names.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ordering::parse_timestamp;

/// A record type stored in its own collection.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection name, used both as the local store key and the remote
    /// table name.
    const COLLECTION: &'static str;

    /// Name of the primary timestamp field.
    const TIMESTAMP_FIELD: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn pet_id(&self) -> &str;
    fn set_pet_id(&mut self, pet_id: String);
    fn timestamp(&self) -> &str;
    fn set_timestamp(&mut self, ts: String);

    /// Check required fields before any store call.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

macro_rules! entity_accessors {
    ($ts:ident) => {
        fn id(&self) -> &str {
            &self.id
        }
        fn set_id(&mut self, id: String) {
            self.id = id;
        }
        fn pet_id(&self) -> &str {
            &self.pet_id
        }
        fn set_pet_id(&mut self, pet_id: String) {
            self.pet_id = pet_id;
        }
        fn timestamp(&self) -> &str {
            &self.$ts
        }
        fn set_timestamp(&mut self, ts: String) {
            self.$ts = ts;
        }
    };
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::required(field))
    } else {
        Ok(())
    }
}

fn require_opt(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    require(field, value.unwrap_or_default())
}

// ============================================================================
// Health logs
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DietRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub pet_id: String,
    pub food_type: String,
    /// Grams.
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    #[serde(default, alias = "feeding_time")]
    pub feed_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Entity for DietRecord {
    const COLLECTION: &'static str = "diet_records";
    const TIMESTAMP_FIELD: &'static str = "feed_time";

    entity_accessors!(feed_time);

    fn validate(&self) -> Result<(), ValidationError> {
        require("food_type", &self.food_type)?;
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(ValidationError::new("amount", "must be a non-negative number"));
        }
        if let Some(calories) = self.calories
            && (!calories.is_finite() || calories < 0.0)
        {
            return Err(ValidationError::new("calories", "must be a non-negative number"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoopRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub pet_id: String,
    #[serde(default)]
    pub poop_time: String,
    /// 1 (worst) to 5 (best).
    #[serde(alias = "score")]
    pub health_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PoopRecord {
    pub fn is_abnormal(&self) -> bool {
        self.health_score <= 2
    }
}

impl Entity for PoopRecord {
    const COLLECTION: &'static str = "poop_records";
    const TIMESTAMP_FIELD: &'static str = "poop_time";

    entity_accessors!(poop_time);

    fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=5).contains(&self.health_score) {
            return Err(ValidationError::new("health_score", "must be between 1 and 5"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalkRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub pet_id: String,
    #[serde(default, alias = "walk_start")]
    pub start_time: String,
    #[serde(default, alias = "walk_end")]
    pub end_time: String,
    /// Kilometres.
    pub distance: f64,
    #[serde(default, alias = "route")]
    pub route_info: String,
}

impl WalkRecord {
    /// Walk length in whole minutes, when both ends parse.
    pub fn duration_minutes(&self) -> Option<i64> {
        let start = parse_timestamp(&self.start_time)?;
        let end = parse_timestamp(&self.end_time)?;
        Some((end - start).num_minutes())
    }
}

impl Entity for WalkRecord {
    const COLLECTION: &'static str = "walk_records";
    const TIMESTAMP_FIELD: &'static str = "start_time";

    entity_accessors!(start_time);

    fn validate(&self) -> Result<(), ValidationError> {
        if !self.distance.is_finite() || self.distance <= 0.0 {
            return Err(ValidationError::required("distance"));
        }
        require("route_info", &self.route_info)?;
        if self.duration_minutes().is_some_and(|m| m < 0) {
            return Err(ValidationError::new("end_time", "must not be before start_time"));
        }
        Ok(())
    }
}

/// Routine care that is logged but not charted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CareKind {
    #[default]
    Bath,
    Deworm,
    Vaccine,
}

impl CareKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Bath => "洗澡",
            Self::Deworm => "驱虫",
            Self::Vaccine => "疫苗",
        }
    }

    /// English name or Chinese label.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bath" | "洗澡" => Some(Self::Bath),
            "deworm" | "驱虫" => Some(Self::Deworm),
            "vaccine" | "疫苗" => Some(Self::Vaccine),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CareRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub pet_id: String,
    #[serde(alias = "type")]
    pub kind: CareKind,
    #[serde(default)]
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Entity for CareRecord {
    const COLLECTION: &'static str = "other_records";
    const TIMESTAMP_FIELD: &'static str = "time";

    entity_accessors!(time);
}

// ============================================================================
// Social
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    #[default]
    Human,
    Dog,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub pet_id: String,
    #[serde(default, alias = "type")]
    pub kind: ContactKind,
    pub name: String,
    /// Human contacts: vet, groomer, neighbour...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_info: Option<String>,
    /// Dog contacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
    #[serde(default, alias = "owner", skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

impl Entity for Contact {
    const COLLECTION: &'static str = "contacts";
    const TIMESTAMP_FIELD: &'static str = "created_at";

    entity_accessors!(created_at);

    fn validate(&self) -> Result<(), ValidationError> {
        require("name", &self.name)?;
        match self.kind {
            ContactKind::Human => require_opt("role", self.role.as_deref()),
            ContactKind::Dog => require_opt("breed", self.breed.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub pet_id: String,
    #[serde(alias = "type")]
    pub interaction_type: String,
    /// `human` or `dog`; informational only.
    #[serde(default)]
    pub target_type: String,
    /// Contact id; not validated against the contacts collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, alias = "interaction_time")]
    pub interaction_date: String,
    #[serde(default, alias = "notes", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Entity for Interaction {
    const COLLECTION: &'static str = "interactions";
    const TIMESTAMP_FIELD: &'static str = "interaction_date";

    entity_accessors!(interaction_date);

    fn validate(&self) -> Result<(), ValidationError> {
        require("interaction_type", &self.interaction_type)
    }
}

// ============================================================================
// Album
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub pet_id: String,
    /// Remote URL, or a `data:` URL in local-only mode.
    #[serde(alias = "data_url")]
    pub image: String,
    #[serde(default, alias = "photo_time")]
    pub taken_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Kilograms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Centimetres.
    #[serde(default, alias = "length", skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl Entity for Photo {
    const COLLECTION: &'static str = "photos";
    const TIMESTAMP_FIELD: &'static str = "taken_at";

    entity_accessors!(taken_at);

    fn validate(&self) -> Result<(), ValidationError> {
        require("image", &self.image)
    }
}

// ============================================================================
// Assistant
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    #[default]
    User,
    Assistant,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub pet_id: String,
    pub role: ChatRole,
    pub content: String,
    #[serde(default)]
    pub created_at: String,
}

impl Entity for ChatMessage {
    const COLLECTION: &'static str = "chat_messages";
    const TIMESTAMP_FIELD: &'static str = "created_at";

    entity_accessors!(created_at);

    fn validate(&self) -> Result<(), ValidationError> {
        require("content", &self.content)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub pet_id: String,
    pub alert_type: String,
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub created_at: String,
}

impl Entity for Alert {
    const COLLECTION: &'static str = "alerts";
    const TIMESTAMP_FIELD: &'static str = "created_at";

    entity_accessors!(created_at);

    fn validate(&self) -> Result<(), ValidationError> {
        require("alert_type", &self.alert_type)?;
        require("message", &self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_walk_requires_distance_and_route() {
        let walk = WalkRecord {
            distance: 0.0,
            route_info: "park".into(),
            ..Default::default()
        };
        assert_eq!(walk.validate().unwrap_err().field, "distance");

        let walk = WalkRecord {
            distance: 1.5,
            ..Default::default()
        };
        assert_eq!(walk.validate().unwrap_err().field, "route_info");
    }

    #[test]
    fn test_walk_rejects_negative_duration() {
        let walk = WalkRecord {
            start_time: "2024-01-01T09:00".into(),
            end_time: "2024-01-01T08:30".into(),
            distance: 2.0,
            route_info: "river".into(),
            ..Default::default()
        };
        assert_eq!(walk.validate().unwrap_err().field, "end_time");
    }

    #[test]
    fn test_walk_duration_minutes() {
        let walk = WalkRecord {
            start_time: "2024-01-01T08:00".into(),
            end_time: "2024-01-01T08:45".into(),
            ..Default::default()
        };
        assert_eq!(walk.duration_minutes(), Some(45));
    }

    #[test]
    fn test_contact_required_fields_depend_on_kind() {
        let human = Contact {
            name: "Dr. Li".into(),
            ..Default::default()
        };
        assert_eq!(human.validate().unwrap_err().field, "role");

        let dog = Contact {
            kind: ContactKind::Dog,
            name: "Mochi".into(),
            role: Some("friend".into()),
            ..Default::default()
        };
        assert_eq!(dog.validate().unwrap_err().field, "breed");

        let dog = Contact {
            breed: Some("Shiba".into()),
            ..dog
        };
        assert!(dog.validate().is_ok());
    }

    #[test]
    fn test_poop_score_range() {
        let mut poop = PoopRecord::default();
        assert!(poop.validate().is_err());
        poop.health_score = 2;
        assert!(poop.validate().is_ok());
        assert!(poop.is_abnormal());
    }

    #[test]
    fn test_diet_deserializes_without_writer_fields() {
        let diet: DietRecord =
            serde_json::from_value(json!({"food_type": "kibble", "amount": 100})).unwrap();
        assert!(diet.id.is_empty());
        assert_eq!(diet.amount, 100.0);
        assert!(diet.validate().is_ok());
    }

    #[test]
    fn test_hosted_table_field_names_are_accepted() {
        let diet: DietRecord = serde_json::from_value(
            json!({"food_type": "kibble", "amount": 100, "feeding_time": "2024-01-01T08:00"}),
        )
        .unwrap();
        assert_eq!(diet.feed_time, "2024-01-01T08:00");

        let poop: PoopRecord =
            serde_json::from_value(json!({"poop_time": "2024-01-01T09:00", "score": 4})).unwrap();
        assert_eq!(poop.health_score, 4);

        let walk: WalkRecord = serde_json::from_value(json!({
            "walk_start": "2024-01-01T07:00",
            "walk_end": "2024-01-01T07:40",
            "distance": 2.0,
            "route": "river",
            "duration_minutes": 40
        }))
        .unwrap();
        assert_eq!(walk.duration_minutes(), Some(40));
        assert_eq!(walk.route_info, "river");

        let photo: Photo = serde_json::from_value(json!({
            "data_url": "data:image/png;base64,AA==",
            "photo_time": "2024-01-01T10:00",
            "length": 40.5
        }))
        .unwrap();
        assert_eq!(photo.taken_at, "2024-01-01T10:00");
        assert_eq!(photo.height, Some(40.5));

        let interaction: Interaction = serde_json::from_value(json!({
            "type": "play",
            "interaction_time": "2024-01-01T11:00",
            "notes": "fetch"
        }))
        .unwrap();
        assert_eq!(interaction.interaction_type, "play");
        assert_eq!(interaction.interaction_date, "2024-01-01T11:00");

        let contact: Contact =
            serde_json::from_value(json!({"type": "dog", "name": "Mochi", "owner": "Li"})).unwrap();
        assert_eq!(contact.kind, ContactKind::Dog);
        assert_eq!(contact.owner_name.as_deref(), Some("Li"));
    }

    #[test]
    fn test_care_record_wire_format() {
        let record: CareRecord =
            serde_json::from_value(json!({"type": "vaccine", "time": "2024-01-01"})).unwrap();
        assert_eq!(record.kind, CareKind::Vaccine);
        assert_eq!(record.kind.label(), "疫苗");
        assert_eq!(serde_json::to_value(&record).unwrap()["kind"], "vaccine");
        assert_eq!(CareKind::parse("驱虫"), Some(CareKind::Deworm));
        assert_eq!(CareKind::parse("Bath"), Some(CareKind::Bath));
        assert_eq!(CareKind::parse("groom"), None);
    }

    #[test]
    fn test_contact_kind_wire_format() {
        let contact = Contact {
            kind: ContactKind::Dog,
            name: "Mochi".into(),
            breed: Some("Shiba".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&contact).unwrap();
        assert_eq!(value["kind"], "dog");
        assert!(value.get("role").is_none());
    }
}
