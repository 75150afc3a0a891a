//! Application context: every repository for one pet, built once from
//! [`Config`] and handed to the front ends.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::album::{self, PhotoPatch};
use crate::assistant::{Assistant, AssistantReply};
use crate::config::{Config, RemoteConfig};
use crate::error::{StoreError, SubmitError, ValidationError};
use crate::guard::SubmitGuard;
use crate::intent::ReplyContext;
use crate::llm::{ChatBackend, ChatCompletionsClient, LlmError};
use crate::local::LocalStore;
use crate::record::{
    Alert, CareRecord, ChatMessage, Contact, DietRecord, Entity, Interaction, Photo, PoopRecord,
    WalkRecord,
};
use crate::remote::{PhotoUpload, RemoteStore, RestRemote, TableRemote};
use crate::repository::{
    Change, ChangeKind, DeleteReceipt, Location, Repository, UpdateReceipt, WriteReceipt, new_id,
};
use crate::social::{ContactPatch, PetNode, RelationshipGraph, contact_fields, relationship_graph};
use crate::stats::{
    self, CHART_WEEKS, DailyScore, DailyValue, HealthContext, Period, RECENT_RECORDS, WalkSummary,
    WeeklyDistance,
};

/// Every collection the application stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Diet,
    Poop,
    Walk,
    Care,
    Contacts,
    Interactions,
    Photos,
    Chat,
    Alerts,
}

impl Collection {
    pub const ALL: [Collection; 9] = [
        Self::Diet,
        Self::Poop,
        Self::Walk,
        Self::Care,
        Self::Contacts,
        Self::Interactions,
        Self::Photos,
        Self::Chat,
        Self::Alerts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Diet => DietRecord::COLLECTION,
            Self::Poop => PoopRecord::COLLECTION,
            Self::Walk => WalkRecord::COLLECTION,
            Self::Care => CareRecord::COLLECTION,
            Self::Contacts => Contact::COLLECTION,
            Self::Interactions => Interaction::COLLECTION,
            Self::Photos => Photo::COLLECTION,
            Self::Chat => ChatMessage::COLLECTION,
            Self::Alerts => Alert::COLLECTION,
        }
    }
}

impl FromStr for Collection {
    type Err = String;

    /// Accepts the collection name or its short form (`diet`, `poop`...).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim().to_ascii_lowercase();
        let short = match raw.as_str() {
            "diet" => Some(Self::Diet),
            "poop" => Some(Self::Poop),
            "walk" | "walks" => Some(Self::Walk),
            "care" | "other" => Some(Self::Care),
            "contact" => Some(Self::Contacts),
            "interaction" => Some(Self::Interactions),
            "photo" => Some(Self::Photos),
            "chat" | "messages" => Some(Self::Chat),
            "alert" => Some(Self::Alerts),
            _ => None,
        };
        short
            .or_else(|| Self::ALL.into_iter().find(|c| c.name() == raw))
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|c| c.name()).collect();
                format!("unknown collection '{raw}', expected one of: {}", names.join(", "))
            })
    }
}

/// Recent diet, poop and walk logs, loaded together.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthSnapshot {
    pub diets: Vec<DietRecord>,
    pub poops: Vec<PoopRecord>,
    pub walks: Vec<WalkRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStats {
    pub calories: Vec<DailyValue>,
    pub poop_scores: Vec<DailyScore>,
    pub walks: WalkSummary,
    /// Latest weeks with walks, oldest first.
    pub weekly_walks: Vec<WeeklyDistance>,
}

/// A photo to add to the album.
#[derive(Debug, Clone, Default)]
pub struct NewPhoto {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub taken_at: String,
    pub description: Option<String>,
    /// Empty means tag automatically.
    pub tags: Vec<String>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
}

pub struct PetCare {
    pet_id: String,
    pet_name: String,
    pet_age_months: Option<u32>,
    pub diets: Repository<DietRecord>,
    pub poops: Repository<PoopRecord>,
    pub walks: Repository<WalkRecord>,
    pub care_logs: Repository<CareRecord>,
    pub contacts: Repository<Contact>,
    pub interactions: Repository<Interaction>,
    pub photos: Repository<Photo>,
    pub alerts: Repository<Alert>,
    pub assistant: Assistant,
    uploads: Option<Arc<RestRemote>>,
    upload_guard: SubmitGuard,
    changes: broadcast::Sender<Change>,
}

impl PetCare {
    /// Open the local store and connect the configured remote and chat
    /// backend.
    ///
    /// Only a local store that cannot be opened is an error. A missing
    /// remote or chat backend degrades to local storage and canned replies.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let local = LocalStore::open(&config.data_dir, &config.namespace)?;

        let (remote, uploads): (Option<Arc<dyn RemoteStore>>, Option<Arc<RestRemote>>) =
            match config.remote {
                RemoteConfig::None => {
                    info!("no remote store configured, using local store only");
                    (None, None)
                }
                RemoteConfig::Rest {
                    ref base_url,
                    ref token,
                } => {
                    info!(url = %base_url, "using REST remote store");
                    let rest = Arc::new(RestRemote::new(base_url.clone(), token.clone()));
                    let remote: Arc<dyn RemoteStore> = rest.clone();
                    (Some(remote), Some(rest))
                }
                RemoteConfig::Table {
                    ref project_url,
                    ref api_key,
                } => {
                    info!(url = %project_url, "using table remote store");
                    let table: Arc<dyn RemoteStore> =
                        Arc::new(TableRemote::new(project_url.clone(), api_key.clone()));
                    (Some(table), None)
                }
            };

        let backend: Option<Arc<dyn ChatBackend>> =
            match ChatCompletionsClient::from_config(&config.chat) {
                Ok(client) => Some(Arc::new(client) as Arc<dyn ChatBackend>),
                Err(LlmError::NotConfigured) => {
                    info!("no chat backend configured, assistant will use canned replies");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "chat backend unavailable, assistant will use canned replies");
                    None
                }
            };

        let mut care = Self::new(
            remote,
            local,
            &config.pet_id,
            &config.pet_name,
            backend,
            config.chat.history,
        );
        care.uploads = uploads;
        Ok(care.with_pet_age(config.pet_age_months))
    }

    pub fn new(
        remote: Option<Arc<dyn RemoteStore>>,
        local: LocalStore,
        pet_id: &str,
        pet_name: &str,
        backend: Option<Arc<dyn ChatBackend>>,
        history: usize,
    ) -> Self {
        let (changes, _) = broadcast::channel(256);
        let messages = repo(&remote, &local, pet_id, &changes);
        Self {
            pet_id: pet_id.to_string(),
            pet_name: pet_name.to_string(),
            pet_age_months: None,
            diets: repo(&remote, &local, pet_id, &changes),
            poops: repo(&remote, &local, pet_id, &changes),
            walks: repo(&remote, &local, pet_id, &changes),
            care_logs: repo(&remote, &local, pet_id, &changes),
            contacts: repo(&remote, &local, pet_id, &changes),
            interactions: repo(&remote, &local, pet_id, &changes),
            photos: repo(&remote, &local, pet_id, &changes),
            alerts: repo(&remote, &local, pet_id, &changes),
            assistant: Assistant::new(messages, backend, pet_name, history),
            uploads: None,
            upload_guard: SubmitGuard::new(),
            changes,
        }
    }

    /// Age used for training advice.
    pub fn with_pet_age(mut self, months: Option<u32>) -> Self {
        self.pet_age_months = months;
        self
    }

    pub fn pet_name(&self) -> &str {
        &self.pet_name
    }

    /// Change events from every repository.
    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    pub async fn health_snapshot(&self, limit: Option<usize>) -> HealthSnapshot {
        let (diets, poops, walks) = tokio::join!(
            self.diets.list(limit),
            self.poops.list(limit),
            self.walks.list(limit),
        );
        HealthSnapshot {
            diets,
            poops,
            walks,
        }
    }

    pub async fn stats(&self, period: Period, now: DateTime<Utc>) -> HealthStats {
        let snapshot = self.health_snapshot(None).await;
        HealthStats {
            calories: stats::daily_calories(&snapshot.diets, period, now),
            poop_scores: stats::daily_poop_scores(&snapshot.poops, period, now),
            walks: stats::walk_summary(&snapshot.walks, period, now),
            weekly_walks: stats::weekly_walk_distance(&snapshot.walks, CHART_WEEKS),
        }
    }

    // ------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------

    pub async fn open_alerts(&self) -> Vec<Alert> {
        self.alerts
            .list(None)
            .await
            .into_iter()
            .filter(|a| !a.resolved)
            .collect()
    }

    /// Run the anomaly rules and persist alerts for types that have no open
    /// alert yet. Returns the newly stored alerts.
    pub async fn detect_anomalies(&self, now: DateTime<Utc>) -> Vec<Alert> {
        let (snapshot, open) = tokio::join!(self.health_snapshot(None), self.open_alerts());
        let candidates =
            stats::detect_anomalies(&snapshot.diets, &snapshot.poops, &snapshot.walks, now);

        let mut created = Vec::new();
        for mut alert in candidates {
            if open.iter().any(|a| a.alert_type == alert.alert_type) {
                debug!(alert_type = %alert.alert_type, "alert already open");
                continue;
            }
            match self.alerts.create(alert.clone()).await {
                Ok(receipt) if receipt.location != Location::Dropped => {
                    alert.id = receipt.id;
                    alert.pet_id = self.pet_id.clone();
                    created.push(alert);
                }
                Ok(_) => warn!(alert_type = %alert.alert_type, "alert could not be stored"),
                Err(e) => warn!(alert_type = %alert.alert_type, error = %e, "alert rejected"),
            }
        }
        created
    }

    pub async fn resolve_alert(&self, id: &str) -> UpdateReceipt {
        let mut patch = Map::new();
        patch.insert("resolved".into(), Value::Bool(true));
        self.alerts.update(id, &patch).await
    }

    // ------------------------------------------------------------------
    // Assistant
    // ------------------------------------------------------------------

    pub async fn reply_context(&self) -> ReplyContext {
        let (open, recent) = tokio::join!(
            self.open_alerts(),
            self.health_snapshot(Some(RECENT_RECORDS))
        );
        ReplyContext {
            pet_name: self.pet_name.clone(),
            age_months: self.pet_age_months,
            open_alerts: open.len(),
            last_meal: recent.diets.first().cloned(),
            health: HealthContext::from_recent(&recent.diets, &recent.poops, &recent.walks),
            concerns: stats::health_concerns(&recent.diets, &recent.poops, &recent.walks),
        }
    }

    pub async fn chat(&self, text: &str) -> Result<AssistantReply, SubmitError> {
        let ctx = self.reply_context().await;
        self.assistant.send(text, &ctx).await
    }

    // ------------------------------------------------------------------
    // Album
    // ------------------------------------------------------------------

    /// Add a photo. With a REST remote the binary is uploaded as multipart;
    /// otherwise, or when the upload fails, the image is stored as a
    /// `data:` URL.
    pub async fn add_photo(&self, photo: NewPhoto) -> Result<WriteReceipt, SubmitError> {
        if photo.bytes.is_empty() {
            return Err(ValidationError::required("image").into());
        }
        let _ticket = self.upload_guard.try_begin().ok_or(SubmitError::InFlight)?;

        let mime = album::guess_mime(&photo.file_name);
        let taken_at = if photo.taken_at.trim().is_empty() {
            Utc::now().to_rfc3339()
        } else {
            photo.taken_at
        };
        let tags = if photo.tags.is_empty() {
            album::auto_tags(&taken_at)
        } else {
            photo.tags
        };

        if let Some(ref rest) = self.uploads {
            let upload = PhotoUpload {
                file_name: photo.file_name.clone(),
                mime: mime.to_string(),
                bytes: photo.bytes.clone(),
                pet_id: self.pet_id.clone(),
                taken_at: taken_at.clone(),
                description: photo.description.clone(),
                weight: photo.weight,
                height: photo.height,
                tags: tags.clone(),
            };
            match rest.upload_photo(upload).await {
                Ok(stored) => {
                    let id = stored_id(&stored).unwrap_or_else(new_id);
                    let _ = self.changes.send(Change {
                        collection: Photo::COLLECTION,
                        id: id.clone(),
                        kind: ChangeKind::Created,
                    });
                    return Ok(WriteReceipt {
                        id,
                        location: Location::Remote,
                    });
                }
                Err(e) => warn!(error = %e, "photo upload failed, embedding image"),
            }
        }

        self.photos
            .create(Photo {
                image: album::data_url(mime, &photo.bytes),
                taken_at,
                description: photo.description,
                tags,
                weight: photo.weight,
                height: photo.height,
                ..Default::default()
            })
            .await
    }

    pub async fn update_photo(&self, id: &str, patch: PhotoPatch) -> UpdateReceipt {
        self.photos.update(id, &patch.into_map()).await
    }

    /// Add one tag to a photo. `None` when the photo does not exist.
    pub async fn add_photo_tag(&self, id: &str, tag: &str) -> Option<UpdateReceipt> {
        let photo = self.photos.get(id).await?;
        Some(self.set_photo_tags(id, album::with_tag(&photo, tag)).await)
    }

    pub async fn remove_photo_tag(&self, id: &str, tag: &str) -> Option<UpdateReceipt> {
        let photo = self.photos.get(id).await?;
        Some(self.set_photo_tags(id, album::without_tag(&photo, tag)).await)
    }

    async fn set_photo_tags(&self, id: &str, tags: Vec<String>) -> UpdateReceipt {
        let patch = PhotoPatch {
            tags: Some(tags),
            ..Default::default()
        };
        self.photos.update(id, &patch.into_map()).await
    }

    // ------------------------------------------------------------------
    // Social
    // ------------------------------------------------------------------

    /// Edit a contact. `Ok(None)` when it does not exist.
    pub async fn update_contact(
        &self,
        id: &str,
        patch: ContactPatch,
    ) -> Result<Option<UpdateReceipt>, SubmitError> {
        let Some(contact) = self.contacts.get(id).await else {
            return Ok(None);
        };
        let edited = patch.apply(&contact)?;
        Ok(Some(self.contacts.update(id, &contact_fields(&edited)).await))
    }

    pub async fn relationship_graph(&self) -> RelationshipGraph {
        let (contacts, interactions) =
            tokio::join!(self.contacts.list(None), self.interactions.list(None));
        relationship_graph(
            PetNode {
                id: &self.pet_id,
                name: &self.pet_name,
            },
            &contacts,
            &interactions,
        )
    }

    // ------------------------------------------------------------------
    // Any collection
    // ------------------------------------------------------------------

    /// Records of one collection as JSON, newest first.
    pub async fn list_json(&self, collection: Collection, limit: Option<usize>) -> Vec<Value> {
        match collection {
            Collection::Diet => to_json(self.diets.list(limit).await),
            Collection::Poop => to_json(self.poops.list(limit).await),
            Collection::Walk => to_json(self.walks.list(limit).await),
            Collection::Care => to_json(self.care_logs.list(limit).await),
            Collection::Contacts => to_json(self.contacts.list(limit).await),
            Collection::Interactions => to_json(self.interactions.list(limit).await),
            Collection::Photos => to_json(self.photos.list(limit).await),
            Collection::Chat => {
                // Display order for a conversation is oldest first.
                to_json(self.assistant.history(limit).await)
            }
            Collection::Alerts => to_json(self.alerts.list(limit).await),
        }
    }

    pub async fn delete(&self, collection: Collection, id: &str) -> DeleteReceipt {
        match collection {
            Collection::Diet => self.diets.delete(id).await,
            Collection::Poop => self.poops.delete(id).await,
            Collection::Walk => self.walks.delete(id).await,
            Collection::Care => self.care_logs.delete(id).await,
            Collection::Contacts => self.contacts.delete(id).await,
            Collection::Interactions => self.interactions.delete(id).await,
            Collection::Photos => self.photos.delete(id).await,
            Collection::Chat => self.assistant.delete_message(id).await,
            Collection::Alerts => self.alerts.delete(id).await,
        }
    }
}

fn repo<T: Entity>(
    remote: &Option<Arc<dyn RemoteStore>>,
    local: &LocalStore,
    pet_id: &str,
    changes: &broadcast::Sender<Change>,
) -> Repository<T> {
    Repository::new(remote.clone(), local.clone(), pet_id).with_changes(changes.clone())
}

fn to_json<T: Serialize>(records: Vec<T>) -> Vec<Value> {
    records
        .into_iter()
        .filter_map(|r| serde_json::to_value(r).ok())
        .collect()
}

/// Record id from an upload response, string or numeric.
fn stored_id(stored: &Value) -> Option<String> {
    let id = stored.get("id").or_else(|| stored.pointer("/data/id"))?;
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
