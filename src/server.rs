use std::sync::Arc;

use chrono::Utc;
use rmcp::handler::server::{router::tool::ToolRouter, wrapper::Parameters};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData, ServerHandler, tool, tool_handler, tool_router};
use serde::{Deserialize, Serialize};

use crate::album::{self, PhotoPatch};
use crate::app::{Collection, NewPhoto, PetCare};
use crate::error::SubmitError;
use crate::record::{
    CareKind, CareRecord, Contact, ContactKind, DietRecord, Interaction, PoopRecord, WalkRecord,
};
use crate::repository::{Location, UpdateReceipt, WriteReceipt};
use crate::social::ContactPatch;
use crate::stats::Period;

// ---------------------------------------------------------------------------
// Parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct LogDietParams {
    #[schemars(description = "What was fed, e.g. 'kibble', 'chicken breast'")]
    pub food_type: String,
    #[schemars(description = "Amount in grams")]
    pub amount: f64,
    #[schemars(description = "Calories, if known")]
    pub calories: Option<f64>,
    #[schemars(description = "Feeding time, e.g. '2024-03-10T08:00'. Defaults to now.")]
    pub feed_time: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct LogPoopParams {
    #[schemars(description = "Health score from 1 (very poor) to 5 (healthy)")]
    pub health_score: u8,
    #[schemars(description = "Time, e.g. '2024-03-10T08:00'. Defaults to now.")]
    pub poop_time: Option<String>,
    pub color: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct LogWalkParams {
    #[schemars(description = "Walk start, e.g. '2024-03-10T07:00'")]
    pub start_time: String,
    #[schemars(description = "Walk end, e.g. '2024-03-10T07:45'")]
    pub end_time: String,
    #[schemars(description = "Distance in kilometres")]
    pub distance: f64,
    #[schemars(description = "Route description")]
    pub route_info: String,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct LogCareParams {
    #[schemars(description = "'bath', 'deworm' or 'vaccine' (洗澡/驱虫/疫苗)")]
    pub kind: String,
    #[schemars(description = "When it was done. Defaults to now.")]
    pub time: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct ListParams {
    #[schemars(
        description = "Collection: diet, poop, walk, care, contacts, interactions, photos, chat or alerts"
    )]
    pub collection: String,
    #[schemars(description = "Maximum number of results (default: 20)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct AddContactParams {
    #[schemars(description = "'human' (vet, groomer, neighbour...) or 'dog'")]
    pub kind: String,
    pub name: String,
    #[schemars(description = "Role of a human contact. Required for humans.")]
    pub role: Option<String>,
    pub contact_info: Option<String>,
    #[schemars(description = "Breed of a dog contact. Required for dogs.")]
    pub breed: Option<String>,
    pub owner_name: Option<String>,
    #[schemars(description = "Relationship label shown on the graph edge, e.g. '玩伴'")]
    pub relationship_type: Option<String>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct UpdateContactParams {
    pub id: String,
    #[schemars(description = "Switch to 'human' or 'dog'")]
    pub kind: Option<String>,
    pub name: Option<String>,
    #[schemars(description = "Empty string clears the field")]
    pub role: Option<String>,
    pub contact_info: Option<String>,
    pub breed: Option<String>,
    pub owner_name: Option<String>,
    pub relationship_type: Option<String>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct LogInteractionParams {
    #[schemars(description = "What happened, e.g. 'play', 'vet visit'")]
    pub interaction_type: String,
    #[schemars(description = "'human' or 'dog'")]
    pub target_type: Option<String>,
    #[schemars(description = "Contact id the interaction was with")]
    pub target_id: Option<String>,
    #[schemars(description = "When it happened. Defaults to now.")]
    pub interaction_date: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct AddPhotoParams {
    #[schemars(description = "Path to an image file on this machine")]
    pub file_path: String,
    #[schemars(description = "When the photo was taken. Defaults to now.")]
    pub taken_at: Option<String>,
    pub description: Option<String>,
    #[schemars(description = "Comma-separated tags. Tagged automatically when omitted.")]
    pub tags: Option<String>,
    #[schemars(description = "Weight in kilograms")]
    pub weight: Option<f64>,
    #[schemars(description = "Height in centimetres")]
    pub height: Option<f64>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct UpdatePhotoParams {
    pub id: String,
    pub description: Option<String>,
    #[schemars(description = "Comma-separated tags replacing the current ones")]
    pub tags: Option<String>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct PhotoTagParams {
    pub id: String,
    pub tag: String,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct AlbumParams {
    #[schemars(description = "Only photos from this month, 'YYYY-MM'")]
    pub month: Option<String>,
    #[schemars(description = "Only photos carrying this tag")]
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct DeleteParams {
    #[schemars(description = "Collection the record belongs to")]
    pub collection: String,
    pub id: String,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct ChatParams {
    #[schemars(description = "Question for the pet-care assistant")]
    pub message: String,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct StatsParams {
    #[schemars(description = "'week' (default) or 'month'")]
    pub period: Option<String>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct ResolveAlertParams {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn submit_error(err: SubmitError) -> ErrorData {
    match err {
        SubmitError::Validation(e) => ErrorData::invalid_params(e.to_string(), None),
        SubmitError::InFlight => ErrorData::invalid_request(err.to_string(), None),
    }
}

fn saved(what: &str, receipt: &WriteReceipt) -> CallToolResult {
    let text = match receipt.location {
        Location::Remote => format!("Saved {what} {}", receipt.id),
        Location::Local => format!("Saved {what} {} (stored locally)", receipt.id),
        Location::Dropped => format!("Could not save {what}: local storage failed"),
    };
    CallToolResult::success(vec![Content::text(text)])
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, ErrorData> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ErrorData::internal_error(format!("JSON serialization error: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn parse_collection(raw: &str) -> Result<Collection, ErrorData> {
    raw.parse().map_err(|e: String| ErrorData::invalid_params(e, None))
}

fn or_empty(value: Option<String>) -> String {
    value.unwrap_or_default()
}

fn parse_contact_kind(raw: &str) -> Result<ContactKind, ErrorData> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "human" | "person" => Ok(ContactKind::Human),
        "dog" => Ok(ContactKind::Dog),
        other => Err(ErrorData::invalid_params(
            format!("'kind' must be 'human' or 'dog', got '{other}'"),
            None,
        )),
    }
}

fn updated(what: &str, id: &str, receipt: &UpdateReceipt) -> CallToolResult {
    let text = if receipt.remote || receipt.local {
        format!("Updated {what} {id}")
    } else {
        format!("{what} {id} not found")
    };
    CallToolResult::success(vec![Content::text(text)])
}

// ---------------------------------------------------------------------------
// MCP Server
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PetCareServer {
    care: Arc<PetCare>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl PetCareServer {
    pub fn new(care: Arc<PetCare>) -> Self {
        Self {
            care,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Log a meal. Amount is in grams.")]
    async fn log_diet(
        &self,
        Parameters(p): Parameters<LogDietParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let receipt = self
            .care
            .diets
            .create(DietRecord {
                food_type: p.food_type,
                amount: p.amount,
                calories: p.calories,
                feed_time: or_empty(p.feed_time),
                notes: p.notes,
                ..Default::default()
            })
            .await
            .map_err(submit_error)?;
        Ok(saved("diet record", &receipt))
    }

    #[tool(description = "Log a bathroom break with a 1-5 health score.")]
    async fn log_poop(
        &self,
        Parameters(p): Parameters<LogPoopParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let receipt = self
            .care
            .poops
            .create(PoopRecord {
                poop_time: or_empty(p.poop_time),
                health_score: p.health_score,
                color: p.color,
                notes: p.notes,
                ..Default::default()
            })
            .await
            .map_err(submit_error)?;
        Ok(saved("poop record", &receipt))
    }

    #[tool(description = "Log a walk with its distance and route.")]
    async fn log_walk(
        &self,
        Parameters(p): Parameters<LogWalkParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let receipt = self
            .care
            .walks
            .create(WalkRecord {
                start_time: p.start_time,
                end_time: p.end_time,
                distance: p.distance,
                route_info: p.route_info,
                ..Default::default()
            })
            .await
            .map_err(submit_error)?;
        Ok(saved("walk record", &receipt))
    }

    #[tool(description = "Log routine care: a bath, deworming or a vaccine.")]
    async fn log_care(
        &self,
        Parameters(p): Parameters<LogCareParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let kind = CareKind::parse(&p.kind).ok_or_else(|| {
            ErrorData::invalid_params(
                format!("'kind' must be bath, deworm or vaccine, got '{}'", p.kind),
                None,
            )
        })?;
        let receipt = self
            .care
            .care_logs
            .create(CareRecord {
                kind,
                time: or_empty(p.time),
                notes: p.notes,
                ..Default::default()
            })
            .await
            .map_err(submit_error)?;
        Ok(saved(&format!("{} record", kind.label()), &receipt))
    }

    #[tool(description = "List records of one collection, newest first (chat is oldest first).")]
    async fn list_records(
        &self,
        Parameters(p): Parameters<ListParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let collection = parse_collection(&p.collection)?;
        let rows = self
            .care
            .list_json(collection, Some(p.limit.unwrap_or(20)))
            .await;
        if rows.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(
                "No records found.",
            )]));
        }
        json_result(&rows)
    }

    #[tool(description = "Add a human or dog contact to the pet's social circle.")]
    async fn add_contact(
        &self,
        Parameters(p): Parameters<AddContactParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let kind = parse_contact_kind(&p.kind)?;
        let receipt = self
            .care
            .contacts
            .create(Contact {
                kind,
                name: p.name,
                role: p.role,
                contact_info: p.contact_info,
                breed: p.breed,
                owner_name: p.owner_name,
                relationship_type: p.relationship_type,
                ..Default::default()
            })
            .await
            .map_err(submit_error)?;
        Ok(saved("contact", &receipt))
    }

    #[tool(description = "Edit a contact. Only the given fields change.")]
    async fn update_contact(
        &self,
        Parameters(p): Parameters<UpdateContactParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let patch = ContactPatch {
            kind: p.kind.as_deref().map(parse_contact_kind).transpose()?,
            name: p.name,
            role: p.role,
            contact_info: p.contact_info,
            breed: p.breed,
            owner_name: p.owner_name,
            relationship_type: p.relationship_type,
        };
        if patch.is_empty() {
            return Err(ErrorData::invalid_params("Nothing to update.", None));
        }
        match self.care.update_contact(&p.id, patch).await.map_err(submit_error)? {
            Some(receipt) => Ok(updated("contact", &p.id, &receipt)),
            None => Ok(CallToolResult::success(vec![Content::text(format!(
                "Contact {} not found",
                p.id
            ))])),
        }
    }

    #[tool(description = "Log an interaction with a contact.")]
    async fn log_interaction(
        &self,
        Parameters(p): Parameters<LogInteractionParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let receipt = self
            .care
            .interactions
            .create(Interaction {
                interaction_type: p.interaction_type,
                target_type: or_empty(p.target_type),
                target_id: p.target_id,
                interaction_date: or_empty(p.interaction_date),
                description: p.description,
                ..Default::default()
            })
            .await
            .map_err(submit_error)?;
        Ok(saved("interaction", &receipt))
    }

    #[tool(
        description = "Add a photo to the album from a local image file. Uploaded to the REST backend when configured, embedded as a data URL otherwise."
    )]
    async fn add_photo(
        &self,
        Parameters(p): Parameters<AddPhotoParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let bytes = tokio::fs::read(&p.file_path).await.map_err(|e| {
            ErrorData::invalid_params(format!("cannot read '{}': {e}", p.file_path), None)
        })?;
        let file_name = std::path::Path::new(&p.file_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| p.file_path.clone());
        let receipt = self
            .care
            .add_photo(NewPhoto {
                file_name,
                bytes,
                taken_at: or_empty(p.taken_at),
                description: p.description,
                tags: p.tags.as_deref().map(album::parse_tags).unwrap_or_default(),
                weight: p.weight,
                height: p.height,
            })
            .await
            .map_err(submit_error)?;
        Ok(saved("photo", &receipt))
    }

    #[tool(description = "Edit a photo's description, tags, weight or height.")]
    async fn update_photo(
        &self,
        Parameters(p): Parameters<UpdatePhotoParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let patch = PhotoPatch {
            description: p.description,
            tags: p.tags.as_deref().map(album::parse_tags),
            weight: p.weight,
            height: p.height,
        };
        if patch.is_empty() {
            return Err(ErrorData::invalid_params("Nothing to update.", None));
        }
        let receipt = self.care.update_photo(&p.id, patch).await;
        Ok(updated("photo", &p.id, &receipt))
    }

    #[tool(description = "Add one tag to a photo, keeping its other tags.")]
    async fn add_photo_tag(
        &self,
        Parameters(p): Parameters<PhotoTagParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let receipt = self.care.add_photo_tag(&p.id, &p.tag).await.unwrap_or_default();
        Ok(updated("photo", &p.id, &receipt))
    }

    #[tool(description = "Remove one tag from a photo.")]
    async fn remove_photo_tag(
        &self,
        Parameters(p): Parameters<PhotoTagParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let receipt = self.care.remove_photo_tag(&p.id, &p.tag).await.unwrap_or_default();
        Ok(updated("photo", &p.id, &receipt))
    }

    #[tool(
        description = "Browse the album. Without filters: list months that have photos. With 'month' or 'tag': list matching photos."
    )]
    async fn browse_album(
        &self,
        Parameters(p): Parameters<AlbumParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let photos = self.care.photos.list(None).await;
        if p.month.is_none() && p.tag.is_none() {
            let months = album::months(&photos);
            if months.is_empty() {
                return Ok(CallToolResult::success(vec![Content::text(
                    "No photos yet.",
                )]));
            }
            return Ok(CallToolResult::success(vec![Content::text(
                months.join("\n"),
            )]));
        }

        let mut matching: Vec<_> = photos.iter().collect();
        if let Some(ref month) = p.month {
            let in_month = album::photos_in_month(&photos, month);
            matching.retain(|photo| in_month.iter().any(|m| m.id == photo.id));
        }
        if let Some(ref tag) = p.tag {
            let tagged = album::photos_with_tag(&photos, tag);
            matching.retain(|photo| tagged.iter().any(|t| t.id == photo.id));
        }
        json_result(&matching)
    }

    #[tool(description = "Delete a record from a collection by id.")]
    async fn delete_record(
        &self,
        Parameters(p): Parameters<DeleteParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let collection = parse_collection(&p.collection)?;
        let receipt = self.care.delete(collection, &p.id).await;
        let text = if receipt.remote || receipt.local {
            format!("Deleted {} from {}", p.id, collection.name())
        } else {
            format!("No record {} in {}", p.id, collection.name())
        };
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(
        description = "Ask the pet-care assistant a question. Falls back to built-in advice when no language model is configured."
    )]
    async fn chat(&self, Parameters(p): Parameters<ChatParams>) -> Result<CallToolResult, ErrorData> {
        let reply = self.care.chat(&p.message).await.map_err(submit_error)?;
        Ok(CallToolResult::success(vec![Content::text(reply.text)]))
    }

    #[tool(
        description = "Per-day calorie totals, average poop scores and walk totals for the last week or month."
    )]
    async fn stats(&self, Parameters(p): Parameters<StatsParams>) -> Result<CallToolResult, ErrorData> {
        let period = match p.period.as_deref() {
            None => Period::Week,
            Some(raw) => Period::parse(raw).ok_or_else(|| {
                ErrorData::invalid_params(format!("unknown period '{raw}', use 'week' or 'month'"), None)
            })?,
        };
        json_result(&self.care.stats(period, Utc::now()).await)
    }

    #[tool(
        description = "Relationship graph: the pet, its contacts, labelled edges, and the most recent interactions."
    )]
    async fn relationship_graph(&self) -> Result<CallToolResult, ErrorData> {
        json_result(&self.care.relationship_graph().await)
    }

    #[tool(
        description = "Check recent logs for anomalies (poor poop scores, missed meals, no walks) and record new alerts."
    )]
    async fn detect_anomalies(&self) -> Result<CallToolResult, ErrorData> {
        let created = self.care.detect_anomalies(Utc::now()).await;
        if created.is_empty() {
            let open = self.care.open_alerts().await.len();
            return Ok(CallToolResult::success(vec![Content::text(format!(
                "No new alerts ({open} open)."
            ))]));
        }
        json_result(&created)
    }

    #[tool(description = "Mark an alert as resolved.")]
    async fn resolve_alert(
        &self,
        Parameters(p): Parameters<ResolveAlertParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let receipt = self.care.resolve_alert(&p.id).await;
        let text = if receipt.remote || receipt.local {
            format!("Resolved alert {}", p.id)
        } else {
            format!("Alert {} not found", p.id)
        };
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[tool_handler]
impl ServerHandler for PetCareServer {
    fn get_info(&self) -> ServerInfo {
        let advice = if self.care.assistant.has_backend() {
            "'chat' for advice from the language model"
        } else {
            "'chat' for built-in advice (no language model configured)"
        };
        ServerInfo {
            instructions: Some(format!(
                "Pet-care log for {}. Use 'log_diet', 'log_poop', 'log_walk' and 'log_care' \
                 to record health logs, 'list_records' to read any collection, 'stats' for \
                 charts, 'add_contact', 'update_contact' and 'log_interaction' for the social \
                 circle, 'add_photo', the photo tag tools and 'browse_album' for photos, \
                 {advice}, and 'detect_anomalies' / 'resolve_alert' for alerts.",
                self.care.pet_name()
            )),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
