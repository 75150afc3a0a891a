//! Relationship graph built from contacts and interactions, and contact
//! edits.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::ValidationError;
use crate::ordering::sort_newest_first;
use crate::record::{Contact, ContactKind, Entity, Interaction};

/// Interactions listed under the graph.
pub const RECENT_INTERACTIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Pet,
    Human,
    Dog,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    /// Role for people, breed for dogs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Interactions logged against this contact.
    pub interactions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub recent: Vec<Interaction>,
}

/// The pet at the centre of the graph.
#[derive(Debug, Clone)]
pub struct PetNode<'a> {
    pub id: &'a str,
    pub name: &'a str,
}

/// Build the graph: the pet first, then contacts in list order with one
/// edge from the pet to each, then the most recent interactions.
///
/// Contacts sharing an id collapse into the first one seen.
pub fn relationship_graph(
    pet: PetNode<'_>,
    contacts: &[Contact],
    interactions: &[Interaction],
) -> RelationshipGraph {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for target in interactions.iter().filter_map(|i| i.target_id.as_deref()) {
        *counts.entry(target).or_default() += 1;
    }

    let mut by_id: IndexMap<&str, &Contact> = IndexMap::new();
    for contact in contacts {
        by_id.entry(contact.id.as_str()).or_insert(contact);
    }

    let mut nodes = Vec::with_capacity(by_id.len() + 1);
    nodes.push(GraphNode {
        id: pet.id.to_string(),
        label: pet.name.to_string(),
        kind: NodeKind::Pet,
        detail: None,
    });
    let mut edges = Vec::with_capacity(by_id.len());
    for (id, contact) in by_id {
        let (kind, detail) = match contact.kind {
            ContactKind::Human => (NodeKind::Human, contact.role.clone()),
            ContactKind::Dog => (NodeKind::Dog, contact.breed.clone()),
        };
        nodes.push(GraphNode {
            id: id.to_string(),
            label: contact.name.clone(),
            kind,
            detail,
        });
        edges.push(GraphEdge {
            from: pet.id.to_string(),
            to: id.to_string(),
            label: contact.relationship_type.clone(),
            interactions: counts.get(id).copied().unwrap_or(0),
        });
    }

    let mut recent = interactions.to_vec();
    sort_newest_first(&mut recent, |i| i.interaction_date.as_str());
    recent.truncate(RECENT_INTERACTIONS);

    RelationshipGraph {
        nodes,
        edges,
        recent,
    }
}

// ============================================================================
// Contact edits
// ============================================================================

/// Edited contact fields. `None` leaves a field unchanged and a blank string
/// clears an optional one. Switching `kind` drops the fields only the other
/// kind carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactPatch {
    pub kind: Option<ContactKind>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub contact_info: Option<String>,
    pub breed: Option<String>,
    pub owner_name: Option<String>,
    pub relationship_type: Option<String>,
}

fn edit(field: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        let value = value.trim();
        *field = (!value.is_empty()).then(|| value.to_string());
    }
}

impl ContactPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// The edited contact, validated like a new one.
    pub fn apply(&self, contact: &Contact) -> Result<Contact, ValidationError> {
        let mut edited = contact.clone();
        if let Some(kind) = self.kind {
            edited.kind = kind;
        }
        if let Some(ref name) = self.name {
            edited.name = name.trim().to_string();
        }
        edit(&mut edited.role, &self.role);
        edit(&mut edited.contact_info, &self.contact_info);
        edit(&mut edited.breed, &self.breed);
        edit(&mut edited.owner_name, &self.owner_name);
        edit(&mut edited.relationship_type, &self.relationship_type);
        match edited.kind {
            ContactKind::Human => {
                edited.breed = None;
                edited.owner_name = None;
            }
            ContactKind::Dog => edited.role = None,
        }
        edited.validate()?;
        Ok(edited)
    }
}

/// Every editable field of `contact` as a patch; cleared fields are `null`.
pub fn contact_fields(contact: &Contact) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("kind".into(), json!(contact.kind));
    map.insert("name".into(), json!(contact.name));
    map.insert("role".into(), json!(contact.role));
    map.insert("contact_info".into(), json!(contact.contact_info));
    map.insert("breed".into(), json!(contact.breed));
    map.insert("owner_name".into(), json!(contact.owner_name));
    map.insert("relationship_type".into(), json!(contact.relationship_type));
    map
}
