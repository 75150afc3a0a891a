use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use pawlog::album::{self, PhotoPatch};
use pawlog::app::{NewPhoto, PetCare};
use pawlog::record::{
    CareKind, CareRecord, Contact, ContactKind, DietRecord, Entity, Interaction, PoopRecord,
    WalkRecord,
};
use pawlog::repository::{Location, WriteReceipt};
use pawlog::social::ContactPatch;
use pawlog::stats::Period;
use pawlog::{Collection, Config, SubmitError};

#[derive(Parser)]
#[command(
    name = "pawlog-cli",
    about = "pawlog: pet-care logs and assistant"
)]
struct Cli {
    /// Output machine-readable JSON (default: human-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Ask the assistant directly (same as the `chat` subcommand)
    #[arg(short, long)]
    prompt: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Log a meal
    Diet {
        #[arg(long)]
        food: String,
        #[arg(long, help = "Amount in grams")]
        amount: f64,
        #[arg(long)]
        calories: Option<f64>,
        #[arg(long, help = "Feeding time, e.g. 2024-03-10T08:00 (default: now)")]
        time: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Log a bathroom break
    Poop {
        #[arg(long, help = "Health score 1-5")]
        score: u8,
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Log a walk
    Walk {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long, help = "Distance in kilometres")]
        distance: f64,
        #[arg(long)]
        route: String,
    },
    /// Log a bath, deworming or vaccine
    Care {
        #[arg(long, help = "bath, deworm or vaccine")]
        kind: String,
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List records of a collection
    List {
        /// diet, poop, walk, care, contacts, interactions, photos, chat or alerts
        collection: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Add a human or dog contact
    Contact {
        #[arg(long, default_value = "human", help = "human or dog")]
        kind: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        info: Option<String>,
        #[arg(long)]
        breed: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        relationship: Option<String>,
    },
    /// Edit a contact; an empty value clears an optional field
    EditContact {
        id: String,
        #[arg(long, help = "human or dog")]
        kind: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        info: Option<String>,
        #[arg(long)]
        breed: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        relationship: Option<String>,
    },
    /// Log an interaction with a contact
    Interact {
        #[arg(long = "type")]
        interaction_type: String,
        #[arg(long, help = "Contact id")]
        target: Option<String>,
        #[arg(long, default_value = "human")]
        target_type: String,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Add a photo from an image file
    Photo {
        file: PathBuf,
        #[arg(long)]
        taken_at: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, help = "Comma-separated tags")]
        tags: Option<String>,
        #[arg(long, help = "Weight in kilograms")]
        weight: Option<f64>,
        #[arg(long, help = "Height in centimetres")]
        height: Option<f64>,
    },
    /// Edit photo details
    EditPhoto {
        id: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, help = "Comma-separated tags replacing the current ones")]
        tags: Option<String>,
        #[arg(long)]
        weight: Option<f64>,
        #[arg(long)]
        height: Option<f64>,
    },
    /// Add a tag to a photo, or remove it with --remove
    Tag {
        id: String,
        tag: String,
        #[arg(long)]
        remove: bool,
    },
    /// Browse the album by month or tag
    Album {
        #[arg(long, help = "YYYY-MM")]
        month: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Delete a record
    Delete { collection: String, id: String },
    /// Ask the assistant
    Chat {
        /// Message (positional, collects remaining args)
        message: Vec<String>,
    },
    /// Show recent conversation, oldest first
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Chart data for the last week or month
    Stats {
        #[arg(long, default_value = "week")]
        period: String,
    },
    /// Show the relationship graph
    Graph,
    /// List open alerts
    Alerts {
        #[arg(long, help = "Run anomaly detection first")]
        check: bool,
    },
    /// Mark an alert as resolved
    Resolve { id: String },
}

// ============================================================================
// Output Formatting
// ============================================================================

const HIDDEN_FIELDS: &[&str] = &["id", "pet_id", "image"];

/// Format a single record for prose output: id header, then non-empty
/// fields with capitalized names.
fn format_item(item: &Value) {
    let id = item["id"].as_str().unwrap_or("?");
    println!("{id}");

    if let Some(obj) = item.as_object() {
        for (attr_name, attr_value) in obj {
            if HIDDEN_FIELDS.contains(&attr_name.as_str()) || attr_value.is_null() {
                continue;
            }
            let display_value = match attr_value {
                Value::String(s) if s.is_empty() => continue,
                Value::String(s) => s.clone(),
                Value::Array(a) if a.is_empty() => continue,
                Value::Array(a) => a
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .collect::<Vec<_>>()
                    .join(", "),
                other => other.to_string(),
            };
            println!("  {}: {display_value}", capitalize_first(&attr_name.replace('_', " ")));
        }
    }
}

/// Format multiple records, separated by blank lines.
fn format_items(items: &[Value]) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            println!();
        }
        format_item(item);
    }
}

/// Capitalize the first letter of a string.
fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_saved(json: bool, what: &str, result: Result<WriteReceipt, SubmitError>) {
    let receipt = match result {
        Ok(receipt) => receipt,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    if json {
        let location = match receipt.location {
            Location::Remote => "remote",
            Location::Local => "local",
            Location::Dropped => "dropped",
        };
        println!(
            "{}",
            serde_json::json!({"id": receipt.id, "location": location})
        );
        return;
    }
    match receipt.location {
        Location::Remote => eprintln!("Saved {what} {}", receipt.id),
        Location::Local => eprintln!("Saved {what} {} (stored locally)", receipt.id),
        Location::Dropped => {
            eprintln!("Could not save {what}: local storage failed");
            std::process::exit(1);
        }
    }
}

fn parse_collection(raw: &str) -> Collection {
    raw.parse().unwrap_or_else(|e: String| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    })
}

fn parse_contact_kind(raw: &str) -> ContactKind {
    match raw.to_ascii_lowercase().as_str() {
        "human" | "person" => ContactKind::Human,
        "dog" => ContactKind::Dog,
        other => {
            eprintln!("Error: --kind must be 'human' or 'dog', got '{other}'");
            std::process::exit(1);
        }
    }
}

fn to_values<T: Entity>(records: &[T]) -> Vec<Value> {
    records
        .iter()
        .filter_map(|r| serde_json::to_value(r).ok())
        .collect()
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let care = PetCare::from_config(&config)?;

    let command = match (cli.command, cli.prompt) {
        (Some(command), _) => command,
        (None, Some(prompt)) => Command::Chat {
            message: vec![prompt],
        },
        (None, None) => {
            Cli::parse_from(["pawlog-cli", "--help"]);
            return Ok(());
        }
    };

    match command {
        Command::Diet {
            food,
            amount,
            calories,
            time,
            notes,
        } => {
            let result = care
                .diets
                .create(DietRecord {
                    food_type: food,
                    amount,
                    calories,
                    feed_time: time.unwrap_or_default(),
                    notes,
                    ..Default::default()
                })
                .await;
            report_saved(cli.json, "diet record", result);
        }
        Command::Poop {
            score,
            time,
            color,
            notes,
        } => {
            let result = care
                .poops
                .create(PoopRecord {
                    poop_time: time.unwrap_or_default(),
                    health_score: score,
                    color,
                    notes,
                    ..Default::default()
                })
                .await;
            report_saved(cli.json, "poop record", result);
        }
        Command::Walk {
            start,
            end,
            distance,
            route,
        } => {
            let result = care
                .walks
                .create(WalkRecord {
                    start_time: start,
                    end_time: end,
                    distance,
                    route_info: route,
                    ..Default::default()
                })
                .await;
            report_saved(cli.json, "walk record", result);
        }
        Command::Care { kind, time, notes } => {
            let Some(kind) = CareKind::parse(&kind) else {
                eprintln!("Error: --kind must be bath, deworm or vaccine, got '{kind}'");
                std::process::exit(1);
            };
            let result = care
                .care_logs
                .create(CareRecord {
                    kind,
                    time: time.unwrap_or_default(),
                    notes,
                    ..Default::default()
                })
                .await;
            report_saved(cli.json, &format!("{} record", kind.label()), result);
        }
        Command::List { collection, limit } => {
            let collection = parse_collection(&collection);
            let rows = care.list_json(collection, Some(limit)).await;
            if cli.json {
                print_json(&rows)?;
            } else if rows.is_empty() {
                eprintln!("No records found in {}.", collection.name());
            } else {
                format_items(&rows);
            }
        }
        Command::Contact {
            kind,
            name,
            role,
            info,
            breed,
            owner,
            relationship,
        } => {
            let kind = parse_contact_kind(&kind);
            let result = care
                .contacts
                .create(Contact {
                    kind,
                    name,
                    role,
                    contact_info: info,
                    breed,
                    owner_name: owner,
                    relationship_type: relationship,
                    ..Default::default()
                })
                .await;
            report_saved(cli.json, "contact", result);
        }
        Command::EditContact {
            id,
            kind,
            name,
            role,
            info,
            breed,
            owner,
            relationship,
        } => {
            let patch = ContactPatch {
                kind: kind.as_deref().map(parse_contact_kind),
                name,
                role,
                contact_info: info,
                breed,
                owner_name: owner,
                relationship_type: relationship,
            };
            if patch.is_empty() {
                eprintln!("Error: nothing to update.");
                std::process::exit(1);
            }
            match care.update_contact(&id, patch).await {
                Ok(Some(_)) => eprintln!("Updated contact {id}"),
                Ok(None) => eprintln!("Contact {id} not found"),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Interact {
            interaction_type,
            target,
            target_type,
            date,
            description,
        } => {
            let result = care
                .interactions
                .create(Interaction {
                    interaction_type,
                    target_type,
                    target_id: target,
                    interaction_date: date.unwrap_or_default(),
                    description,
                    ..Default::default()
                })
                .await;
            report_saved(cli.json, "interaction", result);
        }
        Command::Photo {
            file,
            taken_at,
            description,
            tags,
            weight,
            height,
        } => {
            let bytes = tokio::fs::read(&file)
                .await
                .map_err(|e| format!("cannot read {}: {e}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let result = care
                .add_photo(NewPhoto {
                    file_name,
                    bytes,
                    taken_at: taken_at.unwrap_or_default(),
                    description,
                    tags: tags.as_deref().map(album::parse_tags).unwrap_or_default(),
                    weight,
                    height,
                })
                .await;
            report_saved(cli.json, "photo", result);
        }
        Command::EditPhoto {
            id,
            description,
            tags,
            weight,
            height,
        } => {
            let patch = PhotoPatch {
                description,
                tags: tags.as_deref().map(album::parse_tags),
                weight,
                height,
            };
            if patch.is_empty() {
                eprintln!("Error: nothing to update. Pass --description, --tags, --weight or --height.");
                std::process::exit(1);
            }
            let receipt = care.update_photo(&id, patch).await;
            if receipt.remote || receipt.local {
                eprintln!("Updated photo {id}");
            } else {
                eprintln!("Photo {id} not found");
            }
        }
        Command::Tag { id, tag, remove } => {
            let receipt = if remove {
                care.remove_photo_tag(&id, &tag).await
            } else {
                care.add_photo_tag(&id, &tag).await
            };
            match receipt {
                Some(_) => eprintln!("Updated photo {id}"),
                None => eprintln!("Photo {id} not found"),
            }
        }
        Command::Album { month, tag } => {
            let photos = care.photos.list(None).await;
            if month.is_none() && tag.is_none() {
                let months = album::months(&photos);
                if cli.json {
                    print_json(&months)?;
                } else if months.is_empty() {
                    eprintln!("No photos yet.");
                } else {
                    for month in &months {
                        let count = album::photos_in_month(&photos, month).len();
                        println!("{month} ({count} photos)");
                    }
                }
            } else {
                let mut matching = photos;
                if let Some(ref month) = month {
                    matching.retain(|p| album::month_of(p).as_deref() == Some(month.as_str()));
                }
                if let Some(ref tag) = tag {
                    matching.retain(|p| p.tags.iter().any(|t| t == tag));
                }
                let rows = to_values(&matching);
                if cli.json {
                    print_json(&rows)?;
                } else if rows.is_empty() {
                    eprintln!("No matching photos.");
                } else {
                    format_items(&rows);
                }
            }
        }
        Command::Delete { collection, id } => {
            let collection = parse_collection(&collection);
            let receipt = care.delete(collection, &id).await;
            if receipt.remote || receipt.local {
                eprintln!("Deleted {id} from {}", collection.name());
            } else {
                eprintln!("No record {id} in {}", collection.name());
            }
        }
        Command::Chat { message } => {
            let text = message.join(" ");
            match care.chat(&text).await {
                Ok(reply) if cli.json => print_json(&serde_json::json!({
                    "reply": reply.text,
                    "source": reply.source.as_str(),
                    "intent": reply.intent.as_str(),
                }))?,
                Ok(reply) => println!("{}", reply.text),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::History { limit } => {
            let messages = care.assistant.history(Some(limit)).await;
            if cli.json {
                print_json(&messages)?;
            } else if messages.is_empty() {
                eprintln!("No conversation yet.");
            } else {
                for m in &messages {
                    let who = match m.role {
                        pawlog::record::ChatRole::User => "You",
                        pawlog::record::ChatRole::Assistant => "Assistant",
                    };
                    println!("[{}] {who}: {}", m.created_at, m.content);
                }
            }
        }
        Command::Stats { period } => {
            let Some(period) = Period::parse(&period) else {
                eprintln!("Error: --period must be 'week' or 'month'");
                std::process::exit(1);
            };
            let stats = care.stats(period, Utc::now()).await;
            if cli.json {
                print_json(&stats)?;
            } else {
                println!("Calories per day:");
                for day in &stats.calories {
                    println!("  {}: {:.0}", day.date, day.value);
                }
                println!("Poop scores:");
                if stats.poop_scores.is_empty() {
                    println!("  (none)");
                }
                for day in &stats.poop_scores {
                    println!(
                        "  {}: {:.1} ({:?}, {} records)",
                        day.date, day.average, day.band, day.count
                    );
                }
                println!(
                    "Walks: {} walks, {:.1} km, {} minutes",
                    stats.walks.walks, stats.walks.total_distance, stats.walks.total_minutes
                );
                if !stats.weekly_walks.is_empty() {
                    println!("Walk distance per week:");
                    for week in &stats.weekly_walks {
                        println!("  week of {}: {:.1} km", week.week_start, week.distance);
                    }
                }
            }
        }
        Command::Graph => {
            let graph = care.relationship_graph().await;
            if cli.json {
                print_json(&graph)?;
            } else {
                if let Some(pet) = graph.nodes.first() {
                    println!("{}", pet.label);
                }
                for (node, edge) in graph.nodes.iter().skip(1).zip(&graph.edges) {
                    let label = edge.label.as_deref().unwrap_or("-");
                    let detail = node.detail.as_deref().unwrap_or("");
                    println!(
                        "  └─ {} [{label}] {detail} ({} interactions)",
                        node.label, edge.interactions
                    );
                }
                if !graph.recent.is_empty() {
                    println!();
                    println!("Recent interactions:");
                    for i in &graph.recent {
                        println!("  {} {}", i.interaction_date, i.interaction_type);
                    }
                }
            }
        }
        Command::Alerts { check } => {
            if check {
                let created = care.detect_anomalies(Utc::now()).await;
                if !cli.json {
                    eprintln!("{} new alerts", created.len());
                }
            }
            let open = care.open_alerts().await;
            if cli.json {
                print_json(&open)?;
            } else if open.is_empty() {
                eprintln!("No open alerts.");
            } else {
                for alert in &open {
                    println!(
                        "{} [{:?}] {}: {}",
                        alert.id, alert.severity, alert.alert_type, alert.message
                    );
                }
            }
        }
        Command::Resolve { id } => {
            let receipt = care.resolve_alert(&id).await;
            if receipt.remote || receipt.local {
                eprintln!("Resolved alert {id}");
            } else {
                eprintln!("Alert {id} not found");
            }
        }
    }

    Ok(())
}
