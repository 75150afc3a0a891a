//! Chat assistant: persists the conversation, asks the model, and falls
//! back to canned replies when the model cannot answer.

use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use tracing::{debug, warn};

use crate::error::SubmitError;
use crate::intent::{Intent, ReplyContext, canned_reply, classify};
use crate::llm::{ChatBackend, LlmError, Message, Role};
use crate::ordering::parse_timestamp;
use crate::record::{ChatMessage, ChatRole, Entity};
use crate::repository::{DeleteReceipt, Repository};

/// Shown when the model does not answer within the configured timeout.
pub const TIMEOUT_REPLY: &str = "抱歉，助手响应超时了，请稍后再试。";

/// Shown when the model answered in a format we cannot read.
pub const FORMAT_REPLY: &str = "抱歉，暂时无法理解助手返回的内容格式，请稍后再试。";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    /// Generated by the chat backend.
    Model,
    /// Keyword fallback.
    Canned,
    /// A visible error message.
    Error,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Canned => "canned",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantReply {
    pub text: String,
    pub source: ReplySource,
    pub intent: Intent,
}

#[derive(Clone)]
pub struct Assistant {
    messages: Repository<ChatMessage>,
    backend: Option<Arc<dyn ChatBackend>>,
    pet_name: String,
    history: usize,
}

impl Assistant {
    pub fn new(
        messages: Repository<ChatMessage>,
        backend: Option<Arc<dyn ChatBackend>>,
        pet_name: impl Into<String>,
        history: usize,
    ) -> Self {
        Self {
            messages,
            backend,
            pet_name: pet_name.into(),
            history,
        }
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    fn system_prompt(&self, ctx: &ReplyContext) -> String {
        let health = &ctx.health;
        format!(
            "你是一位专业的宠物护理助手，正在帮助主人照顾狗狗{}。以下是{}最近的健康数据：\n\
             最近饮食记录：{}条，平均分量：{:.0}克\n\
             最近便便记录：{}条，平均评分：{:.1}/5\n\
             最近遛狗记录：{}次，总距离：{:.1}公里\n\n\
             请根据这些数据，用简洁友好的中文回答健康、训练和饮食方面的问题；\
             遇到严重症状时提醒主人及时就医。回复时使用清晰的分段，不要使用星号标记。",
            self.pet_name,
            self.pet_name,
            health.diet_count,
            health.avg_amount,
            health.poop_count,
            health.avg_score,
            health.walk_count,
            health.total_distance
        )
    }

    /// Send one user message and return the assistant's reply.
    ///
    /// Both sides of the exchange are persisted. Only validation and
    /// double-submit errors are returned.
    pub async fn send(&self, text: &str, ctx: &ReplyContext) -> Result<AssistantReply, SubmitError> {
        let content = text.trim().to_string();
        let mut question = ChatMessage {
            role: ChatRole::User,
            content,
            ..Default::default()
        };
        question.validate()?;

        // Newest first.
        let recent = self.messages.list(Some(self.history)).await;
        let asked_at = next_stamp(recent.first().and_then(|m| parse_timestamp(&m.created_at)));
        question.created_at = format_stamp(asked_at);
        let prompt = question.content.clone();
        self.messages.create(question).await?;

        let mut conversation = Vec::with_capacity(recent.len() + 2);
        conversation.push(Message::new(Role::System, self.system_prompt(ctx)));
        conversation.extend(recent.iter().rev().map(|m| {
            let role = match m.role {
                ChatRole::User => Role::User,
                ChatRole::Assistant => Role::Assistant,
            };
            Message::new(role, m.content.clone())
        }));
        conversation.push(Message::new(Role::User, prompt.clone()));

        let intent = classify(&prompt);
        let outcome = match self.backend {
            Some(ref backend) => backend.complete(&conversation).await,
            None => Err(LlmError::NotConfigured),
        };
        let (text, source) = match outcome {
            Ok(completion) => (completion.text, ReplySource::Model),
            Err(LlmError::Timeout) => {
                warn!("chat backend timed out");
                (TIMEOUT_REPLY.to_string(), ReplySource::Error)
            }
            Err(e @ (LlmError::UnrecognizedSchema | LlmError::Parse(_))) => {
                warn!(error = %e, "chat backend response not understood");
                (FORMAT_REPLY.to_string(), ReplySource::Error)
            }
            Err(LlmError::NotConfigured) => {
                debug!(intent = intent.as_str(), "no chat backend, using canned reply");
                (canned_reply(intent, ctx), ReplySource::Canned)
            }
            Err(e) => {
                warn!(error = %e, intent = intent.as_str(), "chat backend failed, using canned reply");
                (canned_reply(intent, ctx), ReplySource::Canned)
            }
        };

        let answer = ChatMessage {
            role: ChatRole::Assistant,
            content: text.clone(),
            created_at: format_stamp(next_stamp(Some(asked_at))),
            ..Default::default()
        };
        if let Err(e) = self.messages.create(answer).await {
            warn!(error = %e, "assistant reply not persisted");
        }

        Ok(AssistantReply {
            text,
            source,
            intent,
        })
    }

    pub async fn delete_message(&self, id: &str) -> DeleteReceipt {
        self.messages.delete(id).await
    }

    /// The most recent `limit` messages (all when `None`), oldest first.
    pub async fn history(&self, limit: Option<usize>) -> Vec<ChatMessage> {
        let mut messages = self.messages.list(limit).await;
        messages.reverse();
        messages
    }
}

/// Now at millisecond precision, or one millisecond after `floor` when the
/// clock has not moved past it. Stored stamps keep only milliseconds, so the
/// comparison must too.
fn next_stamp(floor: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(3);
    match floor.map(|f| f.trunc_subsecs(3)) {
        Some(floor) if now <= floor => floor + Duration::milliseconds(1),
        _ => now,
    }
}

fn format_stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
