//! In-memory provider fakes for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::flow::data::LogLevel;
use crate::flow::state::FlowContextState;
use crate::model::{
    Channel, CommandSpec, Guild, HttpResponse, Member, Message, MessageData, Role, User,
};
use crate::resume::{EntityLinks, ResumePoint, ResumePointKind};
use crate::thing::Thing;

use super::provider::{
    AiProvider, ChatCompletionParams, DiscordProvider, EvalProvider, FlowProviders, HttpProvider,
    HttpRequest, LogProvider, MessageTemplateProvider, ProviderError, ResumePointProvider,
    VariableProvider,
};

/// Records every effect and fabricates plausible objects for lookups, so
/// tests can drive flows without a wire client.
#[derive(Default)]
pub struct FakeDiscord {
    next_message_id: AtomicU64,
    pub sent_messages: Mutex<Vec<(String, MessageData)>>,
    pub edited_messages: Mutex<Vec<(String, String, MessageData)>>,
    pub deleted_messages: Mutex<Vec<(String, String)>>,
    pub responses: Mutex<Vec<super::provider::InteractionResponse>>,
    pub followups: Mutex<Vec<MessageData>>,
    pub moderation_calls: Mutex<Vec<String>>,
    pub deployed_commands: Mutex<Vec<Vec<CommandSpec>>>,
    responded_tokens: Mutex<FxHashSet<String>>,
}

impl FakeDiscord {
    fn next_message(&self, channel_id: &str, data: &MessageData) -> Message {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1;
        Message {
            id: id.to_string(),
            channel_id: channel_id.to_owned(),
            guild_id: None,
            author: None,
            content: data.content.clone(),
        }
    }
}

#[async_trait]
impl DiscordProvider for FakeDiscord {
    async fn guild(&self, guild_id: &str) -> Result<Guild, ProviderError> {
        Ok(Guild {
            id: guild_id.to_owned(),
            name: format!("guild-{guild_id}"),
            description: None,
        })
    }

    async fn channel(&self, channel_id: &str) -> Result<Channel, ProviderError> {
        Ok(Channel {
            id: channel_id.to_owned(),
            name: Some(format!("channel-{channel_id}")),
            guild_id: None,
            topic: None,
        })
    }

    async fn user(&self, user_id: &str) -> Result<User, ProviderError> {
        Ok(User {
            id: user_id.to_owned(),
            username: format!("user-{user_id}"),
            global_name: None,
            bot: false,
        })
    }

    async fn member(&self, _guild_id: &str, user_id: &str) -> Result<Member, ProviderError> {
        Ok(Member {
            user: self.user(user_id).await?,
            nick: None,
            roles: vec![],
            joined_at: None,
        })
    }

    async fn role(&self, _guild_id: &str, role_id: &str) -> Result<Role, ProviderError> {
        Ok(Role {
            id: role_id.to_owned(),
            name: format!("role-{role_id}"),
            position: 0,
        })
    }

    async fn message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Message, ProviderError> {
        Ok(Message {
            id: message_id.to_owned(),
            channel_id: channel_id.to_owned(),
            guild_id: None,
            author: None,
            content: String::new(),
        })
    }

    async fn create_message(
        &self,
        channel_id: &str,
        data: MessageData,
    ) -> Result<Message, ProviderError> {
        let message = self.next_message(channel_id, &data);
        self.sent_messages
            .lock()
            .push((channel_id.to_owned(), data));
        Ok(message)
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        data: MessageData,
    ) -> Result<Message, ProviderError> {
        let message = Message {
            id: message_id.to_owned(),
            channel_id: channel_id.to_owned(),
            guild_id: None,
            author: None,
            content: data.content.clone(),
        };
        self.edited_messages
            .lock()
            .push((channel_id.to_owned(), message_id.to_owned(), data));
        Ok(message)
    }

    async fn delete_message(
        &self,
        channel_id: &str,
        message_id: &str,
        _reason: Option<String>,
    ) -> Result<(), ProviderError> {
        self.deleted_messages
            .lock()
            .push((channel_id.to_owned(), message_id.to_owned()));
        Ok(())
    }

    async fn create_private_channel(&self, user_id: &str) -> Result<Channel, ProviderError> {
        Ok(Channel {
            id: format!("dm-{user_id}"),
            name: None,
            guild_id: None,
            topic: None,
        })
    }

    async fn create_interaction_response(
        &self,
        _interaction_id: &str,
        token: &str,
        response: super::provider::InteractionResponse,
    ) -> Result<(), ProviderError> {
        self.responded_tokens.lock().insert(token.to_owned());
        self.responses.lock().push(response);
        Ok(())
    }

    async fn edit_interaction_response(
        &self,
        _token: &str,
        data: MessageData,
    ) -> Result<Message, ProviderError> {
        let message = self.next_message("interaction", &data);
        self.followups.lock().push(data);
        Ok(message)
    }

    async fn delete_interaction_response(&self, _token: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn create_interaction_followup(
        &self,
        _token: &str,
        data: MessageData,
    ) -> Result<Message, ProviderError> {
        let message = self.next_message("interaction", &data);
        self.followups.lock().push(data);
        Ok(message)
    }

    async fn has_created_interaction_response(&self, token: &str) -> bool {
        self.responded_tokens.lock().contains(token)
    }

    async fn ban_member(
        &self,
        guild_id: &str,
        user_id: &str,
        _delete_message_seconds: u32,
        _reason: Option<String>,
    ) -> Result<(), ProviderError> {
        self.moderation_calls
            .lock()
            .push(format!("ban {guild_id} {user_id}"));
        Ok(())
    }

    async fn unban_member(
        &self,
        guild_id: &str,
        user_id: &str,
        _reason: Option<String>,
    ) -> Result<(), ProviderError> {
        self.moderation_calls
            .lock()
            .push(format!("unban {guild_id} {user_id}"));
        Ok(())
    }

    async fn kick_member(
        &self,
        guild_id: &str,
        user_id: &str,
        _reason: Option<String>,
    ) -> Result<(), ProviderError> {
        self.moderation_calls
            .lock()
            .push(format!("kick {guild_id} {user_id}"));
        Ok(())
    }

    async fn timeout_member(
        &self,
        guild_id: &str,
        user_id: &str,
        _until: DateTime<Utc>,
        _reason: Option<String>,
    ) -> Result<(), ProviderError> {
        self.moderation_calls
            .lock()
            .push(format!("timeout {guild_id} {user_id}"));
        Ok(())
    }

    async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
        _reason: Option<String>,
    ) -> Result<(), ProviderError> {
        self.moderation_calls
            .lock()
            .push(format!("role_add {guild_id} {user_id} {role_id}"));
        Ok(())
    }

    async fn remove_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
        _reason: Option<String>,
    ) -> Result<(), ProviderError> {
        self.moderation_calls
            .lock()
            .push(format!("role_remove {guild_id} {user_id} {role_id}"));
        Ok(())
    }

    async fn bulk_overwrite_commands(
        &self,
        commands: Vec<CommandSpec>,
    ) -> Result<(), ProviderError> {
        self.deployed_commands.lock().push(commands);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeHttp {
    pub response: Mutex<HttpResponse>,
    pub requests: Mutex<Vec<HttpRequest>>,
}

#[async_trait]
impl HttpProvider for FakeHttp {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, ProviderError> {
        self.requests.lock().push(request);
        Ok(self.response.lock().clone())
    }
}

#[derive(Default)]
pub struct FakeAi;

#[async_trait]
impl AiProvider for FakeAi {
    async fn chat_completion(
        &self,
        params: ChatCompletionParams,
    ) -> Result<String, ProviderError> {
        Ok(format!("ai:{}", params.prompt))
    }
}

#[derive(Default)]
pub struct RecordingLog {
    pub entries: Mutex<Vec<(LogLevel, String)>>,
}

#[async_trait]
impl LogProvider for RecordingLog {
    async fn create_log_entry(&self, level: LogLevel, message: String) {
        self.entries.lock().push((level, message));
    }
}

#[derive(Default)]
pub struct MemoryVariables {
    values: Mutex<FxHashMap<(String, Option<String>), Thing>>,
}

#[async_trait]
impl VariableProvider for MemoryVariables {
    async fn variable(&self, id: &str, scope: Option<&str>) -> Result<Thing, ProviderError> {
        self.values
            .lock()
            .get(&(id.to_owned(), scope.map(str::to_owned)))
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    async fn set_variable(
        &self,
        id: &str,
        scope: Option<&str>,
        value: Thing,
    ) -> Result<(), ProviderError> {
        self.values
            .lock()
            .insert((id.to_owned(), scope.map(str::to_owned)), value);
        Ok(())
    }

    async fn delete_variable(&self, id: &str, scope: Option<&str>) -> Result<(), ProviderError> {
        self.values
            .lock()
            .remove(&(id.to_owned(), scope.map(str::to_owned)))
            .map(|_| ())
            .ok_or(ProviderError::NotFound)
    }
}

#[derive(Default)]
pub struct FakeTemplates {
    pub templates: Mutex<FxHashMap<String, MessageData>>,
}

#[async_trait]
impl MessageTemplateProvider for FakeTemplates {
    async fn message_data(&self, template_id: &str) -> Result<MessageData, ProviderError> {
        self.templates
            .lock()
            .get(template_id)
            .cloned()
            .ok_or(ProviderError::NotFound)
    }
}

#[derive(Default)]
pub struct MemoryResumePoints {
    pub created: Mutex<Vec<ResumePoint>>,
}

#[async_trait]
impl ResumePointProvider for MemoryResumePoints {
    async fn create_resume_point(
        &self,
        kind: ResumePointKind,
        flow_node_id: &str,
        state: FlowContextState,
    ) -> Result<ResumePoint, ProviderError> {
        let point = ResumePoint::new(kind, "app", EntityLinks::default(), flow_node_id, state);
        self.created.lock().push(point.clone());
        Ok(point)
    }
}

/// Evaluates by classifying the expression text itself; enough to assert
/// plumbing without a real expression language.
#[derive(Default)]
pub struct FakeEval;

#[async_trait]
impl EvalProvider for FakeEval {
    async fn evaluate(&self, expression: &str) -> Result<Thing, ProviderError> {
        Ok(Thing::guess(serde_json::Value::String(
            expression.to_owned(),
        )))
    }
}

/// All fakes, kept as concrete types so tests can inspect recordings after
/// handing a [`FlowProviders`] bundle to the interpreter.
pub struct TestProviders {
    pub discord: Arc<FakeDiscord>,
    pub http: Arc<FakeHttp>,
    pub ai: Arc<FakeAi>,
    pub log: Arc<RecordingLog>,
    pub variables: Arc<MemoryVariables>,
    pub templates: Arc<FakeTemplates>,
    pub resume_points: Arc<MemoryResumePoints>,
    pub eval: Arc<FakeEval>,
}

impl TestProviders {
    pub fn new() -> Self {
        TestProviders {
            discord: Arc::new(FakeDiscord::default()),
            http: Arc::new(FakeHttp::default()),
            ai: Arc::new(FakeAi),
            log: Arc::new(RecordingLog::default()),
            variables: Arc::new(MemoryVariables::default()),
            templates: Arc::new(FakeTemplates::default()),
            resume_points: Arc::new(MemoryResumePoints::default()),
            eval: Arc::new(FakeEval),
        }
    }

    pub fn flow_providers(&self) -> FlowProviders {
        FlowProviders {
            discord: self.discord.clone(),
            http: self.http.clone(),
            ai: self.ai.clone(),
            log: self.log.clone(),
            variable: self.variables.clone(),
            message_template: self.templates.clone(),
            resume_point: self.resume_points.clone(),
            eval: self.eval.clone(),
        }
    }
}

pub fn noop_providers() -> FlowProviders {
    TestProviders::new().flow_providers()
}
