//! Recording provider fakes plus the factory handed to the engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use flowcord::engine::ProviderFactory;
use flowcord::flow::provider::{
    AiProvider, ChatCompletionParams, DiscordProvider, EvalProvider, HttpProvider, HttpRequest,
    InteractionResponse, MessageTemplateProvider, ProviderError,
};
use flowcord::model::{
    Channel, CommandSpec, Guild, HttpResponse, Member, Message, MessageData, Role, User,
};
use flowcord::store::App;
use flowcord::thing::Thing;

/// Records effects and fabricates plausible objects for lookups.
#[derive(Default)]
pub struct RecordingDiscord {
    next_message_id: AtomicU64,
    pub sent_messages: Mutex<Vec<(String, MessageData)>>,
    pub responses: Mutex<Vec<InteractionResponse>>,
    pub followups: Mutex<Vec<MessageData>>,
    pub moderation_calls: Mutex<Vec<String>>,
    pub deployed_commands: Mutex<Vec<Vec<CommandSpec>>>,
    responded_tokens: Mutex<FxHashSet<String>>,
}

impl RecordingDiscord {
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
impl DiscordProvider for RecordingDiscord {
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
        Ok(Message {
            id: message_id.to_owned(),
            channel_id: channel_id.to_owned(),
            guild_id: None,
            author: None,
            content: data.content,
        })
    }

    async fn delete_message(
        &self,
        _channel_id: &str,
        _message_id: &str,
        _reason: Option<String>,
    ) -> Result<(), ProviderError> {
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
        response: InteractionResponse,
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
pub struct StaticHttp {
    pub response: Mutex<HttpResponse>,
    pub requests: Mutex<Vec<HttpRequest>>,
}

#[async_trait]
impl HttpProvider for StaticHttp {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, ProviderError> {
        self.requests.lock().push(request);
        Ok(self.response.lock().clone())
    }
}

pub struct EchoAi;

#[async_trait]
impl AiProvider for EchoAi {
    async fn chat_completion(
        &self,
        params: ChatCompletionParams,
    ) -> Result<String, ProviderError> {
        Ok(format!("ai:{}", params.prompt))
    }
}

pub struct GuessEval;

#[async_trait]
impl EvalProvider for GuessEval {
    async fn evaluate(&self, expression: &str) -> Result<Thing, ProviderError> {
        Ok(Thing::guess(serde_json::Value::String(
            expression.to_owned(),
        )))
    }
}

pub struct EmptyTemplates;

#[async_trait]
impl MessageTemplateProvider for EmptyTemplates {
    async fn message_data(&self, _template_id: &str) -> Result<MessageData, ProviderError> {
        Err(ProviderError::NotFound)
    }
}

/// Hands the same recording fakes to every app so tests can assert on them
/// after routing events through the engine.
pub struct TestFactory {
    pub discord: Arc<RecordingDiscord>,
    pub http: Arc<StaticHttp>,
}

impl Default for TestFactory {
    fn default() -> Self {
        TestFactory {
            discord: Arc::new(RecordingDiscord::default()),
            http: Arc::new(StaticHttp::default()),
        }
    }
}

impl ProviderFactory for TestFactory {
    fn discord(&self, _app: &App) -> Arc<dyn DiscordProvider> {
        self.discord.clone()
    }

    fn http(&self, _app: &App) -> Arc<dyn HttpProvider> {
        self.http.clone()
    }

    fn ai(&self, _app: &App) -> Arc<dyn AiProvider> {
        Arc::new(EchoAi)
    }

    fn eval(&self, _app: &App) -> Arc<dyn EvalProvider> {
        Arc::new(GuessEval)
    }

    fn message_template(&self, _app: &App) -> Arc<dyn MessageTemplateProvider> {
        Arc::new(EmptyTemplates)
    }
}
