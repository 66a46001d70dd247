//! Provider implementations for the standard placeholder namespaces.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::flow::provider::{ProviderError, VariableProvider};
use crate::flow::state::FlowContextState;
use crate::model::{GatewayEvent, Interaction, InteractionData};
use crate::thing::Thing;

use super::{PlaceholderError, PlaceholderProvider};

/// Generic provider over any [`Thing`]. Containers descend by key/index,
/// domain objects expose their serialized fields plus a few conveniences
/// (`mention`, `display_name`). Everything else resolves via string
/// coercion.
pub struct ThingProvider {
    value: Thing,
}

impl ThingProvider {
    pub fn new(value: Thing) -> Self {
        Self { value }
    }

    fn field(&self, key: &str) -> Option<Thing> {
        match (&self.value, key) {
            (Thing::User(u), "mention") => Some(Thing::from(u.mention())),
            (Thing::User(u), "display_name") => Some(Thing::from(u.display_name())),
            (Thing::Member(m), "mention") => Some(Thing::from(m.user.mention())),
            (Thing::Member(m), "display_name") => Some(Thing::from(
                m.nick.as_deref().unwrap_or_else(|| m.user.display_name()),
            )),
            (Thing::Member(m), "user") => Some(Thing::User(m.user.clone())),
            (Thing::Object(map), _) => map.get(key).cloned(),
            (Thing::Array(items), _) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned()),
            _ => match self.value.to_value() {
                Value::Object(map) => map.get(key).cloned().map(Thing::guess),
                _ => None,
            },
        }
    }
}

#[async_trait]
impl PlaceholderProvider for ThingProvider {
    async fn get_placeholder(
        &self,
        key: &str,
    ) -> Result<Arc<dyn PlaceholderProvider>, PlaceholderError> {
        match self.field(key) {
            Some(value) => Ok(Arc::new(ThingProvider::new(value))),
            None => Err(PlaceholderError::NotFound),
        }
    }

    async fn resolve(&self) -> Result<String, PlaceholderError> {
        Ok(self.value.as_string())
    }
}

/// `interaction.*`: the triggering interaction. Exposes the invoking
/// user/member, channel and guild IDs, command options by name, and modal
/// input values by custom ID.
pub struct InteractionProvider {
    interaction: Interaction,
}

impl InteractionProvider {
    pub fn new(interaction: Interaction) -> Self {
        Self { interaction }
    }
}

#[async_trait]
impl PlaceholderProvider for InteractionProvider {
    async fn get_placeholder(
        &self,
        key: &str,
    ) -> Result<Arc<dyn PlaceholderProvider>, PlaceholderError> {
        let interaction = &self.interaction;
        let value = match key {
            "id" => Thing::from(interaction.id.as_str()),
            "channel_id" => match &interaction.channel_id {
                Some(id) => Thing::from(id.as_str()),
                None => Thing::null(),
            },
            "guild_id" => match &interaction.guild_id {
                Some(id) => Thing::from(id.as_str()),
                None => Thing::null(),
            },
            "user" => match interaction.invoker() {
                Some(user) => Thing::User(user.clone()),
                None => return Err(PlaceholderError::NotFound),
            },
            "member" => match &interaction.member {
                Some(member) => Thing::Member(member.clone()),
                None => return Err(PlaceholderError::NotFound),
            },
            "message" => match &interaction.message {
                Some(message) => Thing::Message(message.clone()),
                None => return Err(PlaceholderError::NotFound),
            },
            "options" => match &interaction.data {
                InteractionData::Command(invocation) => {
                    let mut map = rustc_hash::FxHashMap::default();
                    for option in invocation.arguments() {
                        map.insert(option.name.clone(), Thing::guess(option.value.clone()));
                    }
                    Thing::Object(map)
                }
                _ => return Err(PlaceholderError::NotFound),
            },
            "values" => match &interaction.data {
                InteractionData::Modal { values, .. } => {
                    let mut map = rustc_hash::FxHashMap::default();
                    for value in values {
                        map.insert(value.custom_id.clone(), Thing::from(value.value.as_str()));
                    }
                    Thing::Object(map)
                }
                _ => return Err(PlaceholderError::NotFound),
            },
            _ => return Err(PlaceholderError::NotFound),
        };
        Ok(Arc::new(ThingProvider::new(value)))
    }

    async fn resolve(&self) -> Result<String, PlaceholderError> {
        Ok(self.interaction.id.clone())
    }
}

/// `event.*`: the triggering gateway event for non-interaction entries.
pub struct EventProvider {
    event: GatewayEvent,
}

impl EventProvider {
    pub fn new(event: GatewayEvent) -> Self {
        Self { event }
    }
}

#[async_trait]
impl PlaceholderProvider for EventProvider {
    async fn get_placeholder(
        &self,
        key: &str,
    ) -> Result<Arc<dyn PlaceholderProvider>, PlaceholderError> {
        let value = match (&self.event, key) {
            (GatewayEvent::MessageCreate(m) | GatewayEvent::MessageUpdate(m), "message") => {
                Thing::Message(m.clone())
            }
            (GatewayEvent::MessageCreate(m) | GatewayEvent::MessageUpdate(m), "user") => {
                match &m.author {
                    Some(author) => Thing::User(author.clone()),
                    None => return Err(PlaceholderError::NotFound),
                }
            }
            (GatewayEvent::MessageCreate(m) | GatewayEvent::MessageUpdate(m), "channel_id") => {
                Thing::from(m.channel_id.as_str())
            }
            (GatewayEvent::MessageDelete { id, .. }, "message_id") => Thing::from(id.as_str()),
            (GatewayEvent::MessageDelete { channel_id, .. }, "channel_id") => {
                Thing::from(channel_id.as_str())
            }
            (GatewayEvent::MemberAdd { member, .. }, "member") => Thing::Member(member.clone()),
            (GatewayEvent::MemberAdd { member, .. }, "user") => {
                Thing::User(member.user.clone())
            }
            (GatewayEvent::MemberRemove { user, .. }, "user") => Thing::User(user.clone()),
            (
                GatewayEvent::MemberAdd { guild_id, .. }
                | GatewayEvent::MemberRemove { guild_id, .. },
                "guild_id",
            ) => Thing::from(guild_id.as_str()),
            (GatewayEvent::GuildCreate(g), "guild") => Thing::Guild(g.clone()),
            _ => return Err(PlaceholderError::NotFound),
        };
        Ok(Arc::new(ThingProvider::new(value)))
    }

    async fn resolve(&self) -> Result<String, PlaceholderError> {
        Ok(serde_json::to_value(self.event.event_type())
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default())
    }
}

/// `nodes.<id>.result`: results of already-executed nodes, read from the
/// live interpreter state.
pub struct NodesProvider {
    state: Arc<Mutex<FlowContextState>>,
}

impl NodesProvider {
    pub fn new(state: Arc<Mutex<FlowContextState>>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl PlaceholderProvider for NodesProvider {
    async fn get_placeholder(
        &self,
        key: &str,
    ) -> Result<Arc<dyn PlaceholderProvider>, PlaceholderError> {
        Ok(Arc::new(NodeStateProvider {
            state: self.state.clone(),
            node_id: key.to_owned(),
        }))
    }

    async fn resolve(&self) -> Result<String, PlaceholderError> {
        Err(PlaceholderError::NotFound)
    }
}

struct NodeStateProvider {
    state: Arc<Mutex<FlowContextState>>,
    node_id: String,
}

#[async_trait]
impl PlaceholderProvider for NodeStateProvider {
    async fn get_placeholder(
        &self,
        key: &str,
    ) -> Result<Arc<dyn PlaceholderProvider>, PlaceholderError> {
        match key {
            "result" => {
                let result = self.state.lock().result(&self.node_id);
                Ok(Arc::new(ThingProvider::new(result)))
            }
            _ => Err(PlaceholderError::NotFound),
        }
    }

    async fn resolve(&self) -> Result<String, PlaceholderError> {
        // Bare `nodes.<id>` reads like the result too.
        Ok(self.state.lock().result(&self.node_id).as_string())
    }
}

/// `variables.<id>`: scoped variable lookups through the variable provider.
pub struct VariablesProvider {
    provider: Arc<dyn VariableProvider>,
    scope: Option<String>,
}

impl VariablesProvider {
    pub fn new(provider: Arc<dyn VariableProvider>, scope: Option<String>) -> Self {
        Self { provider, scope }
    }
}

#[async_trait]
impl PlaceholderProvider for VariablesProvider {
    async fn get_placeholder(
        &self,
        key: &str,
    ) -> Result<Arc<dyn PlaceholderProvider>, PlaceholderError> {
        match self.provider.variable(key, self.scope.as_deref()).await {
            Ok(value) => Ok(Arc::new(ThingProvider::new(value))),
            Err(ProviderError::NotFound) => Err(PlaceholderError::NotFound),
            Err(err) => Err(PlaceholderError::Failed {
                key: key.to_owned(),
                message: err.to_string(),
            }),
        }
    }

    async fn resolve(&self) -> Result<String, PlaceholderError> {
        Err(PlaceholderError::NotFound)
    }
}
