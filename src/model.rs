//! Discord-shaped data types shared across the crate.
//!
//! These are plain serde structs, not a wire-complete client model: they
//! carry exactly the fields the interpreter, placeholder engine, and
//! reconciliation runtime consume. Platform access goes through the
//! provider traits in [`crate::flow::provider`], so tests construct these
//! directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Snowflake IDs are kept as strings end to end; numeric coercion happens
/// in the value system where flows ask for it.
pub type Id = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct User {
    pub id: Id,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Member {
    pub user: User,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<Id>,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Role {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Channel {
    pub id: Id,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub guild_id: Option<Id>,
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Guild {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Message {
    pub id: Id,
    pub channel_id: Id,
    #[serde(default)]
    pub guild_id: Option<Id>,
    #[serde(default)]
    pub author: Option<User>,
    #[serde(default)]
    pub content: String,
}

/// Outgoing message payload for create/edit calls. Embeds stay opaque JSON;
/// the engine never inspects them, it only fills placeholders in `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MessageData {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Value>,
    #[serde(default)]
    pub components: Vec<ComponentRow>,
    #[serde(default)]
    pub ephemeral: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ComponentRow {
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Component {
    Button {
        label: String,
        #[serde(default)]
        style: ButtonStyle,
        #[serde(default)]
        custom_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    #[default]
    Primary,
    Secondary,
    Success,
    Danger,
}

/// Modal definition shown by `suspend_response_modal` nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModalData {
    #[serde(default)]
    pub custom_id: String,
    pub title: String,
    #[serde(default)]
    pub fields: Vec<ModalField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModalField {
    pub custom_id: String,
    pub label: String,
    #[serde(default)]
    pub multiline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HttpResponse {
    pub status: u16,
    #[serde(default)]
    pub body: String,
}

// Interactions

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: Id,
    pub app_id: Id,
    pub token: String,
    #[serde(default)]
    pub guild_id: Option<Id>,
    #[serde(default)]
    pub channel_id: Option<Id>,
    #[serde(default)]
    pub member: Option<Member>,
    #[serde(default)]
    pub user: Option<User>,
    /// Message the interaction originated from (component interactions).
    #[serde(default)]
    pub message: Option<Message>,
    pub data: InteractionData,
}

impl Interaction {
    /// The invoking user, whether the interaction came from a guild or a DM.
    pub fn invoker(&self) -> Option<&User> {
        self.member
            .as_ref()
            .map(|m| &m.user)
            .or(self.user.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionData {
    Command(CommandInvocation),
    Button {
        custom_id: String,
    },
    Modal {
        custom_id: String,
        #[serde(default)]
        values: Vec<ModalValue>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModalValue {
    pub custom_id: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CommandInvocation {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOptionValue>,
}

impl CommandInvocation {
    /// Flattens subcommand nesting into the space-separated full name used
    /// for routing, e.g. `settings view` or `mod warn add`.
    pub fn full_name(&self) -> String {
        let mut full = self.name.clone();
        for option in &self.options {
            match option.kind {
                CommandOptionType::SubCommand => {
                    full.push(' ');
                    full.push_str(&option.name);
                    break;
                }
                CommandOptionType::SubCommandGroup => {
                    full.push(' ');
                    full.push_str(&option.name);
                    for sub in &option.options {
                        full.push(' ');
                        full.push_str(&sub.name);
                    }
                    break;
                }
                _ => {}
            }
        }
        full
    }

    /// Leaf argument values, looking through subcommand nesting.
    pub fn arguments(&self) -> Vec<&CommandOptionValue> {
        fn collect<'a>(options: &'a [CommandOptionValue], out: &mut Vec<&'a CommandOptionValue>) {
            for option in options {
                match option.kind {
                    CommandOptionType::SubCommand | CommandOptionType::SubCommandGroup => {
                        collect(&option.options, out);
                    }
                    _ => out.push(option),
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.options, &mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CommandOptionValue {
    pub name: String,
    pub kind: CommandOptionType,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub options: Vec<CommandOptionValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommandOptionType {
    SubCommand,
    SubCommandGroup,
    #[default]
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Number,
    Attachment,
}

/// Command registration data pushed upstream on deploy. Subcommand nesting
/// reuses `options`: a two-segment command becomes a root with a
/// `SubCommand` option, a three-segment one nests through `SubCommandGroup`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: Vec<CommandOptionSpec>,
    #[serde(default)]
    pub default_member_permissions: Option<String>,
    #[serde(default)]
    pub contexts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CommandOptionSpec {
    pub kind: CommandOptionType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<CommandOptionSpec>,
}

// Gateway events

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    InteractionCreate(Interaction),
    MessageCreate(Message),
    MessageUpdate(Message),
    MessageDelete { id: Id, channel_id: Id },
    MemberAdd { guild_id: Id, member: Member },
    MemberRemove { guild_id: Id, user: User },
    GuildCreate(Guild),
    GuildDelete { id: Id },
}

impl GatewayEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            GatewayEvent::InteractionCreate(_) => EventType::InteractionCreate,
            GatewayEvent::MessageCreate(_) => EventType::MessageCreate,
            GatewayEvent::MessageUpdate(_) => EventType::MessageUpdate,
            GatewayEvent::MessageDelete { .. } => EventType::MessageDelete,
            GatewayEvent::MemberAdd { .. } => EventType::MemberAdd,
            GatewayEvent::MemberRemove { .. } => EventType::MemberRemove,
            GatewayEvent::GuildCreate(_) => EventType::GuildCreate,
            GatewayEvent::GuildDelete { .. } => EventType::GuildDelete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    InteractionCreate,
    MessageCreate,
    MessageUpdate,
    MessageDelete,
    MemberAdd,
    MemberRemove,
    GuildCreate,
    GuildDelete,
}
