//! Dynamic value system for flow execution.
//!
//! Every value produced or consumed by a flow is a [`Thing`]: a tagged
//! union that survives JSON round trips as `{"t": <tag>, "v": <value>}`.
//! All coercions are total — a flow author can compare a string to a
//! number or feed an HTTP response into arithmetic and always get *some*
//! value back, never an error. The exact coercion tables are load-bearing:
//! stored flow state from older engine versions must keep meaning the same
//! thing, which is also why the untyped decoding guess path below is
//! preserved exactly.

use rustc_hash::FxHashMap;
use serde::de::Error as DeError;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::model::{Channel, Guild, HttpResponse, Member, Message, Role, User};

/// Type tag carried in the `"t"` field of the serialized envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThingKind {
    Any,
    String,
    Int,
    Float,
    Bool,
    DiscordMessage,
    DiscordUser,
    DiscordMember,
    DiscordChannel,
    DiscordGuild,
    DiscordRole,
    HttpResponse,
    Array,
    Object,
}

impl ThingKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ThingKind::Any => "any",
            ThingKind::String => "string",
            ThingKind::Int => "int",
            ThingKind::Float => "float",
            ThingKind::Bool => "bool",
            ThingKind::DiscordMessage => "discord_message",
            ThingKind::DiscordUser => "discord_user",
            ThingKind::DiscordMember => "discord_member",
            ThingKind::DiscordChannel => "discord_channel",
            ThingKind::DiscordGuild => "discord_guild",
            ThingKind::DiscordRole => "discord_role",
            ThingKind::HttpResponse => "http_response",
            ThingKind::Array => "array",
            ThingKind::Object => "object",
        }
    }
}

impl std::fmt::Display for ThingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Thing {
    Any(Value),
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Message(Message),
    User(User),
    Member(Member),
    Channel(Channel),
    Guild(Guild),
    Role(Role),
    HttpResponse(HttpResponse),
    Array(Vec<Thing>),
    Object(FxHashMap<String, Thing>),
}

impl Default for Thing {
    fn default() -> Self {
        Thing::null()
    }
}

impl Thing {
    pub const fn null() -> Self {
        Thing::Any(Value::Null)
    }

    pub const fn kind(&self) -> ThingKind {
        match self {
            Thing::Any(_) => ThingKind::Any,
            Thing::String(_) => ThingKind::String,
            Thing::Int(_) => ThingKind::Int,
            Thing::Float(_) => ThingKind::Float,
            Thing::Bool(_) => ThingKind::Bool,
            Thing::Message(_) => ThingKind::DiscordMessage,
            Thing::User(_) => ThingKind::DiscordUser,
            Thing::Member(_) => ThingKind::DiscordMember,
            Thing::Channel(_) => ThingKind::DiscordChannel,
            Thing::Guild(_) => ThingKind::DiscordGuild,
            Thing::Role(_) => ThingKind::DiscordRole,
            Thing::HttpResponse(_) => ThingKind::HttpResponse,
            Thing::Array(_) => ThingKind::Array,
            Thing::Object(_) => ThingKind::Object,
        }
    }

    /// Best-effort classification of a raw JSON value.
    ///
    /// This is the decoding path for values stored before the envelope
    /// existed and for JSON produced outside the engine (command options,
    /// HTTP bodies): integer-looking strings become ints, float-looking
    /// strings become floats, `"true"`/`"false"` become bools, and anything
    /// unrecognized stays an untyped [`Thing::Any`].
    pub fn guess(value: Value) -> Thing {
        match value {
            Value::Bool(b) => Thing::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Thing::Int(i)
                } else {
                    Thing::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => {
                if let Ok(i) = s.parse::<i64>() {
                    Thing::Int(i)
                } else if let Ok(f) = s.parse::<f64>() {
                    Thing::Float(f)
                } else if s == "true" {
                    Thing::Bool(true)
                } else if s == "false" {
                    Thing::Bool(false)
                } else {
                    Thing::Any(Value::String(s))
                }
            }
            other => Thing::Any(other),
        }
    }

    /// Plain JSON projection without type tags. Domain objects serialize as
    /// their full struct form; containers project element-wise.
    pub fn to_value(&self) -> Value {
        match self {
            Thing::Any(v) => v.clone(),
            Thing::String(v) => Value::String(v.clone()),
            Thing::Int(v) => Value::from(*v),
            Thing::Float(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Thing::Bool(v) => Value::Bool(*v),
            Thing::Message(v) => serde_json::to_value(v).unwrap_or(Value::Null),
            Thing::User(v) => serde_json::to_value(v).unwrap_or(Value::Null),
            Thing::Member(v) => serde_json::to_value(v).unwrap_or(Value::Null),
            Thing::Channel(v) => serde_json::to_value(v).unwrap_or(Value::Null),
            Thing::Guild(v) => serde_json::to_value(v).unwrap_or(Value::Null),
            Thing::Role(v) => serde_json::to_value(v).unwrap_or(Value::Null),
            Thing::HttpResponse(v) => serde_json::to_value(v).unwrap_or(Value::Null),
            Thing::Array(items) => Value::Array(items.iter().map(Thing::to_value).collect()),
            Thing::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
        }
    }

    // Coercions. All total; unknown combinations fall through to a zero
    // value rather than failing.

    pub fn as_string(&self) -> String {
        match self {
            Thing::Any(Value::Null) => String::new(),
            Thing::Any(Value::String(s)) => s.clone(),
            Thing::Any(v) => v.to_string(),
            Thing::String(s) => s.clone(),
            Thing::Int(i) => i.to_string(),
            Thing::Float(f) => f.to_string(),
            Thing::Bool(b) => b.to_string(),
            Thing::Message(m) => m.id.clone(),
            Thing::User(u) => u.id.clone(),
            Thing::Member(m) => m.user.id.clone(),
            Thing::Channel(c) => c.id.clone(),
            Thing::Guild(g) => g.id.clone(),
            Thing::Role(r) => r.id.clone(),
            Thing::HttpResponse(r) => r.body.clone(),
            Thing::Array(_) | Thing::Object(_) => {
                serde_json::to_string(&self.to_value()).unwrap_or_default()
            }
        }
    }

    pub fn as_int(&self) -> i64 {
        match self {
            Thing::Int(i) => *i,
            Thing::Float(_) => self.as_float() as i64,
            Thing::String(s) => s.parse().unwrap_or(0),
            Thing::Bool(b) => i64::from(*b),
            Thing::Array(items) => items.len() as i64,
            Thing::Object(map) => map.len() as i64,
            Thing::Message(m) => m.id.parse().unwrap_or(0),
            Thing::HttpResponse(r) => i64::from(r.status),
            _ => 0,
        }
    }

    pub fn as_float(&self) -> f64 {
        match self {
            Thing::Int(i) => *i as f64,
            Thing::Float(f) => *f,
            Thing::String(s) => s.parse().unwrap_or(0.0),
            Thing::Bool(b) => f64::from(u8::from(*b)),
            _ => 0.0,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Thing::Bool(b) => *b,
            Thing::Int(i) => *i != 0,
            Thing::Float(f) => *f != 0.0,
            Thing::String(s) => !s.is_empty(),
            Thing::Array(items) => !items.is_empty(),
            Thing::Object(map) => !map.is_empty(),
            Thing::Message(_)
            | Thing::User(_)
            | Thing::Member(_)
            | Thing::Channel(_)
            | Thing::Guild(_)
            | Thing::Role(_)
            | Thing::HttpResponse(_) => true,
            Thing::Any(Value::Null) => false,
            Thing::Any(Value::Bool(b)) => *b,
            Thing::Any(Value::Number(n)) => n.as_f64().unwrap_or(0.0) != 0.0,
            Thing::Any(Value::String(s)) => !s.is_empty(),
            Thing::Any(_) => true,
        }
    }

    // Comparisons and operators used by condition nodes.

    pub fn equals(&self, other: &Thing) -> bool {
        self == other
    }

    pub fn greater_than(&self, other: &Thing) -> bool {
        self.as_float() > other.as_float()
    }

    pub fn greater_than_or_equal(&self, other: &Thing) -> bool {
        self.as_float() >= other.as_float()
    }

    pub fn less_than(&self, other: &Thing) -> bool {
        self.as_float() < other.as_float()
    }

    pub fn less_than_or_equal(&self, other: &Thing) -> bool {
        self.as_float() <= other.as_float()
    }

    pub fn contains(&self, other: &Thing) -> bool {
        // TODO: array and object membership, once the editor exposes it
        self.as_string().contains(&other.as_string())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Thing::Any(Value::Null))
    }

    pub fn is_empty(&self) -> bool {
        !self.as_bool()
    }

    pub fn append(&self, other: &Thing) -> Thing {
        Thing::String(self.as_string() + &other.as_string())
    }

    pub fn add(&self, other: &Thing) -> Thing {
        Thing::Float(self.as_float() + other.as_float())
    }

    pub fn sub(&self, other: &Thing) -> Thing {
        Thing::Float(self.as_float() - other.as_float())
    }
}

impl From<String> for Thing {
    fn from(v: String) -> Self {
        Thing::String(v)
    }
}

impl From<&str> for Thing {
    fn from(v: &str) -> Self {
        Thing::String(v.to_owned())
    }
}

impl From<i64> for Thing {
    fn from(v: i64) -> Self {
        Thing::Int(v)
    }
}

impl From<f64> for Thing {
    fn from(v: f64) -> Self {
        Thing::Float(v)
    }
}

impl From<bool> for Thing {
    fn from(v: bool) -> Self {
        Thing::Bool(v)
    }
}

impl From<Message> for Thing {
    fn from(v: Message) -> Self {
        Thing::Message(v)
    }
}

impl From<User> for Thing {
    fn from(v: User) -> Self {
        Thing::User(v)
    }
}

impl From<Member> for Thing {
    fn from(v: Member) -> Self {
        Thing::Member(v)
    }
}

impl From<Channel> for Thing {
    fn from(v: Channel) -> Self {
        Thing::Channel(v)
    }
}

impl From<Guild> for Thing {
    fn from(v: Guild) -> Self {
        Thing::Guild(v)
    }
}

impl From<Role> for Thing {
    fn from(v: Role) -> Self {
        Thing::Role(v)
    }
}

impl From<HttpResponse> for Thing {
    fn from(v: HttpResponse) -> Self {
        Thing::HttpResponse(v)
    }
}

impl Serialize for Thing {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("Thing", 2)?;
        st.serialize_field("t", self.kind().as_str())?;
        match self {
            Thing::Any(v) => st.serialize_field("v", v)?,
            Thing::String(v) => st.serialize_field("v", v)?,
            Thing::Int(v) => st.serialize_field("v", v)?,
            Thing::Float(v) => st.serialize_field("v", v)?,
            Thing::Bool(v) => st.serialize_field("v", v)?,
            Thing::Message(v) => st.serialize_field("v", v)?,
            Thing::User(v) => st.serialize_field("v", v)?,
            Thing::Member(v) => st.serialize_field("v", v)?,
            Thing::Channel(v) => st.serialize_field("v", v)?,
            Thing::Guild(v) => st.serialize_field("v", v)?,
            Thing::Role(v) => st.serialize_field("v", v)?,
            Thing::HttpResponse(v) => st.serialize_field("v", v)?,
            Thing::Array(v) => st.serialize_field("v", v)?,
            Thing::Object(v) => st.serialize_field("v", v)?,
        }
        st.end()
    }
}

impl<'de> Deserialize<'de> for Thing {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;

        let tag = raw
            .as_object()
            .and_then(|obj| obj.get("t"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_owned);

        let Some(tag) = tag else {
            // Stored values predating the envelope carry no tag.
            return Ok(Thing::guess(raw));
        };

        let inner = raw
            .as_object()
            .and_then(|obj| obj.get("v"))
            .cloned()
            .unwrap_or(Value::Null);

        fn typed<'de, T: serde::de::DeserializeOwned, D: Deserializer<'de>>(
            v: Value,
        ) -> Result<T, D::Error> {
            serde_json::from_value(v).map_err(D::Error::custom)
        }

        Ok(match tag.as_str() {
            "any" => Thing::Any(inner),
            "string" => Thing::String(typed::<_, D>(inner)?),
            "int" => Thing::Int(typed::<_, D>(inner)?),
            "float" => Thing::Float(typed::<_, D>(inner)?),
            "bool" => Thing::Bool(typed::<_, D>(inner)?),
            "discord_message" => Thing::Message(typed::<_, D>(inner)?),
            "discord_user" => Thing::User(typed::<_, D>(inner)?),
            "discord_member" => Thing::Member(typed::<_, D>(inner)?),
            "discord_channel" => Thing::Channel(typed::<_, D>(inner)?),
            "discord_guild" => Thing::Guild(typed::<_, D>(inner)?),
            "discord_role" => Thing::Role(typed::<_, D>(inner)?),
            "http_response" => Thing::HttpResponse(typed::<_, D>(inner)?),
            "array" => Thing::Array(typed::<_, D>(inner)?),
            "object" => Thing::Object(typed::<_, D>(inner)?),
            other => return Err(D::Error::custom(format!("unknown thing type: {other}"))),
        })
    }
}
