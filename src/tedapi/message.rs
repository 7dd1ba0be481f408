//! Binary frame exchanged in the HTTPS body.
//!
//! `wire` mirrors the gateway's protobuf schema field for field; the rest of
//! the module is the typed view the client works with. Field numbers must
//! not change, the device rejects anything else.

use prost::Message as _;

use crate::tedapi::{Din, GatewayError};

/// Delivery channel used by every known query.
pub const DELIVERY_CHANNEL: i32 = 1;

const QUERY_SEND_NUM: i32 = 2;
const QUERY_TEXT_VALUE: i32 = 1;
const CONFIG_SEND_NUM: i32 = 1;

pub mod wire {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Message {
        #[prost(message, optional, tag = "1")]
        pub message: Option<MessageEnvelope>,
        #[prost(message, optional, tag = "2")]
        pub tail: Option<Tail>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MessageEnvelope {
        #[prost(int32, tag = "1")]
        pub delivery_channel: i32,
        #[prost(message, optional, tag = "2")]
        pub sender: Option<Participant>,
        #[prost(message, optional, tag = "3")]
        pub recipient: Option<Participant>,
        #[prost(message, optional, tag = "15")]
        pub config: Option<ConfigType>,
        #[prost(message, optional, tag = "16")]
        pub payload: Option<QueryType>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Participant {
        #[prost(oneof = "participant::Id", tags = "1, 2, 3, 4")]
        pub id: Option<participant::Id>,
    }

    pub mod participant {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Id {
            #[prost(string, tag = "1")]
            Din(String),
            #[prost(int32, tag = "2")]
            Teg(i32),
            #[prost(int32, tag = "3")]
            Local(i32),
            #[prost(int32, tag = "4")]
            AuthorizedClient(i32),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct QueryType {
        #[prost(oneof = "query_type::Id", tags = "1, 2")]
        pub id: Option<query_type::Id>,
    }

    pub mod query_type {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Id {
            #[prost(message, tag = "1")]
            Send(super::PayloadQuerySend),
            #[prost(message, tag = "2")]
            Recv(super::PayloadString),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PayloadQuerySend {
        #[prost(int32, optional, tag = "1")]
        pub num: Option<i32>,
        #[prost(message, optional, tag = "2")]
        pub payload: Option<PayloadString>,
        #[prost(bytes = "vec", tag = "3")]
        pub code: Vec<u8>,
        #[prost(message, optional, tag = "4")]
        pub b: Option<StringValue>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PayloadString {
        #[prost(int32, tag = "1")]
        pub value: i32,
        #[prost(string, tag = "2")]
        pub text: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StringValue {
        #[prost(string, tag = "1")]
        pub value: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ConfigType {
        #[prost(oneof = "config_type::Config", tags = "1, 2")]
        pub config: Option<config_type::Config>,
    }

    pub mod config_type {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Config {
            #[prost(message, tag = "1")]
            Send(super::PayloadConfigSend),
            #[prost(message, tag = "2")]
            Recv(super::PayloadConfigRecv),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PayloadConfigSend {
        #[prost(int32, tag = "1")]
        pub num: i32,
        #[prost(string, tag = "2")]
        pub file: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PayloadConfigRecv {
        #[prost(message, optional, tag = "1")]
        pub file: Option<ConfigString>,
        #[prost(bytes = "vec", tag = "2")]
        pub code: Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ConfigString {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "100")]
        pub text: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Tail {
        #[prost(int32, tag = "1")]
        pub value: i32,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Participant {
    /// The caller itself.
    Local(i32),
    Din(Din),
}

impl Participant {
    pub fn local() -> Self {
        Participant::Local(1)
    }
}

/// Tail marker: how many hops the request takes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Hop {
    /// Straight to the leader.
    Single = 1,
    /// Through the leader to another device.
    ViaLeader = 2,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    QuerySend {
        text: String,
        signature: Vec<u8>,
        vars: String,
    },
    QueryRecv(String),
    ConfigSend {
        file: String,
    },
    /// File text, when the gateway sent one.
    ConfigRecv(Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub delivery_channel: i32,
    pub sender: Participant,
    pub recipient: Participant,
    pub payload: Payload,
    pub hop: Hop,
}

impl Envelope {
    pub fn encode(&self) -> Vec<u8> {
        wire::Message::from(self).encode_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Envelope, GatewayError> {
        let msg = wire::Message::decode(bytes)?;
        Envelope::try_from(msg)
    }
}

impl From<&Participant> for wire::Participant {
    fn from(p: &Participant) -> Self {
        let id = match p {
            Participant::Local(l) => wire::participant::Id::Local(*l),
            Participant::Din(d) => wire::participant::Id::Din(d.as_str().to_owned()),
        };
        wire::Participant { id: Some(id) }
    }
}

impl From<&Envelope> for wire::Message {
    fn from(e: &Envelope) -> Self {
        let mut env = wire::MessageEnvelope {
            delivery_channel: e.delivery_channel,
            sender: Some((&e.sender).into()),
            recipient: Some((&e.recipient).into()),
            config: None,
            payload: None,
        };

        match &e.payload {
            Payload::QuerySend { text, signature, vars } => {
                env.payload = Some(wire::QueryType {
                    id: Some(wire::query_type::Id::Send(wire::PayloadQuerySend {
                        num: Some(QUERY_SEND_NUM),
                        payload: Some(wire::PayloadString {
                            value: QUERY_TEXT_VALUE,
                            text: text.clone(),
                        }),
                        code: signature.clone(),
                        b: Some(wire::StringValue { value: vars.clone() }),
                    })),
                })
            }
            Payload::QueryRecv(text) => {
                env.payload = Some(wire::QueryType {
                    id: Some(wire::query_type::Id::Recv(wire::PayloadString {
                        value: QUERY_TEXT_VALUE,
                        text: text.clone(),
                    })),
                })
            }
            Payload::ConfigSend { file } => {
                env.config = Some(wire::ConfigType {
                    config: Some(wire::config_type::Config::Send(wire::PayloadConfigSend {
                        num: CONFIG_SEND_NUM,
                        file: file.clone(),
                    })),
                })
            }
            Payload::ConfigRecv(text) => {
                env.config = Some(wire::ConfigType {
                    config: Some(wire::config_type::Config::Recv(wire::PayloadConfigRecv {
                        file: text.as_ref().map(|t| wire::ConfigString {
                            name: String::new(),
                            text: t.clone(),
                        }),
                        code: Vec::new(),
                    })),
                })
            }
        }

        wire::Message {
            message: Some(env),
            tail: Some(wire::Tail { value: e.hop as i32 }),
        }
    }
}

impl TryFrom<wire::Participant> for Participant {
    type Error = GatewayError;

    fn try_from(p: wire::Participant) -> Result<Self, Self::Error> {
        use wire::participant::Id;
        match p.id {
            Some(Id::Local(l)) => Ok(Participant::Local(l)),
            Some(Id::Din(d)) => Ok(Participant::Din(Din::new(d))),
            Some(other) => Err(GatewayError::InvalidFrame(format!(
                "unsupported participant {:?}",
                other
            ))),
            None => Err(GatewayError::InvalidFrame("participant without id".to_owned())),
        }
    }
}

fn participant(p: Option<wire::Participant>, role: &str) -> Result<Participant, GatewayError> {
    match p {
        Some(p) => p.try_into(),
        None => Err(GatewayError::InvalidFrame(format!("missing {}", role))),
    }
}

fn decode_hop(tail: Option<wire::Tail>) -> Result<Hop, GatewayError> {
    match tail.map(|t| t.value) {
        None | Some(1) => Ok(Hop::Single),
        Some(2) => Ok(Hop::ViaLeader),
        Some(v) => Err(GatewayError::InvalidFrame(format!("unknown tail {}", v))),
    }
}

fn decode_payload(
    query: Option<wire::QueryType>,
    config: Option<wire::ConfigType>,
) -> Result<Payload, GatewayError> {
    Ok(match (query, config) {
        (Some(_), Some(_)) => {
            return Err(GatewayError::InvalidFrame(
                "both query and config payloads set".to_owned(),
            ))
        }
        (Some(q), None) => match q.id {
            Some(wire::query_type::Id::Send(s)) => Payload::QuerySend {
                text: s.payload.map(|p| p.text).unwrap_or_default(),
                signature: s.code,
                vars: s.b.map(|b| b.value).unwrap_or_else(|| "{}".to_owned()),
            },
            Some(wire::query_type::Id::Recv(r)) => Payload::QueryRecv(r.text),
            None => return Err(GatewayError::MissingPayload("query payload")),
        },
        (None, Some(c)) => match c.config {
            Some(wire::config_type::Config::Send(s)) => Payload::ConfigSend { file: s.file },
            Some(wire::config_type::Config::Recv(r)) => Payload::ConfigRecv(r.file.map(|f| f.text)),
            None => return Err(GatewayError::MissingPayload("config payload")),
        },
        (None, None) => return Err(GatewayError::MissingPayload("payload")),
    })
}

impl TryFrom<wire::Message> for Envelope {
    type Error = GatewayError;

    fn try_from(msg: wire::Message) -> Result<Self, Self::Error> {
        let hop = decode_hop(msg.tail)?;
        let env = msg.message.ok_or(GatewayError::MissingPayload("message"))?;

        Ok(Envelope {
            delivery_channel: env.delivery_channel,
            sender: participant(env.sender, "sender")?,
            recipient: participant(env.recipient, "recipient")?,
            payload: decode_payload(env.payload, env.config)?,
            hop,
        })
    }
}

/// A frame received from the gateway.
///
/// Only the payload matters to the caller. Addressing the client doesn't
/// model (missing, `teg`, `authorizedClient`) decodes as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub sender: Option<Participant>,
    pub recipient: Option<Participant>,
    pub payload: Payload,
    pub hop: Hop,
}

impl Reply {
    pub fn decode(bytes: &[u8]) -> Result<Reply, GatewayError> {
        let msg = wire::Message::decode(bytes)?;
        Reply::try_from(msg)
    }
}

fn lenient(p: Option<wire::Participant>) -> Option<Participant> {
    p.and_then(|p| match Participant::try_from(p) {
        Ok(p) => Some(p),
        Err(e) => {
            log::debug!("ignoring reply addressing: {}", e);
            None
        }
    })
}

impl TryFrom<wire::Message> for Reply {
    type Error = GatewayError;

    fn try_from(msg: wire::Message) -> Result<Self, Self::Error> {
        let hop = decode_hop(msg.tail)?;
        let env = msg.message.ok_or(GatewayError::MissingPayload("message"))?;

        Ok(Reply {
            sender: lenient(env.sender),
            recipient: lenient(env.recipient),
            payload: decode_payload(env.payload, env.config)?,
            hop,
        })
    }
}
