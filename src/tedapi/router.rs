use crate::tedapi::message::{Envelope, Hop, Participant, Payload, DELIVERY_CHANNEL};
use crate::tedapi::{Din, GatewayError, Query};

pub const LEADER_PATH: &str = "/tedapi/v1";

/// Which device a query is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Leader,
    /// A specific device, reached through the leader.
    Device(Din),
}

impl From<&str> for Target {
    fn from(din: &str) -> Self {
        if din.is_empty() {
            Target::Leader
        } else {
            Target::Device(Din::new(din))
        }
    }
}

impl From<Din> for Target {
    fn from(din: Din) -> Self {
        if din.is_empty() {
            Target::Leader
        } else {
            Target::Device(din)
        }
    }
}

impl From<Option<Din>> for Target {
    fn from(din: Option<Din>) -> Self {
        din.map(Target::from).unwrap_or(Target::Leader)
    }
}

/// An envelope plus the path it must be posted to.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub path: String,
    pub envelope: Envelope,
}

impl Target {
    pub fn path(&self) -> String {
        match self {
            Target::Leader => LEADER_PATH.to_owned(),
            Target::Device(din) => format!("/tedapi/device/{}/v1", din),
        }
    }
}

/// Addresses a query.
///
/// Talking to the leader we are `Local`. Reaching any other device goes
/// through the leader, so the leader becomes the sender and the tail
/// says two hops.
pub fn build_query(query: &Query, target: &Target, leader: &Din) -> Result<Route, GatewayError> {
    let payload = Payload::QuerySend {
        text: query.text.clone(),
        signature: query.signature.clone(),
        vars: query.vars_json()?,
    };

    let (sender, recipient, hop) = match target {
        Target::Leader => (
            Participant::local(),
            Participant::Din(leader.clone()),
            Hop::Single,
        ),
        Target::Device(din) => (
            Participant::Din(leader.clone()),
            Participant::Din(din.clone()),
            Hop::ViaLeader,
        ),
    };

    Ok(Route {
        path: target.path(),
        envelope: Envelope {
            delivery_channel: DELIVERY_CHANNEL,
            sender,
            recipient,
            payload,
            hop,
        },
    })
}

/// Config files only come from the leader.
pub fn build_config(file: &str, leader: &Din) -> Route {
    Route {
        path: LEADER_PATH.to_owned(),
        envelope: Envelope {
            delivery_channel: DELIVERY_CHANNEL,
            sender: Participant::local(),
            recipient: Participant::Din(leader.clone()),
            payload: Payload::ConfigSend {
                file: file.to_owned(),
            },
            hop: Hop::Single,
        },
    }
}
