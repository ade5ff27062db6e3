use common::onebot::{MessageKind, MessageTarget};
use serde::Deserialize;
use serde_json::{Map, Value};

/// The subset of a OneBot v11 event post the bot cares about.
#[derive(Debug, Deserialize)]
pub struct OneBotEvent {
    pub post_type: String,
    pub message_type: Option<String>,
    pub self_id: Option<i64>,
    pub user_id: Option<i64>,
    pub group_id: Option<i64>,
    pub message: Option<MessageBody>,
}

/// Hosts report messages either as a segment array or as a CQ-code string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Segments(Vec<Segment>),
    Text(String),
}

#[derive(Debug, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// A chat line reduced to what command handling needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub sender_id: i64,
    /// `None` for lines typed on the operator console.
    pub reply_to: Option<MessageTarget>,
    pub text: String,
    pub mentions: Vec<i64>,
}

impl IncomingMessage {
    pub fn console(sender_id: i64, text: impl Into<String>) -> Self {
        Self {
            sender_id,
            reply_to: None,
            text: text.into(),
            mentions: Vec::new(),
        }
    }
}

impl OneBotEvent {
    pub fn into_incoming(self) -> Option<IncomingMessage> {
        if self.post_type != "message" {
            return None;
        }
        let kind: MessageKind = self.message_type.as_deref()?.parse().ok()?;
        let sender_id = self.user_id?;
        if Some(sender_id) == self.self_id {
            return None;
        }

        let reply_to = match kind {
            MessageKind::GROUP => MessageTarget::Group(self.group_id?),
            MessageKind::PRIVATE => MessageTarget::Private(sender_id),
        };

        let (text, mut mentions) = match self.message? {
            MessageBody::Segments(segments) => flatten_segments(&segments),
            MessageBody::Text(raw) => parse_cq_string(&raw),
        };
        mentions.retain(|&qq_id| Some(qq_id) != self.self_id);

        Some(IncomingMessage {
            sender_id,
            reply_to: Some(reply_to),
            text: text.trim().to_string(),
            mentions,
        })
    }
}

fn mention_id(value: &Value) -> Option<i64> {
    match value {
        Value::String(qq) => qq.parse().ok(),
        Value::Number(qq) => qq.as_i64(),
        _ => None,
    }
}

fn flatten_segments(segments: &[Segment]) -> (String, Vec<i64>) {
    let mut text = String::new();
    let mut mentions = Vec::new();

    for segment in segments {
        match segment.kind.as_str() {
            "text" => {
                if let Some(chunk) = segment.data.get("text").and_then(Value::as_str) {
                    text.push_str(chunk);
                }
            }
            "at" => {
                // "all" and anything unparsable simply drop out
                if let Some(qq_id) = segment.data.get("qq").and_then(mention_id) {
                    mentions.push(qq_id);
                }
                text.push(' ');
            }
            _ => text.push(' '),
        }
    }

    (text, mentions)
}

fn unescape_cq(raw: &str) -> String {
    raw.replace("&#91;", "[")
        .replace("&#93;", "]")
        .replace("&#44;", ",")
        .replace("&amp;", "&")
}

fn parse_cq_string(raw: &str) -> (String, Vec<i64>) {
    let mut text = String::new();
    let mut mentions = Vec::new();
    let mut rest = raw;

    while let Some(start) = rest.find("[CQ:") {
        let code_and_tail = &rest[start..];
        let Some(end) = code_and_tail.find(']') else {
            break;
        };

        text.push_str(&unescape_cq(&rest[..start]));
        text.push(' ');

        let mut fields = code_and_tail[4..end].split(',');
        if fields.next() == Some("at") {
            let qq_id = fields
                .filter_map(|field| field.strip_prefix("qq="))
                .find_map(|qq| unescape_cq(qq).parse::<i64>().ok());
            if let Some(qq_id) = qq_id {
                mentions.push(qq_id);
            }
        }

        rest = &code_and_tail[end + 1..];
    }
    text.push_str(&unescape_cq(rest));

    (text, mentions)
}
