use common::onebot::OneBotClient;
use tracing::warn;

use crate::event::IncomingMessage;

/// Delivers "please wait" style notices while a command is still running.
pub trait Notifier {
    async fn notify(&self, message: &IncomingMessage, text: &str);
}

impl Notifier for OneBotClient {
    async fn notify(&self, message: &IncomingMessage, text: &str) {
        let Some(target) = message.reply_to else {
            return;
        };
        if let Err(e) = self.send_message(target, text).await {
            warn!(sender = message.sender_id, "Failed to push notice: {:#}", e);
        }
    }
}

pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    async fn notify(&self, _message: &IncomingMessage, text: &str) {
        println!("{}", text);
    }
}
