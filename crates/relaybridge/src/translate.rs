use crate::{LocalContent, LocalMessage, RemoteMessage, Result};

/// Converts message bodies between the two networks' formats.
pub trait MessageTranslator: Send + Sync {
    fn to_local(&self, message: &RemoteMessage) -> Result<LocalContent>;

    fn to_remote(&self, message: &LocalMessage) -> Result<String>;
}

/// Passes plain text through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextTranslator;

impl MessageTranslator for PlainTextTranslator {
    fn to_local(&self, message: &RemoteMessage) -> Result<LocalContent> {
        Ok(LocalContent {
            body: message.content.clone(),
            ..Default::default()
        })
    }

    fn to_remote(&self, message: &LocalMessage) -> Result<String> {
        Ok(message.body.clone())
    }
}
