use anyhow::Result;
use serde::Serialize;

use crate::output::{list_or_dash, Output, Report};
use crate::storage::Storage;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgeFlags {
    account: String,
    bridge_all: bool,
    guilds: Vec<String>,
    channels: Vec<String>,
}

impl Report for BridgeFlags {
    fn human(&self) -> String {
        format!(
            "Account {}\n  all guilds: {}\n  guilds:     {}\n  channels:   {}",
            self.account,
            if self.bridge_all { "on" } else { "off" },
            list_or_dash(&self.guilds),
            list_or_dash(&self.channels),
        )
    }
}

/// Bridge or unbridge a whole guild
pub fn guild(account: &str, guild_id: &str, bridged: bool, storage: &Storage, output: &Output) -> Result<()> {
    storage.flags().set_guild_bridged(account, guild_id, bridged)?;
    let verb = if bridged { "Bridging" } else { "No longer bridging" };
    output.done(
        "bridge.guild",
        &format!("{} guild {} for account {}", verb, guild_id, account),
    );
    Ok(())
}

/// Bridge or unbridge a single channel
pub fn channel(account: &str, channel_id: &str, bridged: bool, storage: &Storage, output: &Output) -> Result<()> {
    storage.flags().set_channel_bridged(account, channel_id, bridged)?;
    let verb = if bridged { "Bridging" } else { "No longer bridging" };
    output.done(
        "bridge.channel",
        &format!("{} channel {} for account {}", verb, channel_id, account),
    );
    Ok(())
}

/// Toggle bridging of every guild channel
pub fn all(account: &str, enabled: bool, storage: &Storage, output: &Output) -> Result<()> {
    storage.flags().set_bridge_all(account, enabled)?;
    let state = if enabled { "on" } else { "off" };
    output.done(
        "bridge.all",
        &format!("Bridging all guilds for account {} is {}", account, state),
    );
    Ok(())
}

pub fn list(account: &str, storage: &Storage, output: &Output) -> Result<()> {
    let flags = storage.flags();
    let result = BridgeFlags {
        account: account.to_string(),
        bridge_all: flags.bridges_all(account)?,
        guilds: flags.bridged_guilds(account)?,
        channels: flags.bridged_channels(account)?,
    };
    output.report("bridge.list", &result);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaybridge::{BridgingFlags, Conversation};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_flags_persist_in_data_dir() {
        let temp = TempDir::new().unwrap();
        let output = Output::new(true);
        let storage = Storage::open(temp.path()).unwrap();

        channel("1", "c1", true, &storage, &output).unwrap();
        guild("1", "g2", true, &storage, &output).unwrap();
        guild("1", "g2", false, &storage, &output).unwrap();

        let reopened = Storage::open(temp.path()).unwrap();
        let flags = reopened.flags();
        assert_eq!(flags.bridged_channels("1").unwrap(), vec!["c1"]);
        assert!(flags.bridged_guilds("1").unwrap().is_empty());

        let chan = Conversation::guild_channel("c1", "g1", "Guild", "general");
        assert!(flags.is_conversation_bridged("1", &chan).await.unwrap());
    }

    #[test]
    fn test_list_rendering() {
        let flags = BridgeFlags {
            account: "1".to_string(),
            bridge_all: false,
            guilds: vec!["g1".to_string(), "g2".to_string()],
            channels: Vec::new(),
        };
        assert_eq!(
            flags.human(),
            "Account 1\n  all guilds: off\n  guilds:     g1, g2\n  channels:   -"
        );
    }
}
