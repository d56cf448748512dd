pub mod bridge;
pub mod bridging;
pub mod config;
pub mod delivery;
pub mod error;
pub mod file_storage;
pub mod identity_store;
pub mod inbound;
pub mod ledger;
pub mod network;
pub mod outbound;
pub mod recently_deleted;
pub mod send_lock;
pub mod session;
pub mod simulated;
pub mod storage;
pub mod translate;
pub mod types;

pub use bridge::{Bridge, BridgeCore, BridgeOptions, OutboundOutcome};
pub use bridging::{BridgingFlags, KvBridgingFlags};
pub use config::BridgeConfig;
pub use delivery::{ChannelDelivery, DeliveryEvent, LocalDelivery};
pub use error::{Error, Result};
pub use file_storage::FileStorageAdapter;
pub use identity_store::{EventIdentityStore, KvEventIdentityStore};
pub use inbound::{DropReason, EchoKind, InboundFilter, InboundFilterOptions, InboundOutcome};
pub use ledger::{DedupeLedger, EchoToken, PendingSend, PendingState};
pub use network::RemoteNetwork;
pub use outbound::{OutboundPipeline, OutboundPipelineOptions};
pub use recently_deleted::RecentlyDeletedSet;
pub use send_lock::{SendSerializer, SendTicket};
pub use session::{LastEventIds, SessionHandle, SessionRegistry};
pub use storage::{InMemoryStorage, StorageAdapter};
pub use translate::{MessageTranslator, PlainTextTranslator};
pub use types::*;
