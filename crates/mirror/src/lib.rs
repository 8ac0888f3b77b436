//! Mirroring protocol: an origin object owned by one frame loop is observed,
//! every frame, through proxies on other frame loops.
//!
//! The owning thread builds origins through a `MirrorContext`. Finalizing an
//! origin allocates one triple buffer per target thread and sends each
//! target a `ConstructionRecord`. The target's `ProxyRegistry` turns records
//! into proxies and refreshes them once per tick.
//!
//! # Invariants
//! - Mirroring setup for an instance runs exactly once, in
//!   `OriginBuilder::finalize`.
//! - Field writes touch only the origin's staging buffer; shared memory is
//!   written once per `publish`.
//! - A proxy only ever reads a completely published snapshot.
//! - Reference fields carry instance ids. Resolving one never fails because
//!   the referent is missing; it yields `None`.
//! - Proxies are keyed by `(instance id, origin thread)`; registering the
//!   same key twice is refused.

mod args;
mod context;
mod error;
mod inspect;
mod origin;
mod origin_set;
mod proxy;
mod record;
mod registry;
pub mod ticking;

pub use args::{ConstructorArgs, MirrorSerialize};
pub use context::{MirrorContext, MirrorRoute};
pub use error::MirrorError;
pub use inspect::{ProxyInfo, RegistryInspector, RegistrySummary};
pub use origin::{Origin, OriginBuilder};
pub use origin_set::OriginSet;
pub use proxy::{NoLogic, Proxy, ProxyInit, ProxyLogic, ProxyTable, ProxyView};
pub use record::{
    BufferInfo, ConstructionRecord, MirrorMessage, RecordHeader, RecordReceiver, RecordSender,
    record_channel,
};
pub use registry::{ProxyFactories, ProxyRegistry, RegistryStats};
pub use ticking::{PublishOrigins, RefreshProxies};
