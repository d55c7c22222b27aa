//! seekd: query orchestration for a desktop search daemon.
//!
//! This crate sits between search clients and a set of pluggable search
//! backends:
//! Configuration → Policy → Loader → Registrations → Dispatcher → Result
//!
//! # Architecture
//!
//! - **Registry**: allow/deny policy plus the immutable set of live backends
//! - **Loader**: discovers backend modules and static index directories
//! - **Dispatcher**: normalizes each query and fans it out to every willing
//!   backend
//! - **Result**: aggregates streamed hits under a Started/Finished protocol
//! - **Router**: forwards backend change notifications and reports status
//!
//! Query modelling and preparation live in the `seekd-query` crate.

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod flavor;
pub mod hit;
pub mod loader;
pub mod orchestrator;
pub mod registry;
pub mod result;
pub mod router;

pub use backend::{BackendId, BackendStatus, ChangeData, Queryable};
pub use config::DaemonConfig;
pub use error::{BackendError, DaemonError, Result, StaticIndexError};
pub use flavor::{BackendFlavor, HostCapabilities, QueryDomain};
pub use hit::Hit;
pub use orchestrator::{BackendListing, CoreBuilder, OrchestrationCore};
pub use result::{QueryEvent, QueryEvents, QueryResult, QueryWorker, ResultPhase};
pub use router::{BackendChanged, BackendStatusEntry, ChangeNotifier, DaemonStatus};

pub use seekd_query::{Query, QueryPart, SearchTermSummary};
