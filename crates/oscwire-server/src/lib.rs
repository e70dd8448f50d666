//! oscwire server
//!
//! Method dispatch and the receive loop:
//! - Methods pair an address pattern and optional typespec with a handler
//! - The dispatcher runs every matching method in registration order
//! - Future-dated bundles wait in a pending queue until their time tag
//! - A server thread owns the receive loop over any [`Transport`]
//!
//! # Example
//!
//! ```no_run
//! use oscwire_server::{Dispatcher, ServerConfig, ServerThread};
//! use oscwire_transport::UdpTransport;
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let dispatcher = Arc::new(Dispatcher::new());
//!     dispatcher.add_method("/synth/*/freq", Some("f"), |msg, _ctx| {
//!         println!("{}", msg);
//!         Ok(())
//!     })?;
//!
//!     let transport = Arc::new(UdpTransport::bind("0.0.0.0:57120")?);
//!     let server = ServerThread::new(transport, dispatcher, ServerConfig::default());
//!     server.start()?;
//!     std::thread::park();
//!     Ok(())
//! }
//! ```
//!
//! [`Transport`]: oscwire_transport::Transport

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod method;
pub mod scheduler;
pub mod sender;
pub mod server;

pub use config::ServerConfig;
pub use dispatcher::{DispatchFailure, DispatchSummary, Dispatcher, ErrorCallback};
pub use error::{Result, ServerError};
pub use method::{BundleHook, Handler, HandlerContext, Method, MethodId, UserData};
pub use scheduler::{PendingQueue, Scheduler};
pub use sender::OscSender;
pub use server::ServerThread;
