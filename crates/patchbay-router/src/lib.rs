//! Patchbay Router
//!
//! Port registry, subscriptions and message dispatch:
//! - Declares ports once per identity ([`AppContext::declare`])
//! - Keeps condition-grouped subscribed calls per input ([`InputCore`])
//! - Runs calls on a shared bounded worker pool ([`WorkerPool`])
//! - Combines ports behind one identity ([`MultiPort`])
//!
//! # Example
//!
//! ```no_run
//! use patchbay_core::{ChannelMsg, MidiPattern};
//! use patchbay_router::{AppContext, Input, ManualIn, RouterConfig, Subscribable};
//!
//! fn main() -> patchbay_router::Result<()> {
//!     let ctx = AppContext::new(RouterConfig::default())?;
//!     let input = ctx.declare::<ManualIn>("Ctrl")?;
//!
//!     input.subscribe(MidiPattern::new().channel(1).data1(7), |msg| {
//!         println!("volume: {}", msg);
//!     })?;
//!
//!     ctx.open_all();
//!     input.deliver(ChannelMsg::control_change(1, 7, 100).into());
//!     ctx.shutdown();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod manual;
pub mod multiport;
pub mod pool;
pub mod port;
pub mod subscription;

pub use config::RouterConfig;
pub use context::{AppContext, PortRegistry};
pub use error::{Result, RouterError};
pub use manual::ManualIn;
pub use multiport::{MultiPort, MultiPortArgs};
pub use pool::WorkerPool;
pub use port::{Declare, Input, Output, Port, Subscribable};
pub use subscription::{CallStats, Conditions, Handler, InputCore, SubscribedCall};
