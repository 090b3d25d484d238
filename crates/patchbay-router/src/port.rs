//! Port traits
//!
//! A port is an [`Input`], an [`Output`], or both. Concrete port types are
//! created through [`AppContext::declare`](crate::AppContext::declare), which
//! keeps one instance per identity.

use patchbay_core::{Msg, PortId};
use std::sync::Arc;

use crate::context::AppContext;
use crate::subscription::{CallStats, Conditions, Handler, InputCore, SubscribedCall};
use crate::Result;

/// Named endpoint with an open/closed lifecycle
pub trait Port: Send + Sync + 'static {
    fn id(&self) -> &PortId;

    fn is_open(&self) -> bool;

    /// Underlying resource currently exists
    fn is_available(&self) -> bool {
        true
    }

    /// Activate the port. Idempotent; check `is_open` afterwards.
    fn open(&self);

    /// Deactivate the port. Idempotent.
    fn close(&self);
}

/// Something calls can be subscribed to
pub trait Subscribable: Send + Sync {
    fn register(&self, conditions: Conditions, handler: Handler) -> Result<()>;

    /// Registered calls in group then registration order
    fn calls(&self) -> Vec<Arc<SubscribedCall>>;

    fn stats(&self) -> Vec<CallStats> {
        self.calls().iter().map(|c| c.stats()).collect()
    }

    /// Subscribe a function taking the message
    fn subscribe<F>(&self, conditions: impl Into<Conditions>, f: F) -> Result<()>
    where
        F: Fn(Msg) + Send + Sync + 'static,
        Self: Sized,
    {
        self.register(conditions.into(), Handler::new(f))
    }

    /// Subscribe a function to every message
    fn subscribe_all<F>(&self, f: F) -> Result<()>
    where
        F: Fn(Msg) + Send + Sync + 'static,
        Self: Sized,
    {
        self.register(Conditions::Any, Handler::new(f))
    }

    /// Subscribe a function to the first open of the port
    fn on_port_open<F>(&self, f: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
        Self: Sized,
    {
        self.register(Conditions::OnPortOpen, Handler::no_args(f))
    }
}

/// Port producing messages
pub trait Input: Port + Subscribable {
    fn core(&self) -> &InputCore;

    /// Dispatch a message to the subscribed calls
    fn deliver(&self, msg: Msg) {
        self.core().deliver(msg)
    }

    /// Recently delivered messages
    fn history(&self) -> Vec<Msg> {
        self.core().history()
    }
}

/// Port consuming messages
pub trait Output: Port {
    fn send(&self, msg: &Msg) -> Result<()>;
}

/// Port type that can be declared on an [`AppContext`]
pub trait Declare: Port + Sized {
    /// Port type name, first half of the identity
    const KIND: &'static str;

    /// Constructor arguments; a second declaration must repeat them
    type Args: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static;

    /// Second half of the identity
    fn uid(args: &Self::Args) -> String;

    /// Create the port, closed. Must not touch devices.
    fn build(ctx: &AppContext, id: PortId, args: &Self::Args) -> Result<Self>;

    fn id_for(args: &Self::Args) -> PortId {
        PortId::new(Self::KIND, Self::uid(args))
    }

    fn as_input(self: Arc<Self>) -> Option<Arc<dyn Input>> {
        None
    }

    fn as_output(self: Arc<Self>) -> Option<Arc<dyn Output>> {
        None
    }
}

/// Implement [`Subscribable`] and [`Input`] by delegating to an [`InputCore`] field
#[macro_export]
macro_rules! impl_input {
    ($port:ty, $core:ident) => {
        impl $crate::Subscribable for $port {
            fn register(
                &self,
                conditions: $crate::Conditions,
                handler: $crate::Handler,
            ) -> $crate::Result<()> {
                self.$core.register(conditions, handler);
                Ok(())
            }

            fn calls(&self) -> Vec<std::sync::Arc<$crate::SubscribedCall>> {
                self.$core.calls()
            }
        }

        impl $crate::Input for $port {
            fn core(&self) -> &$crate::InputCore {
                &self.$core
            }
        }
    };
}
