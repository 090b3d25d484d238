//! Patchbay Bridge
//!
//! Device ports connecting the patchbay router to real protocols:
//! - MIDI devices through midir ([`MidiIn`], [`MidiOut`], [`MidiIo`])
//! - Ableton Live remote script over a proxy MIDI device ([`AbletonIn`], [`AbletonOut`], [`AbletonIo`])
//! - OSC over UDP through rosc ([`OscIn`], [`OscOut`], [`OscIo`])
//! - OSC request/response queries ([`OscQueryMaker`])
//! - Service inputs ([`MetronomeIn`], [`MidiPortsWatcher`])

/// Implement `Port`, `Subscribable` and `Output` by delegating to a `MultiPort` field
#[cfg(any(feature = "midi", feature = "osc"))]
macro_rules! impl_composite {
    ($port:ty, $inner:ident) => {
        impl patchbay_router::Port for $port {
            fn id(&self) -> &patchbay_core::PortId {
                patchbay_router::Port::id(&self.$inner)
            }

            fn is_open(&self) -> bool {
                patchbay_router::Port::is_open(&self.$inner)
            }

            fn is_available(&self) -> bool {
                patchbay_router::Port::is_available(&self.$inner)
            }

            fn open(&self) {
                patchbay_router::Port::open(&self.$inner)
            }

            fn close(&self) {
                patchbay_router::Port::close(&self.$inner)
            }
        }

        impl patchbay_router::Subscribable for $port {
            fn register(
                &self,
                conditions: patchbay_router::Conditions,
                handler: patchbay_router::Handler,
            ) -> patchbay_router::Result<()> {
                patchbay_router::Subscribable::register(&self.$inner, conditions, handler)
            }

            fn calls(&self) -> Vec<std::sync::Arc<patchbay_router::SubscribedCall>> {
                patchbay_router::Subscribable::calls(&self.$inner)
            }
        }

        impl patchbay_router::Output for $port {
            fn send(&self, msg: &patchbay_core::Msg) -> patchbay_router::Result<()> {
                patchbay_router::Output::send(&self.$inner, msg)
            }
        }
    };
}

pub mod error;
pub mod metronome;
pub mod query;
pub mod settings;

#[cfg(feature = "midi")]
pub mod ableton;

#[cfg(feature = "midi")]
pub mod midi;

#[cfg(feature = "midi")]
pub mod watcher;

#[cfg(feature = "osc")]
pub mod osc;

pub use error::{BridgeError, Result};
pub use metronome::{MetronomeArgs, MetronomeIn};
pub use query::OscQueryMaker;
pub use settings::BridgeSettings;

#[cfg(feature = "midi")]
pub use ableton::{AbletonIn, AbletonIo, AbletonOut};

#[cfg(feature = "midi")]
pub use midi::{MidiIn, MidiIo, MidiOut, MidiPortArgs};

#[cfg(feature = "midi")]
pub use watcher::{MidiPortsWatcher, WATCHER_UID};

#[cfg(feature = "osc")]
pub use osc::{OscIn, OscIo, OscIoArgs, OscOut};
