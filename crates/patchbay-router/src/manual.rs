//! Input without a device driver
//!
//! Messages enter through [`Input::deliver`](crate::Input::deliver). Used by
//! OS hook wrappers, GUIs and tests.

use patchbay_core::PortId;
use std::sync::Arc;

use crate::context::AppContext;
use crate::impl_input;
use crate::port::{Declare, Input, Port};
use crate::subscription::InputCore;
use crate::Result;

pub struct ManualIn {
    core: InputCore,
}

impl Port for ManualIn {
    fn id(&self) -> &PortId {
        self.core.id()
    }

    fn is_open(&self) -> bool {
        self.core.is_open()
    }

    fn open(&self) {
        self.core.opened();
    }

    fn close(&self) {
        self.core.closed();
    }
}

impl_input!(ManualIn, core);

impl Declare for ManualIn {
    const KIND: &'static str = "ManualIn";
    type Args = String;

    fn uid(args: &Self::Args) -> String {
        args.clone()
    }

    fn build(ctx: &AppContext, id: PortId, _args: &Self::Args) -> Result<Self> {
        Ok(Self {
            core: ctx.input_core(id),
        })
    }

    fn as_input(self: Arc<Self>) -> Option<Arc<dyn Input>> {
        Some(self)
    }
}
