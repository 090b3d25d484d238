//! Composite port exposing one identity over several inputs and outputs

use patchbay_core::{Msg, PortId};
use std::sync::Arc;
use tracing::debug;

use crate::context::AppContext;
use crate::port::{Declare, Input, Output, Port, Subscribable};
use crate::subscription::{Conditions, Handler, SubscribedCall};
use crate::{Result, RouterError};

/// Wraps inputs and outputs behind a single subscribe/send surface
pub struct MultiPort {
    id: PortId,
    inputs: Vec<Arc<dyn Input>>,
    outputs: Vec<Arc<dyn Output>>,
}

impl MultiPort {
    pub fn new(id: PortId, inputs: Vec<Arc<dyn Input>>, outputs: Vec<Arc<dyn Output>>) -> Self {
        Self {
            id,
            inputs,
            outputs,
        }
    }

    pub fn inputs(&self) -> &[Arc<dyn Input>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Arc<dyn Output>] {
        &self.outputs
    }
}

impl Port for MultiPort {
    fn id(&self) -> &PortId {
        &self.id
    }

    /// Open only when every wrapped port is open
    fn is_open(&self) -> bool {
        self.inputs.iter().all(|p| p.is_open()) && self.outputs.iter().all(|p| p.is_open())
    }

    fn is_available(&self) -> bool {
        self.inputs.iter().all(|p| p.is_available())
            && self.outputs.iter().all(|p| p.is_available())
    }

    fn open(&self) {
        for input in self.inputs.iter().filter(|p| !p.is_open()) {
            input.open();
        }
        for output in self.outputs.iter().filter(|p| !p.is_open()) {
            output.open();
        }
    }

    fn close(&self) {
        for input in self.inputs.iter().filter(|p| p.is_open()) {
            input.close();
        }
        for output in self.outputs.iter().filter(|p| p.is_open()) {
            output.close();
        }
    }
}

impl Subscribable for MultiPort {
    fn register(&self, conditions: Conditions, handler: Handler) -> Result<()> {
        let (last, rest) = self
            .inputs
            .split_last()
            .ok_or_else(|| RouterError::NoInputs(self.id.clone()))?;

        for input in rest {
            input.register(conditions.clone(), handler.clone())?;
        }
        last.register(conditions, handler)
    }

    fn calls(&self) -> Vec<Arc<SubscribedCall>> {
        self.inputs.iter().flat_map(|input| input.calls()).collect()
    }
}

impl Output for MultiPort {
    /// Send through every wrapped output; the first failure is returned
    fn send(&self, msg: &Msg) -> Result<()> {
        let mut first_error = None;
        for output in &self.outputs {
            if let Err(e) = output.send(msg) {
                debug!("{} failed to send through {}: {}", self.id, output.id(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Declaration arguments: the identities of already declared parts
#[derive(Debug, Clone, PartialEq)]
pub struct MultiPortArgs {
    pub uid: String,
    pub inputs: Vec<PortId>,
    pub outputs: Vec<PortId>,
}

impl Declare for MultiPort {
    const KIND: &'static str = "MultiPort";
    type Args = MultiPortArgs;

    fn uid(args: &Self::Args) -> String {
        args.uid.clone()
    }

    fn build(ctx: &AppContext, id: PortId, args: &Self::Args) -> Result<Self> {
        let inputs = args
            .inputs
            .iter()
            .map(|part| {
                ctx.input(part)
                    .ok_or_else(|| RouterError::Config(format!("{} is not a declared input", part)))
            })
            .collect::<Result<Vec<_>>>()?;
        let outputs = args
            .outputs
            .iter()
            .map(|part| {
                ctx.output(part)
                    .ok_or_else(|| RouterError::Config(format!("{} is not a declared output", part)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(id, inputs, outputs))
    }

    fn as_output(self: Arc<Self>) -> Option<Arc<dyn Output>> {
        Some(self)
    }
}
