//! Tab contents and the device detail overlay. Screens are stateless
//! renderers: the orchestrator owns selection and filter state and hands
//! each screen a read-only view.

pub mod components;
pub mod detail;
pub mod devices;
pub mod energy;
pub mod events;
