//! Render Frontend
//!
//! Turns worlds into frame packets: per-view instance lists with packed
//! sort keys, merged brush surfaces, shadow draw lists and clustered light
//! assignments, all referencing one block of per-frame streamed memory.
//! The backend consumes the packet; the frontend never touches the GPU.

#[allow(clippy::module_inception)]
pub mod frontend;

pub mod frame;
pub mod instance;
pub mod surface;
pub mod view;

pub use frame::{
    DebugDrawCmd, FramePacket, HudDrawCmd, HudDrawList, StreamHandle, StreamedMemory,
};
pub use frontend::{RenderFrontend, RenderingParameters, Viewport};
pub use instance::{
    pack_sort_key, DirectionalLightDef, GeometrySource, LightDef, ProbeDef, RenderInstance,
    ShadowMapDef, ShadowMapKind, ShadowRenderInstance,
};
pub use view::{RenderView, VignetteParams};
