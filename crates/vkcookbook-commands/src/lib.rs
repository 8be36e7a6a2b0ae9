//! # vkcookbook-commands
//!
//! Builders that sit on top of the plain wrappers of [vkcookbook]:
//!
//! - [GraphicsPipelineState] collects the fixed function state of a graphics pipeline and creates it.
//! - [RenderPassBuilder] describes attachments, subpasses and their dependencies, and checks all references before creating the render pass.
//! - [BarrierBuilder] collects image and buffer memory barriers and records them in one call.
//! - [OneTimeSubmit] records a closure into a fresh command buffer, submits it and waits for it. The [upload] helpers use it to fill
//!   device local buffers and images.
//!
//! # Example
//! ```no_run
//! use vkcookbook::{ash::vk, context::Ctx};
//! use vkcookbook_commands::{OneTimeSubmit, RenderPassBuilder};
//!
//! let ctx = Ctx::new_headless(false).unwrap();
//! let render_pass = RenderPassBuilder::presentable(vk::Format::B8G8R8A8_SRGB, None)
//!     .build(&ctx.device)
//!     .unwrap();
//! let submit = OneTimeSubmit::new(&ctx.device, ctx.graphics_queue().unwrap()).unwrap();
//! submit.submit(|_device, _cmd| {}).unwrap();
//! # drop(render_pass);
//! ```

mod barrier_builder;
pub use barrier_builder::{BarrierBuilder, access_for_layout};

mod one_time_submit;
pub use one_time_submit::OneTimeSubmit;

mod pipeline_state;
pub use pipeline_state::{GraphicsPipelineState, alpha_blending, no_blending};

mod render_pass;
pub use render_pass::{RenderPassBuilder, SubpassDescription};

///Staging based uploads of buffer and image data.
pub mod upload;
