#![allow(
    dead_code,
    // operand-stack helpers read better than iterator chains here
    clippy::needless_range_loop,
    clippy::large_enum_variant,
    clippy::manual_range_contains,
)]

//! PostForge: a PostScript Level 2 interpreter producing a device-independent
//! display list. The library's boundary is the `Device` trait; rasterization,
//! glyph rendering and ICC transforms are external collaborators.

mod context;
mod device;
mod engine;
mod error;
mod file;
mod filters;
mod graphics;
mod job;
mod object;
mod operators;
mod token;
mod vm;

pub use crate::{
    context::Context,
    device::Device,
    error::{ErrorKind, PsResult},
    graphics::{
        display_list::{DisplayElement, DisplayList, FillRule, ImageData, LineCap, LineJoin, LineProps, Rgb},
        matrix::Matrix,
        page_device::{PageDevice, StrokeMethod, TextRenderingMode},
        path::PathSegment,
    },
    job::{execjob, Interpreter},
};
