//! Console formatting and diagram export

pub mod display;
pub mod render;

pub use display::{Color, ColorOutput, ScheduleFormatter};
pub use render::{render_tikz, save_tikz};
