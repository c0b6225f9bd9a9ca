//! Charts module - Scatter figure assembly and PNG rendering

mod plotter;
mod renderer;

pub use plotter::ChartPlotter;
pub use renderer::ScatterRenderer;
