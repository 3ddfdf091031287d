pub mod window;

pub use window::{frontier_index, select_window, window_bounds};
