pub mod fs;
pub mod frame;
pub mod grid;
pub mod html;
